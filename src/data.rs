use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntryId, EventId, GroupId, ProviderName, Query, SourceGroupId};

/// One timestamped search harvested from an event log.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct SearchEvent {
    /// Search string as typed (normalized on merge).
    pub query: Query,
    /// Microseconds since the Unix epoch, UTC.
    pub timestamp_usec: i64,
    /// Event log the search was harvested from.
    pub source_group_id: SourceGroupId,
}

impl SearchEvent {
    /// Build an event from its parts.
    pub fn new(
        query: impl Into<Query>,
        timestamp_usec: i64,
        source_group_id: impl Into<SourceGroupId>,
    ) -> Self {
        Self {
            query: query.into(),
            timestamp_usec,
            source_group_id: source_group_id.into(),
        }
    }

    /// Event time as a UTC timestamp, if representable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp_usec)
    }
}

/// Merged, deduplicated event log. Event ids are indices into `events`.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct EventLog {
    /// Events ordered by timestamp, then query.
    pub events: Vec<SearchEvent>,
}

/// All events sharing one normalized query string.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct QueryGroup {
    /// Position in first-appearance order.
    pub id: GroupId,
    /// Normalized query shared by every event in the group.
    pub query: Query,
    /// Back-references into the merged `EventLog`.
    pub event_ids: Vec<EventId>,
    /// Earliest event timestamp in microseconds.
    pub first_seen_usec: i64,
    /// Latest event timestamp in microseconds.
    pub last_seen_usec: i64,
}

/// Alternate writing/reading pair listed on a dictionary sense.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct FormPair {
    /// Written form, usually with kanji.
    pub writing: String,
    /// Kana reading.
    pub reading: String,
}

impl FormPair {
    /// Build a pair from its parts.
    pub fn new(writing: impl Into<String>, reading: impl Into<String>) -> Self {
        Self {
            writing: writing.into(),
            reading: reading.into(),
        }
    }
}

/// Senses sharing one part-of-speech heading.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct SenseGroup {
    /// Part-of-speech labels heading the group.
    pub parts_of_speech: Vec<String>,
    /// Definitions in source order.
    pub glosses: Vec<String>,
}

/// One parsed sense returned by a single primary-source query.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct CandidateEntry {
    /// Headword writing.
    pub writing: String,
    /// Headword reading.
    pub reading: String,
    /// Alternate writings and readings.
    pub other_forms: Vec<FormPair>,
    /// Definitions grouped by part of speech.
    pub sense_groups: Vec<SenseGroup>,
    /// Source-assigned labels such as `common` or `jlpt-n4`.
    pub tags: Vec<String>,
}

impl CandidateEntry {
    /// Build a candidate with no other forms or senses.
    pub fn new(writing: impl Into<String>, reading: impl Into<String>) -> Self {
        Self {
            writing: writing.into(),
            reading: reading.into(),
            ..Self::default()
        }
    }

    /// Add an alternate writing/reading pair.
    pub fn with_other_form(mut self, writing: impl Into<String>, reading: impl Into<String>) -> Self {
        self.other_forms.push(FormPair::new(writing, reading));
        self
    }

    /// Add a sense group.
    pub fn with_sense_group(mut self, group: SenseGroup) -> Self {
        self.sense_groups.push(group);
        self
    }

    /// Returns `true` when `query` literally equals any writing or reading.
    pub fn literally_matches(&self, query: &str) -> bool {
        self.writing == query
            || self.reading == query
            || self
                .other_forms
                .iter()
                .any(|form| form.writing == query || form.reading == query)
    }
}

/// Deduplicated, merged representation of one dictionary sense.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct CanonicalEntry {
    /// Index at append time; never reused within a run.
    pub id: EntryId,
    /// Candidate that created the entry; later matches only add aliases.
    pub representative: CandidateEntry,
    /// Unique, in discovery order.
    pub alias_queries: Vec<Query>,
    /// Query groups whose query resolved to this entry.
    pub source_group_ids: Vec<GroupId>,
    /// Secondary queries that returned a non-empty result.
    pub linked_secondary_queries: Vec<Query>,
}

/// Secondary-source answer for one query; immutable once fetched.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct SecondaryResult {
    /// Query the result was fetched for.
    pub source_query: Query,
    /// Provider that produced the result.
    pub source: ProviderName,
    /// Headword writing shown in the result title.
    pub title_writing: String,
    /// Headword reading shown in the result title; may be empty.
    pub title_reading: String,
    /// Count of structured content units; ranks otherwise tied results.
    pub richness: u32,
    /// Rendered content units.
    pub content: Vec<String>,
    /// `true` when the provider reported no result for `source_query`.
    pub is_empty: bool,
}

impl SecondaryResult {
    /// Cached marker for a query the provider has no result for.
    pub fn empty(source_query: impl Into<Query>, source: impl Into<ProviderName>) -> Self {
        Self {
            source_query: source_query.into(),
            source: source.into(),
            title_writing: String::new(),
            title_reading: String::new(),
            richness: 0,
            content: Vec::new(),
            is_empty: true,
        }
    }
}

/// One exported row: a canonical entry and the secondary result attached to it.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct FinalEntry {
    /// Linked canonical entry.
    pub entry: CanonicalEntry,
    /// Chosen secondary result, if any.
    pub attached: Option<SecondaryResult>,
}

/// Ordered output handed to the export sink.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct FinalArtifact {
    /// Entries in canonical entry order.
    pub entries: Vec<FinalEntry>,
}

impl FinalArtifact {
    /// Render the artifact as pretty-printed JSON for the export sink.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Number of exported entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing was exported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
