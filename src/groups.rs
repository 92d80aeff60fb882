use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::{EventLog, QueryGroup};
use crate::types::{EventId, GroupId};

/// Unique-query groups in first-appearance order. Group ids are indices.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode,
)]
pub struct QueryGroups {
    /// Groups indexed by id.
    pub groups: Vec<QueryGroup>,
}

impl QueryGroups {
    /// Group events by query. The log is expected to be normalized and
    /// time-ordered (as produced by `merge_events`).
    pub fn build(log: &EventLog) -> Self {
        let mut by_query: IndexMap<&str, QueryGroup> = IndexMap::new();
        for (idx, event) in log.events.iter().enumerate() {
            let event_id = idx as EventId;
            let next_id = by_query.len() as GroupId;
            let group = by_query
                .entry(event.query.as_str())
                .or_insert_with(|| QueryGroup {
                    id: next_id,
                    query: event.query.clone(),
                    event_ids: Vec::new(),
                    first_seen_usec: event.timestamp_usec,
                    last_seen_usec: event.timestamp_usec,
                });
            group.event_ids.push(event_id);
            group.first_seen_usec = group.first_seen_usec.min(event.timestamp_usec);
            group.last_seen_usec = group.last_seen_usec.max(event.timestamp_usec);
        }
        Self {
            groups: by_query.into_values().collect(),
        }
    }

    /// Find the group for an exact query string.
    pub fn by_query(&self, query: &str) -> Option<&QueryGroup> {
        self.groups.iter().find(|group| group.query == query)
    }

    /// Group with the given id.
    pub fn get(&self, id: GroupId) -> Option<&QueryGroup> {
        self.groups.get(id as usize)
    }

    /// Number of distinct queries.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` when the log had no events.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
