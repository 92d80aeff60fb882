//! Search event sources and the merged, deduplicated event log.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::data::{EventLog, SearchEvent};
use crate::errors::PipelineError;
use crate::types::{Query, SourceGroupId};
use crate::utils::normalize_inline_whitespace;

/// Producer of timestamped search events (for example one browser profile).
pub trait EventSource: Send + Sync {
    /// Stable identifier used in logs.
    fn id(&self) -> &str;
    /// Load every event this source knows about.
    fn load(&self) -> Result<Vec<SearchEvent>, PipelineError>;
}

/// Event source over a fixed in-memory list.
pub struct InMemoryEventSource {
    id: SourceGroupId,
    events: Vec<SearchEvent>,
}

impl InMemoryEventSource {
    /// Source `id` over explicit events.
    pub fn new(id: impl Into<SourceGroupId>, events: Vec<SearchEvent>) -> Self {
        Self {
            id: id.into(),
            events,
        }
    }

    /// Build a source whose events all carry this source's id.
    pub fn from_queries<Q: Into<Query>>(
        id: impl Into<SourceGroupId>,
        queries: impl IntoIterator<Item = (Q, i64)>,
    ) -> Self {
        let id = id.into();
        let events = queries
            .into_iter()
            .map(|(query, ts)| SearchEvent::new(query, ts, id.clone()))
            .collect();
        Self { id, events }
    }
}

impl EventSource for InMemoryEventSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Vec<SearchEvent>, PipelineError> {
        Ok(self.events.clone())
    }
}

/// Event source reading a JSON array of `SearchEvent` values from disk.
pub struct JsonEventSource {
    id: SourceGroupId,
    path: PathBuf,
}

impl JsonEventSource {
    /// Source `id` reading the file at `path` on every load.
    pub fn new(id: impl Into<SourceGroupId>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

impl EventSource for JsonEventSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Vec<SearchEvent>, PipelineError> {
        let body = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Load and merge every source into one event log.
///
/// A source that fails to load is logged and skipped; the merge fails only
/// when every source fails. Also returns the number of skipped sources.
pub fn load_event_log(
    sources: &[Box<dyn EventSource>],
) -> Result<(EventLog, usize), PipelineError> {
    let mut batches = Vec::with_capacity(sources.len());
    let mut failures = Vec::new();
    for source in sources {
        match source.load() {
            Ok(events) => {
                info!(
                    "[vocab:ingest] loaded {} events from '{}'",
                    events.len(),
                    source.id()
                );
                batches.push(events);
            }
            Err(err) => {
                warn!("[vocab:ingest] event source '{}' failed: {}", source.id(), err);
                failures.push(format!("{}: {}", source.id(), err));
            }
        }
    }
    if batches.is_empty() && !failures.is_empty() {
        return Err(PipelineError::NoEvents(failures.join("; ")));
    }
    Ok((merge_events(batches), failures.len()))
}

/// Merge event batches into a deduplicated log ordered by time.
///
/// Queries are whitespace-normalized and empty queries dropped. Two events
/// with the same query and timestamp are one search seen through two logs;
/// the first one (in batch order) is kept. Ties in timestamp order by query.
pub fn merge_events<I>(batches: I) -> EventLog
where
    I: IntoIterator<Item = Vec<SearchEvent>>,
{
    let mut seen: HashSet<(Query, i64)> = HashSet::new();
    let mut events = Vec::new();
    let mut duplicates = 0usize;
    for batch in batches {
        for mut event in batch {
            event.query = normalize_inline_whitespace(&event.query);
            if event.query.is_empty() {
                continue;
            }
            if !seen.insert((event.query.clone(), event.timestamp_usec)) {
                duplicates += 1;
                continue;
            }
            events.push(event);
        }
    }
    events.sort_by(|a, b| {
        a.timestamp_usec
            .cmp(&b.timestamp_usec)
            .then_with(|| a.query.cmp(&b.query))
    });
    if duplicates > 0 {
        info!("[vocab:ingest] dropped {duplicates} duplicate events");
    }
    EventLog { events }
}
