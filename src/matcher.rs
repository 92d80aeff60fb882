use std::collections::HashMap;

use tracing::warn;

use crate::data::CandidateEntry;
use crate::errors::PipelineError;
use crate::groups::QueryGroups;
use crate::lookup::{LookupManifest, read_cached};
use crate::store::ArtifactStore;
use crate::types::{GroupId, Query};

/// Literal-exact candidates for one query, in primary-source order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryMatches {
    /// Query the candidates were fetched for.
    pub query: Query,
    /// Group the query belongs to.
    pub group_id: GroupId,
    /// Candidates that literally match `query`.
    pub candidates: Vec<CandidateEntry>,
}

impl QueryMatches {
    /// Build a match set from its parts.
    pub fn new(query: impl Into<Query>, group_id: GroupId, candidates: Vec<CandidateEntry>) -> Self {
        Self {
            query: query.into(),
            group_id,
            candidates,
        }
    }
}

/// Keep the candidates whose writing, reading, or any other form equals
/// `query` exactly. Order is preserved.
pub fn literal_candidates(query: &str, candidates: &[CandidateEntry]) -> Vec<CandidateEntry> {
    candidates
        .iter()
        .filter(|candidate| candidate.literally_matches(query))
        .cloned()
        .collect()
}

/// Build the query-to-candidates mapping from the primary cache.
///
/// Queries come from the lookup manifest in its order. Manifest queries with
/// no group or no cached record are skipped with a warning.
pub fn extract_matches(
    store: &dyn ArtifactStore,
    groups: &QueryGroups,
    manifest: &LookupManifest,
) -> Result<Vec<QueryMatches>, PipelineError> {
    let group_ids: HashMap<&str, GroupId> = groups
        .groups
        .iter()
        .map(|group| (group.query.as_str(), group.id))
        .collect();
    let mut matches = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        let Some(group_id) = group_ids.get(entry.query.as_str()).copied() else {
            warn!("[vocab:resolve] '{}' has no query group; skipping", entry.query);
            continue;
        };
        let Some(cached) = read_cached::<Vec<CandidateEntry>>(store, &entry.query)? else {
            warn!("[vocab:resolve] '{}' missing from primary cache; skipping", entry.query);
            continue;
        };
        matches.push(QueryMatches {
            query: entry.query.clone(),
            group_id,
            candidates: literal_candidates(&entry.query, &cached),
        });
    }
    Ok(matches)
}
