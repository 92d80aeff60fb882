//! Secondary-source linking.
//!
//! For each canonical entry the linker expands configured target kinds into
//! concrete secondary queries and records which of them returned a result.
//! The priority tier is exhaustive: every priority kind is queried even after
//! one succeeds. The backup tier is consulted only when no priority kind
//! succeeded, and stops at the first kind with a success.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{CanonicalEntry, SecondaryResult};
use crate::errors::PipelineError;
use crate::lookup::{FetchStats, LookupCache, SecondaryService};
use crate::store::ArtifactStore;
use crate::types::Query;

/// Source of secondary query strings on a canonical entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    /// Every alias query, in discovery order.
    AliasQuery,
    /// The representative candidate's writing.
    RepresentativeWriting,
    /// The representative candidate's reading.
    RepresentativeReading,
    /// Writings of the representative's other forms.
    OtherFormWriting,
    /// Readings of the representative's other forms.
    OtherFormReading,
}

impl TargetKind {
    /// Every kind, in declaration order.
    pub const ALL: [TargetKind; 5] = [
        TargetKind::AliasQuery,
        TargetKind::RepresentativeWriting,
        TargetKind::RepresentativeReading,
        TargetKind::OtherFormWriting,
        TargetKind::OtherFormReading,
    ];

    /// Config name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            TargetKind::AliasQuery => "aliasQuery",
            TargetKind::RepresentativeWriting => "representativeWriting",
            TargetKind::RepresentativeReading => "representativeReading",
            TargetKind::OtherFormWriting => "otherFormWriting",
            TargetKind::OtherFormReading => "otherFormReading",
        }
    }

    /// Concrete queries for `entry`: non-empty, deduplicated, in entry order.
    pub fn expand(self, entry: &CanonicalEntry) -> Vec<Query> {
        let representative = &entry.representative;
        let raw: Vec<&str> = match self {
            TargetKind::AliasQuery => entry.alias_queries.iter().map(String::as_str).collect(),
            TargetKind::RepresentativeWriting => vec![representative.writing.as_str()],
            TargetKind::RepresentativeReading => vec![representative.reading.as_str()],
            TargetKind::OtherFormWriting => representative
                .other_forms
                .iter()
                .map(|form| form.writing.as_str())
                .collect(),
            TargetKind::OtherFormReading => representative
                .other_forms
                .iter()
                .map(|form| form.reading.as_str())
                .collect(),
        };
        let unique: IndexSet<&str> = raw.into_iter().filter(|q| !q.is_empty()).collect();
        unique.into_iter().map(str::to_string).collect()
    }
}

/// Ordered target tiers for secondary linking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Kinds that are all queried for every entry.
    pub priority_targets: Vec<TargetKind>,
    /// Kinds tried in order, only when no priority kind succeeded.
    pub backup_targets: Vec<TargetKind>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            priority_targets: vec![TargetKind::AliasQuery, TargetKind::RepresentativeWriting],
            backup_targets: vec![
                TargetKind::RepresentativeReading,
                TargetKind::OtherFormWriting,
                TargetKind::OtherFormReading,
            ],
        }
    }
}

impl LinkerConfig {
    /// Reject an empty priority tier or a kind listed twice within one tier.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.priority_targets.is_empty() {
            return Err(PipelineError::Configuration(
                "linker priority targets must not be empty".into(),
            ));
        }
        for (tier, kinds) in [
            ("priority", &self.priority_targets),
            ("backup", &self.backup_targets),
        ] {
            let unique: IndexSet<&TargetKind> = kinds.iter().collect();
            if unique.len() != kinds.len() {
                return Err(PipelineError::Configuration(format!(
                    "linker {tier} targets list a kind more than once"
                )));
            }
        }
        Ok(())
    }
}

/// Counters for one linking pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Entries with at least one linked query.
    pub entries_linked: usize,
    /// Entries left without any linked query.
    pub entries_unlinked: usize,
    /// Secondary cache counters.
    pub fetch: FetchStats,
}

/// Links canonical entries to secondary-source queries.
pub struct SecondaryLinker<'a> {
    config: &'a LinkerConfig,
    cache: LookupCache<'a, SecondaryResult>,
}

impl<'a> SecondaryLinker<'a> {
    /// Linker caching secondary results in `store`.
    pub fn new(
        config: &'a LinkerConfig,
        store: &'a dyn ArtifactStore,
        service: &'a SecondaryService,
    ) -> Self {
        Self {
            config,
            cache: LookupCache::new(store, service),
        }
    }

    /// Replace `entry.linked_secondary_queries` with the queries that succeed
    /// under the tier policy.
    pub fn link_entry(&mut self, entry: &mut CanonicalEntry) -> Result<(), PipelineError> {
        let config = self.config;
        let mut linked: IndexSet<Query> = IndexSet::new();
        for kind in &config.priority_targets {
            linked.extend(self.successes_for(*kind, entry)?);
        }
        if linked.is_empty() {
            for kind in &config.backup_targets {
                let successes = self.successes_for(*kind, entry)?;
                if !successes.is_empty() {
                    debug!(
                        "[vocab:link] entry {} linked through backup kind {}",
                        entry.id,
                        kind.as_str()
                    );
                    linked.extend(successes);
                    break;
                }
            }
        }
        entry.linked_secondary_queries = linked.into_iter().collect();
        Ok(())
    }

    /// Link every entry in order.
    pub fn link_all(&mut self, entries: &mut [CanonicalEntry]) -> Result<LinkStats, PipelineError> {
        let mut stats = LinkStats::default();
        for entry in entries.iter_mut() {
            self.link_entry(entry)?;
            if entry.linked_secondary_queries.is_empty() {
                stats.entries_unlinked += 1;
            } else {
                stats.entries_linked += 1;
            }
        }
        stats.fetch = self.cache.stats();
        info!(
            "[vocab:link] linked={} unlinked={} fetched={} cache_hits={} failed={}",
            stats.entries_linked,
            stats.entries_unlinked,
            stats.fetch.fetched,
            stats.fetch.cache_hits,
            stats.fetch.failed
        );
        Ok(stats)
    }

    fn successes_for(
        &mut self,
        kind: TargetKind,
        entry: &CanonicalEntry,
    ) -> Result<Vec<Query>, PipelineError> {
        let mut successes = Vec::new();
        for query in kind.expand(entry) {
            if let Some(result) = self.cache.ensure(&query)?
                && !result.is_empty
            {
                successes.push(query);
            }
        }
        Ok(successes)
    }
}
