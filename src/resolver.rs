//! Canonical entry resolution.
//!
//! Each query arrives with the literal-exact candidates the primary source
//! returned for it. Queries with exactly one candidate are merged first; the
//! ambiguous ones are then resolved under one `ResolveMode` per run. Every scan
//! runs in input order so identical input always yields identical entries, ids,
//! and alias order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{CandidateEntry, CanonicalEntry, FormPair};
use crate::errors::PipelineError;
use crate::matcher::QueryMatches;
use crate::types::{EntryId, GroupId, Query};

/// Policy for queries that returned more than one candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMode {
    /// Use only the first candidate, then merge-or-create as for unique queries.
    FirstOnly,
    /// Alias to the first entry any candidate matches; otherwise create from
    /// the first candidate.
    #[default]
    FirstMatchElseNew,
    /// Create from the first candidate with no matching entry; otherwise alias
    /// to the last entry matched while scanning.
    FirstUnmatchedElseBest,
}

impl ResolveMode {
    /// Config and CLI name of the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            ResolveMode::FirstOnly => "first-only",
            ResolveMode::FirstMatchElseNew => "first-match-else-new",
            ResolveMode::FirstUnmatchedElseBest => "first-unmatched-else-best",
        }
    }
}

/// Full field equality.
pub fn strict_match(a: &CandidateEntry, b: &CandidateEntry) -> bool {
    a == b
}

/// Same writing and reading, same set of other forms, and the same number of
/// sense groups. Sense contents and tags are ignored.
pub fn relaxed_match(a: &CandidateEntry, b: &CandidateEntry) -> bool {
    a.writing == b.writing
        && a.reading == b.reading
        && a.sense_groups.len() == b.sense_groups.len()
        && same_form_set(&a.other_forms, &b.other_forms)
}

fn same_form_set(a: &[FormPair], b: &[FormPair]) -> bool {
    let left: HashSet<&FormPair> = a.iter().collect();
    let right: HashSet<&FormPair> = b.iter().collect();
    left == right
}

/// Counters for one `EntryResolver::resolve` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Queries with exactly one candidate.
    pub unique: usize,
    /// Queries with more than one candidate.
    pub ambiguous: usize,
    /// Queries with no candidate.
    pub dropped: usize,
    /// Canonical entries created.
    pub created: usize,
    /// Queries aliased onto an existing entry.
    pub merged: usize,
}

/// Accumulates canonical entries across resolve calls.
#[derive(Clone, Debug)]
pub struct EntryResolver {
    mode: ResolveMode,
    entries: Vec<CanonicalEntry>,
    alias_owner: HashMap<Query, EntryId>,
    stats: ResolveStats,
}

impl EntryResolver {
    /// Empty resolver using `mode` for ambiguous queries.
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
            alias_owner: HashMap::new(),
            stats: ResolveStats::default(),
        }
    }

    /// Policy for ambiguous queries.
    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Entries in creation order; ids equal positions.
    pub fn entries(&self) -> &[CanonicalEntry] {
        &self.entries
    }

    /// Take the resolved entries.
    pub fn into_entries(self) -> Vec<CanonicalEntry> {
        self.entries
    }

    /// Counters from every successful `resolve` call.
    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Entry that owns `query` as an alias, if any.
    pub fn entry_for_alias(&self, query: &str) -> Option<&CanonicalEntry> {
        self.alias_owner
            .get(query)
            .and_then(|id| self.entries.get(*id as usize))
    }

    /// Merge every query into the entry list.
    ///
    /// On error (a duplicate alias) the resolver is left exactly as it was
    /// before the call.
    pub fn resolve(&mut self, matches: &[QueryMatches]) -> Result<(), PipelineError> {
        let mut scratch = self.clone();
        scratch.resolve_in_place(matches)?;
        info!(
            "[vocab:resolve] mode={} unique={} ambiguous={} dropped={} created={} merged={}",
            scratch.mode.as_str(),
            scratch.stats.unique,
            scratch.stats.ambiguous,
            scratch.stats.dropped,
            scratch.stats.created,
            scratch.stats.merged
        );
        *self = scratch;
        Ok(())
    }

    fn resolve_in_place(&mut self, matches: &[QueryMatches]) -> Result<(), PipelineError> {
        let mut ambiguous = Vec::new();
        for query in matches {
            match query.candidates.len() {
                0 => self.stats.dropped += 1,
                1 => {
                    self.stats.unique += 1;
                    self.merge_or_create(&query.query, query.group_id, &query.candidates[0])?;
                }
                _ => {
                    self.stats.ambiguous += 1;
                    ambiguous.push(query);
                }
            }
        }
        for query in ambiguous {
            match self.mode {
                ResolveMode::FirstOnly => {
                    self.merge_or_create(&query.query, query.group_id, &query.candidates[0])?;
                }
                ResolveMode::FirstMatchElseNew => self.first_match_else_new(query)?,
                ResolveMode::FirstUnmatchedElseBest => self.first_unmatched_else_best(query)?,
            }
        }
        Ok(())
    }

    /// First entry (in id order) that relaxed-matches `candidate`.
    pub fn find_relaxed(&self, candidate: &CandidateEntry) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|entry| relaxed_match(&entry.representative, candidate))
            .map(|entry| entry.id)
    }

    fn merge_or_create(
        &mut self,
        query: &str,
        group_id: GroupId,
        candidate: &CandidateEntry,
    ) -> Result<(), PipelineError> {
        match self.find_relaxed(candidate) {
            Some(entry_id) => self.add_alias(entry_id, query, group_id),
            None => self.create_entry(candidate, query, group_id).map(|_| ()),
        }
    }

    fn first_match_else_new(&mut self, query: &QueryMatches) -> Result<(), PipelineError> {
        for candidate in &query.candidates {
            if let Some(entry_id) = self.find_relaxed(candidate) {
                return self.add_alias(entry_id, &query.query, query.group_id);
            }
        }
        self.create_entry(&query.candidates[0], &query.query, query.group_id)
            .map(|_| ())
    }

    fn first_unmatched_else_best(&mut self, query: &QueryMatches) -> Result<(), PipelineError> {
        let mut first_unmatched = None;
        let mut best_match = None;
        for candidate in &query.candidates {
            match self.find_relaxed(candidate) {
                Some(entry_id) => best_match = Some(entry_id),
                None => {
                    if first_unmatched.is_none() {
                        first_unmatched = Some(candidate);
                    }
                }
            }
        }
        if let Some(candidate) = first_unmatched {
            self.create_entry(candidate, &query.query, query.group_id)?;
        } else if let Some(entry_id) = best_match {
            self.add_alias(entry_id, &query.query, query.group_id)?;
        }
        Ok(())
    }

    /// Append `query` to the aliases of `entry_id`.
    ///
    /// Fails without mutating anything when `query` is already an alias of
    /// any entry.
    pub fn add_alias(
        &mut self,
        entry_id: EntryId,
        query: &str,
        group_id: GroupId,
    ) -> Result<(), PipelineError> {
        self.check_unaliased(query)?;
        let Some(entry) = self.entries.get_mut(entry_id as usize) else {
            return Err(PipelineError::Configuration(format!(
                "canonical entry {entry_id} does not exist"
            )));
        };
        entry.alias_queries.push(query.to_string());
        if !entry.source_group_ids.contains(&group_id) {
            entry.source_group_ids.push(group_id);
        }
        self.alias_owner.insert(query.to_string(), entry_id);
        self.stats.merged += 1;
        debug!("[vocab:resolve] '{}' aliased to entry {}", query, entry_id);
        Ok(())
    }

    /// Append a new entry represented by `candidate` with `query` as its only alias.
    pub fn create_entry(
        &mut self,
        candidate: &CandidateEntry,
        query: &str,
        group_id: GroupId,
    ) -> Result<EntryId, PipelineError> {
        self.check_unaliased(query)?;
        let id = self.entries.len() as EntryId;
        self.entries.push(CanonicalEntry {
            id,
            representative: candidate.clone(),
            alias_queries: vec![query.to_string()],
            source_group_ids: vec![group_id],
            linked_secondary_queries: Vec::new(),
        });
        self.alias_owner.insert(query.to_string(), id);
        self.stats.created += 1;
        Ok(id)
    }

    fn check_unaliased(&self, query: &str) -> Result<(), PipelineError> {
        match self.alias_owner.get(query) {
            Some(owner) => Err(PipelineError::DuplicateAlias {
                entry_id: *owner,
                query: query.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SenseGroup;

    fn sense(gloss: &str) -> SenseGroup {
        SenseGroup {
            parts_of_speech: vec!["noun".into()],
            glosses: vec![gloss.into()],
        }
    }

    fn cat() -> CandidateEntry {
        CandidateEntry::new("猫", "ねこ").with_sense_group(sense("cat"))
    }

    fn root() -> CandidateEntry {
        CandidateEntry::new("根子", "ねこ").with_sense_group(sense("root"))
    }

    fn q(query: &str, group_id: GroupId, candidates: Vec<CandidateEntry>) -> QueryMatches {
        QueryMatches::new(query, group_id, candidates)
    }

    fn aliases(resolver: &EntryResolver) -> Vec<Vec<&str>> {
        resolver
            .entries()
            .iter()
            .map(|e| e.alias_queries.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn relaxed_match_ignores_sense_contents_and_form_order() {
        let a = CandidateEntry::new("猫", "ねこ")
            .with_other_form("ネコ", "ねこ")
            .with_other_form("貓", "ねこ")
            .with_sense_group(sense("cat"));
        let b = CandidateEntry::new("猫", "ねこ")
            .with_other_form("貓", "ねこ")
            .with_other_form("ネコ", "ねこ")
            .with_sense_group(sense("feline"));
        assert!(relaxed_match(&a, &b));
        assert!(!strict_match(&a, &b));
        assert!(strict_match(&a, &a.clone()));

        let extra_group = b.clone().with_sense_group(sense("shamisen"));
        assert!(!relaxed_match(&a, &extra_group));
        let other_form = b.clone().with_other_form("ねこ", "ねこ");
        assert!(!relaxed_match(&a, &other_form));
        assert!(!relaxed_match(&a, &CandidateEntry::new("猫", "びょう")));
    }

    #[test]
    fn unique_queries_merge_or_create() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstOnly);
        resolver
            .resolve(&[
                q("猫", 0, vec![cat()]),
                q("ねこ", 1, vec![cat()]),
                q("根子", 2, vec![root()]),
                q("xyz", 3, vec![]),
            ])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["猫", "ねこ"], vec!["根子"]]);
        assert_eq!(resolver.entries()[0].source_group_ids, vec![0, 1]);
        assert_eq!(resolver.entries()[1].id, 1);
        assert_eq!(
            resolver.stats(),
            ResolveStats {
                unique: 3,
                ambiguous: 0,
                dropped: 1,
                created: 2,
                merged: 1
            }
        );
        assert_eq!(resolver.entry_for_alias("ねこ").unwrap().id, 0);
    }

    #[test]
    fn unique_queries_resolve_before_ambiguous_ones() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstOnly);
        resolver
            .resolve(&[q("ねこ", 0, vec![root(), cat()]), q("猫", 1, vec![cat()])])
            .unwrap();
        assert_eq!(resolver.entries()[0].representative, cat());
        assert_eq!(aliases(&resolver), vec![vec!["猫"], vec!["ねこ"]]);
    }

    #[test]
    fn first_only_ignores_later_candidates() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstOnly);
        resolver
            .resolve(&[q("猫", 0, vec![cat()]), q("ねこ", 1, vec![root(), cat()])])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["猫"], vec!["ねこ"]]);
        assert_eq!(resolver.entries()[1].representative, root());
    }

    #[test]
    fn first_match_else_new_aliases_any_matching_candidate() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
        resolver
            .resolve(&[q("猫", 0, vec![cat()]), q("ねこ", 1, vec![root(), cat()])])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["猫", "ねこ"]]);
    }

    #[test]
    fn first_match_else_new_merges_swapped_ambiguous_queries() {
        let a = cat();
        let b = CandidateEntry::new("猫", "ねこ").with_sense_group(sense("kitty"));
        assert!(relaxed_match(&a, &b));
        let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
        resolver
            .resolve(&[
                q("Q1", 0, vec![a.clone(), b.clone()]),
                q("Q2", 1, vec![b, a]),
            ])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["Q1", "Q2"]]);
    }

    #[test]
    fn first_match_else_new_creates_from_first_candidate_when_nothing_matches() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
        resolver
            .resolve(&[q("ねこ", 0, vec![root(), cat()])])
            .unwrap();
        assert_eq!(resolver.entries().len(), 1);
        assert_eq!(resolver.entries()[0].representative, root());
    }

    #[test]
    fn first_unmatched_else_best_surfaces_missed_sense() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstUnmatchedElseBest);
        resolver
            .resolve(&[q("猫", 0, vec![cat()]), q("ねこ", 1, vec![cat(), root()])])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["猫"], vec!["ねこ"]]);
        assert_eq!(resolver.entries()[1].representative, root());
    }

    #[test]
    fn first_unmatched_else_best_aliases_last_match_when_all_known() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstUnmatchedElseBest);
        resolver
            .resolve(&[
                q("猫", 0, vec![cat()]),
                q("根子", 1, vec![root()]),
                q("ねこ", 2, vec![cat(), root()]),
            ])
            .unwrap();
        assert_eq!(aliases(&resolver), vec![vec!["猫"], vec!["根子", "ねこ"]]);
    }

    #[test]
    fn duplicate_alias_is_rejected_without_changing_state() {
        let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
        resolver
            .resolve(&[q("猫", 0, vec![cat()]), q("根子", 1, vec![root()])])
            .unwrap();
        let entries_before = resolver.entries().to_vec();
        let stats_before = resolver.stats();

        let err = resolver
            .resolve(&[q("ねこ", 2, vec![cat()]), q("猫", 0, vec![cat()])])
            .unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(
            err,
            PipelineError::DuplicateAlias { entry_id: 0, ref query } if query == "猫"
        ));
        assert_eq!(resolver.entries(), entries_before.as_slice());
        assert_eq!(resolver.stats(), stats_before);
        assert!(resolver.entry_for_alias("ねこ").is_none());

        let err = resolver.add_alias(1, "猫", 0).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateAlias { .. }));
        assert_eq!(resolver.entries(), entries_before.as_slice());
    }

    #[test]
    fn resolve_is_deterministic() {
        let input = vec![
            q("ねこ", 0, vec![root(), cat()]),
            q("猫", 1, vec![cat()]),
            q("根子", 2, vec![root()]),
            q("neko", 3, vec![cat(), root()]),
        ];
        for mode in [
            ResolveMode::FirstOnly,
            ResolveMode::FirstMatchElseNew,
            ResolveMode::FirstUnmatchedElseBest,
        ] {
            let mut first = EntryResolver::new(mode);
            first.resolve(&input).unwrap();
            let mut second = EntryResolver::new(mode);
            second.resolve(&input).unwrap();
            assert_eq!(first.entries(), second.entries(), "mode {}", mode.as_str());
        }
    }
}
