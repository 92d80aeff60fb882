//! Secondary-result attachment with a deterministic tie-break.
//!
//! With more than one linked result, three narrowing passes run in order:
//! title reading vs entry reading (script-normalized), title writing vs entry
//! reading (script-normalized), then title writing vs entry writing (literal).
//! The first pass that leaves exactly one result wins. A pass that leaves more
//! than one hands its survivors to the richness ranking; when every pass
//! leaves none, all results are ranked.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{CanonicalEntry, FinalArtifact, FinalEntry, SecondaryResult};
use crate::errors::PipelineError;
use crate::lookup::read_cached;
use crate::store::ArtifactStore;
use crate::types::ProviderName;
use crate::utils::normalize_script;

/// Attachment settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    /// Provider preferred when the richness ranking ends in a tie.
    pub preferred_source: Option<ProviderName>,
}

/// How an attachment decision was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachDecision {
    /// No result to attach.
    Nothing,
    /// Exactly one result was linked.
    Single,
    /// Narrowed to one by title reading.
    ReadingMatch,
    /// Narrowed to one by title writing against the entry reading.
    WritingAsReadingMatch,
    /// Narrowed to one by title writing against the entry writing.
    WritingMatch,
    /// Chosen by maximum richness.
    Richness,
    /// Results were linked but none could be chosen.
    Exhausted,
}

/// Pick at most one of `results` for `entry`.
///
/// `results` must already be in linked-query order; the ranking never reorders
/// them, so ties resolve to the first scanned result.
pub fn choose_secondary<'r>(
    entry: &CanonicalEntry,
    results: &'r [SecondaryResult],
    config: &AttachConfig,
) -> (Option<&'r SecondaryResult>, AttachDecision) {
    match results {
        [] => return (None, AttachDecision::Nothing),
        [only] => return (Some(only), AttachDecision::Single),
        _ => {}
    }
    let representative = &entry.representative;
    let reading = normalize_script(&representative.reading);

    let mut pool: Vec<&SecondaryResult> = results.iter().collect();
    for pass in Pass::ORDER {
        let survivors: Vec<&SecondaryResult> = results
            .iter()
            .filter(|r| pass.keeps(r, &reading, &representative.writing))
            .collect();
        match survivors.len() {
            0 => continue,
            1 => return (Some(survivors[0]), pass.decision()),
            _ => {
                pool = survivors;
                break;
            }
        }
    }

    match rank_by_richness(&pool, config.preferred_source.as_deref()) {
        Some(chosen) => (Some(chosen), AttachDecision::Richness),
        None => (None, AttachDecision::Exhausted),
    }
}

/// One narrowing pass over the linked results.
#[derive(Clone, Copy)]
enum Pass {
    Reading,
    WritingAsReading,
    Writing,
}

impl Pass {
    const ORDER: [Pass; 3] = [Pass::Reading, Pass::WritingAsReading, Pass::Writing];

    /// `entry_reading` must already be script-normalized.
    fn keeps(self, result: &SecondaryResult, entry_reading: &str, entry_writing: &str) -> bool {
        match self {
            Pass::Reading => normalize_script(&result.title_reading) == entry_reading,
            Pass::WritingAsReading => normalize_script(&result.title_writing) == entry_reading,
            Pass::Writing => result.title_writing == entry_writing,
        }
    }

    fn decision(self) -> AttachDecision {
        match self {
            Pass::Reading => AttachDecision::ReadingMatch,
            Pass::WritingAsReading => AttachDecision::WritingAsReadingMatch,
            Pass::Writing => AttachDecision::WritingMatch,
        }
    }
}

/// Highest-richness result; ties go to the preferred provider if any tied
/// result carries it, otherwise to the first tied result.
fn rank_by_richness<'r>(
    pool: &[&'r SecondaryResult],
    preferred_source: Option<&str>,
) -> Option<&'r SecondaryResult> {
    let best = pool.iter().map(|r| r.richness).max()?;
    let tied: Vec<&'r SecondaryResult> = pool
        .iter()
        .copied()
        .filter(|r| r.richness == best)
        .collect();
    if let Some(preferred) = preferred_source
        && let Some(hit) = tied.iter().find(|r| r.source == preferred)
    {
        return Some(*hit);
    }
    tied.first().copied()
}

/// Counters for one attachment pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachStats {
    /// Entries that received a result.
    pub attached: usize,
    /// Entries left without a result.
    pub unattached: usize,
    /// Entries whose choice needed the richness ranking.
    pub by_richness: usize,
    /// Entries with linked queries but nothing attachable.
    pub exhausted: usize,
}

/// Resolve an entry's linked queries to cached, non-empty results.
pub fn linked_results(
    store: &dyn ArtifactStore,
    entry: &CanonicalEntry,
) -> Result<Vec<SecondaryResult>, PipelineError> {
    let mut results = Vec::with_capacity(entry.linked_secondary_queries.len());
    for query in &entry.linked_secondary_queries {
        match read_cached::<SecondaryResult>(store, query)? {
            Some(result) if !result.is_empty => results.push(result),
            _ => {}
        }
    }
    Ok(results)
}

/// Attach at most one secondary result to each entry, preserving entry order.
pub fn attach_all(
    store: &dyn ArtifactStore,
    entries: &[CanonicalEntry],
    config: &AttachConfig,
) -> Result<(FinalArtifact, AttachStats), PipelineError> {
    let mut artifact = FinalArtifact::default();
    let mut stats = AttachStats::default();
    for entry in entries {
        let results = linked_results(store, entry)?;
        let (chosen, mut decision) = choose_secondary(entry, &results, config);
        if chosen.is_none() && !entry.linked_secondary_queries.is_empty() {
            decision = AttachDecision::Exhausted;
        }
        match decision {
            AttachDecision::Richness => stats.by_richness += 1,
            AttachDecision::Exhausted => {
                stats.exhausted += 1;
                warn!(
                    "[vocab:attach] entry {} ('{}') has {} linked queries but nothing attachable",
                    entry.id,
                    entry.representative.writing,
                    entry.linked_secondary_queries.len()
                );
            }
            _ => {}
        }
        if chosen.is_some() {
            stats.attached += 1;
        } else {
            stats.unattached += 1;
        }
        artifact.entries.push(FinalEntry {
            entry: entry.clone(),
            attached: chosen.cloned(),
        });
    }
    info!(
        "[vocab:attach] attached={} unattached={} by_richness={} exhausted={}",
        stats.attached, stats.unattached, stats.by_richness, stats.exhausted
    );
    Ok((artifact, stats))
}
