use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::pipeline::{
    ARTIFACT_PREFIX, METADATA_KEY, METADATA_RECORD_VERSION, STAGE_GROUP, STAGE_INGEST,
    STAGE_PRIMARY_LOOKUP, STAGE_RESOLVE, STAGE_SECONDARY_ATTACH, STAGE_SECONDARY_LINK,
};
use crate::errors::PipelineError;
use crate::store::{ArtifactStore, load_record, save_record};

/// Pipeline stages in dependency order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub enum Stage {
    /// Merge search events from every event source.
    Ingest,
    /// Group events by normalized query.
    Group,
    /// Populate the primary-source cache for every query group.
    PrimaryLookup,
    /// Match candidates and merge them into canonical entries.
    Resolve,
    /// Link canonical entries to secondary-source queries.
    SecondaryLink,
    /// Attach at most one secondary result per canonical entry.
    SecondaryAttach,
}

/// Number of pipeline stages.
pub const STAGE_COUNT: usize = 6;

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Ingest,
        Stage::Group,
        Stage::PrimaryLookup,
        Stage::Resolve,
        Stage::SecondaryLink,
        Stage::SecondaryAttach,
    ];

    /// Canonical stage name used in logs and persisted metadata.
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => STAGE_INGEST,
            Stage::Group => STAGE_GROUP,
            Stage::PrimaryLookup => STAGE_PRIMARY_LOOKUP,
            Stage::Resolve => STAGE_RESOLVE,
            Stage::SecondaryLink => STAGE_SECONDARY_LINK,
            Stage::SecondaryAttach => STAGE_SECONDARY_ATTACH,
        }
    }

    /// Position in `Stage::ALL`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stage whose dirty bit is raised when this stage's output changes.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// Store key of this stage's output artifact.
    pub fn artifact_key(self) -> String {
        format!("{ARTIFACT_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| PipelineError::Configuration(format!("unknown stage '{value}'")))
    }
}

/// Persisted form of `PipelineMetadata`.
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedMetadata {
    version: u8,
    dirty: Vec<(Stage, bool)>,
    checksums: Vec<(Stage, u64)>,
    settings: Vec<(Stage, u64)>,
}

/// Process-wide pipeline state: per-stage dirty bits, artifact checksums, and
/// fingerprints of the settings each stage last ran with.
///
/// Loaded once at the start of a run, mutated per stage, and persisted after
/// every stage so an interrupted run resumes where it stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineMetadata {
    dirty: [bool; STAGE_COUNT],
    checksums: [Option<u64>; STAGE_COUNT],
    settings: [Option<u64>; STAGE_COUNT],
}

impl Default for PipelineMetadata {
    fn default() -> Self {
        Self::fresh()
    }
}

impl PipelineMetadata {
    /// Metadata for a store that has never been run: every stage dirty.
    pub fn fresh() -> Self {
        Self {
            dirty: [true; STAGE_COUNT],
            checksums: [None; STAGE_COUNT],
            settings: [None; STAGE_COUNT],
        }
    }

    /// Load persisted metadata, or fresh metadata when none is stored.
    pub fn load(store: &dyn ArtifactStore) -> Result<Self, PipelineError> {
        let Some(persisted) = load_record::<PersistedMetadata>(store, METADATA_KEY)? else {
            return Ok(Self::fresh());
        };
        if persisted.version != METADATA_RECORD_VERSION {
            return Err(PipelineError::ArtifactStore(format!(
                "pipeline metadata version mismatch (expected {}, found {})",
                METADATA_RECORD_VERSION, persisted.version
            )));
        }
        let mut metadata = Self::fresh();
        for (stage, dirty) in persisted.dirty {
            metadata.dirty[stage.index()] = dirty;
        }
        for (stage, checksum) in persisted.checksums {
            metadata.checksums[stage.index()] = Some(checksum);
        }
        for (stage, fingerprint) in persisted.settings {
            metadata.settings[stage.index()] = Some(fingerprint);
        }
        Ok(metadata)
    }

    /// Persist the current state under the metadata key.
    pub fn persist(&self, store: &dyn ArtifactStore) -> Result<(), PipelineError> {
        let persisted = PersistedMetadata {
            version: METADATA_RECORD_VERSION,
            dirty: Stage::ALL
                .iter()
                .map(|stage| (*stage, self.dirty[stage.index()]))
                .collect(),
            checksums: Stage::ALL
                .iter()
                .filter_map(|stage| self.checksums[stage.index()].map(|sum| (*stage, sum)))
                .collect(),
            settings: Stage::ALL
                .iter()
                .filter_map(|stage| self.settings[stage.index()].map(|sum| (*stage, sum)))
                .collect(),
        };
        save_record(store, METADATA_KEY, &persisted, true)?;
        Ok(())
    }

    /// Returns `true` when `stage` needs a run.
    pub fn is_dirty(&self, stage: Stage) -> bool {
        self.dirty[stage.index()]
    }

    /// Set or clear the dirty bit of `stage`.
    pub fn set_dirty(&mut self, stage: Stage, dirty: bool) {
        self.dirty[stage.index()] = dirty;
    }

    /// Checksum of the last artifact written by `stage`.
    pub fn checksum(&self, stage: Stage) -> Option<u64> {
        self.checksums[stage.index()]
    }

    /// Record a new artifact checksum, returning `true` when it differs from
    /// the previous one.
    pub fn record_checksum(&mut self, stage: Stage, checksum: u64) -> bool {
        let previous = self.checksums[stage.index()].replace(checksum);
        previous != Some(checksum)
    }

    /// Settings fingerprint `stage` last ran with.
    pub fn settings(&self, stage: Stage) -> Option<u64> {
        self.settings[stage.index()]
    }

    /// Record the settings fingerprint of a run of `stage`.
    pub fn record_settings(&mut self, stage: Stage, fingerprint: Option<u64>) {
        self.settings[stage.index()] = fingerprint;
    }

    /// Stages whose dirty bit is currently set, in execution order.
    pub fn dirty_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.is_dirty(*stage))
            .collect()
    }
}
