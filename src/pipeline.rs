//! Staged, resumable pipeline controller.
//!
//! Stages run in `Stage::ALL` order. A stage runs when it is not skipped and
//! is forced, dirty, missing its artifact, or configured differently from its
//! last run. A clean stage is marked dirty before it runs. After a stage runs,
//! its artifact is written first, then its dirty bit is cleared (unless some
//! queries failed and need a retry), then the next stage is marked dirty if
//! the artifact's checksum changed, and only then is the metadata persisted.

use std::sync::Arc;

use tracing::{debug, info};

use crate::attacher::attach_all;
use crate::config::PipelineConfig;
use crate::data::{CanonicalEntry, EventLog, FinalArtifact};
use crate::errors::PipelineError;
use crate::events::{EventSource, load_event_log};
use crate::groups::QueryGroups;
use crate::linker::SecondaryLinker;
use crate::lookup::{LookupManifest, PrimaryService, SecondaryService, populate_primary_cache};
use crate::matcher::extract_matches;
use crate::metadata::{PipelineMetadata, STAGE_COUNT, Stage};
use crate::resolver::EntryResolver;
use crate::store::{ArtifactStore, load_record, save_record};

/// Per-stage run overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageFlags {
    /// Run even when clean.
    pub force_run: bool,
    /// Never run; takes precedence over `force_run`.
    pub skip: bool,
}

/// Run overrides for every stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunFlags {
    stages: [StageFlags; STAGE_COUNT],
}

impl RunFlags {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every stage to run.
    pub fn force_all() -> Self {
        Self {
            stages: [StageFlags {
                force_run: true,
                skip: false,
            }; STAGE_COUNT],
        }
    }

    /// Force `stage` to run.
    pub fn force(mut self, stage: Stage) -> Self {
        self.stages[stage.index()].force_run = true;
        self
    }

    /// Never run `stage`.
    pub fn skip(mut self, stage: Stage) -> Self {
        self.stages[stage.index()].skip = true;
        self
    }

    /// Replace the overrides of `stage`.
    pub fn set(&mut self, stage: Stage, flags: StageFlags) {
        self.stages[stage.index()] = flags;
    }

    /// Overrides of `stage`.
    pub fn for_stage(&self, stage: Stage) -> StageFlags {
        self.stages[stage.index()]
    }
}

/// Result of a stage that executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageOutcome {
    /// The artifact checksum differs from the previously recorded one.
    pub changed: bool,
    /// Some queries failed; the stage stays dirty for the next run.
    pub incomplete: bool,
}

/// Why a stage did not execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Skipped by a run flag.
    Flag,
    /// Clean and its artifact exists.
    Clean,
}

/// What happened to one stage during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage ran and wrote its artifact.
    Executed(StageOutcome),
    /// The stage did not run.
    Skipped(SkipReason),
}

/// Per-stage status of one `run`, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Every stage visited, including skipped ones.
    pub stages: Vec<(Stage, StageStatus)>,
}

impl RunReport {
    /// Status of `stage`, if the run reached it.
    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, status)| *status)
    }

    /// Stages that executed, in order.
    pub fn executed(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, status)| matches!(status, StageStatus::Executed(_)))
            .map(|(stage, _)| *stage)
            .collect()
    }
}

/// External collaborators used by the pipeline stages.
pub struct PipelineServices {
    /// History sources merged by the ingest stage.
    pub event_sources: Vec<Box<dyn EventSource>>,
    /// Primary dictionary source.
    pub primary: Box<PrimaryService>,
    /// Secondary reference source.
    pub secondary: Box<SecondaryService>,
}

struct StageWrite {
    checksum: u64,
    incomplete: bool,
}

/// Owns the metadata for one store and drives the stages over it.
pub struct PipelineController {
    store: Arc<dyn ArtifactStore>,
    services: PipelineServices,
    config: PipelineConfig,
    metadata: PipelineMetadata,
}

impl PipelineController {
    /// Validate `config` and load the store's metadata (fresh if absent).
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        services: PipelineServices,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let metadata = PipelineMetadata::load(store.as_ref())?;
        debug!(
            "[vocab:pipeline] loaded metadata; dirty stages: {:?}",
            metadata.dirty_stages()
        );
        Ok(Self {
            store,
            services,
            config,
            metadata,
        })
    }

    /// Current in-memory metadata.
    pub fn metadata(&self) -> &PipelineMetadata {
        &self.metadata
    }

    /// Validated configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Backing artifact store.
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    /// Flag `stage` as needing a run (new input arrived) and persist.
    pub fn mark_dirty(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.metadata.set_dirty(stage, true);
        self.metadata.persist(self.store.as_ref())
    }

    /// Run every stage that needs it.
    ///
    /// A stage error aborts the run; stages completed before it keep their
    /// persisted state.
    pub fn run(&mut self, flags: &RunFlags) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();
        for stage in Stage::ALL {
            let stage_flags = flags.for_stage(stage);
            if stage_flags.skip {
                debug!("[vocab:pipeline] {} skipped by flag", stage);
                report
                    .stages
                    .push((stage, StageStatus::Skipped(SkipReason::Flag)));
                continue;
            }
            let dirty = self.metadata.is_dirty(stage);
            let missing = !self.store.exists(&stage.artifact_key())?;
            let fingerprint = self.config.stage_fingerprint(stage);
            let reconfigured = matches!(
                (self.metadata.settings(stage), fingerprint),
                (Some(previous), Some(current)) if previous != current
            );
            if reconfigured {
                info!("[vocab:pipeline] {} settings changed since its last run", stage);
            }
            if !(stage_flags.force_run || dirty || missing || reconfigured) {
                debug!("[vocab:pipeline] {} clean", stage);
                report
                    .stages
                    .push((stage, StageStatus::Skipped(SkipReason::Clean)));
                continue;
            }

            info!(
                "[vocab:pipeline] running {} (force={} dirty={} missing={} reconfigured={})",
                stage, stage_flags.force_run, dirty, missing, reconfigured
            );
            // A crash after the artifact write must leave this stage dirty,
            // or its changed output would never reach the next stage.
            if !dirty {
                self.metadata.set_dirty(stage, true);
                self.metadata.persist(self.store.as_ref())?;
            }
            let write = self.execute(stage)?;
            let changed = self.metadata.record_checksum(stage, write.checksum);
            self.metadata.record_settings(stage, fingerprint);
            if !write.incomplete {
                self.metadata.set_dirty(stage, false);
            }
            if changed && let Some(next) = stage.next() {
                self.metadata.set_dirty(next, true);
            }
            self.metadata.persist(self.store.as_ref())?;

            info!(
                "[vocab:pipeline] {} done (changed={} incomplete={})",
                stage, changed, write.incomplete
            );
            report.stages.push((
                stage,
                StageStatus::Executed(StageOutcome {
                    changed,
                    incomplete: write.incomplete,
                }),
            ));
        }
        Ok(report)
    }

    /// Output of the attach stage, if it has ever run.
    pub fn final_artifact(&self) -> Result<Option<FinalArtifact>, PipelineError> {
        load_record(self.store.as_ref(), &Stage::SecondaryAttach.artifact_key())
    }

    fn execute(&self, stage: Stage) -> Result<StageWrite, PipelineError> {
        let store = self.store.as_ref();
        match stage {
            Stage::Ingest => {
                let (log, failed_sources) = load_event_log(&self.services.event_sources)?;
                self.write_artifact(stage, &log, failed_sources > 0)
            }
            Stage::Group => {
                let log: EventLog = self.require(stage, Stage::Ingest)?;
                let groups = QueryGroups::build(&log);
                info!("[vocab:group] {} query groups", groups.len());
                self.write_artifact(stage, &groups, false)
            }
            Stage::PrimaryLookup => {
                let groups: QueryGroups = self.require(stage, Stage::Group)?;
                let (manifest, stats) =
                    populate_primary_cache(store, self.services.primary.as_ref(), &groups)?;
                info!(
                    "[vocab:lookup] primary: cached={} fetched={} not_found={} failed={}",
                    manifest.entries.len(),
                    stats.fetched,
                    stats.not_found,
                    stats.failed
                );
                self.write_artifact(stage, &manifest, stats.failed > 0)
            }
            Stage::Resolve => {
                let groups: QueryGroups = self.require(stage, Stage::Group)?;
                let manifest: LookupManifest = self.require(stage, Stage::PrimaryLookup)?;
                let matches = extract_matches(store, &groups, &manifest)?;
                let mut resolver = EntryResolver::new(self.config.resolve_mode);
                resolver.resolve(&matches)?;
                let entries = resolver.into_entries();
                self.write_artifact(stage, &entries, false)
            }
            Stage::SecondaryLink => {
                let mut entries: Vec<CanonicalEntry> = self.require(stage, Stage::Resolve)?;
                let mut linker = SecondaryLinker::new(
                    &self.config.linker,
                    store,
                    self.services.secondary.as_ref(),
                );
                let stats = linker.link_all(&mut entries)?;
                self.write_artifact(stage, &entries, stats.fetch.failed > 0)
            }
            Stage::SecondaryAttach => {
                let entries: Vec<CanonicalEntry> = self.require(stage, Stage::SecondaryLink)?;
                let (artifact, _) = attach_all(store, &entries, &self.config.attach)?;
                self.write_artifact(stage, &artifact, false)
            }
        }
    }

    fn require<T: bitcode::DecodeOwned>(
        &self,
        stage: Stage,
        input: Stage,
    ) -> Result<T, PipelineError> {
        let key = input.artifact_key();
        load_record(self.store.as_ref(), &key)?.ok_or(PipelineError::MissingArtifact {
            stage: stage.as_str(),
            key,
        })
    }

    fn write_artifact<T: bitcode::Encode>(
        &self,
        stage: Stage,
        artifact: &T,
        incomplete: bool,
    ) -> Result<StageWrite, PipelineError> {
        let checksum = save_record(self.store.as_ref(), &stage.artifact_key(), artifact, true)?;
        Ok(StageWrite {
            checksum,
            incomplete,
        })
    }
}
