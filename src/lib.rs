#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Secondary-result attachment and tie-break policy.
pub mod attacher;
/// Command-line runner shared by binaries and demos.
pub mod cli;
/// Pipeline configuration types.
pub mod config;
/// Centralized constants for store keys, stage names, and script folding.
pub mod constants;
/// Event, entry, and artifact data types.
pub mod data;
/// Search-event sources and event-log merging.
pub mod events;
/// Query grouping.
pub mod groups;
mod hash;
/// Secondary-source linking with tiered target kinds.
pub mod linker;
/// Lookup services and their persistent caches.
pub mod lookup;
/// Literal candidate matching over the primary cache.
pub mod matcher;
/// Stage identifiers and persisted pipeline metadata.
pub mod metadata;
/// Pipeline controller and run flags.
pub mod pipeline;
/// Canonical entry resolution.
pub mod resolver;
/// Artifact stores and record framing.
pub mod store;
/// Shared type aliases.
pub mod types;
/// Text normalization helpers.
pub mod utils;

mod errors;

pub use attacher::{AttachConfig, AttachDecision, AttachStats, attach_all, choose_secondary};
pub use cli::{PipelineCli, run_pipeline_cli};
pub use config::PipelineConfig;
pub use data::{
    CandidateEntry, CanonicalEntry, EventLog, FinalArtifact, FinalEntry, FormPair, QueryGroup,
    SearchEvent, SecondaryResult, SenseGroup,
};
pub use errors::{FetchError, PipelineError};
pub use events::{EventSource, InMemoryEventSource, JsonEventSource};
pub use groups::QueryGroups;
pub use linker::{LinkStats, LinkerConfig, SecondaryLinker, TargetKind};
pub use lookup::{
    FetchStats, InMemoryLookup, LookupCache, LookupService, PrimaryService, SecondaryService,
};
pub use metadata::{PipelineMetadata, Stage};
pub use pipeline::{
    PipelineController, PipelineServices, RunFlags, RunReport, SkipReason, StageFlags,
    StageOutcome, StageStatus,
};
pub use resolver::{EntryResolver, ResolveMode, ResolveStats, relaxed_match, strict_match};
pub use store::{ArtifactStore, FileArtifactStore, MemoryArtifactStore};
pub use types::{ArtifactKey, EntryId, EventId, GroupId, ProviderName, Query, SourceGroupId};
