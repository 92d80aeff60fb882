use std::io;

use thiserror::Error;

use crate::types::{ArtifactKey, EntryId, Query};

/// Error type for pipeline configuration, persistence, and invariant failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The artifact store failed to read, write, or open.
    #[error("artifact store failure: {0}")]
    ArtifactStore(String),
    /// A non-overwriting write hit an existing key.
    #[error("artifact '{key}' already exists and overwrite was not requested")]
    ArtifactConflict {
        /// Key that was already present.
        key: ArtifactKey,
    },
    /// A stage ran without the upstream artifact it reads.
    #[error("stage '{stage}' requires missing upstream artifact '{key}'")]
    MissingArtifact {
        /// Stage that needed the artifact.
        stage: &'static str,
        /// Key of the missing artifact.
        key: ArtifactKey,
    },
    /// A query would become the alias of a second canonical entry.
    #[error("query '{query}' is already an alias of canonical entry {entry_id}")]
    DuplicateAlias {
        /// Entry that already owns the query.
        entry_id: EntryId,
        /// Query being aliased twice.
        query: Query,
    },
    /// Every event source failed to load.
    #[error("no event source could be loaded: {0}")]
    NoEvents(String),
    /// Invalid configuration or CLI input.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON encoding or decoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Returns `true` for errors that signal a broken pipeline invariant.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingArtifact { .. } | PipelineError::DuplicateAlias { .. }
        )
    }
}

/// Failure reported by a lookup collaborator for a single query.
///
/// A source that answers "no result" does not produce an error; it returns
/// `Ok(None)` and the empty answer is cached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The collaborator could not answer now; retry on a later run.
    #[error("transient fetch failure for '{query}': {reason}")]
    Transient {
        /// Query that failed.
        query: Query,
        /// Collaborator-supplied reason.
        reason: String,
    },
}

impl FetchError {
    /// Build a transient failure for `query`.
    pub fn transient(query: impl Into<Query>, reason: impl Into<String>) -> Self {
        FetchError::Transient {
            query: query.into(),
            reason: reason.into(),
        }
    }
}
