use std::hash::Hash;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attacher::AttachConfig;
use crate::errors::PipelineError;
use crate::hash::stable_hash_with;
use crate::linker::LinkerConfig;
use crate::metadata::Stage;
use crate::resolver::ResolveMode;

/// Top-level pipeline configuration.
///
/// Every section is optional in JSON; missing sections take their defaults.
///
/// ```json
/// {
///   "resolve_mode": "first-unmatched-else-best",
///   "linker": { "priority_targets": ["aliasQuery"], "backup_targets": ["representativeReading"] },
///   "attach": { "preferred_source": "notes" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Candidate selection mode used by the resolve stage.
    pub resolve_mode: ResolveMode,
    /// Target kinds queried by the secondary link stage.
    pub linker: LinkerConfig,
    /// Attachment tie-break settings.
    pub attach: AttachConfig,
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.linker.validate()?;
        if let Some(source) = &self.attach.preferred_source
            && source.trim().is_empty()
        {
            return Err(PipelineError::Configuration(
                "attach.preferred_source must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Fingerprint of the settings `stage` reads, or `None` for stages that
    /// read no settings.
    pub fn stage_fingerprint(&self, stage: Stage) -> Option<u64> {
        match stage {
            Stage::Ingest | Stage::Group | Stage::PrimaryLookup => None,
            Stage::Resolve => Some(stable_hash_with(|h| self.resolve_mode.hash(h))),
            Stage::SecondaryLink => Some(stable_hash_with(|h| self.linker.hash(h))),
            Stage::SecondaryAttach => Some(stable_hash_with(|h| self.attach.hash(h))),
        }
    }
}
