use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::PipelineConfig;
use crate::metadata::Stage;
use crate::pipeline::{PipelineController, PipelineServices, RunFlags, RunReport, StageStatus};
use crate::resolver::ResolveMode;
use crate::store::FileArtifactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    Ingest,
    Group,
    PrimaryLookup,
    Resolve,
    SecondaryLink,
    SecondaryAttach,
}

impl From<StageArg> for Stage {
    fn from(value: StageArg) -> Self {
        match value {
            StageArg::Ingest => Stage::Ingest,
            StageArg::Group => Stage::Group,
            StageArg::PrimaryLookup => Stage::PrimaryLookup,
            StageArg::Resolve => Stage::Resolve,
            StageArg::SecondaryLink => Stage::SecondaryLink,
            StageArg::SecondaryAttach => Stage::SecondaryAttach,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    FirstOnly,
    FirstMatchElseNew,
    FirstUnmatchedElseBest,
}

impl From<ModeArg> for ResolveMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::FirstOnly => ResolveMode::FirstOnly,
            ModeArg::FirstMatchElseNew => ResolveMode::FirstMatchElseNew,
            ModeArg::FirstUnmatchedElseBest => ResolveMode::FirstUnmatchedElseBest,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "vocab_pipeline",
    disable_help_subcommand = true,
    about = "Resolve harvested lookups into canonical vocabulary entries",
    long_about = "Run the ingest, group, primary lookup, resolve, secondary link, and attach stages over a persistent artifact store, re-running only what is dirty.",
    after_help = "Stage flags may be repeated. --skip wins over --force for the same stage."
)]
/// CLI for the resolution pipeline.
///
/// Common usage:
/// - Keep default store location: `.vocab_store/artifacts.bin`
/// - Set an explicit file path: `--store-path /tmp/artifacts.bin`
/// - Set a custom directory and keep default filename: `--store-dir /tmp/vocab_store`
/// - Re-run one stage and everything it changes: `--force resolve`
pub struct PipelineCli {
    #[arg(
        long = "force",
        value_enum,
        value_name = "STAGE",
        help = "Run this stage even when clean"
    )]
    force: Vec<StageArg>,
    #[arg(
        long = "skip",
        value_enum,
        value_name = "STAGE",
        help = "Never run this stage in this invocation"
    )]
    skip: Vec<StageArg>,
    #[arg(long = "force-all", help = "Run every stage that is not skipped")]
    force_all: bool,
    #[arg(
        long = "mark-dirty",
        value_enum,
        value_name = "STAGE",
        help = "Persistently flag this stage as having new input before running"
    )]
    mark_dirty: Vec<StageArg>,
    #[arg(long, value_enum, help = "Override the configured resolve mode; resolve reruns when it changes")]
    mode: Option<ModeArg>,
    #[arg(
        long = "preferred-source",
        value_name = "PROVIDER",
        help = "Provider preferred when attachment richness ties"
    )]
    preferred_source: Option<String>,
    #[arg(
        long = "config",
        value_name = "PATH",
        help = "Optional JSON pipeline configuration"
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "store-path",
        value_name = "STORE_PATH",
        help = "Optional path for the artifact store file"
    )]
    store_path: Option<PathBuf>,
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        conflicts_with = "store_path",
        help = "Optional directory for the artifact store file (uses artifacts.bin filename)"
    )]
    store_dir: Option<PathBuf>,
    #[arg(
        long = "export",
        value_name = "PATH",
        help = "Write the final artifact as pretty JSON to this path"
    )]
    export: Option<PathBuf>,
}

impl PipelineCli {
    /// Stage flags requested on the command line.
    pub fn run_flags(&self) -> RunFlags {
        let mut flags = if self.force_all {
            RunFlags::force_all()
        } else {
            RunFlags::new()
        };
        for stage in &self.force {
            flags = flags.force((*stage).into());
        }
        for stage in &self.skip {
            flags = flags.skip((*stage).into());
        }
        flags
    }

    /// Load the configuration file (or defaults) and apply CLI overrides.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.resolve_mode = mode.into();
        }
        if let Some(source) = &self.preferred_source {
            config.attach.preferred_source = Some(source.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Artifact store file selected by `--store-path`, `--store-dir`, or the default.
    pub fn store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            path.clone()
        } else if let Some(dir) = &self.store_dir {
            FileArtifactStore::default_path_in_dir(dir)
        } else {
            FileArtifactStore::default_path()
        }
    }
}

/// Parse `args_iter`, open the store, and run the pipeline with the services
/// returned by `build_services`.
pub fn run_pipeline_cli<Build, I>(args_iter: I, build_services: Build) -> Result<(), Box<dyn Error>>
where
    Build: FnOnce(&PipelineConfig) -> PipelineServices,
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<PipelineCli, _>(
        std::iter::once("vocab_pipeline".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = cli.pipeline_config()?;
    let store_path = cli.store_path();
    println!("Persisting pipeline artifacts to {}", store_path.display());
    let store = Arc::new(FileArtifactStore::open(&store_path)?);

    let services = build_services(&config);
    let mut controller = PipelineController::new(store, services, config)?;
    for stage in &cli.mark_dirty {
        controller.mark_dirty((*stage).into())?;
    }

    let report = controller.run(&cli.run_flags())?;
    print_run_report(&report);

    match controller.final_artifact()? {
        Some(artifact) => {
            println!(
                "Final artifact: {} entries ({} with attachments)",
                artifact.len(),
                artifact
                    .entries
                    .iter()
                    .filter(|entry| entry.attached.is_some())
                    .count()
            );
            if let Some(path) = &cli.export {
                std::fs::write(path, artifact.to_json_pretty()?)?;
                println!("Exported final artifact to {}", path.display());
            }
        }
        None => println!("No final artifact yet; the attach stage has not run."),
    }
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn print_run_report(report: &RunReport) {
    println!("=== pipeline run ===");
    for (stage, status) in &report.stages {
        match status {
            StageStatus::Executed(outcome) => println!(
                "  {:<16} executed (changed={}, incomplete={})",
                stage.as_str(),
                outcome.changed,
                outcome.incomplete
            ),
            StageStatus::Skipped(reason) => {
                println!("  {:<16} skipped ({:?})", stage.as_str(), reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CandidateEntry, FinalArtifact, SecondaryResult};
    use crate::events::InMemoryEventSource;
    use crate::lookup::InMemoryLookup;
    use crate::pipeline::StageFlags;
    use crate::store::{ArtifactStore, load_record};

    fn parse(args: &[&str]) -> PipelineCli {
        PipelineCli::try_parse_from(std::iter::once("vocab_pipeline").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn stage_flags_map_onto_run_flags() {
        let cli = parse(&["--force", "resolve", "--skip", "primary-lookup", "--force", "group"]);
        let flags = cli.run_flags();
        assert!(flags.for_stage(Stage::Resolve).force_run);
        assert!(flags.for_stage(Stage::Group).force_run);
        assert!(flags.for_stage(Stage::PrimaryLookup).skip);
        assert_eq!(flags.for_stage(Stage::Ingest), StageFlags::default());

        let flags = parse(&["--force-all", "--skip", "ingest"]).run_flags();
        assert!(flags.for_stage(Stage::SecondaryAttach).force_run);
        assert!(flags.for_stage(Stage::Ingest).skip);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cli = parse(&["--mode", "first-unmatched-else-best", "--preferred-source", "pitch"]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.resolve_mode, ResolveMode::FirstUnmatchedElseBest);
        assert_eq!(config.attach.preferred_source.as_deref(), Some("pitch"));
    }

    #[test]
    fn store_location_flags() {
        assert_eq!(parse(&[]).store_path(), FileArtifactStore::default_path());
        assert_eq!(
            parse(&["--store-dir", "/tmp/vs"]).store_path(),
            PathBuf::from("/tmp/vs/artifacts.bin")
        );
        assert_eq!(
            parse(&["--store-path", "/tmp/a.bin"]).store_path(),
            PathBuf::from("/tmp/a.bin")
        );
        assert!(
            PipelineCli::try_parse_from([
                "vocab_pipeline",
                "--store-path",
                "/tmp/a.bin",
                "--store-dir",
                "/tmp/vs"
            ])
            .is_err()
        );
        assert!(PipelineCli::try_parse_from(["vocab_pipeline", "--force", "nope"]).is_err());
    }

    #[test]
    fn help_is_not_an_error() {
        let parsed = parse_cli::<PipelineCli, _>(["vocab_pipeline", "--help"]).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn end_to_end_run_exports_json() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let export = dir.path().join("final.json");
        let args = vec![
            "--store-dir".to_string(),
            store_dir.display().to_string(),
            "--export".to_string(),
            export.display().to_string(),
        ];
        run_pipeline_cli(args.into_iter(), |_| PipelineServices {
            event_sources: vec![Box::new(InMemoryEventSource::from_queries(
                "history",
                [("猫", 1)],
            ))],
            primary: Box::new(
                InMemoryLookup::new("dict")
                    .with_record("猫", vec![CandidateEntry::new("猫", "ねこ")]),
            ),
            secondary: Box::new(InMemoryLookup::<SecondaryResult>::new("notes")),
        })
        .unwrap();

        let json = std::fs::read_to_string(&export).unwrap();
        let exported: FinalArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(exported.len(), 1);
        assert!(exported.entries[0].attached.is_none());

        let store = FileArtifactStore::open(&store_dir).unwrap();
        assert!(store.exists(&Stage::SecondaryAttach.artifact_key()).unwrap());
        let stored: FinalArtifact = load_record(&store, &Stage::SecondaryAttach.artifact_key())
            .unwrap()
            .unwrap();
        assert_eq!(stored, exported);
    }
}
