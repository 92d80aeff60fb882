use std::sync::Arc;

use vocab_resolve::matcher::QueryMatches;
use vocab_resolve::{
    ArtifactStore, AttachConfig, CandidateEntry, CanonicalEntry, EntryResolver,
    InMemoryEventSource, InMemoryLookup, LinkerConfig, MemoryArtifactStore, PipelineConfig,
    PipelineController, PipelineError, PipelineServices, ResolveMode, RunFlags, SecondaryResult,
    SenseGroup, Stage, TargetKind,
};

fn sense(gloss: &str) -> SenseGroup {
    SenseGroup {
        parts_of_speech: vec!["noun".into()],
        glosses: vec![gloss.into()],
    }
}

fn note(query: &str, writing: &str, reading: &str, richness: u32) -> SecondaryResult {
    SecondaryResult {
        source_query: query.to_string(),
        source: "notes".into(),
        title_writing: writing.to_string(),
        title_reading: reading.to_string(),
        richness,
        content: Vec::new(),
        is_empty: false,
    }
}

fn run_pipeline(
    history: &[(&str, i64)],
    primary: InMemoryLookup<Vec<CandidateEntry>>,
    secondary: Arc<InMemoryLookup<SecondaryResult>>,
    config: PipelineConfig,
) -> (Arc<MemoryArtifactStore>, PipelineController) {
    let store = Arc::new(MemoryArtifactStore::new());
    let services = PipelineServices {
        event_sources: vec![Box::new(InMemoryEventSource::from_queries(
            "history",
            history.iter().copied(),
        ))],
        primary: Box::new(primary),
        secondary: Box::new(secondary),
    };
    let mut pipeline = PipelineController::new(store.clone(), services, config).unwrap();
    pipeline.run(&RunFlags::new()).unwrap();
    (store, pipeline)
}

fn entries(pipeline: &PipelineController) -> Vec<CanonicalEntry> {
    pipeline
        .final_artifact()
        .unwrap()
        .unwrap()
        .entries
        .into_iter()
        .map(|entry| entry.entry)
        .collect()
}

#[test]
fn swapped_candidate_order_merges_into_one_entry() {
    let a = CandidateEntry::new("猫", "ねこ").with_sense_group(sense("cat"));
    let b = CandidateEntry::new("猫", "ねこ").with_sense_group(sense("feline"));
    let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
    resolver
        .resolve(&[
            QueryMatches::new("q1", 0, vec![a.clone(), b.clone()]),
            QueryMatches::new("q2", 1, vec![b, a]),
        ])
        .unwrap();
    assert_eq!(resolver.entries().len(), 1);
    assert_eq!(resolver.entries()[0].alias_queries, vec!["q1", "q2"]);
    assert_eq!(resolver.entries()[0].source_group_ids, vec![0, 1]);

    let cat = CandidateEntry::new("猫", "ねこ");
    let root = CandidateEntry::new("根子", "ねこ");
    let mut resolver = EntryResolver::new(ResolveMode::FirstMatchElseNew);
    resolver
        .resolve(&[
            QueryMatches::new("q1", 0, vec![cat.clone(), root.clone()]),
            QueryMatches::new("q2", 1, vec![root, cat]),
        ])
        .unwrap();
    assert_eq!(resolver.entries().len(), 1);
    assert_eq!(
        resolver.entry_for_alias("q2").map(|entry| entry.id),
        Some(0)
    );
}

#[test]
fn duplicate_alias_is_fatal_and_leaves_state_unchanged() {
    let mut resolver = EntryResolver::new(ResolveMode::FirstOnly);
    resolver
        .resolve(&[QueryMatches::new("猫", 0, vec![CandidateEntry::new("猫", "ねこ")])])
        .unwrap();
    let before = resolver.entries().to_vec();

    let err = resolver.add_alias(0, "猫", 1).unwrap_err();
    assert!(err.is_invariant_violation());
    assert!(matches!(err, PipelineError::DuplicateAlias { entry_id: 0, .. }));
    assert_eq!(resolver.entries(), before.as_slice());

    let err = resolver
        .resolve(&[
            QueryMatches::new("犬", 1, vec![CandidateEntry::new("犬", "いぬ")]),
            QueryMatches::new("猫", 2, vec![CandidateEntry::new("猫", "ねこ")]),
        ])
        .unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateAlias { .. }));
    assert_eq!(resolver.entries(), before.as_slice());
    assert!(resolver.entry_for_alias("犬").is_none());
}

fn ambiguous_primary() -> InMemoryLookup<Vec<CandidateEntry>> {
    InMemoryLookup::new("dict")
        .with_record("猫", vec![CandidateEntry::new("猫", "ねこ")])
        .with_record(
            "ねこ",
            vec![
                CandidateEntry::new("猫", "ねこ"),
                CandidateEntry::new("根子", "ねこ"),
            ],
        )
}

#[test]
fn resolve_modes_handle_the_ambiguous_query_differently() {
    let history = [("ねこ", 1), ("猫", 2)];
    let writings = |mode: ResolveMode| {
        let config = PipelineConfig {
            resolve_mode: mode,
            ..PipelineConfig::default()
        };
        let secondary = Arc::new(InMemoryLookup::new("notes"));
        let (_, pipeline) = run_pipeline(&history, ambiguous_primary(), secondary, config);
        entries(&pipeline)
            .into_iter()
            .map(|entry| (entry.representative.writing, entry.alias_queries))
            .collect::<Vec<_>>()
    };

    let merged = vec![("猫".to_string(), vec!["猫".to_string(), "ねこ".to_string()])];
    assert_eq!(writings(ResolveMode::FirstOnly), merged);
    assert_eq!(writings(ResolveMode::FirstMatchElseNew), merged);
    assert_eq!(
        writings(ResolveMode::FirstUnmatchedElseBest),
        vec![
            ("猫".to_string(), vec!["猫".to_string()]),
            ("根子".to_string(), vec!["ねこ".to_string()]),
        ]
    );
}

#[test]
fn identical_input_yields_identical_resolve_artifacts() {
    let history = [("ねこ", 1), ("猫", 2), ("ねこ", 3)];
    let bytes = || {
        let secondary = Arc::new(InMemoryLookup::new("notes"));
        let (store, _) = run_pipeline(
            &history,
            ambiguous_primary(),
            secondary,
            PipelineConfig::default(),
        );
        store.read(&Stage::Resolve.artifact_key()).unwrap().unwrap()
    };
    assert_eq!(bytes(), bytes());
}

#[test]
fn priority_tier_is_exhaustive_and_backup_short_circuits() {
    let primary = InMemoryLookup::new("dict")
        .with_record(
            "ねこ",
            vec![CandidateEntry::new("猫", "ねこ").with_other_form("ネコ", "ねこ")],
        )
        .with_record(
            "火",
            vec![CandidateEntry::new("火", "ひ").with_other_form("灬", "ひ")],
        );
    let secondary = Arc::new(
        InMemoryLookup::new("notes")
            .with_record("ねこ", note("ねこ", "猫", "ねこ", 1))
            .with_record("猫", note("猫", "猫", "ねこ", 2))
            .with_record("ネコ", note("ネコ", "猫", "ねこ", 3))
            .with_record("ひ", note("ひ", "火", "ひ", 1))
            .with_record("灬", note("灬", "火", "ひ", 5)),
    );
    let config = PipelineConfig {
        linker: LinkerConfig {
            priority_targets: vec![TargetKind::AliasQuery, TargetKind::RepresentativeWriting],
            backup_targets: vec![TargetKind::RepresentativeReading, TargetKind::OtherFormWriting],
        },
        ..PipelineConfig::default()
    };
    let (_, pipeline) = run_pipeline(
        &[("ねこ", 1), ("火", 2)],
        primary,
        secondary.clone(),
        config,
    );

    let linked: Vec<Vec<String>> = entries(&pipeline)
        .into_iter()
        .map(|entry| entry.linked_secondary_queries)
        .collect();
    assert_eq!(linked[0], vec!["ねこ", "猫"]);
    assert_eq!(linked[1], vec!["ひ"]);

    let calls = secondary.calls();
    assert!(!calls.iter().any(|query| query == "ネコ"));
    assert!(!calls.iter().any(|query| query == "灬"));
    assert_eq!(calls, vec!["ねこ", "猫", "火", "ひ"]);
}

#[test]
fn attachment_tie_breaks_follow_pass_order_then_richness() {
    let primary = InMemoryLookup::new("dict")
        .with_record("猫", vec![CandidateEntry::new("猫", "ねこ")])
        .with_record("ねこ", vec![CandidateEntry::new("猫", "ねこ")])
        .with_record("火", vec![CandidateEntry::new("火", "ひ")])
        .with_record("ひ", vec![CandidateEntry::new("火", "ひ")]);
    let secondary = Arc::new(
        InMemoryLookup::new("notes")
            .with_record("猫", note("猫", "猫", "ネコ", 2))
            .with_record("ねこ", note("ねこ", "犬", "いぬ", 9))
            .with_record("火", note("火", "火", "か", 3))
            .with_record("ひ", note("ひ", "火", "ほ", 7)),
    );
    let (_, pipeline) = run_pipeline(
        &[("猫", 1), ("ねこ", 2), ("火", 3), ("ひ", 4)],
        primary,
        secondary,
        PipelineConfig::default(),
    );
    let artifact = pipeline.final_artifact().unwrap().unwrap();
    assert_eq!(artifact.len(), 2);

    let cat = &artifact.entries[0];
    assert_eq!(cat.entry.linked_secondary_queries, vec!["猫", "ねこ"]);
    let attached = cat.attached.as_ref().unwrap();
    assert_eq!((attached.title_reading.as_str(), attached.richness), ("ネコ", 2));

    let fire = &artifact.entries[1];
    assert_eq!(fire.entry.linked_secondary_queries, vec!["火", "ひ"]);
    let attached = fire.attached.as_ref().unwrap();
    assert_eq!((attached.source_query.as_str(), attached.richness), ("ひ", 7));
}

#[test]
fn preferred_source_breaks_richness_ties() {
    let mut pitch = note("ひ", "火", "ほ", 4);
    pitch.source = "pitch".into();
    let secondary = Arc::new(
        InMemoryLookup::new("notes")
            .with_record("火", note("火", "火", "か", 4))
            .with_record("ひ", pitch),
    );
    let attached_source = |preferred: Option<&str>| {
        let config = PipelineConfig {
            attach: AttachConfig {
                preferred_source: preferred.map(str::to_string),
            },
            ..PipelineConfig::default()
        };
        let (_, pipeline) = run_pipeline(
            &[("火", 1), ("ひ", 2)],
            fire_primary(),
            secondary.clone(),
            config,
        );
        let artifact = pipeline.final_artifact().unwrap().unwrap();
        artifact.entries[0].attached.as_ref().unwrap().source.clone()
    };
    assert_eq!(attached_source(None), "notes");
    assert_eq!(attached_source(Some("pitch")), "pitch");
}

fn fire_primary() -> InMemoryLookup<Vec<CandidateEntry>> {
    InMemoryLookup::new("dict")
        .with_record("火", vec![CandidateEntry::new("火", "ひ")])
        .with_record("ひ", vec![CandidateEntry::new("火", "ひ")])
}
