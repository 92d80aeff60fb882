use std::error::Error;

use vocab_resolve::{
    CandidateEntry, InMemoryEventSource, InMemoryLookup, PipelineConfig, PipelineServices,
    SecondaryResult, SenseGroup, run_pipeline_cli,
};

fn sense(pos: &str, gloss: &str) -> SenseGroup {
    SenseGroup {
        parts_of_speech: vec![pos.to_string()],
        glosses: vec![gloss.to_string()],
    }
}

fn note(query: &str, writing: &str, reading: &str, richness: u32, source: &str) -> SecondaryResult {
    SecondaryResult {
        source_query: query.to_string(),
        source: source.to_string(),
        title_writing: writing.to_string(),
        title_reading: reading.to_string(),
        richness,
        content: (0..richness).map(|idx| format!("{writing} note {idx}")).collect(),
        is_empty: false,
    }
}

fn build_services(_config: &PipelineConfig) -> PipelineServices {
    let history = InMemoryEventSource::from_queries(
        "browser::default",
        [
            ("猫", 1_700_000_000_000_000),
            ("ねこ", 1_700_000_060_000_000),
            ("火", 1_700_000_120_000_000),
            ("  猫 ", 1_700_000_180_000_000),
            ("たべる", 1_700_000_240_000_000),
            ("ひ", 1_700_000_300_000_000),
        ],
    );

    let cat = CandidateEntry::new("猫", "ねこ")
        .with_other_form("ネコ", "ねこ")
        .with_sense_group(sense("noun", "cat"));
    let root = CandidateEntry::new("根子", "ねこ").with_sense_group(sense("noun", "root"));
    let fire = CandidateEntry::new("火", "ひ").with_sense_group(sense("noun", "fire"));
    let eat = CandidateEntry::new("食べる", "たべる")
        .with_other_form("喰べる", "たべる")
        .with_sense_group(sense("verb", "to eat"));

    let primary = InMemoryLookup::new("dictionary")
        .with_record("猫", vec![cat.clone()])
        .with_record("ねこ", vec![cat, root])
        .with_record("火", vec![fire.clone()])
        .with_record("ひ", vec![fire])
        .with_record("たべる", vec![eat]);

    let secondary = InMemoryLookup::new("kanji_notes")
        .with_record("猫", note("猫", "猫", "ネコ", 2, "kanji_notes"))
        .with_record("ねこ", note("ねこ", "犬", "いぬ", 9, "kanji_notes"))
        .with_record("火", note("火", "火", "か", 3, "kanji_notes"))
        .with_record("ひ", note("ひ", "火", "ほ", 7, "pitch_accent"))
        .with_record("食べる", note("食べる", "食べる", "たべる", 4, "kanji_notes"));

    PipelineServices {
        event_sources: vec![Box::new(history)],
        primary: Box::new(primary),
        secondary: Box::new(secondary),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    run_pipeline_cli(std::env::args().skip(1), build_services)
}
