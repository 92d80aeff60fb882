/// Constants used by artifact-store persistence and wire encoding.
pub mod store {
    /// Key used for the store-level version header.
    pub const STORE_HEADER_KEY: &[u8] = b"__store__";
    /// Version tag for store header compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for typed artifact records.
    pub const ARTIFACT_RECORD_VERSION: u8 = 1;
    /// Default directory for persisted artifact-store files.
    pub const DEFAULT_STORE_DIR: &str = ".vocab_store";
    /// Default filename for persisted artifact-store files.
    pub const DEFAULT_STORE_FILENAME: &str = "artifacts.bin";
}

/// Constants used by the pipeline controller and its metadata record.
pub mod pipeline {
    /// Key used for persisted pipeline metadata (dirty bits and checksums).
    pub const METADATA_KEY: &str = "__meta__";
    /// Version tag for persisted pipeline metadata payloads.
    pub const METADATA_RECORD_VERSION: u8 = 2;
    /// Key prefix for per-stage output artifacts.
    pub const ARTIFACT_PREFIX: &str = "artifact:";
    /// Stage name for event-log ingestion.
    pub const STAGE_INGEST: &str = "ingest";
    /// Stage name for query grouping.
    pub const STAGE_GROUP: &str = "group";
    /// Stage name for primary-source lookups.
    pub const STAGE_PRIMARY_LOOKUP: &str = "primaryLookup";
    /// Stage name for canonical entry resolution.
    pub const STAGE_RESOLVE: &str = "resolve";
    /// Stage name for secondary-source linking.
    pub const STAGE_SECONDARY_LINK: &str = "secondaryLink";
    /// Stage name for secondary-result attachment.
    pub const STAGE_SECONDARY_ATTACH: &str = "secondaryAttach";
}

/// Constants used by the per-query lookup caches.
pub mod lookup {
    /// Key prefix for cached primary-source candidate lists.
    pub const PRIMARY_KEY_PREFIX: &str = "primary:";
    /// Key prefix for cached secondary-source results.
    pub const SECONDARY_KEY_PREFIX: &str = "secondary:";
}

/// Constants used by script normalization.
pub mod script {
    /// First katakana code point folded to hiragana (`ァ`).
    pub const KATAKANA_FOLD_START: char = '\u{30A1}';
    /// Last katakana code point folded to hiragana (`ヶ`).
    pub const KATAKANA_FOLD_END: char = '\u{30F6}';
    /// Distance between a katakana code point and its hiragana counterpart.
    pub const KATAKANA_HIRAGANA_OFFSET: u32 = 0x60;
}
