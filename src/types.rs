/// Search string as typed by the user (after whitespace normalization).
/// Examples: `猫`, `ねこ`, `taberu`
pub type Query = String;
/// Identifier for the event log that produced a search event.
/// Examples: `firefox::default`, `chrome::profile-2`
pub type SourceGroupId = String;
/// Index of a search event in the merged event log.
pub type EventId = u64;
/// Index of a query group (one per unique normalized query).
pub type GroupId = u64;
/// Index of a canonical entry, assigned at append time.
pub type EntryId = u64;
/// Name of the provider that produced a secondary result.
/// Examples: `kanji_notes`, `pitch_accent`
pub type ProviderName = String;
/// Store key for a persisted artifact or cache record.
/// Examples: `artifact:resolve`, `primary:猫`
pub type ArtifactKey = String;
