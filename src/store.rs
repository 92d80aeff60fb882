use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::constants::store::{
    ARTIFACT_RECORD_VERSION, BITCODE_PREFIX, DEFAULT_STORE_FILENAME, STORE_HEADER_KEY,
    STORE_VERSION,
};
use crate::errors::PipelineError;
use crate::hash::stable_hash_bytes;

pub use crate::constants::store::DEFAULT_STORE_DIR;

/// Key to versioned-blob persistence used for stage artifacts and lookup caches.
///
/// Values are whole-value blobs: a write either lands completely or not at all,
/// and existing values are only replaced when `overwrite` is set.
pub trait ArtifactStore: Send + Sync {
    /// Returns `true` when a value is stored under `key`.
    fn exists(&self, key: &str) -> Result<bool, PipelineError>;
    /// Read the blob stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;
    /// Store `blob` under `key`.
    ///
    /// Fails with `ArtifactConflict` when `key` exists and `overwrite` is false.
    fn write(&self, key: &str, blob: &[u8], overwrite: bool) -> Result<(), PipelineError>;
}

/// Encode a typed record as `[version][prefix][bitcode]`.
pub fn encode_record<T: bitcode::Encode>(value: &T) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(value));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(ARTIFACT_RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

/// Decode a typed record written by `encode_record`.
pub fn decode_record<T: bitcode::DecodeOwned>(key: &str, bytes: &[u8]) -> Result<T, PipelineError> {
    if bytes.first().copied() != Some(ARTIFACT_RECORD_VERSION) {
        return Err(PipelineError::ArtifactStore(format!(
            "record '{key}' version mismatch"
        )));
    }
    let raw = decode_bitcode_payload(&bytes[1..])?;
    bitcode::decode(&raw)
        .map_err(|err| PipelineError::ArtifactStore(format!("corrupt record '{key}': {err}")))
}

/// Read and decode the record stored under `key`.
pub fn load_record<T: bitcode::DecodeOwned>(
    store: &dyn ArtifactStore,
    key: &str,
) -> Result<Option<T>, PipelineError> {
    store
        .read(key)?
        .map(|bytes| decode_record(key, &bytes))
        .transpose()
}

/// Encode and store `value` under `key`, returning the payload checksum.
pub fn save_record<T: bitcode::Encode>(
    store: &dyn ArtifactStore,
    key: &str,
    value: &T,
    overwrite: bool,
) -> Result<u64, PipelineError> {
    let payload = encode_record(value);
    store.write(key, &payload, overwrite)?;
    Ok(stable_hash_bytes(&payload))
}

/// In-memory artifact store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| PipelineError::ArtifactStore("lock poisoned".into()))?
            .contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| PipelineError::ArtifactStore("lock poisoned".into()))?
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, blob: &[u8], overwrite: bool) -> Result<(), PipelineError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| PipelineError::ArtifactStore("lock poisoned".into()))?;
        if !overwrite && guard.contains_key(key) {
            return Err(PipelineError::ArtifactConflict {
                key: key.to_string(),
            });
        }
        guard.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// File-backed artifact store for persistent, resumable runs.
pub struct FileArtifactStore {
    store: DataStore,
    path: PathBuf,
}

impl fmt::Debug for FileArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileArtifactStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileArtifactStore {
    /// Open (or create) a file-backed artifact store at `path`.
    ///
    /// A directory path resolves to `<dir>/artifacts.bin`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, PipelineError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let store = Self { store, path };
        store.verify_header()?;
        Ok(store)
    }

    /// Default store file path under the crate's default store directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default store file path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_header(&self) -> Result<(), PipelineError> {
        match read_bytes(&self.store, STORE_HEADER_KEY)? {
            Some(bytes) => {
                let version = bytes.first().copied().unwrap_or_default();
                if version != STORE_VERSION {
                    return Err(PipelineError::ArtifactStore(format!(
                        "artifact store version mismatch (expected {}, found {})",
                        STORE_VERSION, version
                    )));
                }
            }
            None => write_bytes(&self.store, STORE_HEADER_KEY, &[STORE_VERSION])?,
        }
        Ok(())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(read_bytes(&self.store, key.as_bytes())?.is_some())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        read_bytes(&self.store, key.as_bytes())
    }

    fn write(&self, key: &str, blob: &[u8], overwrite: bool) -> Result<(), PipelineError> {
        if !overwrite && self.exists(key)? {
            return Err(PipelineError::ArtifactConflict {
                key: key.to_string(),
            });
        }
        write_bytes(&self.store, key.as_bytes(), blob)
    }
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), PipelineError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(PipelineError::ArtifactStore(
            "bitcode payload missing expected prefix".into(),
        ));
    }
    Ok(bytes[1..].to_vec())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> PipelineError {
    PipelineError::ArtifactStore(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EventLog, SearchEvent};
    use tempfile::tempdir;

    fn sample_log() -> EventLog {
        EventLog {
            events: vec![
                SearchEvent::new("猫", 10, "firefox"),
                SearchEvent::new("犬", 20, "firefox"),
            ],
        }
    }

    #[test]
    fn memory_store_refuses_silent_overwrite() {
        let store = MemoryArtifactStore::new();
        store.write("k", b"one", false).unwrap();
        let err = store.write("k", b"two", false).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactConflict { ref key } if key == "k"));
        assert_eq!(store.read("k").unwrap().as_deref(), Some(b"one".as_ref()));

        store.write("k", b"two", true).unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some(b"two".as_ref()));
        assert!(store.exists("k").unwrap());
        assert!(!store.exists("missing").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn typed_records_round_trip_through_memory_store() {
        let store = MemoryArtifactStore::new();
        let log = sample_log();
        let checksum = save_record(&store, "artifact:ingest", &log, true).unwrap();
        assert_eq!(checksum, stable_hash_bytes(&encode_record(&log)));

        let loaded: Option<EventLog> = load_record(&store, "artifact:ingest").unwrap();
        assert_eq!(loaded, Some(log));
        let missing: Option<EventLog> = load_record(&store, "artifact:group").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn decode_rejects_wrong_version_and_missing_prefix() {
        let mut bytes = encode_record(&sample_log());
        bytes[0] = ARTIFACT_RECORD_VERSION.wrapping_add(1);
        let err = decode_record::<EventLog>("k", &bytes).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));

        let bytes = vec![ARTIFACT_RECORD_VERSION, b'X', 1, 2, 3];
        let err = decode_record::<EventLog>("k", &bytes).unwrap_err();
        assert!(err.to_string().contains("missing expected prefix"));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.bin");
        {
            let store = FileArtifactStore::open(&path).unwrap();
            save_record(&store, "artifact:ingest", &sample_log(), false).unwrap();
            assert!(matches!(
                save_record(&store, "artifact:ingest", &sample_log(), false),
                Err(PipelineError::ArtifactConflict { .. })
            ));
        }
        let reopened = FileArtifactStore::open(&path).unwrap();
        assert!(reopened.exists("artifact:ingest").unwrap());
        let loaded: Option<EventLog> = load_record(&reopened, "artifact:ingest").unwrap();
        assert_eq!(loaded, Some(sample_log()));
        assert!(format!("{reopened:?}").contains("store.bin"));
    }

    #[test]
    fn file_store_accepts_directory_path_and_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileArtifactStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path().join(DEFAULT_STORE_FILENAME));
        store.write("k", b"one", false).unwrap();
        store.write("k", b"two", true).unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some(b"two".as_ref()));
    }

    #[test]
    fn default_paths_use_store_constants() {
        assert_eq!(
            FileArtifactStore::default_path(),
            Path::new(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILENAME)
        );
        assert_eq!(
            FileArtifactStore::default_path_in_dir("/tmp/x"),
            Path::new("/tmp/x").join(DEFAULT_STORE_FILENAME)
        );
    }
}
