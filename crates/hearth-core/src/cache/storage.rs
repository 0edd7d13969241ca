// ── Durable key/value storage backends ──
//
// The cache store writes serialized records through `CacheStorage`.
// `FileStorage` survives process restarts; `MemoryStorage` lives for
// the process and backs tests and ephemeral sessions.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::error::StorageError;

/// Synchronous string key/value storage with best-effort durability.
pub trait CacheStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every stored key, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

fn entry_size(key: &str, value: &str) -> u64 {
    u64::try_from(key.len() + value.len()).unwrap_or(u64::MAX)
}

// ── MemoryStorage ────────────────────────────────────────────────────

/// Process-local storage with an optional capacity ceiling in bytes
/// (keys and values both count).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
    limit: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: u64) -> Self {
        Self {
            entries: DashMap::new(),
            limit: Some(limit),
        }
    }

    fn used_bytes_excluding(&self, key: &str) -> u64 {
        self.entries
            .iter()
            .filter(|r| r.key() != key)
            .map(|r| entry_size(r.key(), r.value()))
            .sum()
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.limit {
            let needed = self.used_bytes_excluding(key) + entry_size(key, value);
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.iter().map(|r| r.key().clone()).collect())
    }
}

// ── FileStorage ──────────────────────────────────────────────────────

const FILE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Longest file stem written as the plain hex key. Longer keys are named
/// by digest to stay under the common 255-byte file name limit.
const MAX_PLAIN_STEM: usize = 200;
const DIGEST_STEM_PREFIX: &str = "sha256-";

/// One file per key under a cache directory.
///
/// A record file starts with a header line holding the hex-encoded key,
/// followed by the stored value. Short keys are named by their hex
/// encoding, long ones by the SHA-256 of the key; either way `keys()`
/// reads the header back. Writes go through a uniquely named temporary
/// file and a rename, so concurrent writers never interleave.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    limit: Option<u64>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, limit: None })
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{FILE_EXTENSION}", file_stem(key)))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir
            .join(format!(".{}.{TEMP_EXTENSION}", Uuid::new_v4().simple()))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> Result<u64, StorageError> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path == skip || !is_record_file(&path) {
                continue;
            }
            total += fs::metadata(&path)?.len();
        }
        Ok(total)
    }
}

impl CacheStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let contents = match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // A header for another key means a digest collision or a foreign file.
        Ok(contents
            .split_once('\n')
            .filter(|(header, _)| *header == hex::encode(key))
            .map(|(_, value)| value.to_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let record = format!("{}\n{value}", hex::encode(key));
        if let Some(limit) = self.limit {
            let needed = self.used_bytes_excluding(&path)?
                + u64::try_from(record.len()).unwrap_or(u64::MAX);
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }
        let tmp = self.temp_path();
        if let Err(e) = write_then_rename(&tmp, &path, record.as_bytes()) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "temporary record left behind");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_record_file(&path) {
                continue;
            }
            match read_header(&path) {
                Ok(Some(key)) => keys.push(key),
                Ok(None) => {}
                // Removed by a concurrent writer between listing and reading.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(keys)
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

fn file_stem(key: &str) -> String {
    let plain = hex::encode(key);
    if plain.len() <= MAX_PLAIN_STEM {
        plain
    } else {
        format!("{DIGEST_STEM_PREFIX}{}", hex::encode(Sha256::digest(key)))
    }
}

/// Key stored in a record file's header line.
fn read_header(path: &Path) -> io::Result<Option<String>> {
    let mut line = String::new();
    BufReader::new(fs::File::open(path)?).read_line(&mut line)?;
    Ok(hex::decode(line.trim_end_matches('\n'))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok()))
}

fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trips_awkward_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let keys = ["forecast:weather.home:daily", "a/b\\c", "ünïcode", "line\nbreak"];
        for key in keys {
            storage.set(key, "{\"v\":\n1}").unwrap();
            assert_eq!(storage.get(key).unwrap().as_deref(), Some("{\"v\":\n1}"));
        }
        let mut listed = storage.keys().unwrap();
        listed.sort();
        let mut expected: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn file_storage_names_long_keys_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let key = format!("hearth-cache:calendar:{}", "calendar.family_shared,".repeat(14));
        assert!(key.len() > 300);

        storage.set(&key, "[1,2,3]").unwrap();
        assert_eq!(storage.get(&key).unwrap().as_deref(), Some("[1,2,3]"));
        assert_eq!(storage.keys().unwrap(), vec![key.clone()]);

        let name = fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name()
            .into_string()
            .unwrap();
        assert!(name.starts_with(DIGEST_STEM_PREFIX));
        assert!(name.len() < 100);

        storage.remove(&key).unwrap();
        assert!(storage.get(&key).unwrap().is_none());
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn file_storage_ignores_record_with_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("a", "1").unwrap();
        fs::rename(storage.path_for("a"), storage.path_for("b")).unwrap();
        assert!(storage.get("b").unwrap().is_none());
    }

    #[test]
    fn failed_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        // A directory in place of the record makes the rename fail.
        fs::create_dir(storage.path_for("k")).unwrap();
        assert!(storage.set("k", "1").is_err());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }

    #[test]
    fn concurrent_writers_never_tear_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let values: Vec<String> = (0..4).map(|i| i.to_string().repeat(4096)).collect();

        std::thread::scope(|scope| {
            for value in &values {
                let storage = storage.clone();
                scope.spawn(move || {
                    for _ in 0..20 {
                        storage.set("shared", value).unwrap();
                    }
                });
            }
        });

        let stored = storage.get("shared").unwrap().unwrap();
        assert!(values.contains(&stored));
    }

    #[test]
    fn memory_storage_enforces_limit() {
        let storage = MemoryStorage::with_limit(10);
        storage.set("k", "12345").unwrap();
        let err = storage.set("other", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 10, .. }));
        // Overwriting an existing key only counts the new value.
        storage.set("k", "123456789").unwrap();
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        FileStorage::open(dir.path())
            .unwrap()
            .set("hearth-cache:x", "{\"v\":1}")
            .unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("hearth-cache:x").unwrap().as_deref(),
            Some("{\"v\":1}")
        );
        assert_eq!(reopened.keys().unwrap(), vec!["hearth-cache:x".to_owned()]);
    }

    #[test]
    fn file_storage_missing_key_is_none_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.get("absent").unwrap().is_none());
        storage.remove("absent").unwrap();
    }

    #[test]
    fn file_storage_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap().with_limit(8);
        storage.set("a", "1234").unwrap();
        assert!(matches!(
            storage.set("b", "12345"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert!(storage.get("b").unwrap().is_none());
    }
}
