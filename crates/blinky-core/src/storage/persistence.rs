//! Device-local key-value persistence
//!
//! The local store keeps whole blobs under string keys. `FileMedium` stores
//! one file per key and uses atomic writes (write to temp file, then rename)
//! so a reader never observes a partial blob.
//!
//! Storage location: `~/.local/share/blinky/` (configurable via `Config`)
//!
//! Files:
//! - `sections.json` - The live section collection
//! - `sections_backup_<ms>.json` - Snapshots taken before a sign-in merge

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::{StorageError, StorageResult};

const BLOB_EXTENSION: &str = "json";

/// A medium holding one blob per key
pub trait KeyValueMedium: Send + Sync {
    /// Read the blob stored under `key`, `None` if absent
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the blob stored under `key`
    ///
    /// MUST be atomic: readers see either the old or the new blob.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove the blob under `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// List keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// File-per-key medium rooted at a directory
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Create a medium rooted at `dir` (created lazily on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, BLOB_EXTENSION))
    }
}

impl KeyValueMedium for FileMedium {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadError { path, source: e }),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        atomic_write(&self.path_for(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, path)),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadError {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory medium for tests
#[derive(Default)]
pub struct MemoryMedium {
    blobs: Mutex<BTreeMap<String, String>>,
    simulate_write_error: Mutex<bool>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as a browser does on quota errors
    pub fn set_simulate_write_error(&self, simulate: bool) {
        *lock(&self.simulate_write_error) = simulate;
    }
}

impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.blobs).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if *lock(&self.simulate_write_error) {
            return Err(StorageError::WriteRejected {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        lock(&self.blobs).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        lock(&self.blobs).remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(lock(&self.blobs)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    // Same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::AtomicWriteFailed {
        from: temp_path,
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_medium_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let medium = FileMedium::new(temp_dir.path());

        assert!(medium.get("sections").unwrap().is_none());

        medium.set("sections", "[]").unwrap();
        assert_eq!(medium.get("sections").unwrap().as_deref(), Some("[]"));
        assert!(medium.path_for("sections").exists());
        assert!(!medium.path_for("sections").with_extension("tmp").exists());

        medium.remove("sections").unwrap();
        assert!(medium.get("sections").unwrap().is_none());

        // Removing again is fine
        medium.remove("sections").unwrap();
    }

    #[test]
    fn test_file_medium_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let medium = FileMedium::new(temp_dir.path().join("a").join("b"));

        medium.set("sections", "[1]").unwrap();
        assert_eq!(medium.get("sections").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_file_medium_keys() {
        let temp_dir = TempDir::new().unwrap();
        let medium = FileMedium::new(temp_dir.path());

        assert!(medium.keys("sections").unwrap().is_empty());

        medium.set("sections", "[]").unwrap();
        medium.set("sections_backup_2", "[]").unwrap();
        medium.set("sections_backup_1", "[]").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(
            medium.keys("sections_backup_").unwrap(),
            vec!["sections_backup_1", "sections_backup_2"]
        );
        assert_eq!(medium.keys("").unwrap().len(), 3);
    }

    #[test]
    fn test_memory_medium_write_error() {
        let medium = MemoryMedium::new();
        medium.set("sections", "[]").unwrap();

        medium.set_simulate_write_error(true);
        let err = medium.set("sections", "[1]").unwrap_err();
        assert!(matches!(err, StorageError::WriteRejected { .. }));

        // Previous value untouched
        assert_eq!(medium.get("sections").unwrap().as_deref(), Some("[]"));
    }
}
