//! Directory-backed document store.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, DocumentStore};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Advisory lock file held while a store owns its directory.
const LOCK_FILE: &str = ".lock";
/// Suffix for in-flight atomic writes.
const TEMP_SUFFIX: &str = ".tmp";

/// A document store rooted at a directory.
///
/// Each key maps to one file below the root. Writes go through the
/// write-then-rename pattern so a crash never leaves a half-written
/// document behind:
///
/// 1. Write to `<file>.tmp`
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
/// 4. Fsync the parent directory so the rename is durable
///
/// # Ownership
///
/// [`FileStore::open`] takes an exclusive advisory lock on the directory,
/// so only one engine at a time owns a local data directory.
/// [`FileStore::shared`] skips the lock for directories that several devices
/// or processes write to, such as a synced mirror folder.
///
/// # Example
///
/// ```no_run
/// use curio_storage::{DocumentStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("guide-data")).unwrap();
/// store.write("recents.json", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    _lock_file: Option<File>,
}

impl FileStore {
    /// Opens or creates a store at `root`, taking the directory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process owns the
    /// directory, or an I/O error if it cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: Some(lock_file),
        })
    }

    /// Opens or creates a store at `root` without taking the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn shared(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: None,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path a key maps to.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for keys that escape the root.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    #[cfg(unix)]
    fn sync_directory(dir: &Path) -> StorageResult<()> {
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(_dir: &Path) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent)?;

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = parent.join(temp_name);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        Self::sync_directory(&parent)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = match prefix.trim_end_matches('/') {
            "" => self.root.clone(),
            trimmed => self.path_for(trimmed)?,
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LOCK_FILE || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            keys.push(format!("{prefix}{name}"));
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.write("recents.json", b"[\"a\"]").unwrap();
        assert_eq!(store.read("recents.json").unwrap(), Some(b"[\"a\"]".to_vec()));
        assert!(dir.path().join("recents.json").exists());
    }

    #[test]
    fn file_missing_key_reads_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.read("locations.json").unwrap(), None);
        assert!(!store.contains("locations.json").unwrap());
    }

    #[test]
    fn file_write_replaces_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.write("artifacts.json", b"{}").unwrap();
        store.write("artifacts.json", b"{\"x\":\"p1.jpg\"}").unwrap();

        assert_eq!(
            store.read("artifacts.json").unwrap(),
            Some(b"{\"x\":\"p1.jpg\"}".to_vec())
        );
        assert!(!dir.path().join("artifacts.json.tmp").exists());
    }

    #[test]
    fn file_nested_keys_and_listing() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.write("photos/b.jpg", b"b").unwrap();
        store.write("photos/a.jpg", b"a").unwrap();
        store.write("recents.json", b"[]").unwrap();

        assert_eq!(
            store.keys("photos/").unwrap(),
            vec!["photos/a.jpg".to_string(), "photos/b.jpg".to_string()]
        );
        assert_eq!(store.keys("").unwrap(), vec!["recents.json".to_string()]);
        assert!(store.keys("missing/").unwrap().is_empty());
    }

    #[test]
    fn file_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.write("photos/a.jpg", b"a").unwrap();
        assert!(store.remove("photos/a.jpg").unwrap());
        assert!(!store.remove("photos/a.jpg").unwrap());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.write("user_items.json", b"[]").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.read("user_items.json").unwrap(), Some(b"[]".to_vec()));
    }

    #[test]
    fn file_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));

        // Shared stores never contend for the lock.
        assert!(FileStore::shared(dir.path()).is_ok());
    }

    #[test]
    fn file_rejects_escaping_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.write("../outside.json", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
