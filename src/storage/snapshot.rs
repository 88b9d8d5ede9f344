//! External byte stores for database snapshots.
//!
//! A store knows nothing about SQL. It keeps opaque byte images under string
//! keys, and every `set` replaces the previous image in full.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key the lifecycle manager stores its snapshot under.
pub const SNAPSHOT_KEY: &str = "organizer-db";

/// Byte storage addressed by key, with whole-value overwrite semantics.
pub trait SnapshotStore {
    /// Fetch the bytes stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or the stored
    /// image fails verification.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace whatever is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Drop the value under `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be modified.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Counts writes so callers can observe save traffic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|m| m.contains_key(key)).unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Snapshot("memory store lock poisoned".to_string()))
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Directory-backed store: `<dir>/<key>.db` plus a `<key>.sha256` checksum.
///
/// Both files are staged as `.tmp` siblings before either is renamed into
/// place, image first. A crash between the two renames leaves the new
/// image beside its staged checksum, which [`SnapshotStore::get`] accepts
/// and promotes.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the image stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a plain file-name token.
    pub fn image_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.db")))
    }

    fn checksum_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.sha256"))
    }

    /// Check `bytes` against the committed checksum, falling back to a
    /// staged one left by an interrupted `set`.
    fn verify(&self, key: &str, path: &Path, bytes: &[u8]) -> Result<()> {
        let actual = sha256_hex(bytes);
        let committed = self.checksum_path(key);
        let staged = temp_sibling(&committed);

        let expected = read_checksum(&committed)?;
        if expected.as_deref() == Some(actual.as_str()) {
            return Ok(());
        }

        if read_checksum(&staged)?.as_deref() == Some(actual.as_str()) {
            warn!(path = %path.display(), "Completing interrupted snapshot write");
            fs::rename(&staged, &committed)?;
            return Ok(());
        }

        match expected {
            Some(expected) => Err(Error::Snapshot(format!(
                "checksum mismatch for {}: expected {expected}, got {actual}",
                path.display()
            ))),
            None => {
                warn!(path = %path.display(), "Snapshot has no checksum, loading unverified");
                Ok(())
            }
        }
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.image_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        self.verify(key, &path, &bytes)?;

        debug!(key, bytes = bytes.len(), "Snapshot read");
        Ok(Some(bytes))
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.image_path(key)?;
        fs::create_dir_all(&self.dir)?;

        let checksum_path = self.checksum_path(key);
        let staged_checksum = stage(&checksum_path, sha256_hex(bytes).as_bytes())?;
        let staged_image = stage(&path, bytes)?;

        fs::rename(&staged_image, &path)?;
        fs::rename(&staged_checksum, &checksum_path)?;

        debug!(key, bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let checksum_path = self.checksum_path(key);
        let staged = temp_sibling(&checksum_path);
        for path in [self.image_path(key)?, checksum_path, staged] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::Snapshot(format!("invalid snapshot key: {key:?}")))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_checksum(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `content` to a synced `.tmp` sibling of `path` and return it.
fn stage(path: &Path, content: &[u8]) -> Result<PathBuf> {
    let temp_path = temp_sibling(path);
    let mut writer = BufWriter::new(File::create(&temp_path)?);
    writer.write_all(content)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(temp_path)
}
