//! Storage backends for the data files.
//!
//! Every store talks to an `Arc<dyn Storage>` handed in by the owner, so the
//! same store code runs against a real directory or an in-memory map.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait Storage: Send + Sync + 'static {
    /// Contents of `name`, or `None` when the file does not exist.
    fn read(&self, name: &str) -> io::Result<Option<String>>;

    /// Replace `name` with `contents`. Readers observe either the old or the
    /// new contents, never a partial file.
    fn write(&self, name: &str, contents: &str) -> io::Result<()>;

    /// Delete `name`. Deleting a missing file is not an error.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Filesystem location of `name`, if the backend has one.
    fn locate(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

// ---------------------------------------------------------------------------
// Directory-backed storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    /// Files live directly under `dir`, which is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Storage for FsStorage {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(name)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // Same directory as the target so the rename never crosses devices.
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let res = write_synced(&tmp, contents).and_then(|()| fs::rename(&tmp, self.path(name)));
        if res.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        res
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        Some(self.path(name))
    }
}

/// Run a backend read on the blocking pool.
pub(crate) async fn read_blocking(
    storage: &Arc<dyn Storage>,
    name: &'static str,
) -> io::Result<Option<String>> {
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || storage.read(name))
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)))
}

/// Write `contents` to `path` and force it to the device, so a rename that
/// survives a power cut never points at an empty file.
fn write_synced(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// In-memory storage (tests, embedding)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a file directly, bypassing any store.
    pub fn insert(&self, name: &str, contents: impl Into<String>) {
        self.lock().insert(name.to_string(), contents.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the map cannot leave it half-updated.
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self.lock().get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        self.lock().insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.lock().remove(name);
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
