//! Filesystem seam for cache persistence.
//!
//! The cache never touches `std::fs` directly; it goes through [`FileOps`]
//! so tests can run fully in memory and hosts can redirect storage.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Minimal filesystem surface the cache needs.
pub trait FileOps: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write the whole file so readers see either the old content or the
    /// new content, never a torn mix.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Removing a file that does not exist is not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

// ============================================================================
// Real filesystem
// ============================================================================

/// [`FileOps`] over the real filesystem. Atomic writes stage to a sibling
/// temp file and rename into place.
pub struct SystemFileOps;

impl SystemFileOps {
    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".tmp.{}", std::process::id()));
        path.with_file_name(name)
    }
}

impl FileOps for SystemFileOps {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let staging = Self::staging_path(path);
        let result = (|| {
            let mut file = fs::File::create(&staging)?;
            file.write_all(bytes)?;
            file.sync_data()?;
            fs::rename(&staging, path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

// ============================================================================
// In-memory double
// ============================================================================

/// [`FileOps`] backed by a map, for tests and ephemeral caches.
#[derive(Default)]
pub struct MemFileOps {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemFileOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl FileOps for MemFileOps {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such cached file"))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files.lock().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
