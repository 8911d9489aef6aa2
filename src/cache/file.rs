//! File-backed verdict store.
//!
//! One file per key under the cache directory, named by the hex key. Writes go to
//! a temporary file that is renamed into place, so readers never observe a
//! half-written entry. The directory is created on the first write.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::CacheError;

use super::codec;
use super::{CacheEntry, CacheKey, VerdictStore};

/// Marker in temporary file names.
const TEMP_MARKER: &str = ".tmp.";

/// [`VerdictStore`] persisting entries as files in a directory.
#[derive(Debug, Clone)]
pub struct FileVerdictStore {
    dir: PathBuf,
    sync_on_write: bool,
}

impl FileVerdictStore {
    /// Creates a store rooted at `dir`. Nothing is touched until the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sync_on_write: true,
        }
    }

    /// Whether to fsync each entry before renaming it into place.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Creates the cache directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for item in read_dir {
            let path = item?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if CacheKey::is_key_like(name) || name.contains(TEMP_MARKER) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl VerdictStore for FileVerdictStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        codec::decode_entry(&bytes).map(Some).map_err(|e| match e {
            CacheError::Corrupt { message } => CacheError::Corrupt {
                message: format!("{}: {message}", self.path_for(key).display()),
            },
            other => other,
        })
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let bytes = codec::encode_entry(entry)?;
        let final_path = self.path_for(&entry.key);
        let temp_path = self
            .dir
            .join(format!("{}{TEMP_MARKER}{}", entry.key, Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            if self.sync_on_write {
                file.sync_all()?;
            }
            fs::rename(&temp_path, &final_path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self
            .entry_files()?
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(CacheKey::is_key_like)
            })
            .count())
    }

    fn clear(&self) -> Result<(), CacheError> {
        for path in self.entry_files()? {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
