//! File-backed storage for the record store.
//!
//! Each key lives in its own file under the data directory. Writes go to a
//! temporary sibling first and are renamed into place, so a crash mid-write
//! leaves the previous value intact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quotesync_engine::{Error, Result, Storage};

/// Storage keeping one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read persisted key: {}", e);
                Err(Error::PersistenceUnavailable(e.to_string()))
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let result = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), "Failed to persist key: {}", e);
            let _ = fs::remove_file(&tmp);
            return Err(Error::PersistenceUnavailable(e.to_string()));
        }

        tracing::trace!(path = %path.display(), bytes = value.len(), "Persisted key");
        Ok(())
    }
}
