//! File-backed cache backend.
//!
//! One JSON document per entry, named `cache_<key>.json` inside the
//! configured directory. Reads and writes of a given entry are serialized
//! through an advisory file lock; writes land via a temp file renamed into
//! place, so readers only ever observe complete documents. A file that no
//! longer parses is treated as absent: it is deleted and the read reports
//! a miss, letting the next computation heal the slot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use memoir_core::{
    CacheEntry, CacheResult, EntryCodec, FileCacheSettings, SerializationError,
};

use crate::lock::FileLock;
use crate::CacheBackend;

const TMP_SUFFIX: &str = ".tmp";

/// Cache backend storing one JSON file per entry.
#[derive(Debug)]
pub struct FileBackend {
    settings: FileCacheSettings,
    codec: EntryCodec,
}

impl FileBackend {
    /// Open a backend over the configured directory, creating it if needed.
    pub fn new(settings: FileCacheSettings) -> CacheResult<Self> {
        fs::create_dir_all(&settings.cache_dir)?;
        let codec = EntryCodec::from_settings(&settings.base);
        Ok(Self { settings, codec })
    }

    pub fn settings(&self) -> &FileCacheSettings {
        &self.settings
    }

    /// Path of the file storing the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.settings.cache_dir.join(format!("cache_{key}.json"))
    }

    fn read_entry(&self, path: &Path) -> CacheResult<Option<CacheEntry>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            // Deleted between the existence check and the read.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match self.codec.deserialize(&text) {
            Ok(entry) => Ok(Some(entry)),
            Err(SerializationError::MalformedDocument { reason, .. }) => {
                warn!(path = %path.display(), %reason, "removing corrupted cache file");
                // Best effort; a lingering corrupted file still reads as a
                // miss next time.
                let _ = fs::remove_file(path);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> CacheResult<()> {
        let text = self.codec.serialize(entry)?;

        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = path.with_file_name(tmp_name);

        let result = fs::write(&tmp_path, &text)
            .and_then(|()| fs::rename(&tmp_path, path))
            .map_err(Into::into);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

impl CacheBackend for FileBackend {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        // A missing cache directory means nothing was ever stored.
        if !self.settings.cache_dir.exists() {
            return Ok(None);
        }
        let path = self.entry_path(key);
        let _lock = FileLock::acquire(&path, self.settings.lock_timeout)?;
        self.read_entry(&path)
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> CacheResult<()> {
        // The directory may have been removed since construction.
        fs::create_dir_all(&self.settings.cache_dir)?;
        let path = self.entry_path(key);
        let _lock = FileLock::acquire(&path, self.settings.lock_timeout)?;
        self.write_entry(&path, entry)
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        if !self.settings.cache_dir.exists() {
            return Ok(false);
        }
        let path = self.entry_path(key);
        let _lock = FileLock::acquire(&path, self.settings.lock_timeout)?;
        Ok(path.exists())
    }
}
