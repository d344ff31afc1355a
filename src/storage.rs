//! Durable key/value slot the store writes its snapshot into.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A single-key snapshot sink. `load` returns `None` when nothing was ever saved.
pub trait SnapshotStorage {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, snapshot: &str) -> Result<()>;
}

impl<T: SnapshotStorage + ?Sized> SnapshotStorage for Box<T> {
    fn load(&self, key: &str) -> Result<Option<String>> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, snapshot: &str) -> Result<()> {
        (**self).save(key, snapshot)
    }
}

/// Stores each key as `<dir>/<key>.json`
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SnapshotStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn save(&mut self, key: &str, snapshot: &str) -> Result<()> {
        let path = self.path_for(key);
        // Write then rename so a reader never sees half a snapshot
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        std::fs::write(&tmp, snapshot)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Keeps snapshots in memory; used by tests and `--ephemeral` sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
    pub writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_snapshot(key: &str, snapshot: &str) -> Self {
        let mut slots = HashMap::new();
        slots.insert(key.to_string(), snapshot.to_string());
        Self { slots, writes: 0 }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.slots.get(key).map(String::as_str)
    }
}

impl SnapshotStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.get(key).cloned())
    }

    fn save(&mut self, key: &str, snapshot: &str) -> Result<()> {
        self.slots.insert(key.to_string(), snapshot.to_string());
        self.writes += 1;
        Ok(())
    }
}
