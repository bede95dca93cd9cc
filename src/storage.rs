//! JSON record storage keyed by mod ID. One file per mod: `<dir>/mod_<id>.json`.

use crate::model::{ModId, ModRecord};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid record {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory of persisted mod records.
#[derive(Debug, Clone)]
pub struct ModStore {
    dir: PathBuf,
}

impl ModStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: ModId) -> PathBuf {
        self.dir.join(format!("mod_{}.json", id))
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::CreateDir {
            path: self.dir.clone(),
            source: e,
        })
    }

    pub fn exists(&self, id: ModId) -> bool {
        self.path_for(id).is_file()
    }

    /// Write `record` as pretty JSON. The file appears under its final name only once complete;
    /// a failed save leaves no temp file behind.
    pub fn save(&self, record: &ModRecord) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        let path = self.path_for(record.mod_id);
        let tmp = path.with_extension("json.tmp");
        let result = write_record(&tmp, record).and_then(|()| {
            std::fs::rename(&tmp, &path).map_err(|e| StoreError::Write {
                path: path.clone(),
                source: e,
            })
        });
        if let Err(e) = result {
            if let Err(rm) = std::fs::remove_file(&tmp) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), error = %rm, "could not remove temp file");
                }
            }
            return Err(e);
        }
        Ok(path)
    }

    /// Load a stored record. Ok(None) when no file exists for `id`.
    pub fn load(&self, id: ModId) -> Result<Option<ModRecord>, StoreError> {
        let path = self.path_for(id);
        let s = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read { path, source: e }),
        };
        serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| StoreError::Json { path, source: e })
    }

    /// IDs of all stored records, ascending. A missing directory yields an empty list.
    pub fn list_ids(&self) -> Result<Vec<ModId>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Read {
                path: self.dir.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(id_from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_record(tmp: &Path, record: &ModRecord) -> Result<(), StoreError> {
    let write_err = |e: std::io::Error| StoreError::Write {
        path: tmp.to_path_buf(),
        source: e,
    };
    let file = std::fs::File::create(tmp).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record).map_err(|e| StoreError::Json {
        path: tmp.to_path_buf(),
        source: e,
    })?;
    writer.write_all(b"\n").map_err(write_err)?;
    writer.flush().map_err(write_err)
}

fn id_from_file_name(name: &str) -> Option<ModId> {
    name.strip_prefix("mod_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn record(id: u64) -> ModRecord {
        let mut r = ModRecord::new(
            ModId(id),
            format!("https://www.farming-simulator.com/mod.php?mod_id={}", id),
        );
        r.game = Some("Farming Simulator 25".to_string());
        r
    }

    #[test]
    fn path_uses_mod_prefix() {
        let store = ModStore::new("output");
        assert_eq!(
            store.path_for(ModId(123)),
            PathBuf::from("output/mod_123.json")
        );
    }

    #[test]
    fn save_creates_dir_and_load_returns_record() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path().join("nested").join("out"));
        assert!(!store.exists(ModId(7)));

        let r = record(7);
        let path = store.save(&r)?;
        assert_eq!(path, store.path_for(ModId(7)));
        assert!(store.exists(ModId(7)));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.load(ModId(7))?, Some(r));
        Ok(())
    }

    #[test]
    fn load_missing_is_none() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        assert_eq!(store.load(ModId(1))?, None);
        Ok(())
    }

    #[test]
    fn load_corrupt_file_errors() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        std::fs::write(store.path_for(ModId(3)), "{not json")?;
        assert!(matches!(
            store.load(ModId(3)),
            Err(StoreError::Json { .. })
        ));
        Ok(())
    }

    #[test]
    fn save_writes_indented_utf8() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        let mut r = record(9);
        r.manufacturer = Some("Pöttinger".to_string());
        let path = store.save(&r)?;
        let text = std::fs::read_to_string(path)?;
        assert!(text.contains("Pöttinger"));
        assert!(text.contains("\n  \"mod_id\": \"9\""));
        Ok(())
    }

    #[test]
    fn save_overwrites_existing_record() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        store.save(&record(5))?;
        let mut updated = record(5);
        updated.version = Some("1.1.0.0".to_string());
        store.save(&updated)?;
        assert_eq!(store.load(ModId(5))?, Some(updated));
        Ok(())
    }

    #[test]
    fn list_ids_sorted_and_ignores_other_files() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        store.save(&record(30))?;
        store.save(&record(4))?;
        std::fs::write(tmp.path().join("notes.txt"), "x")?;
        std::fs::write(tmp.path().join("mod_abc.json"), "{}")?;
        std::fs::write(tmp.path().join("mod_8.json.tmp"), "{}")?;
        assert_eq!(store.list_ids()?, vec![ModId(4), ModId(30)]);
        Ok(())
    }

    #[test]
    fn list_ids_missing_dir_is_empty() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path().join("absent"));
        assert!(store.list_ids()?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_save_removes_temp_file() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let store = ModStore::new(tmp.path());
        // A directory under the record's name makes the final rename fail.
        std::fs::create_dir(store.path_for(ModId(1)))?;

        let err = store.save(&record(1));
        assert!(matches!(err, Err(StoreError::Write { .. })));
        assert!(!tmp.path().join("mod_1.json.tmp").exists());
        assert!(!store.exists(ModId(1)));
        Ok(())
    }
}
