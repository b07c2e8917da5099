//! Record stores
//!
//! The profiler only needs keyed get/put plus a scan for reporting. Writes are
//! last-write-wins.

use crate::error::{ProfilerError, Result};
use crate::record::FileRecord;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait RecordStore {
    fn get(&self, kind: &str, key: &str) -> Result<Option<FileRecord>>;
    fn put(&mut self, kind: &str, key: &str, record: &FileRecord) -> Result<()>;
    /// Every record of `kind`, ordered by key.
    fn scan(&self, kind: &str) -> Result<Vec<FileRecord>>;
}

/// One JSON document per record under `<root>/<project>/<kind>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open (creating if needed) the store for `project` below `root`.
    pub fn open<P: AsRef<Path>>(root: P, project: &str) -> Result<Self> {
        let root = root.as_ref().join(project);
        fs::create_dir_all(&root).map_err(|e| {
            ProfilerError::Store(format!("cannot open store at {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        self.root.join(kind)
    }

    fn record_path(&self, kind: &str, key: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{}.json", key))
    }
}

fn store_err<E: std::fmt::Display>(path: &Path, e: E) -> ProfilerError {
    ProfilerError::Store(format!("{}: {}", path.display(), e))
}

impl RecordStore for JsonStore {
    fn get(&self, kind: &str, key: &str) -> Result<Option<FileRecord>> {
        let path = self.record_path(kind, key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_err(&path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| store_err(&path, e))
    }

    fn put(&mut self, kind: &str, key: &str, record: &FileRecord) -> Result<()> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir).map_err(|e| store_err(&dir, e))?;
        let path = self.record_path(kind, key);

        // Write beside the target and rename so readers never see half a record.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| store_err(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n").map_err(|e| store_err(&path, e))?;
        tmp.persist(&path).map_err(|e| store_err(&path, e.error))?;
        debug!("stored {}/{}", kind, key);
        Ok(())
    }

    fn scan(&self, kind: &str) -> Result<Vec<FileRecord>> {
        let dir = self.kind_dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_err(&dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| store_err(&dir, e))?.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.get(kind, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// In-process store, used by tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<(String, String), FileRecord>,
    pub puts: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, kind: &str, key: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .get(&(kind.to_string(), key.to_string()))
            .cloned())
    }

    fn put(&mut self, kind: &str, key: &str, record: &FileRecord) -> Result<()> {
        self.records
            .insert((kind.to_string(), key.to_string()), record.clone());
        self.puts += 1;
        Ok(())
    }

    fn scan(&self, kind: &str) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = self
            .records
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.checksum.cmp(&b.checksum));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(checksum: &str) -> FileRecord {
        let mut record = FileRecord::new(checksum);
        record.filenames.insert(format!("/data/{}.fq", checksum));
        record
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path(), "lab").unwrap();
        assert!(store.get("fastq", "abc").unwrap().is_none());

        store.put("fastq", "abc", &sample("abc")).unwrap();
        store.put("fastq", "000", &sample("000")).unwrap();
        assert_eq!(store.get("fastq", "abc").unwrap(), Some(sample("abc")));
        assert!(dir.path().join("lab/fastq/abc.json").is_file());

        let all = store.scan("fastq").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].checksum, "000");
        assert!(store.scan("other").unwrap().is_empty());
    }

    #[test]
    fn test_json_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path(), "lab").unwrap();
        let mut record = sample("abc");
        store.put("fastq", "abc", &record).unwrap();
        record.profile_count = 5;
        store.put("fastq", "abc", &record).unwrap();
        assert_eq!(store.get("fastq", "abc").unwrap().unwrap().profile_count, 5);
    }

    #[test]
    fn test_corrupt_document_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path(), "lab").unwrap();
        fs::create_dir_all(dir.path().join("lab/fastq")).unwrap();
        fs::write(dir.path().join("lab/fastq/bad.json"), "{").unwrap();
        assert!(matches!(store.get("fastq", "bad"), Err(ProfilerError::Store(_))));
    }

    #[test]
    fn test_memory_store_kinds_are_separate() {
        let mut store = MemoryStore::new();
        store.put("fastq", "abc", &sample("abc")).unwrap();
        assert!(store.get("bam", "abc").unwrap().is_none());
        assert_eq!(store.scan("fastq").unwrap().len(), 1);
        assert_eq!(store.puts, 1);
    }
}
