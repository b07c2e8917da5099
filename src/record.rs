//! Persisted file records and their merge rules

use crate::fastqc::QcBlock;
use crate::stats::StatsBlock;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything known about one file content, keyed by its checksum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub checksum: String,
    #[serde(default)]
    pub filenames: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(default)]
    pub header: BTreeMap<String, Value>,
    #[serde(default)]
    pub filename_fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc: Option<QcBlock>,
    #[serde(default)]
    pub profile_count: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FileRecord {
    pub fn new<S: Into<String>>(checksum: S) -> Self {
        Self {
            checksum: checksum.into(),
            ..Default::default()
        }
    }

    /// A stored QC result, successful or not, is final for this content.
    pub fn has_qc(&self) -> bool {
        self.qc.is_some()
    }
}

/// Fields gathered by one profile or fetch of a file.
#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    pub filenames: Vec<String>,
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub dialect: Option<String>,
    pub header: BTreeMap<String, Value>,
    pub filename_fields: BTreeMap<String, Value>,
    pub stats: Option<StatsBlock>,
    pub qc: Option<QcBlock>,
    pub metadata: BTreeMap<String, Value>,
}

/// Fold an update into an existing record.
///
/// Filenames union; `created` keeps the earliest; list-valued metadata
/// unions; every other present field overwrites. `profile_count` counts
/// merges.
pub fn merge(mut existing: FileRecord, update: PartialUpdate) -> FileRecord {
    existing.filenames.extend(update.filenames);

    if let Some(size) = update.size {
        existing.size = Some(size);
        existing.human_size = Some(human_size(size));
    }
    existing.created = match (existing.created, update.created) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    if update.dialect.is_some() {
        existing.dialect = update.dialect;
    }
    existing.header.extend(update.header);
    existing.filename_fields.extend(update.filename_fields);
    if update.stats.is_some() {
        existing.stats = update.stats;
    }
    if update.qc.is_some() {
        existing.qc = update.qc;
    }
    for (key, value) in update.metadata {
        let merged = match (existing.metadata.remove(&key), value) {
            (Some(Value::List(old)), Value::List(new)) => Value::List(union(old, new)),
            (_, value) => value,
        };
        existing.metadata.insert(key, merged);
    }

    existing.profile_count += 1;
    existing
}

fn union(old: Vec<String>, new: Vec<String>) -> Vec<String> {
    old.into_iter()
        .chain(new)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Decimal human readable size, e.g. `1.5 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
