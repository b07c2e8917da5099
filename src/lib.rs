//! FASTQ profiler
//!
//! Fingerprints FASTQ files by content hash and keeps one merged record per
//! distinct content, so expensive statistics are computed once.
//!
//! This library provides:
//! - Checksums memoized in per-directory `.checksum` sidecar files
//! - Header dialect detection and barcode election
//! - Read statistics (duplication, base composition, lengths)
//! - FastQC invocation and report parsing
//! - Record merging and pluggable record stores

pub mod checksum;
pub mod error;
pub mod fastq;
pub mod fastqc;
pub mod filename;
pub mod header;
pub mod inputs;
pub mod profile;
pub mod record;
pub mod reporting;
pub mod settings;
pub mod stats;
pub mod store;
pub mod value;

pub use error::{ProfilerError, Result};
pub use record::{merge, FileRecord, PartialUpdate};
pub use store::{JsonStore, MemoryStore, RecordStore};
pub use value::{autoconvert, Value};

use std::collections::BTreeMap;

/// Parse `key:value` metadata arguments, coercing each value. A value with a
/// comma becomes a list, e.g. `tags:a,b`, and unions with stored lists.
pub fn parse_metadata<S: AsRef<str>>(pairs: &[S]) -> Result<BTreeMap<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let pair = pair.as_ref();
            match pair.split_once(':') {
                Some((key, value)) if !key.is_empty() => {
                    let value = if value.contains(',') {
                        Value::List(value.split(',').map(str::to_string).collect())
                    } else {
                        autoconvert(value)
                    };
                    Ok((key.to_string(), value))
                }
                _ => Err(ProfilerError::Settings(format!(
                    "metadata must be key:value, got '{}'",
                    pair
                ))),
            }
        })
        .collect()
}
