//! Multi-record reporting
//!
//! Tabular dumps, QC module tables and aggregate summaries over stored records.

use crate::error::{ProfilerError, Result};
use crate::fastqc::module_columns;
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;

const STATS_COLUMNS: &[&str] = &[
    "total_reads",
    "unique_reads",
    "percent_unique",
    "most_abundant_sequence",
    "most_abundant_frequency",
    "most_abundant_frequency_percent",
    "cum_length",
    "A_count",
    "T_count",
    "C_count",
    "G_count",
    "N_count",
    "bases",
    "GC_content",
    "min_length",
    "max_length",
    "avg_length",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub records: usize,
    pub filenames: usize,
    pub profiled: usize,
    pub total_reads: u64,
    pub total_bases: u64,
    pub mean_gc_content: f64,
    pub qc_reports: usize,
    pub qc_failures: usize,
}

pub fn summarize(records: &[FileRecord]) -> Summary {
    let profiled: Vec<_> = records.iter().filter_map(|r| r.stats.as_ref()).collect();
    let mean_gc_content = if profiled.is_empty() {
        0.0
    } else {
        profiled.iter().map(|s| s.gc_content).sum::<f64>() / profiled.len() as f64
    };

    Summary {
        records: records.len(),
        filenames: records.iter().map(|r| r.filenames.len()).sum(),
        profiled: profiled.len(),
        total_reads: profiled.iter().map(|s| s.total_reads).sum(),
        total_bases: profiled.iter().map(|s| s.bases).sum(),
        mean_gc_content,
        qc_reports: records
            .iter()
            .filter(|r| r.qc.as_ref().map(|q| !q.is_failed()).unwrap_or(false))
            .count(),
        qc_failures: records
            .iter()
            .filter(|r| r.qc.as_ref().map(|q| q.is_failed()).unwrap_or(false))
            .count(),
    }
}

/// One TSV row per (record, filename) with identity and statistics columns.
pub fn write_tsv<W: Write>(records: &[FileRecord], mut out: W) -> Result<()> {
    let mut header = vec!["checksum", "filename", "size", "human_size", "dialect", "profile_count"];
    header.extend_from_slice(STATS_COLUMNS);
    writeln!(out, "{}", header.join("\t"))?;

    for record in records {
        let stats = record
            .stats
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let stat_cells: Vec<String> = STATS_COLUMNS
            .iter()
            .map(|col| match stats.as_ref().and_then(|s| s.get(*col)) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => String::new(),
            })
            .collect();

        for filename in &record.filenames {
            let mut row = vec![
                record.checksum.clone(),
                filename.clone(),
                record.size.map(|s| s.to_string()).unwrap_or_default(),
                record.human_size.clone().unwrap_or_default(),
                record.dialect.clone().unwrap_or_default(),
                record.profile_count.to_string(),
            ];
            row.extend(stat_cells.iter().cloned());
            writeln!(out, "{}", row.join("\t"))?;
        }
    }
    Ok(())
}

/// One JSON document per line.
pub fn write_json_lines<W: Write>(records: &[FileRecord], mut out: W) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Emit one QC module table across records, prefixed by checksum and filename.
pub fn write_qc_module<W: Write>(records: &[FileRecord], module: &str, mut out: W) -> Result<()> {
    let columns =
        module_columns(module).ok_or_else(|| ProfilerError::UnknownModule(module.to_string()))?;
    writeln!(out, "checksum\tfilename\t{}", columns.join("\t"))?;

    for record in records {
        let table = match record
            .qc
            .as_ref()
            .and_then(|qc| qc.report())
            .and_then(|report| report.module(module))
        {
            Some(table) => table,
            None => continue,
        };
        let filename = record.filenames.iter().next().cloned().unwrap_or_default();
        for line in table.data.lines() {
            writeln!(out, "{}\t{}\t{}", record.checksum, filename, line)?;
        }
    }
    Ok(())
}
