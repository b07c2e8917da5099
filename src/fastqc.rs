//! FastQC integration
//!
//! Runs `fastqc` against one file inside a scratch directory and parses the
//! `fastqc_data.txt` report it leaves behind. A run whose stderr mentions an
//! exception is recorded as failed and carries nothing but the error text.

use crate::error::{ProfilerError, Result};
use crate::value::{autoconvert, Value};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Substring of stderr that marks a failed FastQC run.
pub const EXCEPTION_MARKER: &str = "Exception";

pub const REPORT_FILE_NAME: &str = "fastqc_data.txt";

const VERSION_MARKER: &str = "##FastQC";
const END_MODULE: &str = ">>END_MODULE";
const BASIC_STATISTICS: &str = "basic_statistics";
const SCALAR_LINES: &[&str] = &[
    "Encoding",
    "Sequences flagged as poor quality",
    "Sequence length",
    "%GC",
];

/// Column layout of each FastQC module table.
pub const MODULE_COLUMNS: &[(&str, &[&str])] = &[
    (
        "per_base_sequence_quality",
        &[
            "base",
            "mean",
            "median",
            "lower_quartile",
            "upper_quartile",
            "10th_percentile",
            "90th_percentile",
        ],
    ),
    ("per_tile_sequence_quality", &["tile", "base", "mean"]),
    ("per_sequence_quality_scores", &["quality", "count"]),
    ("per_base_sequence_content", &["base", "G", "A", "T", "C"]),
    ("per_sequence_gc_content", &["gc_content", "count"]),
    ("per_base_n_content", &["base", "n_count"]),
    ("sequence_length_distribution", &["length", "count"]),
    (
        "sequence_duplication_levels",
        &["duplication_level", "percentage_of_deduplicated", "percentage_of_total"],
    ),
    (
        "overrepresented_sequences",
        &["sequence", "count", "percentage", "possible_source"],
    ),
    (
        "adapter_content",
        &[
            "position",
            "illumina_universal_adapter",
            "illumina_small_rna_3_adapter",
            "illumina_small_rna_5_adapter",
            "nextera_transposase_sequence",
            "solid_small_rna_adapter",
        ],
    ),
    (
        "kmer_content",
        &["sequence", "count", "pvalue", "obs_exp_max", "max_obs_exp_pos"],
    ),
];

/// Column names for a module, if it is one with a table.
pub fn module_columns(module: &str) -> Option<&'static [&'static str]> {
    MODULE_COLUMNS
        .iter()
        .find(|(name, _)| *name == module)
        .map(|(_, columns)| *columns)
}

/// One `>>Module\tstatus` section of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcModule {
    pub name: String,
    pub status: String,
    /// Tab-separated rows, newline terminated.
    pub data: String,
}

impl QcModule {
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> {
        self.data.lines().map(|line| line.split('\t').collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub version: Option<String>,
    /// Status of every module, including basic statistics.
    pub statuses: BTreeMap<String, String>,
    /// Table-bearing modules in report order.
    pub modules: Vec<QcModule>,
    pub scalars: BTreeMap<String, Value>,
}

impl QcReport {
    pub fn module(&self, name: &str) -> Option<&QcModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// Outcome of a QC run, stored on the file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QcBlock {
    Report(QcReport),
    /// Terminal failure. Never retried for the same content.
    Failed { error: String },
}

impl QcBlock {
    pub fn is_failed(&self) -> bool {
        matches!(self, QcBlock::Failed { .. })
    }

    pub fn report(&self) -> Option<&QcReport> {
        match self {
            QcBlock::Report(report) => Some(report),
            QcBlock::Failed { .. } => None,
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('>').to_lowercase().replace(' ', "_")
}

/// Parse the text of a `fastqc_data.txt` report.
pub fn parse_report(text: &str) -> QcReport {
    let mut report = QcReport::default();
    let mut open: Option<(String, String)> = None;
    let mut rows = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let key = fields[0];

        if key.starts_with(VERSION_MARKER) {
            report.version = fields.get(1).map(|v| v.to_string());
        } else if key == END_MODULE {
            if let Some((name, status)) = open.take() {
                if name != BASIC_STATISTICS {
                    report.modules.push(QcModule {
                        name,
                        status,
                        data: std::mem::take(&mut rows),
                    });
                }
            }
            rows.clear();
        } else if key.starts_with('#') {
            continue;
        } else if key.starts_with(">>") {
            let name = normalize(key);
            let status = fields.get(1).copied().unwrap_or_default().to_string();
            report.statuses.insert(name.clone(), status.clone());
            open = Some((name, status));
            rows.clear();
        } else if SCALAR_LINES.contains(&key) {
            let name = normalize(key).replace("%gc", "GC_content");
            let value = autoconvert(fields.get(1).copied().unwrap_or_default());
            report.scalars.insert(name, value);
        } else if open.is_some() {
            rows.push_str(&fields.join("\t"));
            rows.push('\n');
        }
    }

    report
}

/// Anything that can produce a QC block for a FASTQ file.
pub trait QcRunner {
    fn run(&self, fastq: &Path) -> Result<QcBlock>;
}

/// Invokes the `fastqc` executable.
#[derive(Debug, Clone)]
pub struct FastqcRunner {
    pub program: PathBuf,
    pub threads: Option<usize>,
}

impl FastqcRunner {
    pub fn new<P: Into<PathBuf>>(program: P, threads: Option<usize>) -> Self {
        Self {
            program: program.into(),
            threads,
        }
    }

    /// Resolve `program` on `PATH` (or as given, when it contains a separator).
    pub fn locate(program: &str, threads: Option<usize>) -> Result<Self> {
        which(program)
            .map(|path| Self::new(path, threads))
            .ok_or_else(|| ProfilerError::ToolNotFound(program.to_string()))
    }
}

impl QcRunner for FastqcRunner {
    fn run(&self, fastq: &Path) -> Result<QcBlock> {
        // Removed on drop, including every early return below.
        let scratch = tempfile::Builder::new().prefix("fq-fastqc").tempdir()?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("--outdir").arg(scratch.path()).arg("--extract");
        if let Some(threads) = self.threads {
            cmd.arg("--threads").arg(threads.to_string());
        }
        cmd.arg(fastq);
        debug!("running {:?}", cmd);

        let output = cmd.output()?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains(EXCEPTION_MARKER) {
            warn!("fastqc failed on {}", fastq.display());
            return Ok(QcBlock::Failed {
                error: stderr.trim().to_string(),
            });
        }

        let report_path = find_report(scratch.path())?;
        let text = fs::read_to_string(&report_path)?;
        Ok(QcBlock::Report(parse_report(&text)))
    }
}

/// Locate `<dir>/*_fastqc/fastqc_data.txt`.
fn find_report(dir: &Path) -> Result<PathBuf> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_report_dir = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_fastqc"))
                .unwrap_or(false);
        if is_report_dir && path.join(REPORT_FILE_NAME).is_file() {
            return Ok(path.join(REPORT_FILE_NAME));
        }
    }
    Err(ProfilerError::QcReportMissing(dir.to_path_buf()))
}

fn which(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "##FastQC\t0.11.9
>>Basic Statistics\tpass
#Measure\tValue
Filename\treads.fq
File type\tConventional base calls
Encoding\tSanger / Illumina 1.9
Total Sequences\t3
Sequences flagged as poor quality\t0
Sequence length\t4
%GC\t33
>>END_MODULE
>>Per base sequence quality\tpass
#Base\tMean\tMedian\tLower Quartile\tUpper Quartile\t10th Percentile\t90th Percentile
1\t40.0\t40.0\t40.0\t40.0\t40.0\t40.0
2\t39.5\t40.0\t39.0\t40.0\t38.0\t40.0
>>END_MODULE
>>Adapter Content\twarn
#Position\tIllumina Universal Adapter
1\t0.0
>>END_MODULE
";

    #[test]
    fn test_parse_report() {
        let report = parse_report(REPORT);
        assert_eq!(report.version.as_deref(), Some("0.11.9"));
        assert_eq!(report.statuses["basic_statistics"], "pass");
        assert_eq!(report.statuses["adapter_content"], "warn");

        assert_eq!(report.scalars["encoding"], Value::Str("Sanger / Illumina 1.9".into()));
        assert_eq!(report.scalars["sequences_flagged_as_poor_quality"], Value::Int(0));
        assert_eq!(report.scalars["sequence_length"], Value::Int(4));
        assert_eq!(report.scalars["GC_content"], Value::Int(33));

        assert_eq!(report.modules.len(), 2);
        let quality = report.module("per_base_sequence_quality").unwrap();
        assert_eq!(quality.status, "pass");
        assert_eq!(
            quality.data,
            "1\t40.0\t40.0\t40.0\t40.0\t40.0\t40.0\n2\t39.5\t40.0\t39.0\t40.0\t38.0\t40.0\n"
        );
        assert_eq!(quality.rows().count(), 2);
        assert_eq!(report.module("adapter_content").unwrap().data, "1\t0.0\n");
    }

    #[test]
    fn test_basic_statistics_rows_do_not_leak() {
        let report = parse_report(REPORT);
        assert!(report.module("basic_statistics").is_none());
        assert!(report.modules.iter().all(|m| !m.data.contains("Filename")));
    }

    #[test]
    fn test_module_columns() {
        assert_eq!(module_columns("per_base_n_content"), Some(&["base", "n_count"][..]));
        assert!(module_columns("basic_statistics").is_none());
    }

    #[test]
    fn test_qc_block_json_tags() {
        let failed = QcBlock::Failed {
            error: "java.lang.Exception".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(serde_json::from_value::<QcBlock>(json).unwrap(), failed);
    }

    #[test]
    fn test_missing_tool() {
        assert!(matches!(
            FastqcRunner::locate("definitely-not-a-real-fastqc-binary", None),
            Err(ProfilerError::ToolNotFound(_))
        ));
    }

    #[cfg(unix)]
    mod fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn install(dir: &Path, body: &str) -> PathBuf {
            let script = dir.join("fastqc");
            fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        #[test]
        fn test_successful_run_is_parsed() {
            let dir = tempfile::tempdir().unwrap();
            let report = dir.path().join("report.txt");
            fs::write(&report, REPORT).unwrap();
            let script = install(
                dir.path(),
                &format!(
                    "mkdir -p \"$2/reads_fastqc\" && cp {} \"$2/reads_fastqc/fastqc_data.txt\"",
                    report.display()
                ),
            );

            let runner = FastqcRunner::locate(script.to_str().unwrap(), Some(2)).unwrap();
            let block = runner.run(Path::new("reads.fq")).unwrap();
            let parsed = block.report().unwrap();
            assert_eq!(parsed.version.as_deref(), Some("0.11.9"));
        }

        #[test]
        fn test_exception_on_stderr_fails_the_run() {
            let dir = tempfile::tempdir().unwrap();
            let script = install(
                dir.path(),
                "echo 'uk.ac.babraham.FastQC.Sequence.SequenceFormatException: bad' >&2",
            );
            let block = FastqcRunner::new(script, None).run(Path::new("reads.fq")).unwrap();
            assert!(block.is_failed());
        }

        #[test]
        fn test_missing_report_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let script = install(dir.path(), "exit 0");
            let err = FastqcRunner::new(script, None)
                .run(Path::new("reads.fq"))
                .unwrap_err();
            assert!(matches!(err, ProfilerError::QcReportMissing(_)));
        }
    }
}
