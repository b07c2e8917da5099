//! Error types for fastq-profiler

use std::path::PathBuf;

/// Result type alias for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;

#[derive(thiserror::Error, Debug)]
pub enum ProfilerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input files not found: {}", display_paths(.0))]
    MissingInputs(Vec<PathBuf>),

    /// No complete FASTQ record could be read.
    #[error("empty or unreadable FASTQ: {}", .0.display())]
    EmptyFastq(PathBuf),

    #[error("unrecognized FASTQ format in {}: {reason}", .path.display())]
    UnrecognizedFormat { path: PathBuf, reason: String },

    #[error("malformed checksum cache {} at line {line}: {content:?}", .cache.display())]
    CacheCorrupt {
        cache: PathBuf,
        line: usize,
        content: String,
    },

    #[error("record store error: {0}")]
    Store(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not installed or not on PATH")]
    ToolNotFound(String),

    #[error("QC report not found under {}", .0.display())]
    QcReportMissing(PathBuf),

    #[error("unknown QC module: {0}")]
    UnknownModule(String),
}

impl ProfilerError {
    /// Errors that only disqualify a single input file; the batch carries on.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            ProfilerError::EmptyFastq(_) | ProfilerError::UnrecognizedFormat { .. }
        )
    }

    pub(crate) fn unrecognized<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        ProfilerError::UnrecognizedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_errors() {
        assert!(ProfilerError::EmptyFastq(PathBuf::from("a.fq")).is_per_file());
        assert!(ProfilerError::unrecognized("a.fq", "bad header").is_per_file());
        assert!(!ProfilerError::Store("offline".into()).is_per_file());
        assert!(!ProfilerError::MissingInputs(vec![]).is_per_file());
    }

    #[test]
    fn test_missing_inputs_lists_every_path() {
        let err = ProfilerError::MissingInputs(vec![PathBuf::from("a.fq"), PathBuf::from("b.fq")]);
        assert_eq!(err.to_string(), "input files not found: a.fq, b.fq");
    }
}
