//! Batch profiling driver
//!
//! Ties the checksum cache, header sniffing, statistics, filename parsing and
//! the optional QC tool together, and merges the result into the record store.
//! Per-file failures are collected and reported once the batch is done.

use crate::checksum::{absolute_path, ChecksumCache};
use crate::error::{ProfilerError, Result};
use crate::fastqc::QcRunner;
use crate::filename::parse_filename;
use crate::header::FastqFile;
use crate::record::{merge, FileRecord, PartialUpdate};
use crate::settings::Settings;
use crate::stats::calculate_fastq_stats;
use crate::store::RecordStore;
use crate::value::Value;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A file that was skipped and why.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: ProfilerError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<FileRecord>,
    pub failures: Vec<FileFailure>,
    /// Files whose QC tool run was skipped because a result was already stored.
    pub qc_skipped: usize,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Profiler<'a, S: RecordStore> {
    settings: Settings,
    store: &'a mut S,
    cache: ChecksumCache,
    qc: Option<Box<dyn QcRunner + 'a>>,
    metadata: BTreeMap<String, Value>,
}

impl<'a, S: RecordStore> Profiler<'a, S> {
    pub fn new(settings: Settings, store: &'a mut S) -> Self {
        Self {
            settings,
            store,
            cache: ChecksumCache::new(),
            qc: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Run `runner` on every file that has no stored QC result yet.
    pub fn with_qc(mut self, runner: Box<dyn QcRunner + 'a>) -> Self {
        self.qc = Some(runner);
        self
    }

    /// User key/value metadata attached to every record touched.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cache(&self) -> &ChecksumCache {
        &self.cache
    }

    /// Profile every file, merging results into the store.
    pub fn profile_all(&mut self, paths: &[PathBuf]) -> Result<BatchReport> {
        check_exists(paths)?;
        let mut report = BatchReport::default();
        for path in paths {
            self.run_one(path, false, &mut report)?;
        }
        Ok(report)
    }

    /// Return stored records for each file, profiling files not yet known.
    pub fn fetch_all(&mut self, paths: &[PathBuf]) -> Result<BatchReport> {
        check_exists(paths)?;
        let mut report = BatchReport::default();
        for path in paths {
            self.run_one(path, true, &mut report)?;
        }
        Ok(report)
    }

    fn run_one(&mut self, path: &Path, fetch: bool, report: &mut BatchReport) -> Result<()> {
        match self.process(path, fetch, report) {
            Ok((record, qc_error)) => {
                report.records.push(record);
                if let Some(error) = qc_error {
                    report.failures.push(FileFailure {
                        path: path.to_path_buf(),
                        error,
                    });
                }
            }
            Err(error) if error.is_per_file() => {
                warn!("skipping {}: {}", path.display(), error);
                report.failures.push(FileFailure {
                    path: path.to_path_buf(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Profile or fetch one file. A QC runner error does not discard the
    /// profile: the record is stored without a QC block, so the next run
    /// tries the tool again, and the error is handed back for reporting.
    fn process(
        &mut self,
        path: &Path,
        fetch: bool,
        report: &mut BatchReport,
    ) -> Result<(FileRecord, Option<ProfilerError>)> {
        let checksum = self.cache.checksum(path)?;
        let kind = self.settings.kind.clone();
        let existing = self.store.get(&kind, &checksum)?;
        let mut qc_error = None;

        let update = match &existing {
            Some(_) if fetch => self.identity_update(path)?,
            _ => {
                info!("profiling {} ({})", path.display(), checksum);
                let mut update = self.profile_update(path)?;
                let has_qc = existing.as_ref().map(FileRecord::has_qc).unwrap_or(false);
                if let Some(runner) = &self.qc {
                    if has_qc {
                        report.qc_skipped += 1;
                    } else {
                        match runner.run(path) {
                            Ok(block) => update.qc = Some(block),
                            Err(error) => {
                                warn!("QC run failed for {}: {}", path.display(), error);
                                qc_error = Some(error);
                            }
                        }
                    }
                }
                update
            }
        };

        let base = existing.unwrap_or_else(|| FileRecord::new(checksum.clone()));
        let record = merge(base, update);
        self.store.put(&kind, &checksum, &record)?;
        Ok((record, qc_error))
    }

    /// Fields that come from where a file lives rather than what it holds.
    fn identity_update(&self, path: &Path) -> Result<PartialUpdate> {
        let meta = fs::metadata(path)?;
        Ok(PartialUpdate {
            filenames: vec![absolute_name(path)?],
            size: Some(meta.len()),
            created: created_time(&meta),
            filename_fields: parse_filename(path),
            metadata: self.metadata.clone(),
            ..Default::default()
        })
    }

    fn profile_update(&self, path: &Path) -> Result<PartialUpdate> {
        let fastq = FastqFile::open(path)?;
        let stats = calculate_fastq_stats(path)?;
        let mut update = self.identity_update(path)?;
        update.dialect = Some(fastq.dialect.name().to_string());
        update.header = fastq.attributes;
        update.stats = Some(stats);
        Ok(update)
    }
}

fn check_exists(paths: &[PathBuf]) -> Result<()> {
    let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.is_file()).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProfilerError::MissingInputs(missing))
    }
}

fn absolute_name(path: &Path) -> Result<String> {
    Ok(absolute_path(path)?.display().to_string())
}

fn created_time(meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    meta.created()
        .or_else(|_| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastqc::QcBlock;
    use crate::store::MemoryStore;
    use std::cell::Cell;
    use std::rc::Rc;

    const READS: &str = "@M1:1:FC1:1:1:1:1 1:N:0:ACGT\nACGT\n+\nIIII\n\
@M1:1:FC1:1:1:1:2 1:N:0:ACGT\nACGT\n+\nIIII\n\
@M1:1:FC1:1:1:1:3 1:N:0:ACGT\nAATT\n+\nIIII\n";

    struct CountingRunner {
        calls: Rc<Cell<usize>>,
        outcome: QcBlock,
    }

    impl QcRunner for CountingRunner {
        fn run(&self, _fastq: &Path) -> Result<QcBlock> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.outcome.clone())
        }
    }

    /// Fails every run the way a tool that exits cleanly without a report does.
    struct MissingReportRunner;

    impl QcRunner for MissingReportRunner {
        fn run(&self, fastq: &Path) -> Result<QcBlock> {
            Err(ProfilerError::QcReportMissing(fastq.to_path_buf()))
        }
    }

    #[test]
    fn test_profile_populates_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample1_ACGT_L001_R1_001.fastq");
        fs::write(&path, READS).unwrap();

        let mut store = MemoryStore::new();
        let report = Profiler::new(Settings::default(), &mut store)
            .profile_all(&[path.clone()])
            .unwrap();
        assert!(report.is_success());

        let record = &report.records[0];
        assert_eq!(record.dialect.as_deref(), Some("illumina"));
        assert_eq!(record.header["barcode"], Value::Str("ACGT".into()));
        assert_eq!(record.stats.as_ref().unwrap().total_reads, 3);
        assert_eq!(record.size, Some(READS.len() as u64));
        assert_eq!(record.profile_count, 1);
        assert!(record.filename_fields.is_empty());
        assert_eq!(store.get("fastq", &record.checksum).unwrap().as_ref(), Some(record));
    }

    #[test]
    fn test_bad_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.fq");
        let good = dir.path().join("good.fq");
        fs::write(&empty, "").unwrap();
        fs::write(&good, READS).unwrap();

        let mut store = MemoryStore::new();
        let report = Profiler::new(Settings::default(), &mut store)
            .profile_all(&[empty.clone(), good])
            .unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, empty);
        assert!(matches!(report.failures[0].error, ProfilerError::EmptyFastq(_)));
    }

    #[test]
    fn test_missing_input_aborts_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.fq");
        fs::write(&good, READS).unwrap();

        let mut store = MemoryStore::new();
        let err = Profiler::new(Settings::default(), &mut store)
            .profile_all(&[good, dir.path().join("nope.fq")])
            .unwrap_err();
        assert!(matches!(err, ProfilerError::MissingInputs(ref m) if m.len() == 1));
        assert_eq!(store.puts, 0);
    }

    #[test]
    fn test_failed_qc_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq");
        fs::write(&path, READS).unwrap();
        let calls = Rc::new(Cell::new(0));

        let mut store = MemoryStore::new();
        for _ in 0..2 {
            let runner = CountingRunner {
                calls: calls.clone(),
                outcome: QcBlock::Failed {
                    error: "SequenceFormatException".into(),
                },
            };
            Profiler::new(Settings::default(), &mut store)
                .with_qc(Box::new(runner))
                .profile_all(&[path.clone()])
                .unwrap();
        }

        assert_eq!(calls.get(), 1);
        let record = store.scan("fastq").unwrap().remove(0);
        assert!(record.qc.unwrap().is_failed());
        assert_eq!(record.profile_count, 2);
    }

    #[test]
    fn test_fetch_merges_without_reprofiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq");
        fs::write(&path, READS).unwrap();

        let mut store = MemoryStore::new();
        Profiler::new(Settings::default(), &mut store)
            .profile_all(&[path.clone()])
            .unwrap();

        let mut metadata = BTreeMap::new();
        metadata.insert("strain".to_string(), Value::Str("N2".into()));
        let report = Profiler::new(Settings::default(), &mut store)
            .with_metadata(metadata)
            .fetch_all(&[path])
            .unwrap();
        let record = &report.records[0];
        assert_eq!(record.metadata["strain"], Value::Str("N2".into()));
        assert_eq!(record.stats.as_ref().unwrap().total_reads, 3);
        assert_eq!(record.profile_count, 2);
    }

    #[test]
    fn test_qc_runner_error_is_a_per_file_failure() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.fq");
        let first = dir.path().join("first.fq");
        let second = dir.path().join("second.fq");
        fs::write(&empty, "").unwrap();
        fs::write(&first, READS).unwrap();
        fs::write(&second, READS.replace("AATT", "GGCC")).unwrap();

        let mut store = MemoryStore::new();
        let report = Profiler::new(Settings::default(), &mut store)
            .with_qc(Box::new(MissingReportRunner))
            .profile_all(&[empty, first.clone(), second.clone()])
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(report.failures[0].error, ProfilerError::EmptyFastq(_)));
        assert_eq!(report.failures[1].path, first);
        assert!(matches!(report.failures[1].error, ProfilerError::QcReportMissing(_)));
        assert_eq!(report.failures[2].path, second);

        let stored = store.scan("fastq").unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.qc.is_none() && r.stats.is_some()));
    }

    #[test]
    fn test_qc_runner_error_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq");
        fs::write(&path, READS).unwrap();

        let mut store = MemoryStore::new();
        Profiler::new(Settings::default(), &mut store)
            .with_qc(Box::new(MissingReportRunner))
            .profile_all(&[path.clone()])
            .unwrap();

        let calls = Rc::new(Cell::new(0));
        let runner = CountingRunner {
            calls: calls.clone(),
            outcome: QcBlock::Failed {
                error: "SequenceFormatException".into(),
            },
        };
        let report = Profiler::new(Settings::default(), &mut store)
            .with_qc(Box::new(runner))
            .profile_all(&[path])
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(report.qc_skipped, 0);
        assert!(report.records[0].qc.as_ref().unwrap().is_failed());
    }

    #[test]
    fn test_path_aliases_record_one_filename() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("reads.fq");
        fs::write(&path, READS).unwrap();
        let alias = dir.path().join("sub").join("..").join("reads.fq");

        let mut store = MemoryStore::new();
        let mut profiler = Profiler::new(Settings::default(), &mut store);
        let report = profiler.profile_all(&[path.clone(), alias]).unwrap();
        assert_eq!(profiler.cache().files_hashed(), 1);
        drop(profiler);

        let record = report.records.last().unwrap();
        assert_eq!(record.filenames.len(), 1);
        assert!(record.filenames.contains(&absolute_name(&path).unwrap()));
    }
}
