//! Streaming FASTQ records
//!
//! Reads plain or gzip-compressed FASTQ four lines at a time. The stream is
//! forward-only; reopen the file to start again.

use crate::error::{ProfilerError, Result};
use flate2::read::MultiGzDecoder;
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A single FASTQ record with surrounding whitespace stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub header: String,
    pub sequence: String,
    pub quality: String,
}

/// Whether a filename indicates gzip compression.
pub fn is_compressed<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Open `path` for buffered reading, decompressing `.gz` files transparently.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let file = File::open(path.as_ref())?;
    if is_compressed(&path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub struct FastqStream<R: BufRead> {
    reader: R,
    path: PathBuf,
    line_buffer: String,
    line_number: usize,
    remaining: Option<usize>,
    done: bool,
}

impl FastqStream<Box<dyn BufRead>> {
    /// Open a FASTQ file. `limit` bounds the number of records yielded;
    /// `None` or `Some(0)` reads to the end of the file.
    pub fn from_path<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Self> {
        let reader = open_reader(&path)?;
        Ok(Self::new(reader, path.as_ref(), limit))
    }
}

impl<R: BufRead> FastqStream<R> {
    pub fn new<P: AsRef<Path>>(reader: R, path: P, limit: Option<usize>) -> Self {
        Self {
            reader,
            path: path.as_ref().to_path_buf(),
            line_buffer: String::with_capacity(512),
            line_number: 0,
            remaining: limit.filter(|&n| n > 0),
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.line_buffer.clear();
        let read = self
            .reader
            .read_line(&mut self.line_buffer)
            .map_err(|e| ProfilerError::unrecognized(&self.path, e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(self.line_buffer.trim().to_string()))
    }

    fn read_record(&mut self) -> Result<Option<FastqRecord>> {
        let header = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        let header_line = self.line_number;
        if !header.starts_with('@') {
            return Err(ProfilerError::unrecognized(
                &self.path,
                format!("line {} is not a FASTQ header: {:?}", header_line, header),
            ));
        }

        let mut rest = Vec::with_capacity(3);
        for _ in 0..3 {
            match self.read_line()? {
                Some(line) => rest.push(line),
                None => {
                    warn!(
                        "{}: ignoring truncated record starting at line {}",
                        self.path.display(),
                        header_line
                    );
                    return Ok(None);
                }
            }
        }
        let quality = rest.pop().unwrap_or_default();
        let plus = rest.pop().unwrap_or_default();
        let sequence = rest.pop().unwrap_or_default();
        if !plus.starts_with('+') {
            return Err(ProfilerError::unrecognized(
                &self.path,
                format!("line {} should be a '+' separator", header_line + 2),
            ));
        }

        Ok(Some(FastqRecord {
            header,
            sequence,
            quality,
        }))
    }
}

impl<R: BufRead> Iterator for FastqStream<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
