//! Per-file read statistics
//!
//! One streaming pass over the sequence lines. Memory is constant apart from
//! the table of distinct sequences used for the duplication figures.

use crate::error::{ProfilerError, Result};
use crate::fastq::{FastqRecord, FastqStream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsBlock {
    pub total_reads: u64,
    pub unique_reads: u64,
    pub percent_unique: f64,
    pub most_abundant_sequence: String,
    pub most_abundant_frequency: u64,
    pub most_abundant_frequency_percent: f64,
    pub cum_length: u64,
    #[serde(rename = "A_count")]
    pub a_count: u64,
    #[serde(rename = "T_count")]
    pub t_count: u64,
    #[serde(rename = "C_count")]
    pub c_count: u64,
    #[serde(rename = "G_count")]
    pub g_count: u64,
    #[serde(rename = "N_count")]
    pub n_count: u64,
    pub bases: u64,
    #[serde(rename = "GC_content")]
    pub gc_content: f64,
    pub min_length: u64,
    pub max_length: u64,
    pub avg_length: f64,
}

/// Running totals for a stream of reads.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    total_reads: u64,
    cum_length: u64,
    min_length: Option<u64>,
    max_length: u64,
    a: u64,
    t: u64,
    c: u64,
    g: u64,
    n: u64,
    // sequence -> (occurrences, first seen)
    counts: HashMap<String, (u64, u64)>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sequence: &str) {
        let length = sequence.len() as u64;
        for base in sequence.bytes() {
            match base {
                b'A' => self.a += 1,
                b'T' => self.t += 1,
                b'C' => self.c += 1,
                b'G' => self.g += 1,
                b'N' => self.n += 1,
                _ => {}
            }
        }
        self.cum_length += length;
        self.min_length = Some(self.min_length.map_or(length, |m| m.min(length)));
        self.max_length = self.max_length.max(length);

        let order = self.total_reads;
        match self.counts.get_mut(sequence) {
            Some((count, _)) => *count += 1,
            None => {
                self.counts.insert(sequence.to_string(), (1, order));
            }
        }
        self.total_reads += 1;
    }

    /// Finalize the totals. `path` names the source in the empty-file error.
    pub fn finish<P: AsRef<Path>>(self, path: P) -> Result<StatsBlock> {
        if self.total_reads == 0 || self.cum_length == 0 {
            return Err(ProfilerError::EmptyFastq(path.as_ref().to_path_buf()));
        }

        let unique_reads = self.counts.values().filter(|(count, _)| *count == 1).count() as u64;
        let (most_abundant_sequence, most_abundant_frequency) = self
            .counts
            .into_iter()
            .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
            .map(|(seq, (count, _))| (seq, count))
            .unwrap_or_default();

        let total = self.total_reads as f64;
        Ok(StatsBlock {
            total_reads: self.total_reads,
            unique_reads,
            percent_unique: unique_reads as f64 * 100.0 / total,
            most_abundant_sequence,
            most_abundant_frequency,
            most_abundant_frequency_percent: most_abundant_frequency as f64 * 100.0 / total,
            cum_length: self.cum_length,
            a_count: self.a,
            t_count: self.t,
            c_count: self.c,
            g_count: self.g,
            n_count: self.n,
            bases: self.a + self.t + self.c + self.g,
            gc_content: (self.g + self.c) as f64 / self.cum_length as f64,
            min_length: self.min_length.unwrap_or(0),
            max_length: self.max_length,
            avg_length: self.cum_length as f64 / total,
        })
    }
}

/// Compute statistics over every record of a FASTQ file.
pub fn calculate_fastq_stats<P: AsRef<Path>>(path: P) -> Result<StatsBlock> {
    let stream = FastqStream::from_path(&path, None)?;
    calculate_stats(stream, path)
}

/// Compute statistics over an already opened record stream.
pub fn calculate_stats<I, P>(records: I, path: P) -> Result<StatsBlock>
where
    I: IntoIterator<Item = Result<FastqRecord>>,
    P: AsRef<Path>,
{
    let mut acc = StatsAccumulator::new();
    for record in records {
        acc.push(&record?.sequence);
    }
    acc.finish(path)
}
