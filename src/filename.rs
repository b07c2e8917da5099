//! Illumina filename conventions
//!
//! `<sample>_<barcode>_L<lane>_R<read>_<set>.fastq.gz` and
//! `<sample>_S<number>_L<lane>_R<read>_<set>.fastq.gz` (also `.fq.gz`).

use crate::value::{autoconvert, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

const PREFIX: &str = "illumina_filename_";

lazy_static! {
    static ref CONVENTIONS: Vec<(Regex, [&'static str; 5])> = vec![
        (
            Regex::new(r"^(.+)_([ACGTN]+)_(L[0-9]{3})_([RI][0-9])_([0-9]{3})\.f(?:ast)?q\.gz$").unwrap(),
            ["sample", "barcode_sequence", "lane", "read", "set_number"],
        ),
        (
            Regex::new(r"^(.+)_(S[0-9]+)_(L[0-9]{3})_([RI][0-9])_([0-9]{3})\.f(?:ast)?q\.gz$").unwrap(),
            ["sample", "sample_number", "lane", "read", "set_number"],
        ),
    ];
}

/// Fields encoded in a file's basename; empty when no convention matches.
pub fn parse_filename<P: AsRef<Path>>(path: P) -> BTreeMap<String, Value> {
    let basename = match path.as_ref().file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return BTreeMap::new(),
    };

    for (pattern, names) in CONVENTIONS.iter() {
        if let Some(caps) = pattern.captures(basename) {
            return names
                .iter()
                .enumerate()
                .map(|(i, name)| (format!("{}{}", PREFIX, name), autoconvert(&caps[i + 1])))
                .collect();
        }
    }
    BTreeMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_convention() {
        let fields = parse_filename("/data/run1/sample1_ACGT_L001_R1_001.fastq.gz");
        assert_eq!(fields.len(), 5);
        assert_eq!(fields["illumina_filename_sample"], Value::Str("sample1".into()));
        assert_eq!(fields["illumina_filename_barcode_sequence"], Value::Str("ACGT".into()));
        assert_eq!(fields["illumina_filename_lane"], Value::Str("L001".into()));
        assert_eq!(fields["illumina_filename_read"], Value::Str("R1".into()));
        assert_eq!(fields["illumina_filename_set_number"], Value::Int(1));
    }

    #[test]
    fn test_sample_number_convention() {
        let fields = parse_filename("N2_rep_1_S12_L004_R2_001.fq.gz");
        assert_eq!(fields["illumina_filename_sample"], Value::Str("N2_rep_1".into()));
        assert_eq!(fields["illumina_filename_sample_number"], Value::Str("S12".into()));
        assert_eq!(fields["illumina_filename_lane"], Value::Str("L004".into()));
        assert!(!fields.contains_key("illumina_filename_barcode_sequence"));
    }

    #[test]
    fn test_no_match_contributes_nothing() {
        assert!(parse_filename("reads.fastq.gz").is_empty());
        assert!(parse_filename("sample1_ACGT_L001_R1_001.fastq").is_empty());
    }
}
