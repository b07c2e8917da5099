//! FASTQ header dialect detection
//!
//! The first header line of a file decides its [`Dialect`]; every dialect has
//! a fixed field schema used to turn header tokens into named attributes.
//! Dialects that carry a barcode sample the first [`BARCODE_SAMPLE_SIZE`]
//! reads and keep the most frequent value, which smooths over index hopping.

use crate::error::{ProfilerError, Result};
use crate::fastq::FastqStream;
use crate::value::{autoconvert, Value};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Reads sampled when electing a file's barcode.
pub const BARCODE_SAMPLE_SIZE: usize = 1000;

lazy_static! {
    static ref PACBIO_HEADER: Regex = Regex::new(r"^@.*/[0-9]+/[0-9]+_[0-9]+").unwrap();
}

/// Illumina 1.8+: `@EAS139:136:FC706VJ:2:2104:15343:197393 1:Y:18:ATCACG`
const ILLUMINA_FIELDS: &[Option<&str>] = &[
    Some("instrument"),
    Some("run_id"),
    Some("flowcell_id"),
    Some("flowcell_lane"),
    None, // tile
    None, // x
    None, // y
    Some("pair"),
    Some("filtered"),
    Some("control_bits"),
    Some("barcode"),
];

/// Pre-1.8 Illumina: `@HWUSI-EAS100R:6:73:941:1973#0/1`
const LEGACY_ILLUMINA_FIELDS: &[Option<&str>] = &[
    Some("instrument"),
    Some("flowcell_lane"),
    Some("flowcell_number"),
    None, // x
    None, // y
    Some("barcode"),
];

const LEGACY_ILLUMINA_PAIRED_FIELDS: &[Option<&str>] = &[
    Some("instrument"),
    Some("flowcell_lane"),
    Some("flowcell_number"),
    None,
    None,
    Some("barcode"),
    Some("pair"),
];

const PACBIO_FIELDS: &[Option<&str>] = &[Some("movie_name")];

const SRA_FIELDS: &[Option<&str>] = &[Some("SRR")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Illumina,
    LegacyIllumina,
    LegacyIlluminaPaired,
    PacBio,
    Sra,
    /// Unrecognized layout with this many tokens, named `h0..hN`.
    Unknown(usize),
}

impl Dialect {
    /// Positional schema; `None` slots are discarded.
    pub fn fields(&self) -> Vec<Option<String>> {
        let fixed = match self {
            Dialect::Illumina => ILLUMINA_FIELDS,
            Dialect::LegacyIllumina => LEGACY_ILLUMINA_FIELDS,
            Dialect::LegacyIlluminaPaired => LEGACY_ILLUMINA_PAIRED_FIELDS,
            Dialect::PacBio => PACBIO_FIELDS,
            Dialect::Sra => SRA_FIELDS,
            Dialect::Unknown(n) => return (0..*n).map(|i| Some(format!("h{}", i))).collect(),
        };
        fixed.iter().map(|f| f.map(str::to_string)).collect()
    }

    /// Token index of the barcode, for dialects that carry one.
    pub fn barcode_index(&self) -> Option<usize> {
        match self {
            Dialect::Illumina => Some(10),
            Dialect::LegacyIllumina | Dialect::LegacyIlluminaPaired => Some(5),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Illumina => "illumina",
            Dialect::LegacyIllumina | Dialect::LegacyIlluminaPaired => "legacy_illumina",
            Dialect::PacBio => "pacbio",
            Dialect::Sra => "sra",
            Dialect::Unknown(_) => "unknown",
        }
    }

    /// Header tokens this dialect stores, before schema mapping.
    fn tokens(&self, header: &str) -> Vec<String> {
        match self {
            Dialect::PacBio => vec![strip_at(header.split('/').next().unwrap_or_default())],
            Dialect::Sra => {
                let first = split_header(header).into_iter().next().unwrap_or_default();
                vec![strip_at(first.split('.').next().unwrap_or_default())]
            }
            _ => split_header(header).into_iter().map(|t| strip_at(&t)).collect(),
        }
    }
}

fn strip_at(token: &str) -> String {
    token.strip_prefix('@').unwrap_or(token).to_string()
}

/// Split a header on `:`, `#`, `/` and space, keeping empty tokens.
pub fn split_header(header: &str) -> Vec<String> {
    header
        .split([':', '#', '/', ' '])
        .map(str::to_string)
        .collect()
}

/// Classify a header line.
pub fn sniff(header: &str) -> Dialect {
    let tokens = split_header(header);
    let colon_style = header.matches(':').count() > 3;

    if colon_style {
        match tokens.len() {
            11 => return Dialect::Illumina,
            6 => return Dialect::LegacyIllumina,
            7 => return Dialect::LegacyIlluminaPaired,
            _ => {}
        }
    } else if PACBIO_HEADER.is_match(header) {
        return Dialect::PacBio;
    }

    if header.starts_with("@SRR") {
        Dialect::Sra
    } else {
        Dialect::Unknown(tokens.len())
    }
}

/// Map a header's tokens onto its dialect schema, coercing each value.
pub fn extract(dialect: Dialect, header: &str) -> BTreeMap<String, Value> {
    dialect
        .fields()
        .into_iter()
        .zip(dialect.tokens(header))
        .filter_map(|(field, token)| field.map(|name| (name, autoconvert(&token))))
        .collect()
}

/// Most frequent item; ties go to the value seen first.
pub fn most_common<I, T>(items: I) -> Option<T>
where
    I: IntoIterator<Item = T>,
    T: std::hash::Hash + Eq + Clone,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (i, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(item, _)| item)
}

/// A FASTQ file whose header dialect has been identified.
#[derive(Debug, Clone)]
pub struct FastqFile {
    pub path: PathBuf,
    pub dialect: Dialect,
    pub attributes: BTreeMap<String, Value>,
}

impl FastqFile {
    /// Sniff the dialect of `path` and extract its header attributes.
    ///
    /// Fails with [`ProfilerError::EmptyFastq`] when no complete record exists
    /// and [`ProfilerError::UnrecognizedFormat`] when the file cannot be read
    /// as FASTQ.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let first = match FastqStream::from_path(path, Some(1))?.next() {
            Some(record) => record?,
            None => return Err(ProfilerError::EmptyFastq(path.to_path_buf())),
        };

        let dialect = sniff(&first.header);
        debug!("{}: {:?} header dialect", path.display(), dialect);
        let mut attributes = extract(dialect, &first.header);

        if let Some(index) = dialect.barcode_index() {
            let mut barcodes = Vec::with_capacity(BARCODE_SAMPLE_SIZE);
            for record in FastqStream::from_path(path, Some(BARCODE_SAMPLE_SIZE))? {
                let record = record?;
                let token = split_header(&record.header)
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| {
                        ProfilerError::unrecognized(
                            path,
                            format!("no barcode field in header {:?}", record.header),
                        )
                    })?;
                barcodes.push(token);
            }
            if let Some(barcode) = most_common(barcodes) {
                attributes.insert("barcode".to_string(), autoconvert(&barcode));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            dialect,
            attributes,
        })
    }
}
