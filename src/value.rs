//! Loosely typed attribute values
//!
//! Header tokens, filename fields and user metadata arrive as strings and are
//! coerced into the narrowest matching type before being stored.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Marker that flags a string as a date, e.g. `date-2016-04-01`.
pub const DATE_PREFIX: &str = "date-";

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%B %d %Y"];

/// Stored untagged, except dates which are wrapped as `{"date": "..."}` so a
/// string that merely looks like a timestamp reads back as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    #[serde(with = "tagged_date")]
    Date(NaiveDateTime),
    List(Vec<String>),
    Str(String),
}

mod tagged_date {
    use super::*;

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        date: NaiveDateTime,
    }

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged { date: *date }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        Tagged::deserialize(deserializer).map(|t| t.date)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S")),
            Value::List(items) => write!(f, "{}", items.join(",")),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

/// Coerce a string into a typed value.
///
/// Tries, in order, the literals `True`/`False`, a whole-string integer and a
/// whole-string finite float. Strings carrying the [`DATE_PREFIX`] marker are
/// parsed as dates. Anything else is returned unchanged.
pub fn autoconvert(s: &str) -> Value {
    match s {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = s.parse::<f64>() {
        if x.is_finite() {
            return Value::Float(x);
        }
    }
    if let Some(rest) = s.strip_prefix(DATE_PREFIX) {
        if let Some(date) = parse_date(rest) {
            return Value::Date(date);
        }
    }
    Value::Str(s.to_string())
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
