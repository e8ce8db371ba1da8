//! Typed scalar values carried by extracted rows

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Timestamp layout used when rendering and parsing text timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Date layout used when rendering and parsing text dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day layout used when rendering and parsing text times
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// A single cell of a result set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (all integer widths are widened to i64)
    Int(i64),
    /// Floating point or decimal
    Float(f64),
    /// Text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Date and time without zone
    Timestamp(NaiveDateTime),
}

impl Scalar {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Date(_) => "date",
            Scalar::Time(_) => "time",
            Scalar::Timestamp(_) => "timestamp",
        }
    }

    /// Integer view of the value
    ///
    /// Floats are accepted only when they carry no fractional part, and
    /// text only when it parses as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text content, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp view of the value
    ///
    /// Dates are promoted to midnight. Text is parsed with
    /// [`TIMESTAMP_FORMAT`] (an ISO `T` separator is accepted as well).
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Scalar::Timestamp(ts) => Some(*ts),
            Scalar::Date(d) => d.and_hms_opt(0, 0, 0),
            Scalar::Text(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, DATE_FORMAT)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }

    /// Time-of-day view of the value
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Scalar::Time(t) => Some(*t),
            Scalar::Timestamp(ts) => Some(ts.time()),
            Scalar::Text(s) => NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok(),
            _ => None,
        }
    }

    /// Render the value as an unquoted delimited-text field
    ///
    /// NULL renders as the empty string.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
            Scalar::Date(d) => d.format(DATE_FORMAT).to_string(),
            Scalar::Time(t) => t.format(TIME_FORMAT).to_string(),
            Scalar::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int(_) | Scalar::Float(_) => 2,
            Scalar::Text(_) => 3,
            Scalar::Date(_) => 4,
            Scalar::Time(_) => 5,
            Scalar::Timestamp(_) => 6,
        }
    }

    /// Total order over values: NULL first, then by kind, then by value
    ///
    /// Integers and floats compare numerically with each other.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64).total_cmp(b),
            (Scalar::Float(a), Scalar::Int(b)) => a.total_cmp(&(*b as f64)),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Time(a), Scalar::Time(b)) => a.cmp(b),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

impl From<NaiveTime> for Scalar {
    fn from(value: NaiveTime) -> Self {
        Scalar::Time(value)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(value: NaiveDateTime) -> Self {
        Scalar::Timestamp(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}
