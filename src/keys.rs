//! Surrogate key derivation and the "unknown" reference convention
//!
//! [`normalize_time`] is the single definition of the time key. The time
//! dimension and every fact that carries a `TiempoKey` column go through it,
//! so a fact row can never reference a key the dimension does not contain.
//!
//! Missing references are never published as NULL. A foreign key that does
//! not resolve becomes [`KeyRef::Unknown`] (rendered as [`UNKNOWN_KEY`]) and a
//! descriptive attribute that does not resolve becomes [`Label::Unknown`]
//! (rendered as `"Sin <noun>"`).

use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::error::{EtlError, EtlResult};
use crate::models::Scalar;

/// Reserved surrogate key meaning "unknown / absent"
pub const UNKNOWN_KEY: i64 = -1;

/// Prefix of the reserved "unknown" label
pub const UNKNOWN_LABEL_PREFIX: &str = "Sin";

/// Canonical time key, `YYYYMMDDHHMMSS` as a 14-digit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeKey(i64);

impl TimeKey {
    /// Truncate a timestamp to whole seconds
    pub fn truncate(ts: NaiveDateTime) -> NaiveDateTime {
        ts.with_nanosecond(0).unwrap_or(ts)
    }

    /// Build the key of a timestamp
    ///
    /// Sub-second precision is discarded. Years outside `1000..=9999` have no
    /// 14-digit encoding and are rejected.
    pub fn from_timestamp(ts: NaiveDateTime) -> EtlResult<Self> {
        let year = ts.year();
        if !(1000..=9999).contains(&year) {
            return Err(EtlError::InvalidTimestamp(format!(
                "{} is outside the encodable year range",
                ts
            )));
        }
        let ts = Self::truncate(ts);
        let key = i64::from(year) * 10_000_000_000
            + i64::from(ts.month()) * 100_000_000
            + i64::from(ts.day()) * 1_000_000
            + i64::from(ts.hour()) * 10_000
            + i64::from(ts.minute()) * 100
            + i64::from(ts.second());
        Ok(TimeKey(key))
    }

    /// Integer value of the key
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Decode the key back into its (truncated) timestamp
    pub fn to_timestamp(&self) -> Option<NaiveDateTime> {
        let v = self.0;
        let date = chrono::NaiveDate::from_ymd_opt(
            (v / 10_000_000_000) as i32,
            ((v / 100_000_000) % 100) as u32,
            ((v / 1_000_000) % 100) as u32,
        )?;
        date.and_hms_opt(
            ((v / 10_000) % 100) as u32,
            ((v / 100) % 100) as u32,
            (v % 100) as u32,
        )
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:014}", self.0)
    }
}

impl From<TimeKey> for Scalar {
    fn from(key: TimeKey) -> Self {
        Scalar::Int(key.0)
    }
}

/// Normalize a raw timestamp value into its time key
///
/// Fails with [`EtlError::InvalidTimestamp`] when the value is NULL or is
/// not a timestamp. Callers map NULL to [`KeyRef::Unknown`] first; see
/// [`time_key_ref`].
pub fn normalize_time(ts: &Scalar) -> EtlResult<TimeKey> {
    if ts.is_null() {
        return Err(EtlError::InvalidTimestamp(
            "null timestamp has no time key".to_string(),
        ));
    }
    let parsed = ts.as_timestamp().ok_or_else(|| {
        EtlError::InvalidTimestamp(format!("{} value '{}' is not a timestamp", ts.type_name(), ts))
    })?;
    TimeKey::from_timestamp(parsed)
}

/// Time key reference for a fact row; NULL maps to [`KeyRef::Unknown`]
pub fn time_key_ref(ts: &Scalar) -> EtlResult<KeyRef> {
    if ts.is_null() {
        return Ok(KeyRef::Unknown);
    }
    normalize_time(ts).map(|key| KeyRef::Known(key.value()))
}

/// A foreign key that may not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRef {
    /// Resolved surrogate key
    Known(i64),
    /// No matching dimension member
    Unknown,
}

impl KeyRef {
    /// Resolve a raw source value
    ///
    /// NULL and the reserved sentinel both resolve to `Unknown`.
    pub fn from_scalar(value: &Scalar) -> EtlResult<Self> {
        match value {
            Scalar::Null => Ok(KeyRef::Unknown),
            other => match other.as_i64() {
                Some(UNKNOWN_KEY) => Ok(KeyRef::Unknown),
                Some(key) => Ok(KeyRef::Known(key)),
                None => Err(EtlError::transform(
                    "",
                    format!("{} value '{}' is not a key", other.type_name(), other),
                )),
            },
        }
    }

    /// Published integer value
    pub fn value(&self) -> i64 {
        match self {
            KeyRef::Known(key) => *key,
            KeyRef::Unknown => UNKNOWN_KEY,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, KeyRef::Unknown)
    }
}

impl From<KeyRef> for Scalar {
    fn from(key: KeyRef) -> Self {
        Scalar::Int(key.value())
    }
}

/// A descriptive attribute that may not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// Resolved attribute text
    Known(String),
    /// No matching row; the noun names what is missing (e.g. `"Tipo"`)
    Unknown(&'static str),
}

impl Label {
    /// Resolve a raw source value against the noun of its sentinel
    pub fn from_scalar(value: &Scalar, noun: &'static str) -> Self {
        match value {
            Scalar::Null => Label::Unknown(noun),
            Scalar::Text(s) => Label::Known(s.clone()),
            other => Label::Known(other.render()),
        }
    }

    /// Published text
    pub fn text(&self) -> String {
        match self {
            Label::Known(s) => s.clone(),
            Label::Unknown(noun) => unknown_label(noun),
        }
    }
}

impl From<Label> for Scalar {
    fn from(label: Label) -> Self {
        Scalar::Text(label.text())
    }
}

/// Reserved label for a missing attribute, e.g. `"Sin Sucursal"`
pub fn unknown_label(noun: &str) -> String {
    format!("{} {}", UNKNOWN_LABEL_PREFIX, noun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_time_key_encoding() {
        let key = TimeKey::from_timestamp(ts("2024-01-01 08:00:00")).unwrap();
        assert_eq!(key.value(), 20240101080000);
        assert_eq!(key.to_string(), "20240101080000");

        let key = TimeKey::from_timestamp(ts("1999-12-31 23:59:59")).unwrap();
        assert_eq!(key.value(), 19991231235959);
    }

    #[test]
    fn test_sub_second_values_collapse() {
        let base = ts("2024-01-01 08:00:00");
        let expected = TimeKey::from_timestamp(base).unwrap();
        for millis in [0, 1, 499, 500, 900, 999] {
            let shifted = base + Duration::milliseconds(millis);
            assert_eq!(TimeKey::from_timestamp(shifted).unwrap(), expected);
        }
        // Truncation, not rounding
        let next = TimeKey::from_timestamp(base + Duration::seconds(1)).unwrap();
        assert_ne!(next, expected);
        assert_eq!(next.value(), 20240101080001);
    }

    #[test]
    fn test_distinct_seconds_are_distinct_keys() {
        let base = ts("2023-12-31 23:59:58");
        let keys: Vec<TimeKey> = (0..5)
            .map(|s| TimeKey::from_timestamp(base + Duration::seconds(s)).unwrap())
            .collect();
        let mut deduped = keys.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), keys.len());
        assert_eq!(keys[2].value(), 20240101000000);
    }

    #[test]
    fn test_key_decodes_to_truncated_timestamp() {
        let key = TimeKey::from_timestamp(ts("2024-02-29 13:14:15.678")).unwrap();
        assert_eq!(key.to_timestamp(), Some(ts("2024-02-29 13:14:15")));
    }

    #[test]
    fn test_normalize_time_rejects_null() {
        let err = normalize_time(&Scalar::Null).unwrap_err();
        assert!(matches!(err, EtlError::InvalidTimestamp(_)));
        assert!(normalize_time(&Scalar::from("garbage")).is_err());
        assert!(normalize_time(&Scalar::Int(5)).is_err());
    }

    #[test]
    fn test_normalize_time_accepts_text_and_dates() {
        let key = normalize_time(&Scalar::from("2024-01-01 08:00:00.900")).unwrap();
        assert_eq!(key.value(), 20240101080000);

        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            normalize_time(&Scalar::Date(date)).unwrap().value(),
            20240101000000
        );
    }

    #[test]
    fn test_out_of_range_year() {
        let ancient = ts("0999-01-01 00:00:00");
        assert!(TimeKey::from_timestamp(ancient).is_err());
    }

    #[test]
    fn test_time_key_ref_null_is_unknown() {
        assert_eq!(time_key_ref(&Scalar::Null).unwrap(), KeyRef::Unknown);
        assert_eq!(time_key_ref(&Scalar::Null).unwrap().value(), UNKNOWN_KEY);
        let known = time_key_ref(&Scalar::Timestamp(ts("2024-01-01 08:00:00.5"))).unwrap();
        assert_eq!(known, KeyRef::Known(20240101080000));
    }

    #[test]
    fn test_key_ref_from_scalar() {
        assert_eq!(KeyRef::from_scalar(&Scalar::Null).unwrap(), KeyRef::Unknown);
        assert_eq!(KeyRef::from_scalar(&Scalar::Int(-1)).unwrap(), KeyRef::Unknown);
        assert_eq!(KeyRef::from_scalar(&Scalar::Int(4)).unwrap(), KeyRef::Known(4));
        assert!(KeyRef::from_scalar(&Scalar::from("abc")).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Label::from_scalar(&Scalar::Null, "Tipo").text(), "Sin Tipo");
        assert_eq!(
            Label::from_scalar(&Scalar::from("Congelado"), "Tipo").text(),
            "Congelado"
        );
        assert_eq!(unknown_label("Producto Base"), "Sin Producto Base");
    }
}
