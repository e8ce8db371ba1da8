//! Row transforms applied after a definition's query has run
//!
//! Every rule that has to be identical across definitions lives here
//! (time keys, sentinels, ordinal fact keys) so catalog entries only name
//! the columns they apply to.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDateTime, Timelike};

use super::calendar::Locale;
use crate::error::{EtlError, EtlResult};
use crate::keys::{self, KeyRef, Label, TimeKey, UNKNOWN_KEY};
use crate::models::{ResultSet, Row, Scalar};

/// Column names produced by [`Transform::TimeDimension`]
pub const TIME_DIMENSION_COLUMNS: [&str; 6] = ["TiempoKey", "Fecha", "Anio", "Mes", "Dia", "Hora"];

/// Per-run values the transforms may read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformContext {
    /// Load time of the run, stamped into audit columns and used as "now"
    pub loaded_at: NaiveDateTime,
    /// Language of calendar attributes
    pub locale: Locale,
}

impl TransformContext {
    /// Create a context; the load time is truncated to whole seconds
    pub fn new(loaded_at: NaiveDateTime, locale: Locale) -> Self {
        Self {
            loaded_at: TimeKey::truncate(loaded_at),
            locale,
        }
    }

    /// Context stamped with the current local time
    pub fn now(locale: Locale) -> Self {
        Self::new(chrono::Local::now().naive_local(), locale)
    }
}

/// One step of a transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Dimension key taken from a natural identifier; NULL and `-1` are rejected
    SurrogateKey { source: String, target: String },
    /// NULL foreign key becomes `-1`
    UnknownKey { column: String },
    /// NULL attribute becomes `"Sin <noun>"`
    UnknownLabel { column: String, noun: &'static str },
    /// NULL measure becomes `0`
    ZeroMeasure { column: String },
    /// Time key of a timestamp column; NULL becomes `-1`
    TimeKey { source: String, target: String },
    /// Replace the rows with the distinct truncated timestamps of a column
    /// and their calendar attributes
    TimeDimension { source: String },
    /// Position (1-based) after a stable sort on the given columns,
    /// ties broken by the whole row
    OrdinalKey { target: String, order_by: Vec<String> },
    /// Whole minutes between two timestamps, counted at minute boundaries
    MinutesBetween { start: String, end: String, target: String },
    /// Minutes between two times of day, wrapping past midnight
    ShiftMinutes { start: String, end: String, target: String },
    /// Calendar years from a timestamp to the run's load time
    YearsSince { source: String, target: String },
    /// Non-null parts joined with a separator
    Concat { sources: Vec<String>, separator: String, target: String },
    /// The run's load time
    AuditTimestamp { target: String },
}

fn require(rs: &ResultSet, column: &str) -> EtlResult<usize> {
    rs.column_index(column)
        .ok_or_else(|| EtlError::transform(column, "column not present in result set"))
}

fn on_column(column: &str) -> impl Fn(EtlError) -> EtlError + '_ {
    move |err| match err {
        EtlError::Transform { message, .. } => EtlError::transform(column, message),
        EtlError::InvalidTimestamp(message) => EtlError::transform(column, message),
        other => other,
    }
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn minute_of_day<T: Timelike>(t: &T) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

impl Transform {
    /// Apply this step to a result set in place
    pub fn apply(&self, rs: &mut ResultSet, ctx: &TransformContext) -> EtlResult<()> {
        match self {
            Transform::SurrogateKey { source, target } => {
                let src = require(rs, source)?;
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    let key = match &row[src] {
                        Scalar::Null => {
                            return Err(EtlError::transform(source, "natural key is null"));
                        }
                        value => value.as_i64().ok_or_else(|| {
                            EtlError::transform(
                                source,
                                format!("{} value '{}' is not an integer key", value.type_name(), value),
                            )
                        })?,
                    };
                    if key == UNKNOWN_KEY {
                        return Err(EtlError::transform(
                            source,
                            format!("natural key {} collides with the unknown sentinel", key),
                        ));
                    }
                    row[tgt] = Scalar::Int(key);
                }
            }
            Transform::UnknownKey { column } => {
                let idx = require(rs, column)?;
                for row in &mut rs.rows {
                    row[idx] = KeyRef::from_scalar(&row[idx])
                        .map_err(on_column(column))?
                        .into();
                }
            }
            Transform::UnknownLabel { column, noun } => {
                let idx = require(rs, column)?;
                for row in &mut rs.rows {
                    row[idx] = Label::from_scalar(&row[idx], *noun).into();
                }
            }
            Transform::ZeroMeasure { column } => {
                let idx = require(rs, column)?;
                for row in &mut rs.rows {
                    if row[idx].is_null() {
                        row[idx] = Scalar::Int(0);
                    } else if row[idx].as_f64().is_none() {
                        return Err(EtlError::transform(
                            column,
                            format!(
                                "{} value '{}' is not numeric",
                                row[idx].type_name(),
                                row[idx]
                            ),
                        ));
                    }
                }
            }
            Transform::TimeKey { source, target } => {
                let src = require(rs, source)?;
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    row[tgt] = keys::time_key_ref(&row[src])
                        .map_err(on_column(source))?
                        .into();
                }
            }
            Transform::TimeDimension { source } => {
                let src = require(rs, source)?;
                // Deduplicate after normalization, never before
                let mut distinct = BTreeSet::new();
                for row in &rs.rows {
                    if row[src].is_null() {
                        continue;
                    }
                    distinct.insert(keys::normalize_time(&row[src]).map_err(on_column(source))?);
                }

                let mut rows = Vec::with_capacity(distinct.len());
                for key in distinct {
                    let ts = key.to_timestamp().ok_or_else(|| {
                        EtlError::transform(source, format!("time key {} does not decode", key))
                    })?;
                    let date = ts.date();
                    rows.push(vec![
                        Scalar::from(key),
                        Scalar::Timestamp(ts),
                        Scalar::Int(i64::from(date.year())),
                        Scalar::from(ctx.locale.month_name(date)),
                        Scalar::from(ctx.locale.weekday_name(date)),
                        Scalar::Time(ts.time()),
                    ]);
                }
                rs.columns = TIME_DIMENSION_COLUMNS.iter().map(|c| c.to_string()).collect();
                rs.rows = rows;
            }
            Transform::OrdinalKey { target, order_by } => {
                let order: Vec<usize> = order_by
                    .iter()
                    .map(|c| require(rs, c))
                    .collect::<EtlResult<_>>()?;
                rs.rows.sort_by(|a, b| {
                    order
                        .iter()
                        .map(|&i| a[i].total_cmp(&b[i]))
                        .find(|o| o.is_ne())
                        .unwrap_or_else(|| compare_rows(a, b))
                });
                let tgt = rs.ensure_column(target);
                for (position, row) in rs.rows.iter_mut().enumerate() {
                    row[tgt] = Scalar::Int(position as i64 + 1);
                }
            }
            Transform::MinutesBetween { start, end, target } => {
                let s = require(rs, start)?;
                let e = require(rs, end)?;
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    row[tgt] = match (row[s].as_timestamp(), row[e].as_timestamp()) {
                        (Some(a), Some(b)) => Scalar::Float(
                            (truncate_to_minute(b) - truncate_to_minute(a)).num_minutes() as f64,
                        ),
                        _ => Scalar::Null,
                    };
                }
            }
            Transform::ShiftMinutes { start, end, target } => {
                let s = require(rs, start)?;
                let e = require(rs, end)?;
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    row[tgt] = match (row[s].as_time(), row[e].as_time()) {
                        (Some(a), Some(b)) => {
                            let minutes = minute_of_day(&b) - minute_of_day(&a);
                            Scalar::Int(if b < a { minutes + 1440 } else { minutes })
                        }
                        _ => Scalar::Null,
                    };
                }
            }
            Transform::YearsSince { source, target } => {
                let src = require(rs, source)?;
                let tgt = rs.ensure_column(target);
                let current_year = i64::from(ctx.loaded_at.year());
                for row in &mut rs.rows {
                    row[tgt] = match row[src].as_timestamp() {
                        Some(ts) => Scalar::Int(current_year - i64::from(ts.year())),
                        None => Scalar::Null,
                    };
                }
            }
            Transform::Concat {
                sources,
                separator,
                target,
            } => {
                let idxs: Vec<usize> = sources
                    .iter()
                    .map(|c| require(rs, c))
                    .collect::<EtlResult<_>>()?;
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    let parts: Vec<String> = idxs
                        .iter()
                        .filter(|&&i| !row[i].is_null())
                        .map(|&i| row[i].render().trim().to_string())
                        .collect();
                    row[tgt] = if parts.is_empty() {
                        Scalar::Null
                    } else {
                        Scalar::Text(parts.join(separator))
                    };
                }
            }
            Transform::AuditTimestamp { target } => {
                let tgt = rs.ensure_column(target);
                for row in &mut rs.rows {
                    row[tgt] = Scalar::Timestamp(ctx.loaded_at);
                }
            }
        }
        Ok(())
    }
}

fn compare_rows(a: &Row, b: &Row) -> std::cmp::Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}
