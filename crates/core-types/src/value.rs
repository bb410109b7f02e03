use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The literal text a form uses when a nullable field has no selection.
pub const NULL_PLACEHOLDER: &str = "None";

/// A single scalar, used both as a statement parameter and as a result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Bool(bool),
    Bytes(Vec<u8>),
}

/// One result row, cells in select-list order.
pub type Row = Vec<SqlValue>;

/// A full result set. An empty set is a valid answer, not a failure.
pub type RowSet = Vec<Row>;

impl SqlValue {
    /// Maps the "no value" markers (`""` and `"None"`) to `Null`.
    ///
    /// Every other value, including whitespace-only text, passes through untouched.
    pub fn normalized(self) -> SqlValue {
        match self {
            SqlValue::Text(s) if s.is_empty() || s == NULL_PLACEHOLDER => SqlValue::Null,
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(b) => Some(*b as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text view of a cell, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Reads a decimal from whatever representation the driver produced.
    /// SQLite hands back NUMERIC columns as REAL or TEXT.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Decimal(d) => Some(*d),
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            SqlValue::Float(f) => Decimal::from_f64(*f).map(|d| d.round_dp(2)),
            SqlValue::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::DateTime(dt) => Some(dt.date()),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(t) => Some(*t),
            SqlValue::Text(s) => {
                let s = s.trim();
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
            }
            _ => None,
        }
    }
}

/// Normalizes a parameter list before it is bound to a statement.
pub fn normalize_params(params: &[SqlValue]) -> Vec<SqlValue> {
    params.iter().cloned().map(SqlValue::normalized).collect()
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Decimal(v) => write!(f, "{v}"),
            SqlValue::Text(v) => write!(f, "{v}"),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_and_placeholder_text_become_null() {
        let params = vec![
            SqlValue::from(""),
            SqlValue::from("None"),
            SqlValue::from("Jane"),
            SqlValue::from(" "),
            SqlValue::Int(0),
        ];
        let normalized = normalize_params(&params);
        assert_eq!(
            normalized,
            vec![
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::from("Jane"),
                SqlValue::from(" "),
                SqlValue::Int(0),
            ]
        );
    }

    #[test]
    fn placeholder_match_is_exact() {
        assert_eq!(SqlValue::from("none").normalized(), SqlValue::from("none"));
        assert_eq!(SqlValue::from("NULL").normalized(), SqlValue::from("NULL"));
    }

    #[test]
    fn option_converts_to_null() {
        let missing: Option<i64> = None;
        assert_eq!(SqlValue::from(missing), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7_i64)), SqlValue::Int(7));
    }

    #[test]
    fn accessors_read_driver_text_representations() {
        assert_eq!(
            SqlValue::from("2024-02-29").as_date(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            SqlValue::from("09:30").as_time(),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(SqlValue::Float(120.5).as_decimal(), Some(dec!(120.50)));
        assert_eq!(SqlValue::from("99.99").as_decimal(), Some(dec!(99.99)));
        assert_eq!(SqlValue::Null.to_text(), None);
    }
}
