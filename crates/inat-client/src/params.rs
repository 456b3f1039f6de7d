//! Request parameter values and their wire encoding
//!
//! Parameters are kept as typed [`ParamValue`]s until a request is built, then
//! encoded into query pairs:
//!
//! - booleans become `"true"` / `"false"`
//! - `0` and `0.0` are always sent (only a missing value is omitted)
//! - lists become repeated entries or one comma-joined value
//! - dates become `YYYY-MM-DD`; datetimes become RFC 3339 with an explicit
//!   offset, naive datetimes being read in the local time zone

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{InatError, Result};
use crate::validation::validate_multiple_choice_params;

/// Request parameters that accept date or datetime strings, in either API dialect
pub const DATETIME_PARAMS: &[&str] = &[
    "created_after",
    "created_d1",
    "created_d2",
    "created_on",
    "d1",
    "d2",
    "newer_than",
    "observation_created_d1",
    "observation_created_d2",
    "observed_d1",
    "observed_d2",
    "observed_on",
    "older_than",
    "on",
    "since",
    "updated_since",
];

/// A single typed request parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Date(NaiveDate),
    /// A datetime without offset; interpreted in the local time zone
    NaiveDateTime(NaiveDateTime),
    DateTime(DateTime<FixedOffset>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Empty strings and empty lists are dropped like missing values
    fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.iter().all(ParamValue::is_empty),
            _ => false,
        }
    }

    /// Encode a scalar value (lists are flattened by the caller)
    fn encode_scalar(&self) -> Result<String> {
        Ok(match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::NaiveDateTime(naive) => localize(naive)?.to_rfc3339(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            Self::List(items) => items
                .iter()
                .map(ParamValue::encode_scalar)
                .collect::<Result<Vec<_>>>()?
                .join(","),
        })
    }

    fn flatten_into(&self, out: &mut Vec<ParamValue>) {
        match self {
            Self::List(items) => items.iter().for_each(|item| item.flatten_into(out)),
            other if other.is_empty() => {}
            other => out.push(other.clone()),
        }
    }
}

/// Attach the local UTC offset to a naive datetime
fn localize(naive: &NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(DateTime::<FixedOffset>::from)
        .ok_or_else(|| InatError::Validation(format!("{} does not exist in the local time zone", naive)))
}

/// Parse a date or datetime string given for a date parameter
pub(crate) fn parse_datetime_str(key: &str, value: &str) -> Result<ParamValue> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(ParamValue::DateTime(dt));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ParamValue::NaiveDateTime(naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(ParamValue::Date)
        .map_err(|e| InatError::Validation(format!("Invalid date for \"{}\": {} ({})", key, value, e)))
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        // iNaturalist IDs fit comfortably in i64
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::NaiveDateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for ParamValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(DateTime::<FixedOffset>::from(v))
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// How list values are put on the wire; an endpoint convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStyle {
    /// `taxon_id=1,2,3`
    #[default]
    CommaJoined,
    /// `taxon_id[]=1&taxon_id[]=2` style repeated keys (without the brackets)
    Repeated,
}

/// Named request parameters. `None` is never stored: a missing value is an absent key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    values: BTreeMap<String, ParamValue>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style insert that skips `None`
    pub fn with_opt<V: Into<ParamValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.set_opt(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Insert a value, or remove the key when given `None`
    pub fn set_opt<V: Into<ParamValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        let key = key.into();
        match value {
            Some(v) => {
                self.values.insert(key, v.into());
            }
            None => {
                self.values.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ParamValue> {
        self.values.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    /// `count_only=true` is shorthand for `per_page=0`
    pub fn apply_count_only(&mut self) {
        if let Some(ParamValue::Bool(true)) = self.values.remove("count_only") {
            self.values.insert("per_page".to_string(), ParamValue::Int(0));
        }
    }

    /// Validate and encode into query pairs, in key order
    pub fn encode(&self, list_style: ListStyle) -> Result<Vec<(String, String)>> {
        let mut params = self.clone();
        params.apply_count_only();
        validate_multiple_choice_params(&mut params)?;

        let mut pairs = Vec::with_capacity(params.len());
        for (key, value) in params.values {
            let value = match value {
                ParamValue::Str(s) if DATETIME_PARAMS.contains(&key.as_str()) && !s.is_empty() => {
                    parse_datetime_str(&key, &s)?
                }
                other => other,
            };
            if value.is_empty() {
                continue;
            }

            match (&value, list_style) {
                (ParamValue::List(_), ListStyle::Repeated) => {
                    let mut items = Vec::new();
                    value.flatten_into(&mut items);
                    for item in items {
                        pairs.push((key.clone(), item.encode_scalar()?));
                    }
                }
                (ParamValue::List(_), ListStyle::CommaJoined) => {
                    let mut items = Vec::new();
                    value.flatten_into(&mut items);
                    let joined = items
                        .iter()
                        .map(ParamValue::encode_scalar)
                        .collect::<Result<Vec<_>>>()?
                        .join(",");
                    pairs.push((key, joined));
                }
                _ => pairs.push((key, value.encode_scalar()?)),
            }
        }
        Ok(pairs)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}
