//! Response normalization
//!
//! Turns raw JSON pages from either API dialect into [`Record`]s: nested
//! objects are flattened to dotted keys, known time fields become
//! timezone-aware instants and coordinate strings become floats. Anything a
//! conversion cannot handle is left as received and reported as a
//! [`Warning::Normalization`]; normalization itself never fails.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{Page, Warning};

/// Leaf field names that hold a date or datetime
const TIME_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "observed_on",
    "time_observed_at",
    "observed_at",
    "last_observation_at",
    "posted_at",
];

/// Leaf field names that hold a float, sometimes sent as a string
const FLOAT_FIELDS: &[&str] = &["latitude", "longitude", "positional_accuracy"];

/// Formats tried, in order, for timestamps without a usable offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %I:%M %p",
];

/// A typed value in a normalized record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    List(Vec<FieldValue>),
    Record(Record),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    fn from_scalar(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s.clone()),
            // Only reached for arrays/objects nested in non-record positions
            other => Self::String(other.to_string()),
        }
    }
}

/// A normalized API record: dotted-path keys mapped to typed values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FieldValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn get_datetime(&self, key: &str) -> Option<&DateTime<FixedOffset>> {
        self.get(key).and_then(FieldValue::as_datetime)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

/// Normalize one raw page.
///
/// Accepts the Node shape (`{"results": [...], "total_results": n}`), the
/// REST shape (a bare array) or a single object.
pub fn normalize_page(raw: &Value) -> Page {
    let mut warnings = Vec::new();

    let (records, total_results) = match raw {
        Value::Array(items) => (normalize_items(items, &mut warnings), None),
        Value::Object(obj) => {
            let total = obj.get("total_results").and_then(Value::as_u64);
            match obj.get("results") {
                Some(Value::Array(items)) => (normalize_items(items, &mut warnings), total),
                Some(Value::Object(inner)) => {
                    (vec![normalize_object(inner, "", &mut warnings)], total)
                }
                _ => (vec![normalize_object(obj, "", &mut warnings)], total),
            }
        }
        Value::Null => (Vec::new(), None),
        other => {
            warnings.push(Warning::Normalization {
                field: "<page>".to_string(),
                value: other.to_string(),
                reason: "expected an object or array".to_string(),
            });
            (Vec::new(), None)
        }
    };

    for warning in &warnings {
        warn!(warning = %warning, "Response normalization warning");
    }

    Page {
        records,
        total_results,
        next_cursor: None,
        warnings,
    }
}

fn normalize_items(items: &[Value], warnings: &mut Vec<Warning>) -> Vec<Record> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => normalize_object(obj, "", warnings),
            other => {
                let mut record = Record::default();
                record
                    .fields
                    .insert("value".to_string(), FieldValue::from_scalar(other));
                record
            }
        })
        .collect()
}

/// Normalize a JSON object into a record; `path` prefixes warning field names
fn normalize_object(obj: &Map<String, Value>, path: &str, warnings: &mut Vec<Warning>) -> Record {
    let mut record = Record::default();
    flatten_into(obj, "", path, &mut record.fields, warnings);

    let keys: Vec<String> = record.fields.keys().cloned().collect();
    for key in keys {
        convert_field(&mut record, &key, path, warnings);
    }
    convert_observed_on(&mut record, path, warnings);
    record
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn flatten_into(
    obj: &Map<String, Value>,
    prefix: &str,
    path: &str,
    out: &mut BTreeMap<String, FieldValue>,
    warnings: &mut Vec<Warning>,
) {
    for (key, value) in obj {
        let full_key = join_key(prefix, key);
        match value {
            Value::Object(inner) if !inner.is_empty() => {
                flatten_into(inner, &full_key, path, out, warnings)
            }
            Value::Object(_) => {
                out.insert(full_key, FieldValue::Record(Record::default()));
            }
            Value::Array(items) => {
                let item_path = format!("{}[]", join_key(path, &full_key));
                let list = items
                    .iter()
                    .map(|item| match item {
                        Value::Object(inner) => {
                            FieldValue::Record(normalize_object(inner, &item_path, warnings))
                        }
                        other => FieldValue::from_scalar(other),
                    })
                    .collect();
                out.insert(full_key, FieldValue::List(list));
            }
            other => {
                out.insert(full_key, FieldValue::from_scalar(other));
            }
        }
    }
}

fn leaf(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

fn convert_field(record: &mut Record, key: &str, path: &str, warnings: &mut Vec<Warning>) {
    let Some(value) = record.fields.get_mut(key) else {
        return;
    };
    let leaf = leaf(key);
    let field = || join_key(path, key);

    if TIME_FIELDS.contains(&leaf) {
        if let FieldValue::String(s) = value {
            if s.is_empty() {
                return;
            }
            match parse_timestamp(s) {
                Some(dt) => *value = FieldValue::DateTime(dt),
                None => warnings.push(Warning::Normalization {
                    field: field(),
                    value: s.clone(),
                    reason: "unrecognized timestamp format".to_string(),
                }),
            }
        }
    } else if FLOAT_FIELDS.contains(&leaf) {
        if let FieldValue::String(s) = value {
            match s.trim().parse::<f64>() {
                Ok(f) => *value = FieldValue::Float(f),
                Err(e) => warnings.push(Warning::Normalization {
                    field: field(),
                    value: s.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    } else if leaf == "location" {
        if let FieldValue::String(s) = value {
            if !s.contains(',') {
                return;
            }
            match parse_float_list(s.split(',')) {
                Some(coords) => *value = coords,
                None => warnings.push(Warning::Normalization {
                    field: field(),
                    value: s.clone(),
                    reason: "expected \"latitude,longitude\"".to_string(),
                }),
            }
        }
    } else if key.ends_with("geojson.coordinates") {
        if let FieldValue::List(items) = value {
            let strings: Option<Vec<String>> = items
                .iter()
                .map(|item| match item {
                    FieldValue::String(s) => Some(s.clone()),
                    FieldValue::Int(i) => Some(i.to_string()),
                    FieldValue::Float(f) => Some(f.to_string()),
                    _ => None,
                })
                .collect();
            match strings.and_then(|s| parse_float_list(s.iter().map(String::as_str))) {
                Some(coords) => *value = coords,
                None => warnings.push(Warning::Normalization {
                    field: field(),
                    value: format!("{:?}", items),
                    reason: "expected numeric coordinates".to_string(),
                }),
            }
        }
    }
}

fn parse_float_list<'a>(parts: impl Iterator<Item = &'a str>) -> Option<FieldValue> {
    parts
        .map(|part| part.trim().parse::<f64>().ok().map(FieldValue::Float))
        .collect::<Option<Vec<_>>>()
        .map(FieldValue::List)
}

/// Rebuild `observed_on` from the observer's local time and UTC offset.
///
/// The offset in `time_zone_offset` is more reliable than any zone
/// embedded in `observed_on_string`, which is ignored.
fn convert_observed_on(record: &mut Record, path: &str, warnings: &mut Vec<Warning>) {
    let (Some(observed), Some(offset)) = (
        record.get_str("observed_on_string"),
        record.get_str("time_zone_offset"),
    ) else {
        return;
    };
    if observed.is_empty() || offset.is_empty() {
        return;
    }

    let converted = parse_offset(offset).and_then(|offset| {
        parse_naive_ignoring_zone(observed)
            .and_then(|naive| offset.from_local_datetime(&naive).single())
    });

    match converted {
        Some(dt) => {
            record
                .fields
                .insert("observed_on".to_string(), FieldValue::DateTime(dt));
        }
        None => warnings.push(Warning::Normalization {
            field: join_key(path, "observed_on_string"),
            value: format!("{} ({})", observed, offset),
            reason: "could not combine observed time with UTC offset".to_string(),
        }),
    }
}

/// Parse an ISO-8601-ish timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    Some(DateTime::<FixedOffset>::from(Utc.from_utc_datetime(&naive)))
}

/// Parse a local timestamp, dropping any trailing zone name or offset
fn parse_naive_ignoring_zone(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Some(dt.naive_local());
    }

    let tokens: Vec<&str> = value.split_whitespace().collect();
    // Try the whole string, then with up to two trailing tokens ("PDT", "GMT-0700") removed
    (0..=2.min(tokens.len().saturating_sub(1))).find_map(|drop| {
        let candidate = tokens[..tokens.len() - drop].join(" ");
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&candidate, format).ok())
    })
}

/// Parse a UTC offset such as `GMT-08:00`, `-06:00`, `+05:30` or `0530`
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let mut text = value.trim();
    for prefix in ["GMT", "UTC"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
        }
    }
    if text.is_empty() {
        return FixedOffset::east_opt(0);
    }

    let sign = if text.starts_with('-') { -1 } else { 1 };
    let text = text.trim_start_matches(['+', '-']);
    let (hours, minutes) = match text.split_once(':') {
        Some((h, m)) => (h, m),
        None if text.len() > 2 => (text.get(..2)?, text.get(2..)?),
        None => (text, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
