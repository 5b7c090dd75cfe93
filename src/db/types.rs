//! Row and value types for sandboxed query results.
//!
//! Result rows and planner rows share the same ordered [`Record`] shape so
//! that column order and labels survive exactly as the database reports them.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// A single value read from a database row.
///
/// NULL is its own variant and is never conflated with zero or an empty string.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Unsigned integer (MySQL `... UNSIGNED` columns).
    UInt(u64),

    /// Floating point number.
    Float(f64),

    /// Exact numeric kept in its textual form.
    Decimal(String),

    /// Text/string value.
    String(String),

    /// Date, time or timestamp rendered as ISO-8601 text.
    Temporal(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as a non-negative integer if it is numeric.
    ///
    /// Text is never coerced; only values the driver decoded as numbers count.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::UInt(u) => Some(*u),
            Value::Float(f) if f.is_finite() && *f >= 0.0 => Some(*f as u64),
            Value::Decimal(d) => d.split('.').next().and_then(|whole| whole.parse().ok()),
            _ => None,
        }
    }

    /// Converts the value to its display form.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(s) | Value::String(s) | Value::Temporal(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// An ordered mapping of column label to value.
///
/// Serializes as a JSON object whose keys keep the database's column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a labelled value.
    pub fn push(&mut self, label: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((label.into(), value.into()));
    }

    /// Builder-style variant of [`Record::push`].
    pub fn with(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(label, value);
        self
    }

    /// Returns the first value with exactly this label.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    /// Returns the first value whose label matches ignoring ASCII case.
    pub fn get_ignore_case(&self, label: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, value)| value)
    }

    /// Column labels in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Labelled values in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One step of a query plan, as reported by the planner.
pub type PlanRow = Record;

/// Column labels and materialized rows of one statement.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RowSet {
    /// Column labels in result-set order.
    pub columns: Vec<String>,

    /// Rows of data.
    pub rows: Vec<Record>,
}

impl RowSet {
    /// Creates a row set with the given columns and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Output of one sandboxed unit of work: the plan probe and the statement rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SandboxRun {
    /// Planner rows for the statement.
    pub plan: Vec<PlanRow>,

    /// Rows produced by the statement itself.
    pub result: RowSet,
}
