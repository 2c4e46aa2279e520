// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Records returned by batch fetch functions and key projection over them.

use std::collections::BTreeMap;

use crate::{Key, KeySpec, Value};

/// A fetched record: a mapping from column name to scalar value.
///
/// The loader only reads the columns named by its primary key and registered unique
/// keys. A column that the record does not carry is reported as `None`, which never
/// matches any key.
///
/// # Examples
///
/// ```
/// use rowloader::{Record, Value};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Record for User {
///     fn value(&self, column: &str) -> Option<Value> {
///         match column {
///             "id" => Some(self.id.into()),
///             "name" => Some(self.name.as_str().into()),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Record {
    /// Returns the value of `column`, or `None` if the record has no such column.
    fn value(&self, column: &str) -> Option<Value>;
}

impl<T: Record + ?Sized> Record for std::sync::Arc<T> {
    fn value(&self, column: &str) -> Option<Value> {
        (**self).value(column)
    }
}

/// A general purpose record with named columns.
///
/// # Examples
///
/// ```
/// use rowloader::{Record, Row, Value};
///
/// let row = Row::new().with("id", 1).with("name", "luckydrq");
/// assert_eq!(row.value("id"), Some(Value::Int(1)));
/// assert_eq!(row.value("email"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the row with `column` set to `value`.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets `column` to `value`, returning the previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    /// Returns a reference to the value of `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Iterates over the columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Record for Row {
    fn value(&self, column: &str) -> Option<Value> {
        self.columns.get(column).cloned()
    }
}

impl<C: Into<String>, V: Into<Value>> FromIterator<(C, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(c, v)| (c.into(), v.into())).collect(),
        }
    }
}

#[cfg(feature = "serde_json")]
impl Record for serde_json::Map<String, serde_json::Value> {
    fn value(&self, column: &str) -> Option<Value> {
        match self.get(column)? {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int).or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// The values a record holds for the columns of a [`KeySpec`].
///
/// Missing columns are kept as `None` so that a partial record can never be
/// mistaken for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Projection over a single column.
    Scalar(Option<Value>),
    /// Projection over several columns, in spec order.
    Composite(Vec<Option<Value>>),
}

impl Projection {
    /// Projects `record` onto the columns of `spec`.
    pub fn of<R: Record + ?Sized>(record: &R, spec: &KeySpec) -> Self {
        match spec {
            KeySpec::Column(column) => Self::Scalar(record.value(column)),
            KeySpec::Columns(columns) => Self::Composite(columns.iter().map(|c| record.value(c)).collect()),
        }
    }

    /// Returns `true` if every projected column is present and equals the matching
    /// element of `key`.
    #[must_use]
    pub fn matches(&self, key: &Key) -> bool {
        match (self, key) {
            (Self::Scalar(Some(value)), Key::Scalar(expected)) => value == expected,
            (Self::Composite(values), Key::Composite(expected)) => {
                values.len() == expected.len()
                    && values.iter().zip(expected).all(|(value, expected)| value.as_ref() == Some(expected))
            }
            _ => false,
        }
    }

    /// Converts the projection into a key, or `None` if any column was missing.
    #[must_use]
    pub fn into_key(self) -> Option<Key> {
        match self {
            Self::Scalar(value) => value.map(Key::Scalar),
            Self::Composite(values) => values.into_iter().collect::<Option<Vec<_>>>().map(Key::Composite),
        }
    }
}
