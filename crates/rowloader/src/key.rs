// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key values and key specifications.
//!
//! A [`Key`] is either a single scalar [`Value`] or an ordered tuple of values
//! matching a composite unique key. Keys are compared and hashed by value: two keys
//! are equal iff they have the same shape and their elements are equal one by one.
//!
//! A [`KeySpec`] names the column (or ordered columns) a key is matched against.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A scalar column value.
///
/// Values compare structurally with one normalization: a [`Value::Float`] holding an
/// exact integer compares equal to the matching [`Value::Int`], so `1` and `1.0` name
/// the same key. Text never compares equal to a number.
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Borrowed, normalized view of a [`Value`] used for equality and hashing.
#[derive(PartialEq, Eq, Hash)]
enum Canonical<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl Value {
    fn canonical(&self) -> Canonical<'_> {
        match self {
            Self::Null => Canonical::Null,
            Self::Bool(b) => Canonical::Bool(*b),
            Self::Int(i) => Canonical::Int(*i),
            Self::Float(f) => canonical_float(*f),
            Self::Text(s) => Canonical::Text(s),
            Self::Bytes(b) => Canonical::Bytes(b),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content if this is a [`Value::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this value is integral.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.canonical() {
            Canonical::Int(i) => Some(i),
            _ => None,
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp,
    reason = "the round trip check below rejects every lossy conversion"
)]
fn canonical_float(f: f64) -> Canonical<'static> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        let i = f as i64;
        if i as f64 == f {
            return Canonical::Int(i);
        }
    }
    if f.is_nan() {
        return Canonical::Float(f64::NAN.to_bits());
    }
    Canonical::Float(f.to_bits())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A lookup key: one scalar, or an ordered tuple of scalars for a composite key.
///
/// # Examples
///
/// ```
/// use rowloader::Key;
///
/// assert_eq!(Key::from(1), Key::from(1.0));
/// assert_ne!(Key::from(1), Key::from("1"));
/// assert_eq!(Key::from(["n1", "e1"]), Key::composite(["n1", "e1"]));
/// assert_ne!(Key::from("n1"), Key::composite(["n1"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A single column value.
    Scalar(Value),
    /// Values of several columns, in column order.
    Composite(Vec<Value>),
}

impl Key {
    /// Creates a composite key from the given values, in order.
    pub fn composite<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::Composite(values.into_iter().map(Into::into).collect())
    }

    /// Returns the number of values in the key.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Composite(values) => values.len(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Composite(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

macro_rules! key_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key {
                fn from(v: $t) -> Self {
                    Self::Scalar(Value::from(v))
                }
            }
        )*
    };
}

key_from_scalar!(i8, i16, i32, i64, u8, u16, u32, bool, f32, f64, &str, String);

impl<T: Into<Value>, const N: usize> From<[T; N]> for Key {
    fn from(values: [T; N]) -> Self {
        Self::composite(values)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Key {
    fn from(values: Vec<T>) -> Self {
        Self::composite(values)
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Key {
    fn from((a, b): (A, B)) -> Self {
        Self::Composite(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Key {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::Composite(vec![a.into(), b.into(), c.into()])
    }
}

/// Names the column, or ordered columns, that a key is matched against.
///
/// The primary key is always a single column. Unique keys may span several columns,
/// in which case lookups use a [`Key::Composite`] with one value per column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySpec {
    /// A single column.
    Column(String),
    /// Several columns, in order.
    Columns(Vec<String>),
}

impl KeySpec {
    /// Returns the column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Column(column) => std::slice::from_ref(column),
            Self::Columns(columns) => columns,
        }
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        !self.columns().is_empty() && self.columns().iter().all(|c| !c.is_empty())
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => f.write_str(column),
            Self::Columns(columns) => {
                f.write_str("[")?;
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{column:?}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for KeySpec {
    fn from(column: &str) -> Self {
        Self::Column(column.to_owned())
    }
}

impl From<String> for KeySpec {
    fn from(column: String) -> Self {
        Self::Column(column)
    }
}

impl From<&String> for KeySpec {
    fn from(column: &String) -> Self {
        Self::Column(column.clone())
    }
}

impl From<&Self> for KeySpec {
    fn from(spec: &Self) -> Self {
        spec.clone()
    }
}

impl<const N: usize> From<[&str; N]> for KeySpec {
    fn from(columns: [&str; N]) -> Self {
        Self::Columns(columns.iter().map(|c| (*c).to_owned()).collect())
    }
}

impl From<Vec<&str>> for KeySpec {
    fn from(columns: Vec<&str>) -> Self {
        Self::Columns(columns.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for KeySpec {
    fn from(columns: Vec<String>) -> Self {
        Self::Columns(columns)
    }
}
