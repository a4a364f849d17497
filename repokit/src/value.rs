//! Dynamically typed bind values
//!
//! [`Value`] is what conditions, model field extraction and partition list
//! groups carry. It converts from the usual Rust scalars and renders either as
//! a bind parameter or, for DDL where parameters are not allowed, as a quoted
//! SQL literal.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

use crate::types::DateTime;

/// Text layout used for date-time values on the wire and in literals
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value bound to a statement or rendered into DDL
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    /// Expanded to `(?, ?, …)` when used as a template argument
    List(Vec<Value>),
}

impl Value {
    /// Whether this is the zero value of its type
    ///
    /// Zero fields are skipped when a model instance is used as a filter and
    /// when an update writes "all non-zero fields". The Unix epoch counts as
    /// the zero date-time because it is what `Default` yields.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(v) => !v,
            Self::Int(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            Self::Text(v) => v.is_empty(),
            Self::Bytes(v) => v.is_empty(),
            Self::DateTime(v) => *v == NaiveDateTime::default(),
            Self::List(v) => v.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a SQL literal for statements that cannot take parameters
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => quote(v),
            Self::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::DateTime(v) => quote(&v.format(DATETIME_FORMAT).to_string()),
            Self::List(values) => {
                let items: Vec<String> = values.iter().map(Value::to_sql_literal).collect();
                format!("({})", items.join(", "))
            }
        }
    }

    /// Append the scalar parameters this value binds to `out`
    pub(crate) fn flatten_into(&self, out: &mut Vec<Param>) {
        match self {
            Self::Null => out.push(Param::Null),
            Self::Bool(v) => out.push(Param::Bool(*v)),
            Self::Int(v) => out.push(Param::Int(*v)),
            Self::Float(v) => out.push(Param::Float(*v)),
            Self::Text(v) => out.push(Param::Text(v.clone())),
            Self::Bytes(v) => out.push(Param::Bytes(v.clone())),
            Self::DateTime(v) => out.push(Param::Text(v.format(DATETIME_FORMAT).to_string())),
            Self::List(values) => values.iter().for_each(|v| v.flatten_into(out)),
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

/// A scalar bind parameter; lists are already expanded
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Bind a sequence of [`Param`]s onto a sqlx query builder
///
/// Works for `query`, `query_as` and `query_scalar` alike since they share the
/// `bind` method name but not a trait.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                $crate::value::Param::Null => query.bind(None::<String>),
                $crate::value::Param::Bool(v) => query.bind(*v),
                $crate::value::Param::Int(v) => query.bind(*v),
                $crate::value::Param::Float(v) => query.bind(*v),
                $crate::value::Param::Text(v) => query.bind(v.clone()),
                $crate::value::Param::Bytes(v) => query.bind(v.clone()),
            };
        }
        query
    }};
}

pub(crate) use bind_params;

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v.into_inner())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
