//! Condition and order folding
//!
//! Loosely typed filter inputs ([`Condition`]) are folded into a [`Criteria`]
//! value that the engine renders into `WHERE` and `ORDER BY` clauses. Folding
//! never validates argument counts; [`Statement::build`] does that when the
//! final SQL is assembled.

use crate::engine::dialect::quote_ident;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::value::{Param, Value};

/// A single predicate unit
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Raw predicate text without arguments, e.g. `deleted_at is null`
    Expr(String),
    /// Predicate text with `?` placeholders and their positional arguments
    Template { sql: String, args: Vec<Value> },
    /// Column equality, one predicate per pair
    Fields(Vec<(String, Value)>),
}

impl Condition {
    pub fn expr(sql: impl Into<String>) -> Self {
        Self::Expr(sql.into())
    }

    pub fn template(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Template {
            sql: sql.into(),
            args,
        }
    }

    /// `column = value`, or `column IS NULL` for [`Value::Null`]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Fields(vec![(column.into(), value.into())])
    }

    /// `column IN (…)`
    pub fn is_in<T: Into<Value>>(column: &str, values: Vec<T>) -> Self {
        Self::template(format!("{} in ?", quote_ident(column)), vec![Value::from(values)])
    }

    /// Equality on every non-zero field of `record`
    ///
    /// An all-zero record yields a condition that adds no predicate.
    pub fn matching<M: Model>(record: &M) -> Self {
        Self::Fields(
            record
                .non_zero_fields()
                .into_iter()
                .map(|(column, value)| (column.name.to_string(), value))
                .collect(),
        )
    }
}

/// Build a [`Condition`] from a template and optional arguments
///
/// ```rust
/// use repokit::{cond, Condition, Value};
///
/// assert_eq!(cond!("deleted_at is null"), Condition::expr("deleted_at is null"));
/// assert_eq!(
///     cond!("age > ?", 18),
///     Condition::template("age > ?", vec![Value::Int(18)])
/// );
/// ```
#[macro_export]
macro_rules! cond {
    ($sql:expr $(,)?) => {
        $crate::Condition::expr($sql)
    };
    ($sql:expr, $($arg:expr),+ $(,)?) => {
        $crate::Condition::template($sql, vec![$($crate::Value::from($arg)),+])
    };
}

/// Accumulated predicates, arguments and order directives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    predicates: Vec<String>,
    args: Vec<Value>,
    orders: Vec<String>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND one condition onto the criteria
    pub fn and(mut self, condition: Condition) -> Self {
        match condition {
            Condition::Expr(sql) => {
                if !sql.trim().is_empty() {
                    self.predicates.push(sql);
                }
            }
            Condition::Template { sql, args } => {
                // Arguments of a blank template are kept so the final
                // statement reports the placeholder mismatch
                if !sql.trim().is_empty() {
                    self.predicates.push(sql);
                }
                self.args.extend(args);
            }
            Condition::Fields(fields) => {
                for (column, value) in fields {
                    if value.is_null() {
                        self.predicates.push(format!("{} IS NULL", quote_ident(&column)));
                    } else {
                        self.predicates.push(format!("{} = ?", quote_ident(&column)));
                        self.args.push(value);
                    }
                }
            }
        }
        self
    }

    /// Append one order directive; blank directives are ignored
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        let order = order.into();
        if !order.trim().is_empty() {
            self.orders.push(order);
        }
        self
    }

    pub fn has_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn orders(&self) -> &[String] {
        &self.orders
    }

    /// ` WHERE (p1) AND (p2)`, or an empty string
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let joined: Vec<String> = self.predicates.iter().map(|p| format!("({p})")).collect();
        format!(" WHERE {}", joined.join(" AND "))
    }

    /// ` ORDER BY o1, o2`, or an empty string
    pub fn order_clause(&self) -> String {
        if self.orders.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", self.orders.join(", "))
        }
    }
}

/// Fold conditions onto `criteria` in list order; `None` entries are skipped
pub fn apply_conditions<I, C>(criteria: Criteria, conditions: I) -> Criteria
where
    I: IntoIterator<Item = C>,
    C: Into<Option<Condition>>,
{
    conditions
        .into_iter()
        .filter_map(Into::<Option<Condition>>::into)
        .fold(criteria, Criteria::and)
}

/// Append order directives in list order; blank directives are skipped
pub fn apply_order<I, S>(criteria: Criteria, orders: I) -> Criteria
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    orders.into_iter().fold(criteria, Criteria::order_by)
}

/// Final SQL text with its flattened bind parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Param>,
}

impl Statement {
    /// Assemble a statement from template text and positional arguments
    ///
    /// List arguments expand their placeholder to `(?, ?, …)` (an empty list
    /// becomes `(NULL)`). Placeholders inside quoted literals are not counted.
    /// A count mismatch is a [`Error::Validation`].
    pub fn build(sql: &str, args: &[Value]) -> Result<Self> {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut params = Vec::with_capacity(args.len());
        let mut remaining = args.iter();
        let mut placeholders = 0usize;

        for segment in scan(sql) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder => {
                    placeholders += 1;
                    match remaining.next() {
                        Some(Value::List(items)) if items.is_empty() => out.push_str("(NULL)"),
                        Some(Value::List(items)) => {
                            let marks = vec!["?"; flat_len(items)].join(", ");
                            out.push('(');
                            out.push_str(&marks);
                            out.push(')');
                            items.iter().for_each(|v| v.flatten_into(&mut params));
                        }
                        Some(value) => {
                            out.push('?');
                            value.flatten_into(&mut params);
                        }
                        None => out.push('?'),
                    }
                }
            }
        }

        if placeholders != args.len() {
            return Err(Error::validation(format!(
                "statement has {placeholders} placeholder(s) but {} argument(s): {sql}",
                args.len()
            )));
        }

        Ok(Self { sql: out, params })
    }

    /// Statement without arguments
    pub(crate) fn plain(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn params(&self) -> &[Param] {
        &self.params
    }
}

fn flat_len(items: &[Value]) -> usize {
    items
        .iter()
        .map(|v| match v {
            Value::List(inner) => flat_len(inner),
            _ => 1,
        })
        .sum()
}

/// Number of `?` placeholders outside quoted literals and identifiers
pub fn count_placeholders(sql: &str) -> usize {
    scan(sql)
        .into_iter()
        .filter(|s| matches!(s, Segment::Placeholder))
        .count()
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder,
}

fn scan(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    if bytes.get(i + 1) == Some(&q) {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'?' => {
                    if start < i {
                        segments.push(Segment::Text(&sql[start..i]));
                    }
                    segments.push(Segment::Placeholder);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }

    if start < sql.len() {
        segments.push(Segment::Text(&sql[start..]));
    }
    segments
}
