//! Partition DDL fragment builders
//!
//! Pure functions producing the `<type>` and `<strategy>` halves of a
//! `partition by <type> <strategy>` clause. Nothing here rolls partitions
//! forward on its own: re-running a migration with a newer reference date
//! redefines the layout.

use chrono::Datelike;
use regex::Regex;
use std::sync::LazyLock;

use crate::engine::dialect::quote_ident;
use crate::value::Value;

/// Name of the catch-all bucket below the first month
pub const BEFORE_PARTITION: &str = "before";
/// Name of the catch-all bucket above the last month
pub const AFTER_PARTITION: &str = "after";

/// ``range columns(`column`)``
pub fn range_partition_type(column: &str) -> String {
    format!("range columns({})", quote_ident(column))
}

/// ``list columns(`column`)``
pub fn list_partition_type(column: &str) -> String {
    format!("list columns({})", quote_ident(column))
}

/// Upper bound of a range bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeBound {
    /// `values less than ('<literal>')`
    LessThan(String),
    /// `values less than maxvalue`
    MaxValue,
}

/// One bucket of a range strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBucket {
    pub name: String,
    pub bound: RangeBound,
}

impl RangeBucket {
    pub fn render(&self) -> String {
        match &self.bound {
            RangeBound::LessThan(limit) => format!(
                "partition {} values less than ('{}')",
                quote_ident(&self.name),
                limit.replace('\'', "''")
            ),
            RangeBound::MaxValue => {
                format!("partition {} values less than maxvalue", quote_ident(&self.name))
            }
        }
    }
}

/// Join rendered buckets into `( a, b, … )`
pub fn render_buckets<'a>(buckets: impl IntoIterator<Item = &'a RangeBucket>) -> String {
    let rendered: Vec<String> = buckets.into_iter().map(RangeBucket::render).collect();
    format!("( {} )", rendered.join(", "))
}

/// Calendar month as (year, month 1..=12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    fn of(date: &impl Datelike) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    fn shift(self, months: i32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) + months;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    fn name(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    fn start_literal(self) -> String {
        format!("{:04}-{:02}-01 00:00:00", self.year, self.month)
    }
}

fn buckets_from(first: YearMonth) -> Vec<RangeBucket> {
    let mut buckets = Vec::with_capacity(14);
    buckets.push(RangeBucket {
        name: BEFORE_PARTITION.to_string(),
        bound: RangeBound::LessThan(first.start_literal()),
    });
    for offset in 0..12 {
        let month = first.shift(offset);
        buckets.push(RangeBucket {
            name: month.name(),
            bound: RangeBound::LessThan(month.shift(1).start_literal()),
        });
    }
    buckets.push(RangeBucket {
        name: AFTER_PARTITION.to_string(),
        bound: RangeBound::MaxValue,
    });
    buckets
}

/// The 14 buckets covering the twelve months before the month of `reference`
///
/// For 2024-06-15 the named buckets run from `2023-06` to `2024-05`.
pub fn monthly_buckets(reference: &impl Datelike) -> Vec<RangeBucket> {
    buckets_from(YearMonth::of(reference).shift(-12))
}

/// The 14 buckets covering the calendar year of `reference`
pub fn calendar_year_buckets(reference: &impl Datelike) -> Vec<RangeBucket> {
    buckets_from(YearMonth {
        year: reference.year(),
        month: 1,
    })
}

/// Monthly range strategy over the twelve months preceding `reference`
pub fn monthly_partition_strategy(reference: &impl Datelike) -> String {
    render_buckets(&monthly_buckets(reference))
}

/// Monthly range strategy over the calendar year of `reference`
pub fn calendar_year_partition_strategy(reference: &impl Datelike) -> String {
    render_buckets(&calendar_year_buckets(reference))
}

/// List strategy with one bucket `p<i>` per group of values
///
/// An empty group renders as `VALUES IN (NULL)` so the DDL stays valid.
pub fn list_partition_strategy(groups: &[Vec<Value>]) -> String {
    let buckets: Vec<String> = groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let values = if group.is_empty() {
                "NULL".to_string()
            } else {
                group
                    .iter()
                    .map(Value::to_sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "PARTITION {} VALUES IN ({})",
                quote_ident(&format!("p{i}")),
                values
            )
        })
        .collect();
    format!("( {} )", buckets.join(", "))
}

/// Regex for bucket declarations in a rendered strategy
static PARTITION_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpartition\s+`((?:[^`]|``)+)`").expect("partition name regex is valid")
});

/// Bucket names declared in a rendered strategy, in order
pub fn partition_names(strategy: &str) -> Vec<String> {
    PARTITION_NAME_REGEX
        .captures_iter(strategy)
        .map(|c| c[1].replace("``", "`"))
        .collect()
}
