//! Paged queries
//!
//! A page request is normalized, a count query runs first, and the data query
//! only runs when the requested page can hold rows. Out-of-range pages return
//! metadata with no items and cost a single query.
//!
//! # Example
//!
//! ```rust
//! use repokit::pagination::{total_pages, Page};
//!
//! let page = Page::new(0, -5).normalized();
//! assert_eq!((page.page_number, page.page_size), (1, 10));
//! assert_eq!(page.offset(), 0);
//!
//! assert_eq!(total_pages(25, 10), 3);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::FromRow;
use std::future::Future;
use std::sync::LazyLock;

use crate::condition::{apply_conditions, Condition, Criteria, Statement};
use crate::engine::dialect::quote_ident;
use crate::engine::{Engine, Target};
use crate::error::{Error, Operation, Result};
use crate::model::Model;
use crate::value::Value;

/// Page size used when the request carries none
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Regex for an `order by` list: `col [asc|desc], …`
static ORDER_BY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let term = r"(?:`[^`]+`|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)(?:\s+(?:asc|desc))?";
    Regex::new(&format!(r"(?i)^\s*{term}(?:\s*,\s*{term})*\s*$"))
        .expect("order by regex is valid")
});

/// Regex for an `order by` keyword pair
static ORDER_BY_KEYWORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\border\s+by\b").expect("order by keyword regex is valid")
});

/// Whether `sql` ends in its own top-level `ORDER BY`
///
/// An `order by` inside a trailing subquery or window clause is followed by
/// more closing than opening parentheses and does not count.
fn has_trailing_order_by(sql: &str) -> bool {
    ORDER_BY_KEYWORD_REGEX
        .find_iter(sql)
        .last()
        .is_some_and(|m| {
            let rest = &sql[m.end()..];
            rest.matches(')').count() <= rest.matches('(').count()
        })
}

/// Page request, usually deserialized from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based; values below 1 mean the first page
    #[serde(default)]
    pub page_number: i64,
    /// Values below 1 mean [`DEFAULT_PAGE_SIZE`]
    #[serde(default)]
    pub page_size: i64,
    /// Column list such as `created_at desc, id`; empty keeps the default order
    #[serde(default)]
    pub order_by: String,
}

impl Page {
    pub fn new(page_number: i64, page_size: i64) -> Self {
        Self {
            page_number,
            page_size,
            order_by: String::new(),
        }
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    /// Clamp number and size to their defaults
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            page_number: if self.page_number <= 0 { 1 } else { self.page_number },
            page_size: if self.page_size <= 0 {
                DEFAULT_PAGE_SIZE
            } else {
                self.page_size
            },
            order_by: self.order_by.trim().to_string(),
        }
    }

    /// Row offset of a normalized page
    pub fn offset(&self) -> u64 {
        let page = self.normalized();
        (page.page_number as u64 - 1).saturating_mul(page.page_size as u64)
    }

    /// Reject `order_by` values that are not a plain column list
    pub fn validate_order_by(&self) -> Result<()> {
        let order_by = self.order_by.trim();
        if order_by.is_empty() || ORDER_BY_REGEX.is_match(order_by) {
            Ok(())
        } else {
            Err(Error::validation(format!("invalid order by: {order_by}")))
        }
    }
}

/// Number of pages needed for `total` rows
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        return 0;
    }
    (total - 1) / page_size + 1
}

/// One page of results with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub page_number: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub items: Vec<T>,
}

impl<T> PageResult<T> {
    /// Convert the items, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            page_number: self.page_number,
            total_pages: self.total_pages,
            total_count: self.total_count,
            items: self.items.into_iter().map(f).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Bounds handed to the data query of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u64,
    pub offset: u64,
    /// Validated `order by` list; may be empty
    pub order_by: String,
}

impl PageWindow {
    /// ` ORDER BY … LIMIT n OFFSET m`
    pub fn sql_suffix(&self) -> String {
        let order = if self.order_by.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", self.order_by)
        };
        format!("{} LIMIT {} OFFSET {}", order, self.limit, self.offset)
    }
}

/// Run the paging algorithm over an arbitrary count and fetch
///
/// `fetch` is not called when the total is zero or the page lies beyond the
/// last one.
pub async fn paginate_with<T, C, F, Fut>(page: &Page, count: C, fetch: F) -> Result<PageResult<T>>
where
    C: Future<Output = Result<i64>>,
    F: FnOnce(PageWindow) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let page = page.normalized();
    page.validate_order_by()?;

    let total_count = count.await?;
    let pages = total_pages(total_count, page.page_size);

    if total_count == 0 || page.page_number > pages {
        return Ok(PageResult {
            page_number: page.page_number,
            total_pages: pages,
            total_count,
            items: Vec::new(),
        });
    }

    let window = PageWindow {
        limit: page.page_size as u64,
        offset: page.offset(),
        order_by: page.order_by.clone(),
    };
    let items = fetch(window).await?;

    Ok(PageResult {
        page_number: page.page_number,
        total_pages: pages,
        total_count,
        items,
    })
}

impl Engine {
    /// Page through a model's table, mapping rows to `R`
    ///
    /// `R` may be a narrower projection than `M` as long as it decodes from
    /// the model's columns.
    pub async fn paginate_conditions<M, R, I, C>(&self, conditions: I, page: &Page) -> Result<PageResult<R>>
    where
        M: Model,
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        let criteria = apply_conditions(Criteria::new(), conditions);
        let table = self.table_name::<M>();
        self.paginate_criteria_on::<M, R>(&table, &criteria, page)
            .await
    }

    pub(crate) async fn paginate_criteria_on<M, R>(
        &self,
        table: &str,
        criteria: &Criteria,
        page: &Page,
    ) -> Result<PageResult<R>>
    where
        M: Model,
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let from = format!("{}{}", quote_ident(table), criteria.where_clause());

        let count_stmt = Statement::build(&format!("SELECT count(1) FROM {from}"), criteria.args())?;
        let count = self.fetch_count(Target::new(table, Operation::Count), &count_stmt);

        let from = from.as_str();
        paginate_with(page, count, |mut window| async move {
            // Stable paging needs a total order; fall back to the primary key
            if window.order_by.is_empty() {
                if let Some(pk) = M::primary_key() {
                    window.order_by = quote_ident(pk.name);
                }
            }
            let sql = format!(
                "SELECT {} FROM {}{}",
                self.dialect().select_list(M::COLUMNS),
                from,
                window.sql_suffix()
            );
            let stmt = Statement::build(&sql, criteria.args())?;
            self.fetch_all(Target::new(table, Operation::Query), &stmt).await
        })
        .await
    }

    /// Page through an arbitrary query
    ///
    /// The count runs as `select count(1) from (<sql>) table_count`. `sql` may
    /// carry its own trailing `ORDER BY` only when `page.order_by` is empty;
    /// combining both is a [`Error::Validation`] and runs no query.
    pub async fn paginate_sql<R>(&self, sql: &str, args: &[Value], page: &Page) -> Result<PageResult<R>>
    where
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let sql = sql.trim().trim_end_matches(';');
        if !page.order_by.trim().is_empty() && has_trailing_order_by(sql) {
            return Err(Error::validation(format!(
                "query already has an order by; drop it or leave the page order empty: {sql}"
            )));
        }
        let count_stmt = Statement::build(&format!("select count(1) from ({sql}) table_count"), args)?;
        let count = self.fetch_count(Target::raw(Operation::Count), &count_stmt);

        paginate_with(page, count, |window| async move {
            let stmt = Statement::build(&format!("{sql}{}", window.sql_suffix()), args)?;
            self.fetch_all(Target::raw(Operation::Query), &stmt).await
        })
        .await
    }
}
