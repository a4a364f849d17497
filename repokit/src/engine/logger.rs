//! Severity-classifying SQL log sink
//!
//! The engine times every statement, classifies the outcome with [`classify`]
//! and hands a [`SqlLogRecord`] to the configured [`SqlLogger`].

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;

/// Tracing target used by [`TracingSqlLogger`]
pub const SQL_LOG_TARGET: &str = "repokit::sql";

/// Log severity of a statement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Map a statement outcome to a severity
///
/// "No rows" is an expected outcome and stays at debug.
pub fn classify(error: Option<&Error>, slow: bool) -> Severity {
    match error {
        Some(err) if err.is_not_found() => Severity::Debug,
        Some(_) => Severity::Error,
        None if slow => Severity::Warn,
        None => Severity::Debug,
    }
}

/// Render the record message
///
/// `[1.234ms] [rows:1] SELECT …`, prefixed with the error text for failures
/// (except "no rows") or with `SLOW SQL >= <limit>` for slow statements.
pub fn format_message(
    elapsed: Duration,
    rows: Option<u64>,
    sql: &str,
    error: Option<&Error>,
    slow_threshold: Option<Duration>,
) -> String {
    let rows = rows.map_or_else(|| "-".to_string(), |r| r.to_string());
    let base = format!(
        "[{:.3}ms] [rows:{}] {}",
        elapsed.as_secs_f64() * 1000.0,
        rows,
        sql
    );
    match (error, slow_threshold) {
        (Some(err), _) if err.is_not_found() => base,
        (Some(err), _) => format!("{err} {base}"),
        (None, Some(limit)) => format!("SLOW SQL >= {limit:?} {base}"),
        (None, None) => base,
    }
}

/// One classified statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLogRecord {
    pub severity: Severity,
    /// `<table>.<operation>`, e.g. `account.query`
    pub caller: String,
    /// Physical table the statement targets; empty for raw SQL
    pub table: String,
    pub message: String,
}

/// Destination for classified statement records
pub trait SqlLogger: Send + Sync {
    fn log(&self, record: &SqlLogRecord);
}

/// Forwards records to `tracing` under the `repokit::sql` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSqlLogger;

impl SqlLogger for TracingSqlLogger {
    fn log(&self, record: &SqlLogRecord) {
        let caller = record.caller.as_str();
        let message = record.message.as_str();
        match record.severity {
            Severity::Debug => tracing::debug!(target: SQL_LOG_TARGET, caller, "{message}"),
            Severity::Info => tracing::info!(target: SQL_LOG_TARGET, caller, "{message}"),
            Severity::Warn => tracing::warn!(target: SQL_LOG_TARGET, caller, "{message}"),
            Severity::Error => tracing::error!(target: SQL_LOG_TARGET, caller, "{message}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Override {
    severity: Severity,
    expires_at: Instant,
}

/// Rewrites record severities for selected callers or tables
///
/// Overrides expire on their own, so a table can be silenced or surfaced for
/// a bounded time without a restart. A caller override wins over a table
/// override.
pub struct DynamicLevelLogger {
    inner: Arc<dyn SqlLogger>,
    callers: DashMap<String, Override>,
    tables: DashMap<String, Override>,
}

impl DynamicLevelLogger {
    pub fn new(inner: Arc<dyn SqlLogger>) -> Self {
        Self {
            inner,
            callers: DashMap::new(),
            tables: DashMap::new(),
        }
    }

    /// Log records from `caller` at `severity` for the next `ttl`
    pub fn set_caller_level(&self, caller: impl Into<String>, severity: Severity, ttl: Duration) {
        self.callers.insert(
            caller.into(),
            Override {
                severity,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Log records touching `table` at `severity` for the next `ttl`
    pub fn set_table_level(&self, table: impl Into<String>, severity: Severity, ttl: Duration) {
        self.tables.insert(
            table.into(),
            Override {
                severity,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.callers.clear();
        self.tables.clear();
    }

    fn lookup(map: &DashMap<String, Override>, key: &str, now: Instant) -> Option<Severity> {
        let found = map.get(key).map(|o| *o)?;
        if found.expires_at <= now {
            map.remove(key);
            return None;
        }
        Some(found.severity)
    }

    /// Effective severity for a record
    pub fn effective_severity(&self, record: &SqlLogRecord) -> Severity {
        let now = Instant::now();
        Self::lookup(&self.callers, &record.caller, now)
            .or_else(|| Self::lookup(&self.tables, &record.table, now))
            .unwrap_or(record.severity)
    }
}

impl SqlLogger for DynamicLevelLogger {
    fn log(&self, record: &SqlLogRecord) {
        let severity = self.effective_severity(record);
        if severity == record.severity {
            self.inner.log(record);
        } else {
            let mut record = record.clone();
            record.severity = severity;
            self.inner.log(&record);
        }
    }
}

impl fmt::Debug for DynamicLevelLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLevelLogger")
            .field("callers", &self.callers.len())
            .field("tables", &self.tables.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<SqlLogRecord>>);

    impl SqlLogger for Capture {
        fn log(&self, record: &SqlLogRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    fn record(severity: Severity, table: &str) -> SqlLogRecord {
        SqlLogRecord {
            severity,
            caller: format!("{table}.query"),
            table: table.to_string(),
            message: "[0.100ms] [rows:1] SELECT 1".to_string(),
        }
    }

    #[test]
    fn test_classification_table() {
        let not_found = Error::from_sqlx(sqlx::Error::RowNotFound, Operation::Query, "t");
        let failure = Error::from_sqlx(sqlx::Error::PoolTimedOut, Operation::Query, "t");

        assert_eq!(classify(Some(&not_found), false), Severity::Debug);
        assert_eq!(classify(Some(&not_found), true), Severity::Debug);
        assert_eq!(classify(Some(&failure), false), Severity::Error);
        assert_eq!(classify(Some(&failure), true), Severity::Error);
        assert_eq!(classify(None, true), Severity::Warn);
        assert_eq!(classify(None, false), Severity::Debug);
    }

    #[test]
    fn test_message_format() {
        let elapsed = Duration::from_micros(1500);
        assert_eq!(
            format_message(elapsed, Some(3), "SELECT 1", None, None),
            "[1.500ms] [rows:3] SELECT 1"
        );
        assert_eq!(
            format_message(elapsed, None, "SELECT 1", None, Some(Duration::from_millis(100))),
            "SLOW SQL >= 100ms [1.500ms] [rows:-] SELECT 1"
        );

        let not_found = Error::from_sqlx(sqlx::Error::RowNotFound, Operation::Query, "t");
        assert_eq!(
            format_message(elapsed, Some(0), "SELECT 1", Some(&not_found), None),
            "[1.500ms] [rows:0] SELECT 1"
        );

        let failure = Error::validation("boom");
        assert!(format_message(elapsed, None, "SELECT 1", Some(&failure), None)
            .starts_with("validation failed: boom [1.500ms]"));
    }

    #[test]
    fn test_dynamic_table_override() {
        let capture = Arc::new(Capture::default());
        let logger = DynamicLevelLogger::new(capture.clone());

        logger.set_table_level("account", Severity::Info, Duration::from_secs(60));
        logger.log(&record(Severity::Debug, "account"));
        logger.log(&record(Severity::Debug, "other"));

        let seen = capture.0.lock().unwrap();
        assert_eq!(seen[0].severity, Severity::Info);
        assert_eq!(seen[1].severity, Severity::Debug);
    }

    #[test]
    fn test_caller_override_wins_and_expires() {
        let capture = Arc::new(Capture::default());
        let logger = DynamicLevelLogger::new(capture.clone());

        logger.set_table_level("account", Severity::Info, Duration::from_secs(60));
        logger.set_caller_level("account.query", Severity::Error, Duration::from_secs(60));
        assert_eq!(
            logger.effective_severity(&record(Severity::Debug, "account")),
            Severity::Error
        );

        logger.set_caller_level("account.query", Severity::Error, Duration::ZERO);
        assert_eq!(
            logger.effective_severity(&record(Severity::Debug, "account")),
            Severity::Info
        );

        logger.clear();
        assert_eq!(
            logger.effective_severity(&record(Severity::Warn, "account")),
            Severity::Warn
        );
    }
}
