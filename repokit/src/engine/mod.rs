//! Database engine wrapper
//!
//! [`Engine`] owns the connection pool, the SQL dialect, the naming convention
//! and the SQL log sink. It is cheap to clone. An engine is either bound to the
//! pool or, inside [`Engine::transaction`], to one open transaction; every
//! statement issued through it runs on that handle.
//!
//! Each statement is timed, classified with [`logger::classify`] and pushed to
//! the sink. Without `print_sql` only warnings and errors reach the sink.

pub mod dialect;
pub mod logger;

use futures::FutureExt;
use sqlx::any::{Any, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Connection, FromRow, Transaction};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::condition::Statement;
use crate::config::{DatabaseConfig, MigrationPolicy, TableOptions};
use crate::error::{Error, Operation, Result, TransactionStage};
use crate::model::Model;
use crate::naming::NamingStrategy;
use crate::value::{bind_params, Value};

use self::dialect::Dialect;
use self::logger::{classify, format_message, Severity, SqlLogRecord, SqlLogger, TracingSqlLogger};

/// Table and operation a statement is issued for
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub table: &'a str,
    pub operation: Operation,
}

impl<'a> Target<'a> {
    pub fn new(table: &'a str, operation: Operation) -> Self {
        Self { table, operation }
    }

    /// Target for statements not tied to a model table
    pub fn raw(operation: Operation) -> Self {
        Self {
            table: "",
            operation,
        }
    }

    fn caller(&self) -> String {
        let table = if self.table.is_empty() { "raw" } else { self.table };
        format!("{}.{}", table, self.operation)
    }
}

struct Shared {
    pool: AnyPool,
    dialect: Dialect,
    naming: NamingStrategy,
    logger: Arc<dyn SqlLogger>,
    slow_threshold: Duration,
    print_sql: bool,
    batch_size: usize,
    table_options: TableOptions,
    migration_policy: MigrationPolicy,
}

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Any>>>>;

#[derive(Clone)]
enum Handle {
    Pool,
    Transaction(SharedTransaction),
}

/// Pool-owning engine, optionally bound to a transaction
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    handle: Handle,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.shared.dialect)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: DatabaseConfig,
    logger: Option<Arc<dyn SqlLogger>>,
    naming: Option<NamingStrategy>,
}

impl EngineBuilder {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            logger: None,
            naming: None,
        }
    }

    /// Replace the default [`TracingSqlLogger`]
    pub fn logger(mut self, logger: Arc<dyn SqlLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the naming convention derived from `table_prefix`
    pub fn naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Open the pool
    pub async fn connect(self) -> Result<Engine> {
        let config = self.config;
        let dialect = Dialect::from_dsn(&config.dsn)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_open())
            .max_lifetime(config.conn_max_lifetime())
            .idle_timeout(config.conn_max_idle_time())
            .connect(&config.dsn)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to connect to database at '{}': {} ({})",
                    sanitize_connection_url(&config.dsn),
                    categorize_db_error(&e),
                    e
                );
                Error::from_sqlx(e, Operation::Connect, "")
            })?;

        tracing::info!(
            "Database connection pool created: dialect={:?}, max={}, idle_timeout={:?}",
            dialect,
            config.max_open(),
            config.conn_max_idle_time()
        );

        let naming = self
            .naming
            .unwrap_or_else(|| NamingStrategy::new(config.table_prefix.clone()));
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingSqlLogger));

        Ok(Engine {
            shared: Arc::new(Shared {
                pool,
                dialect,
                naming,
                logger,
                slow_threshold: config.slow_threshold(),
                print_sql: config.print_sql,
                batch_size: config.batch_size(),
                table_options: config.table_options.clone(),
                migration_policy: config.migration_policy,
            }),
            handle: Handle::Pool,
        })
    }
}

/// Run `$body` against the engine's current executor
///
/// `$exec` is bound to `&AnyPool` or to the open transaction's connection.
macro_rules! on_handle {
    ($engine:expr, $target:expr, |$exec:ident| $body:expr) => {{
        let target: Target<'_> = $target;
        match &$engine.handle {
            Handle::Pool => {
                let $exec = &$engine.shared.pool;
                $body
                    .await
                    .map_err(|e| Error::from_sqlx(e, target.operation, target.table))
            }
            Handle::Transaction(cell) => {
                let mut guard = cell.lock().await;
                match guard.as_mut() {
                    Some(tx) => {
                        let $exec = &mut **tx;
                        $body
                            .await
                            .map_err(|e| Error::from_sqlx(e, target.operation, target.table))
                    }
                    None => Err(Error::TransactionInactive),
                }
            }
        }
    }};
}

impl Engine {
    pub fn builder(config: DatabaseConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Open a pool with the default logger and naming convention
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        EngineBuilder::new(config.clone()).connect().await
    }

    pub fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    pub fn naming(&self) -> &NamingStrategy {
        &self.shared.naming
    }

    pub fn table_options(&self) -> &TableOptions {
        &self.shared.table_options
    }

    pub fn migration_policy(&self) -> MigrationPolicy {
        self.shared.migration_policy
    }

    /// Rows per INSERT statement for batched creates
    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// The underlying pool, bypassing transaction binding and logging
    pub fn pool(&self) -> &AnyPool {
        &self.shared.pool
    }

    /// Whether this engine is bound to an open transaction
    pub fn in_transaction(&self) -> bool {
        matches!(self.handle, Handle::Transaction(_))
    }

    /// Physical table name of a model
    pub fn table_name<M: Model>(&self) -> String {
        M::table_name().unwrap_or_else(|| self.shared.naming.table_name(M::NAME))
    }

    /// Round-trip to the server
    pub async fn ping(&self) -> Result<()> {
        match &self.handle {
            Handle::Pool => {
                let mut conn = self
                    .shared
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| Error::from_sqlx(e, Operation::Connect, ""))?;
                conn.ping()
                    .await
                    .map_err(|e| Error::from_sqlx(e, Operation::Connect, ""))
            }
            Handle::Transaction(cell) => match cell.lock().await.as_mut() {
                Some(tx) => tx
                    .ping()
                    .await
                    .map_err(|e| Error::from_sqlx(e, Operation::Connect, "")),
                None => Err(Error::TransactionInactive),
            },
        }
    }

    /// Close the pool; clones of this engine fail afterwards
    pub async fn close(&self) {
        self.shared.pool.close().await;
    }

    /// Run `f` inside a transaction
    ///
    /// `f` receives an engine bound to the transaction. A panic inside `f`
    /// rolls back and resumes with the original payload. An `Err` rolls back
    /// and is returned unchanged unless the rollback itself fails. Otherwise
    /// the transaction commits.
    ///
    /// Calling this on an engine already bound to a transaction runs `f` on
    /// the same transaction: no new transaction and no savepoint.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.in_transaction() {
            return f(self.clone()).await;
        }

        let tx = self
            .shared
            .pool
            .begin()
            .await
            .map_err(|source| Error::Transaction {
                stage: TransactionStage::Begin,
                source,
            })?;
        let cell: SharedTransaction = Arc::new(Mutex::new(Some(tx)));
        let bound = Engine {
            shared: Arc::clone(&self.shared),
            handle: Handle::Transaction(Arc::clone(&cell)),
        };

        let outcome = AssertUnwindSafe(f(bound)).catch_unwind().await;
        let tx = cell.lock().await.take();

        match outcome {
            Err(payload) => {
                if let Some(tx) = tx {
                    if let Err(e) = tx.rollback().await {
                        tracing::error!("Rollback after panic failed: {}", e);
                    }
                }
                std::panic::resume_unwind(payload)
            }
            Ok(Err(err)) => match tx {
                Some(tx) => match tx.rollback().await {
                    Ok(()) => {
                        tracing::debug!("Transaction rolled back: {}", err);
                        Err(err)
                    }
                    Err(source) => Err(Error::RollbackFailed {
                        original: Box::new(err),
                        source,
                    }),
                },
                None => Err(err),
            },
            Ok(Ok(value)) => {
                let tx = tx.ok_or(Error::TransactionInactive)?;
                tx.commit().await.map_err(|source| Error::Transaction {
                    stage: TransactionStage::Commit,
                    source,
                })?;
                Ok(value)
            }
        }
    }

    /// Execute a raw statement; list arguments expand to `(?, ?, …)`
    pub async fn execute_raw(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let stmt = Statement::build(sql, args)?;
        self.execute(Target::raw(Operation::Execute), &stmt).await
    }

    /// Run a raw query and map every row to `R`
    pub async fn query_raw<R>(&self, sql: &str, args: &[Value]) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let stmt = Statement::build(sql, args)?;
        self.fetch_all(Target::raw(Operation::Query), &stmt).await
    }

    pub(crate) async fn execute(&self, target: Target<'_>, stmt: &Statement) -> Result<u64> {
        let started = Instant::now();
        let outcome = on_handle!(self, target, |exec| {
            bind_params!(sqlx::query::<Any>(stmt.sql()), stmt.params()).execute(exec)
        })
        .map(|done| done.rows_affected());
        self.trace(target, stmt, started, outcome.as_ref().ok().copied(), outcome.as_ref().err());
        outcome
    }

    pub(crate) async fn fetch_all<R>(&self, target: Target<'_>, stmt: &Statement) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let started = Instant::now();
        let outcome = on_handle!(self, target, |exec| {
            bind_params!(sqlx::query_as::<Any, R>(stmt.sql()), stmt.params()).fetch_all(exec)
        });
        let rows = outcome.as_ref().ok().map(|rows| rows.len() as u64);
        self.trace(target, stmt, started, rows, outcome.as_ref().err());
        outcome
    }

    /// Fetch exactly one row; no row is [`Error::NotFound`]
    pub(crate) async fn fetch_one<R>(&self, target: Target<'_>, stmt: &Statement) -> Result<R>
    where
        R: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let started = Instant::now();
        let outcome = on_handle!(self, target, |exec| {
            bind_params!(sqlx::query_as::<Any, R>(stmt.sql()), stmt.params()).fetch_one(exec)
        });
        let rows = if outcome.is_ok() { 1 } else { 0 };
        self.trace(target, stmt, started, Some(rows), outcome.as_ref().err());
        outcome
    }

    /// Run a `count(…)` query
    pub(crate) async fn fetch_count(&self, target: Target<'_>, stmt: &Statement) -> Result<i64> {
        let started = Instant::now();
        let outcome = on_handle!(self, target, |exec| {
            bind_params!(sqlx::query_scalar::<Any, i64>(stmt.sql()), stmt.params()).fetch_one(exec)
        });
        let rows = outcome.as_ref().ok().map(|_| 1);
        self.trace(target, stmt, started, rows, outcome.as_ref().err());
        outcome
    }

    /// Run a query returning one text column
    pub(crate) async fn fetch_strings(
        &self,
        target: Target<'_>,
        stmt: &Statement,
    ) -> Result<Vec<String>> {
        let started = Instant::now();
        let outcome = on_handle!(self, target, |exec| {
            bind_params!(sqlx::query_scalar::<Any, String>(stmt.sql()), stmt.params())
                .fetch_all(exec)
        });
        let rows = outcome.as_ref().ok().map(|rows| rows.len() as u64);
        self.trace(target, stmt, started, rows, outcome.as_ref().err());
        outcome
    }

    fn trace(
        &self,
        target: Target<'_>,
        stmt: &Statement,
        started: Instant,
        rows: Option<u64>,
        error: Option<&Error>,
    ) {
        let elapsed = started.elapsed();
        let slow = elapsed >= self.shared.slow_threshold;
        let severity = classify(error, slow);
        if !self.shared.print_sql && severity < Severity::Warn {
            return;
        }

        let slow_limit = (slow && error.is_none()).then_some(self.shared.slow_threshold);
        self.shared.logger.log(&SqlLogRecord {
            severity,
            caller: target.caller(),
            table: target.table.to_string(),
            message: format_message(elapsed, rows, stmt.sql(), error, slow_limit),
        });
    }
}

/// Sanitize connection URL for safe logging (remove password)
pub fn sanitize_connection_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        // Credentials only live between the scheme and the host
        if scheme_end + 3 <= at_pos {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            if let Some(colon_pos) = url[scheme_end + 3..at_pos].find(':') {
                let username = &url[scheme_end + 3..scheme_end + 3 + colon_pos];
                return format!("{}{}:***{}", scheme, username, after_at);
            }
        }
    }
    url.to_string()
}

/// Categorize connection errors for the failure log line
fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database query error",
        Error::Io(_) => "Network I/O error - check connectivity",
        Error::Tls(_) => "TLS/SSL error - check certificate configuration",
        Error::PoolTimedOut => "Connection pool timeout - database may be overloaded",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Connection error",
    }
}
