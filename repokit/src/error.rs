//! Error types
//!
//! Every driver error is classified once, at the point where the engine knows
//! which operation and table were involved. Callers match on [`Error`] directly
//! or on the coarser [`ErrorKind`].

use std::fmt;
use thiserror::Error;

/// Result type alias using the crate's [`enum@Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Operation being performed when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Establishing the pool or pinging the server
    Connect,
    /// Inserting records
    Create,
    /// Updating records
    Update,
    /// Deleting records
    Delete,
    /// Reading records
    Query,
    /// Counting records
    Count,
    /// Creating or altering tables
    Migrate,
    /// Executing raw statements
    Execute,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Query => write!(f, "query"),
            Self::Count => write!(f, "count"),
            Self::Migrate => write!(f, "migrate"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Stage of a transaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStage {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Category of error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A single-result query matched no row
    NotFound,
    /// Unique, foreign key or check constraint violation
    Constraint,
    /// Input rejected before reaching the database
    Validation,
    /// Begin, commit or rollback failed, or the transaction is finished
    Transaction,
    /// Schema migration of a table failed
    Migration,
    /// Any other driver error
    Database,
    /// Configuration could not be loaded or is unusable
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Constraint => write!(f, "constraint"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Migration => write!(f, "migration"),
            Self::Database => write!(f, "database"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Error type for every fallible operation in the crate
#[derive(Debug, Error)]
pub enum Error {
    /// A single-result query matched no row
    #[error("record not found during {operation} on {}", display_table(.table))]
    NotFound { operation: Operation, table: String },

    /// Constraint violation
    #[error("constraint violation during {operation} on {}: {source}", display_table(.table))]
    Constraint {
        operation: Operation,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Input rejected before reaching the database
    #[error("validation failed: {0}")]
    Validation(String),

    /// Begin, commit or rollback failed
    #[error("transaction {stage} failed: {source}")]
    Transaction {
        stage: TransactionStage,
        #[source]
        source: sqlx::Error,
    },

    /// A transaction-bound handle was used after its transaction finished
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// The callback failed and the rollback that followed failed too
    #[error("rollback failed ({source}) after error: {original}")]
    RollbackFailed {
        original: Box<Error>,
        #[source]
        source: sqlx::Error,
    },

    /// Schema migration of one table failed
    #[error("migration of table {table} failed: {source}")]
    Migration {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// Any other driver error
    #[error("database error during {operation} on {}: {source}", display_table(.table))]
    Database {
        operation: Operation,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration loaded but unusable (empty or unsupported DSN)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn display_table(table: &str) -> &str {
    if table.is_empty() {
        "<raw sql>"
    } else {
        table
    }
}

impl Error {
    /// Classify a driver error raised while performing `operation` on `table`
    pub fn from_sqlx(err: sqlx::Error, operation: Operation, table: &str) -> Self {
        let table = table.to_string();
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound { operation, table },
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                Self::Constraint {
                    operation,
                    table,
                    source: err,
                }
            }
            _ => Self::Database {
                operation,
                table,
                source: err,
            },
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Constraint { .. } => ErrorKind::Constraint,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transaction { .. } | Self::TransactionInactive | Self::RollbackFailed { .. } => {
                ErrorKind::Transaction
            }
            Self::Migration { .. } => ErrorKind::Migration,
            Self::Database { .. } => ErrorKind::Database,
            Self::Config(_) | Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether this is a "no rows" outcome rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
