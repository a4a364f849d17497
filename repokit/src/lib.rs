//! # repokit
//!
//! Generic data-access layer over `sqlx` for MySQL and SQLite.
//!
//! ## Features
//!
//! - **Repository**: condition-based CRUD, lookups and counts for any [`Model`]
//! - **Transactions**: panic-safe, with nested calls joining the outer transaction
//! - **Pagination**: count-then-fetch paging that skips the fetch for empty pages
//! - **Partitioning**: monthly RANGE and LIST strategy builders
//! - **Migrations**: create-or-alter per physical table, partition aware
//! - **SQL logging**: every statement timed and classified by severity
//!
//! ## Example
//!
//! ```rust,no_run
//! use repokit::prelude::*;
//!
//! #[derive(Debug, Default, sqlx::FromRow)]
//! struct Account {
//!     id: i64,
//!     email: String,
//!     age: i64,
//! }
//!
//! impl Model for Account {
//!     const NAME: &'static str = "Account";
//!     const COLUMNS: &'static [Column] = &[
//!         Column::new("id", ColumnType::BigInt).primary_key().auto_increment(),
//!         Column::new("email", ColumnType::Varchar(191)).unique(),
//!         Column::new("age", ColumnType::BigInt),
//!     ];
//!
//!     fn values(&self) -> Vec<Value> {
//!         vec![self.id.into(), (&self.email).into(), self.age.into()]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config.log)?;
//!
//!     let engine = Engine::connect(&config.database).await?;
//!     engine.migrate::<Account>().await?;
//!
//!     let accounts: Repository<Account> = Repository::new(engine);
//!     accounts
//!         .create(&[Account { email: "ada@example.com".into(), age: 36, ..Default::default() }])
//!         .await?;
//!
//!     let page = accounts
//!         .page_by_condition([cond!("age >= ?", 18)], &Page::new(1, 20))
//!         .await?;
//!     println!("{} adults", page.total_count);
//!
//!     Ok(())
//! }
//! ```

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod migrate;
pub mod model;
pub mod naming;
pub mod observability;
pub mod pagination;
pub mod partition;
pub mod repository;
pub mod types;
pub mod value;

pub use condition::{apply_conditions, apply_order, Condition, Criteria};
pub use config::Config;
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, ErrorKind, Result};
pub use model::Model;
pub use pagination::{Page, PageResult};
pub use repository::Repository;
pub use value::Value;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cond;
    pub use crate::condition::{apply_conditions, apply_order, Condition, Criteria};
    pub use crate::config::{Config, DatabaseConfig, LogConfig, MigrationPolicy, TableOptions};
    pub use crate::engine::logger::{
        DynamicLevelLogger, Severity, SqlLogRecord, SqlLogger, TracingSqlLogger,
    };
    pub use crate::engine::{Engine, EngineBuilder};
    pub use crate::error::{Error, ErrorKind, Operation, Result};
    pub use crate::migrate::{MigrationReport, ModelSchema, TableOutcome};
    pub use crate::model::{Column, ColumnType, Model, PartitionDescriptor, Partitioning, TablePart};
    pub use crate::naming::NamingStrategy;
    pub use crate::observability::init_tracing;
    pub use crate::pagination::{Page, PageResult};
    pub use crate::partition::{
        calendar_year_partition_strategy, list_partition_strategy, list_partition_type,
        monthly_partition_strategy, range_partition_type,
    };
    pub use crate::repository::Repository;
    pub use crate::types::DateTime;
    pub use crate::value::Value;
}
