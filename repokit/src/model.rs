//! The model contract
//!
//! A model is an application record type. The layer never inspects it by
//! reflection: the model declares its columns once, in a `const`, and hands
//! out its field values in the same order.
//!
//! # Example
//!
//! ```rust
//! use repokit::model::{Column, ColumnType, Model};
//! use repokit::Value;
//!
//! #[derive(Debug, Default, sqlx::FromRow)]
//! struct Account {
//!     id: i64,
//!     email: String,
//! }
//!
//! impl Model for Account {
//!     const NAME: &'static str = "Account";
//!     const COLUMNS: &'static [Column] = &[
//!         Column::new("id", ColumnType::BigInt).primary_key().auto_increment(),
//!         Column::new("email", ColumnType::Varchar(191)).unique(),
//!     ];
//!
//!     fn values(&self) -> Vec<Value> {
//!         vec![self.id.into(), (&self.email).into()]
//!     }
//! }
//!
//! assert_eq!(Account::primary_key().map(|c| c.name), Some("id"));
//! ```

use sqlx::any::AnyRow;
use sqlx::FromRow;

use crate::value::Value;

/// Logical column type, mapped to a concrete type per dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Int,
    Bool,
    Double,
    Varchar(u32),
    Text,
    DateTime,
    Blob,
}

/// Column metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub unique: bool,
    /// Raw SQL default expression, e.g. `'active'` or `0`
    pub default: Option<&'static str>,
    pub comment: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            auto_increment: false,
            nullable: false,
            unique: false,
            default: None,
            comment: None,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Zero values in this column are bound as NULL on insert so the database assigns one
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_value(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub const fn comment(mut self, comment: &'static str) -> Self {
        self.comment = Some(comment);
        self
    }
}

/// One physically distinct table of a partitioned model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePart {
    pub table_name: String,
    pub comment: String,
    /// Overrides the descriptor's partition type for this table
    pub partition_type: Option<String>,
    /// Overrides the descriptor's partition strategy for this table
    pub partition_strategy: Option<String>,
}

impl TablePart {
    pub fn new(table_name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            comment: comment.into(),
            partition_type: None,
            partition_strategy: None,
        }
    }

    pub fn with_partition(
        mut self,
        partition_type: impl Into<String>,
        partition_strategy: impl Into<String>,
    ) -> Self {
        self.partition_type = Some(partition_type.into());
        self.partition_strategy = Some(partition_strategy.into());
        self
    }
}

/// How a partitioned model is laid out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionDescriptor {
    /// e.g. ``range columns(`created_at`)``
    pub partition_type: String,
    /// e.g. the output of [`crate::partition::monthly_partition_strategy`]
    pub partition_strategy: String,
    /// Physical tables; empty means the model's own table
    pub parts: Vec<TablePart>,
}

/// Partitioning capability of a model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Partitioning {
    #[default]
    None,
    Partitioned(PartitionDescriptor),
}

/// An application record type persisted by the layer
pub trait Model: for<'r> FromRow<'r, AnyRow> + Send + Sync + Unpin + 'static {
    /// Type name, fed to the naming convention when [`Model::table_name`] is `None`
    const NAME: &'static str;

    /// Column layout; [`Model::values`] must follow the same order
    const COLUMNS: &'static [Column];

    /// Explicit table name, bypassing the naming convention
    fn table_name() -> Option<String> {
        None
    }

    /// Table comment used by migrations; defaults to the table name
    fn table_comment() -> Option<String> {
        None
    }

    /// Partition layout used by migrations
    fn partitioning() -> Partitioning {
        Partitioning::None
    }

    /// Field values in [`Model::COLUMNS`] order
    fn values(&self) -> Vec<Value>;

    fn primary_key() -> Option<&'static Column> {
        Self::COLUMNS.iter().find(|c| c.primary_key)
    }

    /// Column/value pairs of this instance
    fn fields(&self) -> Vec<(&'static Column, Value)> {
        Self::COLUMNS.iter().zip(self.values()).collect()
    }

    /// Column/value pairs whose value is non-zero
    fn non_zero_fields(&self) -> Vec<(&'static Column, Value)> {
        self.fields()
            .into_iter()
            .filter(|(_, value)| !value.is_zero())
            .collect()
    }

    /// Value of the primary key column, if the model has one
    fn primary_key_value(&self) -> Option<Value> {
        let position = Self::COLUMNS.iter().position(|c| c.primary_key)?;
        self.values().into_iter().nth(position)
    }
}
