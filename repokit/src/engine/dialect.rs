//! SQL dialect differences between MySQL and SQLite
//!
//! Both dialects accept backtick-quoted identifiers and `?` placeholders, so
//! the differences are limited to DDL, catalog queries and conflict handling.

use crate::config::TableOptions;
use crate::error::{Error, Result};
use crate::model::{Column, ColumnType};

/// Quote an identifier with backticks, doubling embedded backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// SQL dialect of the connected database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    /// Pick the dialect from the DSN scheme
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let scheme = dsn.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            "" => Err(Error::Configuration("database dsn is empty".to_string())),
            other => Err(Error::Configuration(format!(
                "unsupported database scheme '{other}', expected mysql or sqlite"
            ))),
        }
    }

    /// Whether `partition by` clauses are honored
    pub fn supports_partitioning(&self) -> bool {
        matches!(self, Self::MySql)
    }

    pub fn column_type(&self, column_type: ColumnType) -> String {
        match (self, column_type) {
            (Self::MySql, ColumnType::BigInt) => "bigint".to_string(),
            (Self::MySql, ColumnType::Int) => "int".to_string(),
            (Self::MySql, ColumnType::Bool) => "tinyint(1)".to_string(),
            (Self::MySql, ColumnType::Double) => "double".to_string(),
            (Self::MySql, ColumnType::Varchar(len)) => format!("varchar({len})"),
            (Self::MySql, ColumnType::Text) => "longtext".to_string(),
            (Self::MySql, ColumnType::DateTime) => "datetime".to_string(),
            (Self::MySql, ColumnType::Blob) => "longblob".to_string(),
            (Self::Sqlite, ColumnType::BigInt | ColumnType::Int | ColumnType::Bool) => {
                "integer".to_string()
            }
            (Self::Sqlite, ColumnType::Double) => "real".to_string(),
            (Self::Sqlite, ColumnType::Varchar(_) | ColumnType::Text | ColumnType::DateTime) => {
                "text".to_string()
            }
            (Self::Sqlite, ColumnType::Blob) => "blob".to_string(),
        }
    }

    /// SQLite only allows AUTOINCREMENT on an inline `integer PRIMARY KEY`
    fn inline_primary_key(&self, columns: &[Column]) -> bool {
        let keys: Vec<&Column> = columns.iter().filter(|c| c.primary_key).collect();
        matches!(self, Self::Sqlite) && keys.len() == 1 && keys[0].auto_increment
    }

    fn column_definition(&self, column: &Column, inline_pk: bool) -> String {
        let name = quote_ident(column.name);
        if inline_pk && column.primary_key {
            return format!("{name} integer PRIMARY KEY AUTOINCREMENT");
        }

        let mut def = format!("{} {}", name, self.column_type(column.column_type));
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if column.auto_increment && matches!(self, Self::MySql) {
            def.push_str(" AUTO_INCREMENT");
        }
        if let Some(default) = column.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        if let (Self::MySql, Some(comment)) = (self, column.comment) {
            def.push_str(&format!(" COMMENT '{}'", comment.replace('\'', "''")));
        }
        def
    }

    /// `CREATE TABLE` statement for one physical table
    ///
    /// `partition` is `(type, strategy)`; it is ignored on dialects without
    /// partitioning, as are the table options.
    pub fn create_table(
        &self,
        table: &str,
        columns: &[Column],
        options: &TableOptions,
        comment: &str,
        partition: Option<(&str, &str)>,
    ) -> String {
        let inline_pk = self.inline_primary_key(columns);
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(c, inline_pk))
            .collect();

        let keys: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_ident(c.name))
            .collect();
        if !keys.is_empty() && !inline_pk {
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        for column in columns.iter().filter(|c| c.unique && !c.primary_key) {
            match self {
                Self::MySql => defs.push(format!(
                    "UNIQUE KEY {} ({})",
                    quote_ident(&format!("uk_{}_{}", table, column.name)),
                    quote_ident(column.name)
                )),
                Self::Sqlite => defs.push(format!("UNIQUE ({})", quote_ident(column.name))),
            }
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            quote_ident(table),
            defs.join(",\n  ")
        );

        if let Self::MySql = self {
            sql.push(' ');
            sql.push_str(&options.render(comment));
            if let Some((partition_type, strategy)) = partition {
                sql.push(' ');
                sql.push_str(&partition_clause(partition_type, strategy));
            }
        }
        sql
    }

    /// `ALTER TABLE … ADD COLUMN` for a column missing from a live table
    pub fn add_column(&self, table: &str, column: &Column) -> String {
        let mut def = self.column_definition(column, false);
        // SQLite refuses NOT NULL columns without a default on populated tables
        if matches!(self, Self::Sqlite) && !column.nullable && column.default.is_none() {
            def.push_str(" DEFAULT ");
            def.push_str(zero_literal(column.column_type));
        }
        format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), def)
    }

    /// Redefine the partition layout of an existing table
    pub fn repartition(&self, table: &str, partition_type: &str, strategy: &str) -> String {
        format!(
            "ALTER TABLE {} {}",
            quote_ident(table),
            partition_clause(partition_type, strategy)
        )
    }

    /// Count query yielding 1 when `table` exists; binds the table name
    pub fn table_exists_sql(&self) -> &'static str {
        match self {
            Self::MySql => {
                "SELECT count(1) FROM information_schema.tables \
                 WHERE table_schema = database() AND table_name = ?"
            }
            Self::Sqlite => "SELECT count(1) FROM sqlite_master WHERE type = 'table' AND name = ?",
        }
    }

    /// Query listing the column names of a table; binds the table name
    pub fn columns_sql(&self) -> &'static str {
        match self {
            Self::MySql => {
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = database() AND table_name = ?"
            }
            Self::Sqlite => "SELECT name FROM pragma_table_info(?)",
        }
    }

    /// Query listing live partition names in order; binds the table name
    pub fn partition_names_sql(&self) -> Option<&'static str> {
        match self {
            Self::MySql => Some(
                "SELECT partition_name FROM information_schema.partitions \
                 WHERE table_schema = database() AND table_name = ? \
                 AND partition_name IS NOT NULL ORDER BY partition_ordinal_position",
            ),
            Self::Sqlite => None,
        }
    }

    /// Multi-row insert with `rows` value tuples
    ///
    /// With `ignore_conflicts`, rows violating a unique constraint are skipped.
    pub fn insert(
        &self,
        table: &str,
        columns: &[Column],
        rows: usize,
        ignore_conflicts: bool,
    ) -> String {
        let names: Vec<String> = columns.iter().map(|c| quote_ident(c.name)).collect();
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            names.join(", "),
            vec![tuple; rows].join(", ")
        );

        if ignore_conflicts {
            match (self, columns.iter().find(|c| c.primary_key)) {
                (Self::MySql, Some(pk)) => {
                    let pk = quote_ident(pk.name);
                    sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {pk} = {pk}"));
                }
                (Self::MySql, None) => sql = sql.replacen("INSERT INTO", "INSERT IGNORE INTO", 1),
                (Self::Sqlite, _) => sql.push_str(" ON CONFLICT DO NOTHING"),
            }
        }
        sql
    }

    /// Select list for a model's columns
    ///
    /// MySQL date-time columns are formatted to text so they decode through
    /// the `Any` driver.
    pub fn select_list(&self, columns: &[Column]) -> String {
        columns
            .iter()
            .map(|c| match (self, c.column_type) {
                (Self::MySql, ColumnType::DateTime) => format!(
                    "DATE_FORMAT({0}, '%Y-%m-%d %H:%i:%s') AS {0}",
                    quote_ident(c.name)
                ),
                _ => quote_ident(c.name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `partition by <type> <strategy>`
pub fn partition_clause(partition_type: &str, strategy: &str) -> String {
    format!("partition by {partition_type} {strategy}")
}

fn zero_literal(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::BigInt | ColumnType::Int | ColumnType::Bool | ColumnType::Double => "0",
        ColumnType::Varchar(_) | ColumnType::Text => "''",
        ColumnType::DateTime => "'1970-01-01 00:00:00'",
        ColumnType::Blob => "X''",
    }
}
