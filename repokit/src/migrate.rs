//! Create-or-alter schema migration
//!
//! Each model maps to one or more physical tables. A partitioned model with
//! parts migrates every part as its own table; otherwise the model's table is
//! migrated. Per table the migrator creates the table when it is missing, or
//! adds missing columns and, where the dialect supports it, redefines the
//! partition layout when the wanted bucket names differ from the live ones.
//! Columns are never dropped or retyped.

use crate::condition::Statement;
use crate::config::MigrationPolicy;
use crate::engine::{Engine, Target};
use crate::error::{Error, Operation, Result};
use crate::model::{Column, Model, Partitioning};
use crate::naming::NamingStrategy;
use crate::partition::partition_names;
use crate::value::Value;

/// Everything the migrator needs to know about a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    pub name: &'static str,
    pub table_name: Option<String>,
    pub comment: Option<String>,
    pub columns: &'static [Column],
    pub partitioning: Partitioning,
}

impl ModelSchema {
    pub fn of<M: Model>() -> Self {
        Self {
            name: M::NAME,
            table_name: M::table_name(),
            comment: M::table_comment(),
            columns: M::COLUMNS,
            partitioning: M::partitioning(),
        }
    }
}

/// One physical table to migrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub table: String,
    pub comment: String,
    pub columns: &'static [Column],
    /// `(type, strategy)` when both are non-blank
    pub partition: Option<(String, String)>,
}

fn non_blank(partition_type: &str, strategy: &str) -> Option<(String, String)> {
    if partition_type.trim().is_empty() || strategy.trim().is_empty() {
        None
    } else {
        Some((partition_type.to_string(), strategy.to_string()))
    }
}

fn comment_or_table(comment: Option<&str>, table: &str) -> String {
    match comment {
        Some(c) if !c.trim().is_empty() => c.to_string(),
        _ => table.to_string(),
    }
}

impl ModelSchema {
    /// Physical tables of this model under a naming convention
    pub fn plans(&self, naming: &NamingStrategy) -> Vec<TablePlan> {
        let table = self
            .table_name
            .clone()
            .unwrap_or_else(|| naming.table_name(self.name));

        match &self.partitioning {
            Partitioning::Partitioned(descriptor) if !descriptor.parts.is_empty() => descriptor
                .parts
                .iter()
                .map(|part| {
                    let partition_type = part
                        .partition_type
                        .as_deref()
                        .unwrap_or(&descriptor.partition_type);
                    let strategy = part
                        .partition_strategy
                        .as_deref()
                        .unwrap_or(&descriptor.partition_strategy);
                    TablePlan {
                        comment: comment_or_table(Some(part.comment.as_str()), &part.table_name),
                        table: part.table_name.clone(),
                        columns: self.columns,
                        partition: non_blank(partition_type, strategy),
                    }
                })
                .collect(),
            Partitioning::Partitioned(descriptor) => vec![TablePlan {
                comment: comment_or_table(self.comment.as_deref(), &table),
                table,
                columns: self.columns,
                partition: non_blank(&descriptor.partition_type, &descriptor.partition_strategy),
            }],
            Partitioning::None => vec![TablePlan {
                comment: comment_or_table(self.comment.as_deref(), &table),
                table,
                columns: self.columns,
                partition: None,
            }],
        }
    }
}

/// What happened to one table
#[derive(Debug)]
pub enum TableOutcome {
    Created,
    Altered {
        added_columns: Vec<String>,
        repartitioned: bool,
    },
    Unchanged,
    Failed(Error),
}

#[derive(Debug)]
pub struct TableMigration {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Per-table results of a migration run
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub tables: Vec<TableMigration>,
}

impl MigrationReport {
    pub fn failures(&self) -> impl Iterator<Item = &TableMigration> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }
}

impl Engine {
    /// Migrate one model
    pub async fn migrate<M: Model>(&self) -> Result<MigrationReport> {
        self.migrate_all(&[ModelSchema::of::<M>()]).await
    }

    /// Migrate every model in order
    ///
    /// Under [`MigrationPolicy::Abort`] the first failing table stops the run
    /// with [`Error::Migration`]; under [`MigrationPolicy::BestEffort`] every
    /// table is attempted and failures are listed in the report.
    pub async fn migrate_all(&self, models: &[ModelSchema]) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for plan in models.iter().flat_map(|m| m.plans(self.naming())) {
            match self.migrate_table(&plan).await {
                Ok(outcome) => {
                    tracing::info!("Migrated table {}: {:?}", plan.table, outcome);
                    report.tables.push(TableMigration {
                        table: plan.table,
                        outcome,
                    });
                }
                Err(err) => {
                    tracing::error!("Migration of table {} failed: {}", plan.table, err);
                    match self.migration_policy() {
                        MigrationPolicy::Abort => {
                            return Err(Error::Migration {
                                table: plan.table,
                                source: Box::new(err),
                            })
                        }
                        MigrationPolicy::BestEffort => report.tables.push(TableMigration {
                            table: plan.table,
                            outcome: TableOutcome::Failed(err),
                        }),
                    }
                }
            }
        }

        Ok(report)
    }

    /// Create or alter one physical table
    pub async fn migrate_table(&self, plan: &TablePlan) -> Result<TableOutcome> {
        if plan.columns.is_empty() {
            return Err(Error::validation(format!("table {} has no columns", plan.table)));
        }

        let dialect = self.dialect();
        let target = Target::new(&plan.table, Operation::Migrate);
        let table_arg = [Value::from(&plan.table)];

        let exists = Statement::build(dialect.table_exists_sql(), &table_arg)?;
        if self.fetch_count(target, &exists).await? == 0 {
            if plan.partition.is_some() && !dialect.supports_partitioning() {
                tracing::warn!(
                    "Dialect {:?} does not support partitioning; creating {} unpartitioned",
                    dialect,
                    plan.table
                );
            }
            let ddl = dialect.create_table(
                &plan.table,
                plan.columns,
                self.table_options(),
                &plan.comment,
                plan.partition.as_ref().map(|(t, s)| (t.as_str(), s.as_str())),
            );
            self.execute(target, &Statement::plain(ddl)).await?;
            return Ok(TableOutcome::Created);
        }

        let columns = Statement::build(dialect.columns_sql(), &table_arg)?;
        let existing: Vec<String> = self
            .fetch_strings(target, &columns)
            .await?
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();

        let mut added_columns = Vec::new();
        for column in plan.columns {
            if !existing.contains(&column.name.to_lowercase()) {
                let ddl = dialect.add_column(&plan.table, column);
                self.execute(target, &Statement::plain(ddl)).await?;
                added_columns.push(column.name.to_string());
            }
        }

        let mut repartitioned = false;
        if let (Some((partition_type, strategy)), Some(sql)) =
            (&plan.partition, dialect.partition_names_sql())
        {
            let live = self
                .fetch_strings(target, &Statement::build(sql, &table_arg)?)
                .await?;
            if live != partition_names(strategy) {
                let ddl = dialect.repartition(&plan.table, partition_type, strategy);
                self.execute(target, &Statement::plain(ddl)).await?;
                repartitioned = true;
            }
        }

        if added_columns.is_empty() && !repartitioned {
            Ok(TableOutcome::Unchanged)
        } else {
            Ok(TableOutcome::Altered {
                added_columns,
                repartitioned,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, PartitionDescriptor, TablePart};

    const COLUMNS: &[Column] = &[
        Column::new("id", ColumnType::BigInt).primary_key(),
        Column::new("created_at", ColumnType::DateTime),
    ];

    fn schema(partitioning: Partitioning) -> ModelSchema {
        ModelSchema {
            name: "LoginLog",
            table_name: None,
            comment: None,
            columns: COLUMNS,
            partitioning,
        }
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("", "( … )"), None);
        assert_eq!(non_blank("range columns(`a`)", "  "), None);
        assert!(non_blank("range columns(`a`)", "( … )").is_some());
    }

    #[test]
    fn test_comment_defaults_to_table() {
        assert_eq!(comment_or_table(None, "login_log"), "login_log");
        assert_eq!(comment_or_table(Some(""), "login_log"), "login_log");
        assert_eq!(comment_or_table(Some("logins"), "login_log"), "logins");
    }

    #[test]
    fn test_plain_model_plan() {
        let plans = schema(Partitioning::None).plans(&NamingStrategy::new("t_"));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].table, "t_login_log");
        assert_eq!(plans[0].comment, "t_login_log");
        assert_eq!(plans[0].partition, None);
    }

    #[test]
    fn test_partitioned_model_without_parts() {
        let plans = schema(Partitioning::Partitioned(PartitionDescriptor {
            partition_type: "range columns(`created_at`)".to_string(),
            partition_strategy: "( partition `after` values less than maxvalue )".to_string(),
            parts: Vec::new(),
        }))
        .plans(&NamingStrategy::default());

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].table, "login_log");
        assert_eq!(
            plans[0].partition.as_ref().map(|(t, _)| t.as_str()),
            Some("range columns(`created_at`)")
        );
    }

    #[test]
    fn test_parts_migrate_separately() {
        let plans = schema(Partitioning::Partitioned(PartitionDescriptor {
            partition_type: "range columns(`created_at`)".to_string(),
            partition_strategy: "( partition `after` values less than maxvalue )".to_string(),
            parts: vec![
                TablePart::new("login_log_web", "web logins"),
                TablePart::new("login_log_app", "")
                    .with_partition("list columns(`id`)", "( PARTITION `p0` VALUES IN (1) )"),
            ],
        }))
        .plans(&NamingStrategy::default());

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].table, "login_log_web");
        assert_eq!(plans[0].comment, "web logins");
        assert_eq!(
            plans[0].partition,
            Some((
                "range columns(`created_at`)".to_string(),
                "( partition `after` values less than maxvalue )".to_string()
            ))
        );

        assert_eq!(plans[1].table, "login_log_app");
        assert_eq!(plans[1].comment, "login_log_app");
        assert_eq!(
            plans[1].partition,
            Some((
                "list columns(`id`)".to_string(),
                "( PARTITION `p0` VALUES IN (1) )".to_string()
            ))
        );
    }

    #[test]
    fn test_blank_partition_is_dropped() {
        let plans = schema(Partitioning::Partitioned(PartitionDescriptor::default()))
            .plans(&NamingStrategy::default());
        assert_eq!(plans[0].partition, None);
    }
}
