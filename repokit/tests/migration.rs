mod common;

use chrono::NaiveDate;
use common::{engine_with, memory_config, Account};
use repokit::config::MigrationPolicy;
use repokit::migrate::{ModelSchema, TableOutcome};
use repokit::model::{Column, ColumnType, Model, PartitionDescriptor, Partitioning, TablePart};
use repokit::partition::{monthly_partition_strategy, range_partition_type};
use repokit::{Error, Repository, Value};

/// `account` with one extra column
#[derive(Debug, Clone, Default, sqlx::FromRow)]
struct AccountWithNickname {
    id: i64,
    email: String,
    name: String,
    age: i64,
    created_at: repokit::types::DateTime,
    nickname: String,
}

impl Model for AccountWithNickname {
    const NAME: &'static str = "AccountWithNickname";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnType::BigInt).primary_key().auto_increment(),
        Column::new("email", ColumnType::Varchar(191)).unique(),
        Column::new("name", ColumnType::Varchar(64)),
        Column::new("age", ColumnType::Int),
        Column::new("created_at", ColumnType::DateTime),
        Column::new("nickname", ColumnType::Varchar(64)),
    ];

    fn table_name() -> Option<String> {
        Some("account".to_string())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            (&self.email).into(),
            (&self.name).into(),
            self.age.into(),
            self.created_at.into(),
            (&self.nickname).into(),
        ]
    }
}

#[derive(Debug, Default, sqlx::FromRow)]
struct LoginLog {
    id: i64,
    created_at: repokit::types::DateTime,
}

impl Model for LoginLog {
    const NAME: &'static str = "LoginLog";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnType::BigInt).primary_key().auto_increment(),
        Column::new("created_at", ColumnType::DateTime),
    ];

    fn partitioning() -> Partitioning {
        let reference = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        Partitioning::Partitioned(PartitionDescriptor {
            partition_type: range_partition_type("created_at"),
            partition_strategy: monthly_partition_strategy(&reference),
            parts: vec![
                TablePart::new("login_log_web", "web logins"),
                TablePart::new("login_log_app", "app logins"),
            ],
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.created_at.into()]
    }
}

fn broken_schema() -> ModelSchema {
    ModelSchema {
        name: "Broken",
        table_name: None,
        comment: None,
        columns: &[],
        partitioning: Partitioning::None,
    }
}

#[tokio::test]
async fn test_create_then_unchanged() {
    let (engine, _) = engine_with(memory_config()).await;

    let report = engine.migrate::<Account>().await.unwrap();
    assert!(report.is_success());
    assert!(matches!(report.outcome("account"), Some(TableOutcome::Created)));

    let report = engine.migrate::<Account>().await.unwrap();
    assert!(matches!(report.outcome("account"), Some(TableOutcome::Unchanged)));
}

#[tokio::test]
async fn test_missing_column_is_added() {
    let (engine, _) = engine_with(memory_config()).await;
    engine.migrate::<Account>().await.unwrap();

    let accounts = Repository::<Account>::new(engine.clone());
    accounts
        .create(&[Account::new("ada@example.com", "Ada", 36)])
        .await
        .unwrap();

    let report = engine.migrate::<AccountWithNickname>().await.unwrap();
    match report.outcome("account") {
        Some(TableOutcome::Altered {
            added_columns,
            repartitioned,
        }) => {
            assert_eq!(added_columns, &vec!["nickname".to_string()]);
            assert!(!repartitioned);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // Existing rows get the zero default
    let widened = Repository::<AccountWithNickname>::new(engine);
    let ada = widened.get_by_primary_key(1).await.unwrap();
    assert_eq!(ada.email, "ada@example.com");
    assert_eq!(ada.nickname, "");
}

#[tokio::test]
async fn test_parts_are_separate_tables() {
    let (engine, _) = engine_with(memory_config()).await;

    let report = engine.migrate::<LoginLog>().await.unwrap();
    assert_eq!(report.tables.len(), 2);
    assert!(matches!(report.outcome("login_log_web"), Some(TableOutcome::Created)));
    assert!(matches!(report.outcome("login_log_app"), Some(TableOutcome::Created)));

    let web = Repository::<LoginLog>::for_table(engine.clone(), "login_log_web");
    web.create(&[LoginLog {
        created_at: "2024-05-02 10:00:00".parse().unwrap(),
        ..Default::default()
    }])
    .await
    .unwrap();

    let app = Repository::<LoginLog>::for_table(engine, "login_log_app");
    assert_eq!(web.count(&LoginLog::default()).await.unwrap(), 1);
    assert_eq!(app.count(&LoginLog::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_abort_policy_stops_at_first_failure() {
    let (engine, _) = engine_with(memory_config()).await;

    let err = engine
        .migrate_all(&[broken_schema(), ModelSchema::of::<Account>()])
        .await
        .unwrap_err();
    match err {
        Error::Migration { table, source } => {
            assert_eq!(table, "broken");
            assert!(matches!(*source, Error::Validation(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }

    // Nothing after the failing model ran
    let report = engine.migrate::<Account>().await.unwrap();
    assert!(matches!(report.outcome("account"), Some(TableOutcome::Created)));
}

#[tokio::test]
async fn test_best_effort_policy_collects_failures() {
    let mut config = memory_config();
    config.migration_policy = MigrationPolicy::BestEffort;
    let (engine, _) = engine_with(config).await;

    let report = engine
        .migrate_all(&[broken_schema(), ModelSchema::of::<Account>()])
        .await
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    assert!(matches!(report.outcome("broken"), Some(TableOutcome::Failed(_))));
    assert!(matches!(report.outcome("account"), Some(TableOutcome::Created)));
}

#[tokio::test]
async fn test_table_prefix_applies() {
    let mut config = memory_config();
    config.table_prefix = "app_".to_string();
    let (engine, _) = engine_with(config).await;

    let report = engine.migrate::<Account>().await.unwrap();
    assert!(matches!(report.outcome("app_account"), Some(TableOutcome::Created)));
    assert_eq!(Repository::<Account>::new(engine).table(), "app_account");
}
