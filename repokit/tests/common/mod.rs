#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use repokit::config::DatabaseConfig;
use repokit::engine::logger::{SqlLogRecord, SqlLogger};
use repokit::model::{Column, ColumnType, Model};
use repokit::types::DateTime;
use repokit::{Engine, Repository, Value};

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub age: i64,
    pub created_at: DateTime,
}

impl Account {
    pub fn new(email: &str, name: &str, age: i64) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            age,
            created_at: "2024-03-01 08:30:00".parse().unwrap(),
            ..Default::default()
        }
    }
}

impl Model for Account {
    const NAME: &'static str = "Account";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnType::BigInt).primary_key().auto_increment(),
        Column::new("email", ColumnType::Varchar(191)).unique(),
        Column::new("name", ColumnType::Varchar(64)),
        Column::new("age", ColumnType::Int),
        Column::new("created_at", ColumnType::DateTime),
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            (&self.email).into(),
            (&self.name).into(),
            self.age.into(),
            self.created_at.into(),
        ]
    }
}

/// Log sink that keeps every record
#[derive(Debug, Default)]
pub struct Capture {
    records: Mutex<Vec<SqlLogRecord>>,
}

impl Capture {
    pub fn records(&self) -> Vec<SqlLogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn callers(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.caller).collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl SqlLogger for Capture {
    fn log(&self, record: &SqlLogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Single-connection in-memory database
pub fn memory_config() -> DatabaseConfig {
    DatabaseConfig {
        dsn: "sqlite::memory:".to_string(),
        max_open_conn: 1,
        max_idle_conn: 1,
        print_sql: true,
        ..Default::default()
    }
}

pub async fn engine_with(config: DatabaseConfig) -> (Engine, Arc<Capture>) {
    let capture = Arc::new(Capture::default());
    let engine = Engine::builder(config)
        .logger(capture.clone())
        .connect()
        .await
        .unwrap();
    (engine, capture)
}

/// Engine with the `account` table migrated and a clean log
pub async fn setup() -> (Repository<Account>, Arc<Capture>) {
    let (engine, capture) = engine_with(memory_config()).await;
    engine.migrate::<Account>().await.unwrap();
    capture.clear();
    (Repository::new(engine), capture)
}

pub async fn seed(repo: &Repository<Account>, n: i64) {
    let accounts: Vec<Account> = (1..=n)
        .map(|i| Account::new(&format!("user{i:02}@example.com"), &format!("user{i:02}"), 20 + i))
        .collect();
    repo.create(&accounts).await.unwrap();
}
