mod common;

use std::panic::AssertUnwindSafe;

use common::{setup, Account};
use futures::FutureExt;
use repokit::error::TransactionStage;
use repokit::{Error, ErrorKind, Repository};

#[tokio::test]
async fn test_commit_makes_writes_visible() {
    let (repo, _) = setup().await;

    let id = repo
        .transaction(|tx| async move {
            assert!(tx.engine().in_transaction());
            tx.create(&[Account::new("ada@example.com", "Ada", 36)]).await?;
            let stored = tx.get_by_primary_key(1).await?;
            Ok::<_, Error>(stored.id)
        })
        .await
        .unwrap();

    assert_eq!(id, 1);
    assert!(!repo.engine().in_transaction());
    assert_eq!(repo.get_by_primary_key(1).await.unwrap().name, "Ada");
}

#[tokio::test]
async fn test_error_rolls_back() {
    let (repo, _) = setup().await;
    repo.create(&[Account::new("keep@example.com", "keep", 30)])
        .await
        .unwrap();

    let err = repo
        .transaction(|tx| async move {
            tx.create(&[Account::new("gone@example.com", "gone", 31)]).await?;
            tx.delete(1).await?;
            Err::<(), Error>(Error::validation("abort"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(ref m) if m == "abort"));
    let left = repo.find_all(&Account::default(), &[]).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].email, "keep@example.com");
}

#[tokio::test]
async fn test_database_error_inside_transaction_rolls_back() {
    let (repo, _) = setup().await;

    let err = repo
        .transaction(|tx| async move {
            tx.create(&[Account::new("a@example.com", "a", 1)]).await?;
            tx.create(&[Account::new("a@example.com", "b", 2)]).await?;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_constraint());
    assert_eq!(repo.count(&Account::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_panic_rolls_back_and_propagates() {
    let (repo, _) = setup().await;

    let inner = repo.clone();
    let outcome = AssertUnwindSafe(async move {
        inner
            .transaction(|tx| async move {
                tx.create(&[Account::new("boom@example.com", "boom", 1)]).await?;
                if true {
                    panic!("boom");
                }
                Ok::<(), Error>(())
            })
            .await
    })
    .catch_unwind()
    .await;

    let payload = outcome.err().unwrap();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    // The connection was released and the insert undone
    assert_eq!(repo.count(&Account::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nested_transaction_joins_outer() {
    let (repo, _) = setup().await;

    let err = repo
        .transaction(|outer| async move {
            outer
                .create(&[Account::new("outer@example.com", "outer", 1)])
                .await?;
            outer
                .transaction(|inner| async move {
                    assert!(inner.engine().in_transaction());
                    inner
                        .create(&[Account::new("inner@example.com", "inner", 2)])
                        .await
                })
                .await?;
            // The inner write is visible before the outer call finishes
            assert_eq!(outer.count(&Account::default()).await?, 2);
            Err::<(), Error>(Error::validation("undo both"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(repo.count(&Account::default()).await.unwrap(), 0);
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
struct AuditEntry {
    id: i64,
    action: String,
}

impl repokit::Model for AuditEntry {
    const NAME: &'static str = "AuditEntry";
    const COLUMNS: &'static [repokit::model::Column] = &[
        repokit::model::Column::new("id", repokit::model::ColumnType::BigInt)
            .primary_key()
            .auto_increment(),
        repokit::model::Column::new("action", repokit::model::ColumnType::Varchar(32)),
    ];

    fn values(&self) -> Vec<repokit::Value> {
        vec![self.id.into(), (&self.action).into()]
    }
}

#[tokio::test]
async fn test_rebind_shares_transaction() {
    let (repo, _) = setup().await;
    repo.engine().migrate::<AuditEntry>().await.unwrap();

    let result = repo
        .transaction(|tx| async move {
            tx.create(&[Account::new("a@example.com", "a", 1)]).await?;
            let audit = tx.rebind::<AuditEntry>();
            assert_eq!(audit.table(), "audit_entry");
            audit
                .create(&[AuditEntry {
                    action: "created".to_string(),
                    ..Default::default()
                }])
                .await?;
            Err::<(), Error>(Error::validation("rollback"))
        })
        .await;
    assert!(result.is_err());

    let audits: Repository<AuditEntry> = repo.rebind();
    assert_eq!(audits.count(&AuditEntry::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_escaped_handle_is_inactive() {
    let (repo, _) = setup().await;

    let escaped = repo
        .transaction(|tx| async move { Ok::<_, Error>(tx.clone()) })
        .await
        .unwrap();

    let err = escaped.count(&Account::default()).await.unwrap_err();
    assert!(matches!(err, Error::TransactionInactive));
}

#[tokio::test]
async fn test_commit_failure_is_transaction_error() {
    let (repo, _) = setup().await;

    let err = repo
        .transaction(|tx| async move {
            tx.create(&[Account::new("a@example.com", "a", 1)]).await?;
            // End the transaction behind the engine's back
            tx.engine().execute_raw("ROLLBACK", &[]).await?;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transaction {
            stage: TransactionStage::Commit,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Transaction);
}

#[tokio::test]
async fn test_rollback_failure_keeps_original_error() {
    let (repo, _) = setup().await;

    let err = repo
        .transaction(|tx| async move {
            tx.engine().execute_raw("ROLLBACK", &[]).await?;
            Err::<(), Error>(Error::validation("abort"))
        })
        .await
        .unwrap_err();

    match err {
        Error::RollbackFailed { original, .. } => {
            assert!(matches!(*original, Error::Validation(ref m) if m == "abort"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
