mod common;

use common::{seed, setup, Account};
use repokit::{cond, Condition, Error, Page};

#[tokio::test]
async fn test_pages_in_primary_key_order() {
    let (repo, _) = setup().await;
    seed(&repo, 25).await;

    let first = repo
        .page_by_condition(Vec::<Condition>::new(), &Page::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first.total_count, 25);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items.first().map(|a| a.id), Some(1));
    assert_eq!(first.items.len(), 10);

    let last = repo
        .page_by_condition(Vec::<Condition>::new(), &Page::new(3, 10))
        .await
        .unwrap();
    assert_eq!(last.page_number, 3);
    assert_eq!(
        last.items.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![21, 22, 23, 24, 25]
    );
}

#[tokio::test]
async fn test_page_beyond_last_runs_only_count() {
    let (repo, capture) = setup().await;
    seed(&repo, 25).await;
    capture.clear();

    let result = repo
        .page_by_condition(Vec::<Condition>::new(), &Page::new(4, 10))
        .await
        .unwrap();
    assert_eq!(result.page_number, 4);
    assert_eq!(result.total_pages, 3);
    assert_eq!(result.total_count, 25);
    assert!(result.is_empty());

    assert_eq!(capture.callers(), vec!["account.count".to_string()]);
}

#[tokio::test]
async fn test_empty_table_page() {
    let (repo, capture) = setup().await;

    let result = repo.page(&Account::default(), &Page::default()).await.unwrap();
    assert_eq!(result.page_number, 1);
    assert_eq!(result.total_pages, 0);
    assert_eq!(result.total_count, 0);
    assert!(result.items.is_empty());
    assert_eq!(capture.records().len(), 1);
}

#[tokio::test]
async fn test_page_with_filter_and_order() {
    let (repo, _) = setup().await;
    seed(&repo, 12).await;

    let result = repo
        .page_by_condition(
            [cond!("age > ?", 25)],
            &Page::new(2, 3).order_by("age desc"),
        )
        .await
        .unwrap();
    assert_eq!(result.total_count, 7);
    assert_eq!(result.total_pages, 3);
    assert_eq!(
        result.items.iter().map(|a| a.age).collect::<Vec<_>>(),
        vec![29, 28, 27]
    );

    let template = Account {
        age: 30,
        ..Default::default()
    };
    let result = repo.page(&template, &Page::new(0, 0)).await.unwrap();
    assert_eq!(result.total_count, 1);
    assert_eq!(result.items[0].name, "user10");
}

#[tokio::test]
async fn test_invalid_order_by_is_rejected_before_querying() {
    let (repo, capture) = setup().await;
    seed(&repo, 3).await;
    capture.clear();

    let err = repo
        .page_by_condition(
            Vec::<Condition>::new(),
            &Page::new(1, 10).order_by("id; drop table account"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(capture.records().is_empty());
}

#[derive(Debug, sqlx::FromRow)]
struct NameAge {
    name: String,
    age: i64,
}

#[tokio::test]
async fn test_paginate_sql_with_projection() {
    let (repo, capture) = setup().await;
    seed(&repo, 8).await;
    capture.clear();

    let engine = repo.engine();
    let result = engine
        .paginate_sql::<NameAge>(
            "select name, age from `account` where age >= ?;",
            &[24.into()],
            &Page::new(2, 2).order_by("age"),
        )
        .await
        .unwrap();
    assert_eq!(result.total_count, 5);
    assert_eq!(result.total_pages, 3);
    assert_eq!(
        result
            .items
            .iter()
            .map(|r| (r.name.as_str(), r.age))
            .collect::<Vec<_>>(),
        vec![("user06", 26), ("user07", 27)]
    );

    let records = capture.records();
    assert_eq!(records.len(), 2);
    assert!(records[0].message.contains("table_count"));
    assert_eq!(records[0].caller, "raw.count");
}

#[tokio::test]
async fn test_paginate_conditions_maps_projection() {
    let (repo, _) = setup().await;
    seed(&repo, 4).await;

    #[derive(sqlx::FromRow)]
    struct Email {
        email: String,
    }

    let result = repo
        .engine()
        .paginate_conditions::<Account, Email, _, _>([cond!("age < ?", 23)], &Page::new(1, 10))
        .await
        .unwrap();
    assert_eq!(result.total_count, 2);
    assert_eq!(
        result.map(|e| e.email).items,
        vec!["user01@example.com".to_string(), "user02@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_paginate_sql_with_own_order() {
    let (repo, capture) = setup().await;
    seed(&repo, 4).await;
    capture.clear();

    let engine = repo.engine();
    let err = engine
        .paginate_sql::<NameAge>(
            "select name, age from `account` order by age desc",
            &[],
            &Page::new(1, 10).order_by("name"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(capture.records().is_empty());

    // The query's own order applies when the page brings none
    let result = engine
        .paginate_sql::<NameAge>(
            "select name, age from `account` order by age desc",
            &[],
            &Page::new(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(
        result.items.iter().map(|r| r.age).collect::<Vec<_>>(),
        vec![24, 23]
    );
}
