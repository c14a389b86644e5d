//! PostgreSQLアダプターの統合テスト
//!
//! 実行にはデータベースが必要：
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::NaiveDate;
use futures::TryStreamExt;
use rusty_library_circulation::adapters::clock::FixedClock;
use rusty_library_circulation::adapters::postgres::{
    Database, PostgresCirculationStore, PostgresLibraryDirectory,
};
use rusty_library_circulation::application::circulation::{
    CirculationError, CirculationSettings, ConflictReason, EntityKind, ServiceDependencies,
    borrow_book, return_book,
};
use rusty_library_circulation::config::DatabaseConfig;
use rusty_library_circulation::domain::commands::*;
use rusty_library_circulation::domain::*;
use rusty_library_circulation::ports::*;
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;

mod common;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
}

async fn setup() -> (PgPool, ServiceDependencies) {
    let pool = common::create_test_pool().await;
    common::cleanup_database(&pool).await;

    let deps = ServiceDependencies {
        store: Arc::new(PostgresCirculationStore::new(pool.clone())),
        directory: Arc::new(PostgresLibraryDirectory::new(pool.clone())),
        clock: Arc::new(FixedClock::new(date(1))),
        settings: CirculationSettings::default(),
    };

    (pool, deps)
}

async fn add_book(deps: &ServiceDependencies, code: &str, stock: i32) -> Book {
    match deps
        .directory
        .register_book(NewBook {
            code: BookCode::parse(code).unwrap(),
            title: format!("Title of {}", code),
            author: "Author".to_string(),
            stock,
        })
        .await
        .unwrap()
    {
        Registration::Created(book) => book,
        Registration::DuplicateCode => panic!("duplicate book {}", code),
    }
}

async fn add_member(deps: &ServiceDependencies, code: &str) -> Member {
    match deps
        .directory
        .register_member(NewMember {
            code: MemberCode::parse(code).unwrap(),
            name: format!("Member {}", code),
        })
        .await
        .unwrap()
    {
        Registration::Created(member) => member,
        Registration::DuplicateCode => panic!("duplicate member {}", code),
    }
}

async fn stock_of(deps: &ServiceDependencies, book: &Book) -> i32 {
    deps.directory
        .get_book(&book.code)
        .await
        .unwrap()
        .unwrap()
        .stock
}

async fn active_count(pool: &PgPool, book: &Book) -> i64 {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM borrows
        WHERE book_id = $1 AND NOT is_returned
        "#,
    )
    .bind(book.id.value())
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_postgres_borrow_and_return() {
    let (pool, deps) = setup().await;
    let book = add_book(&deps, "JK-45", 1).await;
    let member = add_member(&deps, "M001").await;

    let receipt = borrow_book(
        &deps,
        BorrowBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            borrowed_on: date(1),
        },
    )
    .await
    .unwrap();

    assert_eq!(receipt.remaining_stock, 0);
    assert_eq!(stock_of(&deps, &book).await, 0);
    assert_eq!(active_count(&pool, &book).await, 1);

    let returned = return_book(
        &deps,
        ReturnBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            returned_on: date(10),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.days_held, 9);
    assert!(returned.penalized);
    assert_eq!(stock_of(&deps, &book).await, 1);
    assert_eq!(active_count(&pool, &book).await, 0);

    // 台帳は結合済みで返る
    let entries: Vec<BorrowEntry> = deps.directory.stream_borrows().try_collect().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].member_name, "Member M001");
    assert_eq!(entries[0].total_days, Some(9));

    let members = deps.directory.list_members().await.unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].member.penalized);
    assert_eq!(members[0].active_borrows, 0);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_postgres_failed_borrow_leaves_no_trace() {
    let (pool, deps) = setup().await;
    let book = add_book(&deps, "B1", 0).await;
    let member = add_member(&deps, "M1").await;

    let result = borrow_book(
        &deps,
        BorrowBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            borrowed_on: date(1),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(CirculationError::Conflict {
            reason: ConflictReason::OutOfStock,
            ..
        })
    ));
    assert_eq!(stock_of(&deps, &book).await, 0);
    assert_eq!(active_count(&pool, &book).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore]
async fn test_postgres_concurrent_borrows_of_last_copy() {
    let (pool, deps) = setup().await;
    let book = add_book(&deps, "B1", 1).await;
    let mut members = Vec::new();
    for i in 0..4 {
        members.push(add_member(&deps, &format!("M{}", i)).await);
    }

    let handles: Vec<_> = members
        .iter()
        .map(|member| {
            let deps = deps.clone();
            let cmd = BorrowBook {
                member_code: member.code.clone(),
                book_code: book.code.clone(),
                borrowed_on: date(1),
            };
            tokio::spawn(async move { borrow_book(&deps, cmd).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CirculationError::Conflict {
                reason: ConflictReason::OutOfStock,
                ..
            }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(stock_of(&deps, &book).await, 0);
    assert_eq!(active_count(&pool, &book).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore]
async fn test_postgres_concurrent_returns_restock_once() {
    let (_pool, deps) = setup().await;
    let book = add_book(&deps, "B1", 1).await;
    let member = add_member(&deps, "M1").await;

    borrow_book(
        &deps,
        BorrowBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            borrowed_on: date(1),
        },
    )
    .await
    .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let deps = deps.clone();
            let cmd = ReturnBook {
                member_code: member.code.clone(),
                book_code: book.code.clone(),
                returned_on: date(2),
            };
            tokio::spawn(async move { return_book(&deps, cmd).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CirculationError::NotFound {
                kind: EntityKind::ActiveBorrow,
                ..
            }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(stock_of(&deps, &book).await, 1);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_postgres_directory_registration() {
    let (_pool, deps) = setup().await;
    add_book(&deps, "B1", 2).await;
    add_book(&deps, "B2", 0).await;

    let duplicate = deps
        .directory
        .register_book(NewBook {
            code: BookCode::parse("B1").unwrap(),
            title: "Other".to_string(),
            author: "Other".to_string(),
            stock: 1,
        })
        .await
        .unwrap();
    assert_eq!(duplicate, Registration::DuplicateCode);

    let available = deps.directory.list_available_books().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].code.as_str(), "B1");

    deps.directory.ping().await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_postgres_update_and_delete_respect_active_borrows() {
    let (pool, deps) = setup().await;
    let book = add_book(&deps, "B1", 1).await;
    let member = add_member(&deps, "M1").await;

    let updated = deps
        .directory
        .update_book(
            &book.code,
            BookUpdate {
                author: Some("Frank Herbert".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.author, "Frank Herbert");
    assert_eq!(updated.title, book.title);
    assert_eq!(updated.stock, 1);

    borrow_book(
        &deps,
        BorrowBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            borrowed_on: date(1),
        },
    )
    .await
    .unwrap();

    // 外部キー違反ではなく、削除しないという結果になる
    let removal = deps.directory.delete_book(&book.code).await.unwrap();
    assert_eq!(removal, Removal::HasActiveBorrows);
    let removal = deps.directory.delete_member(&member.code).await.unwrap();
    assert_eq!(removal, Removal::HasActiveBorrows);
    assert_eq!(active_count(&pool, &book).await, 1);

    let summary = deps.directory.get_member(&member.code).await.unwrap();
    assert_eq!(summary.unwrap().active_borrows, 1);

    let renamed = deps
        .directory
        .update_member(
            &member.code,
            MemberUpdate {
                name: Some("Renamed".to_string()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name, "Renamed");
    assert!(!renamed.penalized);

    return_book(
        &deps,
        ReturnBook {
            member_code: member.code.clone(),
            book_code: book.code.clone(),
            returned_on: date(2),
        },
    )
    .await
    .unwrap();

    let removal = deps.directory.delete_book(&book.code).await.unwrap();
    assert_eq!(removal, Removal::Deleted);
    assert_eq!(deps.directory.get_book(&book.code).await.unwrap(), None);

    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrows")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(history, 0);

    let removal = deps.directory.delete_member(&member.code).await.unwrap();
    assert_eq!(removal, Removal::Deleted);
    let removal = deps.directory.delete_member(&member.code).await.unwrap();
    assert_eq!(removal, Removal::NotFound);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_database_component_connects_and_migrates() {
    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DatabaseConfig::default().url),
        ..DatabaseConfig::default()
    };

    let database = Database::connect(&config).await.unwrap();
    database.migrate().await.unwrap();

    let one: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(database.pool())
        .await
        .unwrap();
    assert_eq!(one, 1);

    // 生存確認タスクはハンドルの破棄で止まる
    let keepalive = database.spawn_keepalive(std::time::Duration::from_millis(10));
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    drop(keepalive);
}
