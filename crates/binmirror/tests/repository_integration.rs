//! Integration tests for repository operations.
//!
//! These tests require the `sqlite` and `migrate` features to be enabled
//! and use an in-memory SQLite database.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use binmirror::entity::binary::node_id;
use binmirror::repository::{self, RepositoryError};
use binmirror::retry::RetryConfig;
use binmirror::{BinaryItem, connect_and_migrate};
use sea_orm::DatabaseConnection;

async fn setup_test_db() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}

fn tarball(size: i64, date: &str) -> BinaryItem {
    BinaryItem::file(
        "node-v20.0.0.tar.gz",
        Some(size),
        date,
        "https://dist.test/node/v20.0.0/node-v20.0.0.tar.gz",
    )
}

#[tokio::test]
async fn test_save_and_find() {
    let db = setup_test_db().await;

    repository::save(&db, "node", "/v20.0.0/", &tarball(5, "2023-04-18T10:01:00.000Z"))
        .await
        .expect("save");

    let node = repository::find(&db, "node", "/v20.0.0/", "node-v20.0.0.tar.gz")
        .await
        .expect("find")
        .expect("node exists");
    assert_eq!(node.id, node_id("node", "/v20.0.0/", "node-v20.0.0.tar.gz"));
    assert_eq!(node.full_path(), "/v20.0.0/node-v20.0.0.tar.gz");
    assert_eq!(node.size, Some(5));
    assert!(!node.is_dir);
    assert!(!node.missing);

    assert!(
        repository::find(&db, "electron", "/v20.0.0/", "node-v20.0.0.tar.gz")
            .await
            .expect("find")
            .is_none()
    );
}

#[tokio::test]
async fn test_upsert_updates_metadata_in_place() {
    let db = setup_test_db().await;

    repository::save(&db, "node", "/v20.0.0/", &tarball(5, "2023-04-18T10:01:00.000Z"))
        .await
        .expect("insert");
    let first = repository::find(&db, "node", "/v20.0.0/", "node-v20.0.0.tar.gz")
        .await
        .expect("find")
        .expect("exists");

    repository::mark_missing(&db, "node", "/v20.0.0/", "node-v20.0.0.tar.gz", true)
        .await
        .expect("mark");
    repository::save_with_retry(
        &db,
        "node",
        "/v20.0.0/",
        &tarball(7, "2023-05-01T00:00:00.000Z"),
        &RetryConfig::disabled(),
    )
    .await
    .expect("update");

    let second = repository::find(&db, "node", "/v20.0.0/", "node-v20.0.0.tar.gz")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.size, Some(7));
    assert_eq!(second.date, "2023-05-01T00:00:00.000Z");
    assert!(second.missing, "missing flag survives a metadata update");
    assert_eq!(repository::count_by_category(&db, "node").await.expect("count"), 1);
}

#[tokio::test]
async fn test_list_children_sorted_by_name() {
    let db = setup_test_db().await;

    for item in [
        BinaryItem::dir("v9.0.0/", ""),
        BinaryItem::file("SHASUMS256.txt", Some(12), "", "https://dist.test/SHASUMS256.txt"),
        BinaryItem::dir("v10.0.0/", ""),
    ] {
        repository::save(&db, "node", "/", &item).await.expect("save");
    }
    repository::save(&db, "node", "/v9.0.0/", &tarball(1, ""))
        .await
        .expect("save nested");

    let names: Vec<_> = repository::list(&db, "node", "/")
        .await
        .expect("list")
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, vec!["SHASUMS256.txt", "v10.0.0/", "v9.0.0/"]);

    assert!(repository::list(&db, "node", "/v10.0.0/").await.expect("list").is_empty());
}

#[tokio::test]
async fn test_missing_flag_and_counts() {
    let db = setup_test_db().await;

    repository::save(&db, "sqlite3", "/v5.1.6/", &tarball(1, ""))
        .await
        .expect("save");
    repository::save(&db, "node", "/", &BinaryItem::dir("v1/", ""))
        .await
        .expect("save");

    let updated = repository::mark_missing(&db, "sqlite3", "/v5.1.6/", "node-v20.0.0.tar.gz", true)
        .await
        .expect("mark");
    assert_eq!(updated, 1);
    assert_eq!(repository::count_missing(&db, "sqlite3").await.expect("count"), 1);

    let none = repository::mark_missing(&db, "sqlite3", "/v5.1.6/", "absent.tgz", true)
        .await
        .expect("mark absent");
    assert_eq!(none, 0);

    repository::mark_missing(&db, "sqlite3", "/v5.1.6/", "node-v20.0.0.tar.gz", false)
        .await
        .expect("clear");
    assert_eq!(repository::count_missing(&db, "sqlite3").await.expect("count"), 0);

    assert_eq!(
        repository::list_categories(&db).await.expect("categories"),
        vec!["node".to_string(), "sqlite3".to_string()]
    );
}

#[tokio::test]
async fn test_malformed_addresses_are_rejected() {
    let db = setup_test_db().await;

    let cases = [
        ("node", "v1/", BinaryItem::dir("a/", "")),
        ("node", "/v1", BinaryItem::dir("a/", "")),
        ("node", "/", BinaryItem::file("a/b.txt", None, "", "https://x.test/a")),
        ("node", "/", BinaryItem::file("..", None, "", "https://x.test/a")),
        ("", "/", BinaryItem::dir("a/", "")),
    ];
    for (category, parent, item) in cases {
        let err = repository::save(&db, category, parent, &item)
            .await
            .expect_err("address should be rejected");
        assert!(
            matches!(err, RepositoryError::InvalidInput { .. }),
            "{category:?} {parent:?} {:?}: {err}",
            item.name
        );
    }
    assert!(repository::list_categories(&db).await.expect("categories").is_empty());
}
