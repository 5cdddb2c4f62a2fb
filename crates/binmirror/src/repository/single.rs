use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, OnConflict},
};

use crate::entity::binary::{ActiveModel, Column, Entity as Binary, Model, node_id};
use crate::retry::{RetryConfig, with_retry};
use crate::source::BinaryItem;

use super::errors::{RepositoryError, Result, is_retryable_error};

// ─── Single Node Operations ──────────────────────────────────────────────────

/// Find a node by its address.
pub async fn find(
    db: &DatabaseConnection,
    category: &str,
    parent: &str,
    name: &str,
) -> Result<Option<Model>> {
    Binary::find()
        .filter(Column::Category.eq(category))
        .filter(Column::Parent.eq(parent))
        .filter(Column::Name.eq(name))
        .one(db)
        .await
        .map_err(RepositoryError::from)
}

/// Insert or update the node `(category, parent, item.name)`.
///
/// Listing metadata is last-write-wins; `created_at` and `missing` keep their
/// stored values on conflict.
///
/// # Errors
/// Returns `RepositoryError::InvalidInput` for a malformed address and
/// `RepositoryError::Database` if the statement fails.
pub async fn save(
    db: &DatabaseConnection,
    category: &str,
    parent: &str,
    item: &BinaryItem,
) -> Result<()> {
    validate_address(category, parent, item)?;

    let now = Utc::now().fixed_offset();
    let model = ActiveModel {
        id: Set(node_id(category, parent, &item.name)),
        category: Set(category.to_string()),
        parent: Set(parent.to_string()),
        name: Set(item.name.clone()),
        is_dir: Set(item.is_dir),
        size: Set(item.size),
        date: Set(item.date.clone()),
        source_url: Set(item.source_url.clone()),
        ignore_download_statuses: Set(serde_json::json!(item.ignore_download_statuses)),
        missing: Set(false),
        synced_at: Set(now),
        created_at: Set(now),
    };

    Binary::insert(model)
        .on_conflict(build_upsert_on_conflict())
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// [`save`], retrying transient database errors with exponential backoff.
pub async fn save_with_retry(
    db: &DatabaseConnection,
    category: &str,
    parent: &str,
    item: &BinaryItem,
    retry: &RetryConfig,
) -> Result<()> {
    let target = format!("{category}:{parent}{}", item.name);
    with_retry(
        || save(db, category, parent, item),
        retry.clone(),
        is_retryable_error,
        &target,
        None,
    )
    .await
}

/// Record whether the node's bytes are expected to be absent upstream.
///
/// Returns the number of rows updated (0 or 1).
pub async fn mark_missing(
    db: &DatabaseConnection,
    category: &str,
    parent: &str,
    name: &str,
    missing: bool,
) -> Result<u64> {
    let result = Binary::update_many()
        .col_expr(Column::Missing, Expr::value(missing))
        .filter(Column::Category.eq(category))
        .filter(Column::Parent.eq(parent))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Check that `(category, parent, item.name)` is a well-formed node address.
///
/// # Errors
/// Returns `RepositoryError::InvalidInput` describing the first problem.
pub fn validate_address(category: &str, parent: &str, item: &BinaryItem) -> Result<()> {
    if category.is_empty() {
        return Err(RepositoryError::invalid("category must not be empty"));
    }
    if !parent.starts_with('/') || !parent.ends_with('/') {
        return Err(RepositoryError::invalid(format!(
            "parent must start and end with '/': {parent:?}"
        )));
    }
    let leaf = item.name.strip_suffix('/').unwrap_or(&item.name);
    if leaf.is_empty() || leaf.contains('/') || leaf == "." || leaf == ".." {
        return Err(RepositoryError::invalid(format!(
            "invalid node name: {:?}",
            item.name
        )));
    }
    if item.is_dir != item.name.ends_with('/') {
        return Err(RepositoryError::invalid(format!(
            "directory flag does not match name {:?}",
            item.name
        )));
    }
    Ok(())
}

/// ON CONFLICT clause for node upserts, keyed on `(category, parent, name)`.
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::columns([Column::Category, Column::Parent, Column::Name])
        .update_columns([
            Column::IsDir,
            Column::Size,
            Column::Date,
            Column::SourceUrl,
            Column::IgnoreDownloadStatuses,
            Column::SyncedAt,
        ])
        .to_owned()
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use sea_orm::QueryTrait;

    #[test]
    fn upsert_targets_node_address() {
        let now = Utc::now().fixed_offset();
        let model = ActiveModel {
            id: Set(node_id("node", "/", "v1/")),
            category: Set("node".to_string()),
            parent: Set("/".to_string()),
            name: Set("v1/".to_string()),
            is_dir: Set(true),
            size: Set(None),
            date: Set(String::new()),
            source_url: Set(String::new()),
            ignore_download_statuses: Set(serde_json::json!([])),
            missing: Set(false),
            synced_at: Set(now),
            created_at: Set(now),
        };
        let sql = Binary::insert(model)
            .on_conflict(build_upsert_on_conflict())
            .build(sea_orm::DatabaseBackend::Sqlite)
            .to_string();

        assert!(sql.contains(r#"ON CONFLICT ("category", "parent", "name") DO UPDATE"#), "{sql}");
        assert!(sql.contains(r#""size" = "excluded"."size""#), "{sql}");
        assert!(!sql.contains(r#""created_at" = "excluded""#), "{sql}");
        assert!(!sql.contains(r#""missing" = "excluded""#), "{sql}");
    }

    #[test]
    fn address_validation() {
        let file = BinaryItem::file("a.zip", None, "", "https://x/a.zip");
        assert!(validate_address("node", "/", &file).is_ok());
        assert!(validate_address("node", "/v1/", &BinaryItem::dir("v2", "")).is_ok());

        assert!(validate_address("", "/", &file).is_err());
        assert!(validate_address("node", "v1/", &file).is_err());
        assert!(validate_address("node", "/v1", &file).is_err());

        let nested = BinaryItem::file("a/b.zip", None, "", "");
        assert!(validate_address("node", "/", &nested).is_err());
        let dotdot = BinaryItem::dir("..", "");
        assert!(validate_address("node", "/", &dotdot).is_err());

        let mut lying = BinaryItem::file("a.zip", None, "", "");
        lying.is_dir = true;
        assert!(validate_address("node", "/", &lying).is_err());
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use crate::connect_and_migrate;

    use super::*;

    async fn setup_db() -> DatabaseConnection {
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate")
    }

    #[tokio::test]
    async fn save_inserts_then_updates_in_place() {
        let db = setup_db().await;
        let first = BinaryItem::file("a.zip", Some(10), "2021-01-01T00:00:00.000Z", "https://x/a");
        save(&db, "node", "/v1/", &first).await.expect("insert");

        let stored = find(&db, "node", "/v1/", "a.zip")
            .await
            .expect("lookup")
            .expect("node exists");
        assert_eq!(stored.id, node_id("node", "/v1/", "a.zip"));
        assert_eq!(stored.size, Some(10));

        let second = BinaryItem::file("a.zip", Some(20), "2021-02-01T00:00:00.000Z", "https://y/a")
            .with_ignore_statuses(&[404]);
        save(&db, "node", "/v1/", &second).await.expect("update");

        let updated = find(&db, "node", "/v1/", "a.zip")
            .await
            .expect("lookup")
            .expect("node exists");
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.size, Some(20));
        assert_eq!(updated.source_url, "https://y/a");
        assert_eq!(updated.ignore_statuses(), vec![404]);
        assert_eq!(updated.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn missing_flag_survives_upsert() {
        let db = setup_db().await;
        let item = BinaryItem::file("b.node", None, "", "https://x/b").with_ignore_statuses(&[404]);
        save(&db, "sqlite3", "/v5.0.0/", &item).await.expect("insert");

        let updated = mark_missing(&db, "sqlite3", "/v5.0.0/", "b.node", true)
            .await
            .expect("mark");
        assert_eq!(updated, 1);

        save(&db, "sqlite3", "/v5.0.0/", &item).await.expect("re-save");
        let node = find(&db, "sqlite3", "/v5.0.0/", "b.node")
            .await
            .expect("lookup")
            .expect("node exists");
        assert!(node.missing);

        let none = mark_missing(&db, "sqlite3", "/v5.0.0/", "absent", true)
            .await
            .expect("mark");
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn save_with_retry_rejects_bad_address_without_retrying() {
        let db = setup_db().await;
        let err = save_with_retry(
            &db,
            "node",
            "no-slash",
            &BinaryItem::dir("v1", ""),
            &RetryConfig::default(),
        )
        .await
        .expect_err("invalid parent");
        assert!(matches!(err, RepositoryError::InvalidInput { .. }));
    }
}
