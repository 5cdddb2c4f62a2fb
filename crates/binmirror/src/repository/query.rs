use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entity::binary::{Column, Entity as Binary, Model};

use super::errors::{RepositoryError, Result};

// ─── Query Operations ────────────────────────────────────────────────────────

/// Children of directory `parent`, sorted by name.
pub async fn list(db: &DatabaseConnection, category: &str, parent: &str) -> Result<Vec<Model>> {
    Binary::find()
        .filter(Column::Category.eq(category))
        .filter(Column::Parent.eq(parent))
        .order_by_asc(Column::Name)
        .all(db)
        .await
        .map_err(RepositoryError::from)
}

/// Count all nodes in a category.
pub async fn count_by_category(db: &DatabaseConnection, category: &str) -> Result<u64> {
    Binary::find()
        .filter(Column::Category.eq(category))
        .count(db)
        .await
        .map_err(RepositoryError::from)
}

/// Count files of a category recorded as expected-missing.
pub async fn count_missing(db: &DatabaseConnection, category: &str) -> Result<u64> {
    Binary::find()
        .filter(Column::Category.eq(category))
        .filter(Column::Missing.eq(true))
        .count(db)
        .await
        .map_err(RepositoryError::from)
}

/// Every category that has at least one node, sorted.
pub async fn list_categories(db: &DatabaseConnection) -> Result<Vec<String>> {
    Binary::find()
        .select_only()
        .column(Column::Category)
        .distinct()
        .order_by_asc(Column::Category)
        .into_tuple::<String>()
        .all(db)
        .await
        .map_err(RepositoryError::from)
}
