//! Binary entity - one node (file or directory) of a mirrored category tree.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Namespace for deterministic node IDs.
const NODE_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_4c7e_2b0a_4f3e_9a51_8c2d_7e40_b913);

/// A mirrored node, keyed by `(category, parent, name)`.
///
/// Directory names carry a trailing `/`; `parent` is always a `/`-delimited
/// path that starts and ends with `/` (the root is `/`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "binaries")]
pub struct Model {
    /// Deterministic UUIDv5 of the node's identity.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    // ─── Identity ────────────────────────────────────────────────────────────
    pub category: String,
    pub parent: String,
    pub name: String,

    // ─── Listing Metadata ────────────────────────────────────────────────────
    #[sea_orm(default_value = false)]
    pub is_dir: bool,
    /// Byte size; `None` when upstream did not report one.
    pub size: Option<i64>,
    /// Normalized RFC 3339 timestamp (millisecond precision, `Z` suffix).
    pub date: String,
    /// Absolute upstream URL the bytes are fetched from.
    #[sea_orm(column_type = "Text")]
    pub source_url: String,
    /// HTTP statuses that mean "this file is expected not to exist".
    #[sea_orm(column_type = "Json")]
    pub ignore_download_statuses: serde_json::Value,

    // ─── Tracking ────────────────────────────────────────────────────────────
    /// Set when the last download attempt hit an ignored status.
    #[sea_orm(default_value = false)]
    pub missing: bool,
    pub synced_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Full path of the node inside its category, e.g. `/2.0/chromedriver_linux64.zip`.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.parent, self.name)
    }

    /// Decoded ignore-status list; malformed JSON yields an empty list.
    pub fn ignore_statuses(&self) -> Vec<u16> {
        serde_json::from_value(self.ignore_download_statuses.clone()).unwrap_or_default()
    }
}

/// Deterministic node ID for a `(category, parent, name)` triple.
pub fn node_id(category: &str, parent: &str, name: &str) -> Uuid {
    Uuid::new_v5(
        &NODE_NAMESPACE,
        format!("{category}\u{0}{parent}{name}").as_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_file(parent: &str, name: &str) -> Model {
        let now = Utc::now().fixed_offset();
        Model {
            id: node_id("node", parent, name),
            category: "node".to_string(),
            parent: parent.to_string(),
            name: name.to_string(),
            is_dir: false,
            size: Some(42),
            date: "2021-12-17T20:10:00.000Z".to_string(),
            source_url: format!("https://nodejs.org/dist{parent}{name}"),
            ignore_download_statuses: serde_json::json!([404]),
            missing: false,
            synced_at: now,
            created_at: now,
        }
    }

    #[test]
    fn full_path_joins_parent_and_name() {
        let model = make_file("/v16.13.1/", "SHASUMS256.txt");
        assert_eq!(model.full_path(), "/v16.13.1/SHASUMS256.txt");
    }

    #[test]
    fn ignore_statuses_decodes_json() {
        let mut model = make_file("/", "index.json");
        assert_eq!(model.ignore_statuses(), vec![404]);

        model.ignore_download_statuses = serde_json::json!({"bogus": true});
        assert!(model.ignore_statuses().is_empty());
    }

    #[test]
    fn node_id_is_stable_and_distinguishes_categories() {
        let a = node_id("node", "/", "v1/");
        assert_eq!(a, node_id("node", "/", "v1/"));
        assert_ne!(a, node_id("python", "/", "v1/"));
        assert_ne!(node_id("node", "/a/", "b"), node_id("node", "/", "a/b"));
    }
}
