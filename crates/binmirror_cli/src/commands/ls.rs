use binmirror::entity::binary::Model as BinaryNode;
use binmirror::repository;
use binmirror::source::dir_path;
use indicatif::HumanBytes;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::{OutputFormat, print_rows};

/// One row of `binmirror ls`.
#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct NodeRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Size")]
    #[serde(skip)]
    pub size_display: String,
    #[tabled(skip)]
    pub size: Option<i64>,
    #[tabled(rename = "Modified")]
    pub date: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(skip)]
    pub source_url: String,
}

impl From<BinaryNode> for NodeRow {
    fn from(node: BinaryNode) -> Self {
        let size_display = match (node.is_dir, node.size) {
            (true, _) => "-".to_string(),
            (false, Some(bytes)) => HumanBytes(bytes.max(0) as u64).to_string(),
            (false, None) => "?".to_string(),
        };
        let status = if node.missing {
            "missing upstream"
        } else {
            ""
        };
        Self {
            name: node.name,
            size_display,
            size: node.size,
            date: node.date,
            status: status.to_string(),
            source_url: node.source_url,
        }
    }
}

pub(crate) async fn handle_ls(
    category: &str,
    path: &str,
    output: OutputFormat,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = binmirror::connect(database_url).await?;
    let parent = dir_path(path);

    let nodes = repository::list(&db, category, &parent).await?;
    if nodes.is_empty() && matches!(output, OutputFormat::Table) {
        println!("No entries under {category}:{parent}");
        return Ok(());
    }

    print_rows(nodes.into_iter().map(NodeRow::from).collect(), output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use binmirror::entity::binary::node_id;
    use chrono::Utc;

    fn node(name: &str, is_dir: bool, size: Option<i64>, missing: bool) -> BinaryNode {
        let now = Utc::now().fixed_offset();
        BinaryNode {
            id: node_id("node", "/", name),
            category: "node".to_string(),
            parent: "/".to_string(),
            name: name.to_string(),
            is_dir,
            size,
            date: "2024-01-01T00:00:00.000Z".to_string(),
            source_url: String::new(),
            ignore_download_statuses: serde_json::json!([]),
            missing,
            synced_at: now,
            created_at: now,
        }
    }

    #[test]
    fn test_row_formatting() {
        let dir = NodeRow::from(node("v1/", true, None, false));
        assert_eq!(dir.size_display, "-");

        let unknown = NodeRow::from(node("a.tgz", false, None, false));
        assert_eq!(unknown.size_display, "?");

        let missing = NodeRow::from(node("b.tgz", false, Some(2048), true));
        assert_eq!(missing.size_display, "2.00 KiB");
        assert_eq!(missing.status, "missing upstream");
        assert_eq!(missing.size, Some(2048));
    }
}
