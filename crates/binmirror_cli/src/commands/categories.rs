use std::collections::BTreeMap;

use binmirror::{AdapterKind, CategoryConfig};
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::{OutputFormat, print_rows};
use crate::config::Config;

/// One row of `binmirror categories`.
#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct CategoryRow {
    #[tabled(rename = "Category")]
    pub name: String,
    #[tabled(rename = "Adapter")]
    pub adapter: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Description")]
    pub description: String,
}

impl CategoryRow {
    fn new(name: &str, config: &CategoryConfig) -> Self {
        let source = match config.adapter {
            AdapterKind::GitHub => config.repo.clone().unwrap_or_default(),
            AdapterKind::NodePreGyp => config
                .package
                .as_ref()
                .map(|p| format!("npm:{p}"))
                .unwrap_or_default(),
            AdapterKind::Playwright => config
                .manifest_url
                .clone()
                .unwrap_or_else(|| config.base_url.clone()),
            AdapterKind::Bucket | AdapterKind::Index => config.base_url.clone(),
        };
        Self {
            name: name.to_string(),
            adapter: config.adapter.to_string(),
            source,
            description: config.description.clone(),
        }
    }
}

pub(crate) fn category_rows(categories: &BTreeMap<String, CategoryConfig>) -> Vec<CategoryRow> {
    categories
        .iter()
        .map(|(name, config)| CategoryRow::new(name, config))
        .collect()
}

pub(crate) fn handle_categories(
    config: &Config,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let categories = config.categories();
    for (name, category) in &categories {
        if let Err(e) = category.validate(name) {
            tracing::warn!(category = %name, error = %e, "Invalid category configuration");
        }
    }
    print_rows(category_rows(&categories), output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_column_per_adapter() {
        let mut categories = BTreeMap::new();
        categories.insert(
            "electron".to_string(),
            CategoryConfig {
                repo: Some("electron/electron".to_string()),
                ..CategoryConfig::new(AdapterKind::GitHub, "https://api.github.com")
            },
        );
        categories.insert(
            "sqlite3".to_string(),
            CategoryConfig {
                package: Some("sqlite3".to_string()),
                ..CategoryConfig::new(AdapterKind::NodePreGyp, "")
            },
        );
        categories.insert(
            "node".to_string(),
            CategoryConfig::new(AdapterKind::Index, "https://nodejs.org/dist/"),
        );

        let rows = category_rows(&categories);
        let sources: Vec<_> = rows.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["electron/electron", "https://nodejs.org/dist/", "npm:sqlite3"]
        );
        assert_eq!(rows[0].adapter, "github");
    }
}
