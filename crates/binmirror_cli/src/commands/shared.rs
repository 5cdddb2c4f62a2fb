use std::path::Path;
use std::sync::Arc;

use binmirror::http::HttpTransport;
use binmirror::http::reqwest_transport::ReqwestTransport;
use binmirror::retry::RetryConfig;
use binmirror::source::SourceClient;
use binmirror::{AdapterRegistry, BlobStore, DbTaskEngine, FsBlobStore, connect_and_migrate};
use clap::ValueEnum;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tabled::Tabled;

use crate::config::Config;

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

pub(crate) fn print_rows<T: Tabled + Serialize>(
    rows: Vec<T>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Everything a sync needs, opened once per command.
pub(crate) struct Runtime {
    pub(crate) db: Arc<DatabaseConnection>,
    pub(crate) registry: Arc<AdapterRegistry>,
    pub(crate) store: Arc<dyn BlobStore>,
    pub(crate) downloader: SourceClient,
    pub(crate) engine: Arc<DbTaskEngine>,
}

impl Runtime {
    pub(crate) async fn open(
        config: &Config,
        database_url: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_timeout(config.request_timeout())?);
        let registry = AdapterRegistry::new(
            config.categories(),
            Arc::clone(&transport),
            &config.registry_options(),
        )?;

        let blob_root = config
            .blob_root()
            .ok_or("Could not determine the blob storage directory; set [storage] root")?;
        warn_if_relative(&blob_root);

        let db = Arc::new(connect_and_migrate(database_url).await?);
        tracing::debug!(categories = registry.len(), blob_root = %blob_root.display(), "Runtime ready");

        Ok(Self {
            engine: Arc::new(DbTaskEngine::new(Arc::clone(&db))),
            db,
            registry: Arc::new(registry),
            store: Arc::new(FsBlobStore::new(blob_root)),
            downloader: SourceClient::new(transport).with_retry(RetryConfig::default()),
        })
    }

    /// Resolve category arguments against the registry.
    pub(crate) fn select(
        &self,
        names: &[String],
        all: bool,
    ) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        select_categories(&self.registry, names, all)
    }
}

pub(crate) fn select_categories(
    registry: &AdapterRegistry,
    names: &[String],
    all: bool,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if all {
        return Ok(registry.categories().map(|e| e.name.clone()).collect());
    }
    if names.is_empty() {
        return Err("Specify one or more categories, or --all".into());
    }

    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| registry.get(name).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(format!(
            "Unknown categories: {}. Run `binmirror categories` to list them.",
            unknown.join(", ")
        )
        .into());
    }

    let mut selected = names.to_vec();
    selected.sort();
    selected.dedup();
    Ok(selected)
}

fn warn_if_relative(path: &Path) {
    if path.is_relative() {
        tracing::warn!(
            "Blob root '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            path.display()
        );
    }
}
