use std::collections::BTreeSet;
use std::sync::Arc;

use binmirror::entity::sync_task::Model as SyncTask;
use binmirror::repository;
use binmirror::task::resume_hint;
use binmirror::DbTaskEngine;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::{OutputFormat, print_rows};

/// Maximum characters of a task note shown in the table.
const NOTE_WIDTH: usize = 60;

/// One row of `binmirror status`.
#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct StatusRow {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Attempts")]
    pub attempts: i32,
    #[tabled(rename = "Nodes")]
    pub nodes: u64,
    #[tabled(rename = "Missing")]
    pub missing: u64,
    #[tabled(rename = "Synced Through")]
    pub synced_through: String,
    #[tabled(rename = "Note")]
    pub note: String,
}

impl StatusRow {
    fn new(category: &str, task: Option<&SyncTask>, nodes: u64, missing: u64) -> Self {
        let synced_through = task
            .and_then(|t| resume_hint(t).ok().flatten())
            .map(|hint| hint.last_synced_at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        Self {
            category: category.to_string(),
            state: task.map_or_else(|| "-".to_string(), |t| t.state.to_string()),
            attempts: task.map_or(0, |t| t.attempts),
            nodes,
            missing,
            synced_through,
            note: task
                .and_then(|t| t.note.as_deref())
                .map(truncate_note)
                .unwrap_or_default(),
        }
    }
}

fn truncate_note(note: &str) -> String {
    if note.chars().count() <= NOTE_WIDTH {
        return note.to_string();
    }
    let cut: String = note.chars().take(NOTE_WIDTH - 1).collect();
    format!("{cut}…")
}

pub(crate) async fn handle_status(
    output: OutputFormat,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(binmirror::connect(database_url).await?);
    let engine = DbTaskEngine::new(Arc::clone(&db));

    let tasks = engine.list().await?;
    let mut categories: BTreeSet<String> = repository::list_categories(db.as_ref())
        .await?
        .into_iter()
        .collect();
    categories.extend(tasks.iter().map(|t| t.category.clone()));

    let mut rows = Vec::with_capacity(categories.len());
    for category in &categories {
        let task = tasks.iter().find(|t| &t.category == category);
        let nodes = repository::count_by_category(db.as_ref(), category).await?;
        let missing = repository::count_missing(db.as_ref(), category).await?;
        rows.push(StatusRow::new(category, task, nodes, missing));
    }

    if rows.is_empty() && matches!(output, OutputFormat::Table) {
        println!("Nothing mirrored yet. Run `binmirror sync <category>` to start.");
        return Ok(());
    }
    print_rows(rows, output)
}
