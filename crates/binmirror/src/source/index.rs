//! Plain HTTP directory indexes (nginx/Apache autoindex, python.org, nodejs.org).

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Duration;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::category::CategoryConfig;

use super::client::SourceClient;
use super::date::{normalize_date, normalize_or_empty, parse_size};
use super::error::snippet;
use super::{BinaryAdapter, BinaryItem, FetchResult, ROOT_DIR, ResumeHint, RunCache};

/// `<a href="x">x</a>   17-Dec-2021 20:10   27M` lines inside `<pre>`.
static PRE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s+href="([^"]+)"[^>]*>[^<]*</a>\s+(\S+\s+\d{1,2}:\d{2}(?::\d{2})?)\s+(\S+)"#)
        .expect("index line regex should compile")
});

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tr").expect("selector should parse"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("selector should parse"));
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("selector should parse"));

/// Upstream indexes often print local times without a zone; directories
/// within this window of the resume hint are re-listed.
const RESUME_MARGIN_HOURS: i64 = 24;

/// One raw row of an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub href: String,
    pub date: String,
    pub size: String,
}

/// Links that never denote a child entry: parent, sort toggles, absolute.
fn is_navigation_link(href: &str) -> bool {
    href.is_empty()
        || href.starts_with('?')
        || href.starts_with('#')
        || href.starts_with('/')
        || href.starts_with("../")
        || href == ".."
        || href.starts_with("./")
        || href.contains("://")
        || href.starts_with("mailto:")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Parse Apache fancy-index tables.
fn parse_table(html: &str) -> Vec<IndexEntry> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for row in document.select(&ROW_SELECTOR) {
        let Some(href) = row
            .select(&LINK_SELECTOR)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(cell_text).collect();
        let date_idx = cells.iter().position(|c| normalize_date(c).is_some());
        let (date, size) = match date_idx {
            Some(i) => (
                cells[i].clone(),
                cells.get(i + 1).cloned().unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        entries.push(IndexEntry {
            href: href.to_string(),
            date,
            size,
        });
    }

    entries
}

/// Parse `<pre>` autoindex listings line by line.
fn parse_pre(html: &str) -> Vec<IndexEntry> {
    PRE_LINE_RE
        .captures_iter(html)
        .map(|caps| IndexEntry {
            href: caps[1].to_string(),
            date: caps[2].to_string(),
            size: caps[3].to_string(),
        })
        .collect()
}

/// Parse an index page into raw entries, navigation links removed.
pub fn parse_index(html: &str) -> Vec<IndexEntry> {
    let mut entries = parse_table(html);
    if entries.iter().all(|e| is_navigation_link(&e.href)) {
        entries = parse_pre(html);
    }
    entries.retain(|e| !is_navigation_link(&e.href));
    entries
}

/// Lists `dir` by scraping `base_url + dir`.
pub struct IndexAdapter {
    client: SourceClient,
    base_url: String,
}

impl IndexAdapter {
    pub fn new(client: SourceClient, config: &CategoryConfig) -> Self {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { client, base_url }
    }

    fn dir_url(&self, dir: &str) -> String {
        format!("{}{}", self.base_url, dir.trim_start_matches('/'))
    }

    fn to_item(&self, dir_url: &str, entry: &IndexEntry) -> Option<BinaryItem> {
        let is_dir = entry.href.ends_with('/');
        let name = entry.href.trim_end_matches('/').rsplit('/').next()?;
        if name.is_empty() {
            return None;
        }
        let date = normalize_or_empty(&entry.date);
        Some(if is_dir {
            BinaryItem::dir(name, date)
        } else {
            BinaryItem::file(
                name,
                parse_size(&entry.size),
                date,
                format!("{dir_url}{}", entry.href),
            )
        })
    }
}

#[async_trait]
impl BinaryAdapter for IndexAdapter {
    fn kind(&self) -> &'static str {
        "index"
    }

    async fn list(
        &self,
        cache: &mut RunCache,
        dir: &str,
        hint: Option<&ResumeHint>,
    ) -> Option<FetchResult> {
        let url = self.dir_url(dir);
        let html = match self.client.get_text(&url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(category = cache.category(), dir, error = %e, "Index page unavailable");
                return None;
            }
        };

        let entries = parse_index(&html);
        if entries.is_empty() && !html.trim().is_empty() {
            tracing::warn!(
                category = cache.category(),
                dir,
                bytes = html.len(),
                snippet = %snippet(&html),
                "Index page has no recognizable entries"
            );
            return Some(FetchResult::default());
        }

        let cutoff = hint
            .filter(|_| dir == ROOT_DIR)
            .map(|h| ResumeHint::new(h.last_synced_at - Duration::hours(RESUME_MARGIN_HOURS)));

        let mut items: Vec<BinaryItem> = entries
            .iter()
            .filter_map(|entry| self.to_item(&url, entry))
            .filter(|item| !(item.is_dir && cutoff.is_some_and(|c| c.is_older(&item.date))))
            .collect();
        items.dedup_by(|a, b| a.name == b.name);

        Some(FetchResult::new(items))
    }
}
