//! GitHub releases as a two-level tree: `/{tag}/{asset}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::category::CategoryConfig;
use crate::http::{HttpRequest, HttpResponse};

use super::client::SourceClient;
use super::date::normalize_or_empty;
use super::error::snippet;
use super::{
    BinaryAdapter, BinaryItem, FetchResult, HaltReason, ROOT_DIR, ResumeHint, RunCache, dir_path,
    split_dir,
};

/// Releases requested per page (the API maximum).
pub const PER_PAGE: usize = 100;

/// Default page limit when the category does not set one.
pub const DEFAULT_MAX_PAGES: u32 = 10;

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    published_at: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
    tarball_url: Option<String>,
    zipball_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    size: Option<i64>,
    updated_at: Option<String>,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Recognize a GitHub rate-limit answer.
///
/// GitHub reports exhaustion either with a JSON `message` mentioning the rate
/// limit (usually on a 403) or with a 403/429 and `x-ratelimit-remaining: 0`.
pub fn rate_limit_reason(response: &HttpResponse) -> Option<HaltReason> {
    let reset_at = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0));

    let message_says_so = serde_json::from_slice::<ApiMessage>(&response.body)
        .map(|m| m.message.to_ascii_lowercase().contains("rate limit"))
        .unwrap_or(false);
    let headers_say_so = matches!(response.status, 403 | 429)
        && response.header("x-ratelimit-remaining").map(str::trim) == Some("0");

    (message_says_so || headers_say_so).then_some(HaltReason::RateLimited { reset_at })
}

/// Lists one directory per release tag, assets inside.
pub struct GitHubReleasesAdapter {
    client: SourceClient,
    api_url: String,
    repo: String,
    token: Option<String>,
    max_pages: u32,
    include_source_archives: bool,
}

impl GitHubReleasesAdapter {
    pub fn new(client: SourceClient, config: &CategoryConfig, token: Option<String>) -> Self {
        let api_url = if config.base_url.is_empty() {
            DEFAULT_API_URL.to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client,
            api_url,
            repo: config.repo.clone().unwrap_or_default(),
            token,
            max_pages: config.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1),
            include_source_archives: config.include_source_archives,
        }
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/repos/{}/releases?per_page={PER_PAGE}&page={page}",
            self.api_url, self.repo
        )
    }

    fn request(&self, url: String) -> HttpRequest {
        let request = HttpRequest::get(url)
            .with_header("Accept", "application/vnd.github+json")
            .with_header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.with_header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn record_release(&self, cache: &mut RunCache, release: &Release) -> String {
        let date = normalize_or_empty(
            release
                .published_at
                .as_deref()
                .or(release.created_at.as_deref())
                .unwrap_or_default(),
        );
        // Slash-separated tags (`release/1.0`) become nested directories.
        let tag_path = dir_path(&release.tag_name);
        let Some((parent, leaf)) = split_dir(&tag_path) else {
            tracing::warn!(
                category = cache.category(),
                tag = %release.tag_name,
                "Skipping release with an empty tag"
            );
            return date;
        };
        let leaf = leaf.trim_end_matches('/').to_string();
        cache.insert(&parent, BinaryItem::dir(leaf.as_str(), date.as_str()));
        let dir_path = tag_path;

        for asset in &release.assets {
            let asset_date = asset
                .updated_at
                .as_deref()
                .map(normalize_or_empty)
                .unwrap_or_else(|| date.clone());
            cache.insert(
                &dir_path,
                BinaryItem::file(
                    asset.name.as_str(),
                    asset.size,
                    asset_date,
                    asset.browser_download_url.as_str(),
                ),
            );
        }

        if self.include_source_archives {
            let archives = [
                (&release.tarball_url, "tar.gz"),
                (&release.zipball_url, "zip"),
            ];
            for (url, ext) in archives {
                if let Some(url) = url {
                    cache.insert(
                        &dir_path,
                        BinaryItem::file(
                            format!("{leaf}.{ext}"),
                            None,
                            date.as_str(),
                            url.as_str(),
                        ),
                    );
                }
            }
        }

        date
    }

    /// Fetch the release feed into the cache. Returns `false` when the feed
    /// is unavailable or the run was halted.
    ///
    /// When `max_pages` runs out on a full page the root listing is marked
    /// partial with the next page number as its cursor.
    async fn prime(&self, cache: &mut RunCache, hint: Option<&ResumeHint>) -> bool {
        let mut next_page = None;
        for page in 1..=self.max_pages {
            let url = self.page_url(page);
            let response = match self.client.send(self.request(url.clone())).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(category = cache.category(), page, error = %e, "Release feed unavailable");
                    return false;
                }
            };

            if let Some(reason) = rate_limit_reason(&response) {
                tracing::warn!(
                    category = cache.category(),
                    page,
                    status = response.status,
                    reason = %reason,
                    "GitHub rate limit reached, halting run"
                );
                cache.halt(reason);
                return false;
            }

            if !response.is_success() {
                tracing::warn!(
                    category = cache.category(),
                    page,
                    status = response.status,
                    body = %snippet(&response.text()),
                    "Release feed returned an error"
                );
                return false;
            }

            let releases: Vec<Release> = match SourceClient::decode_json(&url, &response) {
                Ok(releases) => releases,
                Err(e) => {
                    tracing::warn!(category = cache.category(), page, error = %e, "Release feed malformed");
                    return false;
                }
            };

            let count = releases.len();
            let mut all_older = count > 0;
            for release in releases.iter().filter(|r| !r.draft) {
                let date = self.record_release(cache, release);
                if !hint.is_some_and(|h| h.is_older(&date)) {
                    all_older = false;
                }
            }

            tracing::debug!(category = cache.category(), page, count, "Fetched release page");

            if count < PER_PAGE {
                break;
            }
            if hint.is_some() && all_older {
                tracing::debug!(
                    category = cache.category(),
                    page,
                    "Release page older than resume hint, stopping"
                );
                break;
            }
            if page == self.max_pages {
                next_page = Some(page + 1);
            }
        }

        if let Some(next) = next_page {
            tracing::warn!(
                category = cache.category(),
                max_pages = self.max_pages,
                next_page = next,
                "Release feed cut short by page cap"
            );
            cache.set_cursor(ROOT_DIR, format!("page={next}"));
        }
        cache.mark_primed();
        true
    }
}

#[async_trait]
impl BinaryAdapter for GitHubReleasesAdapter {
    fn kind(&self) -> &'static str {
        "github"
    }

    async fn list(
        &self,
        cache: &mut RunCache,
        dir: &str,
        hint: Option<&ResumeHint>,
    ) -> Option<FetchResult> {
        if !cache.is_primed() && !self.prime(cache, hint).await {
            return None;
        }
        let items = cache.listing(dir).map(<[BinaryItem]>::to_vec).unwrap_or_default();
        Some(FetchResult {
            items,
            cursor: cache.cursor(dir).map(str::to_string),
        })
    }
}
