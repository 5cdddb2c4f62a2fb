//! Playwright browser builds, synthesized from `browsers.json`.
//!
//! The manifest only names a revision per browser; the download layout is a
//! fixed table of archive names per host platform. The whole tree is built on
//! the first `list` of a run and served from the [`RunCache`] afterwards.

use async_trait::async_trait;
use serde::Deserialize;

use crate::category::CategoryConfig;
use crate::http::HttpRequest;

use super::client::SourceClient;
use super::date::normalize_or_empty;
use super::{BinaryAdapter, BinaryItem, FetchResult, ResumeHint, RunCache};

/// A build that was never produced for one platform answers 403 or 404.
pub const IGNORED_STATUSES: [u16; 2] = [403, 404];

/// Archive names per browser, across every supported host platform.
const DOWNLOAD_FILES: &[(&str, &[&str])] = &[
    (
        "chromium",
        &[
            "chromium-linux.zip",
            "chromium-linux-arm64.zip",
            "chromium-mac.zip",
            "chromium-mac-arm64.zip",
            "chromium-win64.zip",
        ],
    ),
    (
        "chromium-headless-shell",
        &[
            "chromium-headless-shell-linux.zip",
            "chromium-headless-shell-linux-arm64.zip",
            "chromium-headless-shell-mac.zip",
            "chromium-headless-shell-mac-arm64.zip",
            "chromium-headless-shell-win64.zip",
        ],
    ),
    (
        "firefox",
        &[
            "firefox-ubuntu-20.04.zip",
            "firefox-ubuntu-22.04.zip",
            "firefox-ubuntu-20.04-arm64.zip",
            "firefox-ubuntu-22.04-arm64.zip",
            "firefox-debian-11.zip",
            "firefox-mac-13.zip",
            "firefox-mac-13-arm64.zip",
            "firefox-win64.zip",
        ],
    ),
    (
        "webkit",
        &[
            "webkit-ubuntu-20.04.zip",
            "webkit-ubuntu-22.04.zip",
            "webkit-ubuntu-20.04-arm64.zip",
            "webkit-ubuntu-22.04-arm64.zip",
            "webkit-debian-11.zip",
            "webkit-mac-13.zip",
            "webkit-mac-13-arm64.zip",
            "webkit-win64.zip",
        ],
    ),
    (
        "ffmpeg",
        &[
            "ffmpeg-linux.zip",
            "ffmpeg-linux-arm64.zip",
            "ffmpeg-mac.zip",
            "ffmpeg-mac-arm64.zip",
            "ffmpeg-win64.zip",
        ],
    ),
];

#[derive(Debug, Deserialize)]
struct BrowsersManifest {
    browsers: Vec<BrowserEntry>,
}

#[derive(Debug, Deserialize)]
struct BrowserEntry {
    name: String,
    revision: String,
}

/// Archive names known for `browser`, or `None` if it is not in the table.
pub fn download_files(browser: &str) -> Option<&'static [&'static str]> {
    DOWNLOAD_FILES
        .iter()
        .find(|(name, _)| *name == browser)
        .map(|(_, files)| *files)
}

pub struct PlaywrightAdapter {
    client: SourceClient,
    manifest_url: String,
    download_host: String,
}

impl PlaywrightAdapter {
    pub fn new(client: SourceClient, config: &CategoryConfig) -> Self {
        let mut download_host = config.base_url.clone();
        if !download_host.ends_with('/') {
            download_host.push('/');
        }
        Self {
            client,
            manifest_url: config.manifest_url.clone().unwrap_or_default(),
            download_host,
        }
    }

    async fn prime(&self, cache: &mut RunCache) -> bool {
        let url = &self.manifest_url;
        let response = match self.client.send_ok(HttpRequest::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(category = cache.category(), url, error = %e, "Playwright manifest unavailable");
                return false;
            }
        };
        let manifest: BrowsersManifest = match SourceClient::decode_json(url, &response) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(category = cache.category(), url, error = %e, "Playwright manifest malformed");
                return false;
            }
        };
        let date = response
            .header("last-modified")
            .map(normalize_or_empty)
            .unwrap_or_default();

        for browser in &manifest.browsers {
            let Some(files) = download_files(&browser.name) else {
                tracing::debug!(category = cache.category(), browser = %browser.name, "No download table for browser");
                continue;
            };
            let dir = format!("/builds/{}/{}/", browser.name, browser.revision);
            for file in files {
                let path = format!("builds/{}/{}/{file}", browser.name, browser.revision);
                cache.insert(
                    &dir,
                    BinaryItem::file(*file, None, date.clone(), format!("{}{path}", self.download_host))
                        .with_ignore_statuses(&IGNORED_STATUSES),
                );
            }
        }

        cache.mark_primed();
        true
    }
}

#[async_trait]
impl BinaryAdapter for PlaywrightAdapter {
    fn kind(&self) -> &'static str {
        "playwright"
    }

    async fn list(
        &self,
        cache: &mut RunCache,
        dir: &str,
        _hint: Option<&ResumeHint>,
    ) -> Option<FetchResult> {
        if !cache.is_primed() && !self.prime(cache).await {
            return None;
        }
        let items = cache.listing(dir).map(<[BinaryItem]>::to_vec).unwrap_or_default();
        Some(FetchResult::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::AdapterKind;
    use crate::http::{HttpResponse, MockTransport, mock_response};
    use std::sync::Arc;

    const MANIFEST_URL: &str = "https://raw.test/browsers.json";
    const MANIFEST: &str = r#"{
        "comment": "Do not edit this file, use utils/roll_browser.js",
        "browsers": [
            {"name": "chromium", "revision": "1097", "installByDefault": true, "browserVersion": "120.0.6099.28"},
            {"name": "firefox", "revision": "1430", "installByDefault": true},
            {"name": "android", "revision": "1000", "installByDefault": false}
        ]
    }"#;

    fn adapter(mock: &MockTransport) -> PlaywrightAdapter {
        let config = CategoryConfig {
            manifest_url: Some(MANIFEST_URL.to_string()),
            ..CategoryConfig::new(AdapterKind::Playwright, "https://cdn.test")
        };
        PlaywrightAdapter::new(SourceClient::new(Arc::new(mock.clone())), &config)
    }

    #[tokio::test]
    async fn builds_tree_from_one_manifest_call() {
        let mock = MockTransport::new();
        mock.always(
            MANIFEST_URL,
            HttpResponse {
                headers: vec![(
                    "Last-Modified".to_string(),
                    "Tue, 21 Nov 2023 10:00:00 GMT".to_string(),
                )],
                ..mock_response(200, MANIFEST)
            },
        );
        let adapter = adapter(&mock);
        let mut cache = adapter.reset("playwright");

        let root = adapter.list(&mut cache, "/", None).await.expect("root");
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].name, "builds/");

        let builds = adapter.list(&mut cache, "/builds/", None).await.expect("builds");
        let names: Vec<_> = builds.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["chromium/", "firefox/"]);

        let files = adapter
            .list(&mut cache, "/builds/chromium/1097/", None)
            .await
            .expect("files");
        assert_eq!(files.items.len(), 5);
        let linux = &files.items[0];
        assert_eq!(linux.name, "chromium-linux.zip");
        assert_eq!(
            linux.source_url,
            "https://cdn.test/builds/chromium/1097/chromium-linux.zip"
        );
        assert_eq!(linux.ignore_download_statuses, vec![403, 404]);
        assert_eq!(linux.date, "2023-11-21T10:00:00.000Z");

        assert_eq!(mock.request_count(MANIFEST_URL), 1);
    }

    #[tokio::test]
    async fn unknown_directory_is_empty() {
        let mock = MockTransport::new();
        mock.always(MANIFEST_URL, mock_response(200, MANIFEST));
        let adapter = adapter(&mock);
        let mut cache = adapter.reset("playwright");

        let listing = adapter
            .list(&mut cache, "/builds/android/", None)
            .await
            .expect("listing");
        assert!(listing.items.is_empty());
        assert_eq!(
            adapter.list(&mut cache, "/builds/firefox/1430/", None).await.map(|r| r.items[0].date.clone()),
            Some(String::new())
        );
    }

    #[tokio::test]
    async fn manifest_failure_is_unavailable() {
        let mock = MockTransport::new();
        mock.always(MANIFEST_URL, mock_response(500, "oops"));
        let adapter = adapter(&mock);
        let mut cache = adapter.reset("playwright");
        assert!(adapter.list(&mut cache, "/", None).await.is_none());
        assert!(!cache.is_primed());
    }

    #[test]
    fn download_table_lookup() {
        assert_eq!(download_files("webkit").map(<[_]>::len), Some(8));
        assert!(download_files("android").is_none());
    }
}
