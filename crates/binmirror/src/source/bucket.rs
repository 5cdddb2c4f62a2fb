//! Object-storage bucket listings (S3, GCS XML API, Azure blob containers).

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;

use crate::category::{BucketStyle, CategoryConfig};

use super::client::SourceClient;
use super::date::normalize_or_empty;
use super::error::SourceError;
use super::{BinaryAdapter, BinaryItem, FetchResult, ResumeHint, RunCache};

/// Default page cap per directory listing.
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// One parsed page of a bucket listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BucketPage {
    pub objects: Vec<BucketObject>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BucketObject {
    pub key: String,
    pub last_modified: String,
    pub size: Option<i64>,
}

/// How to request the page after the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Continuation {
    Marker(String),
    Token(String),
}

impl BucketPage {
    fn continuation(&self) -> Option<Continuation> {
        if !self.is_truncated {
            return None;
        }
        if let Some(token) = &self.next_continuation_token {
            return Some(Continuation::Token(token.clone()));
        }
        if let Some(marker) = &self.next_marker {
            return Some(Continuation::Marker(marker.clone()));
        }
        // S3 v1 omits NextMarker without a delimiter; the last key is the marker.
        self.objects
            .last()
            .map(|o| Continuation::Marker(o.key.clone()))
    }
}

/// Parse an S3/GCS `ListBucketResult` or an Azure `EnumerationResults` page.
pub fn parse_bucket_page(xml: &str) -> Result<BucketPage, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = BucketPage::default();
    let mut stack: Vec<String> = Vec::new();
    let mut object: Option<BucketObject> = None;
    let mut saw_truncated = false;

    loop {
        match reader.read_event()? {
            Event::Start(event) => {
                let name = String::from_utf8_lossy(event.local_name().as_ref()).into_owned();
                if name == "Contents" || name == "Blob" {
                    object = Some(BucketObject::default());
                }
                stack.push(name);
            }
            Event::End(_) => {
                if let Some(name) = stack.pop()
                    && (name == "Contents" || name == "Blob")
                    && let Some(done) = object.take()
                {
                    page.objects.push(done);
                }
            }
            Event::Text(text) => {
                let value = text.unescape()?.into_owned();
                let current = stack.last().map(String::as_str).unwrap_or_default();
                let parent = stack
                    .len()
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .map(String::as_str)
                    .unwrap_or_default();

                match (parent, current) {
                    ("Contents", "Key") | ("Blob", "Name") => {
                        if let Some(o) = object.as_mut() {
                            o.key = value;
                        }
                    }
                    ("Contents", "LastModified") | ("Properties", "Last-Modified") => {
                        if let Some(o) = object.as_mut() {
                            o.last_modified = value;
                        }
                    }
                    ("Contents", "Size") | ("Properties", "Content-Length") => {
                        if let Some(o) = object.as_mut() {
                            o.size = value.parse().ok();
                        }
                    }
                    ("CommonPrefixes", "Prefix") | ("BlobPrefix", "Name") => {
                        page.prefixes.push(value);
                    }
                    (_, "IsTruncated") => {
                        saw_truncated = true;
                        page.is_truncated = value.eq_ignore_ascii_case("true");
                    }
                    (_, "NextMarker") if !value.is_empty() => page.next_marker = Some(value),
                    (_, "NextContinuationToken") if !value.is_empty() => {
                        page.next_continuation_token = Some(value);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Azure signals more pages only through a non-empty NextMarker.
    if !saw_truncated {
        page.is_truncated =
            page.next_marker.is_some() || page.next_continuation_token.is_some();
    }

    Ok(page)
}

/// Last segment of a key (`a/b/c.zip` -> `c.zip`).
fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Last segment of a prefix plus `/` (`a/b/` -> `b/`).
fn prefix_dirname(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    (!name.is_empty()).then(|| format!("{name}/"))
}

/// Lists `dir` as an object prefix under a bucket endpoint.
pub struct BucketAdapter {
    client: SourceClient,
    base_url: String,
    style: BucketStyle,
    max_pages: u32,
}

impl BucketAdapter {
    pub fn new(client: SourceClient, config: &CategoryConfig) -> Self {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            style: config.bucket_style,
            max_pages: config.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1),
        }
    }

    fn page_url(
        &self,
        prefix: &str,
        continuation: Option<&Continuation>,
    ) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut query = url.query_pairs_mut();
            if self.style == BucketStyle::Azure {
                query.append_pair("restype", "container");
                query.append_pair("comp", "list");
            }
            query.append_pair("delimiter", "/");
            query.append_pair("prefix", prefix);
            match continuation {
                Some(Continuation::Marker(marker)) => {
                    query.append_pair("marker", marker);
                }
                Some(Continuation::Token(token)) => {
                    query.append_pair("list-type", "2");
                    query.append_pair("continuation-token", token);
                }
                None => {}
            }
        }
        Ok(url.to_string())
    }

    /// Download URL of `key`, each key segment percent-encoded.
    fn object_url(&self, key: &str) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| {
                SourceError::malformed(&self.base_url, "base URL cannot carry a path")
            })?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url.to_string())
    }

    async fn fetch_page(
        &self,
        prefix: &str,
        continuation: Option<&Continuation>,
    ) -> Result<BucketPage, SourceError> {
        let url = self.page_url(prefix, continuation)?;
        let body = self.client.get_text(&url).await?;
        parse_bucket_page(&body).map_err(|e| SourceError::malformed(&url, e.to_string()))
    }

    fn items_from_page(&self, prefix: &str, page: &BucketPage) -> Vec<BinaryItem> {
        let mut items = Vec::with_capacity(page.objects.len() + page.prefixes.len());

        for p in &page.prefixes {
            if let Some(name) = prefix_dirname(p) {
                items.push(BinaryItem::dir(name, ""));
            }
        }

        for object in &page.objects {
            // The prefix placeholder object itself.
            if object.key == prefix || object.key.ends_with('/') {
                continue;
            }
            let name = key_basename(&object.key);
            if name.is_empty() {
                continue;
            }
            let source_url = match self.object_url(&object.key) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(
                        key = %object.key,
                        error = %e,
                        "Skipping object without a usable URL"
                    );
                    continue;
                }
            };
            items.push(BinaryItem::file(
                name,
                object.size,
                normalize_or_empty(&object.last_modified),
                source_url,
            ));
        }

        items
    }
}

#[async_trait]
impl BinaryAdapter for BucketAdapter {
    fn kind(&self) -> &'static str {
        "bucket"
    }

    async fn list(
        &self,
        cache: &mut RunCache,
        dir: &str,
        _hint: Option<&ResumeHint>,
    ) -> Option<FetchResult> {
        let prefix = dir.trim_start_matches('/');
        let mut items = Vec::new();
        let mut continuation: Option<Continuation> = None;

        for page_number in 1..=self.max_pages {
            let page = match self.fetch_page(prefix, continuation.as_ref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        category = cache.category(),
                        dir,
                        page = page_number,
                        error = %e,
                        "Bucket listing unavailable"
                    );
                    return None;
                }
            };

            items.extend(self.items_from_page(prefix, &page));
            continuation = page.continuation();
            if continuation.is_none() {
                return Some(FetchResult::new(items));
            }
        }

        let cursor = continuation.map(|c| match c {
            Continuation::Marker(m) | Continuation::Token(m) => m,
        });
        tracing::warn!(
            category = cache.category(),
            dir,
            max_pages = self.max_pages,
            cursor = cursor.as_deref().unwrap_or_default(),
            "Bucket listing hit page cap, returning partial result"
        );
        Some(FetchResult { items, cursor })
    }
}
