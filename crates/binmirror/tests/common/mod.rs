//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use binmirror::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};

/// Serves canned responses by exact URL; unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct FixtureTransport {
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    hits: Arc<Mutex<Vec<String>>>,
    latency: Arc<Mutex<Duration>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter even when the request future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.to_string(), (status, body.into()));
    }

    /// Number of requests made for exactly `url`.
    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .iter()
            .filter(|hit| hit.as_str() == url)
            .count()
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().expect("hits lock").len()
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("latency lock") = latency;
    }

    /// Most requests ever outstanding at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FixtureTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.hits
            .lock()
            .expect("hits lock")
            .push(request.url.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(Arc::clone(&self.in_flight));
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock().expect("latency lock");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (status, body) = self
            .routes
            .lock()
            .expect("routes lock")
            .get(&request.url)
            .cloned()
            .unwrap_or((404, b"Not Found".to_vec()));
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }
}

pub const DIST: &str = "https://dist.test/node/";

/// An nginx autoindex page for `title` listing `rows` of `(href, date, size)`.
pub fn autoindex(title: &str, rows: &[(&str, &str, &str)]) -> String {
    let mut page = format!(
        "<html>\n<head><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1><hr><pre><a href=\"../\">../</a>\n"
    );
    for (href, date, size) in rows {
        page.push_str(&format!(
            "<a href=\"{href}\">{href}</a>                                   {date}            {size}\n"
        ));
    }
    page.push_str("</pre><hr></body>\n</html>\n");
    page
}

/// A small two-level mirror:
///
/// ```text
/// /SHASUMS256.txt
/// /v20.0.0/node-v20.0.0.tar.gz
/// /v20.0.0/docs/            (ignored by the category config)
/// ```
pub fn node_dist(transport: &FixtureTransport) {
    transport.route(
        DIST,
        200,
        autoindex(
            "/node/",
            &[
                ("v20.0.0/", "18-Apr-2023 10:00", "-"),
                ("SHASUMS256.txt", "18-Apr-2023 10:05", "12"),
            ],
        ),
    );
    transport.route(
        &format!("{DIST}v20.0.0/"),
        200,
        autoindex(
            "/node/v20.0.0/",
            &[
                ("docs/", "18-Apr-2023 10:00", "-"),
                ("node-v20.0.0.tar.gz", "18-Apr-2023 10:01", "5"),
            ],
        ),
    );
    transport.route(&format!("{DIST}SHASUMS256.txt"), 200, "abc  node.tgz");
    transport.route(&format!("{DIST}v20.0.0/node-v20.0.0.tar.gz"), 200, "bytes");
}
