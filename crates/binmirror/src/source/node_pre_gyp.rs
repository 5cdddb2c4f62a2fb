//! Prebuilt native addons published through node-pre-gyp.
//!
//! The npm manifest only says *where* binaries live (`binary.host`,
//! `binary.remote_path`) and *how* they are named (`binary.package_name`).
//! The file set is synthesized as the cartesian product of the configured
//! platform, arch, libc and N-API axes; combinations that were never built
//! simply 404 at download time, which is expected.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;

use crate::category::{AxisConfig, CategoryConfig};
use crate::http::HttpRequest;

use super::client::SourceClient;
use super::date::normalize_or_empty;
use super::{BinaryAdapter, BinaryItem, FetchResult, ResumeHint, RunCache, dir_path};

/// Statuses that mark a synthesized combination as "never built".
pub const IGNORED_STATUSES: &[u16] = &[404];

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, VersionMeta>,
    #[serde(default)]
    time: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VersionMeta {
    binary: Option<BinarySection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinarySection {
    pub module_name: Option<String>,
    /// A URL string, or `{ "endpoint": "..." }` in newer node-pre-gyp.
    pub host: Option<serde_json::Value>,
    pub remote_path: Option<String>,
    pub package_name: Option<String>,
    pub napi_versions: Option<Vec<u32>>,
}

impl BinarySection {
    fn host_url(&self) -> Option<String> {
        match self.host.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map
                .get("endpoint")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Values substituted into node-pre-gyp templates.
#[derive(Debug, Default, Clone)]
struct TemplateVars<'a> {
    name: &'a str,
    module_name: &'a str,
    version: &'a str,
    platform: &'a str,
    arch: &'a str,
    libc: &'a str,
    napi_build_version: String,
}

/// Render a node-pre-gyp template. Returns `None` when a placeholder is left
/// that cannot be computed from the axes (e.g. `{node_abi}`).
fn render(template: &str, vars: &TemplateVars<'_>) -> Option<String> {
    let mut parts = vars.version.splitn(2, '-');
    let release = parts.next().unwrap_or_default();
    let prerelease = parts.next().unwrap_or_default();
    let mut numbers = release.split('.');
    let major = numbers.next().unwrap_or_default();
    let minor = numbers.next().unwrap_or_default();
    let patch = numbers.next().unwrap_or_default();

    let replacements: [(&str, &str); 13] = [
        ("{name}", vars.name),
        ("{module_name}", vars.module_name),
        ("{version}", vars.version),
        ("{major}", major),
        ("{minor}", minor),
        ("{patch}", patch),
        ("{prerelease}", prerelease),
        ("{build}", ""),
        ("{platform}", vars.platform),
        ("{arch}", vars.arch),
        ("{libc}", vars.libc),
        ("{napi_build_version}", &vars.napi_build_version),
        ("{configuration}", "Release"),
    ];

    let mut rendered = template.to_string();
    for (placeholder, value) in replacements {
        rendered = rendered.replace(placeholder, value);
    }
    (!rendered.contains('{')).then_some(rendered)
}

/// Render `remote_path` into a relative path without leading `./` or slashes.
fn render_remote_path(remote_path: &str, vars: &TemplateVars<'_>) -> Option<String> {
    let rendered = render(remote_path, vars)?;
    let trimmed = rendered.trim_start_matches("./").trim_matches('/');
    Some(trimmed.to_string())
}

/// Synthesized file names for one version, deduplicated and in axis order.
pub fn expand_file_names(
    package_name: &str,
    package: &str,
    module_name: &str,
    version: &str,
    axes: &AxisConfig,
    napi_versions: &[u32],
) -> Vec<String> {
    let libcs: Vec<&str> = if package_name.contains("{libc}") && !axes.libcs.is_empty() {
        axes.libcs.iter().map(String::as_str).collect()
    } else {
        vec![""]
    };
    let napis: Vec<String> =
        if package_name.contains("{napi_build_version}") && !napi_versions.is_empty() {
            napi_versions.iter().map(u32::to_string).collect()
        } else {
            vec![String::new()]
        };

    let mut names: Vec<String> = Vec::new();
    for platform in &axes.platforms {
        for arch in &axes.archs {
            for libc in &libcs {
                for napi in &napis {
                    let vars = TemplateVars {
                        name: package,
                        module_name,
                        version,
                        platform,
                        arch,
                        libc,
                        napi_build_version: napi.clone(),
                    };
                    if let Some(name) = render(package_name, &vars)
                        && !names.contains(&name)
                    {
                        names.push(name);
                    }
                }
            }
        }
    }
    names
}

/// Expands node-pre-gyp `binary` sections of an npm package.
pub struct NodePreGypAdapter {
    client: SourceClient,
    registry: String,
    package: String,
    axes: AxisConfig,
}

impl NodePreGypAdapter {
    pub fn new(client: SourceClient, config: &CategoryConfig) -> Self {
        let registry = if config.base_url.is_empty() {
            DEFAULT_REGISTRY.to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };
        Self {
            client,
            registry,
            package: config.package.clone().unwrap_or_default(),
            axes: config.axes.clone(),
        }
    }

    fn manifest_url(&self) -> String {
        format!("{}/{}", self.registry, self.package)
    }

    fn expand_version(
        &self,
        cache: &mut RunCache,
        version: &str,
        binary: &BinarySection,
        date: &str,
    ) {
        let Some(host) = binary.host_url() else {
            tracing::debug!(category = cache.category(), version, "No binary host, skipping");
            return;
        };
        let Some(package_name) = binary.package_name.as_deref() else {
            tracing::debug!(category = cache.category(), version, "No package_name, skipping");
            return;
        };
        let module_name = binary.module_name.as_deref().unwrap_or(&self.package);
        let vars = TemplateVars {
            name: &self.package,
            module_name,
            version,
            ..TemplateVars::default()
        };
        let Some(remote) = render_remote_path(binary.remote_path.as_deref().unwrap_or(""), &vars)
        else {
            tracing::debug!(category = cache.category(), version, "Unrenderable remote_path, skipping");
            return;
        };

        let napi_versions = binary
            .napi_versions
            .clone()
            .unwrap_or_else(|| self.axes.napi_versions.clone());
        let names = expand_file_names(
            package_name,
            &self.package,
            module_name,
            version,
            &self.axes,
            &napi_versions,
        );
        if names.is_empty() {
            tracing::debug!(category = cache.category(), version, "Unrenderable package_name, skipping");
            return;
        }

        // Versions sharing one flat remote directory still get their own node.
        let dir = if remote.is_empty() {
            dir_path(&format!("v{version}"))
        } else {
            dir_path(&remote)
        };
        let url_base = if remote.is_empty() {
            format!("{}/", host.trim_end_matches('/'))
        } else {
            format!("{}/{remote}/", host.trim_end_matches('/'))
        };

        for name in names {
            let url = format!("{url_base}{name}");
            cache.insert(
                &dir,
                BinaryItem::file(name, None, date, url).with_ignore_statuses(IGNORED_STATUSES),
            );
        }
    }

    async fn prime(&self, cache: &mut RunCache, hint: Option<&ResumeHint>) -> bool {
        let url = self.manifest_url();
        let request = HttpRequest::get(url.as_str()).with_header("Accept", "application/json");
        let packument: Packument = match self
            .client
            .send_ok(request)
            .await
            .and_then(|response| SourceClient::decode_json(&url, &response))
        {
            Ok(packument) => packument,
            Err(e) => {
                tracing::warn!(category = cache.category(), error = %e, "Package manifest unavailable");
                return false;
            }
        };

        let mut expanded = 0usize;
        for (version, meta) in &packument.versions {
            let Some(binary) = &meta.binary else {
                continue;
            };
            let date = normalize_or_empty(packument.time.get(version).map_or("", String::as_str));
            if hint.is_some_and(|h| h.is_older(&date)) {
                continue;
            }
            self.expand_version(cache, version, binary, &date);
            expanded += 1;
        }

        tracing::debug!(
            category = cache.category(),
            versions = packument.versions.len(),
            expanded,
            "Expanded package manifest"
        );
        cache.mark_primed();
        true
    }
}

#[async_trait]
impl BinaryAdapter for NodePreGypAdapter {
    fn kind(&self) -> &'static str {
        "node_pre_gyp"
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
        Some(FetchResult::new(items))
    }
}
