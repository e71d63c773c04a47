//! Purr registry HTTP client.
//!
//! Thin request-shaping layer over the registry's JSON API:
//!
//! | call                      | request                                   |
//! |---------------------------|-------------------------------------------|
//! | [`RegistryClient::package_info`] | `GET /packages/{name}[/{version}]` |
//! | [`RegistryClient::search`]       | `GET /packages?search=..&details=true` |
//! | [`RegistryClient::list_packages`]| `GET /packages?sort=..`            |
//! | [`RegistryClient::versions`]     | `GET /packages/{name}/versions`    |
//! | [`RegistryClient::statistics`]   | `GET /packages/statistics`         |
//! | [`RegistryClient::categories`]   | `GET /packages/categories`         |
//! | [`RegistryClient::track_download`] | `POST /packages/{name}/download` |
//!
//! Failures are collapsed at this boundary: a timeout, DNS error or non-2xx
//! answer all read as "absent" (`NotFound` or an empty result). The cause is
//! logged at debug level so `--verbose` shows it.
//!
//! When several registry URLs are configured, each read tries them in order
//! and returns the first successful answer.

use crate::config::Config;
use crate::error::{PurrError, Result};
use crate::package::PackageMetadata;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::task::JoinHandle;

const LIST_PAGE_SIZE: u32 = 50;
const SEARCH_PAGE_SIZE: u32 = 100;

/// Result of a list or search query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageList {
    #[serde(default)]
    pub package_count: u64,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default, rename = "package_details")]
    pub details: Vec<PackageMetadata>,
}

impl PackageList {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.details.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadCount {
    pub name: String,
    #[serde(default)]
    pub downloads: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentPackage {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Aggregate registry counters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_packages: u64,
    #[serde(default)]
    pub active_packages: u64,
    #[serde(default)]
    pub total_downloads: u64,
    #[serde(default)]
    pub total_views: u64,
    #[serde(default)]
    pub popular_authors: Vec<String>,
    #[serde(default)]
    pub most_downloaded: Vec<DownloadCount>,
    #[serde(default)]
    pub recently_added: Vec<RecentPackage>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Registry API client
#[derive(Clone, Debug)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_urls: Vec<Url>,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_urls(&config.registry_urls, config.request_timeout)
    }

    pub fn with_urls(urls: &[String], timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("purr-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_urls = urls
            .iter()
            .map(|u| {
                Url::parse(u.trim_end_matches('/')).map_err(|e| {
                    PurrError::from(anyhow::anyhow!("Invalid registry URL '{}': {}", u, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if base_urls.is_empty() {
            return Err(anyhow::anyhow!("No registry URL configured").into());
        }

        Ok(Self { client, base_urls })
    }

    /// Fetch metadata for `name`, optionally pinned to `version`.
    ///
    /// # Errors
    ///
    /// Returns [`PurrError::NotFound`] when no registry answers with the
    /// package, whatever the reason.
    pub async fn package_info(&self, name: &str, version: Option<&str>) -> Result<PackageMetadata> {
        let mut segments = vec!["packages", name];
        if let Some(version) = version {
            segments.push(version);
        }

        self.get_json(&segments, &[]).await.map_err(|e| {
            tracing::debug!("package lookup for {} failed: {}", name, e);
            let shown = version.map_or_else(|| name.to_string(), |v| format!("{}@{}", name, v));
            PurrError::NotFound(shown)
        })
    }

    /// Search packages by free-text query (detailed entries included)
    pub async fn search(&self, query: &str) -> PackageList {
        let page_size = SEARCH_PAGE_SIZE.to_string();
        let query = [
            ("search", query),
            ("page", "1"),
            ("pageSize", page_size.as_str()),
            ("details", "true"),
        ];
        self.get_or_default(&["packages"], &query).await
    }

    /// List package names, optionally sorted by a registry sort key
    /// (`mostDownloads`, `recentlyUpdated`, ...)
    pub async fn list_packages(&self, sort: Option<&str>) -> PackageList {
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut query = vec![("page", "1"), ("pageSize", page_size.as_str())];
        if let Some(sort) = sort {
            query.push(("sort", sort));
        }
        self.get_or_default(&["packages"], &query).await
    }

    /// Published versions of a package, newest first
    pub async fn versions(&self, name: &str) -> Vec<String> {
        self.get_or_default(&["packages", name, "versions"], &[]).await
    }

    pub async fn statistics(&self) -> Option<Statistics> {
        match self.get_json(&["packages", "statistics"], &[]).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::debug!("statistics request failed: {}", e);
                None
            }
        }
    }

    pub async fn categories(&self) -> Vec<String> {
        self.get_or_default(&["packages", "categories"], &[]).await
    }

    pub async fn packages_in_category(&self, category: &str) -> Vec<PackageMetadata> {
        self.get_or_default(&["packages", "categories", category], &[])
            .await
    }

    /// Record a download of `name`.
    ///
    /// The request runs on its own task and never reports failure. Await the
    /// returned handle to make sure it finished before the runtime shuts down.
    pub fn track_download(&self, name: &str) -> JoinHandle<()> {
        let client = self.client.clone();
        let url = endpoint(&self.base_urls[0], &["packages", name, "download"]);
        let name = name.to_string();

        tokio::spawn(async move {
            tracing::debug!("POST {}", url);
            match client.post(url).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    tracing::debug!("download tracking for {} returned {}", name, resp.status())
                }
                Err(e) => tracing::debug!("download tracking for {} failed: {}", name, e),
            }
        })
    }

    async fn get_or_default<T: DeserializeOwned + Default>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> T {
        match self.get_json(segments, query).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("registry request /{} failed: {}", segments.join("/"), e);
                T::default()
            }
        }
    }

    /// GET a JSON document, trying each configured registry in turn
    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut last_error = None;

        for base in &self.base_urls {
            let url = endpoint(base, segments);
            tracing::debug!("GET {}", url);

            let response = match self.client.get(url.clone()).query(query).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(PurrError::Network(e));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                last_error = Some(PurrError::NotFound(url.to_string()));
                continue;
            }
            if !status.is_success() {
                last_error = Some(PurrError::from(anyhow::anyhow!(
                    "registry returned HTTP {} for {}",
                    status,
                    url
                )));
                continue;
            }

            match response.json::<T>().await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(PurrError::Network(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| PurrError::NotFound(segments.join("/"))))
    }
}

/// Append path segments to a base URL, escaping each one
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
