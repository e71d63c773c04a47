//! Release lookup on the upstream source host.
//!
//! A package's `git` field names its upstream repository. Binary installs
//! need the asset list of a published release of that repository, which only
//! GitHub's release API provides here. Remotes on other hosts are probed once
//! with a redirect-following request: vanity URLs that forward to GitHub are
//! accepted, everything else is [`PurrError::UnsupportedAsset`].

use crate::config::Config;
use crate::download;
use crate::error::{PurrError, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::{StatusCode, Url, redirect};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SUPPORTED_HOSTS: &[&str] = &["github.com", "www.github.com"];
const MAX_REDIRECTS: usize = 10;

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

impl ReleaseAsset {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// Host, owner and repository parsed from a git remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemote {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl GitRemote {
    /// Parse `https://host/owner/repo[.git]` or `git@host:owner/repo[.git]`
    pub fn parse(remote: &str) -> Result<Self> {
        let remote = remote.trim();
        if remote.is_empty() {
            return Err(PurrError::UnsupportedAsset(
                "No repository specified".to_string(),
            ));
        }

        let (host, path) = if let Some(scp) = remote.strip_prefix("git@") {
            scp.split_once(':').ok_or_else(|| invalid_remote(remote))?
        } else {
            let url = Url::parse(remote).map_err(|_| invalid_remote(remote))?;
            let host = url.host_str().ok_or_else(|| invalid_remote(remote))?;
            return Self::from_parts(remote, host, url.path());
        };

        Self::from_parts(remote, host, path)
    }

    fn from_parts(remote: &str, host: &str, path: &str) -> Result<Self> {
        let mut segments = path.trim_matches('/').split('/').filter(|s| !s.is_empty());
        let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
            return Err(PurrError::UnsupportedAsset(format!(
                "Could not parse owner/repo from {}",
                remote
            )));
        };

        Ok(Self {
            host: host.to_ascii_lowercase(),
            owner: owner.to_string(),
            repo: repo.strip_suffix(".git").unwrap_or(repo).to_string(),
        })
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_HOSTS.contains(&self.host.as_str())
    }
}

fn invalid_remote(remote: &str) -> PurrError {
    PurrError::UnsupportedAsset(format!("Invalid git URL: {}", remote))
}

fn is_supported_url(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| SUPPORTED_HOSTS.contains(&h.to_ascii_lowercase().as_str()))
}

/// Client for the release API and asset downloads
#[derive(Clone, Debug)]
pub struct ReleaseClient {
    client: reqwest::Client,
    probe: reqwest::Client,
    api_base: Url,
}

impl ReleaseClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_api_url(
            &config.github_api_url,
            config.request_timeout,
            config.redirect_timeout,
        )
    }

    pub fn with_api_url(api_url: &str, timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        let user_agent = format!("purr-cli/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.clone())
            .build()?;

        // Stop as soon as a hop lands on a supported host; the Location header
        // is all we need and the host itself is never contacted.
        let policy = redirect::Policy::custom(|attempt| {
            if is_supported_url(attempt.url()) {
                attempt.stop()
            } else if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });
        let probe = reqwest::Client::builder()
            .timeout(probe_timeout)
            .user_agent(user_agent)
            .redirect(policy)
            .build()?;

        let api_base = Url::parse(api_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("Invalid release API URL '{}': {}", api_url, e))?;

        Ok(Self {
            client,
            probe,
            api_base,
        })
    }

    /// Parse the remote and make sure it lives on a supported host, following
    /// vanity redirects if needed. Probe failures are not errors: the original
    /// URL is kept and judged as-is.
    pub async fn resolve_remote(&self, git: &str) -> Result<GitRemote> {
        let remote = GitRemote::parse(git)?;
        if remote.is_supported() {
            return Ok(remote);
        }

        let resolved = match self.follow_redirects(git).await {
            Ok(Some(url)) => {
                tracing::debug!("{} redirects to {}", git, url);
                GitRemote::parse(url.as_str()).unwrap_or(remote)
            }
            Ok(None) => remote,
            Err(e) => {
                tracing::debug!("redirect probe for {} failed: {}", git, e);
                remote
            }
        };

        if resolved.is_supported() {
            Ok(resolved)
        } else {
            Err(PurrError::UnsupportedAsset(format!(
                "Release downloads only support GitHub repositories (got {})",
                resolved.host
            )))
        }
    }

    async fn follow_redirects(&self, git: &str) -> Result<Option<Url>> {
        let Ok(start) = Url::parse(git) else {
            return Ok(None);
        };
        if !matches!(start.scheme(), "http" | "https") {
            return Ok(None);
        }

        tracing::debug!("probing {} for redirects", start);
        let response = self.probe.get(start.clone()).send().await?;
        let landed = if response.status().is_redirection() {
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| response.url().join(loc).ok())
        } else {
            Some(response.url().clone())
        };

        Ok(landed.filter(|url| *url != start))
    }

    /// Assets of the release tagged `version`, or of the latest release.
    pub async fn release_assets(
        &self,
        remote: &GitRemote,
        version: Option<&str>,
    ) -> Result<Vec<ReleaseAsset>> {
        let fetched = match version {
            None => self.fetch_release(remote, &["releases", "latest"]).await,
            Some(tag) => match self.fetch_release(remote, &["releases", "tags", tag]).await {
                Err(PurrError::NotFound(_)) if !tag.starts_with('v') => {
                    let prefixed = format!("v{}", tag);
                    self.fetch_release(remote, &["releases", "tags", &prefixed])
                        .await
                }
                other => other,
            },
        };
        // A repository without that release still has a source checkout
        let release = match fetched {
            Err(PurrError::NotFound(_)) => {
                return Err(PurrError::UnsupportedAsset(format!(
                    "No {} release published for {}/{}",
                    version.unwrap_or("latest"),
                    remote.owner,
                    remote.repo
                )));
            }
            other => other?,
        };

        tracing::debug!(
            "release {} of {}/{} has {} assets",
            release.tag_name,
            remote.owner,
            remote.repo,
            release.assets.len()
        );
        if release.assets.is_empty() {
            return Err(PurrError::UnsupportedAsset(
                "No release assets found".to_string(),
            ));
        }
        Ok(release.assets)
    }

    async fn fetch_release(&self, remote: &GitRemote, tail: &[&str]) -> Result<Release> {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["repos", remote.owner.as_str(), remote.repo.as_str()])
                .extend(tail);
        }
        tracing::debug!("GET {}", url);

        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/vnd.github+json");
        if let Ok(token) = std::env::var("GITHUB_TOKEN").or_else(|_| std::env::var("GH_TOKEN")) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(PurrError::NotFound(url.to_string())),
            status if !status.is_success() => Err(PurrError::UnsupportedAsset(format!(
                "Release API returned {}",
                status
            ))),
            _ => Ok(response.json().await?),
        }
    }

    /// Download `asset` into `dest_dir`
    pub async fn download(&self, asset: &ReleaseAsset, dest_dir: &Path) -> Result<PathBuf> {
        download::download_asset(&self.client, asset, dest_dir).await
    }
}
