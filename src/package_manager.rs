//! High-level PackageManager API: install, update and remove packages.
//!
//! This module wires the registry client, release lookup, asset selection,
//! staging and source installs into the operations the CLI exposes. It holds
//! the shared HTTP clients, so keep one instance alive for a whole command.
//!
//! # Quick Start
//!
//! ```no_run
//! use purr::PackageManager;
//! use purr::config::Config;
//! use purr::package::PackageSpec;
//!
//! #[tokio::main]
//! async fn main() -> purr::error::Result<()> {
//!     let pm = PackageManager::new(Config::load()?)?;
//!
//!     let report = pm.install(&PackageSpec::parse("catsay@1.2.0")?).await?;
//!     for item in &report.installed {
//!         println!("Installed {} {}", item.name, item.version);
//!     }
//!
//!     pm.finish().await;
//!     Ok(())
//! }
//! ```
//!
//! # Install flow
//!
//! Dependencies are installed depth-first before the package that declares
//! them. Each package then takes one of two paths:
//!
//! - a declared installer script means a source install (clone + script)
//! - otherwise the package's release assets are tried first; if that path
//!   cannot work (no supported host, no release, no usable asset) it falls
//!   back to a source install with a warning
//!
//! A package already installed earlier in the same call is not installed
//! twice, and a package that depends on itself (directly or not) fails with
//! [`PurrError::CyclicDependency`].

use crate::api::RegistryClient;
use crate::config::Config;
use crate::download;
use crate::error::{PurrError, Result};
use crate::installed;
use crate::package::{self, PackageMetadata, PackageSpec};
use crate::platform::Platform;
use crate::process::OutputMode;
use crate::receipt::BinaryReceipt;
use crate::release::{ReleaseAsset, ReleaseClient};
use crate::selector::{self, AssetSelection};
use crate::shellenv::{self, Advice, Shell};
use crate::source;
use crate::stage::{self, StagedBinary};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long [`PackageManager::finish`] waits for download tracking
const TRACKING_GRACE: Duration = Duration::from_secs(3);

/// Asks a human to break a tie between equally good release assets
pub trait OperatorPrompt: Send + Sync {
    /// Show `options` and return the raw answer (1-based index, or empty)
    fn choose(&self, question: &str, options: &[String]) -> String;
}

/// Numbered menu on stdout, answer read from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn choose(&self, question: &str, options: &[String]) -> String {
        println!("{}", question);
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        print!("Select [1-{}] (default 1): ", options.len());
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if let Err(e) = std::io::stdin().lock().read_line(&mut answer) {
            tracing::debug!("could not read selection: {}", e);
        }
        answer
    }
}

/// How a package ended up installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    Binary {
        staged: StagedBinary,
        asset: String,
    },
    Source {
        dir: PathBuf,
        ran_installer: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledItem {
    pub name: String,
    pub version: String,
    pub method: InstallMethod,
    /// Set when the release-asset path failed and a source install was used
    pub fell_back: bool,
}

/// Result of an install, in install order (dependencies first)
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledItem>,
    /// PATH commands to show when the bin directory is not on PATH
    pub path_advice: Option<(Shell, Vec<Advice>)>,
}

/// Result of an uninstall
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub name: String,
    pub removed_dir: Option<PathBuf>,
    pub removed_files: Vec<PathBuf>,
}

impl UninstallReport {
    /// `true` when neither install shape had anything to remove
    pub fn nothing_removed(&self) -> bool {
        self.removed_dir.is_none() && self.removed_files.is_empty()
    }
}

/// Recursion state for one top-level install
#[derive(Default)]
struct InstallState {
    /// Packages whose dependencies are being installed right now
    chain: Vec<String>,
    done: HashSet<String>,
    report: InstallReport,
}

pub struct PackageManager {
    config: Config,
    registry: RegistryClient,
    releases: ReleaseClient,
    platform: Platform,
    prompt: Box<dyn OperatorPrompt>,
    output: OutputMode,
    tracking: Mutex<Vec<JoinHandle<()>>>,
}

impl PackageManager {
    pub fn new(config: Config) -> Result<Self> {
        let registry = RegistryClient::new(&config)?;
        let releases = ReleaseClient::new(&config)?;
        Ok(Self {
            config,
            registry,
            releases,
            platform: Platform::current(),
            prompt: Box::new(StdinPrompt),
            output: OutputMode::Streamed,
            tracking: Mutex::new(Vec::new()),
        })
    }

    /// Target a platform other than the running one
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// How installer scripts and git report their output
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Install `spec` and everything it depends on.
    ///
    /// # Errors
    ///
    /// Stops at the first package that cannot be installed: unknown to the
    /// registry, failing installer script, filesystem failure, or a
    /// dependency cycle. Packages installed before the failure stay
    /// installed.
    pub async fn install(&self, spec: &PackageSpec) -> Result<InstallReport> {
        let mut state = InstallState::default();
        self.install_recursive(spec.clone(), &mut state).await?;

        let mut report = state.report;
        if !report.installed.is_empty() {
            report.path_advice =
                shellenv::advice_for_environment(&self.config.bin_dir, self.platform.os);
        }
        Ok(report)
    }

    /// Re-run install for `spec`, refreshing an existing installation
    pub async fn update(&self, spec: &PackageSpec) -> Result<InstallReport> {
        self.install(spec).await
    }

    pub async fn upgrade(&self, spec: &PackageSpec) -> Result<InstallReport> {
        self.install(spec).await
    }

    /// Install an explicit older version. Returns `None` without touching
    /// the network or disk when `spec` carries no version.
    pub async fn downgrade(&self, spec: &PackageSpec) -> Result<Option<InstallReport>> {
        if spec.pinned_version().is_none() {
            tracing::debug!("downgrade of {} without a version, nothing to do", spec.name);
            return Ok(None);
        }
        self.install(spec).await.map(Some)
    }

    fn install_recursive<'a>(
        &'a self,
        spec: PackageSpec,
        state: &'a mut InstallState,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if let Some(pos) = state.chain.iter().position(|n| *n == spec.name) {
                let mut cycle = state.chain[pos..].to_vec();
                cycle.push(spec.name.clone());
                return Err(PurrError::CyclicDependency(cycle));
            }
            if state.done.contains(&spec.name) {
                tracing::debug!("{} already installed in this run", spec.name);
                return Ok(());
            }

            let metadata = self
                .registry
                .package_info(&spec.name, spec.pinned_version())
                .await?;
            package::validate_name(&metadata.name)?;
            tracing::debug!(
                "{} {} depends on [{}]",
                metadata.name,
                metadata.version,
                metadata.dependencies.join(", ")
            );

            state.chain.push(spec.name.clone());
            for dependency in &metadata.dependencies {
                let dependency = PackageSpec::parse(dependency)?;
                self.install_recursive(dependency, state).await?;
            }
            state.chain.pop();

            let item = self.install_one(&spec, &metadata).await?;
            state.done.insert(spec.name.clone());
            state.report.installed.push(item);
            self.track_download(&spec.name);
            Ok(())
        }
        .boxed()
    }

    async fn install_one(
        &self,
        spec: &PackageSpec,
        metadata: &PackageMetadata,
    ) -> Result<InstalledItem> {
        if metadata.has_installer() {
            return self.install_source(metadata, false).await;
        }

        match self.install_binary(spec, metadata).await {
            Ok(item) => Ok(item),
            Err(e) if e.is_recoverable_asset_failure() => {
                tracing::warn!(
                    "release install of {} failed ({}), installing from source",
                    metadata.name,
                    e
                );
                self.install_source(metadata, true).await
            }
            Err(e) => Err(e),
        }
    }

    async fn install_source(
        &self,
        metadata: &PackageMetadata,
        fell_back: bool,
    ) -> Result<InstalledItem> {
        let result = source::install_from_source(
            metadata,
            &self.config.packages_dir,
            &self.config.bin_dir,
            self.platform.os,
            self.output,
        )
        .await?;

        Ok(InstalledItem {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            method: InstallMethod::Source {
                dir: result.dir,
                ran_installer: result.ran_installer,
            },
            fell_back,
        })
    }

    /// `candidates` is never empty: ties involve at least two assets
    fn choose_asset(&self, name: &str, mut candidates: Vec<ReleaseAsset>) -> ReleaseAsset {
        let names: Vec<String> = candidates.iter().map(|a| a.name.clone()).collect();
        let question = format!(
            "Several release assets of {} match {}:",
            name, self.platform
        );
        let answer = self.prompt.choose(&question, &names);
        let index = selector::parse_choice(&answer, candidates.len());
        candidates.swap_remove(index)
    }

    async fn install_binary(
        &self,
        spec: &PackageSpec,
        metadata: &PackageMetadata,
    ) -> Result<InstalledItem> {
        let remote = self.releases.resolve_remote(&metadata.git).await?;
        let assets = self
            .releases
            .release_assets(&remote, spec.pinned_version())
            .await?;

        let asset = match selector::select_asset(&assets, self.platform)? {
            AssetSelection::Chosen(asset) => asset,
            AssetSelection::NeedsOperatorChoice(candidates) => {
                self.choose_asset(&metadata.name, candidates)
            }
        };
        tracing::debug!("selected asset {} ({})", asset.name, asset.download_url);

        let scratch = tempfile::TempDir::new()
            .map_err(|e| PurrError::fs("Failed to create a scratch directory", e))?;
        let downloaded = self.releases.download(&asset, scratch.path()).await?;
        let staged = stage::install_asset(
            &downloaded,
            scratch.path(),
            &metadata.name,
            metadata.main_file(),
            &self.config.bin_dir,
            self.platform.os,
        )?;

        let sha256 = download::sha256_file(&staged.staged).await?;
        BinaryReceipt::new(&metadata.name, &metadata.version, &asset.name, sha256, &staged)
            .write(&self.config.receipts_dir)?;

        Ok(InstalledItem {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            method: InstallMethod::Binary {
                staged,
                asset: asset.name,
            },
            fell_back: false,
        })
    }

    /// Remove `name` in whichever shapes it is installed.
    ///
    /// A source checkout gets its uninstaller run (failures are only
    /// warnings) and is deleted. Binary files are removed either way.
    pub async fn uninstall(&self, name: &str) -> Result<UninstallReport> {
        package::validate_name(name)?;
        let mut report = UninstallReport {
            name: name.to_string(),
            ..Default::default()
        };

        let dir = installed::package_dir(&self.config, name);
        tracing::debug!("checking {}", dir.display());
        let mut dir_error = None;
        if dir.is_dir() {
            match installed::read_sidecar(&dir) {
                Ok(Some(metadata)) => {
                    source::run_uninstaller(
                        &metadata,
                        &dir,
                        &self.config.bin_dir,
                        self.platform.os,
                        self.output,
                    )
                    .await
                }
                Ok(None) => tracing::debug!("no metadata in {}", dir.display()),
                Err(e) => tracing::warn!("could not read metadata for {}: {}", name, e),
            }

            match remove_tree(&dir) {
                Ok(()) => report.removed_dir = Some(dir),
                Err(e) => dir_error = Some(e),
            }
        }

        let receipt = match BinaryReceipt::read(&self.config.receipts_dir, name) {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!("ignoring unreadable receipt for {}: {}", name, e);
                None
            }
        };
        let extra = receipt.map(|r| r.files()).unwrap_or_default();
        report.removed_files = stage::remove_binaries(&self.config.bin_dir, name, &extra)?;
        BinaryReceipt::remove(&self.config.receipts_dir, name)?;

        match dir_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn track_download(&self, name: &str) {
        let handle = self.registry.track_download(name);
        match self.tracking.lock() {
            Ok(mut pending) => pending.push(handle),
            Err(_) => tracing::debug!("download tracking list poisoned"),
        }
    }

    /// Give pending download-tracking requests a moment to complete
    pub async fn finish(&self) {
        let pending: Vec<JoinHandle<()>> = match self.tracking.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        if pending.is_empty() {
            return;
        }

        if tokio::time::timeout(TRACKING_GRACE, futures::future::join_all(pending))
            .await
            .is_err()
        {
            tracing::debug!("download tracking still running, giving up");
        }
    }
}

/// `remove_dir_all` that also copes with read-only files (git object stores
/// on Windows)
fn remove_tree(dir: &Path) -> Result<()> {
    if fs::remove_dir_all(dir).is_ok() {
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(dir).into_iter().flatten() {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), perms);
            }
        }
    }
    fs::remove_dir_all(dir)
        .map_err(|e| PurrError::fs(format!("Failed to remove {}", dir.display()), e))
}
