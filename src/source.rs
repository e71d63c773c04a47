//! Source installs: clone or refresh a package's repository and run its
//! installer script.
//!
//! Each package owns one checkout at `packages/<name>/`:
//!
//! - absent: clone it, then check out the requested version unless it is
//!   `latest`. A failed checkout leaves the default branch in place.
//! - present with `.git`: fetch everything, check out the version, retry as
//!   `origin/<version>`, and otherwise stay on the current checkout. A pull
//!   is attempted last and may fail harmlessly (detached tag checkouts).
//!
//! After the checkout the declared installer runs from inside the package
//! directory and the metadata is saved as the `purrconfig.json` sidecar.

use crate::error::{PurrError, Result};
use crate::installed;
use crate::package::{PackageMetadata, is_latest};
use crate::platform::OsFamily;
use crate::process::{self, OutputMode};
use crate::script::{self, ScriptContext};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInstall {
    pub dir: PathBuf,
    /// `false` when an existing checkout was refreshed
    pub fresh_clone: bool,
    /// Whether an installer script actually ran
    pub ran_installer: bool,
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn git(dir: &Path, list: &[&str]) -> Result<()> {
    process::run_checked("git", &args(list), Some(dir), OutputMode::Buffered)
        .await
        .map(|_| ())
}

/// `git checkout <rev>`; revisions that look like options are refused
async fn checkout(dir: &Path, rev: &str) -> Result<()> {
    if rev.starts_with('-') {
        return Err(PurrError::InvalidSpec(rev.to_string()));
    }
    git(dir, &["checkout", rev]).await
}

async fn clone(remote: &str, dir: &Path, version: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| PurrError::fs(format!("Failed to create {}", dir.display()), e))?;

    let target = dir.to_string_lossy().into_owned();
    if let Err(e) = process::run_checked(
        "git",
        &args(&["clone", "--", remote, &target]),
        None,
        OutputMode::Buffered,
    )
    .await
    {
        // A leftover empty directory would read as an installed clone
        if let Err(cleanup) = fs::remove_dir_all(dir) {
            tracing::debug!("could not remove {}: {}", dir.display(), cleanup);
        }
        return Err(e);
    }

    if !is_latest(version)
        && let Err(e) = checkout(dir, version).await
    {
        tracing::warn!(
            "could not check out {} for {}, staying on the default branch: {}",
            version,
            dir.display(),
            e
        );
    }
    Ok(())
}

async fn update(dir: &Path, version: &str) -> Result<()> {
    if let Err(e) = git(dir, &["fetch", "--all", "--tags"]).await {
        tracing::warn!("fetch failed in {}: {}", dir.display(), e);
    }

    if !is_latest(version) {
        let tracking = format!("origin/{}", version);
        if checkout(dir, version).await.is_err()
            && let Err(e) = checkout(dir, &tracking).await
        {
            tracing::warn!(
                "could not check out {} in {}, keeping the current checkout: {}",
                version,
                dir.display(),
                e
            );
        }
    }

    // Fails on detached tag checkouts
    if let Err(e) = git(dir, &["pull"]).await {
        tracing::debug!("pull skipped in {}: {}", dir.display(), e);
    }
    Ok(())
}

/// Bring `dir` to `version` of `remote`. Returns whether a fresh clone was
/// made.
pub async fn sync_checkout(remote: &str, dir: &Path, version: &str) -> Result<bool> {
    if !dir.exists() {
        tracing::debug!("cloning {} into {}", remote, dir.display());
        clone(remote, dir, version).await?;
        return Ok(true);
    }

    if dir.join(".git").exists() {
        tracing::debug!("updating {}", dir.display());
        update(dir, version).await?;
    } else {
        tracing::warn!(
            "{} exists but is not a git checkout, using it as is",
            dir.display()
        );
    }
    Ok(false)
}

/// Clone or update the checkout for `metadata`, run its installer and write
/// the sidecar.
///
/// A declared installer that is missing from the checkout is only warned
/// about. An installer that fails aborts the install and no sidecar is
/// written.
pub async fn install_from_source(
    metadata: &PackageMetadata,
    packages_dir: &Path,
    bin_dir: &Path,
    os: OsFamily,
    mode: OutputMode,
) -> Result<SourceInstall> {
    let remote = metadata.git.trim();
    if remote.is_empty() {
        return Err(PurrError::Other(anyhow::anyhow!(
            "{} has no source repository to install from",
            metadata.name
        )));
    }

    fs::create_dir_all(packages_dir)
        .map_err(|e| PurrError::fs(format!("Failed to create {}", packages_dir.display()), e))?;
    let dir = packages_dir.join(&metadata.name);
    let fresh_clone = sync_checkout(remote, &dir, &metadata.version).await?;

    let mut ran_installer = false;
    if metadata.has_installer() {
        let script_path = dir.join(metadata.installer.trim());
        tracing::debug!("checking {}", script_path.display());
        if script_path.is_file() {
            let context = ScriptContext {
                cwd: dir.clone(),
                install_dir: bin_dir.to_path_buf(),
                package_name: metadata.name.clone(),
            };
            script::run_script(&script_path, &context, os, mode).await?;
            ran_installer = true;
        } else {
            tracing::warn!(
                "installer {} not found in {}",
                metadata.installer,
                dir.display()
            );
        }
    }

    installed::write_sidecar(&dir, metadata)?;

    Ok(SourceInstall {
        dir,
        fresh_clone,
        ran_installer,
    })
}

/// Run the uninstaller paired with the declared installer, if the checkout
/// has one. Failures are warnings.
pub async fn run_uninstaller(
    metadata: &PackageMetadata,
    dir: &Path,
    bin_dir: &Path,
    os: OsFamily,
    mode: OutputMode,
) {
    let Some(uninstaller) = metadata.uninstaller() else {
        return;
    };
    let script_path = dir.join(uninstaller.trim());
    tracing::debug!("checking {}", script_path.display());
    if !script_path.is_file() {
        tracing::debug!("no uninstaller at {}", script_path.display());
        return;
    }

    let context = ScriptContext {
        cwd: dir.to_path_buf(),
        install_dir: bin_dir.to_path_buf(),
        package_name: metadata.name.clone(),
    };
    if let Err(e) = script::run_script(&script_path, &context, os, mode).await {
        tracing::warn!("uninstaller for {} failed: {}", metadata.name, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn sh(dir: &Path, cmd: &str) {
        let status = std::process::Command::new("sh")
            .args(["-c", cmd])
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "{cmd}");
    }

    /// Local repository with an installer and a `v1.0` tag
    fn upstream(root: &Path) -> PathBuf {
        let repo = root.join("upstream");
        fs::create_dir_all(&repo).unwrap();
        sh(
            &repo,
            "git init -q && git config user.email t@t && git config user.name t \
             && printf 'echo installed > \"$PURR_INSTALL_DIR/$PURR_PACKAGE_NAME.log\"\\n' > install.sh \
             && printf 'rm -f \"$PURR_INSTALL_DIR/$PURR_PACKAGE_NAME.log\"\\n' > uninstall.sh \
             && echo 1 > VERSION && git add . && git commit -q -m one && git tag v1.0 \
             && echo 2 > VERSION && git commit -q -am two",
        );
        repo
    }

    fn metadata(remote: &Path, version: &str) -> PackageMetadata {
        PackageMetadata {
            name: "meow".to_string(),
            version: version.to_string(),
            git: remote.to_string_lossy().into_owned(),
            installer: "install.sh".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clone_checkout_and_installer() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let packages = root.path().join("packages");
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();

        let meta = metadata(&remote, "v1.0");
        let result = install_from_source(&meta, &packages, &bin, OsFamily::Linux, OutputMode::Buffered)
            .await
            .unwrap();

        assert!(result.fresh_clone);
        assert!(result.ran_installer);
        assert_eq!(fs::read_to_string(result.dir.join("VERSION")).unwrap().trim(), "1");
        assert!(bin.join("meow.log").exists());
        assert_eq!(installed::read_sidecar(&result.dir).unwrap(), Some(meta.clone()));

        run_uninstaller(&meta, &result.dir, &bin, OsFamily::Linux, OutputMode::Buffered).await;
        assert!(!bin.join("meow.log").exists());
    }

    #[tokio::test]
    async fn test_second_install_updates_in_place() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let packages = root.path().join("packages");
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();

        let meta = metadata(&remote, "latest");
        install_from_source(&meta, &packages, &bin, OsFamily::Linux, OutputMode::Buffered)
            .await
            .unwrap();
        let again = install_from_source(&meta, &packages, &bin, OsFamily::Linux, OutputMode::Buffered)
            .await
            .unwrap();

        assert!(!again.fresh_clone);
        assert_eq!(fs::read_to_string(again.dir.join("VERSION")).unwrap().trim(), "2");
    }

    #[tokio::test]
    async fn test_unknown_version_stays_on_default_branch() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let dir = root.path().join("checkout");

        assert!(sync_checkout(&remote.to_string_lossy(), &dir, "v9.9").await.unwrap());
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap().trim(), "2");
    }

    fn head(dir: &Path) -> String {
        let output = std::process::Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    #[tokio::test]
    async fn test_update_falls_back_to_remote_branch() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let dir = root.path().join("checkout");
        let remote_url = remote.to_string_lossy().into_owned();
        assert!(sync_checkout(&remote_url, &dir, "latest").await.unwrap());

        sh(
            &remote,
            "git checkout -q -b release-3 && echo 3 > VERSION && git commit -q -am three \
             && git checkout -q -",
        );
        // no implicit local branch from `git checkout release-3`
        sh(&dir, "git config checkout.guess false");

        assert!(!sync_checkout(&remote_url, &dir, "release-3").await.unwrap());
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap().trim(), "3");
        let branch_tip = std::process::Command::new("git")
            .args(["rev-parse", "origin/release-3"])
            .current_dir(&dir)
            .output()
            .unwrap();
        assert_eq!(head(&dir), String::from_utf8(branch_tip.stdout).unwrap().trim());
    }

    #[tokio::test]
    async fn test_update_to_unknown_version_keeps_checkout() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let dir = root.path().join("checkout");
        let remote_url = remote.to_string_lossy().into_owned();
        sync_checkout(&remote_url, &dir, "v1.0").await.unwrap();
        let before = head(&dir);

        assert!(!sync_checkout(&remote_url, &dir, "v9.9").await.unwrap());
        assert_eq!(head(&dir), before);
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap().trim(), "1");
    }

    #[tokio::test]
    async fn test_option_like_version_is_not_passed_to_git() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        let dir = root.path().join("checkout");
        let remote_url = remote.to_string_lossy().into_owned();
        sync_checkout(&remote_url, &dir, "latest").await.unwrap();
        let before = head(&dir);

        assert!(!sync_checkout(&remote_url, &dir, "-borphan").await.unwrap());
        assert_eq!(head(&dir), before);
        assert!(matches!(
            checkout(&dir, "--detach").await,
            Err(PurrError::InvalidSpec(_))
        ));
    }

    #[tokio::test]
    async fn test_option_like_remote_is_treated_as_a_path() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let dir = root.path().join("pkg");
        let marker = root.path().join("marker");
        let remote = format!("--upload-pack=touch {}", marker.display());

        let err = sync_checkout(&remote, &dir, "latest").await.unwrap_err();
        assert!(matches!(err, PurrError::CommandFailed { .. }));
        assert!(!marker.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_failing_installer_writes_no_sidecar() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = upstream(root.path());
        sh(&remote, "echo 'exit 4' > install.sh && git commit -q -am broken");
        let packages = root.path().join("packages");

        let meta = metadata(&remote, "latest");
        let err = install_from_source(&meta, &packages, root.path(), OsFamily::Linux, OutputMode::Buffered)
            .await
            .unwrap_err();
        assert!(matches!(err, PurrError::ScriptFailed { code: 4, .. }));
        assert!(installed::read_sidecar(&packages.join("meow")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing_behind() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let dir = root.path().join("pkg");
        let missing = root.path().join("no-such-repo");

        let err = sync_checkout(&missing.to_string_lossy(), &dir, "latest")
            .await
            .unwrap_err();
        assert!(matches!(err, PurrError::CommandFailed { .. }));
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_missing_remote_is_an_error() {
        let root = TempDir::new().unwrap();
        let meta = PackageMetadata {
            name: "x".to_string(),
            ..Default::default()
        };
        assert!(
            install_from_source(&meta, root.path(), root.path(), OsFamily::Linux, OutputMode::Buffered)
                .await
                .is_err()
        );
    }
}
