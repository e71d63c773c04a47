//! Installed-package state on disk.
//!
//! A package is installed in one of two shapes:
//!
//! - **binary**: a shim named after the package exists in the bin directory
//!   (`bin/catsay`, or `bin/catsay.exe` on Windows)
//! - **clone**: a source checkout exists at `packages/<name>/`, usually with a
//!   `purrconfig.json` sidecar holding the metadata it was installed from
//!
//! Receipts describe binary installs but never decide installed-ness on their
//! own.

use crate::config::Config;
use crate::error::{PurrError, Result};
use crate::package::PackageMetadata;
use crate::platform::OsFamily;
use crate::receipt::BinaryReceipt;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Metadata sidecar written into every source checkout
pub const SIDECAR_FILE: &str = "purrconfig.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallShape {
    Binary,
    Clone,
}

#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    /// `unknown` when neither a sidecar nor a receipt records it
    pub version: String,
    pub shape: InstallShape,
    /// Checkout directory or shim path
    pub path: PathBuf,
    pub installed_at: Option<DateTime<Utc>>,
}

pub fn package_dir(config: &Config, name: &str) -> PathBuf {
    config.packages_dir.join(name)
}

/// Shim for `name` in the bin directory, if present
pub fn find_shim(config: &Config, name: &str, os: OsFamily) -> Option<PathBuf> {
    let mut candidates = vec![config.bin_dir.join(name)];
    if let Some(ext) = os.native_exe_extension() {
        candidates.push(config.bin_dir.join(format!("{}.{}", name, ext)));
    }
    if let Ok(Some(receipt)) = BinaryReceipt::read(&config.receipts_dir, name)
        && !receipt.shim_file.is_empty()
    {
        candidates.push(config.bin_dir.join(&receipt.shim_file));
    }

    candidates.into_iter().find(|path| {
        tracing::debug!("checking {}", path.display());
        path.is_file()
    })
}

/// Whether either install shape is present for `name`
pub fn is_installed(config: &Config, name: &str, os: OsFamily) -> bool {
    find_shim(config, name, os).is_some() || package_dir(config, name).is_dir()
}

/// Metadata persisted in a checkout, if any
pub fn read_sidecar(dir: &Path) -> Result<Option<PackageMetadata>> {
    let path = dir.join(SIDECAR_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PurrError::fs(
                format!("Failed to read {}", path.display()),
                e,
            ));
        }
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

pub fn write_sidecar(dir: &Path, metadata: &PackageMetadata) -> Result<()> {
    let path = dir.join(SIDECAR_FILE);
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(&path, json)
        .map_err(|e| PurrError::fs(format!("Failed to write {}", path.display()), e))?;
    tracing::debug!("wrote {}", path.display());
    Ok(())
}

/// Locally installed version of `name`: sidecar first, then receipt
pub fn installed_version(config: &Config, name: &str) -> Option<String> {
    let from_sidecar = read_sidecar(&package_dir(config, name))
        .ok()
        .flatten()
        .map(|m| m.version);
    from_sidecar
        .or_else(|| {
            BinaryReceipt::read(&config.receipts_dir, name)
                .ok()
                .flatten()
                .map(|r| r.version)
        })
        .filter(|v| !v.is_empty())
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn list_clones(config: &Config) -> Result<Vec<InstalledPackage>> {
    let entries = match fs::read_dir(&config.packages_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PurrError::fs(
                format!("Failed to read {}", config.packages_dir.display()),
                e,
            ));
        }
    };

    let mut packages = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }

        let dir = entry.path();
        let sidecar = match read_sidecar(&dir) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                tracing::warn!("unreadable {} in {}: {}", SIDECAR_FILE, dir.display(), e);
                None
            }
        };
        let version = sidecar
            .map(|m| m.version)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        packages.push(InstalledPackage {
            name,
            version,
            shape: InstallShape::Clone,
            installed_at: modified_at(&dir.join(SIDECAR_FILE)).or_else(|| modified_at(&dir)),
            path: dir,
        });
    }
    Ok(packages)
}

fn list_binaries(config: &Config, os: OsFamily) -> Result<Vec<InstalledPackage>> {
    let receipts = BinaryReceipt::list(&config.receipts_dir)?;

    let mut packages = Vec::new();
    let mut owned: HashSet<String> = HashSet::new();
    for receipt in &receipts {
        let shim = config.bin_dir.join(&receipt.shim_file);
        owned.extend(receipt.files());
        if !shim.is_file() {
            tracing::debug!("receipt for {} has no shim, skipping", receipt.name);
            continue;
        }
        packages.push(InstalledPackage {
            name: receipt.name.clone(),
            version: receipt.version.clone(),
            shape: InstallShape::Binary,
            path: shim,
            installed_at: Some(receipt.installed_at),
        });
    }

    // Shims without receipts, e.g. installed by an older purr
    let entries = match fs::read_dir(&config.bin_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(packages),
        Err(e) => {
            return Err(PurrError::fs(
                format!("Failed to read {}", config.bin_dir.display()),
                e,
            ));
        }
    };
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') || owned.contains(&file_name) || !entry.path().is_file() {
            continue;
        }

        let name = match os.native_exe_extension() {
            Some(ext) => match file_name.strip_suffix(&format!(".{}", ext)) {
                Some(stem) => stem.to_string(),
                None => continue,
            },
            None => file_name.clone(),
        };
        packages.push(InstalledPackage {
            name,
            version: "unknown".to_string(),
            shape: InstallShape::Binary,
            installed_at: modified_at(&entry.path()),
            path: entry.path(),
        });
    }

    Ok(packages)
}

/// Every installed package of either shape, sorted by name
pub fn list_installed(config: &Config, os: OsFamily) -> Result<Vec<InstalledPackage>> {
    let mut packages = list_clones(config)?;
    packages.extend(list_binaries(config, os)?);
    packages.sort_by(|a, b| a.name.cmp(&b.name).then(a.path.cmp(&b.path)));
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StagedBinary;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::from_home(dir.path()).unwrap()
    }

    #[test]
    fn test_nothing_installed() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        assert!(!is_installed(&config, "catsay", OsFamily::Linux));
        assert!(list_installed(&config, OsFamily::Linux).unwrap().is_empty());
    }

    #[test]
    fn test_binary_shape_detected_by_shim() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        fs::create_dir_all(&config.bin_dir).unwrap();
        fs::write(config.bin_dir.join("catsay.exe"), "x").unwrap();

        assert!(!is_installed(&config, "catsay", OsFamily::Linux));
        assert!(is_installed(&config, "catsay", OsFamily::Windows));
    }

    #[test]
    fn test_receipt_alone_is_not_installed() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let staged = StagedBinary {
            staged: config.bin_dir.join("catsay-cli"),
            shim: config.bin_dir.join("catsay"),
        };
        BinaryReceipt::new("catsay", "1.0", "a.zip", String::new(), &staged)
            .write(&config.receipts_dir)
            .unwrap();

        assert!(!is_installed(&config, "catsay", OsFamily::Linux));
        assert_eq!(installed_version(&config, "catsay"), Some("1.0".to_string()));
    }

    #[test]
    fn test_clone_shape_with_sidecar() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let pkg = package_dir(&config, "meow");
        fs::create_dir_all(&pkg).unwrap();
        let metadata = PackageMetadata {
            name: "meow".to_string(),
            version: "0.4.1".to_string(),
            installer: "install.sh".to_string(),
            ..Default::default()
        };
        write_sidecar(&pkg, &metadata).unwrap();

        assert!(is_installed(&config, "meow", OsFamily::Linux));
        assert_eq!(read_sidecar(&pkg).unwrap(), Some(metadata));
        assert_eq!(installed_version(&config, "meow"), Some("0.4.1".to_string()));
    }

    #[test]
    fn test_list_installed_both_shapes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        fs::create_dir_all(package_dir(&config, "zeta")).unwrap();
        fs::create_dir_all(&config.bin_dir).unwrap();
        fs::write(config.bin_dir.join("catsay-cli"), "x").unwrap();
        fs::write(config.bin_dir.join("catsay"), "x").unwrap();
        fs::write(config.bin_dir.join("loose"), "x").unwrap();
        let staged = StagedBinary {
            staged: config.bin_dir.join("catsay-cli"),
            shim: config.bin_dir.join("catsay"),
        };
        BinaryReceipt::new("catsay", "1.2.0", "a.zip", String::new(), &staged)
            .write(&config.receipts_dir)
            .unwrap();

        let list = list_installed(&config, OsFamily::Linux).unwrap();
        let summary: Vec<(&str, &str, InstallShape)> = list
            .iter()
            .map(|p| (p.name.as_str(), p.version.as_str(), p.shape))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("catsay", "1.2.0", InstallShape::Binary),
                ("loose", "unknown", InstallShape::Binary),
                ("zeta", "unknown", InstallShape::Clone),
            ]
        );
    }
}
