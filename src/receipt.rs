//! Install receipts for binary-shape packages.
//!
//! A release-asset install leaves two files in the bin directory whose names
//! need not match the package (`catsay-cli` plus the `catsay` shim). The
//! receipt records them so uninstall can remove exactly what was written:
//!
//! ```text
//! ~/.purr/receipts/catsay.json
//! {
//!   "name": "catsay",
//!   "version": "1.2.0",
//!   "staged_file": "catsay-cli",
//!   "shim_file": "catsay",
//!   "asset": "catsay-linux-x64.zip",
//!   "sha256": "9f86d0...",
//!   "installed_at": "2026-03-01T12:00:00Z",
//!   "purr_version": "purr/0.3.0"
//! }
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use purr::receipt::BinaryReceipt;
//! use std::path::Path;
//!
//! fn main() -> purr::error::Result<()> {
//!     if let Some(receipt) = BinaryReceipt::read(Path::new("/home/me/.purr/receipts"), "catsay")? {
//!         println!("{} {} from {}", receipt.name, receipt.version, receipt.asset);
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::{PurrError, Result};
use crate::stage::StagedBinary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryReceipt {
    pub name: String,
    pub version: String,
    pub staged_file: String,
    pub shim_file: String,
    /// Release asset the binary came from
    pub asset: String,
    /// SHA-256 of the staged file
    pub sha256: String,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub purr_version: String,
}

impl BinaryReceipt {
    pub fn new(
        name: &str,
        version: &str,
        asset: &str,
        sha256: String,
        staged: &StagedBinary,
    ) -> Self {
        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        Self {
            name: name.to_string(),
            version: version.to_string(),
            staged_file: file_name(&staged.staged),
            shim_file: file_name(&staged.shim),
            asset: asset.to_string(),
            sha256,
            installed_at: Utc::now(),
            purr_version: format!("purr/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn path(receipts_dir: &Path, name: &str) -> PathBuf {
        receipts_dir.join(format!("{}.json", name))
    }

    /// Files this receipt owns in the bin directory
    pub fn files(&self) -> Vec<String> {
        let mut files = vec![self.staged_file.clone()];
        if self.shim_file != self.staged_file {
            files.push(self.shim_file.clone());
        }
        files.retain(|f| !f.is_empty());
        files
    }

    /// Read the receipt for `name`, if one was written.
    pub fn read(receipts_dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::path(receipts_dir, name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PurrError::fs(
                    format!("Failed to read receipt {}", path.display()),
                    e,
                ));
            }
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn write(&self, receipts_dir: &Path) -> Result<()> {
        fs::create_dir_all(receipts_dir).map_err(|e| {
            PurrError::fs(format!("Failed to create {}", receipts_dir.display()), e)
        })?;

        let path = Self::path(receipts_dir, &self.name);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .map_err(|e| PurrError::fs(format!("Failed to write receipt {}", path.display()), e))?;
        tracing::debug!("wrote receipt {}", path.display());
        Ok(())
    }

    /// Delete the receipt for `name`. Returns whether one existed.
    pub fn remove(receipts_dir: &Path, name: &str) -> Result<bool> {
        let path = Self::path(receipts_dir, name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PurrError::fs(
                format!("Failed to remove receipt {}", path.display()),
                e,
            )),
        }
    }

    /// Every readable receipt in `receipts_dir`. Unreadable ones are skipped
    /// with a warning.
    pub fn list(receipts_dir: &Path) -> Result<Vec<Self>> {
        let entries = match fs::read_dir(receipts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PurrError::fs(
                    format!("Failed to read {}", receipts_dir.display()),
                    e,
                ));
            }
        };

        let mut receipts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(PurrError::from)
                .and_then(|s| serde_json::from_str::<Self>(&s).map_err(PurrError::from));
            match parsed {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => tracing::warn!("skipping receipt {}: {}", path.display(), e),
            }
        }
        receipts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged(bin: &Path, staged: &str, shim: &str) -> StagedBinary {
        StagedBinary {
            staged: bin.join(staged),
            shim: bin.join(shim),
        }
    }

    #[test]
    fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let receipts = dir.path().join("receipts");
        let receipt = BinaryReceipt::new(
            "catsay",
            "1.2.0",
            "catsay-linux-x64.zip",
            "abc".to_string(),
            &staged(Path::new("/bin"), "catsay-cli", "catsay"),
        );
        receipt.write(&receipts).unwrap();

        let read = BinaryReceipt::read(&receipts, "catsay").unwrap().unwrap();
        assert_eq!(read, receipt);
        assert_eq!(read.files(), vec!["catsay-cli", "catsay"]);
        assert!(read.purr_version.starts_with("purr/"));

        assert!(BinaryReceipt::remove(&receipts, "catsay").unwrap());
        assert!(!BinaryReceipt::remove(&receipts, "catsay").unwrap());
        assert!(BinaryReceipt::read(&receipts, "catsay").unwrap().is_none());
    }

    #[test]
    fn test_files_deduplicates_identical_names() {
        let receipt = BinaryReceipt::new(
            "tool",
            "1.0",
            "tool",
            String::new(),
            &staged(Path::new("/bin"), "tool", "tool"),
        );
        assert_eq!(receipt.files(), vec!["tool"]);
    }

    #[test]
    fn test_list_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let receipt = BinaryReceipt::new(
            "b",
            "2.0",
            "b.zip",
            String::new(),
            &staged(Path::new("/bin"), "b", "b"),
        );
        receipt.write(dir.path()).unwrap();
        fs::write(dir.path().join("a.json"), "not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let list = BinaryReceipt::list(dir.path()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "b");
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(BinaryReceipt::list(&dir.path().join("nope")).unwrap().is_empty());
    }
}
