//! Package specs (`name[@version]`) and registry package metadata.

use crate::error::{PurrError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version value meaning "whatever is newest"
pub const LATEST: &str = "latest";

/// A package request as typed on the command line: `name` or `name@version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse `name[@version]`.
    ///
    /// Only the first `@` separates name from version; anything after a second
    /// `@` is ignored. An empty version (`foo@`) means no version.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut parts = input.split('@');
        let name = parts.next().unwrap_or_default().trim();
        validate_name(name).map_err(|_| PurrError::InvalidSpec(input.to_string()))?;

        let version = parts
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        if parts.next().is_some() {
            tracing::warn!("ignoring trailing '@' segments in '{}'", input);
        }

        Ok(Self::new(name, version))
    }

    /// The pinned version, unless it is absent or `latest`
    pub fn pinned_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !is_latest(v))
    }
}

impl FromStr for PackageSpec {
    type Err = PurrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Check that `name` can be used as a single path component under the
/// packages, bin and receipts directories.
///
/// # Errors
///
/// [`PurrError::InvalidSpec`] for empty names, `.`, `..`, and names containing
/// a path separator.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains(std::path::MAIN_SEPARATOR);
    if invalid {
        return Err(PurrError::InvalidSpec(name.to_string()));
    }
    Ok(())
}

/// `true` for an empty version or the literal `latest`
pub fn is_latest(version: &str) -> bool {
    version.is_empty() || version.eq_ignore_ascii_case(LATEST)
}

/// Package metadata as served by the registry.
///
/// The same document is persisted as `purrconfig.json` inside source
/// checkouts so later uninstalls can find the declared installer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub homepage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue_tracker: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub git: String,
    /// Installer script path relative to the checkout; empty for binary packages
    #[serde(default, deserialize_with = "null_as_default")]
    pub installer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    /// Declared entry-point filename inside release archives
    #[serde(default, rename = "mainfile", alias = "main_file")]
    pub main_file: Option<String>,
}

/// `null` reads as the default, the same as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PackageMetadata {
    pub fn has_installer(&self) -> bool {
        !self.installer.trim().is_empty()
    }

    /// Name of the uninstall script that pairs with the declared installer
    /// (`install.sh` -> `uninstall.sh`).
    pub fn uninstaller(&self) -> Option<String> {
        if !self.has_installer() {
            return None;
        }
        Some(self.installer.replace("install", "uninstall"))
    }

    /// Declared entry point, ignoring blank values
    pub fn main_file(&self) -> Option<&str> {
        self.main_file.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}
