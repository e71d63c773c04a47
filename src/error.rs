use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PurrError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The release-asset path cannot handle this package. The caller may fall
    /// back to a source checkout.
    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("Unsupported script type '{extension}': {}", path.display())]
    UnsupportedScript { path: PathBuf, extension: String },

    #[error("Script {} exited with code {code}", path.display())]
    ScriptFailed { path: PathBuf, code: i32 },

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Invalid package spec: {0}")]
    InvalidSpec(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PurrError {
    /// Wrap an I/O failure with a description of what was being attempted.
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }

    /// Failures of the release-asset path that should trigger a source clone
    /// instead of aborting the install.
    pub fn is_recoverable_asset_failure(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAsset(_) | Self::Network(_) | Self::Archive(_) | Self::Json(_)
        )
    }
}

impl From<zip::result::ZipError> for PurrError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PurrError>;
