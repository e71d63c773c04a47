//! Library interface for the purr package installer
//!
//! The binary is a thin clap front end over these modules; integration tests
//! and benchmarks use them directly.

pub mod api;
pub mod colors;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod installed;
pub mod package;
pub mod package_manager;
pub mod platform;
pub mod process;
pub mod receipt;
pub mod release;
pub mod script;
pub mod selector;
pub mod shellenv;
pub mod source;
pub mod stage;

// Re-export commonly used types
pub use error::{PurrError, Result};
pub use package::{PackageMetadata, PackageSpec};
pub use package_manager::PackageManager;
