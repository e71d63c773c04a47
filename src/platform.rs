//! Platform detection for release-asset selection and executable staging.
//!
//! Release assets are usually named after the platform they target, but
//! publishers disagree on spelling: `linux-x64`, `linux_amd64`, `darwin-arm64`,
//! `win64`... This module reports the running OS family and CPU architecture
//! as the short tokens the asset selector matches against lower-cased asset
//! names.
//!
//! # Tokens
//!
//! | OS      | token   |   | arch      | token   |
//! |---------|---------|---|-----------|---------|
//! | Linux   | `linux` |   | `x86_64`  | `x64`   |
//! | macOS   | `osx`   |   | `aarch64` | `arm64` |
//! | Windows | `win`   |   | `x86`     | `x86`   |
//!
//! Architectures without a common short name use the `std::env::consts::ARCH`
//! string (`riscv64`, `s390x`, ...).
//!
//! # Examples
//!
//! ```
//! use purr::platform::Platform;
//!
//! let platform = Platform::current();
//! println!("{}-{}", platform.os.token(), platform.arch.token());
//! ```

use std::fmt;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    /// Token used in asset names
    pub fn token(self) -> &'static str {
        match self {
            Self::Linux | Self::Other => "linux",
            Self::MacOs => "osx",
            Self::Windows => "win",
        }
    }

    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }

    /// Extension of natively executable files, if the platform has one
    pub fn native_exe_extension(self) -> Option<&'static str> {
        match self {
            Self::Windows => Some("exe"),
            _ => None,
        }
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Arm64,
    X86,
    Arm,
    Other,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => Self::X64,
            "aarch64" => Self::Arm64,
            "x86" => Self::X86,
            "arm" => Self::Arm,
            _ => Self::Other,
        }
    }

    /// Token used in asset names
    pub fn token(self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::X86 => "x86",
            Self::Arm => "arm",
            Self::Other => std::env::consts::ARCH,
        }
    }
}

/// OS family and architecture of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this binary is running on
    pub fn current() -> Self {
        Self::new(OsFamily::current(), Arch::current())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.token(), self.arch.token())
    }
}
