//! PATH advice after installing into the user bin directory.
//!
//! Nothing here edits shell profiles. When the bin directory is missing from
//! `PATH`, the installer prints commands the user can run for the current
//! session and to persist the change, tailored to the detected shell.

use crate::platform::OsFamily;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    /// Any other POSIX shell; persisted through `~/.profile`
    Posix,
    PowerShell,
}

impl Shell {
    /// Detect the user's shell from the value of `SHELL`
    pub fn detect(os: OsFamily, shell_var: Option<&str>) -> Self {
        let name = shell_var
            .map(Path::new)
            .and_then(|p| p.file_name())
            .and_then(|f| f.to_str());

        match name {
            Some("zsh") => Self::Zsh,
            Some("bash") => Self::Bash,
            Some("fish") => Self::Fish,
            Some(_) => Self::Posix,
            None if os.is_windows() => Self::PowerShell,
            None => Self::Posix,
        }
    }

    fn profile(self) -> &'static str {
        match self {
            Self::Zsh => "~/.zshrc",
            Self::Bash => "~/.bashrc",
            Self::Fish => "~/.config/fish/config.fish",
            Self::Posix => "~/.profile",
            Self::PowerShell => "$PROFILE",
        }
    }
}

/// One suggested command with a short label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub label: String,
    pub command: String,
}

fn advice(label: impl Into<String>, command: impl Into<String>) -> Advice {
    Advice {
        label: label.into(),
        command: command.into(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let trimmed = path
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .to_string();
    PathBuf::from(trimmed)
}

/// Whether `dir` is one of the entries of `path_var`
pub fn is_on_path(dir: &Path, path_var: &OsStr) -> bool {
    let wanted = normalize(dir);
    std::env::split_paths(path_var).any(|entry| normalize(&entry) == wanted)
}

/// Commands that would put `bin_dir` on PATH for `shell`
pub fn path_advice(bin_dir: &Path, shell: Shell) -> Vec<Advice> {
    let dir = bin_dir.display();
    match shell {
        Shell::PowerShell => vec![
            advice(
                "this session",
                format!("$env:Path = \"{};$env:Path\"", dir),
            ),
            advice("permanently", format!("setx PATH \"{};%PATH%\"", dir)),
        ],
        Shell::Fish => vec![
            advice("this session", format!("set -gx PATH \"{}\" $PATH", dir)),
            advice("permanently", format!("fish_add_path \"{}\"", dir)),
        ],
        posix => vec![
            advice("this session", format!("export PATH=\"{}:$PATH\"", dir)),
            advice(
                "permanently",
                format!(
                    "echo 'export PATH=\"{}:$PATH\"' >> {}",
                    dir,
                    posix.profile()
                ),
            ),
        ],
    }
}

/// Advice for the running process environment, or `None` when `bin_dir` is
/// already on PATH.
pub fn advice_for_environment(bin_dir: &Path, os: OsFamily) -> Option<(Shell, Vec<Advice>)> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    if is_on_path(bin_dir, &path_var) {
        tracing::debug!("{} is on PATH", bin_dir.display());
        return None;
    }

    let shell_var = std::env::var("SHELL").ok();
    let shell = Shell::detect(os, shell_var.as_deref());
    Some((shell, path_advice(bin_dir, shell)))
}
