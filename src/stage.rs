//! Staging release binaries into the user bin directory.
//!
//! A downloaded asset is either an archive or the executable itself. For
//! archives, the extracted tree is searched for the file to run:
//!
//! 1. Files that are clearly not programs (docs, checksums, debug symbols,
//!    license files) are never candidates.
//! 2. With a declared entry point, an exact file-name match is tried first,
//!    then a match ignoring extensions.
//! 3. Otherwise every file shaped like an executable for this platform is a
//!    candidate (extensionless on Unix, `.exe`/`.cmd`/`.bat` on Windows, plus
//!    common script extensions).
//!
//! Candidates are ranked extensionless first, then the native executable
//! extension, then anything else. Ties prefer a file named after the package,
//! then one with an execute bit, then path order.
//!
//! The winner is copied into the bin directory under its own name and a
//! second copy named after the package is written next to it, so the package
//! can always be run by name:
//!
//! ```text
//! ~/.purr/bin/
//!   catsay-cli     # staged file, original name
//!   catsay         # shim, identical content
//! ```

use crate::error::{PurrError, Result};
use crate::extract::{self, ArchiveFormat};
use crate::platform::OsFamily;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Extensions that never hold the program itself
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "pdb", "dbg", "debug", "dsym", "sym", "map", "manifest", "md", "markdown", "txt", "rst",
    "html", "htm", "pdf", "json", "yml", "yaml", "toml", "xml", "ini", "cfg", "conf", "sha256",
    "sha512", "sha1", "md5", "sig", "asc", "pem", "crt", "h", "a", "lib", "o", "ico", "png",
    "svg", "jpg", "jpeg", "gif", "license", "lock",
];

/// File stems that are documentation regardless of extension
const EXCLUDED_STEMS: &[&str] = &[
    "readme",
    "license",
    "licence",
    "copying",
    "changelog",
    "changes",
    "notice",
    "authors",
    "contributors",
    "third_party_licenses",
];

const SCRIPT_EXTENSIONS: &[&str] = &["sh", "py", "js", "rb", "pl", "bin", "run", "appimage"];
const WINDOWS_EXTENSIONS: &[&str] = &["exe", "cmd", "bat", "ps1", "com"];

/// A staged executable and its name-stable shim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBinary {
    pub staged: PathBuf,
    pub shim: PathBuf,
}

impl StagedBinary {
    /// File names this install owns in the bin directory
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [&self.staged, &self.shim]
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.dedup();
        names
    }
}

/// Lower-cased extension, if the file has a plausible one. Version-like
/// suffixes such as `tool-1.2.3-linux` do not count as extensions.
fn extension_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn stem_of(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match extension_of(path) {
        Some(ext) => name[..name.len() - ext.len() - 1].to_string(),
        None => name,
    }
}

fn is_excluded(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    if name.starts_with('.') {
        return true;
    }

    if let Some(ext) = extension_of(path) {
        // Single-digit extensions are man pages (tool.1)
        if EXCLUDED_EXTENSIONS.contains(&ext.as_str())
            || (ext.len() == 1 && ext.chars().all(|c| c.is_ascii_digit()))
        {
            return true;
        }
    }

    let stem = stem_of(path).to_ascii_lowercase();
    EXCLUDED_STEMS.contains(&stem.as_str())
}

/// 0 = extensionless, 1 = native executable extension, 2 = anything else
fn preference_rank(path: &Path, os: OsFamily) -> u8 {
    match (extension_of(path), os.native_exe_extension()) {
        (None, _) => 0,
        (Some(ext), Some(native)) if ext == native => 1,
        _ => 2,
    }
}

fn has_exec_bit(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}

fn is_executable_shape(path: &Path, os: OsFamily) -> bool {
    match extension_of(path) {
        None => !os.is_windows(),
        Some(ext) => {
            SCRIPT_EXTENSIONS.contains(&ext.as_str())
                || (os.is_windows() && WINDOWS_EXTENSIONS.contains(&ext.as_str()))
        }
    }
}

fn best_candidate<'a>(
    candidates: impl IntoIterator<Item = &'a PathBuf>,
    package_name: &str,
    os: OsFamily,
) -> Option<&'a PathBuf> {
    candidates.into_iter().min_by_key(|path| {
        let named_after_package = stem_of(path).eq_ignore_ascii_case(package_name);
        (
            preference_rank(path, os),
            !named_after_package,
            !has_exec_bit(path),
            path.to_path_buf(),
        )
    })
}

/// Pick the file to run among `files` (an extracted archive).
///
/// # Errors
///
/// [`PurrError::UnsupportedAsset`] when no file qualifies.
pub fn find_executable(
    files: &[PathBuf],
    package_name: &str,
    main_file: Option<&str>,
    os: OsFamily,
) -> Result<PathBuf> {
    let eligible: Vec<&PathBuf> = files.iter().filter(|f| !is_excluded(f)).collect();

    if let Some(main) = main_file {
        let file_name_matches = |path: &Path, wanted: &str| {
            path.file_name().is_some_and(|n| {
                let n = n.to_string_lossy();
                if os.is_windows() {
                    n.eq_ignore_ascii_case(wanted)
                } else {
                    n == wanted
                }
            })
        };

        let exact: Vec<&PathBuf> = eligible
            .iter()
            .copied()
            .filter(|f| file_name_matches(f, main))
            .collect();
        if let Some(found) = best_candidate(exact, package_name, os) {
            tracing::debug!("entry point {} found at {}", main, found.display());
            return Ok(found.clone());
        }

        let wanted_stem = stem_of(Path::new(main));
        let loose: Vec<&PathBuf> = eligible
            .iter()
            .copied()
            .filter(|f| stem_of(f).eq_ignore_ascii_case(&wanted_stem))
            .collect();
        if let Some(found) = best_candidate(loose, package_name, os) {
            tracing::debug!("entry point {} matched {}", main, found.display());
            return Ok(found.clone());
        }

        tracing::debug!("declared entry point {} not found, guessing", main);
    }

    let shaped = eligible
        .iter()
        .copied()
        .filter(|f| is_executable_shape(f, os));
    best_candidate(shaped, package_name, os)
        .cloned()
        .ok_or_else(|| {
            PurrError::UnsupportedAsset("No executable found inside archive asset".to_string())
        })
}

/// Name of the shim for `package_name`. On Windows the staged file's
/// extension is kept so `.cmd` shims stay runnable.
pub fn shim_file_name(package_name: &str, staged: &Path, os: OsFamily) -> String {
    match os.native_exe_extension() {
        Some(native) => {
            let ext = extension_of(staged).unwrap_or_else(|| native.to_string());
            format!("{}.{}", package_name, ext)
        }
        None => package_name.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    Copy,
    Move,
}

/// Put `source` into `bin_dir` under its own name, mark it executable and
/// write the package-named shim beside it.
pub fn stage_executable(
    source: &Path,
    bin_dir: &Path,
    package_name: &str,
    os: OsFamily,
    mode: StageMode,
) -> Result<StagedBinary> {
    fs::create_dir_all(bin_dir)
        .map_err(|e| PurrError::fs(format!("Failed to create {}", bin_dir.display()), e))?;

    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("No file name in {}", source.display()))?;
    let staged = bin_dir.join(file_name);

    tracing::debug!(
        "{} {} -> {}",
        if mode == StageMode::Move { "move" } else { "copy" },
        source.display(),
        staged.display()
    );
    match mode {
        StageMode::Copy => copy_file(source, &staged)?,
        StageMode::Move => move_file(source, &staged)?,
    }
    make_executable(&staged)?;

    let shim = bin_dir.join(shim_file_name(package_name, &staged, os));
    if shim != staged {
        match fs::remove_file(&shim) {
            Ok(()) => tracing::debug!("replaced existing shim {}", shim.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove old shim {}: {}", shim.display(), e),
        }
        tracing::debug!("copy {} -> {}", staged.display(), shim.display());
        copy_file(&staged, &shim)?;
        make_executable(&shim)?;
    }

    Ok(StagedBinary { staged, shim })
}

/// Install a downloaded asset: extract and search archives, stage bare files
/// directly. `scratch` receives extracted archive contents.
pub fn install_asset(
    asset_path: &Path,
    scratch: &Path,
    package_name: &str,
    main_file: Option<&str>,
    bin_dir: &Path,
    os: OsFamily,
) -> Result<StagedBinary> {
    match ArchiveFormat::detect(asset_path) {
        Some(format) => {
            let files = extract::extract_archive(asset_path, format, &scratch.join("extracted"))?;
            tracing::debug!("archive contains {} files", files.len());
            let exe = find_executable(&files, package_name, main_file, os)?;
            stage_executable(&exe, bin_dir, package_name, os, StageMode::Copy)
        }
        None => stage_executable(asset_path, bin_dir, package_name, os, StageMode::Move),
    }
}

/// Delete binary-shape artifacts for `package_name`: the bare name, the
/// `.exe` name, the `.pdb` sidecar and any `extra` file names. Returns what
/// was removed.
pub fn remove_binaries(bin_dir: &Path, package_name: &str, extra: &[String]) -> Result<Vec<PathBuf>> {
    let mut names = vec![
        package_name.to_string(),
        format!("{}.exe", package_name),
        format!("{}.pdb", package_name),
    ];
    for name in extra {
        // Receipt names are plain file names; refuse anything else
        if Path::new(name).file_name().is_some_and(|n| n == name.as_str())
            && !names.contains(name)
        {
            names.push(name.clone());
        }
    }

    let mut removed = Vec::new();
    for name in names {
        let path = bin_dir.join(&name);
        tracing::debug!("checking {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PurrError::fs(
                    format!("Failed to remove {}", path.display()),
                    e,
                ));
            }
        }
    }
    Ok(removed)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        PurrError::fs(
            format!("Failed to copy {} to {}", from.display(), to.display()),
            e,
        )
    })
}

/// Rename, falling back to copy + delete across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_file(from, to)?;
    if let Err(e) = fs::remove_file(from) {
        tracing::debug!("could not remove {}: {}", from.display(), e);
    }
    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .map_err(|e| PurrError::fs(format!("Failed to stat {}", path.display()), e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms).map_err(|e| {
            PurrError::fs(format!("Failed to mark {} executable", path.display()), e)
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/x").join(n)).collect()
    }

    fn file_name(path: &Path) -> &str {
        path.file_name().unwrap().to_str().unwrap()
    }

    #[test]
    fn test_extension_ignores_version_suffix() {
        assert_eq!(extension_of(Path::new("tool.exe")), Some("exe".to_string()));
        assert_eq!(extension_of(Path::new("tool-1.2.3-linux")), None);
        assert_eq!(extension_of(Path::new("tool")), None);
        assert_eq!(stem_of(Path::new("tool.exe")), "tool");
        assert_eq!(stem_of(Path::new("tool-1.2.3-linux")), "tool-1.2.3-linux");
    }

    #[test]
    fn test_docs_and_checksums_excluded() {
        let files = paths(&["README", "LICENSE.txt", "tool.sha256", "tool.1", "CHANGELOG.md"]);
        assert!(files.iter().all(|f| is_excluded(f)));
        assert!(!is_excluded(Path::new("/x/tool")));
    }

    #[test]
    fn test_finds_extensionless_binary_on_linux() {
        let files = paths(&["bar/README.md", "bar/LICENSE", "bar/bar", "bar/completions/bar.fish"]);
        let exe = find_executable(&files, "bar", None, OsFamily::Linux).unwrap();
        assert_eq!(exe, PathBuf::from("/x/bar/bar"));
    }

    #[test]
    fn test_prefers_exe_on_windows() {
        let files = paths(&["tool.exe", "tool.pdb", "install.ps1", "tool.md"]);
        let exe = find_executable(&files, "tool", None, OsFamily::Windows).unwrap();
        assert_eq!(file_name(&exe), "tool.exe");
    }

    #[test]
    fn test_declared_main_file_exact_match() {
        let files = paths(&["a/helper", "a/meow", "a/meow.sh"]);
        let exe = find_executable(&files, "catsay", Some("meow.sh"), OsFamily::Linux).unwrap();
        assert_eq!(file_name(&exe), "meow.sh");
    }

    #[test]
    fn test_declared_main_file_ignoring_extension() {
        // Declared as meow.exe, shipped as meow on Linux
        let files = paths(&["helper", "meow", "meow.bat"]);
        let exe = find_executable(&files, "catsay", Some("meow.exe"), OsFamily::Linux).unwrap();
        assert_eq!(file_name(&exe), "meow");
    }

    #[test]
    fn test_missing_main_file_falls_back_to_guess() {
        let files = paths(&["docs/guide.html", "catsay"]);
        let exe = find_executable(&files, "catsay", Some("nope"), OsFamily::Linux).unwrap();
        assert_eq!(file_name(&exe), "catsay");
    }

    #[test]
    fn test_package_name_breaks_ties() {
        let files = paths(&["aaa-helper", "catsay"]);
        let exe = find_executable(&files, "catsay", None, OsFamily::Linux).unwrap();
        assert_eq!(file_name(&exe), "catsay");
    }

    #[test]
    fn test_no_candidate_is_unsupported() {
        let files = paths(&["README.md", "tool.dll", "tool.exe"]);
        let err = find_executable(&files, "tool", None, OsFamily::Linux).unwrap_err();
        assert!(matches!(err, PurrError::UnsupportedAsset(_)));
    }

    #[test]
    fn test_shim_names() {
        assert_eq!(shim_file_name("cat", Path::new("cat-cli"), OsFamily::Linux), "cat");
        assert_eq!(shim_file_name("cat", Path::new("cat-cli.exe"), OsFamily::Windows), "cat.exe");
        assert_eq!(shim_file_name("cat", Path::new("cat.cmd"), OsFamily::Windows), "cat.cmd");
        assert_eq!(shim_file_name("cat", Path::new("cat"), OsFamily::Windows), "cat.exe");
    }

    #[test]
    fn test_stage_creates_identical_shim() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("catsay-cli");
        fs::write(&source, "#!/bin/sh\necho meow\n").unwrap();
        let bin = dir.path().join("bin");

        let staged =
            stage_executable(&source, &bin, "catsay", OsFamily::Linux, StageMode::Copy).unwrap();
        assert_eq!(staged.staged, bin.join("catsay-cli"));
        assert_eq!(staged.shim, bin.join("catsay"));
        assert_eq!(
            fs::read(&staged.staged).unwrap(),
            fs::read(&staged.shim).unwrap()
        );
        assert!(source.exists());

        #[cfg(unix)]
        assert!(has_exec_bit(&staged.shim));
    }

    #[test]
    fn test_stage_skips_shim_when_paths_coincide() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("catsay");
        fs::write(&source, "bin").unwrap();
        let bin = dir.path().join("bin");

        let staged =
            stage_executable(&source, &bin, "catsay", OsFamily::Linux, StageMode::Move).unwrap();
        assert_eq!(staged.staged, staged.shim);
        assert_eq!(staged.file_names(), vec!["catsay".to_string()]);
        assert!(!source.exists());
        assert_eq!(fs::read_dir(&bin).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_binaries_includes_extras() {
        let dir = TempDir::new().unwrap();
        for name in ["catsay", "catsay-cli", "catsay.pdb", "other"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = remove_binaries(
            dir.path(),
            "catsay",
            &["catsay-cli".to_string(), "../other".to_string()],
        )
        .unwrap();
        assert_eq!(removed.len(), 3);
        assert!(dir.path().join("other").exists());
        assert!(!dir.path().join("catsay-cli").exists());
    }
}
