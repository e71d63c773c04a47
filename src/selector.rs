//! Release asset selection.
//!
//! Publishers name their release files inconsistently, so assets are scored
//! by substring against an ordered pattern list for the running platform,
//! most specific first:
//!
//! ```text
//! {os}-{arch}   linux-x64
//! {os}{arch}    linuxx64
//! {arch}        x64
//! {os}          linux
//! linux, win, osx, darwin, mac
//! ```
//!
//! An asset's score is the index of the first pattern its lower-cased name
//! contains. The lowest score wins. When nothing scores at all, the first
//! asset (registry order) is used. When several assets share the best score,
//! selection stops and hands the candidates back as
//! [`AssetSelection::NeedsOperatorChoice`]; the caller asks a human and
//! resolves the answer with [`parse_choice`].

use crate::error::{PurrError, Result};
use crate::platform::Platform;
use crate::release::ReleaseAsset;

const FALLBACK_PATTERNS: &[&str] = &["linux", "win", "osx", "darwin", "mac"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSelection {
    Chosen(ReleaseAsset),
    /// Equally good candidates, in input order
    NeedsOperatorChoice(Vec<ReleaseAsset>),
}

/// Ordered match patterns for `platform`
pub fn match_patterns(platform: Platform) -> Vec<String> {
    let os = platform.os.token();
    let arch = platform.arch.token();

    let mut patterns = vec![
        format!("{}-{}", os, arch),
        format!("{}{}", os, arch),
        arch.to_string(),
        os.to_string(),
    ];
    patterns.extend(FALLBACK_PATTERNS.iter().map(|p| p.to_string()));
    patterns
}

/// Index of the first pattern contained in `name`, if any
pub fn score(name: &str, patterns: &[String]) -> Option<usize> {
    let name = name.to_lowercase();
    patterns.iter().position(|p| name.contains(p.as_str()))
}

/// Pick the asset that best matches `platform`.
///
/// # Errors
///
/// [`PurrError::UnsupportedAsset`] when `assets` is empty.
pub fn select_asset(assets: &[ReleaseAsset], platform: Platform) -> Result<AssetSelection> {
    let Some(first) = assets.first() else {
        return Err(PurrError::UnsupportedAsset(
            "No release assets to choose from".to_string(),
        ));
    };

    let patterns = match_patterns(platform);
    let scored: Vec<(usize, &ReleaseAsset)> = assets
        .iter()
        .filter_map(|a| score(&a.name, &patterns).map(|s| (s, a)))
        .collect();

    let Some(best) = scored.iter().map(|(s, _)| *s).min() else {
        tracing::debug!("no asset matches {}, using {}", platform, first.name);
        return Ok(AssetSelection::Chosen(first.clone()));
    };

    let mut top: Vec<ReleaseAsset> = scored
        .into_iter()
        .filter(|(s, _)| *s == best)
        .map(|(_, a)| a.clone())
        .collect();
    tracing::debug!(
        "best pattern '{}' matched {} asset(s)",
        patterns[best],
        top.len()
    );

    if top.len() == 1 {
        Ok(AssetSelection::Chosen(top.remove(0)))
    } else {
        Ok(AssetSelection::NeedsOperatorChoice(top))
    }
}

/// Turn operator input into an index into `count` options.
///
/// Input is 1-based. Empty, non-numeric and out-of-range input all select the
/// first option.
pub fn parse_choice(input: &str, count: usize) -> usize {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => n - 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, OsFamily};

    fn assets(names: &[&str]) -> Vec<ReleaseAsset> {
        names
            .iter()
            .map(|n| ReleaseAsset::new(*n, format!("https://dl.example/{}", n)))
            .collect()
    }

    fn chosen_name(selection: AssetSelection) -> String {
        match selection {
            AssetSelection::Chosen(a) => a.name,
            other => panic!("expected a single choice, got {:?}", other),
        }
    }

    const LINUX_X64: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::X64,
    };
    const WIN_X64: Platform = Platform {
        os: OsFamily::Windows,
        arch: Arch::X64,
    };

    #[test]
    fn test_patterns_most_specific_first() {
        let patterns = match_patterns(LINUX_X64);
        assert_eq!(&patterns[..4], &["linux-x64", "linuxx64", "x64", "linux"]);
        assert_eq!(&patterns[4..], &["linux", "win", "osx", "darwin", "mac"]);
    }

    #[test]
    fn test_exact_platform_pair_wins() {
        let list = assets(&["tool-darwin-arm64.zip", "tool-linux-x64.zip", "tool-win-x64.zip"]);
        let selection = select_asset(&list, LINUX_X64).unwrap();
        assert_eq!(chosen_name(selection), "tool-linux-x64.zip");
    }

    #[test]
    fn test_score_is_case_insensitive() {
        let list = assets(&["README.md", "Tool-Linux-X64.tar.gz"]);
        assert_eq!(
            chosen_name(select_asset(&list, LINUX_X64).unwrap()),
            "Tool-Linux-X64.tar.gz"
        );
    }

    #[test]
    fn test_no_match_falls_back_to_first() {
        let list = assets(&["tool.jar", "tool-src.tar.gz"]);
        assert_eq!(chosen_name(select_asset(&list, LINUX_X64).unwrap()), "tool.jar");
    }

    #[test]
    fn test_empty_list_fails() {
        assert!(matches!(
            select_asset(&[], LINUX_X64),
            Err(PurrError::UnsupportedAsset(_))
        ));
    }

    #[test]
    fn test_x64_beats_x86_on_windows() {
        let list = assets(&["pkg-win-x86.zip", "pkg-win-x64.zip"]);
        assert_eq!(chosen_name(select_asset(&list, WIN_X64).unwrap()), "pkg-win-x64.zip");
    }

    #[test]
    fn test_genuine_tie_needs_operator() {
        let list = assets(&["tool-linux-x64.tar.gz", "tool-linux-x64-musl.tar.gz", "tool-win.zip"]);
        match select_asset(&list, LINUX_X64).unwrap() {
            AssetSelection::NeedsOperatorChoice(candidates) => {
                let names: Vec<_> = candidates.iter().map(|a| a.name.as_str()).collect();
                assert_eq!(names, vec!["tool-linux-x64.tar.gz", "tool-linux-x64-musl.tar.gz"]);
            }
            other => panic!("expected a tie, got {:?}", other),
        }
    }

    #[test]
    fn test_os_only_match() {
        let list = assets(&["tool-macos.zip", "tool-linux.zip"]);
        assert_eq!(chosen_name(select_asset(&list, LINUX_X64).unwrap()), "tool-linux.zip");
    }

    #[test]
    fn test_mac_host_prefers_osx_pair() {
        let mac_arm64 = Platform::new(OsFamily::MacOs, Arch::Arm64);
        let list = assets(&["tool-linux-arm64.zip", "tool-osx-arm64.zip"]);
        assert_eq!(
            chosen_name(select_asset(&list, mac_arm64).unwrap()),
            "tool-osx-arm64.zip"
        );
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("", 3), 0);
        assert_eq!(parse_choice("2", 3), 1);
        assert_eq!(parse_choice(" 3\n", 3), 2);
        assert_eq!(parse_choice("4", 3), 0);
        assert_eq!(parse_choice("0", 3), 0);
        assert_eq!(parse_choice("two", 3), 0);
    }
}
