use crate::commands::{is_tty, spinner};
use crate::error::{PurrError, Result};
use crate::installed::{self, InstallShape};
use crate::package::PackageMetadata;
use crate::package_manager::PackageManager;
use colored::Colorize;

/// Registry names closest to `name`, best first
pub fn closest_names(name: &str, candidates: &[String], limit: usize) -> Vec<String> {
    let wanted = name.to_lowercase();
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .filter(|c| !c.eq_ignore_ascii_case(name))
        .filter_map(|candidate| {
            let lower = candidate.to_lowercase();
            let similarity = strsim::jaro_winkler(&wanted, &lower);
            let close = strsim::levenshtein(&wanted, &lower) <= 2 || lower.contains(&wanted);
            (similarity >= 0.85 || close).then_some((similarity, candidate))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, c)| c.clone())
        .collect()
}

/// Print "did you mean" hints for an unknown package name
pub async fn print_suggestions(pm: &PackageManager, name: &str) {
    let listing = pm.registry().list_packages(None).await;
    let suggestions = closest_names(name, &listing.packages, 3);
    if suggestions.is_empty() {
        return;
    }
    println!(
        "{} Did you mean: {}?",
        "→".cyan(),
        suggestions
            .iter()
            .map(|s| s.bold().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn print_package_line(meta: &PackageMetadata) {
    let mut line = meta.name.bold().green().to_string();
    if !meta.version.is_empty() {
        line.push_str(&format!(" {}", meta.version.dimmed()));
    }
    if !meta.description.is_empty() {
        line.push_str(&format!(" - {}", meta.description));
    }
    println!("{}", line);
}

pub async fn search(pm: &PackageManager, query: &str) -> Result<()> {
    let pb = spinner(format!("Searching for '{}'...", query));
    let results = pm.registry().search(query).await;
    pb.finish_and_clear();

    if results.is_empty() {
        println!("{} No packages found matching '{}'", "✗".red(), query);
        return Ok(());
    }

    if is_tty() {
        println!(
            "{} {} result(s)",
            "==>".bold().green(),
            results.package_count.max(results.packages.len() as u64)
        );
    }
    if results.details.is_empty() {
        for name in &results.packages {
            println!("{}", name);
        }
    } else {
        for meta in &results.details {
            print_package_line(meta);
        }
    }
    Ok(())
}

pub async fn list(
    pm: &PackageManager,
    sort: Option<&str>,
    category: Option<&str>,
    installed_only: bool,
) -> Result<()> {
    if installed_only {
        return list_installed(pm);
    }

    if let Some(category) = category {
        let pb = spinner(format!("Fetching category '{}'...", category));
        let packages = pm.registry().packages_in_category(category).await;
        pb.finish_and_clear();

        if packages.is_empty() {
            println!("{} No packages in category '{}'", "✗".red(), category);
            return Ok(());
        }
        println!("{} {}", "==>".bold().green(), category.bold());
        for meta in &packages {
            print_package_line(meta);
        }
        return Ok(());
    }

    let pb = spinner("Fetching packages...");
    let listing = pm.registry().list_packages(sort).await;
    pb.finish_and_clear();

    if listing.packages.is_empty() {
        println!("{} No packages available", "✗".red());
        return Ok(());
    }
    for name in &listing.packages {
        println!("{}", name);
    }
    Ok(())
}

fn list_installed(pm: &PackageManager) -> Result<()> {
    let packages = installed::list_installed(pm.config(), pm.platform().os)?;
    if packages.is_empty() {
        println!("No packages installed");
        return Ok(());
    }

    for pkg in &packages {
        let shape = match pkg.shape {
            InstallShape::Binary => "binary",
            InstallShape::Clone => "clone",
        };
        let when = pkg
            .installed_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{} {} {} {} {}",
            pkg.name.bold(),
            pkg.version.cyan(),
            format!("[{}]", shape).dimmed(),
            pkg.path.display(),
            when.dimmed()
        );
    }
    Ok(())
}

pub async fn info(pm: &PackageManager, name: &str, version: Option<&str>) -> Result<()> {
    let pb = spinner(format!("Fetching {}...", name));
    let result = pm.registry().package_info(name, version).await;
    pb.finish_and_clear();

    let meta = match result {
        Ok(meta) => meta,
        Err(e @ PurrError::NotFound(_)) => {
            print_suggestions(pm, name).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    println!(
        "{} {} {}",
        "==>".bold().green(),
        meta.name.bold(),
        meta.version.cyan()
    );
    if !meta.description.is_empty() {
        println!("{}", meta.description);
    }

    let field = |label: &str, value: &str| {
        if !value.is_empty() {
            println!("{} {}", format!("{}:", label).bold(), value);
        }
    };
    field("Authors", &meta.authors.join(", "));
    field("Homepage", &meta.homepage);
    field("Issues", &meta.issue_tracker);
    field("Repository", &meta.git);
    field("Installer", &meta.installer);
    field("Main file", meta.main_file().unwrap_or_default());
    field("Dependencies", &meta.dependencies.join(", "));
    field("Categories", &meta.categories.join(", "));

    let os = pm.platform().os;
    if installed::is_installed(pm.config(), &meta.name, os) {
        let local = installed::installed_version(pm.config(), &meta.name)
            .unwrap_or_else(|| "unknown".to_string());
        println!("{} {}", "Installed:".bold(), local.green());
    } else {
        println!("{} {}", "Installed:".bold(), "no".dimmed());
    }
    Ok(())
}

pub async fn versions(pm: &PackageManager, name: &str) -> Result<()> {
    let pb = spinner(format!("Fetching versions of {}...", name));
    let versions = pm.registry().versions(name).await;
    pb.finish_and_clear();

    if versions.is_empty() {
        println!("{} No versions found for {}", "✗".red(), name.bold());
        return Ok(());
    }

    let local = installed::installed_version(pm.config(), name);
    for version in &versions {
        if local.as_deref() == Some(version.as_str()) {
            println!("{} {}", version.bold().green(), "(installed)".dimmed());
        } else {
            println!("{}", version);
        }
    }
    Ok(())
}

pub async fn stats(pm: &PackageManager) -> Result<()> {
    let pb = spinner("Fetching registry statistics...");
    let stats = pm.registry().statistics().await;
    pb.finish_and_clear();

    let Some(stats) = stats else {
        println!("{} Could not fetch registry statistics", "✗".red());
        return Ok(());
    };

    println!("{}", "==> Registry statistics".bold().green());
    println!("{:<18} {}", "Packages:", stats.total_packages);
    println!("{:<18} {}", "Active packages:", stats.active_packages);
    println!("{:<18} {}", "Downloads:", stats.total_downloads);
    println!("{:<18} {}", "Views:", stats.total_views);
    if let Some(updated) = stats.last_updated {
        println!("{:<18} {}", "Last updated:", updated.format("%Y-%m-%d %H:%M UTC"));
    }

    if !stats.most_downloaded.is_empty() {
        println!("\n{}", "Most downloaded".bold());
        for entry in &stats.most_downloaded {
            println!("  {:<24} {}", entry.name, entry.downloads);
        }
    }
    if !stats.recently_added.is_empty() {
        println!("\n{}", "Recently added".bold());
        for entry in &stats.recently_added {
            println!("  {:<24} {}", entry.name, entry.version);
        }
    }
    if !stats.popular_authors.is_empty() {
        println!("\n{} {}", "Popular authors:".bold(), stats.popular_authors.join(", "));
    }
    Ok(())
}

pub async fn categories(pm: &PackageManager) -> Result<()> {
    let pb = spinner("Fetching categories...");
    let categories = pm.registry().categories().await;
    pb.finish_and_clear();

    if categories.is_empty() {
        println!("{} No categories available", "✗".red());
        return Ok(());
    }
    for category in &categories {
        println!("{}", category);
    }
    Ok(())
}

pub fn config(pm: &PackageManager) -> Result<()> {
    let config = pm.config();
    println!("{:<12} {}", "home:", config.home.display());
    println!("{:<12} {}", "bin:", config.bin_dir.display());
    println!("{:<12} {}", "packages:", config.packages_dir.display());
    println!("{:<12} {}", "receipts:", config.receipts_dir.display());
    println!("{:<12} {}", "release api:", config.github_api_url);
    println!("{:<12} {}", "platform:", pm.platform());
    for (i, url) in config.registry_urls.iter().enumerate() {
        let label = if i == 0 { "registry:" } else { "" };
        println!("{:<12} {}", label, url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_closest_names_typo() {
        let registry = names(&["catsay", "dogsay", "ripgrep", "meow"]);
        let suggestions = closest_names("catsya", &registry, 3);
        assert_eq!(suggestions.first().map(String::as_str), Some("catsay"));
        assert!(!suggestions.contains(&"ripgrep".to_string()));
    }

    #[test]
    fn test_closest_names_excludes_exact_and_unrelated() {
        let registry = names(&["catsay", "zzz"]);
        assert!(closest_names("catsay", &registry, 3).is_empty());
        assert!(closest_names("ripgrep", &registry, 3).is_empty());
    }

    #[test]
    fn test_closest_names_limit() {
        let registry = names(&["cat1", "cat2", "cat3", "cat4"]);
        assert_eq!(closest_names("cat", &registry, 2).len(), 2);
    }
}
