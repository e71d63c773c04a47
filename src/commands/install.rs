use crate::commands::query;
use crate::error::{PurrError, Result};
use crate::package::PackageSpec;
use crate::package_manager::{InstallMethod, InstallReport, PackageManager};
use colored::Colorize;

#[derive(Debug, Clone, Copy)]
enum Verb {
    Install,
    Update,
    Upgrade,
    Downgrade,
}

impl Verb {
    fn progressive(self) -> &'static str {
        match self {
            Self::Install => "Installing",
            Self::Update => "Updating",
            Self::Upgrade => "Upgrading",
            Self::Downgrade => "Downgrading",
        }
    }
}

pub async fn install(pm: &PackageManager, specs: &[String]) -> Result<()> {
    run(pm, specs, Verb::Install).await
}

pub async fn update(pm: &PackageManager, specs: &[String]) -> Result<()> {
    run(pm, specs, Verb::Update).await
}

pub async fn upgrade(pm: &PackageManager, specs: &[String]) -> Result<()> {
    run(pm, specs, Verb::Upgrade).await
}

pub async fn downgrade(pm: &PackageManager, spec: &str) -> Result<()> {
    let spec = PackageSpec::parse(spec)?;
    if spec.pinned_version().is_none() {
        println!(
            "{} downgrade needs a version, e.g. {}",
            "⚠".yellow(),
            format!("purr downgrade {}@<version>", spec.name).cyan()
        );
        return Ok(());
    }
    run(pm, &[spec.to_string()], Verb::Downgrade).await
}

async fn run(pm: &PackageManager, specs: &[String], verb: Verb) -> Result<()> {
    let mut advice = None;

    for raw in specs {
        let spec = PackageSpec::parse(raw)?;
        println!(
            "{} {} {}",
            "==>".bold().green(),
            verb.progressive(),
            spec.to_string().bold()
        );

        let result = match verb {
            Verb::Install => pm.install(&spec).await,
            Verb::Update => pm.update(&spec).await,
            Verb::Upgrade => pm.upgrade(&spec).await,
            Verb::Downgrade => pm.downgrade(&spec).await.map(Option::unwrap_or_default),
        };

        let report = match result {
            Ok(report) => report,
            Err(PurrError::NotFound(missing)) => {
                let name = missing.split('@').next().unwrap_or(&missing);
                query::print_suggestions(pm, name).await;
                pm.finish().await;
                return Err(PurrError::NotFound(missing));
            }
            Err(e) => {
                pm.finish().await;
                return Err(e);
            }
        };

        print_report(&report);
        if report.path_advice.is_some() {
            advice = report.path_advice;
        }
    }

    if let Some((shell, lines)) = advice {
        println!();
        println!(
            "{} {} is not on your PATH ({:?} detected). To add it:",
            "⚠".yellow(),
            pm.config().bin_dir.display().to_string().bold(),
            shell
        );
        for line in lines {
            println!("  {:<14} {}", format!("{}:", line.label), line.command.cyan());
        }
    }

    pm.finish().await;
    Ok(())
}

fn print_report(report: &InstallReport) {
    for item in &report.installed {
        let how = match &item.method {
            InstallMethod::Binary { staged, asset } => {
                format!("{} from {}", staged.shim.display(), asset)
            }
            InstallMethod::Source {
                dir,
                ran_installer: true,
            } => format!("built from source in {}", dir.display()),
            InstallMethod::Source {
                dir,
                ran_installer: false,
            } => format!("cloned to {}", dir.display()),
        };
        let version = if item.version.is_empty() {
            String::new()
        } else {
            format!(" {}", item.version)
        };

        println!(
            "  {} {}{} {}",
            "✓".green(),
            item.name.bold(),
            version,
            how.dimmed()
        );
        if item.fell_back {
            println!("    {} no usable release asset, used the source", "⚠".yellow());
        }
    }
}

pub async fn uninstall(pm: &PackageManager, names: &[String]) -> Result<()> {
    for name in names {
        let report = pm.uninstall(name).await?;
        if report.nothing_removed() {
            println!("{} {} is not installed", "⚠".yellow(), name.bold());
            continue;
        }

        if let Some(dir) = &report.removed_dir {
            tracing::debug!("removed {}", dir.display());
        }
        for file in &report.removed_files {
            tracing::debug!("removed {}", file.display());
        }
        println!("{} Uninstalled {}", "✓".green(), name.bold());
    }
    Ok(())
}
