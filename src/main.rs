use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use purr::PackageManager;
use purr::colors;
use purr::commands;
use purr::config::Config;

#[derive(Parser)]
#[command(name = "purr")]
#[command(author, version, about = "Install command-line packages from the purr registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Show each step: commands run, URLs fetched, files copied
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages and their dependencies
    Install {
        /// Package specs (name or name@version)
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Remove installed packages
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Refresh installed packages
    Update {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Install a newer version of packages
    Upgrade {
        /// Package specs (name or name@version)
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Install an older version of a package
    Downgrade {
        /// Package spec with the target version (name@version)
        package: String,
    },

    /// Show published versions of a package
    Versions { package: String },

    /// Search the registry
    Search { query: String },

    /// List registry packages, or installed ones
    List {
        /// Registry sort key (e.g. mostDownloads)
        #[arg(long)]
        sort: Option<String>,

        /// Only packages in this category
        #[arg(long)]
        category: Option<String>,

        /// List locally installed packages instead
        #[arg(long, conflicts_with_all = ["sort", "category"])]
        installed: bool,
    },

    /// Show package details
    Info {
        package: String,

        /// Show a specific version
        #[arg(long)]
        version: Option<String>,
    },

    /// Show registry statistics
    Stats,

    /// List registry categories
    Categories,

    /// Print the effective configuration
    Config,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("warn,purr=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    colors::init_colors();

    let Some(command) = cli.command else {
        println!("{} purr - command-line packages, one name away", "🐾".bold());
        println!("\nRun {} to see available commands.", "purr --help".cyan());
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "purr", &mut std::io::stdout());
        return Ok(());
    }

    let pm = PackageManager::new(Config::load()?)?;

    match command {
        Commands::Install { packages } => commands::install(&pm, &packages).await?,
        Commands::Uninstall { packages } => commands::uninstall(&pm, &packages).await?,
        Commands::Update { packages } => commands::update(&pm, &packages).await?,
        Commands::Upgrade { packages } => commands::upgrade(&pm, &packages).await?,
        Commands::Downgrade { package } => commands::downgrade(&pm, &package).await?,
        Commands::Versions { package } => commands::versions(&pm, &package).await?,
        Commands::Search { query } => commands::search(&pm, &query).await?,
        Commands::List {
            sort,
            category,
            installed,
        } => commands::list(&pm, sort.as_deref(), category.as_deref(), installed).await?,
        Commands::Info { package, version } => {
            commands::info(&pm, &package, version.as_deref()).await?
        }
        Commands::Stats => commands::stats(&pm).await?,
        Commands::Categories => commands::categories(&pm).await?,
        Commands::Config => commands::config(&pm)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
