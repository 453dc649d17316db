// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use cpkg::config::{self, Config};
use cpkg::packages::{self, Artifact};
use cpkg::prompt::{AssumeYes, Confirm, Prompt};
use cpkg::repository::Repository;
use cpkg::state::{self, InstalledState};
use cpkg::{BuildOutcome, RemoveOutcome};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "cpkg")]
#[command(author, version, about = "Minimal package manager for C headers and libraries", long_about = None)]
struct Cli {
    /// Root directory packages are deployed under
    #[arg(long, global = true, env = config::ROOT_ENV, default_value = "/")]
    root: PathBuf,

    /// State directory (default: <root>/var/lib/cpkg)
    #[arg(long, global = true, env = config::WORK_DIR_ENV)]
    work_dir: Option<PathBuf>,

    /// URL of the remote package index
    #[arg(long, global = true, env = config::INDEX_URL_ENV, default_value = config::DEFAULT_INDEX_URL)]
    index_url: String,

    /// Network timeout in seconds
    #[arg(long, global = true, default_value_t = config::DEFAULT_HTTP_TIMEOUT.as_secs())]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a package from a source directory containing CPKG/control
    Build {
        /// Package source directory
        source_dir: PathBuf,
        /// Directory to write the package to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Install a package file, or a package from the index with --remote
    Install {
        /// Path to the package file
        #[arg(required_unless_present = "remote")]
        package_path: Option<PathBuf>,
        /// Fetch the named package from the index and install it
        #[arg(long, value_name = "NAME", conflicts_with = "package_path")]
        remote: Option<String>,
    },
    /// Remove an installed package
    Remove {
        /// Package name to remove
        package_name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the header of a package file
    Info {
        /// Path to the package file
        package_path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a package file's header, length and payload hash
    Verify {
        /// Path to the package file
        package_path: PathBuf,
    },
    /// List installed packages
    List {
        /// Only show packages whose name contains this text
        pattern: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the files a package deployed
    Listfiles {
        /// Installed package name
        package_name: String,
    },
    /// Search the remote index
    Search {
        /// Text to look for in index lines
        query: String,
    },
    /// Download a package from the index without installing it
    Fetch {
        /// Package name
        package_name: String,
        /// Destination file (default: <name>.cpk)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::new(&self.root).with_index_url(&self.index_url);
        if let Some(work_dir) = &self.work_dir {
            config = config.with_work_dir(work_dir);
        }
        config.http_timeout = Duration::from_secs(self.timeout);
        config
    }
}

fn confirmer(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(Prompt::stdio())
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command {
        Commands::Build {
            source_dir,
            output,
            yes,
        } => {
            info!("Building package from {}", source_dir.display());
            let outcome = cpkg::build_package(&source_dir, &output, confirmer(yes).as_mut())
                .with_context(|| format!("Failed to build package from {}", source_dir.display()))?;

            match outcome {
                BuildOutcome::Built(result) => {
                    println!("Built package: {} version {}", result.header.name, result.header.version);
                    println!("  File: {}", result.artifact_path.display());
                    println!("  Payload: {} bytes", result.header.payload_len);
                    println!("  SHA-256: {}", result.header.hash);
                }
                BuildOutcome::Cancelled => println!("Build cancelled"),
            }
            Ok(())
        }
        Commands::Install {
            package_path,
            remote,
        } => {
            let report = match (remote, package_path) {
                (Some(name), _) => {
                    info!("Installing {} from {}", name, config.index_url);
                    Repository::from_config(&config)?
                        .install_by_name(&config, &name)
                        .with_context(|| format!("Failed to install '{}' from the index", name))?
                }
                (None, Some(path)) => cpkg::install_package(&config, &path)
                    .with_context(|| format!("Failed to install {}", path.display()))?,
                (None, None) => anyhow::bail!("Specify a package file or --remote <NAME>"),
            };

            println!("Installed package: {} version {}", report.name, report.version);
            println!("  Location: {}", report.install_path.display());
            for entry in &report.top_level {
                println!("  Extracted: {}", entry);
            }
            for file in &report.deployed {
                println!("  Deployed: {}", file.display());
            }
            Ok(())
        }
        Commands::Remove { package_name, yes } => {
            info!("Removing package: {}", package_name);
            let outcome = cpkg::remove_package(&config, &package_name, confirmer(yes).as_mut())
                .with_context(|| format!("Failed to remove '{}'", package_name))?;

            match outcome {
                RemoveOutcome::Removed(record) => {
                    println!("Removed package: {} version {}", record.name, record.version)
                }
                RemoveOutcome::Cancelled => println!("Removal cancelled"),
            }
            Ok(())
        }
        Commands::Info { package_path, json } => {
            let artifact = Artifact::open(&package_path)
                .with_context(|| format!("Failed to read {}", package_path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&artifact.header)?);
            } else {
                println!("{}", artifact.header);
            }
            Ok(())
        }
        Commands::Verify { package_path } => {
            let mut artifact = Artifact::open(&package_path)
                .with_context(|| format!("Failed to read {}", package_path.display()))?;
            artifact
                .verify()
                .with_context(|| format!("Verification of {} failed", package_path.display()))?;

            println!(
                "{}: OK ({} {}, {} byte payload)",
                artifact.path.display(),
                artifact.header.name,
                artifact.header.version,
                artifact.header.payload_len
            );
            Ok(())
        }
        Commands::List { pattern, json } => {
            let state = InstalledState::load(&config)?;
            let records: Vec<_> = state::list_installed(&config, &state)?
                .into_iter()
                .filter(|r| pattern.as_deref().is_none_or(|p| r.name.contains(p)))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No packages installed");
            } else {
                for record in &records {
                    println!("{} {} ({})", record.name, record.version, record.path.display());
                }
            }
            Ok(())
        }
        Commands::Listfiles { package_name } => {
            let state = InstalledState::load(&config)?;
            let record = state::resolve_installed(&config, &state, &package_name)
                .ok_or_else(|| cpkg::Error::NotInstalled(package_name.clone()))?;

            for file in state::read_file_list(&config, &record.name)? {
                println!("{}", file.display());
            }
            Ok(())
        }
        Commands::Search { query } => {
            let hits = Repository::from_config(&config)?
                .search(&query)
                .with_context(|| format!("Failed to search {}", config.index_url))?;

            if hits.is_empty() {
                println!("No packages match '{}'", query);
            }
            for entry in hits {
                println!("{}|{}|{}", entry.name, entry.version, entry.url);
            }
            Ok(())
        }
        Commands::Fetch {
            package_name,
            output,
        } => {
            let dest = output.unwrap_or_else(|| {
                PathBuf::from(format!("{}.{}", package_name, packages::PACKAGE_EXTENSION))
            });
            let entry = Repository::from_config(&config)?
                .fetch_by_name(&package_name, &dest)
                .with_context(|| format!("Failed to fetch '{}'", package_name))?;

            println!("Fetched {} {} to {}", entry.name, entry.version, dest.display());
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cpkg", &mut io::stdout());
            Ok(())
        }
    }
}
