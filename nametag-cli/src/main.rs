//! Nametag CLI
//!
//! Resolve Ethereum addresses found in text or links to their on-chain names.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

mod error;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use nametag::cache::ResolutionCache;
use nametag::config::{self, Config, IssueLevel};
use nametag::prelude::*;
use nametag::util::dedup_ordered;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{CliError, Result};

/// Nametag - reverse name resolution for Ethereum addresses
#[derive(Parser)]
#[command(name = "nametag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "NAMETAG_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every full address found in the given text
    Resolve(ResolveArgs),

    /// Show which address a link refers to
    Subject(SubjectArgs),

    /// Manage the name cache
    Cache(CacheArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the resolve command
#[derive(Args)]
struct ResolveArgs {
    /// Text to scan for addresses (links, labels, bare addresses)
    #[arg(required = true)]
    text: Vec<String>,

    /// Cache file (defaults to ~/.nametag/cache.json)
    #[arg(long)]
    cache_file: Option<PathBuf>,
}

/// Arguments for the subject command
#[derive(Args)]
struct SubjectArgs {
    /// Link target
    #[arg(long)]
    href: String,

    /// Visible link text
    #[arg(long, default_value = "")]
    label: String,
}

/// Arguments for the cache command
#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommands,

    /// Cache file (defaults to ~/.nametag/cache.json)
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove every cached name
    Clear,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nametag={level},nametag_cli={level},{}",
            if verbosity >= 3 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(config::config_path);
    match cli.command {
        Commands::Resolve(args) => cmd_resolve(args, &config_file).await,
        Commands::Subject(args) => cmd_subject(&args, &config_file).await,
        Commands::Cache(args) => cmd_cache(args, &config_file).await,
        Commands::Config(args) => cmd_config(args, &config_file).await,
    }
}

/// Load the config file (defaults if missing) and apply environment overrides.
async fn load(config_file: &Path) -> Result<Config> {
    Ok(config::load_config_from(config_file).await?.with_env())
}

/// Pick the persistent store, or a throwaway one when caching is off.
fn open_store(config: &Config, cache_file: Option<PathBuf>) -> Arc<dyn KeyValueStore> {
    if config.cache_enabled {
        Arc::new(JsonFileStore::new(
            cache_file.unwrap_or_else(config::cache_path),
        ))
    } else {
        Arc::new(InMemoryStore::new())
    }
}

/// Resolve addresses found in text.
async fn cmd_resolve(args: ResolveArgs, config_file: &Path) -> Result<()> {
    let config = load(config_file).await?;
    let extractor = config.extractor()?;

    let addresses = dedup_ordered(
        args.text
            .iter()
            .flat_map(|text| extractor.find_full_addresses(text)),
    );
    if addresses.is_empty() {
        tracing::warn!("no addresses found in input");
        return Ok(());
    }

    let store = open_store(&config, args.cache_file);
    let transport = Arc::new(HttpTransport::from_config(&config)?);
    let resolver = Resolver::new(config, store, transport)?;

    let resolution = resolver.resolve_detailed(&addresses).await;
    tracing::info!(
        addresses = addresses.len(),
        calls = resolution.transport_calls,
        "resolution finished"
    );
    let failed = resolution.failed().count();
    if failed > 0 {
        tracing::warn!(failed, "some addresses could not be looked up");
    }

    for (address, outcome) in &resolution.outcomes {
        match outcome.name() {
            Some(name) => println!("{address}\t{name}"),
            None => println!("{address}\t-"),
        }
    }

    Ok(())
}

/// Select the subject of a link.
async fn cmd_subject(args: &SubjectArgs, config_file: &Path) -> Result<()> {
    let config = load(config_file).await?;
    let extractor = config.extractor()?;
    let candidates = extractor.candidates(&args.href);

    match select_subject(&args.href, &candidates, &args.label, &extractor) {
        Some(subject) => println!("{}\t{}", subject.address(), subject.tier()),
        None => println!("no address found"),
    }

    Ok(())
}

/// Cache management.
async fn cmd_cache(args: CacheArgs, config_file: &Path) -> Result<()> {
    let config = load(config_file).await?;
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(
        args.cache_file.unwrap_or_else(config::cache_path),
    ));
    let cache = ResolutionCache::from_config(store, &config);

    match args.command {
        CacheCommands::Clear => {
            let removed = cache.clear().await?;
            println!("Removed {removed} cached name(s)");
        }
    }

    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let config = load(config_file).await?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommands::Validate => {
            let config = load(config_file).await?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration is valid");
                return Ok(());
            }
            for issue in &issues {
                println!("{issue}");
            }
            let errors = issues
                .iter()
                .filter(|issue| issue.level == IssueLevel::Error)
                .count();
            if errors > 0 {
                return Err(CliError::InvalidConfig(errors));
            }
        }
        ConfigCommands::Init { force } => {
            if config_file.exists() && !force {
                return Err(CliError::AlreadyExists(config_file.to_path_buf()));
            }
            config::save_config_to(&Config::default(), config_file).await?;
            println!("Configuration created: {}", config_file.display());
        }
    }

    Ok(())
}
