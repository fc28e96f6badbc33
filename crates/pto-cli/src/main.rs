//! PTO command line
//!
//! Administers an observation store and moves observation set files in and
//! out of it.
//!
//! # Usage
//! ```bash
//! pto [--config pto.toml] [--database pto.db] [--verbose] init
//! pto load measurements.osf more.osf
//! pto show 3
//! pto data 3 > set3.osf
//! pto conditions 'ecn.*'
//! ```

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pto_core::{encode_set, osf, ConditionCache, ObservationStore, PtoConfig};
use tracing_subscriber::EnvFilter;

/// PTO - Path Transparency Observatory store administration
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PTO_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configuration file
    #[arg(short, long, env = "PTO_DATABASE")]
    database: Option<PathBuf>,

    /// Base URL for set links, overrides the configuration file
    #[arg(long, env = "PTO_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the observation tables
    Init,

    /// Drop every observation table
    Drop,

    /// Load observation set files ("-" reads stdin)
    Load {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print an observation set as JSON
    Show { id: i64 },

    /// Print the observations of a set, one per line
    Data { id: i64 },

    /// Look up conditions by exact name or `prefix.*`
    Conditions { pattern: String },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    let mut store = ObservationStore::open(&config, Arc::new(ConditionCache::new()))
        .with_context(|| format!("opening {}", config.database.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Init => {
            let stats = store.stats()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
        }
        Commands::Drop => {
            store.drop_tables()?;
            tracing::warn!("Dropped all tables in {}", config.database.display());
        }
        Commands::Load { files } => {
            for file in files {
                let loaded = if file.as_os_str() == "-" {
                    store.ingest(io::stdin().lock())
                } else {
                    let reader = File::open(&file)
                        .with_context(|| format!("opening {}", file.display()))?;
                    store.ingest(BufReader::new(reader))
                };
                let report = loaded.with_context(|| format!("loading {}", file.display()))?;
                writeln!(out, "{}", serde_json::to_string(&report)?)?;
            }
        }
        Commands::Show { id } => {
            let Some(mut set) = store.select_set(id)? else {
                bail!("no observation set {}", id);
            };
            store.count_observations(&mut set)?;
            set.derive_links(&config.base_url()?)?;
            out.write_all(&encode_set(&set)?)?;
            writeln!(out)?;
        }
        Commands::Data { id } => {
            if store.select_set(id)?.is_none() {
                bail!("no observation set {}", id);
            }
            let observations = store.observations_in_set(id)?;
            osf::write_observations(&observations, &mut out)?;
        }
        Commands::Conditions { pattern } => {
            let mut conditions = store.conditions_by_name(&pattern)?;
            conditions.sort_by(|a, b| a.name.cmp(&b.name));
            for condition in conditions {
                writeln!(out, "{}", condition.name)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PtoConfig> {
    let mut config = match &cli.config {
        Some(path) => PtoConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => PtoConfig::default(),
    };
    if let Some(database) = &cli.database {
        config = config.with_database(database);
    }
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }
    config.validate()?;
    Ok(config)
}
