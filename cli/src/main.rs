mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::{cmd_add, cmd_show, cmd_sub};
use crate::config::{Config, ServeConfig};
use pfc_core::db::{Database, PoolSettings};
use pfc_core::service::LedgerService;

#[derive(Parser)]
#[command(
    name = "pfc",
    version,
    about = "Track daily protein, fat and carb totals"
)]
struct Cli {
    /// Path to the SQLite database (default: platform data directory)
    #[arg(long, global = true, env = "PFC_DATABASE", value_name = "PATH")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add grams to a day's totals
    Add {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Protein grams
        #[arg(short, long, allow_negative_numbers = true)]
        proteins: Option<f64>,
        /// Fat grams
        #[arg(short, long, allow_negative_numbers = true)]
        fats: Option<f64>,
        /// Carbohydrate grams
        #[arg(short, long, allow_negative_numbers = true)]
        carbs: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Subtract grams from a day's totals (never below zero)
    Sub {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Protein grams
        #[arg(short, long, allow_negative_numbers = true)]
        proteins: Option<f64>,
        /// Fat grams
        #[arg(short, long, allow_negative_numbers = true)]
        fats: Option<f64>,
        /// Carbohydrate grams
        #[arg(short, long, allow_negative_numbers = true)]
        carbs: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's totals (defaults to today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "PFC_PORT")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1", env = "PFC_BIND")]
        bind: String,
        /// Seconds before an in-flight request is abandoned
        #[arg(long, default_value = "15", env = "PFC_REQUEST_TIMEOUT_SECS")]
        request_timeout_secs: u64,
        /// Maximum number of pooled database connections
        #[arg(long, default_value = "8", env = "PFC_POOL_SIZE")]
        pool_size: u32,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pfc=debug,pfc_core=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn open_ledger(config: &Config) -> Result<LedgerService> {
    let db = Database::open(&config.db_path, PoolSettings::default())
        .with_context(|| format!("Failed to open database: {}", config.db_path.display()))?;
    Ok(LedgerService::new(db))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.database)?;

    match cli.command {
        Commands::Add {
            date,
            proteins,
            fats,
            carbs,
            json,
        } => cmd_add(&open_ledger(&config)?, date, proteins, fats, carbs, json),
        Commands::Sub {
            date,
            proteins,
            fats,
            carbs,
            json,
        } => cmd_sub(&open_ledger(&config)?, date, proteins, fats, carbs, json),
        Commands::Show { date, json } => cmd_show(&open_ledger(&config)?, date, json),
        Commands::Serve {
            port,
            bind,
            request_timeout_secs,
            pool_size,
        } => {
            let serve = ServeConfig::new(request_timeout_secs, pool_size);
            let db = Database::open(&config.db_path, serve.pool).with_context(|| {
                format!("Failed to open database: {}", config.db_path.display())
            })?;
            server::start_server(db, port, &bind, serve.request_timeout).await
        }
    }
}
