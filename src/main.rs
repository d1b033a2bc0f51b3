use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use vet_clinic::{export, ClinicConfig, ClinicStore};

/// Veterinary clinic records: database setup, CSV export and the terminal client.
#[derive(Debug, Parser)]
#[command(name = "vet-clinic", version = vet_clinic::VERSION)]
struct Cli {
    /// SQLite database file (overrides `database.path`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); `CLINIC_LOG` takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and its tables
    Init,

    /// Export every pet with its owners to CSV
    Export {
        /// Output file (default: pets_export_<timestamp>.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Terminal client with live tables and search (default)
    Ui {
        /// Read from the HTTP endpoint at `client.base_url` instead of the database file
        #[arg(long)]
        remote: bool,

        /// Log file; the terminal itself is used for drawing
        #[arg(long, default_value = "clinic-ui.log")]
        log_file: PathBuf,
    },
}

fn env_filter(verbose: u8) -> EnvFilter {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_env("CLINIC_LOG").unwrap_or_else(|_| EnvFilter::new(fallback))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClinicConfig::load().context("loading configuration")?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }

    match cli.command {
        Some(Command::Init) => {
            init_stderr_logging(cli.verbose);
            run_init(&config)
        }
        Some(Command::Export { out }) => {
            init_stderr_logging(cli.verbose);
            run_export(&config, out)
        }
        Some(Command::Ui { remote, log_file }) => run_ui_mode(&config, remote, &log_file, cli.verbose).await,
        None => run_ui_mode(&config, false, Path::new("clinic-ui.log"), cli.verbose).await,
    }
}

fn init_stderr_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(config: &ClinicConfig) -> Result<()> {
    let path = &config.database.path;
    let store = ClinicStore::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;

    let owners = store.list_owners()?.len();
    let pets = store.list_pets()?.len();
    let visits = store.list_visits()?.len();

    println!("🐾 Clinic database ready: {}", path.display());
    println!("   {} owners, {} pets, {} visits", owners, pets, visits);
    Ok(())
}

fn run_export(config: &ClinicConfig, out: Option<PathBuf>) -> Result<()> {
    let store = ClinicStore::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;

    let out = out.unwrap_or_else(|| PathBuf::from(export::export_filename(Utc::now())));
    let file = File::create(&out).with_context(|| format!("creating {}", out.display()))?;
    let rows = export::write_pets_csv(&store, file)?;

    println!("✓ Exported {} pets to {}", rows, out.display());
    Ok(())
}

#[cfg(feature = "tui")]
async fn run_ui_mode(config: &ClinicConfig, remote: bool, log_file: &Path, verbose: u8) -> Result<()> {
    use std::sync::{Arc, Mutex};
    use vet_clinic::{RetryPolicy, Retrying, StoreSource};

    let log = File::create(log_file).with_context(|| format!("creating {}", log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .init();

    let policy = RetryPolicy::from_config(&config.client);

    if remote {
        let source = vet_clinic::HttpSource::new(&config.client.base_url)?;
        tracing::info!(endpoint = source.endpoint(), "terminal client (remote)");
        vet_clinic::ui::run(Retrying::new(source, policy), &config.client).await
    } else {
        let store = ClinicStore::open(&config.database.path)
            .with_context(|| format!("opening database {}", config.database.path.display()))?;
        tracing::info!(path = %config.database.path.display(), "terminal client (local)");
        let source = StoreSource::new(Arc::new(Mutex::new(store)));
        vet_clinic::ui::run(Retrying::new(source, policy), &config.client).await
    }
}

#[cfg(not(feature = "tui"))]
async fn run_ui_mode(_config: &ClinicConfig, _remote: bool, _log_file: &Path, _verbose: u8) -> Result<()> {
    eprintln!("❌ Terminal client not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or serve the API: cargo run --bin clinic-server --features server");
    std::process::exit(1);
}
