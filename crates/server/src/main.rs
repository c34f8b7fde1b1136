mod config;
mod error;
mod routes;
mod state;

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use storage::Store;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use state::AppState;

const DATABASE_FILE: &str = "deckhand.db";

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Chat server that lets a model call MCP tool servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./deckhand.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overriding server.addr
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// List saved chats
    Chats {
        /// Show only the last N chats
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// List saved tool-server configs
    Servers,
    /// Print saved tool-server configs as JSON
    ExportServers,
    /// Import tool-server configs from a JSON file
    ImportServers {
        /// JSON array of server configs
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::discover(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log.level));

    match cli.command {
        Some(Commands::Serve { addr }) => cmd_serve(config, addr).await,
        None => cmd_serve(config, None).await,
        Some(Commands::Chats { limit }) => cmd_chats(&config, limit),
        Some(Commands::Servers) => cmd_servers(&config),
        Some(Commands::ExportServers) => cmd_export_servers(&config),
        Some(Commands::ImportServers { file }) => cmd_import_servers(&config, &file),
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_serve(config: Config, addr: Option<String>) -> Result<()> {
    let store = create_store(&config)?;
    let state = AppState::new(&config, store);
    if !state.orchestrator.backend().has_credentials() {
        warn!("ANTHROPIC_API_KEY is not configured; chat requests will fail");
    }
    let sweeper = state.registry.start_sweeper();

    let addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, model = %config.backend.model, "deckhand listening");

    axum::serve(listener, routes::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;
    state.registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

fn cmd_chats(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let chats = store.list_chats(Some(limit))?;

    if chats.is_empty() {
        println!("No chats found.");
        return Ok(());
    }

    println!("{:<44}  {:<16}  {:<5}  TITLE", "CHAT ID", "UPDATED", "MSGS");
    println!("{}", "-".repeat(100));

    for chat in chats {
        let updated = Local
            .from_utc_datetime(&chat.updated_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        println!(
            "{:<44}  {:<16}  {:<5}  {}",
            chat.id, updated, chat.message_count, chat.title
        );
    }

    Ok(())
}

fn cmd_servers(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let servers = store.list_servers()?;

    if servers.is_empty() {
        println!("No servers saved.");
        return Ok(());
    }

    println!("{:<40}  {:<24}  {:<6}  TARGET", "SERVER ID", "NAME", "TYPE");
    println!("{}", "-".repeat(100));

    for server in servers {
        let target = match &server.config.transport {
            mcp::TransportConfig::LocalProcess { command, args, .. } => {
                format!("{command} {}", args.join(" "))
            }
            mcp::TransportConfig::HttpStream { url } | mcp::TransportConfig::HttpEvents { url } => {
                url.clone()
            }
        };
        println!(
            "{:<40}  {:<24}  {:<6}  {}",
            server.id(),
            server.config.name,
            server.config.kind(),
            target.trim_end()
        );
    }

    Ok(())
}

fn cmd_export_servers(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    println!("{}", store.export_servers()?);
    Ok(())
}

fn cmd_import_servers(config: &Config, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)?;
    let store = create_store(config)?;
    let report = store.import_servers(&json)?;

    println!("Imported {} server(s).", report.imported);
    for error in &report.errors {
        eprintln!("  {error}");
    }
    Ok(())
}

/// Open the database, creating it and its directory when missing.
fn create_store(config: &Config) -> Result<Store> {
    let db_path = database_path(config);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&db_path)?;
    info!(path = %db_path.display(), "opened store");
    Ok(store)
}

/// Open an existing database for the read-only commands.
fn open_store(config: &Config) -> Result<Store> {
    let db_path = database_path(config);
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }
    Ok(Store::open(&db_path)?)
}

fn database_path(config: &Config) -> PathBuf {
    config.server.database.clone().unwrap_or_else(|| {
        dirs_data_dir()
            .unwrap_or_else(|| ".deckhand".into())
            .join(DATABASE_FILE)
    })
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/deckhand"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("deckhand"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("deckhand"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
