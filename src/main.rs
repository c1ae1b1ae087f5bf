//! WolfShard - Replicated Per-User File Storage Node
//!
//! Runs a storage node: registers with the directory service, reports the
//! local inventory and serves client and peer requests.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfshard::api::HttpServer;
use wolfshard::config::WolfShardConfig;
use wolfshard::error::Result;
use wolfshard::network::NetworkServer;
use wolfshard::node::{inventory, FileNode};
use wolfshard::storage::{LocalStore, NodeId};

/// WolfShard - Replicated Per-User File Storage Node
#[derive(Parser)]
#[command(name = "wolfshard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfshard.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the storage node
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfshard.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value_t = 1)]
        node_id: NodeId,

        /// Directory service address
        #[arg(long, default_value = "127.0.0.1:9700")]
        directory: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,

    /// Print the startup inventory without contacting the directory service
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.clone().unwrap_or_else(|| {
        WolfShardConfig::from_file(&cli.config)
            .map(|config| config.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    });
    init_logging(&level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init {
            output,
            node_id,
            directory,
        } => run_init(output, node_id, directory),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Scan => run_scan(cli.config).await,
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the storage node
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting WolfShard node...");

    let config = match WolfShardConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };
    tracing::info!("Loaded configuration for node: {}", config.node.id);

    let node = match FileNode::from_config(&config) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            tracing::error!("Failed to open node root {:?}: {}", config.node_root(), e);
            return Err(e);
        }
    };
    tracing::info!("Serving files from {}", node.root().display());

    // Bind before registering so peers can reach the advertised address
    let server = NetworkServer::new(config.node.bind_address.clone(), node.clone());
    let listener = server.bind().await?;

    if let Err(e) = node.startup().await {
        tracing::error!("Node startup failed, not serving: {}", e);
        return Err(e);
    }

    let api = HttpServer::new(config.api.clone(), Arc::clone(&node));

    tokio::select! {
        result = server.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Network server error: {}", e);
            }
        }
        result = async {
            api.start().await?;
            // A disabled API returns immediately; keep waiting on the others
            std::future::pending::<Result<()>>().await
        } => {
            if let Err(e) = result {
                tracing::error!("HTTP API error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    server.stop();
    api.stop();
    node.shutdown().await;
    tracing::info!("WolfShard node stopped");

    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, node_id: NodeId, directory: String) -> Result<()> {
    let config = WolfShardConfig::new(node_id, directory);
    config.validate()?;

    let content = format!(
        "# WolfShard Configuration\n# Generated configuration file\n\n{}",
        config.to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to set the directory service and storage root.");
    println!("Then start with: wolfshard start --config {}", output.display());

    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfShardConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Directory: {}", config.directory.address);
            println!("  Node Root: {}", config.node_root().display());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfShardConfig::from_file(&config_path)?;

    println!("WolfShard Node Information");
    println!("==========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Bind Address:     {}", config.node.bind_address);
    println!("Advertise:        {}", config.advertise_address());
    println!("Node Root:        {}", config.node_root().display());
    println!();
    println!("Directory Service:");
    println!("  Address:        {}", config.directory.address);
    println!("  Connect:        {} ms", config.directory.connect_timeout_ms);
    println!("  Request:        {} ms", config.directory.request_timeout_ms);
    println!();
    println!("Replication:");
    println!("  Connect:        {} ms", config.replication.connect_timeout_ms);
    println!("  Request:        {} ms", config.replication.request_timeout_ms);
    println!("  Hash Workers:   {}", config.replication.inventory_concurrency);
    println!();
    println!("HTTP API:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);

    Ok(())
}

/// Print the startup inventory of the node root
async fn run_scan(config_path: PathBuf) -> Result<()> {
    let config = WolfShardConfig::from_file(&config_path)?;
    let store = LocalStore::new(config.node_root())?;

    let entries = inventory::scan(&store, config.node.id, config.replication.inventory_concurrency).await?;

    for entry in &entries {
        println!(
            "{:>8}  {}  {}  {}",
            entry.user_id,
            &entry.digest[..12.min(entry.digest.len())],
            entry.modified.format("%Y-%m-%d %H:%M:%S"),
            entry.path
        );
    }
    println!();
    println!("{} files under {}", entries.len(), store.root().display());

    Ok(())
}
