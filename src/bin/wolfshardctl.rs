//! WolfShardCtl - Command line client for WolfShard storage nodes
//!
//! Usage:
//!   wolfshardctl ls <user> [dir]                 - List a directory
//!   wolfshardctl put <user> <local> <remote>     - Upload a file
//!   wolfshardctl get <user> <remote> [-o out]    - Fetch a file
//!   wolfshardctl rm <user> <remote>              - Delete a file
//!   wolfshardctl status                          - Show node status
//!   wolfshardctl deficiencies                    - Show files awaiting backup repair

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use wolfshard::api::{DeficiencyEntry, StatusResponse};
use wolfshard::network::NetworkClient;
use wolfshard::replication::Message;
use wolfshard::storage::UserId;

/// WolfShard Client Tool
#[derive(Parser)]
#[command(name = "wolfshardctl")]
#[command(about = "Store and fetch files on WolfShard nodes", long_about = None)]
struct Cli {
    /// Storage node address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9600")]
    node: String,

    /// Status API endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:8090")]
    endpoint: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory of a user's files
    Ls {
        user: UserId,
        #[arg(default_value = "")]
        dir: String,
    },
    /// Upload a local file
    Put {
        user: UserId,
        local: PathBuf,
        remote: String,
    },
    /// Fetch a file
    Get {
        user: UserId,
        remote: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file
    Rm { user: UserId, remote: String },
    /// Show status of the node
    Status,
    /// Show files whose backup copy awaits repair
    Deficiencies,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(cli.timeout);
    let client = NetworkClient::new(Duration::from_secs(5), timeout);

    match cli.command {
        Commands::Ls { user, dir } => {
            match request(&client, &cli.node, Message::List { user_id: user, path: dir }).await? {
                Message::Listing { dirs, files } => {
                    for dir in dirs {
                        println!("{:<19}  {}/", "", dir);
                    }
                    for file in files {
                        println!("{}  {}", file.updated_at.format("%Y-%m-%d %H:%M:%S"), file.name);
                    }
                    Ok(())
                }
                other => bail!("unexpected response: {}", other.type_name()),
            }
        }
        Commands::Put { user, local, remote } => {
            let data = tokio::fs::read(&local)
                .await
                .with_context(|| format!("reading {}", local.display()))?;
            let size = data.len();
            let message = Message::Upload {
                user_id: user,
                path: remote.clone(),
                data,
            };
            match request(&client, &cli.node, message).await? {
                Message::Ack => {
                    println!("✓ Uploaded {} ({} bytes)", remote, size);
                    Ok(())
                }
                other => bail!("unexpected response: {}", other.type_name()),
            }
        }
        Commands::Get { user, remote, output } => {
            match request(&client, &cli.node, Message::Fetch { user_id: user, path: remote }).await? {
                Message::FileData { data } => match output {
                    Some(path) => {
                        tokio::fs::write(&path, &data)
                            .await
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!("✓ Fetched {} bytes to {}", data.len(), path.display());
                        Ok(())
                    }
                    None => {
                        use std::io::Write;
                        std::io::stdout().write_all(&data)?;
                        Ok(())
                    }
                },
                other => bail!("unexpected response: {}", other.type_name()),
            }
        }
        Commands::Rm { user, remote } => {
            match request(&client, &cli.node, Message::Delete { user_id: user, path: remote.clone() }).await? {
                Message::Ack => {
                    println!("✓ Deleted {}", remote);
                    Ok(())
                }
                other => bail!("unexpected response: {}", other.type_name()),
            }
        }
        Commands::Status => show_status(&cli.endpoint).await,
        Commands::Deficiencies => show_deficiencies(&cli.endpoint).await,
    }
}

/// Send one request, turning error responses into errors
async fn request(client: &NetworkClient, node: &str, message: Message) -> anyhow::Result<Message> {
    let response = client
        .send(node, message)
        .await
        .with_context(|| format!("talking to node {}", node))?;

    match response {
        Message::Error { code, message } => bail!("{:?}: {}", code, message),
        other => Ok(other),
    }
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/status", endpoint.trim_end_matches('/'));
    let status: StatusResponse = reqwest::get(&url)
        .await
        .with_context(|| format!("connecting to {}", url))?
        .json()
        .await?;

    println!("WolfShard Node Status");
    println!("=====================");
    println!("Node ID:       {}", status.node_id);
    println!("Address:       {}", status.address);
    println!("Node Root:     {}", status.node_root);
    println!("Registered:    {}", if status.registered { "yes" } else { "no" });
    println!("Deficiencies:  {}", status.deficiencies);

    Ok(())
}

async fn show_deficiencies(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/deficiencies", endpoint.trim_end_matches('/'));
    let entries: Vec<DeficiencyEntry> = reqwest::get(&url)
        .await
        .with_context(|| format!("connecting to {}", url))?
        .json()
        .await?;

    if entries.is_empty() {
        println!("No files awaiting backup repair");
        return Ok(());
    }

    println!("{:<8} {:<15} {:<20} {:<30} REASON", "USER", "KIND", "SINCE", "PATH");
    for entry in entries {
        println!(
            "{:<8} {:<15} {:<20} {:<30} {}",
            entry.user_id,
            entry.kind,
            entry.since.format("%Y-%m-%d %H:%M:%S"),
            entry.path,
            entry.reason
        );
    }

    Ok(())
}
