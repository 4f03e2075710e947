#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mention_relay::config::Config;
use mention_relay::events::EventKind;
use mention_relay::store::{EventStore, SqliteEventStore, StoredEvent};
use mention_relay::{ConfigCommands, EventCommands};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Teamwork mention relay: save and answer webhook events addressed to a trigger.
#[derive(Parser, Debug)]
#[command(name = "mention-relay")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway
    Gateway {
        /// Port to listen on (overrides [gateway] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides [gateway] host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Inspect stored events
    Events {
        #[command(subcommand)]
        events_command: EventCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Schema export needs no config file.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        println!("{}", Config::json_schema()?);
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            tracing::info!("Starting mention relay gateway on {host}:{port}");
            mention_relay::gateway::run_gateway(&host, port, config).await
        }
        Commands::Events { events_command } => handle_events_command(events_command, &config).await,
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                let rendered = toml::to_string_pretty(&config.redacted())
                    .context("failed to render config")?;
                println!("# {}", config.config_path.display());
                print!("{rendered}");
                Ok(())
            }
            ConfigCommands::Schema => Ok(()),
        },
    }
}

async fn handle_events_command(command: EventCommands, config: &Config) -> Result<()> {
    let store = SqliteEventStore::open(config.storage.resolved_db_path()?)?;
    match command {
        EventCommands::List { limit, json } => {
            let events = store.list_recent(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events stored.");
            } else {
                for event in &events {
                    println!("{}", summary_line(event));
                }
            }
            Ok(())
        }
        EventCommands::Show {
            kind,
            source_event_id,
        } => {
            let kind: EventKind = kind.parse()?;
            let Some(event) = store.get(kind, source_event_id).await? else {
                anyhow::bail!("no {kind} event with id {source_event_id}");
            };
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
    }
}

fn summary_line(event: &StoredEvent) -> String {
    let body: String = event.body_text.replace('\n', " ").chars().take(60).collect();
    format!(
        "{:<20} {:<16} {:>12} {:<25} {}",
        event.received_at,
        event.event_kind,
        event.source_event_id,
        event.author_name.as_deref().unwrap_or("-"),
        body
    )
}
