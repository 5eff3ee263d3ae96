//! Stowage CLI
//!
//! Command-line client for a Stowage-managed CouchDB database.
//!
//! # Usage
//!
//! ```bash
//! # Fetch one object's model
//! stowage --url http://127.0.0.1:5984/stowage get sat.1
//!
//! # Store a model (inline JSON, or "-" to read stdin)
//! stowage put sat.1 '{"name": "Satellite 1"}'
//!
//! # Tail the change feed for an object until Ctrl-C
//! stowage watch sat.1
//!
//! # Tail with a server-side selector filter
//! stowage watch sat.1 --filter '{"selector": {"model.type": "satellite"}}'
//! ```

use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use stowage_core::{DomainObject, Identifier};
use stowage_couch::{CouchObjectProvider, FeedOutcome, SubscribeOptions, DEFAULT_HEARTBEAT_MS};

/// Stowage - CouchDB-backed domain object store client
#[derive(Parser, Debug)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database URL, e.g. http://127.0.0.1:5984/stowage
    #[arg(long, env = "STOWAGE_URL", default_value = "http://127.0.0.1:5984/stowage")]
    url: String,

    /// Namespace stamped onto every identifier
    #[arg(long, env = "STOWAGE_NAMESPACE", default_value = "")]
    namespace: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STOWAGE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one object and print its model
    Get { key: String },

    /// Store a model under a key ("-" or omitted reads stdin)
    Put { key: String, model: Option<String> },

    /// Follow the change feed for one object until Ctrl-C
    Watch {
        key: String,

        /// Selector JSON forwarded to the server as a _selector filter
        #[arg(long)]
        filter: Option<String>,

        /// Server keep-alive interval in milliseconds
        #[arg(long, default_value_t = DEFAULT_HEARTBEAT_MS)]
        heartbeat: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    let provider = CouchObjectProvider::new(&args.url, &args.namespace)
        .with_context(|| format!("Invalid database URL: {}", args.url))?;

    match args.command {
        Command::Get { key } => {
            let identifier = Identifier::new(&args.namespace, &key)?;
            match provider.get(&identifier).await {
                Some(object) => {
                    println!("{}", serde_json::to_string_pretty(&object.model)?);
                }
                None => {
                    eprintln!("{} {}", "not found:".red(), identifier);
                    std::process::exit(1);
                }
            }
        }

        Command::Put { key, model } => {
            let raw = match model.as_deref() {
                Some("-") | None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read model from stdin")?;
                    buf
                }
                Some(inline) => inline.to_string(),
            };
            let model: serde_json::Value =
                serde_json::from_str(&raw).context("Model is not valid JSON")?;

            let identifier = Identifier::new(&args.namespace, &key)?;
            let object = DomainObject::new(identifier.clone(), model);

            if provider.update(object).settled().await {
                println!("{} {}", "stored".green(), identifier);
            } else {
                eprintln!("{} {}", "write failed:".red(), identifier);
                std::process::exit(1);
            }
        }

        Command::Watch {
            key,
            filter,
            heartbeat,
        } => {
            let identifier = Identifier::new(&args.namespace, &key)?;
            let filter = filter
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("Filter is not valid JSON")?;

            let options = SubscribeOptions {
                filter,
                heartbeat_ms: heartbeat,
            };

            let subscription = provider.observe_changes(&identifier, options, |events| {
                for event in events {
                    let revs: Vec<&str> = event.changes.iter().map(|c| c.rev.as_str()).collect();
                    if event.deleted {
                        println!("{} {} {}", "deleted".red(), event.identifier, revs.join(","));
                    } else {
                        println!("{} {} {}", "changed".green(), event.identifier, revs.join(","));
                    }
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    provider.stop_changes(&identifier);
                    println!("{}", "stopped".yellow());
                }
                outcome = subscription.finished() => match outcome {
                    FeedOutcome::Completed => println!("{}", "feed closed by server".yellow()),
                    FeedOutcome::Cancelled => println!("{}", "feed cancelled".yellow()),
                    FeedOutcome::Errored(e) => {
                        return Err(e).context("Change feed failed");
                    }
                },
            }
        }
    }

    Ok(())
}
