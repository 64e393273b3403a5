//! # parley
//!
//! Command-line front end for the conversation store: wires settings,
//! telemetry, the storage backend and the context manager, then runs one
//! command and prints its result as JSON on stdout.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use parley_context::{ChatTurn, ContextManager};
use parley_core::{instant, Role};
use parley_settings::{load_settings, load_settings_from_path, BackendPreference, ParleySettings};
use parley_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::json;

/// Persistent, token-budgeted conversation store.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Persistent, token-budgeted conversation store")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory holding the database and key-value files.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend: auto, sqlite or file.
    #[arg(long, global = true)]
    backend: Option<BackendPreference>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a message.
    Add { role: Role, content: String },
    /// List stored messages, optionally filtered by role.
    List {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Case-insensitive search over content and summaries.
    Search { query: String },
    /// Messages between two RFC 3339 instants, inclusive.
    Range {
        #[arg(value_parser = parse_instant)]
        from: DateTime<Utc>,
        #[arg(value_parser = parse_instant)]
        to: DateTime<Utc>,
    },
    /// Replace the content of a message.
    Update { id: String, content: String },
    /// Delete a message.
    Delete { id: String },
    /// Messages that fit the prompt budget.
    Conversation,
    /// Evict old messages down to the budget.
    Cleanup,
    /// Show the ambient context record.
    Context,
    /// Record user text and print the prompt payload.
    Prompt { text: String },
    /// Backend and message statistics.
    Stats,
    /// Round-trip a probe value through the backend.
    Check,
    /// Delete all stored data.
    Clear,
}

fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    instant::parse(raw).map_err(|e| format!("invalid RFC 3339 instant {raw:?}: {e}"))
}

fn resolve_settings(cli: &Cli) -> Result<ParleySettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    if let Some(dir) = &cli.data_dir {
        settings.storage.data_dir.clone_from(dir);
    }
    if let Some(backend) = cli.backend {
        settings.storage.backend = backend;
    }
    Ok(settings)
}

fn print(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, manager: &mut ContextManager) -> Result<serde_json::Value> {
    let storage = manager.storage();
    let value = match command {
        Command::Add { role, content } => {
            let message = manager.add_message(role, &content).await?;
            json!({ "added": message, "legacyId": message.legacy_id() })
        }
        Command::List { role } => {
            let messages = match role {
                Some(role) => storage.get_messages_by_role(role).await?,
                None => storage.get_all_messages().await?,
            };
            json!(messages)
        }
        Command::Search { query } => json!(storage.search_messages(&query).await?),
        Command::Range { from, to } => {
            json!(storage.get_messages_by_date_range(from, to).await?)
        }
        Command::Update { id, content } => {
            let existing = storage
                .get_all_messages()
                .await?
                .into_iter()
                .find(|m| m.matches_id(&id));
            let updated = match existing {
                Some(mut replacement) => {
                    replacement.content = content;
                    storage.update_message(&id, replacement).await?
                }
                None => false,
            };
            json!({ "id": id, "updated": updated })
        }
        Command::Delete { id } => {
            let deleted = storage.delete_message(&id).await?;
            json!({ "id": id, "deleted": deleted })
        }
        Command::Conversation => json!(manager.get_conversation_messages().await?),
        Command::Cleanup => json!(manager.cleanup_old_messages().await?),
        Command::Context => {
            manager.ensure_context_available().await?;
            json!(manager.get_context().await)
        }
        Command::Prompt { text } => {
            let payload = ChatTurn::new(manager).begin(&text).await;
            json!(payload)
        }
        Command::Stats => json!(storage.get_storage_stats().await?),
        Command::Check => json!({
            "backend": storage.backend_kind(),
            "location": storage.location(),
            "ok": storage.test_storage().await,
        }),
        Command::Clear => {
            manager.clear_all_data().await?;
            json!({ "cleared": true })
        }
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let _ = init_telemetry(&TelemetryConfig::from_settings(&settings.logging));
    tracing::debug!(
        data_dir = %settings.storage.data_dir.display(),
        backend = %settings.storage.backend,
        "settings resolved"
    );

    let mut manager = ContextManager::from_settings(&settings)
        .await
        .context("Failed to open conversation storage")?;

    let value = run(cli.command, &mut manager).await?;
    print(&value)
}
