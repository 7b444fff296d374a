use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use profiler_store::{config::CONFIG_ENV, init_logging, open_storage, ListOrder, SettingsStore};

#[derive(Parser)]
#[command(name = "profiler-store", about = "Inspect stored profiling sessions")]
struct Cli {
    /// Settings file (JSON). Defaults apply when it does not exist.
    #[arg(long, env = CONFIG_ENV, default_value = "profiler-store.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List session ids by start time
    List {
        #[arg(long)]
        limit: Option<usize>,
        /// Oldest first
        #[arg(long)]
        asc: bool,
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// List session ids a user has not viewed yet
    Unviewed { user: String },
    /// Print one session as JSON
    Show { id: Uuid },
    /// Mark a session viewed (or unviewed)
    Mark {
        user: String,
        id: Uuid,
        #[arg(long)]
        unviewed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = SettingsStore::new(cli.config)?.settings();
    let storage = open_storage(&settings)?;
    log::info!("Using database {}", storage.store().path().display());

    match cli.command {
        Command::List {
            limit,
            asc,
            since,
            until,
        } => {
            let order = if asc {
                ListOrder::Ascending
            } else {
                ListOrder::Descending
            };
            let limit = limit.unwrap_or(settings.default_list_limit);
            for id in storage.list_ids(limit, since, until, order).await? {
                println!("{id}");
            }
        }
        Command::Unviewed { user } => {
            for id in storage.list_unviewed_ids(&user).await? {
                println!("{id}");
            }
        }
        Command::Show { id } => match storage.load(id).await? {
            Some(session) => {
                let json = serde_json::to_string_pretty(&session)
                    .context("failed to serialize session")?;
                println!("{json}");
            }
            None => println!("session {id} not found"),
        },
        Command::Mark { user, id, unviewed } => {
            if unviewed {
                storage.mark_unviewed(&user, id).await?;
            } else {
                storage.mark_viewed(&user, id).await?;
            }
        }
    }

    Ok(())
}
