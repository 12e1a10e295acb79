//! Command line front end for the sms-triage store
#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use sms_triage::config::AppConfig;
use sms_triage::export::{export_to_file, ExportFormat};
use sms_triage::logging::init_logging;
use sms_triage::models::UnknownVariant;
use sms_triage::{
    Database, DecisionEngine, IncomingMessage, KeywordClassifier, LiveQuery, MessageCategory, MessageQuery,
    NewAllowedSender, OverrideController, Subscription,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding database.path
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and store a message, or a JSON array of messages
    Evaluate {
        /// Sender phone number or short code
        #[arg(short, long, required_unless_present = "batch")]
        sender: Option<String>,

        /// Message text
        #[arg(short, long, required_unless_present = "batch")]
        body: Option<String>,

        /// Receipt time (RFC 3339 or YYYY-MM-DD); defaults to now
        #[arg(short, long, value_parser = parse_timestamp)]
        received_at: Option<DateTime<Utc>>,

        /// JSON file holding `[{"sender", "body", "received_at"}, ...]`
        #[arg(long, conflicts_with_all = ["sender", "body"])]
        batch: Option<PathBuf>,
    },
    /// Re-run classification for a stored message without a user override
    Reclassify {
        /// Message id
        id: i64,
    },
    /// Manage trusted senders
    #[command(subcommand)]
    Allow(AllowCommand),
    /// Inspect stored messages
    #[command(subcommand)]
    Messages(MessagesCommand),
    /// Record a user decision for a message
    Override {
        /// Message id
        id: i64,

        /// Allow the message instead of blocking it
        #[arg(long)]
        unblock: bool,
    },
    /// Mark messages as read
    Read {
        /// Message id
        #[arg(long, required_unless_present = "category", conflicts_with = "category")]
        id: Option<i64>,

        /// Every message of this category
        #[arg(long, value_parser = parse_category)]
        category: Option<MessageCategory>,
    },
    /// Delete old or unwanted messages
    Sweep {
        /// Delete messages older than this many days
        #[arg(long, group = "mode")]
        older_than_days: Option<u32>,

        /// Delete every message of this category
        #[arg(long, value_parser = parse_category, group = "mode")]
        category: Option<MessageCategory>,

        /// Apply retention.max_age_days from the configuration
        #[arg(long, group = "mode")]
        retention: bool,
    },
    /// Write messages to a CSV or JSON file
    Export {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// csv or json
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        #[command(flatten)]
        filter: QueryArgs,
    },
    /// Print a live view that refreshes after every change
    Watch {
        /// Watch active allow-list entries instead of messages
        #[arg(long)]
        allow_list: bool,

        #[command(flatten)]
        filter: QueryArgs,
    },
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Subcommand)]
enum AllowCommand {
    /// Trust a sender
    Add {
        /// Phone number or short code
        phone: String,
        /// Human label
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete every entry for a sender, history included
    Remove {
        /// Phone number or short code
        phone: String,
    },
    /// Stop trusting a sender, keeping history
    Deactivate {
        /// Phone number or short code
        phone: String,
    },
    /// Trust the most recent entry for a sender again
    Activate {
        /// Phone number or short code
        phone: String,
    },
    /// List entries, newest first
    List {
        /// Include deactivated history
        #[arg(long)]
        all: bool,
    },
    /// Report whether a sender is trusted
    Check {
        /// Phone number or short code
        phone: String,
    },
}

#[derive(Subcommand)]
enum MessagesCommand {
    /// List messages, newest first
    List {
        #[command(flatten)]
        filter: QueryArgs,
    },
    /// Totals per category
    Stats {
        /// Only count messages received at or after this time
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,
    },
}

#[derive(Args, Clone)]
struct QueryArgs {
    /// Only this category
    #[arg(long, value_parser = parse_category, conflicts_with_all = ["blocked", "since"])]
    category: Option<MessageCategory>,

    /// Only blocked messages
    #[arg(long, conflicts_with = "since")]
    blocked: bool,

    /// Only messages received at or after this time
    #[arg(long, value_parser = parse_timestamp)]
    since: Option<DateTime<Utc>>,

    /// Cap on the number of rows
    #[arg(short, long)]
    limit: Option<usize>,
}

impl QueryArgs {
    fn query(&self) -> MessageQuery {
        let limit = self.limit;
        if let Some(category) = self.category {
            MessageQuery::ByCategory { category, limit }
        } else if self.blocked {
            MessageQuery::Blocked { limit }
        } else if let Some(since) = self.since {
            if limit.is_some() {
                warn!("--limit is ignored together with --since");
            }
            MessageQuery::Since { since }
        } else {
            MessageQuery::All { limit }
        }
    }
}

fn parse_category(s: &str) -> std::result::Result<MessageCategory, UnknownVariant> {
    s.to_ascii_uppercase().parse()
}

/// Accept RFC 3339 or a bare date (midnight UTC)
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .context("Invalid date format, use YYYY-MM-DD or RFC 3339")?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &cli.database {
        config.database.path.clone_from(path);
    }

    let _log_guard = init_logging(&config.logging)?;

    let command = match cli.command {
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        }
        command => command,
    };

    info!("Starting sms-triage");
    let db = Database::with_config(&config.database).context("Failed to open database")?;

    match command {
        Commands::Evaluate {
            sender,
            body,
            received_at,
            batch,
        } => evaluate(&config, &db, sender, body, received_at, batch).await?,
        Commands::Reclassify { id } => {
            let engine = build_engine(&config, &db)?;
            print_json(&engine.reclassify(id).await?)?;
        }
        Commands::Allow(command) => allow(&db, command)?,
        Commands::Messages(command) => messages(&db, command)?,
        Commands::Override { id, unblock } => {
            let controller = OverrideController::new(db.clone(), config.retention.clone());
            controller.apply_user_override(id, !unblock)?;
            println!("message {id} {}", if unblock { "allowed" } else { "blocked" });
        }
        Commands::Read { id, category } => {
            let controller = OverrideController::new(db.clone(), config.retention.clone());
            if let Some(id) = id {
                controller.mark_as_read(id)?;
                println!("message {id} marked read");
            } else if let Some(category) = category {
                let rows = controller.mark_category_as_read(category)?;
                println!("{rows} {category} messages marked read");
            }
        }
        Commands::Sweep {
            older_than_days,
            category,
            retention,
        } => {
            let controller = OverrideController::new(db.clone(), config.retention.clone());
            let removed = if let Some(days) = older_than_days {
                controller.sweep_older_than(Utc::now() - chrono::Duration::days(i64::from(days)))?
            } else if let Some(category) = category {
                controller.sweep_category(category)?
            } else if retention {
                controller.apply_retention(Utc::now())?
            } else {
                bail!("Choose one of --older-than-days, --category or --retention");
            };
            println!("{removed} messages deleted");
        }
        Commands::Export {
            output,
            format,
            filter,
        } => {
            let rows = db.messages().list(&filter.query())?;
            export_to_file(&rows, format, &output)?;
            println!("{} messages written to {}", rows.len(), output.display());
        }
        Commands::Watch { allow_list, filter } => {
            if allow_list {
                watch(db.allow_list().watch_active()).await?;
            } else {
                watch(db.messages().watch(filter.query())).await?;
            }
        }
        Commands::Config => {}
    }

    Ok(())
}

fn build_engine(config: &AppConfig, db: &Database) -> Result<DecisionEngine> {
    let classifier = KeywordClassifier::new(&config.classifier).context("Invalid classifier pattern")?;
    Ok(DecisionEngine::new(db.clone(), Arc::new(classifier), config.engine.clone()))
}

async fn evaluate(
    config: &AppConfig,
    db: &Database,
    sender: Option<String>,
    body: Option<String>,
    received_at: Option<DateTime<Utc>>,
    batch: Option<PathBuf>,
) -> Result<()> {
    let engine = build_engine(config, db)?;

    if let Some(path) = batch {
        let file = std::fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let messages: Vec<IncomingMessage> =
            serde_json::from_reader(std::io::BufReader::new(file)).context("Invalid batch file")?;
        let stored = engine.evaluate_batch(messages).await?;
        info!(count = stored.len(), "batch stored");
        return print_json(&stored);
    }

    let (Some(sender), Some(body)) = (sender, body) else {
        bail!("--sender and --body are required without --batch");
    };
    let message = IncomingMessage::new(sender, body, received_at.unwrap_or_else(Utc::now));
    print_json(&engine.evaluate(message).await?)
}

fn allow(db: &Database, command: AllowCommand) -> Result<()> {
    let store = db.allow_list();
    match command {
        AllowCommand::Add { phone, name } => {
            let mut entry = NewAllowedSender::new(phone);
            if let Some(name) = name {
                entry = entry.with_display_name(name);
            }
            let id = store.insert(&entry)?;
            println!("added {} as entry {id}", entry.phone_number);
        }
        AllowCommand::Remove { phone } => println!("{} entries removed", store.remove(&phone)?),
        AllowCommand::Deactivate { phone } => println!("{} entries deactivated", store.deactivate(&phone)?),
        AllowCommand::Activate { phone } => println!("{} entries changed", store.activate(&phone)?),
        AllowCommand::List { all } => {
            let entries = if all { store.list_all()? } else { store.list_active()? };
            print_json(&entries)?;
        }
        AllowCommand::Check { phone } => {
            let allowed = store.is_allowed(&phone)?;
            println!("{phone}: {}", if allowed { "allowed" } else { "not allowed" });
        }
    }
    Ok(())
}

fn messages(db: &Database, command: MessagesCommand) -> Result<()> {
    let store = db.messages();
    match command {
        MessagesCommand::List { filter } => print_json(&store.list(&filter.query())?),
        MessagesCommand::Stats { since } => print_json(&store.stats(since)?),
    }
}

async fn watch<Q>(mut subscription: Subscription<Q>) -> Result<()>
where
    Q: LiveQuery,
    Q::Output: Serialize,
{
    let handle = subscription.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    while let Some(result) = subscription.next().await {
        print_json(&result?)?;
    }
    info!("watch cancelled");
    Ok(())
}
