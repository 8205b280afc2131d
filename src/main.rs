use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

use feedsync::model::{FeedSort, ItemId, PostPayload, VoteValue};
use feedsync::storage::{Database, DatabaseError, Moderator};
use feedsync::store::find_item;
use feedsync::{Config, Dispatcher, HttpGateway};

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Drive the activity feed client against a backend and print the resulting store")]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep running until the action's notification is dismissed
    #[arg(long)]
    wait_notification: bool,

    #[command(subcommand)]
    command: Intent,
}

#[derive(Subcommand, Debug)]
enum Intent {
    /// Fetch the feed
    Feed {
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
    /// Refresh the feed
    Refresh,
    /// Fetch the feed, then the page older than it
    More,
    /// Load comments under an item
    Comments {
        parent_id: i64,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Post a text message, or a comment with --parent
    Post {
        text: String,
        #[arg(long)]
        parent: Option<i64>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Check in to an event
    CheckIn { event_id: i64 },
    /// Vote on an item in the feed
    Vote {
        item_id: i64,
        #[arg(value_enum)]
        value: VoteArg,
    },
    /// Delete one of your own items
    Delete { item_id: i64 },
    /// Delete any item as moderator
    AdminDelete {
        item_id: i64,
        /// Also shadow-ban the author
        #[arg(long)]
        ban: bool,
    },
    /// Report an item
    Report { item_id: i64, description: String },
    /// Load a user's posts
    User { user_id: i64 },
    /// Load an event's posts
    Event { event_id: i64 },
    /// Persist moderator credentials
    SetModerator {
        token: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List persisted keys in the storage namespace
    Prefs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Hot,
    New,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VoteArg {
    Up,
    None,
    Down,
}

impl From<VoteArg> for VoteValue {
    fn from(value: VoteArg) -> Self {
        match value {
            VoteArg::Up => VoteValue::Up,
            VoteArg::None => VoteValue::None,
            VoteArg::Down => VoteValue::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config_dir.join("feedsync.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of feedsync appears to be running.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    if let Intent::Prefs = args.command {
        let prefix = format!("{}:", config.storage_namespace);
        for (key, value) in db.get_preferences_by_prefix(&prefix).await? {
            println!("{} ({} bytes)", key, value.len());
        }
        return Ok(());
    }

    let gateway = HttpGateway::new(
        &config.api_url,
        &config.device_id,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create HTTP client")?;

    let mut dispatcher = Dispatcher::new(gateway, db, config);
    dispatcher.restore_session().await;

    run_intent(&mut dispatcher, args.command).await?;
    dispatcher.settle().await;
    if args.wait_notification {
        dispatcher.await_notification_dismissal().await;
    }

    let snapshot = dispatcher.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Fetch the feed so intents that target an item can resolve it.
async fn load_feed(dispatcher: &mut Dispatcher<HttpGateway>) {
    dispatcher.fetch_feed();
    dispatcher.settle().await;
}

async fn run_intent(dispatcher: &mut Dispatcher<HttpGateway>, intent: Intent) -> Result<()> {
    match intent {
        Intent::Feed { sort } => match sort {
            Some(SortArg::Hot) => dispatcher.set_sort(FeedSort::Hot),
            Some(SortArg::New) => dispatcher.set_sort(FeedSort::New),
            None => dispatcher.fetch_feed(),
        },
        Intent::Refresh => dispatcher.refresh_feed(),
        Intent::More => {
            load_feed(dispatcher).await;
            dispatcher.load_more();
        }
        Intent::Comments { parent_id, offset } => {
            dispatcher.load_comments(ItemId(parent_id), offset);
        }
        Intent::Post {
            text,
            parent,
            offset,
        } => {
            let payload = match parent {
                Some(parent_id) => PostPayload::Comment {
                    text,
                    parent_id: ItemId(parent_id),
                },
                None => PostPayload::Text { text },
            };
            dispatcher.submit_content(payload, None, offset);
        }
        Intent::CheckIn { event_id } => {
            dispatcher.submit_content(PostPayload::CheckIn { event_id }, None, 0);
        }
        Intent::Vote { item_id, value } => {
            load_feed(dispatcher).await;
            dispatcher.vote(ItemId(item_id), value.into());
        }
        Intent::Delete { item_id } => {
            load_feed(dispatcher).await;
            let item = find_item(dispatcher.state(), ItemId(item_id))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Item {} is not in the feed", item_id))?;
            dispatcher.remove_item(&item);
        }
        Intent::AdminDelete { item_id, ban } => {
            load_feed(dispatcher).await;
            let item = find_item(dispatcher.state(), ItemId(item_id))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Item {} is not in the feed", item_id))?;
            dispatcher.remove_item_as_admin(&item, ban);
        }
        Intent::Report {
            item_id,
            description,
        } => {
            load_feed(dispatcher).await;
            let item = find_item(dispatcher.state(), ItemId(item_id))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Item {} is not in the feed", item_id))?;
            dispatcher.report_item(&item, &description);
        }
        Intent::User { user_id } => dispatcher.load_user_items(user_id),
        Intent::Event { event_id } => dispatcher.load_event_items(event_id),
        Intent::SetModerator { token, name } => {
            dispatcher
                .store_moderator(Moderator {
                    name,
                    token: SecretString::from(token),
                })
                .await
                .context("Failed to store moderator record")?;
        }
        Intent::Prefs => {}
    }
    Ok(())
}
