mod store_util;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use estate_core::api::HttpBackendApi;
use estate_core::chat::{ChatService, Message, ParticipantRole, RoomKey, resolve_room_id};
use estate_core::credentials::CredentialStore;
use estate_core::payment::PaymentGateway;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "estate")]
#[command(about = "Operator CLI for estate chat rooms and payments")]
struct Cli {
    /// Store namespace: general or locker
    #[arg(long, global = true, default_value = "general")]
    namespace: String,

    /// Override the namespace's realtime-database URL
    #[arg(long, global = true, env = "ESTATE_STORE_URL")]
    store_url: Option<String>,

    /// Database auth token appended to store requests
    #[arg(long, global = true, env = "ESTATE_STORE_AUTH", hide_env_values = true)]
    store_auth: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Args)]
struct RoomArgs {
    /// Admin user id
    #[arg(long)]
    admin: String,

    /// Resident user id
    #[arg(long)]
    resident: String,

    /// Optional context (e.g. a locker id) for a separate room
    #[arg(long)]
    context: Option<String>,
}

impl RoomArgs {
    fn key(&self) -> RoomKey {
        resolve_room_id(&self.admin, &self.resident, self.context.as_deref())
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the room key for an admin/resident pair
    RoomId {
        #[command(flatten)]
        room: RoomArgs,
    },

    /// Create the room if needed and append a message
    Send {
        #[command(flatten)]
        room: RoomArgs,

        /// Sender user id
        #[arg(long)]
        sender: String,

        /// Sender role: admin or user
        #[arg(long, default_value = "admin")]
        role: String,

        /// Message text
        #[arg(long)]
        text: String,
    },

    /// Print the ordered messages of a room
    History {
        #[command(flatten)]
        room: RoomArgs,

        /// Max messages to return (newest kept)
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Stream room snapshots (runs until interrupted or --timeout)
    Watch {
        #[command(flatten)]
        room: RoomArgs,

        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Count messages a user has not read
    Unread {
        #[command(flatten)]
        room: RoomArgs,

        #[arg(long)]
        user: String,
    },

    /// Mark the other party's messages read for a user
    MarkRead {
        #[command(flatten)]
        room: RoomArgs,

        #[arg(long)]
        user: String,
    },

    /// Query a payment transaction with a cached login
    PaymentStatus {
        /// Transaction id from payment initiation
        #[arg(long)]
        transaction: String,

        /// REST API base URL
        #[arg(long, env = "ESTATE_API_URL")]
        api_url: String,

        /// Directory holding credentials.json
        #[arg(long, default_value = ".estate-cli")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.cmd {
        Command::RoomId { room } => {
            print(json!({ "room_id": room.key().as_str() }));
            Ok(())
        }
        Command::Send {
            room,
            sender,
            role,
            text,
        } => cmd_send(&cli, room, sender, role, text).await,
        Command::History { room, limit } => cmd_history(&cli, room, *limit).await,
        Command::Watch { room, timeout } => cmd_watch(&cli, room, *timeout).await,
        Command::Unread { room, user } => cmd_unread(&cli, room, user).await,
        Command::MarkRead { room, user } => cmd_mark_read(&cli, room, user).await,
        Command::PaymentStatus {
            transaction,
            api_url,
            data_dir,
        } => cmd_payment_status(transaction, api_url, data_dir).await,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn chat(cli: &Cli) -> anyhow::Result<ChatService> {
    let namespace = store_util::parse_namespace(&cli.namespace)?;
    store_util::connect_chat(namespace, cli.store_url.as_deref(), cli.store_auth.clone())
}

fn parse_role(raw: &str) -> anyhow::Result<ParticipantRole> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(ParticipantRole::Admin),
        "user" | "resident" => Ok(ParticipantRole::User),
        other => bail!("unknown role {other:?} (expected admin or user)"),
    }
}

fn message_json(m: &Message) -> serde_json::Value {
    json!({
        "id": m.id,
        "sender_id": m.sender_id,
        "sender_role": m.sender_role.as_str(),
        "text": m.text,
        "timestamp": m.timestamp,
        "read": m.read,
    })
}

fn newest(messages: &[Message], limit: usize) -> &[Message] {
    &messages[messages.len().saturating_sub(limit)..]
}

fn print(v: serde_json::Value) {
    match serde_json::to_string_pretty(&v) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("json encode: {e}"),
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn cmd_send(
    cli: &Cli,
    room: &RoomArgs,
    sender: &str,
    role: &str,
    text: &str,
) -> anyhow::Result<()> {
    let chat = chat(cli)?;
    let role = parse_role(role)?;
    let key = chat
        .create_or_get_room(&room.admin, &room.resident, room.context.as_deref())
        .await
        .context("create or get room")?;
    let message_id = chat
        .append_message(&key, sender, text, role)
        .await
        .context("append message")?;
    print(json!({
        "room_id": key.as_str(),
        "message_id": message_id,
    }));
    Ok(())
}

async fn cmd_history(cli: &Cli, room: &RoomArgs, limit: usize) -> anyhow::Result<()> {
    let chat = chat(cli)?;
    let key = room.key();
    let mut feed = chat
        .subscribe_messages(&key)
        .await
        .context("subscribe to room")?;
    // The first snapshot is the current history.
    let messages = match feed.next().await {
        Some(result) => result.context("read messages")?,
        None => vec![],
    };
    feed.unsubscribe();

    let out: Vec<serde_json::Value> = newest(&messages, limit).iter().map(message_json).collect();
    print(json!({
        "room_id": key.as_str(),
        "messages": out,
    }));
    Ok(())
}

async fn cmd_watch(cli: &Cli, room: &RoomArgs, timeout: u64) -> anyhow::Result<()> {
    let chat = chat(cli)?;
    let key = room.key();
    let mut feed = chat
        .subscribe_messages(&key)
        .await
        .context("subscribe to room")?;
    eprintln!("watching {key} (ctrl-c to stop)");

    let deadline =
        (timeout > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(timeout));
    let mut seen = 0usize;
    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, feed.next()).await {
                Ok(next) => next,
                Err(_) => break,
            },
            None => feed.next().await,
        };
        let Some(result) = next else {
            break;
        };
        let messages = result.context("room feed")?;
        // Snapshots are full lists; print only what is new.
        for m in messages.iter().skip(seen) {
            println!("{}", message_json(m));
        }
        seen = messages.len();
    }
    feed.unsubscribe();
    Ok(())
}

async fn cmd_unread(cli: &Cli, room: &RoomArgs, user: &str) -> anyhow::Result<()> {
    let chat = chat(cli)?;
    let key = room.key();
    let count = chat
        .get_unread_count(&key, user)
        .await
        .context("count unread")?;
    print(json!({
        "room_id": key.as_str(),
        "user": user,
        "unread": count,
    }));
    Ok(())
}

async fn cmd_mark_read(cli: &Cli, room: &RoomArgs, user: &str) -> anyhow::Result<()> {
    let chat = chat(cli)?;
    let key = room.key();
    if chat.get_room_details(&key).await?.is_none() {
        bail!("room not found: {key}");
    }
    let flipped = chat.mark_read(&key, user).await.context("mark read")?;
    print(json!({
        "room_id": key.as_str(),
        "user": user,
        "marked": flipped,
    }));
    Ok(())
}

async fn cmd_payment_status(
    transaction: &str,
    api_url: &str,
    data_dir: &Path,
) -> anyhow::Result<()> {
    let api = HttpBackendApi::new(api_url, CredentialStore::new(data_dir));
    let status = api
        .transaction_status(transaction)
        .await
        .with_context(|| format!("fetch status of {transaction}"))?;
    print(json!({
        "transaction_id": transaction,
        "status": status.as_str(),
        "terminal": status.is_terminal(),
    }));
    Ok(())
}
