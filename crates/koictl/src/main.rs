//! koictl - operator CLI for a koid node: identity inspection, manual
//! poll/broadcast against a peer, and queue inspection.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use koi_core::NodeType;
use koi_net::wire::{BroadcastResponse, EventsPayloadResponse, RequestPayload, WireEvent};
use koi_core::Envelope;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "koictl")]
#[command(about = "Operator CLI for a koid mesh node")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the node's private key
    #[arg(long, env = "KOI_STATE_DIR", default_value = "./data/koid", global = true)]
    state_dir: PathBuf,

    /// This node's name (used to derive its node RID)
    #[arg(long, env = "KOI_NODE_NAME", default_value = "koi-node", global = true)]
    node_name: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show this node's identity (node RID, public key)
    Identity,

    /// Manually poll a peer for events and print them
    Poll {
        /// Peer base URL, e.g. http://peer.example.com:8080
        peer_url: String,
        /// This node's RID, as known to the peer (the target of the poll)
        target_node: String,
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Manually broadcast an event to a peer
    Broadcast {
        peer_url: String,
        target_node: String,
        rid: String,
        #[arg(long, default_value = "NEW")]
        event_type: String,
    },

    /// Inspect the local event queue
    Queue {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("koictl={}", if cli.verbose { "debug" } else { "warn" }).parse().unwrap());
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match cli.command {
        Command::Identity => show_identity(&cli.state_dir, &cli.node_name)?,
        Command::Poll { peer_url, target_node, limit } => poll_peer(&cli.state_dir, &cli.node_name, &peer_url, &target_node, limit).await?,
        Command::Broadcast { peer_url, target_node, rid, event_type } => {
            broadcast_to_peer(&cli.state_dir, &cli.node_name, &peer_url, &target_node, &rid, &event_type).await?
        }
        Command::Queue { database_url } => inspect_queue(&database_url).await?,
    }

    Ok(())
}

fn show_identity(state_dir: &PathBuf, node_name: &str) -> anyhow::Result<()> {
    let (_keypair, profile) = koi_identity::load_or_create_identity(state_dir, node_name, None, NodeType::Full)?;
    println!("node_rid:    {}", profile.node_rid);
    println!("node_name:   {}", profile.node_name);
    println!("public_key:  {}", profile.public_key);
    println!("event rids:  {}", profile.provides.event.join(", "));
    println!("state rids:  {}", profile.provides.state.join(", "));
    Ok(())
}

fn parse_event_type(raw: &str) -> koi_core::EventType {
    match raw.to_uppercase().as_str() {
        "UPDATE" => koi_core::EventType::Update,
        "FORGET" => koi_core::EventType::Forget,
        _ => koi_core::EventType::New,
    }
}

async fn poll_peer(state_dir: &PathBuf, node_name: &str, peer_url: &str, target_node: &str, limit: u32) -> anyhow::Result<()> {
    let (keypair, profile) = koi_identity::load_or_create_identity(state_dir, node_name, None, NodeType::Full)?;

    let payload = RequestPayload::PollEvents { limit: Some(limit), rid_types: None };
    let envelope = koi_identity::sign_envelope(payload, profile.node_rid.clone(), Some(target_node.to_string()), &keypair);

    let client = reqwest::Client::new();
    let response: Envelope<EventsPayloadResponse> =
        client.post(format!("{peer_url}/koi-net/events/poll")).json(&envelope).send().await?.json().await?;

    for event in &response.payload.events {
        print_event(event);
    }
    println!("{} event(s)", response.payload.events.len());
    Ok(())
}

async fn broadcast_to_peer(
    state_dir: &PathBuf,
    node_name: &str,
    peer_url: &str,
    target_node: &str,
    rid: &str,
    event_type: &str,
) -> anyhow::Result<()> {
    let (keypair, profile) = koi_identity::load_or_create_identity(state_dir, node_name, None, NodeType::Full)?;

    let event = WireEvent {
        event_id: Uuid::new_v4(),
        event_type: parse_event_type(event_type),
        rid: rid.to_string(),
        manifest: None,
        contents: None,
        source_node: profile.node_rid.clone(),
        queued_at: chrono::Utc::now(),
    };
    let payload = RequestPayload::Broadcast { events: vec![event] };
    let envelope = koi_identity::sign_envelope(payload, profile.node_rid.clone(), Some(target_node.to_string()), &keypair);

    let client = reqwest::Client::new();
    let response: Envelope<BroadcastResponse> =
        client.post(format!("{peer_url}/koi-net/events/broadcast")).json(&envelope).send().await?.json().await?;

    println!("accepted: {}, duplicates: {}", response.payload.accepted, response.payload.duplicates);
    Ok(())
}

async fn inspect_queue(database_url: &str) -> anyhow::Result<()> {
    let pool = koi_store::connect(database_url).await?;
    let queue = koi_store::EventQueue::new(pool);
    let size = queue.queue_size().await?;
    println!("queue size: {size}");
    Ok(())
}

fn print_event(event: &WireEvent) {
    println!("{}  {:?}  {}", event.event_id, event.event_type, event.rid);
}
