//! Wire protocol payload types. Timestamps are ISO-8601 UTC
//! (chrono's default `DateTime<Utc>` serde impl already emits trailing `Z`).

use chrono::{DateTime, Utc};
use koi_core::{Edge, EventType, NodeProfile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub rid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Value>,
    pub source_node: String,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireManifest {
    pub rid: String,
    pub timestamp: DateTime<Utc>,
    pub sha256_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub manifest: WireManifest,
    pub contents: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestPayload {
    #[serde(rename = "handshake")]
    Handshake { profile: NodeProfile },
    #[serde(rename = "broadcast")]
    Broadcast { events: Vec<WireEvent> },
    #[serde(rename = "poll_events")]
    PollEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rid_types: Option<Vec<String>>,
    },
    #[serde(rename = "confirm_events")]
    ConfirmEvents { event_ids: Vec<Uuid> },
    #[serde(rename = "fetch_manifests")]
    FetchManifests { rids: Vec<String> },
    #[serde(rename = "fetch_bundles")]
    FetchBundles { rids: Vec<String> },
    #[serde(rename = "fetch_rids")]
    FetchRids {
        #[serde(skip_serializing_if = "Option::is_none")]
        rid_types: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub profile: NodeProfile,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub accepted: u32,
    pub duplicates: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsPayloadResponse {
    pub events: Vec<WireEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmEventsResponse {
    pub confirmed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestsPayloadResponse {
    pub manifests: Vec<WireManifest>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlesPayloadResponse {
    pub bundles: Vec<Bundle>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidsPayloadResponse {
    pub rids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node: NodeProfile,
    pub event_queue_size: i64,
    pub peers: Vec<String>,
}

pub fn timestamp_to_z_format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
