use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RID types a node advertises as able to produce/consume events for.
pub const DEFAULT_EVENT_RID_TYPES: &[&str] = &["orn:koi-net.node", "github", "web"];
pub const DEFAULT_STATE_RID_TYPES: &[&str] = &["orn:koi-net.node"];

/// `(scheme, rest)` split of an opaque RID at the first `:`, e.g.
/// `"github:owner/repo:path.py"` -> `("github", "owner/repo:path.py")`.
pub fn extract_rid_type(rid: &str) -> &str {
    rid.split_once(':').map(|(scheme, _)| scheme).unwrap_or(rid)
}

/// Event kind carried by the wire protocol and the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    New,
    Update,
    Forget,
}

/// Node capability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Full,
    Partial,
}

/// A federation subscription between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeType {
    Poll,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeStatus {
    Proposed,
    Approved,
    Rejected,
}

/// What a node offers: the RID-type prefixes it will serve events/state for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provides {
    pub event: Vec<String>,
    pub state: Vec<String>,
}

/// A node's public, exchangeable identity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProfile {
    pub node_rid: String,
    pub node_name: String,
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub provides: Provides,
    /// Base64-encoded DER-encoded P-256 public key (SubjectPublicKeyInfo).
    pub public_key: String,
}

/// A federation edge row: a directional subscription between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub status: EdgeStatus,
}

/// The signed-envelope wrapper specified for all peer traffic. Field order
/// matters: it is exactly the order signed over, and must not be reordered
/// by a `#[serde(...)]` attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    pub source_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl<T> Envelope<T> {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// A small header describing an event's subject without its full body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub rid: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
}

/// An event as stored in the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub rid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<serde_json::Value>,
    pub source_node: String,
    pub target_node: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub delivered_to: Vec<String>,
    pub confirmed_by: Vec<String>,
}

/// A row in the locally-owned entity registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRegistryRow {
    pub fuseki_uri: String,
    pub koi_rid: Option<String>,
    pub entity_type: String,
    pub entity_text: String,
    pub normalized_text: String,
    pub aliases: Option<Vec<String>>,
    pub description: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The typed relationship a cross-reference asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    SameAs,
    RelatedTo,
    Unresolved,
}

impl Relationship {
    pub fn as_str(self) -> &'static str {
        match self {
            Relationship::SameAs => "same_as",
            Relationship::RelatedTo => "related_to",
            Relationship::Unresolved => "unresolved",
        }
    }
}

/// A row tying a local entity to a remote RID seen from a peer event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRef {
    pub local_uri: String,
    pub remote_rid: String,
    pub remote_node: String,
    pub relationship: Relationship,
    pub confidence: f64,
}

/// Code entity kind (property-graph node label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CodeEntityType {
    Function,
    Class,
    Module,
    File,
    Import,
    Interface,
}

impl CodeEntityType {
    pub fn label(self) -> &'static str {
        match self {
            CodeEntityType::Function => "Function",
            CodeEntityType::Class => "Class",
            CodeEntityType::Module => "Module",
            CodeEntityType::File => "File",
            CodeEntityType::Import => "Import",
            CodeEntityType::Interface => "Interface",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntity {
    pub entity_id: String,
    pub name: String,
    pub entity_type: CodeEntityType,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub language: String,
    pub repo: String,
    pub signature: Option<String>,
    pub params: Option<String>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub receiver_type: Option<String>,
    pub module_name: Option<String>,
    pub module_path: Option<String>,
    pub extraction_method: String,
    pub extraction_run_id: String,
}

/// Code edge kind (property-graph edge label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeEdgeType {
    Calls,
    Contains,
    BelongsTo,
    Imports,
}

impl CodeEdgeType {
    pub fn label(self) -> &'static str {
        match self {
            CodeEdgeType::Calls => "CALLS",
            CodeEdgeType::Contains => "CONTAINS",
            CodeEdgeType::BelongsTo => "BELONGS_TO",
            CodeEdgeType::Imports => "IMPORTS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEdge {
    pub edge_id: String,
    pub from_entity_id: String,
    /// Resolved at edge-load time; may start as a raw identifier/name text.
    pub to_entity_id: String,
    pub edge_type: CodeEdgeType,
    pub file_path: String,
    pub line_number: u32,
}

/// Per-file change-detection state the indexer maintains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    pub repo_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub byte_size: u64,
    pub line_count: u32,
    pub last_commit_hash: Option<String>,
    pub scanned_at: DateTime<Utc>,
    pub code_entity_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_type_extraction() {
        assert_eq!(extract_rid_type("github:owner/repo:path.py"), "github");
        assert_eq!(extract_rid_type("orn:koi-net.node:salish+abcd"), "orn");
        assert_eq!(extract_rid_type("noColon"), "noColon");
    }

    #[test]
    fn relationship_round_trip() {
        let value = serde_json::to_value(Relationship::SameAs).unwrap();
        assert_eq!(value, serde_json::json!("same_as"));
    }
}
