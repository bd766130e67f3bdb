//! Knowledge of other nodes' profiles and public keys — the "node table"
//! the router consults for signature verification and handshake state.
//! An `RwLock<HashMap<...>>` guarding peer state, generalised to federation
//! edges instead of admission/reputation.

use std::collections::HashMap;

use async_trait::async_trait;
use koi_core::{Edge, EdgeStatus, EdgeType, NodeProfile};
use parking_lot::RwLock;

#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn public_key_der_b64(&self, node_rid: &str) -> Option<String>;
    async fn base_url(&self, node_rid: &str) -> Option<String>;
    /// Upsert `profile` and return the edges the local node accepts for
    /// it. Two nodes converge on an edge only once both sides have
    /// handshaked.
    async fn handshake(&self, local_node_rid: &str, profile: NodeProfile) -> Vec<Edge>;
    async fn known_peer_rids(&self) -> Vec<String>;
    async fn edges_where_target(&self, local_node_rid: &str) -> Vec<Edge>;
}

#[derive(Default)]
pub struct InMemoryPeerDirectory {
    profiles: RwLock<HashMap<String, NodeProfile>>,
    edges: RwLock<Vec<Edge>>,
}

impl InMemoryPeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerDirectory for InMemoryPeerDirectory {
    async fn public_key_der_b64(&self, node_rid: &str) -> Option<String> {
        self.profiles.read().get(node_rid).map(|p| p.public_key.clone())
    }

    async fn base_url(&self, node_rid: &str) -> Option<String> {
        self.profiles.read().get(node_rid).and_then(|p| p.base_url.clone())
    }

    async fn handshake(&self, local_node_rid: &str, profile: NodeProfile) -> Vec<Edge> {
        let remote_rid = profile.node_rid.clone();
        self.profiles.write().insert(remote_rid.clone(), profile);

        // Both directions converge once each side has handshaked: the peer
        // polls us (source=peer, target=local) and we poll the peer
        // (source=local, target=peer).
        let mut edges = self.edges.write();
        for (source, target) in
            [(remote_rid.clone(), local_node_rid.to_string()), (local_node_rid.to_string(), remote_rid.clone())]
        {
            if !edges.iter().any(|e| e.source == source && e.target == target) {
                edges.push(Edge {
                    source,
                    target,
                    edge_type: EdgeType::Poll,
                    status: EdgeStatus::Approved,
                });
            }
        }
        edges.iter().filter(|e| e.source == remote_rid || e.target == remote_rid).cloned().collect()
    }

    async fn known_peer_rids(&self) -> Vec<String> {
        self.profiles.read().keys().cloned().collect()
    }

    async fn edges_where_target(&self, local_node_rid: &str) -> Vec<Edge> {
        self.edges
            .read()
            .iter()
            .filter(|e| e.target == local_node_rid && e.edge_type == EdgeType::Poll)
            .filter(|e| e.status == EdgeStatus::Approved)
            .cloned()
            .collect()
    }
}
