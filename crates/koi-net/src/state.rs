use std::sync::Arc;

use koi_core::env::SecurityPolicy;
use koi_core::NodeProfile;
use koi_identity::KeyPair;
use koi_pipeline::{KnowledgePipeline, PipelineContext};
use koi_store::EventQueue;

use crate::peer_directory::PeerDirectory;
use crate::rid_store::RidStore;

/// Everything the router and poller need, threaded through as a single
/// `NodeContext` rather than components holding a borrow of each other.
pub struct AppState {
    pub keypair: KeyPair,
    pub profile: NodeProfile,
    pub security: SecurityPolicy,
    pub queue: Arc<EventQueue>,
    pub peers: Arc<dyn PeerDirectory>,
    pub rids: Arc<dyn RidStore>,
    pub pipeline: Arc<KnowledgePipeline>,
    pub pipeline_ctx: Arc<PipelineContext>,
}
