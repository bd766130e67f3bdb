//! Node identity and signed-envelope transport (C1).

pub mod envelope;
pub mod keypair;
pub mod node_identity;

pub use envelope::{sign_envelope, verify_envelope};
pub use keypair::{KeyError, KeyPair};
pub use node_identity::{
    derive_node_rid, load_or_create_identity, node_rid_matches_public_key, private_key_path,
    RidMode,
};
