//! Federation transport (C3) and background peer polling (C4).

pub mod peer_directory;
pub mod poller;
pub mod rid_store;
pub mod router;
pub mod state;
pub mod wire;

pub use peer_directory::{InMemoryPeerDirectory, PeerDirectory};
pub use poller::Poller;
pub use rid_store::{InMemoryRidStore, RidStore};
pub use router::build_router;
pub use state::AppState;
