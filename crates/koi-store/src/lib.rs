//! Shared relational store (C11) and the durable event queue built on it
//! (C2): schema, connection pool, and access patterns the rest of the node
//! shares.

pub mod cross_refs;
pub mod pool;
pub mod queue;
pub mod registry;

pub use cross_refs::PgCrossRefStore;
pub use pool::{connect, run_migrations};
pub use queue::{EventQueue, QueueError, DEFAULT_TTL_HOURS, REMOTE_TTL_HOURS};
pub use registry::PgEntityLookup;

#[cfg(test)]
mod tests {
    use koi_core::extract_rid_type;

    #[test]
    fn rid_type_extraction_matches_queue_filter_semantics() {
        assert_eq!(extract_rid_type("github:owner/repo:path.py"), "github");
    }
}
