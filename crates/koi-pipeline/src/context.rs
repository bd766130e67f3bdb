//! Dependencies threaded through the handler chain without handlers holding
//! each other directly — a single context passed in rather than components
//! holding a borrow of each other.

use async_trait::async_trait;
use koi_core::CrossRef;
use koi_resolver::{EntityLookup, Embedder, ResolutionMode};
use thiserror::Error;

/// A cross-reference store backend failed. Carries the underlying backend
/// error (e.g. a database error) without this crate depending on any
/// concrete storage engine.
#[derive(Debug, Error)]
pub enum CrossRefError {
    #[error("cross-reference store error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Abstracts cross-reference persistence so handlers don't depend on a
/// concrete store implementation.
#[async_trait]
pub trait CrossRefStore: Send + Sync {
    async fn get(
        &self,
        remote_rid: &str,
        remote_node: &str,
    ) -> Result<Option<CrossRef>, CrossRefError>;
    async fn upsert(&self, cross_ref: CrossRef) -> Result<(), CrossRefError>;
    /// Delete the cross-reference(s) for `(remote_rid, remote_node)`, called
    /// by the FORGET handler.
    async fn delete_for_remote(
        &self,
        remote_rid: &str,
        remote_node: &str,
    ) -> Result<(), CrossRefError>;
}

pub struct PipelineContext {
    pub node_rid: String,
    pub resolution_mode: ResolutionMode,
    pub lookup: Box<dyn EntityLookup>,
    pub embedder: Option<Box<dyn Embedder>>,
    pub cross_refs: Box<dyn CrossRefStore>,
}

impl PipelineContext {
    pub fn new(
        node_rid: String,
        resolution_mode: ResolutionMode,
        lookup: Box<dyn EntityLookup>,
        embedder: Option<Box<dyn Embedder>>,
        cross_refs: Box<dyn CrossRefStore>,
    ) -> Self {
        Self { node_rid, resolution_mode, lookup, embedder, cross_refs }
    }
}
