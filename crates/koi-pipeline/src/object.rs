//! The shared mutable record passed through the handler chain.

use koi_core::{EventType, Relationship};
use serde_json::Value;

/// The five ordered phases a [`KnowledgeObject`] passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerPhase {
    Rid,
    Manifest,
    Bundle,
    Network,
    Final,
}

impl HandlerPhase {
    pub const ALL: [HandlerPhase; 5] = [
        HandlerPhase::Rid,
        HandlerPhase::Manifest,
        HandlerPhase::Bundle,
        HandlerPhase::Network,
        HandlerPhase::Final,
    ];
}

/// The record a handler chain classifies, normalises, and resolves.
/// Explicit optional fields rather than a dynamic attribute bag, so each
/// handler's expectations are visible at the type level.
#[derive(Debug, Clone)]
pub struct KnowledgeObject {
    pub rid: String,
    pub event_type: EventType,
    pub manifest: Option<Value>,
    pub contents: Option<Value>,
    pub source_node: String,
    pub event_id: Option<String>,

    pub entity_type: Option<String>,
    pub entity_name: Option<String>,
    pub local_uri: Option<String>,
    pub cross_ref_confidence: Option<f64>,
    pub cross_ref_relationship: Option<Relationship>,
    pub network_targets: Vec<String>,

    /// Set true by `set_forget_flag` once `event_type` has been normalised
    /// for this pass; mirrors the original's dict-mutation flag.
    pub normalized_event_type: bool,

    /// Set true by a handler that hit a backend error while processing this
    /// object (e.g. a failed cross-reference read/write). Callers driving
    /// the pipeline use this to skip confirming the event, so the source
    /// node re-delivers it on the next poll.
    pub store_error: bool,
}

impl KnowledgeObject {
    pub fn new(rid: String, event_type: EventType, source_node: String) -> Self {
        Self {
            rid,
            event_type,
            manifest: None,
            contents: None,
            source_node,
            event_id: None,
            entity_type: None,
            entity_name: None,
            local_uri: None,
            cross_ref_confidence: None,
            cross_ref_relationship: None,
            network_targets: Vec::new(),
            normalized_event_type: false,
            store_error: false,
        }
    }
}
