//! The uniform handler interface: sync and async handlers return the same
//! outcome type, and the dispatcher awaits when the handler is async.

use async_trait::async_trait;

use crate::context::PipelineContext;
use crate::object::{HandlerPhase, KnowledgeObject};

/// What a handler decides after inspecting (and possibly mutating) the
/// object: keep going, or halt the whole chain for this object.
pub enum HandlerOutcome {
    Continue(KnowledgeObject),
    StopChain(KnowledgeObject),
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique name for logging (`log_processing_result`, diagnostics).
    fn name(&self) -> &'static str;

    /// If non-empty, this handler only runs for the listed entity types
    /// (by `KnowledgeObject::entity_type`, not RID type).
    fn entity_types(&self) -> &[&'static str] {
        &[]
    }

    /// If non-empty, this handler only runs for the listed event types.
    fn event_types(&self) -> &[koi_core::EventType] {
        &[]
    }

    async fn handle(
        &self,
        object: KnowledgeObject,
        ctx: &PipelineContext,
    ) -> HandlerOutcome;
}

/// Does `handler`'s filters admit `object`?
pub fn admits(handler: &dyn Handler, object: &KnowledgeObject) -> bool {
    let entity_types = handler.entity_types();
    if !entity_types.is_empty() {
        let matches = object
            .entity_type
            .as_deref()
            .map(|t| entity_types.contains(&t))
            .unwrap_or(false);
        if !matches {
            return false;
        }
    }
    let event_types = handler.event_types();
    if !event_types.is_empty() && !event_types.contains(&object.event_type) {
        return false;
    }
    true
}

/// A handler plus the phase it is registered under.
pub struct RegisteredHandler {
    pub phase: HandlerPhase,
    pub handler: Box<dyn Handler>,
}
