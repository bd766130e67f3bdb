//! The minimum default handler chain every knowledge object passes through.

use async_trait::async_trait;
use koi_core::{CrossRef, EventType, Relationship};
use koi_resolver::resolve_entity_multi_tier;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::handler::{Handler, HandlerOutcome};
use crate::object::KnowledgeObject;

/// Confidence changes smaller than this are not considered material for an
/// UPDATE-driven cross-reference overwrite.
pub const CONFIDENCE_EPSILON: f64 = 0.001;

// --- RID phase ---------------------------------------------------------

/// Drop events describing this node's own RID unless they originated
/// locally (source == node_rid), preventing self-referential loops.
pub struct BlockSelfReferential;

#[async_trait]
impl Handler for BlockSelfReferential {
    fn name(&self) -> &'static str {
        "block_self_referential"
    }

    async fn handle(&self, object: KnowledgeObject, ctx: &PipelineContext) -> HandlerOutcome {
        if object.rid == ctx.node_rid && object.source_node != ctx.node_rid {
            debug!(rid = %object.rid, "dropping self-referential event");
            return HandlerOutcome::StopChain(object);
        }
        HandlerOutcome::Continue(object)
    }
}

/// Marks the event type as normalised for this pass. A no-op on the typed
/// `KnowledgeObject` (the original mutated a raw dict in place); kept as a
/// distinct handler to preserve the chain's step-by-step shape.
pub struct SetForgetFlag;

#[async_trait]
impl Handler for SetForgetFlag {
    fn name(&self) -> &'static str {
        "set_forget_flag"
    }

    async fn handle(&self, mut object: KnowledgeObject, _ctx: &PipelineContext) -> HandlerOutcome {
        object.normalized_event_type = true;
        HandlerOutcome::Continue(object)
    }
}

/// On FORGET, delete the cross-reference for `(rid, source_node)` and stop
/// the chain — no resolution is attempted for a forgotten entity.
pub struct ForgetDeleteAndStop;

#[async_trait]
impl Handler for ForgetDeleteAndStop {
    fn name(&self) -> &'static str {
        "forget_delete_and_stop"
    }

    async fn handle(&self, mut object: KnowledgeObject, ctx: &PipelineContext) -> HandlerOutcome {
        if object.event_type != EventType::Forget {
            return HandlerOutcome::Continue(object);
        }
        match ctx.cross_refs.delete_for_remote(&object.rid, &object.source_node).await {
            Ok(()) => {
                info!(rid = %object.rid, source = %object.source_node, "forgot cross-reference");
            }
            Err(err) => {
                warn!(rid = %object.rid, source = %object.source_node, error = %err, "failed to delete cross-reference, aborting forget");
                object.store_error = true;
            }
        }
        HandlerOutcome::StopChain(object)
    }
}

/// Read `entity_name` from `contents.name` and `entity_type` from
/// `contents.@type` (or `contents.entity_type`), stripping a leading
/// `bkc:` prefix.
pub struct ExtractEntityType;

#[async_trait]
impl Handler for ExtractEntityType {
    fn name(&self) -> &'static str {
        "extract_entity_type"
    }

    async fn handle(&self, mut object: KnowledgeObject, _ctx: &PipelineContext) -> HandlerOutcome {
        if let Some(contents) = object.contents.as_ref() {
            if let Some(name) = contents.get("name").and_then(|v| v.as_str()) {
                object.entity_name = Some(name.trim().to_string());
            }
            let raw_type = contents
                .get("@type")
                .or_else(|| contents.get("entity_type"))
                .and_then(|v| v.as_str());
            if let Some(raw_type) = raw_type {
                object.entity_type = Some(strip_bkc_prefix(raw_type).to_string());
            }
        }
        HandlerOutcome::Continue(object)
    }
}

fn strip_bkc_prefix(raw: &str) -> &str {
    raw.strip_prefix("bkc:").unwrap_or(raw)
}

// --- Bundle phase --------------------------------------------------------

/// Logs (does not reject) unknown entity types — validation here is
/// informational, not enforced, per spec.
pub struct EntityTypeValidator;

#[async_trait]
impl Handler for EntityTypeValidator {
    fn name(&self) -> &'static str {
        "entity_type_validator"
    }

    async fn handle(&self, object: KnowledgeObject, _ctx: &PipelineContext) -> HandlerOutcome {
        if object.entity_type.is_none() {
            warn!(rid = %object.rid, "event carries no entity_type");
        }
        HandlerOutcome::Continue(object)
    }
}

/// Resolve the entity against the local registry and write or update the
/// cross-reference row.
pub struct CrossReferenceResolver;

#[async_trait]
impl Handler for CrossReferenceResolver {
    fn name(&self) -> &'static str {
        "cross_reference_resolver"
    }

    async fn handle(&self, mut object: KnowledgeObject, ctx: &PipelineContext) -> HandlerOutcome {
        let (Some(entity_name), Some(entity_type)) =
            (object.entity_name.clone(), object.entity_type.clone())
        else {
            return HandlerOutcome::Continue(object);
        };

        let result = resolve_entity_multi_tier(
            ctx.lookup.as_ref(),
            ctx.embedder.as_deref(),
            &entity_name,
            &entity_type,
            ctx.resolution_mode,
        )
        .await;

        object.local_uri = result.uri.clone();
        object.cross_ref_confidence = Some(result.confidence);
        object.cross_ref_relationship = Some(result.relationship);

        if let Some(uri) = result.uri.clone() {
            let existing = match ctx.cross_refs.get(&object.rid, &object.source_node).await {
                Ok(existing) => existing,
                Err(err) => {
                    warn!(rid = %object.rid, source = %object.source_node, error = %err, "failed to read existing cross-reference, aborting resolution for this event");
                    object.store_error = true;
                    return HandlerOutcome::Continue(object);
                }
            };
            let should_write = match &existing {
                None => true,
                Some(row) => {
                    let was_unresolved = row.relationship == Relationship::Unresolved;
                    let now_resolved = result.relationship != Relationship::Unresolved;
                    let materially_changed = object.event_type == EventType::Update
                        && (row.local_uri != uri
                            || row.relationship != result.relationship
                            || (row.confidence - result.confidence).abs() > CONFIDENCE_EPSILON);
                    (was_unresolved && now_resolved) || materially_changed
                }
            };
            if should_write {
                let write = ctx
                    .cross_refs
                    .upsert(CrossRef {
                        local_uri: uri,
                        remote_rid: object.rid.clone(),
                        remote_node: object.source_node.clone(),
                        relationship: result.relationship,
                        confidence: result.confidence,
                    })
                    .await;
                if let Err(err) = write {
                    warn!(rid = %object.rid, source = %object.source_node, error = %err, "failed to persist cross-reference, not confirming this event");
                    object.store_error = true;
                }
            }
        }

        HandlerOutcome::Continue(object)
    }
}

// --- Final phase ---------------------------------------------------------

/// Records the processing outcome. Purely observational.
pub struct LogProcessingResult;

#[async_trait]
impl Handler for LogProcessingResult {
    fn name(&self) -> &'static str {
        "log_processing_result"
    }

    async fn handle(&self, object: KnowledgeObject, _ctx: &PipelineContext) -> HandlerOutcome {
        info!(
            rid = %object.rid,
            event_type = ?object.event_type,
            local_uri = ?object.local_uri,
            relationship = ?object.cross_ref_relationship,
            "processed knowledge object"
        );
        HandlerOutcome::Continue(object)
    }
}
