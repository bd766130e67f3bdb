//! Protocol router (C3): the inbound HTTP endpoints of the mesh node.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use koi_core::canonical::canonical_sha256_json;
use koi_core::{Envelope, Error as ProtocolError};
use koi_identity::{node_rid_matches_public_key, sign_envelope, verify_envelope};
use koi_pipeline::KnowledgeObject;
use serde_json::Value;
use tracing::warn;

use crate::state::AppState;
use crate::wire::{
    timestamp_to_z_format, Bundle, BundlesPayloadResponse, ConfirmEventsResponse,
    EventsPayloadResponse, HandshakeResponse, HealthResponse, ManifestsPayloadResponse,
    RequestPayload, RidsPayloadResponse, WireEvent, WireManifest,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/koi-net/handshake", post(handshake))
        .route("/koi-net/events/broadcast", post(broadcast))
        .route("/koi-net/events/poll", post(poll_events))
        .route("/koi-net/events/confirm", post(confirm_events))
        .route("/koi-net/manifests/fetch", post(fetch_manifests))
        .route("/koi-net/bundles/fetch", post(fetch_bundles))
        .route("/koi-net/rids/fetch", post(fetch_rids))
        .route("/koi-net/health", get(health))
        .with_state(state)
}

struct ProtocolErrorResponse(ProtocolError);

impl IntoResponse for ProtocolErrorResponse {
    fn into_response(self) -> Response {
        let status = axum::http::StatusCode::from_u16(self.0.http_status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({"error": self.0.to_string(), "error_code": self.0.code()});
        (status, Json(body)).into_response()
    }
}

/// Check `node_id` against its known public key's RID binding, if
/// `enforce_source_binding` is set. Independent of whether the request
/// carried a signature: an operator can require source-key/RID binding
/// without also requiring signed envelopes.
fn check_source_binding(
    state: &AppState,
    node_id: &str,
    public_key: &p256::ecdsa::VerifyingKey,
) -> Result<(), ProtocolError> {
    if !state.security.enforce_source_binding {
        return Ok(());
    }
    if node_rid_matches_public_key(
        node_id,
        public_key,
        state.security.allow_legacy16,
        state.security.allow_der64,
    ) {
        Ok(())
    } else {
        Err(ProtocolError::SourceKeyRidMismatch)
    }
}

/// Resolve `node_id`'s known public key from the peer directory and apply
/// [`check_source_binding`]. Used on the unsigned path, where there is no
/// envelope to pull a public key from.
async fn check_source_binding_by_lookup(
    state: &AppState,
    node_id: &str,
) -> Result<(), ProtocolError> {
    if !state.security.enforce_source_binding {
        return Ok(());
    }
    let public_key_b64 = state
        .peers
        .public_key_der_b64(node_id)
        .await
        .ok_or(ProtocolError::SourceKeyRidMismatch)?;
    let public_key = koi_identity::keypair::verifying_key_from_der_b64(&public_key_b64)
        .map_err(|_| ProtocolError::SourceKeyRidMismatch)?;
    check_source_binding(state, node_id, &public_key)
}

/// Authenticate an inbound request body: verify a signed envelope if
/// present, enforce the strict-mode requirement for one, and enforce
/// source-key/RID binding if configured — on both the signed and unsigned
/// path, since the two flags are independently settable. Returns the
/// unwrapped payload, the asserted source node, and whether the request
/// was signed (so the response can be wrapped the same way).
async fn authenticate(
    state: &AppState,
    body: Value,
) -> Result<(RequestPayload, String, bool), ProtocolError> {
    let is_signed = body.get("signature").map(|v| !v.is_null()).unwrap_or(false);

    if !is_signed {
        if state.security.require_signed {
            return Err(ProtocolError::UnsignedEnvelopeRequired);
        }
        let node_id = body
            .get("node_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        check_source_binding_by_lookup(state, &node_id).await?;
        let payload: RequestPayload =
            serde_json::from_value(body).map_err(|_| ProtocolError::InvalidPayload)?;
        return Ok((payload, node_id, false));
    }

    let envelope: Envelope<RequestPayload> =
        serde_json::from_value(body).map_err(|_| ProtocolError::InvalidPayload)?;
    let source_node = envelope.source_node.clone();
    let public_key_b64 = state
        .peers
        .public_key_der_b64(&source_node)
        .await
        .ok_or(ProtocolError::InvalidSignature)?;
    let public_key = koi_identity::keypair::verifying_key_from_der_b64(&public_key_b64)
        .map_err(|_| ProtocolError::InvalidSignature)?;

    check_source_binding(state, &source_node, &public_key)?;

    let expected_target =
        if state.security.enforce_target { Some(state.profile.node_rid.as_str()) } else { None };
    let (payload, source_node) =
        verify_envelope(envelope, &public_key, None, expected_target)?;
    Ok((payload, source_node, true))
}

/// Wrap `payload` as a signed envelope addressed to `target` iff the
/// inbound request was itself signed.
fn respond<T: serde::Serialize>(
    state: &AppState,
    payload: T,
    target: &str,
    was_signed: bool,
) -> Response {
    if was_signed {
        let envelope =
            sign_envelope(payload, state.profile.node_rid.clone(), Some(target.to_string()), &state.keypair);
        Json(envelope).into_response()
    } else {
        Json(payload).into_response()
    }
}

async fn handshake(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::Handshake { profile } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };
    let edges = state.peers.handshake(&state.profile.node_rid, profile).await;
    let response = HandshakeResponse { accepted: true, profile: state.profile.clone(), edges };
    respond(&state, response, &source_node, signed)
}

async fn broadcast(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::Broadcast { events } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };

    let mut accepted = 0u32;
    let mut duplicates = 0u32;
    for event in events {
        let ttl = koi_store::EventQueue::ttl_hours_for(&state.profile.node_rid, &source_node);
        let added = state
            .queue
            .add(
                event.event_type,
                &event.rid,
                event.manifest.clone(),
                event.contents.clone(),
                &source_node,
                ttl,
                Some(event.event_id),
                None,
            )
            .await;
        match added {
            Ok(Some(_)) => {
                accepted += 1;
                let mut object = KnowledgeObject::new(event.rid.clone(), event.event_type, source_node.clone());
                object.event_id = Some(event.event_id.to_string());
                object.contents = event.contents.clone();
                state.pipeline.process(object, &state.pipeline_ctx).await;
            }
            Ok(None) => duplicates += 1,
            Err(e) => warn!(error = %e, "failed to enqueue broadcast event"),
        }
    }

    let response = crate::wire::BroadcastResponse { accepted, duplicates };
    respond(&state, response, &source_node, signed)
}

async fn poll_events(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::PollEvents { limit, rid_types } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };
    let limit = limit.unwrap_or(50) as i64;
    let events = state
        .queue
        .poll(&source_node, limit, rid_types.as_deref())
        .await
        .unwrap_or_default();

    let wire_events = events
        .into_iter()
        .map(|e| WireEvent {
            event_id: e.event_id,
            event_type: e.event_type,
            rid: e.rid,
            manifest: e.manifest.map(|m| serde_json::to_value(m).unwrap_or(Value::Null)),
            contents: e.contents,
            source_node: e.source_node,
            queued_at: e.queued_at,
        })
        .collect();

    let response = EventsPayloadResponse { events: wire_events };
    respond(&state, response, &source_node, signed)
}

async fn confirm_events(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::ConfirmEvents { event_ids } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };
    let confirmed = state.queue.confirm(&event_ids, &source_node).await.unwrap_or(0) as u32;
    respond(&state, ConfirmEventsResponse { confirmed }, &source_node, signed)
}

async fn fetch_manifests(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::FetchManifests { rids } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };

    let mut manifests = Vec::new();
    let mut not_found = Vec::new();
    for rid in rids {
        match state.rids.bundle_for(&rid).await {
            Some(bundle) => manifests.push(bundle.manifest),
            None => not_found.push(rid),
        }
    }
    respond(&state, ManifestsPayloadResponse { manifests, not_found }, &source_node, signed)
}

async fn fetch_bundles(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::FetchBundles { rids } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };

    let mut bundles: Vec<Bundle> = Vec::new();
    let mut not_found = Vec::new();
    for rid in rids {
        match state.rids.bundle_for(&rid).await {
            Some(bundle) => bundles.push(bundle),
            None => not_found.push(rid),
        }
    }
    respond(&state, BundlesPayloadResponse { bundles, not_found }, &source_node, signed)
}

async fn fetch_rids(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let (payload, source_node, signed) = match authenticate(&state, body).await {
        Ok(v) => v,
        Err(e) => return ProtocolErrorResponse(e).into_response(),
    };
    let RequestPayload::FetchRids { rid_types } = payload else {
        return ProtocolErrorResponse(ProtocolError::InvalidPayload).into_response();
    };
    let rids = state.rids.list_rids(rid_types.as_deref()).await;
    respond(&state, RidsPayloadResponse { rids }, &source_node, signed)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let event_queue_size = state.queue.queue_size().await.unwrap_or(0);
    let peers = state.peers.known_peer_rids().await;
    Json(HealthResponse { node: state.profile.clone(), event_queue_size, peers }).into_response()
}

/// Derive a manifest's `sha256_hash` when absent.
pub fn manifest_sha256_hash(manifest: &WireManifest, contents: Option<&Value>) -> String {
    if !manifest.sha256_hash.is_empty() {
        return manifest.sha256_hash.clone();
    }
    if let Some(contents) = contents {
        return canonical_sha256_json(contents).unwrap_or_default();
    }
    canonical_sha256_json(&serde_json::json!({
        "rid": manifest.rid,
        "timestamp": timestamp_to_z_format(manifest.timestamp),
    }))
    .unwrap_or_default()
}
