//! Background peer poller (C4): pulls events from each approved POLL edge
//! where we are the target, processes them, and confirms best-effort.
//! Ported from `koi_poller.py`'s `KOIPoller`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use koi_identity::sign_envelope;
use koi_pipeline::KnowledgeObject;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::wire::{EventsPayloadResponse, RequestPayload};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
/// Cap for the (unused-in-schedule but retained) backoff window; consecutive
/// failures beyond 3 simply skip the peer for this cycle rather than
/// sleeping an exponential delay, matching the original's "simplified"
/// comment.
pub const MAX_BACKOFF_SECS: u64 = 600;
const SKIP_AFTER_FAILURES: u32 = 3;

pub struct Poller {
    state: Arc<AppState>,
    poll_interval: Duration,
    backoff: Mutex<HashMap<String, u32>>,
}

impl Poller {
    pub fn new(state: Arc<AppState>, poll_interval: Duration) -> Self {
        Self { state, poll_interval, backoff: Mutex::new(HashMap::new()) }
    }

    /// Spawn the polling loop as a background task. Aborting the returned
    /// handle stops it.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.poll_interval.as_secs(), "peer poller started");
            loop {
                if let Err(e) = self.poll_all_peers().await {
                    warn!(error = %e, "poller cycle failed");
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }

    async fn poll_all_peers(&self) -> anyhow::Result<()> {
        let edges = self.state.peers.edges_where_target(&self.state.profile.node_rid).await;

        for edge in edges {
            let source_node = edge.source;
            let failures = {
                let backoff = self.backoff.lock();
                *backoff.get(&source_node).unwrap_or(&0)
            };
            if failures > SKIP_AFTER_FAILURES {
                debug!(peer = %source_node, failures, "skipping peer, in backoff");
                continue;
            }

            let Some(base_url) = self.state.peers.base_url(&source_node).await else {
                warn!(peer = %source_node, "no base_url for peer, skipping");
                continue;
            };

            match self.poll_peer(&source_node, &base_url).await {
                Ok(()) => {
                    self.backoff.lock().insert(source_node, 0);
                }
                Err(e) => {
                    let mut backoff = self.backoff.lock();
                    let next = backoff.get(&source_node).copied().unwrap_or(0) + 1;
                    backoff.insert(source_node.clone(), next);
                    warn!(peer = %source_node, error = %e, failures = next, "poll failed");
                }
            }
        }
        Ok(())
    }

    async fn poll_peer(&self, source_node: &str, base_url: &str) -> anyhow::Result<()> {
        let payload = RequestPayload::PollEvents { limit: Some(50), rid_types: None };
        let envelope = sign_envelope(
            payload,
            self.state.profile.node_rid.clone(),
            Some(source_node.to_string()),
            &self.state.keypair,
        );

        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        let resp = client
            .post(format!("{base_url}/koi-net/events/poll"))
            .json(&envelope)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("poll {source_node}: HTTP {}", resp.status());
        }

        let body: Value = resp.json().await?;
        let public_key_b64 = self.state.peers.public_key_der_b64(source_node).await;
        let events = unwrap_events_response(body, public_key_b64.as_deref())?;

        if events.events.is_empty() {
            return Ok(());
        }
        info!(peer = %source_node, count = events.events.len(), "received events");

        let mut confirm_batch = Vec::new();
        for event in events.events {
            let mut object = KnowledgeObject::new(event.rid.clone(), event.event_type, source_node.to_string());
            object.event_id = Some(event.event_id.to_string());
            object.contents = event.contents.clone();
            let processed = self.state.pipeline.process(object, &self.state.pipeline_ctx).await;
            if processed.store_error {
                warn!(peer = %source_node, rid = %processed.rid, "not confirming event, pipeline hit a store error");
                continue;
            }
            confirm_batch.push(event.event_id);
        }

        if !confirm_batch.is_empty() {
            self.confirm_events(source_node, base_url, &confirm_batch).await;
        }
        Ok(())
    }

    /// Confirm is best-effort: a failure here just means the source will
    /// re-deliver the events next poll, which the pipeline's idempotent
    /// handlers tolerate.
    async fn confirm_events(&self, source_node: &str, base_url: &str, event_ids: &[Uuid]) {
        let payload = RequestPayload::ConfirmEvents { event_ids: event_ids.to_vec() };
        let envelope = sign_envelope(
            payload,
            self.state.profile.node_rid.clone(),
            Some(source_node.to_string()),
            &self.state.keypair,
        );

        let client = match reqwest::Client::builder().timeout(Duration::from_secs(15)).build() {
            Ok(c) => c,
            Err(e) => {
                debug!(peer = %source_node, error = %e, "confirm client build failed");
                return;
            }
        };

        match client.post(format!("{base_url}/koi-net/events/confirm")).json(&envelope).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(peer = %source_node, confirmed = event_ids.len(), "confirmed events");
            }
            Ok(resp) => {
                debug!(peer = %source_node, status = %resp.status(), "confirm call returned non-success");
            }
            Err(e) => {
                debug!(peer = %source_node, error = %e, "confirm call failed");
            }
        }
    }
}

fn unwrap_events_response(body: Value, public_key_b64: Option<&str>) -> anyhow::Result<EventsPayloadResponse> {
    let is_signed = body.get("signature").map(|v| !v.is_null()).unwrap_or(false);

    if is_signed {
        let Some(public_key_b64) = public_key_b64 else {
            anyhow::bail!("signed response but no known public key for peer");
        };
        let public_key = koi_identity::keypair::verifying_key_from_der_b64(public_key_b64)?;
        let envelope: koi_core::Envelope<EventsPayloadResponse> = serde_json::from_value(body)?;
        let (payload, _source) = koi_identity::verify_envelope(envelope, &public_key, None, None)?;
        Ok(payload)
    } else {
        Ok(serde_json::from_value(body)?)
    }
}
