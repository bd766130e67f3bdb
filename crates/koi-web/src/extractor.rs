//! Structured-extraction contract consumed by the web monitor: an external
//! service that turns page content into candidate entities and
//! relationships. No such service lives in this repo; `StructuredExtractor`
//! is the seam a deployment wires a real backend into, with an HTTP-POST
//! implementation as the default.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest<'a> {
    pub content: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub known_entities: &'a [KnownEntity],
}

#[derive(Debug, Clone, Serialize)]
pub struct KnownEntity {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Value,
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedRelationship {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
}

#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest<'_>) -> anyhow::Result<ExtractionResult>;
}

/// Calls a configured HTTP endpoint that performs the structured extraction.
pub struct HttpStructuredExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStructuredExtractor {
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[async_trait]
impl StructuredExtractor for HttpStructuredExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> anyhow::Result<ExtractionResult> {
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let result = response.error_for_status()?.json::<ExtractionResult>().await?;
        Ok(result)
    }
}

/// No-op extractor for deployments without an enrichment backend configured.
pub struct NullExtractor;

#[async_trait]
impl StructuredExtractor for NullExtractor {
    async fn extract(&self, _request: ExtractionRequest<'_>) -> anyhow::Result<ExtractionResult> {
        Ok(ExtractionResult::default())
    }
}
