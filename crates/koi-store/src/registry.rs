//! `entity_registry` access, implementing [`koi_resolver::EntityLookup`]
//! against Postgres.

use async_trait::async_trait;
use koi_core::CodeEntityType;
use koi_resolver::{EntityLookup, EntitySchema, RegistryCandidate};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;

pub struct PgEntityLookup {
    pool: PgPool,
    schemas: HashMap<String, EntitySchema>,
}

/// The default per-type schema every known entity type gets until an
/// operator overrides it via [`PgEntityLookup::with_schemas`].
fn default_schemas() -> HashMap<String, EntitySchema> {
    [
        CodeEntityType::Function,
        CodeEntityType::Class,
        CodeEntityType::Module,
        CodeEntityType::File,
        CodeEntityType::Import,
        CodeEntityType::Interface,
    ]
    .into_iter()
    .map(|t| (t.label().to_string(), EntitySchema::default()))
    .collect()
}

impl PgEntityLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, schemas: default_schemas() }
    }

    /// Build a lookup with caller-supplied per-type thresholds, falling
    /// back to [`EntitySchema::default`] for any entity type not present.
    pub fn with_schemas(pool: PgPool, schemas: HashMap<String, EntitySchema>) -> Self {
        Self { pool, schemas }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[async_trait]
impl EntityLookup for PgEntityLookup {
    async fn exact_match(&self, normalized_text: &str, entity_type: &str) -> Option<String> {
        sqlx::query(
            "SELECT fuseki_uri FROM entity_registry WHERE normalized_text = $1 AND entity_type = $2",
        )
        .bind(normalized_text)
        .bind(entity_type)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .map(|row| row.get::<String, _>("fuseki_uri"))
    }

    async fn candidates_with_aliases(&self, entity_type: &str) -> Vec<RegistryCandidate> {
        let rows = sqlx::query(
            "SELECT fuseki_uri, normalized_text, aliases FROM entity_registry
             WHERE entity_type = $1 AND aliases IS NOT NULL",
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        rows.into_iter()
            .map(|row| RegistryCandidate {
                fuseki_uri: row.get("fuseki_uri"),
                normalized_text: row.get("normalized_text"),
                aliases: row.get::<Option<Vec<String>>, _>("aliases").unwrap_or_default(),
            })
            .collect()
    }

    async fn all_candidates(&self, entity_type: &str) -> Vec<RegistryCandidate> {
        let rows = sqlx::query(
            "SELECT fuseki_uri, normalized_text, aliases FROM entity_registry WHERE entity_type = $1",
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        rows.into_iter()
            .map(|row| RegistryCandidate {
                fuseki_uri: row.get("fuseki_uri"),
                normalized_text: row.get("normalized_text"),
                aliases: row.get::<Option<Vec<String>>, _>("aliases").unwrap_or_default(),
            })
            .collect()
    }

    async fn schema_for(&self, entity_type: &str) -> EntitySchema {
        self.schemas.get(entity_type).copied().unwrap_or_default()
    }

    async fn nearest_by_embedding(
        &self,
        entity_type: &str,
        query_embedding: &[f32],
    ) -> Option<(String, f64)> {
        let rows = sqlx::query(
            "SELECT fuseki_uri, embedding FROM entity_registry
             WHERE entity_type = $1 AND embedding IS NOT NULL",
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await
        .ok()?;

        rows.into_iter()
            .filter_map(|row| {
                let uri: String = row.get("fuseki_uri");
                let embedding: Vec<f64> = row.get("embedding");
                let embedding_f32: Vec<f32> = embedding.iter().map(|v| *v as f32).collect();
                Some((uri, cosine_similarity(query_embedding, &embedding_f32)))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}
