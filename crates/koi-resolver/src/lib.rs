//! Multi-tier entity resolution against the local registry (C6).

pub mod primitives;

use async_trait::async_trait;
use koi_core::Relationship;

pub use primitives::{
    compute_token_overlap, jaro_winkler_similarity, normalize_alias, normalize_entity_text,
    passes_token_overlap_check, TokenOverlapPolicy, MIN_TOKEN_OVERLAP_COUNT,
    MIN_TOKEN_OVERLAP_RATIO,
};

/// Resolution mode; each variant attempts all cheaper tiers first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolutionMode {
    Exact,
    ExactAlias,
    Fuzzy,
    Semantic,
}

/// Per-entity-type tunables the schema registry supplies (entity_schema
/// equivalent): whether the token-overlap guard applies, and the fuzzy /
/// semantic acceptance thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub require_token_overlap: bool,
    pub similarity_threshold: f64,
    pub semantic_threshold: f64,
}

impl Default for EntitySchema {
    fn default() -> Self {
        Self {
            require_token_overlap: true,
            similarity_threshold: 0.85,
            semantic_threshold: 0.80,
        }
    }
}

/// A candidate row from the entity registry, enough of it to resolve
/// against.
#[derive(Debug, Clone)]
pub struct RegistryCandidate {
    pub fuseki_uri: String,
    pub normalized_text: String,
    pub aliases: Vec<String>,
}

/// Abstracts the `entity_registry` table lookups `resolve_entity_multi_tier`
/// needs, so the algorithm can be unit tested without a live database.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn exact_match(&self, normalized_text: &str, entity_type: &str) -> Option<String>;
    async fn candidates_with_aliases(&self, entity_type: &str) -> Vec<RegistryCandidate>;
    async fn all_candidates(&self, entity_type: &str) -> Vec<RegistryCandidate>;
    async fn schema_for(&self, entity_type: &str) -> EntitySchema;
    /// Nearest candidate by embedding cosine similarity, if any candidate
    /// has a stored embedding.
    async fn nearest_by_embedding(
        &self,
        entity_type: &str,
        query_embedding: &[f32],
    ) -> Option<(String, f64)>;
}

/// Computes an embedding for resolution-time semantic matching. Injected
/// rather than a global singleton, so callers can swap in a real model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Result of resolving an entity name against the local registry.
pub struct ResolutionResult {
    pub uri: Option<String>,
    pub confidence: f64,
    pub relationship: Relationship,
}

impl ResolutionResult {
    fn unresolved() -> Self {
        Self { uri: None, confidence: 0.0, relationship: Relationship::Unresolved }
    }

    fn same_as(uri: String) -> Self {
        Self { uri: Some(uri), confidence: 1.0, relationship: Relationship::SameAs }
    }

    fn related_to(uri: String, confidence: f64) -> Self {
        Self { uri: Some(uri), confidence, relationship: Relationship::RelatedTo }
    }
}

/// Multi-tier entity resolution: exact id, exact name, then fuzzy name
/// match. Does not include "contextual" or "create new entity" tiers —
/// those belong to the pipeline, not here.
pub async fn resolve_entity_multi_tier(
    lookup: &dyn EntityLookup,
    embedder: Option<&dyn Embedder>,
    entity_name: &str,
    entity_type: &str,
    mode: ResolutionMode,
) -> ResolutionResult {
    let normalized = normalize_entity_text(entity_name);

    // Tier 1: exact.
    if let Some(uri) = lookup.exact_match(&normalized, entity_type).await {
        return ResolutionResult::same_as(uri);
    }
    if mode == ResolutionMode::Exact {
        return ResolutionResult::unresolved();
    }

    // Tier 1.1: alias.
    let alias_norm = normalize_alias(entity_name);
    for candidate in lookup.candidates_with_aliases(entity_type).await {
        if candidate.aliases.iter().any(|a| normalize_alias(a) == alias_norm) {
            return ResolutionResult::same_as(candidate.fuseki_uri);
        }
    }
    if mode == ResolutionMode::ExactAlias {
        return ResolutionResult::unresolved();
    }

    // Tier 2a: fuzzy (Jaro-Winkler + token-overlap guard).
    let schema = lookup.schema_for(entity_type).await;
    let policy = TokenOverlapPolicy { require_token_overlap: schema.require_token_overlap };
    let mut best: Option<(String, f64)> = None;
    for candidate in lookup.all_candidates(entity_type).await {
        let score = jaro_winkler_similarity(&normalized, &candidate.normalized_text);
        if score < schema.similarity_threshold {
            continue;
        }
        if best.as_ref().map_or(true, |(_, b)| score > *b)
            && passes_token_overlap_check(&normalized, &candidate.normalized_text, &policy)
        {
            best = Some((candidate.fuseki_uri, score));
        }
    }
    if let Some((uri, score)) = best {
        return ResolutionResult::related_to(uri, score);
    }
    if mode == ResolutionMode::Fuzzy {
        return ResolutionResult::unresolved();
    }

    // Tier 2b: semantic (embedding cosine similarity).
    let Some(embedder) = embedder else {
        return ResolutionResult::unresolved();
    };
    let Some(query_embedding) = embedder.embed(&normalized).await else {
        return ResolutionResult::unresolved();
    };
    if let Some((uri, similarity)) =
        lookup.nearest_by_embedding(entity_type, &query_embedding).await
    {
        if similarity >= schema.semantic_threshold {
            return ResolutionResult::related_to(uri, similarity);
        }
    }
    ResolutionResult::unresolved()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeLookup {
        exact: HashMap<(String, String), String>,
        aliased: Vec<(String, RegistryCandidate)>,
        fuzzy: Vec<(String, RegistryCandidate)>,
        schema: EntitySchema,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl EntityLookup for FakeLookup {
        async fn exact_match(&self, normalized_text: &str, entity_type: &str) -> Option<String> {
            self.calls.lock().await.push("exact");
            self.exact.get(&(normalized_text.to_string(), entity_type.to_string())).cloned()
        }
        async fn candidates_with_aliases(&self, entity_type: &str) -> Vec<RegistryCandidate> {
            self.calls.lock().await.push("alias");
            self.aliased
                .iter()
                .filter(|(t, _)| t == entity_type)
                .map(|(_, c)| c.clone())
                .collect()
        }
        async fn all_candidates(&self, entity_type: &str) -> Vec<RegistryCandidate> {
            self.calls.lock().await.push("fuzzy");
            self.fuzzy
                .iter()
                .filter(|(t, _)| t == entity_type)
                .map(|(_, c)| c.clone())
                .collect()
        }
        async fn schema_for(&self, _entity_type: &str) -> EntitySchema {
            self.schema
        }
        async fn nearest_by_embedding(&self, _t: &str, _q: &[f32]) -> Option<(String, f64)> {
            None
        }
    }

    fn empty_lookup(schema: EntitySchema) -> FakeLookup {
        FakeLookup {
            exact: HashMap::new(),
            aliased: vec![],
            fuzzy: vec![],
            schema,
            calls: Mutex::new(vec![]),
        }
    }

    #[tokio::test]
    async fn exact_match_returns_same_as_with_full_confidence() {
        let mut lookup = empty_lookup(EntitySchema::default());
        lookup.exact.insert(("salish sea".into(), "Bioregion".into()), "uri:salish".into());

        let result = resolve_entity_multi_tier(
            &lookup,
            None,
            "  Salish_Sea ",
            "Bioregion",
            ResolutionMode::ExactAlias,
        )
        .await;

        assert_eq!(result.uri.as_deref(), Some("uri:salish"));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.relationship, Relationship::SameAs);
    }

    #[tokio::test]
    async fn exact_mode_does_not_fall_through_to_alias() {
        let mut lookup = empty_lookup(EntitySchema::default());
        lookup.aliased.push((
            "Person".into(),
            RegistryCandidate {
                fuseki_uri: "uri:jane".into(),
                normalized_text: "jane doe".into(),
                aliases: vec!["jd".into()],
            },
        ));

        let result =
            resolve_entity_multi_tier(&lookup, None, "jd", "Person", ResolutionMode::Exact).await;
        assert_eq!(result.relationship, Relationship::Unresolved);
    }

    #[tokio::test]
    async fn fuzzy_guard_blocks_two_token_single_overlap() {
        let mut lookup = empty_lookup(EntitySchema {
            require_token_overlap: true,
            similarity_threshold: 0.1,
            semantic_threshold: 0.1,
        });
        lookup.fuzzy.push((
            "Person".into(),
            RegistryCandidate {
                fuseki_uri: "uri:jane-doe".into(),
                normalized_text: "jane doe".into(),
                aliases: vec![],
            },
        ));

        let result = resolve_entity_multi_tier(
            &lookup,
            None,
            "Jane Smith",
            "Person",
            ResolutionMode::Fuzzy,
        )
        .await;

        assert_eq!(result.relationship, Relationship::Unresolved);
    }

    #[tokio::test]
    async fn fuzzy_match_succeeds_above_threshold_with_overlap() {
        let mut lookup = empty_lookup(EntitySchema {
            require_token_overlap: true,
            similarity_threshold: 0.85,
            semantic_threshold: 0.8,
        });
        lookup.fuzzy.push((
            "Person".into(),
            RegistryCandidate {
                fuseki_uri: "uri:jane-doe".into(),
                normalized_text: "jane doe".into(),
                aliases: vec![],
            },
        ));

        let result =
            resolve_entity_multi_tier(&lookup, None, "Jane Doe", "Person", ResolutionMode::Fuzzy)
                .await;

        assert_eq!(result.uri.as_deref(), Some("uri:jane-doe"));
        // Fuzzy tier always reports related_to, even for an exact string
        // match, because the exact/alias tiers (which report same_as)
        // already had their chance against the registry's indexed fields.
        assert_eq!(result.relationship, Relationship::RelatedTo);
    }
}
