//! Knowledge pipeline: classifies, normalises, and resolves incoming events
//! against the local registry (C5).

pub mod context;
pub mod default_handlers;
pub mod handler;
pub mod object;
pub mod pipeline;

pub use context::{CrossRefError, CrossRefStore, PipelineContext};
pub use handler::{Handler, HandlerOutcome};
pub use object::{HandlerPhase, KnowledgeObject};
pub use pipeline::KnowledgePipeline;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use koi_core::{CrossRef, EventType, Relationship};
    use koi_resolver::{EntityLookup, EntitySchema, RegistryCandidate, ResolutionMode};
    use std::sync::Mutex;

    struct NoMatchLookup;

    #[async_trait]
    impl EntityLookup for NoMatchLookup {
        async fn exact_match(&self, _n: &str, _t: &str) -> Option<String> {
            None
        }
        async fn candidates_with_aliases(&self, _t: &str) -> Vec<RegistryCandidate> {
            vec![]
        }
        async fn all_candidates(&self, _t: &str) -> Vec<RegistryCandidate> {
            vec![]
        }
        async fn schema_for(&self, _t: &str) -> EntitySchema {
            EntitySchema::default()
        }
        async fn nearest_by_embedding(&self, _t: &str, _q: &[f32]) -> Option<(String, f64)> {
            None
        }
    }

    struct RecordingCrossRefStore {
        deleted: Mutex<Vec<(String, String)>>,
        upserted: Mutex<Vec<CrossRef>>,
    }

    impl RecordingCrossRefStore {
        fn new() -> Self {
            Self { deleted: Mutex::new(vec![]), upserted: Mutex::new(vec![]) }
        }
    }

    #[async_trait]
    impl CrossRefStore for RecordingCrossRefStore {
        async fn get(&self, _rid: &str, _node: &str) -> Result<Option<CrossRef>, CrossRefError> {
            Ok(None)
        }
        async fn upsert(&self, cross_ref: CrossRef) -> Result<(), CrossRefError> {
            self.upserted.lock().unwrap().push(cross_ref);
            Ok(())
        }
        async fn delete_for_remote(
            &self,
            remote_rid: &str,
            remote_node: &str,
        ) -> Result<(), CrossRefError> {
            self.deleted.lock().unwrap().push((remote_rid.to_string(), remote_node.to_string()));
            Ok(())
        }
    }

    fn ctx(node_rid: &str) -> PipelineContext {
        PipelineContext::new(
            node_rid.to_string(),
            ResolutionMode::ExactAlias,
            Box::new(NoMatchLookup),
            None,
            Box::new(RecordingCrossRefStore::new()),
        )
    }

    #[tokio::test]
    async fn self_referential_event_is_dropped_without_resolution() {
        let pipeline = KnowledgePipeline::with_defaults();
        let context = ctx("orn:koi-net.node:me+abcd");
        let object = KnowledgeObject::new(
            "orn:koi-net.node:me+abcd".to_string(),
            EventType::New,
            "orn:koi-net.node:peer+ef01".to_string(),
        );

        let result = pipeline.process(object, &context).await;
        assert!(result.entity_type.is_none(), "RID phase must stop before entity extraction");
    }

    #[tokio::test]
    async fn forget_event_deletes_cross_ref_and_skips_resolution() {
        let pipeline = KnowledgePipeline::with_defaults();
        let context = ctx("orn:koi-net.node:me+abcd");
        let object = KnowledgeObject::new(
            "some:rid".to_string(),
            EventType::Forget,
            "orn:koi-net.node:peer+ef01".to_string(),
        );

        let result = pipeline.process(object, &context).await;
        assert!(result.local_uri.is_none());
        assert_eq!(result.cross_ref_relationship, None);
    }

    #[tokio::test]
    async fn unresolved_event_completes_all_phases_without_cross_ref() {
        let pipeline = KnowledgePipeline::with_defaults();
        let context = ctx("orn:koi-net.node:me+abcd");
        let mut object = KnowledgeObject::new(
            "some:rid".to_string(),
            EventType::New,
            "orn:koi-net.node:peer+ef01".to_string(),
        );
        object.contents = Some(serde_json::json!({"name": "Jane Doe", "@type": "bkc:Person"}));

        let result = pipeline.process(object, &context).await;
        assert_eq!(result.entity_type.as_deref(), Some("Person"));
        assert_eq!(result.entity_name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.cross_ref_relationship, Some(Relationship::Unresolved));
    }
}
