//! Lookup of locally-known RIDs and their manifests/bundles for the
//! `rids/fetch`, `manifests/fetch`, and `bundles/fetch` endpoints.

use std::collections::HashMap;

use async_trait::async_trait;
use koi_core::extract_rid_type;
use parking_lot::RwLock;

use crate::wire::Bundle;

#[async_trait]
pub trait RidStore: Send + Sync {
    async fn list_rids(&self, rid_types: Option<&[String]>) -> Vec<String>;
    async fn bundle_for(&self, rid: &str) -> Option<Bundle>;
}

#[derive(Default)]
pub struct InMemoryRidStore {
    bundles: RwLock<HashMap<String, Bundle>>,
}

impl InMemoryRidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, rid: String, bundle: Bundle) {
        self.bundles.write().insert(rid, bundle);
    }
}

#[async_trait]
impl RidStore for InMemoryRidStore {
    async fn list_rids(&self, rid_types: Option<&[String]>) -> Vec<String> {
        self.bundles
            .read()
            .keys()
            .filter(|rid| {
                rid_types.map_or(true, |types| types.iter().any(|t| t == extract_rid_type(rid)))
            })
            .cloned()
            .collect()
    }

    async fn bundle_for(&self, rid: &str) -> Option<Bundle> {
        self.bundles.read().get(rid).cloned()
    }
}
