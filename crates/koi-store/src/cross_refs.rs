//! `cross_refs` access, implementing [`koi_pipeline::CrossRefStore`].

use async_trait::async_trait;
use koi_core::{CrossRef, Relationship};
use koi_pipeline::{CrossRefError, CrossRefStore};
use sqlx::postgres::PgPool;
use sqlx::Row;

fn backend_error(err: sqlx::Error) -> CrossRefError {
    CrossRefError::Backend(Box::new(err))
}

pub struct PgCrossRefStore {
    pool: PgPool,
}

impl PgCrossRefStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn relationship_str(r: Relationship) -> &'static str {
    r.as_str()
}

fn parse_relationship(raw: &str) -> Relationship {
    match raw {
        "same_as" => Relationship::SameAs,
        "related_to" => Relationship::RelatedTo,
        _ => Relationship::Unresolved,
    }
}

#[async_trait]
impl CrossRefStore for PgCrossRefStore {
    async fn get(
        &self,
        remote_rid: &str,
        remote_node: &str,
    ) -> Result<Option<CrossRef>, CrossRefError> {
        let row = sqlx::query(
            "SELECT local_uri, remote_rid, remote_node, relationship, confidence
             FROM cross_refs WHERE remote_rid = $1 AND remote_node = $2",
        )
        .bind(remote_rid)
        .bind(remote_node)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(row.map(|row| CrossRef {
            local_uri: row.get("local_uri"),
            remote_rid: row.get("remote_rid"),
            remote_node: row.get("remote_node"),
            relationship: parse_relationship(row.get::<String, _>("relationship").as_str()),
            confidence: row.get("confidence"),
        }))
    }

    /// Upsert on `(local_uri, remote_rid)` per the table's unique constraint.
    async fn upsert(&self, cross_ref: CrossRef) -> Result<(), CrossRefError> {
        sqlx::query(
            r#"
            INSERT INTO cross_refs (local_uri, remote_rid, remote_node, relationship, confidence)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (local_uri, remote_rid) DO UPDATE
            SET remote_node = EXCLUDED.remote_node,
                relationship = EXCLUDED.relationship,
                confidence = EXCLUDED.confidence
            "#,
        )
        .bind(&cross_ref.local_uri)
        .bind(&cross_ref.remote_rid)
        .bind(&cross_ref.remote_node)
        .bind(relationship_str(cross_ref.relationship))
        .bind(cross_ref.confidence)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn delete_for_remote(
        &self,
        remote_rid: &str,
        remote_node: &str,
    ) -> Result<(), CrossRefError> {
        sqlx::query("DELETE FROM cross_refs WHERE remote_rid = $1 AND remote_node = $2")
            .bind(remote_rid)
            .bind(remote_node)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
