//! Code knowledge graph loader (C10): batched entity/edge loading and
//! mark-and-sweep cleanup over the relational `code_artifacts`/`code_edges`
//! tables. Adapted from `code_graph.py`'s Apache AGE Cypher operations onto
//! plain SQL — entity/edge ids are already deterministic content hashes, so
//! no internal graph-id indirection is needed the way AGE's id_map/name_map
//! pass required.

use std::collections::HashMap;

use koi_core::{CodeEdge, CodeEntity};
use sqlx::postgres::PgPool;
use sqlx::Row;
use thiserror::Error;
use tracing::{info, warn};

const ENTITY_BATCH_SIZE: usize = 100;
const EDGE_BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoadReport {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The relational schema carries `code_artifacts`/`code_edges` via
/// migrations already; this just confirms the pool can reach them.
pub async fn setup_graph(pool: &PgPool) -> Result<(), GraphError> {
    sqlx::query("SELECT 1 FROM code_artifacts LIMIT 1").fetch_optional(pool).await?;
    Ok(())
}

pub async fn load_code_entities(
    pool: &PgPool,
    entities: &[CodeEntity],
    run_id: &str,
) -> Result<LoadReport, GraphError> {
    let mut report = LoadReport::default();

    for batch in entities.chunks(ENTITY_BATCH_SIZE) {
        match insert_entity_batch(pool, batch, run_id).await {
            Ok(()) => report.success += batch.len(),
            Err(e) => {
                warn!(error = %e, batch_len = batch.len(), "batch entity insert failed, falling back to individual inserts");
                for entity in batch {
                    match insert_entity_single(pool, entity, run_id).await {
                        Ok(()) => report.success += 1,
                        Err(e) => {
                            warn!(entity_id = %entity.entity_id, error = %e, "entity insert failed");
                            report.failed += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(report)
}

async fn insert_entity_batch(pool: &PgPool, batch: &[CodeEntity], run_id: &str) -> Result<(), GraphError> {
    let mut tx = pool.begin().await?;
    for entity in batch {
        insert_entity_row(&mut tx, entity, run_id).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn insert_entity_single(pool: &PgPool, entity: &CodeEntity, run_id: &str) -> Result<(), GraphError> {
    let mut conn = pool.acquire().await?;
    insert_entity_row(&mut *conn, entity, run_id).await
}

async fn insert_entity_row<'e, E>(executor: E, entity: &CodeEntity, run_id: &str) -> Result<(), GraphError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let code_uri = format!("code:{}:{}", entity.repo, entity.entity_id);
    sqlx::query(
        r#"
        INSERT INTO code_artifacts
            (code_uri, entity_id, name, entity_type, repo, file_path, line_start, line_end,
             language, signature, params, return_type, docstring, receiver_type,
             module_name, module_path, extraction_method, extraction_run_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (code_uri) DO UPDATE SET
            name = EXCLUDED.name,
            line_start = EXCLUDED.line_start,
            line_end = EXCLUDED.line_end,
            signature = EXCLUDED.signature,
            params = EXCLUDED.params,
            return_type = EXCLUDED.return_type,
            docstring = EXCLUDED.docstring,
            receiver_type = EXCLUDED.receiver_type,
            module_name = EXCLUDED.module_name,
            module_path = EXCLUDED.module_path,
            extraction_run_id = EXCLUDED.extraction_run_id
        "#,
    )
    .bind(&code_uri)
    .bind(&entity.entity_id)
    .bind(truncate(&entity.name, 500))
    .bind(entity.entity_type.label())
    .bind(&entity.repo)
    .bind(&entity.file_path)
    .bind(entity.line_start as i32)
    .bind(entity.line_end as i32)
    .bind(&entity.language)
    .bind(entity.signature.as_deref().map(|s| truncate(s, 500)))
    .bind(entity.params.as_deref().map(|s| truncate(s, 200)))
    .bind(entity.return_type.as_deref().map(|s| truncate(s, 100)))
    .bind(entity.docstring.as_deref().map(|s| truncate(s, 500)))
    .bind(entity.receiver_type.as_deref())
    .bind(entity.module_name.as_deref())
    .bind(entity.module_path.as_deref())
    .bind(&entity.extraction_method)
    .bind(run_id)
    .execute(executor)
    .await?;
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Resolve `to_entity_id` against known entities: exact id, then exact
/// name, then (for dotted names like `module.function`) the last segment.
struct EntityIndex {
    by_id: std::collections::HashSet<String>,
    by_name: HashMap<String, Vec<String>>,
}

async fn load_entity_index(pool: &PgPool, repo: &str) -> Result<EntityIndex, GraphError> {
    let rows = sqlx::query("SELECT entity_id, name FROM code_artifacts WHERE repo = $1")
        .bind(repo)
        .fetch_all(pool)
        .await?;

    let mut by_id = std::collections::HashSet::new();
    let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let entity_id: String = row.get("entity_id");
        let name: String = row.get("name");
        by_name.entry(name).or_default().push(entity_id.clone());
        by_id.insert(entity_id);
    }
    info!(repo, entities = by_id.len(), "loaded entity index for edge resolution");
    Ok(EntityIndex { by_id, by_name })
}

impl EntityIndex {
    fn resolve(&self, candidate: &str) -> Option<String> {
        if self.by_id.contains(candidate) {
            return Some(candidate.to_string());
        }
        if let Some(ids) = self.by_name.get(candidate) {
            return ids.first().cloned();
        }
        if let Some((_, bare)) = candidate.rsplit_once('.') {
            if let Some(ids) = self.by_name.get(bare) {
                return ids.first().cloned();
            }
        }
        None
    }
}

pub async fn load_code_edges(
    pool: &PgPool,
    edges: &[CodeEdge],
    repo: &str,
    run_id: &str,
) -> Result<LoadReport, GraphError> {
    let mut report = LoadReport::default();
    let index = load_entity_index(pool, repo).await?;

    let mut by_type: HashMap<&'static str, Vec<&CodeEdge>> = HashMap::new();
    for edge in edges {
        by_type.entry(edge.edge_type.label()).or_default().push(edge);
    }

    for (edge_type, type_edges) in by_type {
        info!(edge_type, count = type_edges.len(), "loading code edges");

        for batch in type_edges.chunks(EDGE_BATCH_SIZE) {
            let mut resolved = Vec::with_capacity(batch.len());
            for edge in batch {
                let Some(from_id) = index.resolve(&edge.from_entity_id) else {
                    report.skipped += 1;
                    continue;
                };
                let Some(to_id) = index.resolve(&edge.to_entity_id) else {
                    report.skipped += 1;
                    continue;
                };
                resolved.push((from_id, to_id, edge));
            }

            if resolved.is_empty() {
                continue;
            }

            match insert_edge_batch(pool, &resolved, run_id).await {
                Ok(()) => report.success += resolved.len(),
                Err(e) => {
                    warn!(error = %e, edge_type, "batch edge insert failed");
                    report.failed += resolved.len();
                }
            }
        }
    }

    Ok(report)
}

async fn insert_edge_batch(
    pool: &PgPool,
    resolved: &[(String, String, &CodeEdge)],
    run_id: &str,
) -> Result<(), GraphError> {
    let mut tx = pool.begin().await?;
    for (from_id, to_id, edge) in resolved {
        sqlx::query(
            r#"
            INSERT INTO code_edges
                (edge_id, from_entity_id, to_entity_id, edge_type, file_path, line_number, extraction_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (edge_id) DO NOTHING
            "#,
        )
        .bind(&edge.edge_id)
        .bind(from_id)
        .bind(to_id)
        .bind(edge.edge_type.label())
        .bind(&edge.file_path)
        .bind(edge.line_number as i32)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Remove entities (and their edges) from previous runs for `repo`, keeping
/// only rows stamped with `run_id` (mark/sweep).
pub async fn sweep_old_entities(pool: &PgPool, repo: &str, run_id: &str) -> Result<i64, GraphError> {
    sqlx::query(
        r#"
        DELETE FROM code_edges
        WHERE extraction_run_id <> $1
          AND (from_entity_id IN (SELECT entity_id FROM code_artifacts WHERE repo = $2)
               OR to_entity_id IN (SELECT entity_id FROM code_artifacts WHERE repo = $2))
        "#,
    )
    .bind(run_id)
    .bind(repo)
    .execute(pool)
    .await?;

    sqlx::query("DELETE FROM code_artifacts WHERE repo = $1 AND extraction_run_id <> $2")
        .bind(repo)
        .bind(run_id)
        .execute(pool)
        .await?;

    let row = sqlx::query("SELECT count(*) AS n FROM code_artifacts WHERE repo = $1")
        .bind(repo)
        .fetch_one(pool)
        .await?;
    let remaining: i64 = row.get("n");
    info!(repo, run_id, remaining, "swept old code entities");
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(pairs: &[(&str, &str)]) -> EntityIndex {
        let mut by_id = std::collections::HashSet::new();
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for (id, name) in pairs {
            by_id.insert(id.to_string());
            by_name.entry(name.to_string()).or_default().push(id.to_string());
        }
        EntityIndex { by_id, by_name }
    }

    #[test]
    fn resolves_by_exact_entity_id() {
        let idx = index(&[("abc123", "helper")]);
        assert_eq!(idx.resolve("abc123"), Some("abc123".to_string()));
    }

    #[test]
    fn resolves_by_name_when_not_an_entity_id() {
        let idx = index(&[("abc123", "helper")]);
        assert_eq!(idx.resolve("helper"), Some("abc123".to_string()));
    }

    #[test]
    fn resolves_dotted_name_by_last_segment() {
        let idx = index(&[("abc123", "helper")]);
        assert_eq!(idx.resolve("my_module.helper"), Some("abc123".to_string()));
    }

    #[test]
    fn unresolved_name_returns_none() {
        let idx = index(&[("abc123", "helper")]);
        assert_eq!(idx.resolve("nonexistent"), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
