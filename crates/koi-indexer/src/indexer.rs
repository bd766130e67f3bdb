//! Top-level orchestration: scan each active repo, extract entities/edges,
//! load them into the code graph, and emit change events. Mirrors
//! `GitHubSensor`'s scan loop (clone/pull, diff, extract, load, sweep, emit).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use koi_core::EventType;
use koi_store::EventQueue;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{git, python, scan, sql, typescript};

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 21_600;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("graph error: {0}")]
    Graph(#[from] koi_graph::GraphError),
}

struct RepoRow {
    repo_id: String,
    clone_url: String,
    branch: String,
    local_path: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanReport {
    pub files_processed: usize,
    pub code_entities: usize,
    pub code_edges: usize,
}

pub struct CodeIndexer {
    pool: PgPool,
    queue: Arc<EventQueue>,
    source_node: String,
    clone_dir: PathBuf,
    scan_interval: Duration,
}

impl CodeIndexer {
    pub fn new(pool: PgPool, queue: Arc<EventQueue>, source_node: String, clone_dir: PathBuf) -> Self {
        Self {
            pool,
            queue,
            source_node,
            clone_dir,
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.scan_all_repos().await {
                    error!(error = %err, "code indexer scan cycle failed");
                }
                tokio::time::sleep(self.scan_interval).await;
            }
        })
    }

    pub async fn scan_all_repos(&self) -> Result<(), IndexerError> {
        let rows = sqlx::query("SELECT repo_id, clone_url, branch, local_path FROM github_repos WHERE active = true")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            info!("code indexer: no active repos to scan");
            return Ok(());
        }

        for row in rows {
            let repo = RepoRow {
                repo_id: row.get("repo_id"),
                clone_url: row.get("clone_url"),
                branch: row.get("branch"),
                local_path: row.get("local_path"),
            };
            match self.scan_repo(&repo).await {
                Ok(report) => info!(
                    repo = %repo.repo_id,
                    files = report.files_processed,
                    entities = report.code_entities,
                    edges = report.code_edges,
                    "scanned repository"
                ),
                Err(err) => warn!(repo = %repo.repo_id, error = %err, "repo scan failed"),
            }
        }
        Ok(())
    }

    async fn scan_repo(&self, repo: &RepoRow) -> Result<ScanReport, IndexerError> {
        let clone_path = repo
            .local_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.clone_dir.join(repo.repo_id.replace('/', "_")));

        let head_sha = tokio::task::block_in_place(|| git::clone_or_pull(&repo.clone_url, &clone_path, &repo.branch))
            .map_err(|e| {
                warn!(repo = %repo.repo_id, error = %e, "clone/pull failed");
                sqlx::Error::Protocol(e.to_string())
            })?;

        let all_files = scan::find_files(&clone_path);

        let existing_hashes = self.load_existing_hashes(&repo.repo_id).await?;

        let mut all_entities = Vec::new();
        let mut all_edges = Vec::new();
        let mut files_processed = 0usize;
        let mut touched_paths = Vec::new();

        for file_path in &all_files {
            let Ok(rel_path) = file_path.strip_prefix(&clone_path) else { continue };
            let rel_path = rel_path.to_string_lossy().replace('\\', "/");

            let Some(content) = scan::read_file(file_path) else { continue };
            let content_hash = scan::content_hash(&content);

            if scan::is_unchanged(&existing_hashes, &rel_path, &content_hash) {
                continue;
            }

            let ext = file_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
            let language = scan::language_for_extension(&ext);

            let (entities, edges) = match language {
                Some("python") => python::extract(&content, &rel_path, &repo.repo_id),
                Some(lang @ ("typescript" | "tsx" | "javascript")) => typescript::extract(lang, &content, &rel_path, &repo.repo_id),
                Some("sql") => sql::extract(&content, &rel_path, &repo.repo_id),
                _ => (Vec::new(), Vec::new()),
            };

            let line_count = content.lines().count().max(1) as i32;
            let byte_size = content.len() as i64;

            self.upsert_file_state(&repo.repo_id, &rel_path, &content_hash, byte_size, line_count, entities.len() as i32)
                .await?;

            let is_new = !existing_hashes.contains_key(&rel_path);
            touched_paths.push((rel_path.clone(), language.unwrap_or(ext.as_str()).to_string(), is_new));

            all_entities.extend(entities);
            all_edges.extend(edges);
            files_processed += 1;
        }

        let run_id = run_id_for(&repo.repo_id, &head_sha);
        if !all_entities.is_empty() {
            let report = koi_graph::load_code_entities(&self.pool, &all_entities, &run_id).await?;
            info!(repo = %repo.repo_id, loaded = report.success, failed = report.failed, "graph entities loaded");
        }
        if !all_edges.is_empty() {
            let report = koi_graph::load_code_edges(&self.pool, &all_edges, &repo.repo_id, &run_id).await?;
            info!(repo = %repo.repo_id, loaded = report.success, failed = report.failed, "graph edges loaded");
        }
        if !all_entities.is_empty() {
            koi_graph::sweep_old_entities(&self.pool, &repo.repo_id, &run_id).await?;
        }

        for (rel_path, language, is_new) in &touched_paths {
            let rid = format!("github:{}:{rel_path}", repo.repo_id);
            let event_type = if *is_new { EventType::New } else { EventType::Update };
            let manifest = serde_json::json!({ "file_path": rel_path, "language": language });
            let ttl = EventQueue::ttl_hours_for(&self.source_node, &self.source_node);
            if let Err(err) = self
                .queue
                .add(event_type, &rid, Some(manifest), None, &self.source_node, ttl, None, None)
                .await
            {
                warn!(rid = %rid, error = %err, "event emit failed for scanned file");
            }
        }

        sqlx::query("UPDATE github_repos SET last_scanned = now(), last_head = $1, local_path = $2 WHERE repo_id = $3")
            .bind(&head_sha)
            .bind(clone_path.to_string_lossy().as_ref())
            .bind(&repo.repo_id)
            .execute(&self.pool)
            .await?;

        Ok(ScanReport { files_processed, code_entities: all_entities.len(), code_edges: all_edges.len() })
    }

    async fn load_existing_hashes(&self, repo_id: &str) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows = sqlx::query("SELECT file_path, content_hash FROM github_file_state WHERE repo_id = $1")
            .bind(repo_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| (r.get("file_path"), r.get("content_hash"))).collect())
    }

    async fn upsert_file_state(
        &self,
        repo_id: &str,
        file_path: &str,
        content_hash: &str,
        byte_size: i64,
        line_count: i32,
        code_entity_count: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO github_file_state (repo_id, file_path, content_hash, byte_size, line_count, code_entity_count)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (repo_id, file_path) DO UPDATE SET
               content_hash = EXCLUDED.content_hash,
               byte_size = EXCLUDED.byte_size,
               line_count = EXCLUDED.line_count,
               code_entity_count = EXCLUDED.code_entity_count,
               scanned_at = now()",
        )
        .bind(repo_id)
        .bind(file_path)
        .bind(content_hash)
        .bind(byte_size)
        .bind(line_count)
        .bind(code_entity_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn run_id_for(repo_id: &str, head_sha: &str) -> String {
    let digest = Sha256::digest(format!("{repo_id}:{head_sha}").as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_deterministic_and_varies_with_head_sha() {
        let a = run_id_for("acme/widgets", "deadbeef");
        let b = run_id_for("acme/widgets", "deadbeef");
        let c = run_id_for("acme/widgets", "cafef00d");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
