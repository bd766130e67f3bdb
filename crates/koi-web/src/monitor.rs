//! Background task that periodically checks monitored URLs for content
//! changes. Mirrors `WebSensor`'s scan loop and `web_submissions` table use.

use std::sync::Arc;
use std::time::Duration;

use koi_core::EventType;
use koi_store::EventQueue;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::extractor::{ExtractionRequest, KnownEntity, StructuredExtractor};
use crate::fetch::{content_hash16, extract_readable, fetch_html, validate_url, FetchedPage, WORD_COUNT_FALLBACK_THRESHOLD};
use crate::headless::headless_fetch;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 86_400;
const STARTUP_DELAY_SECS: u64 = 30;
const INTER_CHECK_DELAY_SECS: u64 = 2;

struct MonitoredSource {
    id: i64,
    url: String,
    title: Option<String>,
    content_hash: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanSummary {
    pub checked: usize,
    pub updated: usize,
    pub errors: usize,
}

pub struct WebMonitor {
    pool: PgPool,
    queue: Arc<EventQueue>,
    source_node: String,
    extractor: Arc<dyn StructuredExtractor>,
    webdriver_url: Option<String>,
    scan_interval: Duration,
}

impl WebMonitor {
    pub fn new(pool: PgPool, queue: Arc<EventQueue>, source_node: String, extractor: Arc<dyn StructuredExtractor>) -> Self {
        Self {
            pool,
            queue,
            source_node,
            extractor,
            webdriver_url: None,
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_webdriver(mut self, webdriver_url: Option<String>) -> Self {
        self.webdriver_url = webdriver_url;
        self
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(STARTUP_DELAY_SECS)).await;
            loop {
                if let Err(err) = self.check_all_sources().await {
                    error!(error = %err, "web monitor scan error");
                }
                tokio::time::sleep(self.scan_interval).await;
            }
        })
    }

    pub async fn check_all_sources(&self) -> Result<ScanSummary, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, url, title, content_hash FROM web_submissions
             WHERE status = 'monitoring' ORDER BY fetched_at ASC NULLS FIRST",
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            info!("web monitor: no monitored URLs");
            return Ok(ScanSummary::default());
        }

        let sources: Vec<MonitoredSource> = rows
            .into_iter()
            .map(|r| MonitoredSource { id: r.get("id"), url: r.get("url"), title: r.get("title"), content_hash: r.get("content_hash") })
            .collect();

        info!(count = sources.len(), "web monitor: checking monitored urls");
        let mut summary = ScanSummary { checked: sources.len(), ..Default::default() };

        for source in &sources {
            match self.check_source(source).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(url = %source.url, error = %err, "web monitor check failed");
                    summary.errors += 1;
                }
            }
            tokio::time::sleep(Duration::from_secs(INTER_CHECK_DELAY_SECS)).await;
        }

        info!(checked = summary.checked, updated = summary.updated, errors = summary.errors, "web monitor scan complete");
        Ok(summary)
    }

    async fn check_source(&self, source: &MonitoredSource) -> anyhow::Result<bool> {
        let page = match self.fetch_with_fallback(&source.url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(url = %source.url, error = %err, "fetch failed");
                return Ok(false);
            }
        };

        if page.content_text.trim().is_empty() {
            warn!(url = %source.url, "empty content");
            return Ok(false);
        }

        let new_hash = content_hash16(&page.content_text);
        if Some(new_hash.as_str()) == source.content_hash.as_deref() {
            sqlx::query("UPDATE web_submissions SET fetched_at = now() WHERE id = $1").bind(source.id).execute(&self.pool).await?;
            return Ok(false);
        }

        info!(url = %source.url, old = ?source.content_hash, new = %new_hash, "content changed");

        let title = page.title.clone().or_else(|| source.title.clone());
        let word_count = page.word_count() as i32;
        sqlx::query(
            "UPDATE web_submissions SET content_text = $1, content_hash = $2, title = $3, fetched_at = now(), word_count = $4 WHERE id = $5",
        )
        .bind(&page.content_text)
        .bind(&new_hash)
        .bind(&title)
        .bind(word_count)
        .bind(source.id)
        .execute(&self.pool)
        .await?;

        self.refresh_entity_descriptions(&source.url, &page, title.as_deref().unwrap_or_default()).await;

        let rid = format!("web:{}", source.url);
        let manifest = serde_json::json!({ "url": source.url, "title": title, "content_changed": true });
        let ttl = EventQueue::ttl_hours_for(&self.source_node, &self.source_node);
        if let Err(err) = self.queue.add(EventType::Update, &rid, Some(manifest), None, &self.source_node, ttl, None, None).await {
            warn!(rid = %rid, error = %err, "event emit failed for web source");
        }

        Ok(true)
    }

    async fn fetch_with_fallback(&self, raw_url: &str) -> anyhow::Result<FetchedPage> {
        let url = validate_url(raw_url)?;
        let html = fetch_html(&url).await?;
        let page = extract_readable(&html);

        if page.word_count() >= WORD_COUNT_FALLBACK_THRESHOLD {
            return Ok(page);
        }

        let Some(webdriver_url) = &self.webdriver_url else {
            return Ok(page);
        };

        match headless_fetch(webdriver_url, &url).await {
            Ok(rendered) if rendered.word_count() > page.word_count() => Ok(rendered),
            Ok(_) => Ok(page),
            Err(err) => {
                warn!(url = raw_url, error = %err, "headless fallback failed, keeping plain fetch");
                Ok(page)
            }
        }
    }

    async fn refresh_entity_descriptions(&self, url: &str, page: &FetchedPage, title: &str) {
        let existing = sqlx::query(
            "SELECT er.entity_text AS name, er.entity_type AS entity_type
             FROM entity_registry er
             JOIN document_entity_links del ON del.entity_uri = er.fuseki_uri
             WHERE del.document_uri = CONCAT('web:', $1::text)",
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        let known_entities: Vec<KnownEntity> =
            existing.iter().map(|r| KnownEntity { name: r.get("name"), entity_type: r.get("entity_type") }).collect();

        let request = ExtractionRequest { content: &page.content_text, title, url, known_entities: &known_entities };

        let result = match self.extractor.extract(request).await {
            Ok(result) => result,
            Err(err) => {
                warn!(url = %url, error = %err, "structured extraction failed");
                return;
            }
        };

        let mut updated = 0;
        for entity in &result.entities {
            let Some(description) = &entity.description else { continue };
            let row = sqlx::query("SELECT fuseki_uri FROM entity_registry WHERE LOWER(entity_text) = LOWER($1)")
                .bind(entity.name.trim())
                .fetch_optional(&self.pool)
                .await
                .ok()
                .flatten();
            if let Some(row) = row {
                let fuseki_uri: String = row.get("fuseki_uri");
                if sqlx::query("UPDATE entity_registry SET description = $1, updated_at = now() WHERE fuseki_uri = $2")
                    .bind(description)
                    .bind(&fuseki_uri)
                    .execute(&self.pool)
                    .await
                    .is_ok()
                {
                    updated += 1;
                }
            }
        }
        if updated > 0 {
            info!(url = %url, updated, "refreshed entity descriptions");
        }
    }

    pub async fn add_url(&self, url: &str, title: Option<&str>) -> anyhow::Result<AddUrlOutcome> {
        if let Some(row) = sqlx::query("SELECT id, status FROM web_submissions WHERE url = $1").bind(url).fetch_optional(&self.pool).await? {
            let id: i64 = row.get("id");
            let status: String = row.get("status");
            if status == "monitoring" {
                return Ok(AddUrlOutcome::AlreadyMonitoring(id));
            }
            sqlx::query("UPDATE web_submissions SET status = 'monitoring' WHERE id = $1").bind(id).execute(&self.pool).await?;
            return Ok(AddUrlOutcome::UpgradedToMonitoring(id));
        }

        let (content_text, content_hash, page_title, word_count) = match self.fetch_with_fallback(url).await {
            Ok(page) => {
                let hash = content_hash16(&page.content_text);
                let words = page.word_count() as i32;
                (page.content_text, Some(hash), page.title, words)
            }
            Err(err) => {
                warn!(url = %url, error = %err, "initial fetch failed");
                (String::new(), None, None, 0)
            }
        };
        let resolved_title = title.map(str::to_string).or(page_title).unwrap_or_default();
        let domain = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();

        let row = sqlx::query(
            "INSERT INTO web_submissions (url, title, content_text, content_hash, word_count, status, fetched_at)
             VALUES ($1, $2, $3, $4, $5, 'monitoring', now()) RETURNING id",
        )
        .bind(url)
        .bind(&resolved_title)
        .bind(&content_text)
        .bind(&content_hash)
        .bind(word_count)
        .fetch_one(&self.pool)
        .await?;
        let _ = domain;

        Ok(AddUrlOutcome::Added { id: row.get("id"), words: word_count })
    }

    pub async fn remove_url(&self, url: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE web_submissions SET status = 'ingested' WHERE url = $1 AND status = 'monitoring'")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub enum AddUrlOutcome {
    AlreadyMonitoring(i64),
    UpgradedToMonitoring(i64),
    Added { id: i64, words: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::NullExtractor;

    /// Requires a live Postgres reachable via `DATABASE_URL`; opt in with
    /// `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn add_url_then_remove_url_round_trips() {
        let pool = koi_store::connect(&std::env::var("DATABASE_URL").unwrap()).await.unwrap();
        koi_store::run_migrations(&pool).await.unwrap();
        let queue = Arc::new(EventQueue::new(pool.clone()));
        let monitor = WebMonitor::new(pool, queue, "node-a".to_string(), Arc::new(NullExtractor));

        let outcome = monitor.add_url("https://example.com/docs", Some("Docs")).await.unwrap();
        assert!(matches!(outcome, AddUrlOutcome::Added { .. } | AddUrlOutcome::AlreadyMonitoring(_)));

        let removed = monitor.remove_url("https://example.com/docs").await.unwrap();
        assert!(removed || matches!(outcome, AddUrlOutcome::AlreadyMonitoring(_)));
    }
}
