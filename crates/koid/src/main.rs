//! koid - federated knowledge-graph mesh node daemon
//!
//! Wires together identity, the relational store, the knowledge pipeline,
//! the HTTP protocol router, and three background tasks (peer poller, code
//! indexer, web monitor) into one process.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::Config;
use koi_core::env::SecurityPolicy;
use koi_core::NodeType;
use koi_net::{build_router, AppState, InMemoryPeerDirectory, InMemoryRidStore, Poller};
use koi_pipeline::{KnowledgePipeline, PipelineContext};
use koi_resolver::ResolutionMode;
use koi_store::{PgCrossRefStore, PgEntityLookup};
use koi_web::{HttpStructuredExtractor, NullExtractor, StructuredExtractor, WebMonitor};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let env_filter = EnvFilter::from_default_env().add_directive(
        format!("koid={}", if config.verbose { "debug" } else { "info" }).parse().unwrap(),
    );
    if config.log_format == "json" {
        tracing_subscriber::registry().with(fmt::layer().json()).with(env_filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(env_filter).init();
    }

    if let Err(err) = config.validate() {
        error!("invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    info!("koid v{} starting", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let (keypair, profile) = koi_identity::load_or_create_identity(
        &config.state_dir,
        &config.node_name,
        config.base_url.clone(),
        NodeType::Full,
    )?;
    info!(node_rid = %profile.node_rid, "identity loaded");

    let pool = koi_store::connect(&config.database_url).await?;
    koi_store::run_migrations(&pool).await?;
    info!("database migrations applied");

    let queue = Arc::new(koi_store::EventQueue::new(pool.clone()));
    let peers: Arc<dyn koi_net::PeerDirectory> = Arc::new(InMemoryPeerDirectory::new());
    let rids: Arc<dyn koi_net::RidStore> = Arc::new(InMemoryRidStore::new());

    let lookup = Box::new(PgEntityLookup::new(pool.clone()));
    let cross_refs = Box::new(PgCrossRefStore::new(pool.clone()));
    let pipeline_ctx =
        Arc::new(PipelineContext::new(profile.node_rid.clone(), ResolutionMode::Fuzzy, lookup, None, cross_refs));
    let pipeline = Arc::new(KnowledgePipeline::with_defaults());

    let security = SecurityPolicy::from_env();

    let state = Arc::new(AppState { keypair, profile: profile.clone(), security, queue: queue.clone(), peers, rids, pipeline, pipeline_ctx });

    let poller = Arc::new(Poller::new(state.clone(), Duration::from_secs(config.poll_interval_secs)));
    let poller_handle = poller.spawn();

    let indexer = Arc::new(
        koi_indexer::CodeIndexer::new(pool.clone(), queue.clone(), profile.node_rid.clone(), config.clone_dir.clone())
            .with_interval(Duration::from_secs(config.github_scan_interval_secs)),
    );
    let indexer_handle = indexer.spawn();

    let extractor: Arc<dyn StructuredExtractor> = match &config.extractor_url {
        Some(url) => Arc::new(HttpStructuredExtractor::new(url.clone())),
        None => Arc::new(NullExtractor),
    };
    let web_monitor = Arc::new(
        WebMonitor::new(pool.clone(), queue.clone(), profile.node_rid.clone(), extractor)
            .with_interval(Duration::from_secs(config.web_scan_interval_secs))
            .with_webdriver(config.webdriver_url.clone()),
    );
    let web_monitor_handle = web_monitor.spawn();

    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "protocol router listening");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
    };

    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

    poller_handle.abort();
    indexer_handle.abort();
    web_monitor_handle.abort();

    Ok(())
}
