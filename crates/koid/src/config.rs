//! Configuration for koid.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// koid - federated knowledge-graph mesh node daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "koid")]
#[command(about = "KOI-net mesh node: HTTP router, peer poller, code indexer, web monitor")]
pub struct Config {
    /// Listen address for the HTTP protocol router
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory holding the node's private key and other local state
    #[arg(long, env = "KOI_STATE_DIR", default_value = "./data/koid")]
    pub state_dir: PathBuf,

    /// Postgres connection string for the relational store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// This node's name (used to derive its node RID)
    #[arg(long, env = "KOI_NODE_NAME", default_value = "koi-node")]
    pub node_name: String,

    /// Publicly reachable base URL advertised during handshake
    #[arg(long, env = "KOI_BASE_URL")]
    pub base_url: Option<String>,

    /// Peer poll interval in seconds
    #[arg(long, env = "KOI_POLL_INTERVAL", default_value = "60")]
    pub poll_interval_secs: u64,

    /// Code indexer scan interval in seconds
    #[arg(long, env = "GITHUB_SCAN_INTERVAL", default_value = "21600")]
    pub github_scan_interval_secs: u64,

    /// Web monitor scan interval in seconds
    #[arg(long, env = "WEB_SENSOR_INTERVAL", default_value = "86400")]
    pub web_scan_interval_secs: u64,

    /// Working directory for cloned repositories
    #[arg(long, env = "GITHUB_CLONE_DIR", default_value = "./data/koid/repos")]
    pub clone_dir: PathBuf,

    /// WebDriver endpoint for the headless-browser fetch fallback (disabled if unset)
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Endpoint implementing the structured-extraction contract (disabled if unset)
    #[arg(long, env = "KOI_EXTRACTOR_URL")]
    pub extractor_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_name.trim().is_empty() {
            anyhow::bail!("node name cannot be empty");
        }
        std::fs::create_dir_all(&self.state_dir)?;
        Ok(())
    }
}
