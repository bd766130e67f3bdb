//! Headless-browser fallback fetch for JS-rendered pages, used when the
//! plain HTTP fetch comes back too thin. The original used Playwright;
//! `fantoccini` (WebDriver) is the closest real equivalent available to a
//! Rust binary — it talks to an external `geckodriver`/`chromedriver`
//! process rather than embedding a browser.

use std::time::Duration;

use fantoccini::ClientBuilder;
use url::Url;

use crate::fetch::{extract_readable, FetchedPage};

const NAVIGATION_TIMEOUT_SECS: u64 = 30;
const POST_LOAD_WAIT_SECS: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum HeadlessError {
    #[error("webdriver error: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),
    #[error("webdriver connect error: {0}")]
    Connect(#[from] fantoccini::error::NewSessionError),
}

/// Render `url` in a real browser via WebDriver and extract readable text.
/// `webdriver_url` is the local/remote WebDriver endpoint (e.g.
/// `http://localhost:4444`).
pub async fn headless_fetch(webdriver_url: &str, url: &Url) -> Result<FetchedPage, HeadlessError> {
    let client = ClientBuilder::native().connect(webdriver_url).await?;

    let result = async {
        client.goto(url.as_str()).await?;
        // fantoccini has no networkidle wait; approximate with the
        // original's fixed post-load delay.
        tokio::time::sleep(Duration::from_secs(POST_LOAD_WAIT_SECS)).await;
        let html = client.source().await?;
        Ok::<_, fantoccini::error::CmdError>(html)
    }
    .await;

    let _ = client.close().await;
    let html = result?;
    Ok(extract_readable(&html))
}

pub fn navigation_timeout() -> Duration {
    Duration::from_secs(NAVIGATION_TIMEOUT_SECS)
}
