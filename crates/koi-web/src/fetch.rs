//! URL fetch + readable-text extraction. Ported from `web_fetcher.py`'s
//! aiohttp/BeautifulSoup pipeline onto `reqwest`/`scraper`.

use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

const MAX_HTML_BYTES: usize = 5 * 1024 * 1024;
const MAX_TEXT_CHARS: usize = 100_000;
const FETCH_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "koi-node/0.1 (knowledge mesh web monitor)";

pub const WORD_COUNT_FALLBACK_THRESHOLD: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url resolves to a disallowed address")]
    DisallowedAddress,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub title: Option<String>,
    pub content_text: String,
}

impl FetchedPage {
    pub fn word_count(&self) -> usize {
        self.content_text.split_whitespace().count()
    }
}

/// Reject URLs that resolve to loopback/private/link-local addresses —
/// fetching a monitored URL must not become an SSRF vector into the host's
/// own network.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::InvalidUrl(format!("unsupported scheme: {}", url.scheme())));
    }
    let host = url.host_str().ok_or_else(|| FetchError::InvalidUrl("missing host".into()))?;
    let port = url.port_or_known_default().unwrap_or(443);
    if let Ok(addrs) = (host, port).to_socket_addrs() {
        for addr in addrs {
            if is_disallowed(addr.ip()) {
                return Err(FetchError::DisallowedAddress);
            }
        }
    }
    Ok(url)
}

fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

pub async fn fetch_html(url: &Url) -> Result<String, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    let response = client.get(url.as_str()).send().await?;
    let bytes = response.bytes().await?;
    let truncated = if bytes.len() > MAX_HTML_BYTES { &bytes[..MAX_HTML_BYTES] } else { &bytes[..] };
    Ok(String::from_utf8_lossy(truncated).into_owned())
}

/// Extract readable body text and the page title from raw HTML.
pub fn extract_readable(html: &str) -> FetchedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let noise = Selector::parse("script, style, noscript, nav, footer, header").unwrap();
    let noise_nodes: std::collections::HashSet<_> = document.select(&noise).map(|el| el.id()).collect();

    let body_sel = Selector::parse("body").ok();
    let root = body_sel.as_ref().and_then(|sel| document.select(sel).next()).unwrap_or_else(|| document.root_element());

    let mut text_parts = Vec::new();
    for node in root.descendants() {
        if let Some(text_node) = node.value().as_text() {
            if let Some(parent) = node.parent() {
                if noise_nodes.contains(&parent.id()) {
                    continue;
                }
            }
            let trimmed = text_node.trim();
            if !trimmed.is_empty() {
                text_parts.push(trimmed.to_string());
            }
        }
    }

    let mut content_text = text_parts.join(" ");
    content_text = content_text.split_whitespace().collect::<Vec<_>>().join(" ");
    if content_text.chars().count() > MAX_TEXT_CHARS {
        content_text = content_text.chars().take(MAX_TEXT_CHARS).collect();
    }

    FetchedPage { title, content_text }
}

pub fn content_hash16(content_text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content_text.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_rejects_non_http_schemes() {
        let err = validate_url("ftp://example.com/file").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn validate_url_rejects_loopback_host() {
        let err = validate_url("http://127.0.0.1:8080/admin").unwrap_err();
        assert!(matches!(err, FetchError::DisallowedAddress));
    }

    #[test]
    fn validate_url_accepts_public_https() {
        let url = validate_url("https://example.com/page").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn extract_readable_strips_script_and_nav_text() {
        let html = r#"
            <html>
              <head><title>  Widget Docs  </title></head>
              <body>
                <nav>Home About</nav>
                <script>var x = 1;</script>
                <main>Widgets are reusable components.</main>
              </body>
            </html>
        "#;
        let page = extract_readable(html);
        assert_eq!(page.title.as_deref(), Some("Widget Docs"));
        assert!(page.content_text.contains("Widgets are reusable components."));
        assert!(!page.content_text.contains("Home About"));
        assert!(!page.content_text.contains("var x = 1"));
    }

    #[test]
    fn word_count_counts_whitespace_separated_tokens() {
        let page = FetchedPage { title: None, content_text: "one two three".to_string() };
        assert_eq!(page.word_count(), 3);
    }

    #[test]
    fn content_hash16_is_stable_and_16_hex_chars() {
        let a = content_hash16("same content");
        let b = content_hash16("same content");
        let c = content_hash16("different content");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
