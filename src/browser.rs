//! Stateful page session used by the worker to load and read item pages.
//!
//! A session is opened once per run and shared by every item, so connection
//! pools and cookies are reused across pages. It keeps the last page it
//! navigated to; `extract_text` reads from that page. The session must be
//! closed on every exit path of the run.

use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Node, Selector};
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// A browser-like page session.
///
/// Methods take `&mut self`: one page is in flight at a time.
pub trait BrowserSession {
    /// Load `url`, replacing the current page.
    async fn navigate(&mut self, url: &str) -> Result<(), Box<dyn Error>>;
    /// Visible text of the current page.
    async fn extract_text(&mut self) -> Result<String, Box<dyn Error>>;
    /// Release the session. Idempotent.
    async fn close(&mut self);
}

#[derive(Debug)]
struct Page {
    url: String,
    html: String,
}

/// [`BrowserSession`] backed by a shared HTTP client.
#[derive(Debug)]
pub struct HttpBrowser {
    client: Option<Client>,
    current: Option<Page>,
}

impl HttpBrowser {
    pub fn open(timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(concat!("feed_digest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!("Browser session opened");
        Ok(Self {
            client: Some(client),
            current: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

impl BrowserSession for HttpBrowser {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn navigate(&mut self, url: &str) -> Result<(), Box<dyn Error>> {
        let client = self.client.as_ref().ok_or("browser session is closed")?;
        self.current = None;
        let html = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = html.len(), "Loaded page");
        self.current = Some(Page {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn extract_text(&mut self) -> Result<String, Box<dyn Error>> {
        let page = self.current.as_ref().ok_or("no page loaded")?;
        let text = visible_text(&page.html);
        debug!(url = %page.url, chars = text.len(), "Extracted page text");
        Ok(text)
    }

    async fn close(&mut self) {
        self.current = None;
        if self.client.take().is_some() {
            info!("Browser session closed");
        }
    }
}

impl Drop for HttpBrowser {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Browser session dropped without close");
        }
    }
}

/// Visible text of an HTML document body, whitespace-collapsed.
///
/// Text inside scripts, styles and other non-rendered elements is skipped.
/// Documents without a `<body>` fall back to the whole tree.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&BODY)
        .next()
        .map(|body| *body)
        .unwrap_or_else(|| document.tree.root());

    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}
