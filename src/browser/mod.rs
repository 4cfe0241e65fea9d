// src/browser/mod.rs

//! Browser capability used by every crawl stage.
//!
//! Workers only see [`Browser`] and [`Page`]. DOM queries return owned
//! [`Element`] snapshots so nothing borrowed from a parsed document is held
//! across an await point.

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod dom;
#[cfg(test)]
pub mod fake;
pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::error::Result;
use crate::models::{BrowserEngine, CrawlerConfig};
use crate::utils::url::{extract_script_url, resolve_href};

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use http::HttpBrowser;

/// Tags whose text is used as the surrounding context of a short anchor.
const CONTEXT_TAGS: &[&str] = &["tr", "li", "article", "div"];

/// Options for a single navigation.
#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub timeout: Duration,
    /// Extra settle time for implementations that render scripts
    pub settle: Duration,
}

impl NavigateOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            settle: Duration::ZERO,
        }
    }
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

/// Outcome of a navigation or click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status: u16,
    /// URL after redirects
    pub url: String,
}

impl Response {
    /// 2xx and 3xx statuses.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// One ancestor of a located element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ancestor {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
}

impl Ancestor {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// `id` and `class` joined and lowercased.
    pub fn id_and_class(&self) -> String {
        format!(
            "{} {}",
            self.attr("id").unwrap_or_default(),
            self.attr("class").unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// Owned snapshot of a DOM element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Whitespace-normalized descendant text
    pub text: String,
    /// Text of the nearest `tr`/`li`/`article`/`div` ancestor
    pub context_text: String,
    /// Nearest first
    pub ancestors: Vec<Ancestor>,
    /// Child-index path from the document root
    pub path: Vec<usize>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href").map(str::trim).filter(|h| !h.is_empty())
    }

    /// `aria-label`, falling back to `title`.
    pub fn label(&self) -> Option<&str> {
        self.attr("aria-label")
            .or_else(|| self.attr("title"))
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// True when `other` is this element or one of its descendants.
    pub fn contains(&self, other: &Element) -> bool {
        other.path.starts_with(&self.path)
    }

    /// Inside site header, footer or navigation.
    pub fn in_page_chrome(&self) -> bool {
        self.ancestors.iter().any(|a| {
            matches!(a.tag.as_str(), "header" | "footer" | "nav")
                || matches!(
                    a.attr("role"),
                    Some("banner" | "contentinfo" | "navigation")
                )
        })
    }

    pub fn in_footer(&self) -> bool {
        self.ancestors.iter().any(|a| {
            a.tag == "footer"
                || a.attr("role") == Some("contentinfo")
                || a.id_and_class().contains("footer")
        })
    }

    pub fn parent(&self) -> Option<&Ancestor> {
        self.ancestors.first()
    }

    /// URL a click on this element would load, if it can be known statically.
    pub fn navigation_target(&self, base: &Url) -> Option<String> {
        ["href", "data-href", "data-url"]
            .iter()
            .filter_map(|key| self.attr(key))
            .find_map(|value| resolve_href(base, value))
            .or_else(|| {
                let script_url = extract_script_url(self.attr("onclick")?)?;
                base.join(&script_url).ok().map(|u| u.to_string())
            })
    }
}

/// A single browsing context.
#[async_trait]
pub trait Page: Send + Sync {
    /// Load `url`. Transport failures and timeouts are errors; HTTP error
    /// statuses are reported in the response.
    async fn navigate(&mut self, url: &str, opts: &NavigateOptions) -> Result<Response>;

    /// Current document URL.
    fn url(&self) -> &str;

    async fn locate(&self, selector: &str) -> Result<Vec<Element>>;

    /// Query a frame document by its `src` URL.
    async fn locate_in_frame(&self, frame_url: &str, selector: &str) -> Result<Vec<Element>>;

    async fn click(&mut self, element: &Element) -> Result<Response>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    async fn title(&self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// A browser session shared by all workers; each worker opens its own page.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>>;
}

/// Open the configured browser engine.
///
/// Headless Chromium is the production engine. Builds without the `chrome`
/// feature, or a Chromium that fails to start, fall back to the static HTTP
/// browser, which cannot run scripts or click script-only controls.
pub async fn launch(config: &CrawlerConfig) -> Result<Arc<dyn Browser>> {
    match config.engine {
        BrowserEngine::Chrome => launch_chrome(config).await,
        BrowserEngine::Http => Ok(Arc::new(HttpBrowser::new(config)?)),
    }
}

#[cfg(feature = "chrome")]
async fn launch_chrome(config: &CrawlerConfig) -> Result<Arc<dyn Browser>> {
    match ChromeBrowser::launch(config).await {
        Ok(browser) => Ok(Arc::new(browser)),
        Err(e) => {
            log::warn!("Chromium unavailable ({}), using static HTTP browser", e);
            Ok(Arc::new(HttpBrowser::new(config)?))
        }
    }
}

#[cfg(not(feature = "chrome"))]
async fn launch_chrome(config: &CrawlerConfig) -> Result<Arc<dyn Browser>> {
    log::warn!("Built without the `chrome` feature, using static HTTP browser");
    Ok(Arc::new(HttpBrowser::new(config)?))
}
