// src/browser/chrome.rs

//! Headless Chromium browser backed by chromiumoxide.
//!
//! Scripts run, so JS-only pagination controls can be clicked and lazy
//! content can be scrolled into view. DOM queries still work on a snapshot
//! of the rendered document; every element is stamped with a node id before
//! the snapshot so a later click can find the live element again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Page as CdpPage};
use futures::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use super::{Browser, Element, NavigateOptions, Page, Response, dom};
use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Attribute carrying the node id stamped into the live DOM.
pub const NODE_ATTR: &str = "data-jobscout-node";

/// Wait after a click for script-driven navigation to start.
const CLICK_SETTLE: Duration = Duration::from_millis(750);

const STAMP_SCRIPT: &str = r#"(() => {
    window.__jobscoutNext = window.__jobscoutNext || 0;
    for (const el of document.querySelectorAll('*')) {
        if (!el.hasAttribute('data-jobscout-node')) {
            el.setAttribute('data-jobscout-node', String(window.__jobscoutNext++));
        }
    }
    return window.__jobscoutNext;
})()"#;

const STATUS_SCRIPT: &str = r#"(() => {
    const nav = performance.getEntriesByType('navigation')[0];
    return nav && nav.responseStatus ? nav.responseStatus : 200;
})()"#;

/// One Chromium process shared by every page.
pub struct ChromeBrowser {
    inner: Arc<CdpBrowser>,
    events: JoinHandle<()>,
    timeout: Duration,
}

impl ChromeBrowser {
    /// Launch a headless Chromium with the configured user agent.
    pub async fn launch(config: &CrawlerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let browser_config = BrowserConfig::builder()
            .request_timeout(timeout)
            .arg(format!("--user-agent={}", config.user_agent))
            .build()
            .map_err(AppError::browser)?;

        let (inner, mut handler) = CdpBrowser::launch(browser_config)
            .await
            .map_err(AppError::browser)?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Chromium handler stopped: {}", e);
                    break;
                }
            }
        });

        log::info!("Launched headless Chromium");
        Ok(Self {
            inner: Arc::new(inner),
            events,
            timeout,
        })
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        self.events.abort();
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let page = self
            .inner
            .new_page("about:blank")
            .await
            .map_err(AppError::browser)?;
        Ok(Box::new(ChromePage {
            page: Some(page),
            session: Arc::clone(&self.inner),
            url: String::from("about:blank"),
            timeout: self.timeout,
        }))
    }
}

pub struct ChromePage {
    page: Option<CdpPage>,
    session: Arc<CdpBrowser>,
    /// Last URL reported by the browser
    url: String,
    timeout: Duration,
}

impl ChromePage {
    fn live(&self) -> Result<&CdpPage> {
        self.page
            .as_ref()
            .ok_or_else(|| AppError::browser("page already closed"))
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.live()?.evaluate(script).await.map_err(AppError::browser)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Current URL and document status after a navigation settled.
    async fn settled_response(&mut self) -> Result<Response> {
        if let Some(url) = self.live()?.url().await.map_err(AppError::browser)? {
            self.url = url;
        }
        let status = self
            .eval(STATUS_SCRIPT)
            .await?
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);
        Ok(Response {
            status,
            url: self.url.clone(),
        })
    }

    /// Rendered HTML with every element stamped with a node id.
    async fn snapshot(&self) -> Result<String> {
        self.eval(STAMP_SCRIPT).await?;
        self.live()?.content().await.map_err(AppError::browser)
    }
}

/// Stamped node id of a snapshot element.
fn node_id(element: &Element) -> Option<u64> {
    element.attr(NODE_ATTR)?.parse().ok()
}

fn click_script(id: u64) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector('[{NODE_ATTR}="{id}"]');
    if (!el) return false;
    el.scrollIntoView({{ block: 'center' }});
    el.click();
    return true;
}})()"#
    )
}

#[async_trait]
impl Page for ChromePage {
    async fn navigate(&mut self, url: &str, opts: &NavigateOptions) -> Result<Response> {
        log::debug!("Chromium GET {}", url);
        let page = self.live()?;
        match tokio::time::timeout(opts.timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(AppError::navigation(url, e)),
            Err(_) => return Err(AppError::navigation(url, "navigation timed out")),
        }
        if !opts.settle.is_zero() {
            tokio::time::sleep(opts.settle).await;
        }
        self.settled_response().await
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn locate(&self, selector: &str) -> Result<Vec<Element>> {
        let html = self.snapshot().await?;
        dom::select(&html, selector)
    }

    async fn locate_in_frame(&self, frame_url: &str, selector: &str) -> Result<Vec<Element>> {
        let resolved = Url::parse(&self.url)?.join(frame_url)?;
        let frame = tokio::time::timeout(self.timeout, self.session.new_page(resolved.as_str()))
            .await
            .map_err(|_| AppError::navigation(resolved.as_str(), "frame load timed out"))?
            .map_err(|e| AppError::navigation(resolved.as_str(), e))?;

        let html = frame.content().await.map_err(AppError::browser);
        if let Err(e) = frame.close().await {
            log::debug!("Closing frame tab {} failed: {}", resolved, e);
        }
        dom::select(&html?, selector)
    }

    async fn click(&mut self, element: &Element) -> Result<Response> {
        let id = node_id(element).ok_or_else(|| {
            AppError::unsupported(format!("<{}> was not located on this page", element.tag))
        })?;

        let clicked = self.eval(&click_script(id)).await?;
        if clicked != serde_json::Value::Bool(true) {
            return Err(AppError::navigation(
                &self.url,
                format!("<{}> is no longer in the document", element.tag),
            ));
        }

        tokio::time::sleep(CLICK_SETTLE).await;
        let page = self.live()?;
        if tokio::time::timeout(self.timeout, page.wait_for_navigation())
            .await
            .is_err()
        {
            log::debug!("Click on <{}> did not settle in time", element.tag);
        }
        self.settled_response().await
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.eval(script).await
    }

    async fn title(&self) -> Result<String> {
        let html = self.live()?.content().await.map_err(AppError::browser)?;
        Ok(dom::title(&html))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            page.close().await.map_err(AppError::browser)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_from_snapshot() {
        let html = format!(r#"<a {NODE_ATTR}="17" href="?page=2">2</a><a>3</a>"#);
        let anchors = dom::select(&html, "a").unwrap();
        assert_eq!(node_id(&anchors[0]), Some(17));
        assert_eq!(node_id(&anchors[1]), None);
    }

    #[test]
    fn test_click_script_targets_stamped_node() {
        let script = click_script(42);
        assert!(script.contains(r#"[data-jobscout-node="42"]"#));
        assert!(script.contains("el.click()"));
        assert!(STAMP_SCRIPT.contains(NODE_ATTR));
    }
}
