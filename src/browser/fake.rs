// src/browser/fake.rs

//! In-memory browser serving canned HTML for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{Browser, Element, NavigateOptions, Page, Response, dom};
use crate::error::{AppError, Result};

#[derive(Default)]
struct Site {
    pages: HashMap<String, (u16, String)>,
    failing: Vec<String>,
    /// url -> navigations that succeed before it starts failing
    fail_after: HashMap<String, usize>,
    broken_selectors: Vec<String>,
    /// url -> delay before the navigation completes
    slow: HashMap<String, Duration>,
    /// (page url, element text or label) -> destination
    clicks: HashMap<(String, String), String>,
    visits: Mutex<Vec<String>>,
}

fn key(url: &str) -> String {
    Url::parse(url)
        .map(|mut u| {
            u.set_fragment(None);
            u.to_string()
        })
        .unwrap_or_else(|_| url.to_string())
}

/// Builder-style fake; cloned handles share the same site.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    site: Arc<Site>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn site_mut(&mut self) -> &mut Site {
        Arc::get_mut(&mut self.site).expect("configure FakeBrowser before cloning")
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.site_mut()
            .pages
            .insert(key(url), (200, html.to_string()));
        self
    }

    pub fn status_page(mut self, url: &str, status: u16, html: &str) -> Self {
        self.site_mut()
            .pages
            .insert(key(url), (status, html.to_string()));
        self
    }

    /// Navigations to `url` fail with a transport error.
    pub fn failing(mut self, url: &str) -> Self {
        self.site_mut().failing.push(key(url));
        self
    }

    /// Navigations to `url` succeed `times` times, then fail.
    pub fn failing_after(mut self, url: &str, times: usize) -> Self {
        self.site_mut().fail_after.insert(key(url), times);
        self
    }

    /// `locate` fails for any selector containing `needle`.
    pub fn broken_selector(mut self, needle: &str) -> Self {
        self.site_mut().broken_selectors.push(needle.to_string());
        self
    }

    /// Navigations to `url` take `delay` to complete.
    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.site_mut().slow.insert(key(url), delay);
        self
    }

    /// Clicking the element labelled `label` on `from` loads `to`.
    pub fn click_route(mut self, from: &str, label: &str, to: &str) -> Self {
        self.site_mut()
            .clicks
            .insert((key(from), label.to_string()), to.to_string());
        self
    }

    /// Every URL navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.site.visits.lock().unwrap().clone()
    }

    pub fn visited(&self, url: &str) -> bool {
        let wanted = key(url);
        self.visits().iter().any(|v| key(v) == wanted)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            url: "about:blank".into(),
            html: String::new(),
        }))
    }
}

pub struct FakePage {
    site: Arc<Site>,
    url: String,
    html: String,
}

impl FakePage {
    fn load(&mut self, url: &str) -> Result<Response> {
        let k = key(url);
        let attempts = {
            let mut visits = self.site.visits.lock().unwrap();
            visits.push(url.to_string());
            visits.iter().filter(|v| key(v) == k).count()
        };
        if self.site.failing.contains(&k) {
            return Err(AppError::navigation(url, "connection refused"));
        }
        if self.site.fail_after.get(&k).is_some_and(|&ok| attempts > ok) {
            return Err(AppError::navigation(url, "connection reset"));
        }
        let (status, html) = self
            .site
            .pages
            .get(&k)
            .cloned()
            .unwrap_or((404, String::new()));
        self.url = Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        self.html = html;
        Ok(Response {
            status,
            url: self.url.clone(),
        })
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&mut self, url: &str, _opts: &NavigateOptions) -> Result<Response> {
        if let Some(delay) = self.site.slow.get(&key(url)).copied() {
            tokio::time::sleep(delay).await;
        }
        self.load(url)
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn locate(&self, selector: &str) -> Result<Vec<Element>> {
        if self.site.broken_selectors.iter().any(|n| selector.contains(n.as_str())) {
            return Err(AppError::selector(selector, "not supported by this page"));
        }
        dom::select(&self.html, selector)
    }

    async fn locate_in_frame(&self, frame_url: &str, selector: &str) -> Result<Vec<Element>> {
        let resolved = Url::parse(&self.url)?.join(frame_url)?;
        match self.site.pages.get(&key(resolved.as_str())) {
            Some((_, html)) => dom::select(html, selector),
            None => Err(AppError::navigation(resolved.as_str(), "frame not found")),
        }
    }

    async fn click(&mut self, element: &Element) -> Result<Response> {
        let routed = [Some(element.text.as_str()), element.label()]
            .into_iter()
            .flatten()
            .find_map(|label| {
                self.site
                    .clicks
                    .get(&(key(&self.url), label.to_string()))
                    .cloned()
            });
        if let Some(to) = routed {
            return self.load(&to);
        }

        let base = Url::parse(&self.url)?;
        let target = element
            .navigation_target(&base)
            .ok_or_else(|| AppError::unsupported("element has no click target"))?;
        if key(&target) == key(&self.url) {
            self.url = target;
            return Ok(Response {
                status: 200,
                url: self.url.clone(),
            });
        }
        self.load(&target)
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn title(&self) -> Result<String> {
        Ok(dom::title(&self.html))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
