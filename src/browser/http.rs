// src/browser/http.rs

//! Static-document browser backed by reqwest and scraper.
//!
//! Pages are fetched once per navigation and queried as parsed HTML. Script
//! evaluation is unavailable, so callers must treat it as best-effort.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{Browser, Element, NavigateOptions, Page, Response, dom};
use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::http::create_async_client;

/// Browser session sharing one connection pool across pages.
#[derive(Clone)]
pub struct HttpBrowser {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBrowser {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<(Response, String)> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AppError::navigation(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::navigation(url, e))?;

        Ok((
            Response {
                status,
                url: final_url,
            },
            body,
        ))
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(HttpPage {
            session: self.clone(),
            url: String::from("about:blank"),
            html: String::new(),
        }))
    }
}

pub struct HttpPage {
    session: HttpBrowser,
    url: String,
    html: String,
}

#[async_trait]
impl Page for HttpPage {
    async fn navigate(&mut self, url: &str, opts: &NavigateOptions) -> Result<Response> {
        log::debug!("GET {}", url);
        let (response, body) = self.session.fetch(url, opts.timeout).await?;
        self.url = response.url.clone();
        self.html = body;
        Ok(response)
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn locate(&self, selector: &str) -> Result<Vec<Element>> {
        dom::select(&self.html, selector)
    }

    async fn locate_in_frame(&self, frame_url: &str, selector: &str) -> Result<Vec<Element>> {
        let base = Url::parse(&self.url)?;
        let resolved = base.join(frame_url)?;
        let (response, body) = self
            .session
            .fetch(resolved.as_str(), self.session.timeout)
            .await?;
        if !response.is_success() {
            return Err(AppError::navigation(
                resolved.as_str(),
                format!("frame returned {}", response.status),
            ));
        }
        dom::select(&body, selector)
    }

    async fn click(&mut self, element: &Element) -> Result<Response> {
        let base = Url::parse(&self.url)?;
        let target = element.navigation_target(&base).ok_or_else(|| {
            AppError::unsupported(format!("<{}> has no static click target", element.tag))
        })?;

        let target_url = Url::parse(&target)?;
        let mut current = base.clone();
        current.set_fragment(None);
        let mut target_doc = target_url.clone();
        target_doc.set_fragment(None);

        // In-page anchors only move the fragment.
        if current == target_doc {
            self.url = target_url.to_string();
            return Ok(Response {
                status: 200,
                url: self.url.clone(),
            });
        }

        let opts = NavigateOptions::with_timeout(self.session.timeout);
        self.navigate(target_url.as_str(), &opts).await
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Err(AppError::unsupported(
            "script evaluation on a static document",
        ))
    }

    async fn title(&self) -> Result<String> {
        Ok(dom::title(&self.html))
    }

    async fn close(&mut self) -> Result<()> {
        self.html.clear();
        Ok(())
    }
}
