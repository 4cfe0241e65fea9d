// src/services/search.rs

//! Company name → website resolution through a web search API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::SearchConfig;

/// Resolves a company name to its website.
#[async_trait]
pub trait CompanySearch: Send + Sync {
    /// `Ok(None)` when the search ran but returned nothing usable.
    async fn search(&self, name: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    #[serde(default)]
    display_link: String,
    #[serde(default)]
    link: String,
}

/// Google Custom Search JSON API client.
pub struct GoogleSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

impl GoogleSearch {
    pub fn new(client: reqwest::Client, config: SearchConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::config(
                "search api key missing (set search.api_key or GOOGLE_API_KEY)",
            ));
        }
        if config.engine_id.trim().is_empty() {
            return Err(AppError::config(
                "search engine id missing (set search.engine_id or GOOGLE_SEARCH_ENGINE_ID)",
            ));
        }
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompanySearch for GoogleSearch {
    async fn search(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.engine_id.as_str()),
                ("q", name),
                ("num", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::search(format!(
                "search for '{}' returned {}",
                name, status
            )));
        }

        let body: CseResponse = response.json().await?;
        let url = first_result_url(&body);
        if url.is_none() {
            log::warn!("No search results for '{}'", name);
        }
        Ok(url)
    }
}

/// Homepage of the top result: its display host, else its link's origin.
fn first_result_url(body: &CseResponse) -> Option<String> {
    let item = body.items.first()?;
    let host = item.display_link.trim().trim_end_matches('/');
    if !host.is_empty() {
        return Some(if host.starts_with("http") {
            host.to_string()
        } else {
            format!("https://{host}")
        });
    }
    url::Url::parse(&item.link)
        .ok()
        .map(|u| u.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_result_prefers_display_link() {
        let body: CseResponse = serde_json::from_str(
            r#"{"items":[{"displayLink":"www.acme.io","link":"https://www.acme.io/about"},
                         {"displayLink":"acme.dev"}]}"#,
        )
        .unwrap();
        assert_eq!(first_result_url(&body).as_deref(), Some("https://www.acme.io"));
    }

    #[test]
    fn test_first_result_falls_back_to_link_origin() {
        let body: CseResponse =
            serde_json::from_str(r#"{"items":[{"link":"https://acme.io/company"}]}"#).unwrap();
        assert_eq!(first_result_url(&body).as_deref(), Some("https://acme.io"));
    }

    #[test]
    fn test_no_items() {
        let body: CseResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(first_result_url(&body), None);
    }

    #[test]
    fn test_new_requires_credentials() {
        let client = reqwest::Client::new();
        assert!(GoogleSearch::new(client.clone(), SearchConfig::default()).is_err());

        let config = SearchConfig {
            api_key: "k".into(),
            engine_id: "cx".into(),
            ..SearchConfig::default()
        };
        assert!(GoogleSearch::new(client, config).is_ok());
    }
}
