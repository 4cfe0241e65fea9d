// src/services/seeds.rs

//! Company harvesting from seed listing sites.
//!
//! Directory sources list company profiles; each profile links to the
//! company website. Job-board sources only expose company names, which are
//! resolved to URLs later through search.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::browser::{Element, NavigateOptions, Page};
use crate::error::{AppError, Result};
use crate::models::SeedSource;
use crate::utils::resolve_href;

/// Listing passes without growth before the directory scroll gives up.
const MAX_SCROLL_STALLS: usize = 3;

const DEFAULT_DIRECTORY_NAME_SELECTOR: &str = "span";

static AGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s*[hdwm]\s*ago").expect("hardcoded regex pattern is valid")
});

const SCROLL_SCRIPT: &str = r#"
    () => {
        window.scrollTo(0, document.body.scrollHeight);
        window.scrollBy(0, 1000);
        return true;
    }
"#;

/// A company listed on a directory, before its profile is visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub profile_url: String,
}

pub struct SeedHarvester {
    timeout: Duration,
}

impl SeedHarvester {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn nav_for(&self, source: &SeedSource) -> NavigateOptions {
        NavigateOptions {
            timeout: self.timeout,
            settle: Duration::from_millis(source.wait_ms),
        }
    }

    /// Load the source's listing page.
    pub async fn open_listing(&self, page: &mut dyn Page, source: &SeedSource) -> Result<()> {
        let response = page.navigate(&source.url, &self.nav_for(source)).await?;
        if !response.is_success() {
            return Err(AppError::navigation(
                &source.url,
                format!("listing returned {}", response.status),
            ));
        }
        Ok(())
    }

    /// Collect directory entries from the loaded listing page.
    ///
    /// Scrolls between passes to trigger lazy loading and stops after three
    /// passes without new anchors, or once `limit` entries are known
    /// (`0` = unbounded).
    pub async fn directory_entries(
        &self,
        page: &mut dyn Page,
        source: &SeedSource,
        limit: usize,
    ) -> Result<Vec<DirectoryEntry>> {
        let name_selector = source
            .name_selector
            .as_deref()
            .unwrap_or(DEFAULT_DIRECTORY_NAME_SELECTOR);

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut previous_visible = 0;
        let mut stalls = 0;

        loop {
            let base = Url::parse(page.url())?;
            let anchors = page.locate(&source.selector).await?;
            let names = page.locate(name_selector).await?;
            let visible = anchors.len();

            let mut added = 0;
            for anchor in &anchors {
                let name = first_within(anchor, &names)
                    .map(|el| el.text.clone())
                    .unwrap_or_else(|| anchor.text.clone());
                let name = name.trim().to_string();
                if name.is_empty() || !seen.insert(name.clone()) {
                    continue;
                }
                let Some(profile_url) = anchor.href().and_then(|h| resolve_href(&base, h)) else {
                    continue;
                };
                log::debug!("Listed {} -> {}", name, profile_url);
                entries.push(DirectoryEntry { name, profile_url });
                added += 1;
            }
            log::info!(
                "{}: {} visible, {} new, {} total",
                source.name,
                visible,
                added,
                entries.len()
            );

            if limit > 0 && entries.len() >= limit {
                entries.truncate(limit);
                break;
            }

            if visible == previous_visible {
                stalls += 1;
                if stalls >= MAX_SCROLL_STALLS {
                    log::info!("{}: listing stopped growing", source.name);
                    break;
                }
            } else {
                stalls = 0;
            }
            previous_visible = visible;

            if let Err(e) = page.evaluate(SCROLL_SCRIPT).await {
                log::debug!("{}: scroll unavailable ({}), single pass only", source.name, e);
                break;
            }
            tokio::time::sleep(self.nav_for(source).settle.min(Duration::from_millis(1500))).await;
        }

        Ok(entries)
    }

    /// Visit a directory profile and read the company website link.
    pub async fn profile_website(
        &self,
        page: &mut dyn Page,
        source: &SeedSource,
        entry: &DirectoryEntry,
    ) -> Result<Option<String>> {
        let Some(selector) = source.profile_link_selector.as_deref() else {
            return Ok(None);
        };

        let response = page
            .navigate(&entry.profile_url, &NavigateOptions::with_timeout(self.timeout))
            .await?;
        if !response.is_success() {
            return Err(AppError::navigation(
                &entry.profile_url,
                format!("profile returned {}", response.status),
            ));
        }

        let base = Url::parse(page.url())?;
        let website = page
            .locate(selector)
            .await?
            .iter()
            .filter_map(|el| el.href())
            .filter_map(|href| resolve_href(&base, href))
            .find(|url| url.starts_with("http"));
        Ok(website)
    }

    /// Company names from the loaded job-board listing page.
    pub async fn job_board_names(&self, page: &dyn Page, source: &SeedSource) -> Result<Vec<String>> {
        let cards = page.locate(&source.selector).await?;
        let names = match source.name_selector.as_deref() {
            Some(selector) => page.locate(selector).await?,
            None => Vec::new(),
        };
        log::info!("{}: {} listings", source.name, cards.len());

        let mut seen = HashSet::new();
        Ok(cards
            .iter()
            .map(|card| {
                let raw = first_within(card, &names).map_or(card.text.as_str(), |el| el.text.as_str());
                clean_listing_name(raw)
            })
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_lowercase()))
            .collect())
    }
}

/// First element in `candidates` nested inside `container`.
fn first_within<'a>(container: &Element, candidates: &'a [Element]) -> Option<&'a Element> {
    candidates
        .iter()
        .find(|el| el.path != container.path && container.contains(el) && !el.text.trim().is_empty())
}

/// Extract the company from a listing line like "Backend Engineer at Acme Labs 3d ago".
///
/// Strips age markers, then takes the words after "at", falling back to the
/// last word.
pub fn clean_listing_name(text: &str) -> String {
    let stripped = AGE_MARKER.replace_all(text, "");
    let words: Vec<&str> = stripped.split_whitespace().collect();

    if let Some(pos) = words.iter().position(|w| w.eq_ignore_ascii_case("at")) {
        if pos + 1 < words.len() {
            return words[pos + 1..].join(" ");
        }
    }
    words.last().map(|w| w.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Browser;
    use crate::browser::fake::FakeBrowser;
    use crate::models::SourceKind;

    fn directory() -> SeedSource {
        SeedSource {
            name: "directory".into(),
            kind: SourceKind::Directory,
            url: "https://dir.example/companies".into(),
            selector: r#"a[href^="/companies/"]"#.into(),
            name_selector: Some("span".into()),
            profile_link_selector: Some("div.group a".into()),
            wait_ms: 0,
        }
    }

    fn board() -> SeedSource {
        SeedSource {
            name: "board".into(),
            kind: SourceKind::JobBoard,
            url: "https://board.example/jobs".into(),
            selector: "div.card".into(),
            name_selector: Some("p".into()),
            profile_link_selector: None,
            wait_ms: 0,
        }
    }

    #[test]
    fn test_clean_listing_name() {
        assert_eq!(clean_listing_name("Backend Engineer at Acme Labs 3d ago"), "Acme Labs");
        assert_eq!(clean_listing_name("Posted 12h ago Globex"), "Globex");
        assert_eq!(clean_listing_name("  Initech  "), "Initech");
        assert_eq!(clean_listing_name("Looking at"), "at");
        assert_eq!(clean_listing_name("2w ago"), "");
    }

    #[tokio::test]
    async fn test_directory_entries_and_profiles() {
        let listing = r#"<body>
            <a href="/companies/acme"><span>Acme</span><span>Rockets</span></a>
            <a href="/companies/globex">Globex Corp</a>
            <a href="/companies/acme-dup"><span>Acme</span></a>
            <a href="/about">About</a>
        </body>"#;
        let profile = r#"<body><div class="group"><a href="https://acme.io">acme.io</a></div></body>"#;
        let browser = FakeBrowser::new()
            .page("https://dir.example/companies", listing)
            .page("https://dir.example/companies/acme", profile)
            .page("https://dir.example/companies/globex", "<body>No link</body>");
        let harvester = SeedHarvester::new(Duration::from_secs(5));
        let source = directory();
        let mut page = browser.new_page().await.unwrap();

        harvester.open_listing(page.as_mut(), &source).await.unwrap();
        let entries = harvester
            .directory_entries(page.as_mut(), &source, 0)
            .await
            .unwrap();

        assert_eq!(
            entries,
            vec![
                DirectoryEntry {
                    name: "Acme".into(),
                    profile_url: "https://dir.example/companies/acme".into()
                },
                DirectoryEntry {
                    name: "Globex Corp".into(),
                    profile_url: "https://dir.example/companies/globex".into()
                },
            ]
        );

        let acme = harvester
            .profile_website(page.as_mut(), &source, &entries[0])
            .await
            .unwrap();
        assert_eq!(acme.as_deref(), Some("https://acme.io/"));

        let globex = harvester
            .profile_website(page.as_mut(), &source, &entries[1])
            .await
            .unwrap();
        assert_eq!(globex, None);
    }

    #[tokio::test]
    async fn test_directory_limit() {
        let listing = r#"<body>
            <a href="/companies/a"><span>A</span></a>
            <a href="/companies/b"><span>B</span></a>
            <a href="/companies/c"><span>C</span></a>
        </body>"#;
        let browser = FakeBrowser::new().page("https://dir.example/companies", listing);
        let harvester = SeedHarvester::new(Duration::from_secs(5));
        let mut page = browser.new_page().await.unwrap();

        harvester.open_listing(page.as_mut(), &directory()).await.unwrap();
        let entries = harvester
            .directory_entries(page.as_mut(), &directory(), 2)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_open_listing_rejects_error_status() {
        let browser = FakeBrowser::new();
        let harvester = SeedHarvester::new(Duration::from_secs(5));
        let mut page = browser.new_page().await.unwrap();

        let err = harvester.open_listing(page.as_mut(), &board()).await.unwrap_err();
        assert!(matches!(err, AppError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_job_board_names() {
        let listing = r#"<body>
            <div class="card"><div><p>Frontend Engineer at Acme Labs</p></div><span>3d ago</span></div>
            <div class="card"><div><p>Hiring 5h ago Globex</p></div></div>
            <div class="card"><div><p>Designer at acme labs</p></div></div>
            <div class="card"><div><p>1w ago</p></div></div>
        </body>"#;
        let browser = FakeBrowser::new().page("https://board.example/jobs", listing);
        let harvester = SeedHarvester::new(Duration::from_secs(5));
        let mut page = browser.new_page().await.unwrap();

        harvester.open_listing(page.as_mut(), &board()).await.unwrap();
        let names = harvester.job_board_names(&*page, &board()).await.unwrap();

        assert_eq!(names, vec!["Acme Labs", "Globex"]);
    }
}
