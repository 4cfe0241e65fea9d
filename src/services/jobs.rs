// src/services/jobs.rs

//! Per-company job crawler.
//!
//! Homepage → careers page → call-to-action links or a direct scan →
//! paginated listing pages. Produces deduplicated, classified job links.

use std::collections::HashSet;
use std::time::Duration;

use unicode_segmentation::UnicodeSegmentation;
use url::Url;

use crate::browser::{Browser, Element, NavigateOptions, Page};
use crate::error::{AppError, Result};
use crate::models::{
    ClassifiedJob, CrawlReport, CrawlerConfig, JobLink, NoiseRecord, PaginationKind,
    PaginationPattern,
};
use crate::services::classifier;
use crate::services::pagination;
use crate::utils::url::{rebase_to_host, resolve_href, same_host, without_fragment};

/// Anchor text that points at a careers page.
const CAREERS_TEXTS: &[&str] = &[
    "careers",
    "jobs",
    "join us",
    "join our team",
    "work with us",
    "we're hiring",
    "we’re hiring",
    "open positions",
];

/// Tried in order when the homepage has no usable careers link.
const CAREERS_PATHS: &[&str] = &[
    "/careers",
    "/jobs",
    "/company/jobs",
    "/company/careers",
    "/about/careers",
    "/en/careers",
    "/work-with-us",
];

/// Phrases of links that lead from a careers page to the full listing.
const CTA_PHRASES: &[&str] = &[
    "view open roles",
    "view all jobs",
    "view jobs",
    "view openings",
    "view positions",
    "view all positions",
    "see all jobs",
    "see open roles",
    "see openings",
    "explore open roles",
    "explore our open roles",
    "explore jobs",
    "browse jobs",
    "browse openings",
    "open positions",
    "open roles",
    "current openings",
    "job openings",
    "all jobs",
    "see opportunities",
];

const CTA_HREF_HINTS: &[&str] = &[
    "open-positions",
    "openings",
    "all-jobs",
    "job-listing",
    "positions",
];

/// Applicant tracking systems that embed job boards in iframes.
pub const ATS_DOMAINS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "workday.com",
    "myworkdayjobs.com",
    "ashbyhq.com",
    "bamboohr.com",
    "recruitee.com",
    "workable.com",
    "smartrecruiters.com",
    "icims.com",
    "jobvite.com",
];

const MAX_NAV_TEXT_CHARS: usize = 60;

#[derive(Debug, Default)]
struct Harvest {
    jobs: Vec<ClassifiedJob>,
    noise: Vec<NoiseRecord>,
}

/// Accumulates harvests across pages, keeping the first occurrence of a URL.
#[derive(Default)]
struct Collector {
    seen_jobs: HashSet<String>,
    seen_noise: HashSet<String>,
    jobs: Vec<ClassifiedJob>,
    noise: Vec<NoiseRecord>,
}

impl Collector {
    /// Returns the number of jobs not seen before.
    fn absorb(&mut self, harvest: Harvest) -> usize {
        let mut added = 0;
        for job in harvest.jobs {
            if self.seen_jobs.insert(job.link.url.clone()) {
                self.jobs.push(job);
                added += 1;
            }
        }
        for record in harvest.noise {
            if self.seen_noise.insert(record.url.clone()) {
                self.noise.push(record);
            }
        }
        added
    }
}

/// Crawls one company's careers pages.
pub struct JobCrawler {
    config: CrawlerConfig,
    nav: NavigateOptions,
}

impl JobCrawler {
    pub fn new(config: CrawlerConfig) -> Self {
        let nav = NavigateOptions::with_timeout(Duration::from_secs(config.timeout_secs));
        Self { config, nav }
    }

    /// Crawl `company_url` for job postings in a fresh page.
    ///
    /// Fails when the homepage is unreachable or no careers page can be
    /// found; every later navigation failure is absorbed.
    pub async fn scrape_jobs(&self, browser: &dyn Browser, company_url: &str) -> Result<CrawlReport> {
        let mut page = browser.new_page().await?;
        let result = self.crawl(page.as_mut(), company_url).await;
        if let Err(e) = page.close().await {
            log::debug!("Closing page for {} failed: {}", company_url, e);
        }
        result
    }

    async fn crawl(&self, page: &mut dyn Page, company_url: &str) -> Result<CrawlReport> {
        let home = normalize_company_url(company_url)?;

        let response = page.navigate(home.as_str(), &self.nav).await?;
        if !response.is_success() {
            return Err(AppError::navigation(
                home.as_str(),
                format!("homepage returned {}", response.status),
            ));
        }

        let careers_url = self.resolve_careers_page(page, &home).await?;
        log::info!("Careers page for {}: {}", home, careers_url);

        let mut collector = Collector::default();
        let mut listing_url = None;

        for cta in self.find_ctas(page).await? {
            match self.follow_cta(page, &home, &careers_url, &cta).await {
                Ok(harvest) if !harvest.jobs.is_empty() => {
                    log::debug!(
                        "CTA '{}' on {} yielded {} jobs",
                        cta.text,
                        careers_url,
                        harvest.jobs.len()
                    );
                    collector.absorb(harvest);
                    listing_url = Some(page.url().to_string());
                    break;
                }
                Ok(_) => log::debug!("CTA '{}' yielded no jobs", cta.text),
                Err(e) => log::debug!("CTA '{}' on {} failed: {}", cta.text, careers_url, e),
            }
        }

        if listing_url.is_none() {
            if let Err(e) = self.ensure_on(page, &careers_url).await {
                log::debug!("Return to {} failed, scanning {}: {}", careers_url, page.url(), e);
            }
            let mut harvest = self.scan(page).await?;
            if harvest.jobs.is_empty() && self.config.score_fallback {
                let generic = self.scan_by_score(page).await?;
                if !generic.jobs.is_empty() {
                    log::debug!(
                        "Score fallback found {} links on {}",
                        generic.jobs.len(),
                        careers_url
                    );
                }
                harvest.jobs = generic.jobs;
                harvest.noise.extend(generic.noise);
            }
            collector.absorb(harvest);
            listing_url = Some(page.url().to_string());
        }

        let listing_url = listing_url.unwrap_or_else(|| careers_url.clone());
        let mut pages_scanned = 1;
        let mut pattern = None;

        if !collector.jobs.is_empty() {
            pattern = match pagination::discover_pattern(page, &listing_url, &self.nav).await {
                Ok(found) => found,
                Err(e) => {
                    log::debug!("Pagination discovery on {} failed: {}", listing_url, e);
                    None
                }
            };
            if let Some(p) = &pattern {
                pages_scanned += self.walk_pages(page, p, &mut collector).await;
            }
        }

        Ok(CrawlReport {
            careers_url,
            jobs: collector.jobs,
            noise: collector.noise,
            pages_scanned,
            pattern,
        })
    }

    async fn resolve_careers_page(&self, page: &mut dyn Page, home: &Url) -> Result<String> {
        let mut tried: HashSet<String> = HashSet::new();
        tried.insert(without_fragment(home.as_str()));

        for link in careers_links(page.locate("a[href]").await?) {
            let Some(target) = link.href().and_then(|h| resolve_href(home, h)) else {
                continue;
            };
            if !tried.insert(without_fragment(&target)) {
                continue;
            }
            match page.navigate(&target, &self.nav).await {
                Ok(response) if response.is_success() => return Ok(page.url().to_string()),
                Ok(response) => log::debug!("Careers link {} returned {}", target, response.status),
                Err(e) => log::debug!("Careers link {} failed: {}", target, e),
            }
        }

        let root = home.as_str().trim_end_matches('/').to_string();
        for path in CAREERS_PATHS {
            let target = format!("{root}{path}");
            if !tried.insert(without_fragment(&target)) {
                continue;
            }
            match page.navigate(&target, &self.nav).await {
                Ok(response) if response.is_success() => return Ok(page.url().to_string()),
                Ok(_) | Err(_) => continue,
            }
        }

        Err(AppError::CareersPageNotFound(home.to_string()))
    }

    async fn find_ctas(&self, page: &dyn Page) -> Result<Vec<Element>> {
        let elements = page.locate("a, button").await?;
        Ok(elements
            .into_iter()
            .filter(|el| !el.in_page_chrome() && is_cta(el))
            .collect())
    }

    async fn follow_cta(
        &self,
        page: &mut dyn Page,
        home: &Url,
        careers_url: &str,
        cta: &Element,
    ) -> Result<Harvest> {
        self.ensure_on(page, careers_url).await?;
        let careers = Url::parse(careers_url)?;

        let Some(target) = cta.navigation_target(&careers) else {
            let response = page.click(cta).await?;
            if !response.is_success() {
                return Err(AppError::navigation(careers_url, "CTA click failed"));
            }
            return self.scan(page).await;
        };

        if without_fragment(&target) == without_fragment(careers_url) {
            return self.scan(page).await;
        }

        let first = page.navigate(&target, &self.nav).await;
        let landed = match first {
            Ok(response) if response.is_success() => true,
            outcome => {
                if let Err(e) = &outcome {
                    log::debug!("CTA target {} failed: {}", target, e);
                }
                let mut recovered = false;
                if !same_host(&target, home.as_str()) {
                    if let Some(rebased) = rebase_to_host(home, &target) {
                        recovered = matches!(
                            page.navigate(&rebased, &self.nav).await,
                            Ok(r) if r.is_success()
                        );
                    }
                }
                recovered
            }
        };

        if !landed {
            return Err(AppError::navigation(target, "CTA target unreachable"));
        }
        self.scan(page).await
    }

    async fn ensure_on(&self, page: &mut dyn Page, url: &str) -> Result<()> {
        if without_fragment(page.url()) != without_fragment(url) {
            page.navigate(url, &self.nav).await?;
        }
        Ok(())
    }

    /// Anchors of the current page, or of its ATS iframes when present.
    async fn anchors(&self, page: &dyn Page) -> Result<(Vec<Element>, Url)> {
        let base = Url::parse(page.url())?;

        for frame in page.locate("iframe[src]").await? {
            let Some(src) = frame.attr("src").and_then(|s| resolve_href(&base, s)) else {
                continue;
            };
            if !is_ats_url(&src) {
                continue;
            }
            match page.locate_in_frame(&src, "a[href]").await {
                Ok(anchors) if !anchors.is_empty() => {
                    log::debug!("Scanning ATS frame {}", src);
                    return Ok((anchors, Url::parse(&src)?));
                }
                Ok(_) => {}
                Err(e) => log::debug!("ATS frame {} unreadable: {}", src, e),
            }
        }

        let anchors = page
            .locate("a[href]")
            .await?
            .into_iter()
            .filter(|a| !a.in_page_chrome())
            .collect();
        Ok((anchors, base))
    }

    async fn scan(&self, page: &dyn Page) -> Result<Harvest> {
        let (anchors, base) = self.anchors(page).await?;
        let mut harvest = Harvest::default();

        for anchor in anchors {
            let Some(url) = anchor.href().and_then(|h| resolve_href(&base, h)) else {
                continue;
            };
            let text = anchor_text(&anchor);

            if !classifier::has_job_keyword(&text)
                || classifier::is_listing_control_url(&url)
                || text.graphemes(true).count() > self.config.max_link_text_chars
            {
                continue;
            }

            match classifier::classify_link(JobLink::new(url, text)) {
                Ok(job) => harvest.jobs.push(job),
                Err(link) => harvest.noise.push(link.into()),
            }
        }
        Ok(harvest)
    }

    /// Relevance-scored harvest used when the strict scan finds nothing.
    async fn scan_by_score(&self, page: &dyn Page) -> Result<Harvest> {
        let (anchors, base) = self.anchors(page).await?;
        let mut harvest = Harvest::default();

        for anchor in anchors {
            let Some(url) = anchor.href().and_then(|h| resolve_href(&base, h)) else {
                continue;
            };
            let text = anchor_text(&anchor);
            if !classifier::passes_url_filters(&url) || !classifier::passes_job_score(&url, &text) {
                continue;
            }
            match classifier::classify_link(JobLink::new(url, text)) {
                Ok(job) => harvest.jobs.push(job),
                Err(link) => harvest.noise.push(link.into()),
            }
        }
        Ok(harvest)
    }

    /// Walk pages 2, 3, ... while each page still links further, up to
    /// `max_pages`; returns how many pages were scanned.
    async fn walk_pages(
        &self,
        page: &mut dyn Page,
        pattern: &PaginationPattern,
        collector: &mut Collector,
    ) -> u32 {
        if pattern.kind == PaginationKind::Fragment {
            return 0;
        }
        let mut scanned = 0;
        for number in 2..=self.config.max_pages {
            let url = match pagination::generate_url(pattern, number) {
                Ok(url) => url,
                Err(e) => {
                    log::debug!("Cannot build page {}: {}", number, e);
                    break;
                }
            };
            if self.config.request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            }

            match page.navigate(&url, &self.nav).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    log::debug!("Page {} returned {}", url, response.status);
                    break;
                }
                Err(e) => {
                    log::debug!("Page {} failed: {}", url, e);
                    break;
                }
            }

            let harvest = match self.scan(page).await {
                Ok(h) => h,
                Err(e) => {
                    log::debug!("Scan of {} failed: {}", url, e);
                    break;
                }
            };
            scanned += 1;

            let found = harvest.jobs.len();
            let added = collector.absorb(harvest);
            log::debug!("Page {}: {} jobs, {} new", number, found, added);
            if found == 0 || added == 0 {
                break;
            }

            match pagination::has_more_pages(&*page, number).await {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("Page {} is the last listing page", number);
                    break;
                }
                Err(e) => {
                    log::debug!("Pager on {} unreadable: {}", url, e);
                    break;
                }
            }
        }
        scanned
    }
}

fn normalize_company_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("empty company URL"));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("https://{raw}"))?)
    }
}

/// Own text, or the surrounding row text for icon-sized anchors.
fn anchor_text(anchor: &Element) -> String {
    if anchor.text.trim().chars().count() < classifier::MIN_TEXT_CHARS {
        anchor.context_text.clone()
    } else {
        anchor.text.clone()
    }
}

/// Careers-looking links, footer links first.
fn careers_links(anchors: Vec<Element>) -> Vec<Element> {
    let (mut footer, rest): (Vec<_>, Vec<_>) = anchors
        .into_iter()
        .filter(|a| {
            let text = a.label().unwrap_or(&a.text).to_lowercase();
            let text = text.trim();
            text.chars().count() <= MAX_NAV_TEXT_CHARS
                && CAREERS_TEXTS.iter().any(|k| text.contains(k))
        })
        .partition(Element::in_footer);
    footer.extend(rest);
    footer
}

fn is_cta(element: &Element) -> bool {
    let text = element.text.to_lowercase();
    if text.chars().count() > MAX_NAV_TEXT_CHARS {
        return false;
    }
    if CTA_PHRASES.iter().any(|p| text.contains(p)) {
        return true;
    }
    element.href().is_some_and(|href| {
        let href = href.to_lowercase();
        CTA_HREF_HINTS.iter().any(|h| href.contains(h))
    })
}

fn is_ats_url(url: &str) -> bool {
    crate::utils::get_domain(url).is_some_and(|host| {
        ATS_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeBrowser;
    use crate::models::Classification;

    const HOME: &str = "https://acme.io/";
    const CAREERS: &str = "https://acme.io/careers";
    const OPENINGS: &str = "https://acme.io/careers/openings";

    fn crawler() -> JobCrawler {
        JobCrawler::new(CrawlerConfig {
            request_delay_ms: 0,
            ..CrawlerConfig::default()
        })
    }

    fn home_html() -> &'static str {
        r#"<html><body>
            <header><nav><a href="/pricing">Pricing</a></nav></header>
            <main><h1>Acme</h1></main>
            <footer><a href="/careers">Careers</a></footer>
        </body></html>"#
    }

    /// Five jobs plus a sliding pager around `active` out of `total` pages.
    fn listing(page: u32, active: u32, total: u32) -> String {
        let jobs: String = (1..=5)
            .map(|i| {
                let id = page * 100 + i;
                format!(r#"<li><a href="/jobs/{id}">Senior Backend Engineer {id}</a></li>"#)
            })
            .collect();
        let pager: String = (active.saturating_sub(1).max(1)..=(active + 2).min(total))
            .map(|n| {
                let class = if n == active { r#" class="active""# } else { "" };
                format!(r#"<li{class}><a href="/careers/openings?page={n}">{n}</a></li>"#)
            })
            .collect();
        let next = if active < total {
            format!(
                r#"<li><a href="/careers/openings?page={}" rel="next">Next</a></li>"#,
                active + 1
            )
        } else {
            String::new()
        };
        format!(
            r#"<html><body><main><ul class="jobs">{jobs}</ul>
               <ul class="pagination">{pager}{next}</ul></main></body></html>"#
        )
    }

    fn paged_site(total: u32) -> FakeBrowser {
        let careers = r#"<main><a href="/careers/openings">View open roles</a></main>"#;
        (2..=total).fold(
            FakeBrowser::new()
                .page(HOME, home_html())
                .page(CAREERS, careers)
                .page(OPENINGS, &listing(1, 1, total)),
            |browser, n| {
                browser.page(
                    &format!("https://acme.io/careers/openings?page={n}"),
                    &listing(n, n, total),
                )
            },
        )
    }

    #[tokio::test]
    async fn test_three_pages_of_five_jobs() {
        let careers = r#"<main>
            <p>Build the future with us.</p>
            <a href="/careers/openings">View open roles</a>
        </main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .page(OPENINGS, &listing(1, 1, 3))
            .page("https://acme.io/careers/openings?page=2", &listing(2, 2, 3))
            .page("https://acme.io/careers/openings?page=3", &listing(3, 3, 3));

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.careers_url, CAREERS);
        assert_eq!(report.jobs.len(), 15);
        assert_eq!(report.pages_scanned, 3);
        assert!(!browser.visited("https://acme.io/careers/openings?page=4"));
        assert!(report
            .jobs
            .iter()
            .all(|j| j.classification == Classification::Engineering));

        let unique: HashSet<_> = report.jobs.iter().map(|j| &j.link.url).collect();
        assert_eq!(unique.len(), report.jobs.len());
    }

    #[tokio::test]
    async fn test_stops_when_page_repeats() {
        let careers = r#"<main><a href="/careers/openings">See all jobs</a></main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .page(OPENINGS, &listing(1, 1, 3))
            .page("https://acme.io/careers/openings?page=2", &listing(1, 2, 3))
            .page("https://acme.io/careers/openings?page=3", &listing(3, 3, 3));

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 5);
        assert_eq!(report.pages_scanned, 2);
        assert!(!browser.visited("https://acme.io/careers/openings?page=3"));
    }

    #[tokio::test]
    async fn test_walks_past_sliding_pager_window() {
        let browser = paged_site(6);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 30);
        assert_eq!(report.pages_scanned, 6);
        assert_eq!(report.pattern.as_ref().and_then(|p| p.max_page), Some(3));
        assert!(browser.visited("https://acme.io/careers/openings?page=6"));
        assert!(!browser.visited("https://acme.io/careers/openings?page=7"));
    }

    #[tokio::test]
    async fn test_walk_capped_by_max_pages() {
        let browser = paged_site(6);
        let capped = JobCrawler::new(CrawlerConfig {
            max_pages: 4,
            request_delay_ms: 0,
            ..CrawlerConfig::default()
        });

        let report = capped.scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 20);
        assert_eq!(report.pages_scanned, 4);
        assert!(!browser.visited("https://acme.io/careers/openings?page=5"));
    }

    #[tokio::test]
    async fn test_failed_return_to_careers_scans_current_page() {
        let careers = r#"<main><a href="/careers/openings">View open roles</a></main>"#;
        let openings = r#"<main><a href="/careers/48213">Remote - Berlin</a></main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .page(OPENINGS, openings)
            .failing_after(CAREERS, 1);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.careers_url, CAREERS);
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.url, "https://acme.io/careers/48213");
    }

    #[tokio::test]
    async fn test_pagination_failure_keeps_first_page() {
        let browser = paged_site(3).broken_selector("pagination");

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 5);
        assert_eq!(report.pages_scanned, 1);
        assert!(report.pattern.is_none());
        assert!(!browser.visited("https://acme.io/careers/openings?page=2"));
    }

    #[tokio::test]
    async fn test_fragment_cta_scans_in_place() {
        let careers = r##"<main>
            <a href="#positions">See open roles</a>
            <section id="positions"><ul>
              <li><a href="/jobs/1">Platform Engineer</a></li>
              <li><a href="/jobs/2">Sales Account Manager</a></li>
              <li><a href="/blog/engineering-culture">Engineering blog</a></li>
            </ul></section>
        </main>"##;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 2);
        assert_eq!(report.jobs[0].classification, Classification::Engineering);
        assert_eq!(report.jobs[1].classification, Classification::Other);
        assert_eq!(report.noise.len(), 1);
        assert_eq!(report.noise[0].url, "https://acme.io/blog/engineering-culture");
        assert_eq!(browser.visits(), vec![HOME, CAREERS]);
    }

    #[tokio::test]
    async fn test_prefers_ats_iframe() {
        let careers = r#"<main>
            <a href="/jobs/marketing-lead">Marketing Lead (old)</a>
            <iframe src="https://boards.greenhouse.io/embed/job_board?for=acme"></iframe>
        </main>"#;
        let board = r#"<div class="opening"><a href="https://boards.greenhouse.io/acme/jobs/1">Staff Rust Developer</a></div>
            <div class="opening"><a href="https://boards.greenhouse.io/acme/jobs/2">Recruiter</a></div>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .page("https://boards.greenhouse.io/embed/job_board?for=acme", board);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        let urls: Vec<_> = report.jobs.iter().map(|j| j.link.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://boards.greenhouse.io/acme/jobs/1",
                "https://boards.greenhouse.io/acme/jobs/2"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_anchor_uses_row_text() {
        let careers = r#"<main><table>
            <tr><td>Senior Data Engineer</td><td>Remote</td><td><a href="/jobs/9">→</a></td></tr>
        </table></main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.text, "Senior Data Engineer Remote →");
    }

    #[tokio::test]
    async fn test_rejects_filters_and_long_text() {
        let long = "Engineer ".repeat(40);
        let careers = format!(
            r#"<main>
                <a href="/careers?department=engineering">Engineering roles</a>
                <a href="/jobs/1">{long}</a>
                <a href="/jobs/2">Frontend Developer</a>
            </main>"#
        );
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, &careers);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.url, "https://acme.io/jobs/2");
    }

    #[tokio::test]
    async fn test_failed_cta_falls_back_to_direct_scan() {
        let careers = r#"<main>
            <a href="https://cdn.acme-assets.com/careers/all-jobs">View all jobs</a>
            <a href="/jobs/3">Site Reliability Engineer</a>
        </main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .failing("https://cdn.acme-assets.com/careers/all-jobs");

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert!(browser.visited("https://acme.io/careers/all-jobs"));
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.url, "https://acme.io/jobs/3");
    }

    #[tokio::test]
    async fn test_cta_rebased_to_company_host() {
        let careers = r#"<main>
            <a href="https://cdn.acme-assets.com/careers/all-jobs">View all jobs</a>
        </main>"#;
        let all_jobs = r#"<main><a href="/jobs/4">Android Developer</a></main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers)
            .page("https://acme.io/careers/all-jobs", all_jobs)
            .failing("https://cdn.acme-assets.com/careers/all-jobs");

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.url, "https://acme.io/jobs/4");
    }

    #[tokio::test]
    async fn test_tries_paths_without_careers_link() {
        let home = r#"<main><a href="/product">Product</a></main>"#;
        let jobs = r#"<main><a href="/jobs/5">QA Engineer</a></main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home)
            .page("https://acme.io/jobs", jobs);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();

        assert_eq!(report.careers_url, "https://acme.io/jobs");
        assert_eq!(
            browser.visits(),
            vec![HOME, "https://acme.io/careers", "https://acme.io/jobs"]
        );
        assert_eq!(report.jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_careers_page_is_fatal() {
        let browser = FakeBrowser::new().page(HOME, "<main>Nothing here</main>");

        let err = crawler().scrape_jobs(&browser, HOME).await.unwrap_err();

        assert!(matches!(err, AppError::CareersPageNotFound(_)));
        assert_eq!(browser.visits().len(), 1 + CAREERS_PATHS.len());
    }

    #[tokio::test]
    async fn test_unreachable_homepage_is_fatal() {
        let browser = FakeBrowser::new().failing(HOME);
        let err = crawler().scrape_jobs(&browser, HOME).await.unwrap_err();
        assert!(matches!(err, AppError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_score_fallback_when_no_keywords() {
        let careers = r#"<main>
            <a href="/careers/48213">Remote - Berlin</a>
            <a href="/about">Our story</a>
        </main>"#;
        let browser = FakeBrowser::new()
            .page(HOME, home_html())
            .page(CAREERS, careers);

        let report = crawler().scrape_jobs(&browser, HOME).await.unwrap();
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].link.url, "https://acme.io/careers/48213");

        let strict = JobCrawler::new(CrawlerConfig {
            score_fallback: false,
            request_delay_ms: 0,
            ..CrawlerConfig::default()
        });
        let report = strict.scrape_jobs(&browser, HOME).await.unwrap();
        assert!(report.jobs.is_empty());
    }

    #[test]
    fn test_careers_links_prefer_footer() {
        let html = r#"<main><a href="/jobs">Jobs</a></main><footer><a href="/careers">Careers</a></footer>"#;
        let anchors = crate::browser::dom::select(html, "a").unwrap();
        let ordered = careers_links(anchors);
        assert_eq!(ordered[0].href(), Some("/careers"));
        assert_eq!(ordered[1].href(), Some("/jobs"));
    }

    #[test]
    fn test_is_ats_url() {
        assert!(is_ats_url("https://jobs.lever.co/acme"));
        assert!(is_ats_url("https://acme.wd5.myworkdayjobs.com/en-US/careers"));
        assert!(!is_ats_url("https://acme.io/careers"));
    }
}
