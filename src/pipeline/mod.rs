//! The discovery pipeline.
//!
//! ```text
//! harvest ─┬─ names ──▶ search ──┐
//!          └──────────────────────┴─▶ candidates ──▶ router ─┬─▶ job crawls ──▶ store
//!                                                             └─▶ testimonials ──▶ images ──▶ OCR ──▶ store
//!   OCR ── feedback names (leased, try_send) ──▶ names
//! ```
//!
//! Queues close once their last producer registration is dropped, so the
//! run ends by itself when the seed sources are exhausted and no in-flight
//! item can still feed a name back.

pub mod feedback;
pub mod queue;
pub mod sink;
mod stages;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::browser::Browser;
use crate::error::Result;
use crate::models::Config;
use crate::services::{CompanySearch, JobCrawler, TextExtractor};
use crate::storage::CompanyStore;
use crate::utils::log as run_log;

pub use feedback::FeedbackPolicy;
pub use sink::{ErrorSink, WorkerError};

use stages::StageContext;

/// External collaborators shared by every worker.
#[derive(Clone)]
pub struct PipelineDeps {
    pub browser: Arc<dyn Browser>,
    pub search: Arc<dyn CompanySearch>,
    pub vision: Arc<dyn TextExtractor>,
    pub store: Arc<dyn CompanyStore>,
}

/// Live counters updated by the workers.
#[derive(Debug, Default)]
pub struct Counters {
    pub candidates: AtomicUsize,
    pub crawled: AtomicUsize,
    pub crawl_failures: AtomicUsize,
    pub jobs: AtomicUsize,
    pub noise: AtomicUsize,
    pub logo_batches: AtomicUsize,
    pub images: AtomicUsize,
    pub testimonials: AtomicUsize,
    pub feedback_names: AtomicUsize,
    pub search_misses: AtomicUsize,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub candidates: usize,
    pub crawled: usize,
    pub crawl_failures: usize,
    pub jobs: usize,
    pub noise: usize,
    pub logo_batches: usize,
    pub images: usize,
    pub testimonials: usize,
    pub feedback_names: usize,
    pub search_misses: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub elapsed_ms: i64,
}

impl Counters {
    fn summary(&self) -> RunSummary {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        RunSummary {
            candidates: get(&self.candidates),
            crawled: get(&self.crawled),
            crawl_failures: get(&self.crawl_failures),
            jobs: get(&self.jobs),
            noise: get(&self.noise),
            logo_batches: get(&self.logo_batches),
            images: get(&self.images),
            testimonials: get(&self.testimonials),
            feedback_names: get(&self.feedback_names),
            search_misses: get(&self.search_misses),
            ..RunSummary::default()
        }
    }
}

/// Run the full pipeline until the sources are exhausted or `cancel` fires.
///
/// Only an invalid configuration is an error; worker failures are reported
/// through the error sink and counted in the summary.
pub async fn run(config: Arc<Config>, deps: PipelineDeps, cancel: CancellationToken) -> Result<RunSummary> {
    config.validate()?;
    let start_time = Utc::now();
    run_log::header("jobscout pipeline starting");
    run_log::sub_item(&format!("{} seed source(s)", config.sources.len()));

    let p = &config.pipeline;
    let grace = Duration::from_secs(p.shutdown_grace_secs);
    let (sink, drain) = ErrorSink::new(p.error_buffer);
    let counters = Arc::new(Counters::default());

    let ctx = StageContext {
        config: Arc::clone(&config),
        deps,
        cancel: cancel.clone(),
        sink: sink.clone(),
        counters: Arc::clone(&counters),
        feedback: FeedbackPolicy::new(&config.feedback),
        crawler: Arc::new(JobCrawler::new(config.crawler.clone())),
    };

    let (names_tx, names_rx) = queue::channel("names", p.names_queue_capacity);
    let (candidates_tx, candidates_rx) = queue::channel("candidates", p.candidate_queue_capacity);
    let (testimonials_tx, testimonials_rx) =
        queue::channel("testimonials", p.testimonial_queue_capacity);
    let (images_tx, images_rx) = queue::channel("images", p.image_queue_capacity);

    let handles = vec![
        tokio::spawn(stages::harvest_stage(ctx.clone(), names_tx, candidates_tx.clone())),
        tokio::spawn(stages::search_stage(ctx.clone(), names_rx, candidates_tx)),
        tokio::spawn(stages::route_stage(ctx.clone(), candidates_rx, testimonials_tx)),
        tokio::spawn(stages::testimonial_stage(ctx.clone(), testimonials_rx, images_tx)),
        tokio::spawn(stages::ocr_stage(ctx, images_rx)),
    ];
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let grace_expired = async {
        cancel.cancelled().await;
        log::warn!("Shutdown requested, waiting up to {:?} for workers", grace);
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        joined = futures::future::join_all(handles) => {
            for result in joined {
                if let Err(e) = result {
                    if e.is_panic() {
                        sink.send(WorkerError::new("pipeline", "stage panicked").with_cause(e));
                    }
                }
            }
        }
        _ = grace_expired => {
            log::warn!("Grace period elapsed, aborting remaining stages");
            for abort in &aborts {
                abort.abort();
            }
        }
    }

    let errors = drain.close(sink, grace).await;
    let elapsed = Utc::now() - start_time;

    let mut summary = counters.summary();
    summary.errors = errors;
    summary.cancelled = cancel.is_cancelled();
    summary.elapsed_ms = elapsed.num_milliseconds();

    run_log::summary(
        "Pipeline run",
        &[
            ("Companies", summary.candidates.to_string()),
            ("Crawled", format!("{} ({} failed)", summary.crawled, summary.crawl_failures)),
            ("Jobs stored", summary.jobs.to_string()),
            ("Noise stored", summary.noise.to_string()),
            ("Logo images", summary.images.to_string()),
            ("Testimonials", summary.testimonials.to_string()),
            ("Feedback names", summary.feedback_names.to_string()),
            ("Errors", summary.errors.to_string()),
            ("Elapsed", run_log::format_elapsed(elapsed)),
        ],
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::browser::fake::FakeBrowser;
    use crate::models::{CrawlerConfig, OcrResult, PipelineConfig, SeedSource, SourceKind};
    use crate::storage::MemoryStore;

    struct FakeSearch(HashMap<String, String>);

    #[async_trait]
    impl CompanySearch for FakeSearch {
        async fn search(&self, name: &str) -> Result<Option<String>> {
            Ok(self.0.get(name).cloned())
        }
    }

    struct FakeVision(HashMap<String, String>);

    #[async_trait]
    impl TextExtractor for FakeVision {
        async fn extract_text(&self, image_urls: &[String]) -> Result<Vec<OcrResult>> {
            Ok(image_urls
                .iter()
                .map(|url| match self.0.get(url) {
                    Some(text) => OcrResult::ok(url, text),
                    None => OcrResult::failed(url, "unreadable"),
                })
                .collect())
        }
    }

    fn config(sources: Vec<SeedSource>) -> Config {
        Config {
            crawler: CrawlerConfig {
                request_delay_ms: 0,
                timeout_secs: 5,
                ..CrawlerConfig::default()
            },
            pipeline: PipelineConfig {
                company_pacing_ms: 0,
                search_pacing_ms: 0,
                shutdown_grace_secs: 2,
                ..PipelineConfig::default()
            },
            sources,
            ..Config::default()
        }
    }

    fn directory_source() -> SeedSource {
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

    fn board_source() -> SeedSource {
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

    fn company_site(browser: FakeBrowser, host: &str, with_logos: bool) -> FakeBrowser {
        let logos = if with_logos {
            format!(
                r#"<section><h2>Trusted by</h2>
                   <div><img src="https://{host}/logos/globex.png" width="120" height="40"></div>
                 </section>"#
            )
        } else {
            String::new()
        };
        let home = format!(
            r#"<html><head><title>Home</title></head><body><main><h1>Welcome</h1>{logos}</main>
               <footer><a href="/careers">Careers</a></footer></body></html>"#
        );
        let careers = r#"<main><ul>
            <li><a href="/jobs/1">Senior Backend Engineer</a></li>
            <li><a href="/jobs/2">Account Executive</a></li>
        </ul></main>"#;
        browser
            .page(&format!("https://{host}/"), &home)
            .page(&format!("https://{host}/careers"), careers)
    }

    #[tokio::test]
    async fn test_full_run_with_feedback() {
        let listing = r#"<body><a href="/companies/acme"><span>Acme</span></a></body>"#;
        let profile = r#"<body><div class="group"><a href="https://acme.io">acme.io</a></div></body>"#;
        let board = r#"<body><div class="card"><p>Designer at Initech</p></div></body>"#;

        let browser = FakeBrowser::new()
            .page("https://dir.example/companies", listing)
            .page("https://dir.example/companies/acme", profile)
            .page("https://board.example/jobs", board);
        let browser = company_site(browser, "acme.io", true);
        let browser = company_site(browser, "globex.io", true);
        let browser = company_site(browser, "initech.io", false);

        let search = FakeSearch(HashMap::from([
            ("Initech".to_string(), "https://initech.io".to_string()),
            ("Globex".to_string(), "https://globex.io".to_string()),
        ]));
        let vision = FakeVision(HashMap::from([
            (
                "https://acme.io/logos/globex.png".to_string(),
                "Globex\nThe world's most trusted enterprise platform".to_string(),
            ),
            ("https://globex.io/logos/globex.png".to_string(), "Umbrella".to_string()),
        ]));
        let store = Arc::new(MemoryStore::new());
        let deps = PipelineDeps {
            browser: Arc::new(browser),
            search: Arc::new(search),
            vision: Arc::new(vision),
            store: store.clone(),
        };

        let summary = tokio::time::timeout(
            Duration::from_secs(30),
            run(
                Arc::new(config(vec![directory_source(), board_source()])),
                deps,
                CancellationToken::new(),
            ),
        )
        .await
        .expect("pipeline terminates")
        .unwrap();

        // Acme (directory), Initech (board) and Globex (generation 1 feedback).
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.crawled, 3);
        assert_eq!(summary.jobs, 6);
        assert_eq!(summary.feedback_names, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.cancelled);

        let mut names = store.company_names().await;
        names.sort();
        assert_eq!(names, vec!["Acme", "Globex", "Initech"]);

        // Globex is generation 1, so its "Umbrella" logo is stored but not searched.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.testimonials, 2);
        assert_eq!(stats.job_scraped, 3);
        assert_eq!(stats.testimonial_scraped, 3);
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_fatal() {
        let listing = r#"<body><a href="/companies/acme"><span>Acme</span></a></body>"#;
        let profile = r#"<body><div class="group"><a href="https://acme.io">acme.io</a></div></body>"#;
        let browser = FakeBrowser::new()
            .page("https://dir.example/companies", listing)
            .page("https://dir.example/companies/acme", profile)
            .failing("https://acme.io/");

        let deps = PipelineDeps {
            browser: Arc::new(browser),
            search: Arc::new(FakeSearch(HashMap::new())),
            vision: Arc::new(FakeVision(HashMap::new())),
            store: Arc::new(MemoryStore::new()),
        };

        let summary = run(
            Arc::new(config(vec![directory_source()])),
            deps,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.crawl_failures, 1);
        // Job crawl and testimonial scan both fail on the dead homepage.
        assert_eq!(summary.errors, 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_shuts_down_within_grace() {
        let browser = FakeBrowser::new().page(
            "https://board.example/jobs",
            r#"<body><div class="card"><p>Engineer at Initech</p></div></body>"#,
        );
        let deps = PipelineDeps {
            browser: Arc::new(browser),
            search: Arc::new(FakeSearch(HashMap::new())),
            vision: Arc::new(FakeVision(HashMap::new())),
            store: Arc::new(MemoryStore::new()),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            run(Arc::new(config(vec![board_source()])), deps, cancel),
        )
        .await
        .expect("cancelled pipeline stops")
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.candidates, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_crawls_are_blocked() {
        let listing: String = (1..=4)
            .map(|i| format!(r#"<a href="/companies/c{i}"><span>Company {i}</span></a>"#))
            .collect();
        let mut browser = FakeBrowser::new().page("https://dir.example/companies", &listing);
        for i in 1..=4 {
            browser = browser
                .page(
                    &format!("https://dir.example/companies/c{i}"),
                    &format!(r#"<div class="group"><a href="https://c{i}.io">c{i}.io</a></div>"#),
                )
                .slow(&format!("https://c{i}.io/"), Duration::from_secs(60));
        }

        let deps = PipelineDeps {
            browser: Arc::new(browser),
            search: Arc::new(FakeSearch(HashMap::new())),
            vision: Arc::new(FakeVision(HashMap::new())),
            store: Arc::new(MemoryStore::new()),
        };
        let cfg = Arc::new(config(vec![directory_source()]));
        let grace = Duration::from_secs(cfg.pipeline.shutdown_grace_secs);
        let cancel = CancellationToken::new();

        let cancel_mid_run = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
            tokio::time::Instant::now()
        };

        let (summary, cancelled_at) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(run(cfg, deps, cancel.clone()), cancel_mid_run)
        })
        .await
        .expect("pipeline stops after cancellation");
        let summary = summary.unwrap();

        assert!(cancelled_at.elapsed() <= grace + Duration::from_millis(500));
        assert!(summary.cancelled);
        assert!(summary.candidates >= 1);
        assert_eq!(summary.crawled, 0);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_setup_error() {
        let deps = PipelineDeps {
            browser: Arc::new(FakeBrowser::new()),
            search: Arc::new(FakeSearch(HashMap::new())),
            vision: Arc::new(FakeVision(HashMap::new())),
            store: Arc::new(MemoryStore::new()),
        };
        let mut cfg = config(vec![board_source()]);
        cfg.pipeline.search_workers = 0;

        assert!(run(Arc::new(cfg), deps, CancellationToken::new()).await.is_err());
    }
}
