//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Browser and per-company crawl behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Worker pools, queue sizes and pacing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// OCR name feedback into the search stage
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Company search service
    #[serde(default)]
    pub search: SearchConfig,

    /// Vision/OCR service
    #[serde(default)]
    pub vision: VisionConfig,

    /// Relational store
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed listing sites
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SeedSource>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Fill empty secrets from the process environment.
    pub fn apply_env(&mut self) {
        fill_from_env(&mut self.search.api_key, "GOOGLE_API_KEY");
        fill_from_env(&mut self.search.engine_id, "GOOGLE_SEARCH_ENGINE_ID");
        fill_from_env(&mut self.vision.api_key, "ANTHROPIC_API_KEY");
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent_crawls == 0 {
            return Err(AppError::validation(
                "crawler.max_concurrent_crawls must be > 0",
            ));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.max_link_text_chars == 0 {
            return Err(AppError::validation(
                "crawler.max_link_text_chars must be > 0",
            ));
        }

        let p = &self.pipeline;
        for (name, value) in [
            ("pipeline.search_workers", p.search_workers),
            ("pipeline.testimonial_workers", p.testimonial_workers),
            ("pipeline.ocr_workers", p.ocr_workers),
            ("pipeline.names_queue_capacity", p.names_queue_capacity),
            ("pipeline.candidate_queue_capacity", p.candidate_queue_capacity),
            ("pipeline.testimonial_queue_capacity", p.testimonial_queue_capacity),
            ("pipeline.image_queue_capacity", p.image_queue_capacity),
            ("pipeline.error_buffer", p.error_buffer),
        ] {
            if value == 0 {
                return Err(AppError::validation(format!("{name} must be > 0")));
            }
        }

        if self.feedback.max_name_chars == 0 {
            return Err(AppError::validation("feedback.max_name_chars must be > 0"));
        }
        if self.vision.poll_interval_secs == 0 {
            return Err(AppError::validation("vision.poll_interval_secs must be > 0"));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(AppError::validation("storage.database_path is empty"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No seed sources defined"));
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            pipeline: PipelineConfig::default(),
            feedback: FeedbackConfig::default(),
            search: SearchConfig::default(),
            vision: VisionConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            sources: defaults::sources(),
        }
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if !slot.trim().is_empty() {
        return;
    }
    if let Ok(value) = std::env::var(var) {
        *slot = value;
    }
}

/// Browser and per-company crawl settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Page rendering backend
    #[serde(default)]
    pub engine: BrowserEngine,

    /// User-Agent header for page requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Navigation timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between pagination pages in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Hard ceiling on listing pages walked per careers page
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Job crawls allowed in flight at once
    #[serde(default = "defaults::max_concurrent_crawls")]
    pub max_concurrent_crawls: usize,

    /// Anchors with longer text are treated as content, not job links
    #[serde(default = "defaults::max_link_text_chars")]
    pub max_link_text_chars: usize,

    /// Use score-based harvesting when the strict scan finds nothing
    #[serde(default = "defaults::enabled")]
    pub score_fallback: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_pages: defaults::max_pages(),
            max_concurrent_crawls: defaults::max_concurrent_crawls(),
            max_link_text_chars: defaults::max_link_text_chars(),
            score_fallback: defaults::enabled(),
        }
    }
}

/// Worker pool and queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "defaults::workers")]
    pub search_workers: usize,

    #[serde(default = "defaults::workers")]
    pub testimonial_workers: usize,

    #[serde(default = "defaults::workers")]
    pub ocr_workers: usize,

    #[serde(default = "defaults::names_capacity")]
    pub names_queue_capacity: usize,

    #[serde(default = "defaults::candidate_capacity")]
    pub candidate_queue_capacity: usize,

    #[serde(default = "defaults::candidate_capacity")]
    pub testimonial_queue_capacity: usize,

    #[serde(default = "defaults::image_capacity")]
    pub image_queue_capacity: usize,

    /// Buffered slots in the error sink before it falls back to direct logging
    #[serde(default = "defaults::error_buffer")]
    pub error_buffer: usize,

    /// Pause between profile visits on directory sources
    #[serde(default = "defaults::company_pacing")]
    pub company_pacing_ms: u64,

    /// Pause between search requests per worker
    #[serde(default = "defaults::search_pacing")]
    pub search_pacing_ms: u64,

    /// Stop harvesting a source after this many companies (0 = unbounded)
    #[serde(default)]
    pub max_companies: usize,

    /// Time allowed for pools to wind down after cancellation
    #[serde(default = "defaults::shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_workers: defaults::workers(),
            testimonial_workers: defaults::workers(),
            ocr_workers: defaults::workers(),
            names_queue_capacity: defaults::names_capacity(),
            candidate_queue_capacity: defaults::candidate_capacity(),
            testimonial_queue_capacity: defaults::candidate_capacity(),
            image_queue_capacity: defaults::image_capacity(),
            error_buffer: defaults::error_buffer(),
            company_pacing_ms: defaults::company_pacing(),
            search_pacing_ms: defaults::search_pacing(),
            max_companies: 0,
            shutdown_grace_secs: defaults::shutdown_grace(),
        }
    }
}

/// Rules for feeding OCR-extracted names back into discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Longer OCR lines are sentences, not company names
    #[serde(default = "defaults::max_name_chars")]
    pub max_name_chars: usize,

    /// Deepest feedback hop that may still produce names
    #[serde(default = "defaults::max_generation")]
    pub max_generation: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            max_name_chars: defaults::max_name_chars(),
            max_generation: defaults::max_generation(),
        }
    }
}

/// Google Custom Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "defaults::search_endpoint")]
    pub endpoint: String,

    /// Falls back to `GOOGLE_API_KEY`
    #[serde(default)]
    pub api_key: String,

    /// Falls back to `GOOGLE_SEARCH_ENGINE_ID`
    #[serde(default)]
    pub engine_id: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::search_endpoint(),
            api_key: String::new(),
            engine_id: String::new(),
        }
    }
}

/// Anthropic Message Batches settings for logo OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "defaults::vision_endpoint")]
    pub endpoint: String,

    /// Falls back to `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "defaults::vision_model")]
    pub model: String,

    #[serde(default = "defaults::vision_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up on a batch after this long
    #[serde(default = "defaults::batch_timeout")]
    pub batch_timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::vision_endpoint(),
            api_key: String::new(),
            model: defaults::vision_model(),
            max_tokens: defaults::vision_max_tokens(),
            poll_interval_secs: defaults::poll_interval(),
            batch_timeout_secs: defaults::batch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when neither `RUST_LOG` nor `--verbose` is given
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Which browser implementation renders pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngine {
    /// Headless Chromium; runs scripts, clicks and scrolls
    #[default]
    Chrome,
    /// Static HTML over HTTP; no script execution
    Http,
}

/// How a seed listing site exposes companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Company directory with profile pages that link to the website
    Directory,
    /// Job board that only yields company names
    JobBoard,
    /// Names recovered from customer logos
    Ocr,
    /// Resolved through search from a bare name
    Search,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::JobBoard => "job_board",
            Self::Ocr => "ocr",
            Self::Search => "search",
        }
    }
}

/// One seed listing site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSource {
    pub name: String,

    pub kind: SourceKind,

    /// Listing page URL
    pub url: String,

    /// Selector for company listing anchors
    pub selector: String,

    /// Selector for the company name inside each listing (job boards)
    #[serde(default)]
    pub name_selector: Option<String>,

    /// Selector for the website link on a profile page (directories)
    #[serde(default)]
    pub profile_link_selector: Option<String>,

    /// Settle time after loading the listing page
    #[serde(default)]
    pub wait_ms: u64,
}

impl SeedSource {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::validation(format!(
                "source '{}' has empty url",
                self.name
            )));
        }
        url::Url::parse(&self.url).map_err(|e| {
            AppError::validation(format!("source '{}' url invalid: {}", self.name, e))
        })?;
        if self.selector.trim().is_empty() {
            return Err(AppError::validation(format!(
                "source '{}' has empty selector",
                self.name
            )));
        }
        if matches!(self.kind, SourceKind::Ocr | SourceKind::Search) {
            return Err(AppError::validation(format!(
                "source '{}' kind must be directory or job_board",
                self.name
            )));
        }
        Ok(())
    }
}

mod defaults {
    use super::{SeedSource, SourceKind};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; jobscout/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn max_pages() -> u32 {
        10
    }
    pub fn max_concurrent_crawls() -> usize {
        4
    }
    pub fn max_link_text_chars() -> usize {
        120
    }
    pub fn enabled() -> bool {
        true
    }

    // Pipeline defaults
    pub fn workers() -> usize {
        2
    }
    pub fn names_capacity() -> usize {
        200
    }
    pub fn candidate_capacity() -> usize {
        500
    }
    pub fn image_capacity() -> usize {
        250
    }
    pub fn error_buffer() -> usize {
        100
    }
    pub fn company_pacing() -> u64 {
        500
    }
    pub fn search_pacing() -> u64 {
        500
    }
    pub fn shutdown_grace() -> u64 {
        10
    }

    // Feedback defaults
    pub fn max_name_chars() -> usize {
        25
    }
    pub fn max_generation() -> u32 {
        1
    }

    // Service defaults
    pub fn search_endpoint() -> String {
        "https://www.googleapis.com/customsearch/v1".into()
    }
    pub fn vision_endpoint() -> String {
        "https://api.anthropic.com/v1/messages/batches".into()
    }
    pub fn vision_model() -> String {
        "claude-sonnet-4-5-20250929".into()
    }
    pub fn vision_max_tokens() -> u32 {
        1024
    }
    pub fn poll_interval() -> u64 {
        10
    }
    pub fn batch_timeout() -> u64 {
        1800
    }
    pub fn database_path() -> String {
        "jobscout.db".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn sources() -> Vec<SeedSource> {
        vec![
            SeedSource {
                name: "YC".into(),
                kind: SourceKind::Directory,
                url: "https://www.ycombinator.com/companies".into(),
                selector: r#"a[href^="/companies/"]"#.into(),
                name_selector: Some("span".into()),
                profile_link_selector: Some("div.group a".into()),
                wait_ms: 10_000,
            },
            SeedSource {
                name: "Peerlist".into(),
                kind: SourceKind::JobBoard,
                url: "https://peerlist.io/jobs".into(),
                selector: r#"a[href^="/company/"][href*="/careers/"]"#.into(),
                name_selector: Some("p".into()),
                profile_link_selector: None,
                wait_ms: 3_000,
            },
        ]
    }
}
