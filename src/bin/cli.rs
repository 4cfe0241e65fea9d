//! jobscout CLI
//!
//! Local execution entry point for the discovery pipeline and its single
//! company tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jobscout::{
    browser::{self, NavigateOptions},
    error::{AppError, Result},
    models::Config,
    pipeline::{self, PipelineDeps},
    services::{AnthropicVision, GoogleSearch, JobCrawler, pagination},
    storage::{CompanyStore, MemoryStore, SqliteStore},
    utils::http,
};
use tokio_util::sync::CancellationToken;

/// jobscout - company and job discovery crawler
#[derive(Parser, Debug)]
#[command(
    name = "jobscout",
    version,
    about = "Discovers companies, their job postings and their customers"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "jobscout.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full discovery pipeline
    Run {
        /// Keep results in memory instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Crawl one company for job postings and print the report
    ScrapeJobs {
        /// Company homepage
        url: String,
    },

    /// Detect the pagination pattern of a listing page
    Paginate {
        /// Listing page URL
        url: String,

        /// Number of page URLs to generate
        #[arg(long, default_value_t = 5)]
        pages: u32,
    },

    /// Validate the configuration file
    Validate,

    /// Show database statistics
    Info,
}

/// Initialize logging. `RUST_LOG` overrides the given level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn api_client(config: &Config) -> Result<reqwest::Client> {
    http::create_api_client(config.crawler.timeout_secs.max(60))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    init_logging(&level);

    let mut config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };
    config.apply_env();

    match cli.command {
        Command::Run { dry_run } => {
            let store: Arc<dyn CompanyStore> = if dry_run {
                log::info!("Dry run: results stay in memory");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(SqliteStore::open(&config.storage.database_path)?)
            };
            let deps = PipelineDeps {
                browser: browser::launch(&config.crawler).await?,
                search: Arc::new(GoogleSearch::new(api_client(&config)?, config.search.clone())?),
                vision: Arc::new(AnthropicVision::new(api_client(&config)?, config.vision.clone())?),
                store,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Ctrl-C received, shutting down");
                    on_signal.cancel();
                }
            });

            let summary = pipeline::run(Arc::new(config), deps, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::ScrapeJobs { url } => {
            let browser = browser::launch(&config.crawler).await?;
            let report = JobCrawler::new(config.crawler.clone())
                .scrape_jobs(browser.as_ref(), &url)
                .await?;
            log::info!(
                "{} jobs ({} engineering), {} noise links",
                report.jobs.len(),
                report.engineering_count(),
                report.noise.len()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Paginate { url, pages } => {
            let browser = browser::launch(&config.crawler).await?;
            let nav = NavigateOptions::with_timeout(Duration::from_secs(config.crawler.timeout_secs));
            let mut page = browser.new_page().await?;

            let response = page.navigate(&url, &nav).await?;
            if !response.is_success() {
                return Err(AppError::navigation(
                    &url,
                    format!("listing returned {}", response.status),
                ));
            }

            match pagination::discover_pattern(page.as_mut(), &url, &nav).await? {
                Some(pattern) => {
                    println!("{}", serde_json::to_string_pretty(&pattern)?);
                    for n in 1..=pages {
                        match pagination::generate_url(&pattern, n) {
                            Ok(page_url) => println!("{n}: {page_url}"),
                            Err(e) => {
                                log::warn!("{}", e);
                                break;
                            }
                        }
                    }
                }
                None => log::info!("No pagination detected on {}", url),
            }
            page.close().await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} seed sources, {} search workers, {} OCR workers)",
                config.sources.len(),
                config.pipeline.search_workers,
                config.pipeline.ocr_workers
            );
        }

        Command::Info => {
            log::info!("Database: {}", config.storage.database_path);
            let store = SqliteStore::open(&config.storage.database_path)?;
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    log::info!("Done!");

    Ok(())
}
