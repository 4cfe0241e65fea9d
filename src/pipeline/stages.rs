// src/pipeline/stages.rs

//! Stage coordinators and their workers.
//!
//! Each coordinator owns one registration on its output queue, spawns its
//! workers with clones, joins them, and only then drops its registration.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::feedback::FeedbackPolicy;
use super::queue::{Consumer, Producer};
use super::sink::{ErrorSink, WorkerError, supervise};
use super::{Counters, PipelineDeps};
use crate::error::{AppError, Result};
use crate::models::{
    CompanyCandidate, Config, NameHint, SeedSource, SourceKind, TestimonialImageBatch,
};
use crate::services::{JobCrawler, SeedHarvester, TestimonialScanner};
use crate::storage::{CompanyFlag, flag};

/// A queued item plus, optionally, a registration on the names queue that
/// keeps it open while the item may still feed names back.
pub struct Leased<T> {
    pub item: T,
    lease: Option<Lease>,
}

pub type Lease = Producer<Leased<NameHint>>;

impl<T> Leased<T> {
    pub fn new(item: T, lease: Option<Lease>) -> Self {
        Self { item, lease }
    }

    pub fn into_parts(self) -> (T, Option<Lease>) {
        (self.item, self.lease)
    }
}

pub type NamesProducer = Producer<Leased<NameHint>>;
pub type NamesConsumer = Consumer<Leased<NameHint>>;
pub type CandidateProducer = Producer<Leased<CompanyCandidate>>;
pub type CandidateConsumer = Consumer<Leased<CompanyCandidate>>;
pub type ImageProducer = Producer<Leased<TestimonialImageBatch>>;
pub type ImageConsumer = Consumer<Leased<TestimonialImageBatch>>;

/// Shared handles passed to every worker.
#[derive(Clone)]
pub struct StageContext {
    pub config: Arc<Config>,
    pub deps: PipelineDeps,
    pub cancel: CancellationToken,
    pub sink: ErrorSink,
    pub counters: Arc<Counters>,
    pub feedback: FeedbackPolicy,
    pub crawler: Arc<JobCrawler>,
}

impl StageContext {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.crawler.timeout_secs)
    }

    fn report(&self, worker_id: &str, message: impl Into<String>, cause: &AppError) {
        self.sink
            .send(WorkerError::new(worker_id, message).with_cause(cause));
    }

    /// Sleep between items unless shutdown is requested.
    async fn pace(&self, millis: u64) -> Result<()> {
        if millis == 0 {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(()),
        }
    }

    async fn cancellable<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            result = work => result,
        }
    }

    fn lease_for(&self, names: &NamesProducer, generation: u32) -> Option<Lease> {
        self.feedback
            .can_feed_back(generation)
            .then(|| names.clone())
    }

    /// Offer an OCR'd name to the search stage. Never blocks.
    fn feed_back(&self, lease: &Lease, name: &str, generation: u32) {
        if self.cancel.is_cancelled() || !self.feedback.admits(name, generation) {
            return;
        }
        let hint = NameHint::new(name.trim(), SourceKind::Ocr, generation);
        let item = Leased::new(hint, self.lease_for(lease, generation));
        match lease.try_send(item) {
            Ok(true) => {
                self.counters.feedback_names.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => log::warn!("Names queue full, dropped feedback name '{}'", name),
            Err(e) => log::debug!("Feedback for '{}' not queued: {}", name, e),
        }
    }
}

async fn join_all(set: &mut JoinSet<()>, stage: &str) {
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                log::error!("{} task failed to join: {}", stage, e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

pub async fn harvest_stage(
    ctx: StageContext,
    names: NamesProducer,
    candidates: CandidateProducer,
) {
    let mut set = JoinSet::new();
    for source in ctx.config.sources.iter().cloned() {
        let worker_id = format!("harvest-{}", source.name);
        match source.kind {
            SourceKind::Directory => {
                let work = harvest_directory(ctx.clone(), source, names.clone(), candidates.clone());
                set.spawn(supervise(worker_id, ctx.sink.clone(), work));
            }
            SourceKind::JobBoard => {
                let work = harvest_job_board(ctx.clone(), source, names.clone());
                set.spawn(supervise(worker_id, ctx.sink.clone(), work));
            }
            other => log::warn!("Source '{}' has non-listing kind {}", source.name, other.as_str()),
        }
    }
    join_all(&mut set, "harvest").await;
    log::info!("Harvest stage finished");
}

async fn harvest_directory(
    ctx: StageContext,
    source: SeedSource,
    names: NamesProducer,
    candidates: CandidateProducer,
) -> Result<()> {
    let mut page = ctx.deps.browser.new_page().await?;
    let harvester = SeedHarvester::new(ctx.timeout());

    let result: Result<()> = async {
        ctx.cancellable(harvester.open_listing(page.as_mut(), &source))
            .await?;
        let entries = ctx
            .cancellable(harvester.directory_entries(
                page.as_mut(),
                &source,
                ctx.config.pipeline.max_companies,
            ))
            .await?;
        log::info!("{}: {} companies listed", source.name, entries.len());

        for entry in &entries {
            let website = match ctx
                .cancellable(harvester.profile_website(page.as_mut(), &source, entry))
                .await
            {
                Ok(website) => website,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    log::warn!("{}: profile for {} failed: {}", source.name, entry.name, e);
                    None
                }
            };

            match website {
                Some(url) => {
                    let id = match ctx.deps.store.upsert_seed_company(&entry.name, &url).await {
                        Ok(id) => id,
                        Err(e) => {
                            ctx.report(&source.name, format!("storing {} failed", entry.name), &e);
                            continue;
                        }
                    };
                    let candidate = CompanyCandidate {
                        id,
                        name: entry.name.clone(),
                        source_url: entry.profile_url.clone(),
                        canonical_url: url,
                        source_kind: SourceKind::Directory,
                        generation: 0,
                    };
                    candidates
                        .send(Leased::new(candidate, ctx.lease_for(&names, 0)), &ctx.cancel)
                        .await?;
                }
                None => {
                    log::debug!("{}: no website for {}, searching by name", source.name, entry.name);
                    let hint = NameHint::new(entry.name.clone(), SourceKind::Directory, 0);
                    names
                        .send(Leased::new(hint, ctx.lease_for(&names, 0)), &ctx.cancel)
                        .await?;
                }
            }

            ctx.pace(ctx.config.pipeline.company_pacing_ms).await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = page.close().await {
        log::debug!("Closing {} page failed: {}", source.name, e);
    }
    result
}

async fn harvest_job_board(ctx: StageContext, source: SeedSource, names: NamesProducer) -> Result<()> {
    let mut page = ctx.deps.browser.new_page().await?;
    let harvester = SeedHarvester::new(ctx.timeout());

    let result: Result<()> = async {
        ctx.cancellable(harvester.open_listing(page.as_mut(), &source))
            .await?;
        let found = harvester.job_board_names(&*page, &source).await?;
        for name in found {
            let hint = NameHint::new(name, SourceKind::JobBoard, 0);
            names
                .send(Leased::new(hint, ctx.lease_for(&names, 0)), &ctx.cancel)
                .await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = page.close().await {
        log::debug!("Closing {} page failed: {}", source.name, e);
    }
    result
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

pub async fn search_stage(ctx: StageContext, names: NamesConsumer, candidates: CandidateProducer) {
    let mut set = JoinSet::new();
    for i in 0..ctx.config.pipeline.search_workers {
        let worker_id = format!("search-{i}");
        let work = search_worker(ctx.clone(), worker_id.clone(), names.clone(), candidates.clone());
        set.spawn(supervise(worker_id, ctx.sink.clone(), work));
    }
    drop(names);
    join_all(&mut set, "search").await;
    log::info!("Search stage finished");
}

async fn search_worker(
    ctx: StageContext,
    worker_id: String,
    names: NamesConsumer,
    candidates: CandidateProducer,
) -> Result<()> {
    let mut seen = HashSet::new();

    while let Some(item) = names.recv(&ctx.cancel).await {
        let (hint, lease) = item.into_parts();
        if !seen.insert(hint.name.to_lowercase()) {
            continue;
        }

        let url = match ctx.cancellable(ctx.deps.search.search(&hint.name)).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                log::warn!("No search result for '{}'", hint.name);
                ctx.counters.search_misses.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                ctx.report(&worker_id, format!("search for '{}' failed", hint.name), &e);
                continue;
            }
        };

        let id = match ctx.deps.store.upsert_seed_company(&hint.name, &url).await {
            Ok(id) => id,
            Err(e) => {
                ctx.report(&worker_id, format!("storing {} failed", hint.name), &e);
                continue;
            }
        };
        log::info!("Resolved '{}' -> {} (generation {})", hint.name, url, hint.generation);

        let candidate = CompanyCandidate {
            id,
            name: hint.name,
            source_url: url.clone(),
            canonical_url: url,
            source_kind: hint.source_kind,
            generation: hint.generation,
        };
        candidates.send(Leased::new(candidate, lease), &ctx.cancel).await?;
        ctx.pace(ctx.config.pipeline.search_pacing_ms).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Routing and job crawls
// ---------------------------------------------------------------------------

pub async fn route_stage(
    ctx: StageContext,
    candidates: CandidateConsumer,
    testimonials: CandidateProducer,
) {
    let limit = Arc::new(Semaphore::new(ctx.config.crawler.max_concurrent_crawls));
    let max_companies = ctx.config.pipeline.max_companies;
    let mut crawls = JoinSet::new();
    let mut seen = HashSet::new();

    while let Some(item) = candidates.recv(&ctx.cancel).await {
        let candidate = &item.item;
        if !candidate.is_resolved() || !seen.insert(candidate.id) {
            continue;
        }
        if max_companies > 0 && seen.len() > max_companies {
            log::debug!("Company limit reached, skipping {}", candidate.name);
            continue;
        }
        ctx.counters.candidates.fetch_add(1, Ordering::Relaxed);

        let permit = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            permit = Arc::clone(&limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let worker_id = format!("crawl-{}", candidate.id);
        let work = crawl_company(ctx.clone(), worker_id.clone(), candidate.clone());
        let sink = ctx.sink.clone();
        crawls.spawn(async move {
            supervise(worker_id, sink, work).await;
            drop(permit);
        });
        while crawls.try_join_next().is_some() {}

        if testimonials.send(item, &ctx.cancel).await.is_err() {
            break;
        }
    }

    drop(testimonials);
    join_all(&mut crawls, "crawl").await;
    log::info!("Router finished");
}

async fn crawl_company(ctx: StageContext, worker_id: String, candidate: CompanyCandidate) -> Result<()> {
    let report = ctx
        .cancellable(ctx.crawler.scrape_jobs(ctx.deps.browser.as_ref(), &candidate.canonical_url))
        .await;

    let report = match report {
        Ok(report) => report,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            ctx.counters.crawl_failures.fetch_add(1, Ordering::Relaxed);
            ctx.report(&worker_id, format!("job crawl for {} failed", candidate.name), &e);
            return Ok(());
        }
    };

    let store = &ctx.deps.store;
    let jobs = store.upsert_jobs(candidate.id, &report.jobs).await?;
    let noise = store.upsert_noise(candidate.id, &report.noise).await?;
    store
        .update_company_flags(candidate.id, &flag(CompanyFlag::JobScraped, true))
        .await?;

    ctx.counters.crawled.fetch_add(1, Ordering::Relaxed);
    ctx.counters.jobs.fetch_add(jobs, Ordering::Relaxed);
    ctx.counters.noise.fetch_add(noise, Ordering::Relaxed);
    log::info!(
        "{}: {} jobs ({} engineering), {} noise, {} page(s)",
        candidate.name,
        report.jobs.len(),
        report.engineering_count(),
        report.noise.len(),
        report.pages_scanned
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Testimonials
// ---------------------------------------------------------------------------

pub async fn testimonial_stage(ctx: StageContext, queue: CandidateConsumer, images: ImageProducer) {
    let mut set = JoinSet::new();
    for i in 0..ctx.config.pipeline.testimonial_workers {
        let worker_id = format!("testimonial-{i}");
        let work = testimonial_worker(ctx.clone(), worker_id.clone(), queue.clone(), images.clone());
        set.spawn(supervise(worker_id, ctx.sink.clone(), work));
    }
    drop(queue);
    join_all(&mut set, "testimonial").await;
    log::info!("Testimonial stage finished");
}

async fn testimonial_worker(
    ctx: StageContext,
    worker_id: String,
    queue: CandidateConsumer,
    images: ImageProducer,
) -> Result<()> {
    let mut page = ctx.deps.browser.new_page().await?;
    let scanner = TestimonialScanner::new(ctx.timeout());

    let result: Result<()> = async {
        while let Some(item) = queue.recv(&ctx.cancel).await {
            let (candidate, lease) = item.into_parts();
            let scan = ctx
                .cancellable(scanner.scan_company(page.as_mut(), &candidate.canonical_url))
                .await;

            match scan {
                Ok(Some(found)) => {
                    log::info!(
                        "{}: {} logo(s) via {:?} scan",
                        candidate.name,
                        found.images.len(),
                        found.phase
                    );
                    ctx.counters.logo_batches.fetch_add(1, Ordering::Relaxed);
                    ctx.counters
                        .images
                        .fetch_add(found.images.len(), Ordering::Relaxed);
                    let batch = TestimonialImageBatch {
                        company_id: candidate.id,
                        company_name: candidate.name.clone(),
                        generation: candidate.generation,
                        image_urls: found.images,
                    };
                    images.send(Leased::new(batch, lease), &ctx.cancel).await?;
                }
                Ok(None) => log::debug!("{}: no customer logos", candidate.name),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => ctx.report(
                    &worker_id,
                    format!("testimonial scan for {} failed", candidate.name),
                    &e,
                ),
            }

            if let Err(e) = ctx
                .deps
                .store
                .update_company_flags(candidate.id, &flag(CompanyFlag::TestimonialScraped, true))
                .await
            {
                ctx.report(&worker_id, format!("flagging {} failed", candidate.name), &e);
            }
            ctx.pace(ctx.config.pipeline.company_pacing_ms).await?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = page.close().await {
        log::debug!("Closing {} page failed: {}", worker_id, e);
    }
    result
}

// ---------------------------------------------------------------------------
// OCR
// ---------------------------------------------------------------------------

pub async fn ocr_stage(ctx: StageContext, images: ImageConsumer) {
    let mut set = JoinSet::new();
    for i in 0..ctx.config.pipeline.ocr_workers {
        let worker_id = format!("ocr-{i}");
        let work = ocr_worker(ctx.clone(), worker_id.clone(), images.clone());
        set.spawn(supervise(worker_id, ctx.sink.clone(), work));
    }
    drop(images);
    join_all(&mut set, "ocr").await;
    log::info!("OCR stage finished");
}

async fn ocr_worker(ctx: StageContext, worker_id: String, images: ImageConsumer) -> Result<()> {
    while let Some(item) = images.recv(&ctx.cancel).await {
        let (batch, lease) = item.into_parts();

        let results = match ctx
            .cancellable(ctx.deps.vision.extract_text(&batch.image_urls))
            .await
        {
            Ok(results) => results,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                ctx.report(&worker_id, format!("OCR for {} failed", batch.company_name), &e);
                continue;
            }
        };

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for result in &results {
            if let Some(error) = &result.error {
                log::debug!("OCR skipped {}: {}", result.url, error);
                continue;
            }
            for name in result.names() {
                if ctx.feedback.is_name(name) && seen.insert(name.to_lowercase()) {
                    names.push(name.to_string());
                }
            }
        }
        if names.is_empty() {
            continue;
        }

        match ctx.deps.store.upsert_testimonials(batch.company_id, &names).await {
            Ok(inserted) => {
                ctx.counters.testimonials.fetch_add(inserted, Ordering::Relaxed);
            }
            Err(e) => ctx.report(
                &worker_id,
                format!("storing testimonials for {} failed", batch.company_name),
                &e,
            ),
        }

        if let Some(lease) = &lease {
            for name in &names {
                ctx.feed_back(lease, name, batch.generation + 1);
            }
        }
    }
    Ok(())
}
