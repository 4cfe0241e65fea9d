// src/models/mod.rs

//! Domain models for jobscout.
//!
//! Records exchanged between pipeline stages, crawl results and the
//! configuration tree.

mod company;
mod config;
mod job;
mod pagination;

pub use company::{CompanyCandidate, NameHint, OcrResult, TestimonialImageBatch};
pub use config::{
    BrowserEngine, Config, CrawlerConfig, FeedbackConfig, LoggingConfig, PipelineConfig, SearchConfig,
    SeedSource, SourceKind, StorageConfig, VisionConfig,
};
pub use job::{Classification, ClassifiedJob, CrawlReport, JobLink, NoiseRecord};
pub use pagination::{PaginationKind, PaginationPattern};
