//! Service layer for jobscout.
//!
//! This module contains the business logic for:
//! - Link classification (`classifier`)
//! - Pagination pattern discovery (`pagination`)
//! - Per-company job crawling (`JobCrawler`)
//! - Seed listing harvests (`SeedHarvester`)
//! - Customer logo discovery (`TestimonialScanner`)
//! - Company search (`CompanySearch`) and logo OCR (`TextExtractor`)

pub mod classifier;
pub mod jobs;
pub mod pagination;
pub mod search;
pub mod seeds;
pub mod testimonials;
pub mod vision;

pub use jobs::JobCrawler;
pub use search::{CompanySearch, GoogleSearch};
pub use seeds::{DirectoryEntry, SeedHarvester, clean_listing_name};
pub use testimonials::{LogoPhase, LogoScan, TestimonialScanner};
pub use vision::{AnthropicVision, TextExtractor};
