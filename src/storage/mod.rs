//! Persistence for discovered companies and their crawl results.
//!
//! Two backends share one contract:
//! - [`SqliteStore`] for real runs
//! - [`MemoryStore`] for dry runs and tests
//!
//! Every upsert is conflict-skip: re-inserting an existing row is a no-op,
//! so concurrent workers may write the same company without coordination.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{ClassifiedJob, NoiseRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Company flags that workers are allowed to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyFlag {
    TestimonialScraped,
    JobScraped,
}

impl CompanyFlag {
    /// Parse a flag name, rejecting anything outside the allow-list.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "TestimonialScraped" => Ok(Self::TestimonialScraped),
            "JobScraped" => Ok(Self::JobScraped),
            other => Err(AppError::InvalidFlag(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestimonialScraped => "TestimonialScraped",
            Self::JobScraped => "JobScraped",
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::TestimonialScraped => "testimonial_scraped",
            Self::JobScraped => "job_scraped",
        }
    }
}

/// Validate a flag map before any write happens.
pub(crate) fn parse_flags(flags: &BTreeMap<String, bool>) -> Result<Vec<(CompanyFlag, bool)>> {
    flags
        .iter()
        .map(|(name, value)| Ok((CompanyFlag::parse(name)?, *value)))
        .collect()
}

/// Row counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub companies: usize,
    pub jobs: usize,
    pub engineering_jobs: usize,
    pub noise: usize,
    pub testimonials: usize,
    pub job_scraped: usize,
    pub testimonial_scraped: usize,
}

/// Trait for company storage backends.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// Insert or refresh a seed company and return its id.
    ///
    /// A company matching either the URL or the name (case-insensitive)
    /// keeps its existing id.
    async fn upsert_seed_company(&self, name: &str, url: &str) -> Result<i64>;

    /// Store jobs, skipping titles the company already has. Returns rows inserted.
    async fn upsert_jobs(&self, company_id: i64, jobs: &[ClassifiedJob]) -> Result<usize>;

    /// Store noise links, skipping known URLs. Returns rows inserted.
    async fn upsert_noise(&self, company_id: i64, noise: &[NoiseRecord]) -> Result<usize>;

    /// Store customer names read from logos, skipping known names. Returns rows inserted.
    async fn upsert_testimonials(&self, company_id: i64, names: &[String]) -> Result<usize>;

    /// Set progress flags. Unknown flag names fail with [`AppError::InvalidFlag`].
    async fn update_company_flags(
        &self,
        company_id: i64,
        flags: &BTreeMap<String, bool>,
    ) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Build a single-flag map.
pub fn flag(flag: CompanyFlag, value: bool) -> BTreeMap<String, bool> {
    BTreeMap::from([(flag.as_str().to_string(), value)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_allow_list() {
        assert_eq!(CompanyFlag::parse("JobScraped").unwrap(), CompanyFlag::JobScraped);
        assert!(matches!(
            CompanyFlag::parse("Visited"),
            Err(AppError::InvalidFlag(name)) if name == "Visited"
        ));

        let mut flags = flag(CompanyFlag::TestimonialScraped, true);
        assert_eq!(parse_flags(&flags).unwrap().len(), 1);
        flags.insert("jobscraped".into(), true);
        assert!(parse_flags(&flags).is_err());
    }
}
