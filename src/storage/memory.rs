//! In-memory backend with the same conflict rules as SQLite.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CompanyFlag, CompanyStore, StoreStats, parse_flags};
use crate::error::Result;
use crate::models::{ClassifiedJob, NoiseRecord};

#[derive(Debug)]
struct CompanyRow {
    id: i64,
    name: String,
    url: String,
    job_scraped: bool,
    testimonial_scraped: bool,
}

#[derive(Debug, Default)]
struct State {
    companies: Vec<CompanyRow>,
    /// (company id, lowercased title)
    jobs: HashSet<(i64, String)>,
    engineering_jobs: usize,
    noise_urls: HashSet<String>,
    /// Lowercased customer names
    testimonials: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored company in insertion order.
    pub async fn company_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.companies.iter().map(|c| c.name.clone()).collect()
    }

    /// Current flag values for a company.
    pub async fn flags(&self, company_id: i64) -> Option<(bool, bool)> {
        let state = self.state.lock().await;
        state
            .companies
            .iter()
            .find(|c| c.id == company_id)
            .map(|c| (c.job_scraped, c.testimonial_scraped))
    }
}

#[async_trait]
impl CompanyStore for MemoryStore {
    async fn upsert_seed_company(&self, name: &str, url: &str) -> Result<i64> {
        let (name, url) = (name.trim(), url.trim());
        let mut state = self.state.lock().await;

        if let Some(row) = state
            .companies
            .iter()
            .find(|c| c.url == url || c.name.eq_ignore_ascii_case(name))
        {
            return Ok(row.id);
        }

        let id = state.companies.len() as i64 + 1;
        state.companies.push(CompanyRow {
            id,
            name: name.to_string(),
            url: url.to_string(),
            job_scraped: false,
            testimonial_scraped: false,
        });
        Ok(id)
    }

    async fn upsert_jobs(&self, company_id: i64, jobs: &[ClassifiedJob]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for job in jobs {
            if state.jobs.insert((company_id, job.link.text.to_lowercase())) {
                inserted += 1;
                if job.classification.is_engineering() {
                    state.engineering_jobs += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn upsert_noise(&self, _company_id: i64, noise: &[NoiseRecord]) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(noise
            .iter()
            .filter(|n| state.noise_urls.insert(n.url.clone()))
            .count())
    }

    async fn upsert_testimonials(&self, _company_id: i64, names: &[String]) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .filter(|n| state.testimonials.insert(n.to_lowercase()))
            .count())
    }

    async fn update_company_flags(
        &self,
        company_id: i64,
        flags: &BTreeMap<String, bool>,
    ) -> Result<()> {
        let flags = parse_flags(flags)?;
        let mut state = self.state.lock().await;
        if let Some(row) = state.companies.iter_mut().find(|c| c.id == company_id) {
            for (flag, value) in flags {
                match flag {
                    CompanyFlag::JobScraped => row.job_scraped = value,
                    CompanyFlag::TestimonialScraped => row.testimonial_scraped = value,
                }
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.lock().await;
        Ok(StoreStats {
            companies: state.companies.len(),
            jobs: state.jobs.len(),
            engineering_jobs: state.engineering_jobs,
            noise: state.noise_urls.len(),
            testimonials: state.testimonials.len(),
            job_scraped: state.companies.iter().filter(|c| c.job_scraped).count(),
            testimonial_scraped: state
                .companies
                .iter()
                .filter(|c| c.testimonial_scraped)
                .count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Classification, JobLink};
    use crate::storage::flag;

    #[tokio::test]
    async fn test_matches_sqlite_conflict_rules() {
        let store = MemoryStore::new();
        let id = store.upsert_seed_company("Acme", "https://acme.io").await.unwrap();
        assert_eq!(store.upsert_seed_company("acme", "https://other.io").await.unwrap(), id);
        let other = store.upsert_seed_company("Globex", "https://globex.io").await.unwrap();
        assert_ne!(id, other);

        let jobs = vec![
            ClassifiedJob {
                link: JobLink::new("https://acme.io/1", "Backend Engineer"),
                classification: Classification::Engineering,
            },
            ClassifiedJob {
                link: JobLink::new("https://acme.io/2", "BACKEND ENGINEER"),
                classification: Classification::Engineering,
            },
        ];
        assert_eq!(store.upsert_jobs(id, &jobs).await.unwrap(), 1);
        assert_eq!(store.upsert_jobs(other, &jobs).await.unwrap(), 1);

        assert_eq!(
            store
                .upsert_testimonials(id, &["Stripe".into(), "stripe".into()])
                .await
                .unwrap(),
            1
        );

        store
            .update_company_flags(id, &flag(CompanyFlag::TestimonialScraped, true))
            .await
            .unwrap();
        assert_eq!(store.flags(id).await, Some((false, true)));

        let bad = BTreeMap::from([("Visited".to_string(), true)]);
        assert!(matches!(
            store.update_company_flags(id, &bad).await,
            Err(AppError::InvalidFlag(_))
        ));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.companies, 2);
        assert_eq!(stats.jobs, 2);
        assert_eq!(stats.engineering_jobs, 2);
        assert_eq!(stats.testimonials, 1);
        assert_eq!(store.company_names().await, vec!["Acme", "Globex"]);
    }
}
