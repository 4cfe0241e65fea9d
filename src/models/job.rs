//! Job link records produced by a company crawl.

use serde::{Deserialize, Serialize};

use super::PaginationPattern;

/// A raw harvested anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobLink {
    /// Absolute URL
    pub url: String,
    pub text: String,
}

impl JobLink {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }
}

/// Outcome of classifying a harvested link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Noise,
    Engineering,
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noise => "noise",
            Self::Engineering => "engineering",
            Self::Other => "other",
        }
    }

    pub fn is_engineering(&self) -> bool {
        matches!(self, Self::Engineering)
    }
}

/// A job link with its category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedJob {
    #[serde(flatten)]
    pub link: JobLink,
    pub classification: Classification,
}

/// A harvested link that is not a job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoiseRecord {
    pub url: String,
    pub text: String,
}

impl From<JobLink> for NoiseRecord {
    fn from(link: JobLink) -> Self {
        Self {
            url: link.url,
            text: link.text,
        }
    }
}

/// Everything one company crawl produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    pub careers_url: String,
    pub jobs: Vec<ClassifiedJob>,
    pub noise: Vec<NoiseRecord>,
    pub pages_scanned: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PaginationPattern>,
}

impl CrawlReport {
    pub fn engineering_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.classification.is_engineering())
            .count()
    }
}
