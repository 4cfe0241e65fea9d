//! Company discovery records passed between pipeline stages.

use serde::{Deserialize, Serialize};

use super::SourceKind;

/// A company waiting for a job crawl and testimonial scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyCandidate {
    /// Store row id assigned by `upsert_seed_company`
    pub id: i64,

    pub name: String,

    /// Page the company was discovered on
    pub source_url: String,

    /// Company homepage; empty until resolved
    pub canonical_url: String,

    pub source_kind: SourceKind,

    /// Number of logo-OCR hops that led here (0 for seed listings)
    pub generation: u32,
}

impl CompanyCandidate {
    pub fn is_resolved(&self) -> bool {
        !self.canonical_url.trim().is_empty()
    }
}

/// A bare company name that still needs a website.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameHint {
    pub name: String,
    pub source_kind: SourceKind,
    pub generation: u32,
}

impl NameHint {
    pub fn new(name: impl Into<String>, source_kind: SourceKind, generation: u32) -> Self {
        Self {
            name: name.into(),
            source_kind,
            generation,
        }
    }
}

/// Candidate logo images for one company.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestimonialImageBatch {
    pub company_id: i64,
    pub company_name: String,
    pub generation: u32,
    pub image_urls: Vec<String>,
}

/// OCR outcome for a single image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OcrResult {
    pub url: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrResult {
    pub fn ok(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: String::new(),
            error: Some(error.into()),
        }
    }

    /// Non-empty trimmed lines of recognized text.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.text.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}
