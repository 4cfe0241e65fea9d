//! Inferred pagination rule for a listing page.

use serde::{Deserialize, Serialize};

/// Where the page number lives in the URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaginationKind {
    Query,
    Path,
    /// Page number only in the fragment; not reachable by navigation
    Fragment,
}

/// How later pages of a listing are addressed.
///
/// `generate_url(pattern, 2)` reproduces the page-2 URL observed during
/// discovery. For query patterns `base_url` is that observed URL and the
/// parameter is rewritten in place; for path patterns it is the URL with the
/// page segment stripped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationPattern {
    pub kind: PaginationKind,

    /// Query or fragment parameter name; `page` marker for path patterns
    pub param_name: String,

    /// URL value used for logical page 1
    pub start_index: i64,

    pub is_zero_indexed: bool,

    pub base_url: String,

    /// Path patterns only: whether the number segment ended with `/`
    #[serde(default)]
    pub trailing_slash: bool,

    /// Highest page number observed among pagination controls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_page: Option<u32>,

    /// Candidates whose targets agreed with the pattern
    pub validated: usize,

    /// Candidates with a comparable target
    pub checked: usize,
}
