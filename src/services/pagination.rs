// src/services/pagination.rs

//! Pagination pattern discovery.
//!
//! Looks at the pagination controls of a loaded listing page, works out how
//! page 2 is addressed, and turns that into a rule that can generate the URL
//! of any later page.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::browser::{Element, NavigateOptions, Page};
use crate::error::{AppError, Result};
use crate::models::{PaginationKind, PaginationPattern};
use crate::utils::url::{resolve_href, without_fragment};

/// Structural hints for pagination containers.
const CONTAINER_SELECTORS: &[&str] = &[
    "[class*='pagination']",
    "[class*='Pagination']",
    "[class*='pager']",
    "[class*='Pager']",
    "nav[aria-label*='agination']",
    "nav[aria-label*='pages']",
    "[role='navigation']",
    "[data-pagination]",
];

/// Query parameters known to carry a page number.
const PAGE_PARAMS: &[&str] = &[
    "page",
    "p",
    "spage",
    "paged",
    "_page",
    "pagenum",
    "pagenumber",
];

const TARGET_ATTRS: &[&str] = &["href", "data-href", "data-url", "data-page"];

const STATE_HINTS: &[&str] = &["active", "current", "disabled", "selected"];

/// Logical page used as the discovery sample.
const SAMPLE_PAGE: i64 = 2;

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("hardcoded regex pattern is valid"));

static NEXT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnext\b|[›»→]").expect("hardcoded regex pattern is valid"));

static PATH_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(/page)?/(\d+)(/?)$").expect("hardcoded regex pattern is valid")
});

static FRAGMENT_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([a-z_]*page[a-z_]*|p)[=/:-](\d+)").expect("hardcoded regex pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
struct Candidate {
    element: Element,
    /// Raw value of the first target attribute present
    target: Option<String>,
    page_number: Option<i64>,
    is_next: bool,
    confidence: Confidence,
}

impl Candidate {
    fn from_element(element: Element) -> Option<Self> {
        if is_inert(&element) {
            return None;
        }

        let label = element.label().unwrap_or_default().to_string();
        let text = element.text.trim().to_string();
        if is_ellipsis(&text) && label.is_empty() {
            return None;
        }

        let target = TARGET_ATTRS
            .iter()
            .filter_map(|attr| element.attr(attr))
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(str::to_string);

        let page_number = first_number(&label).or_else(|| first_number(&text));
        let is_next = NEXT_HINT.is_match(&label) || NEXT_HINT.is_match(&text);

        let navigable = target.is_some()
            || element.tag == "button"
            || element.attr("onclick").is_some()
            || element.attr("role") == Some("button");

        let confidence = match page_number {
            Some(n)
                if label.to_lowercase().contains("page")
                    && target.as_deref().is_some_and(|t| t.contains(&n.to_string())) =>
            {
                Confidence::High
            }
            _ if (page_number.is_some() || is_next) && navigable => Confidence::Medium,
            _ => Confidence::Low,
        };

        Some(Self {
            element,
            target,
            page_number,
            is_next,
            confidence,
        })
    }

    /// Target as an absolute URL when it can be followed without a click.
    fn resolved_target(&self, base: &Url) -> Option<String> {
        let raw = self.target.as_deref()?;
        if raw == "#" || raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        resolve_href(base, raw)
    }
}

fn first_number(s: &str) -> Option<i64> {
    FIRST_NUMBER.find(s).and_then(|m| m.as_str().parse().ok())
}

fn is_ellipsis(text: &str) -> bool {
    matches!(text, "…" | "..." | "..")
}

/// Active, current or disabled on the element itself or its parent.
fn is_inert(element: &Element) -> bool {
    let own = (
        element.attr("class"),
        element.attr("aria-current"),
        element.attr("aria-disabled"),
        element.attr("disabled"),
    );
    let parent = element
        .parent()
        .map(|p| {
            (
                p.attr("class"),
                p.attr("aria-current"),
                p.attr("aria-disabled"),
                p.attr("disabled"),
            )
        })
        .unwrap_or_default();

    [own, parent]
        .into_iter()
        .any(|(class, current, aria_disabled, disabled)| {
            let class = class.unwrap_or_default().to_lowercase();
            class
                .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
                .any(|token| STATE_HINTS.contains(&token))
                || current.is_some_and(|v| v != "false")
                || aria_disabled == Some("true")
                || disabled.is_some()
        })
}

/// Collect candidate controls from every pagination container.
async fn collect_candidates(page: &dyn Page) -> Result<Vec<Candidate>> {
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut candidates = Vec::new();

    for container in CONTAINER_SELECTORS {
        let selector = format!("{container} a, {container} button");
        for element in page.locate(&selector).await? {
            if !seen.insert(element.path.clone()) {
                continue;
            }
            if let Some(candidate) = Candidate::from_element(element) {
                candidates.push(candidate);
            }
        }
    }

    candidates.retain(|c| c.confidence != Confidence::Low);
    Ok(candidates)
}

/// Page-2 control by confidence, else the first "next" control.
fn pick_sample(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut page_two: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.page_number == Some(SAMPLE_PAGE))
        .collect();
    page_two.sort_by_key(|c| c.confidence);

    page_two
        .first()
        .copied()
        .or_else(|| candidates.iter().find(|c| c.is_next))
}

/// Discover how the listing page currently loaded in `page` paginates.
///
/// `base_url` is the listing URL; the page is returned there if a control had
/// to be clicked. `Ok(None)` means the listing is a single page as far as
/// the heuristics can tell.
pub async fn discover_pattern(
    page: &mut dyn Page,
    base_url: &str,
    opts: &NavigateOptions,
) -> Result<Option<PaginationPattern>> {
    let base = Url::parse(base_url)?;
    let candidates = collect_candidates(&*page).await?;
    if candidates.is_empty() {
        log::debug!("No pagination controls on {}", base_url);
        return Ok(None);
    }

    let Some(sample) = pick_sample(&candidates) else {
        log::debug!("No page-2 or next control on {}", base_url);
        return Ok(None);
    };

    let inferred = match sample.resolved_target(&base) {
        Some(target) => infer_from_urls(base_url, &target, SAMPLE_PAGE),
        None => infer_by_click(page, sample, base_url, opts).await,
    };

    let Some(mut pattern) = inferred else {
        log::debug!("Pagination controls on {} gave no addressable pattern", base_url);
        return Ok(None);
    };

    pattern.max_page = candidates
        .iter()
        .filter_map(|c| c.page_number)
        .max()
        .and_then(|n| u32::try_from(n).ok());

    for candidate in &candidates {
        if candidate.element.path == sample.element.path {
            continue;
        }
        let (Some(number), Some(target)) = (candidate.page_number, candidate.resolved_target(&base))
        else {
            continue;
        };
        pattern.checked += 1;
        let expected = pattern.start_index.checked_add(number - 1);
        if expected.is_some() && pattern_value(&pattern, &target) == expected {
            pattern.validated += 1;
        }
    }

    log::debug!(
        "Pagination on {}: {:?} '{}' start={} validated {}/{}",
        base_url,
        pattern.kind,
        pattern.param_name,
        pattern.start_index,
        pattern.validated,
        pattern.checked
    );
    Ok(Some(pattern))
}

/// True when the loaded listing page links past page `current`, either
/// through a "next" control or a higher page number.
pub async fn has_more_pages(page: &dyn Page, current: u32) -> Result<bool> {
    let current = i64::from(current);
    Ok(collect_candidates(page)
        .await?
        .iter()
        .any(|c| c.is_next || c.page_number.is_some_and(|n| n > current)))
}

async fn infer_by_click(
    page: &mut dyn Page,
    sample: &Candidate,
    base_url: &str,
    opts: &NavigateOptions,
) -> Option<PaginationPattern> {
    let before = page.url().to_string();
    let after = match page.click(&sample.element).await {
        Ok(response) => response.url,
        Err(e) => {
            log::debug!("Pagination click failed on {}: {}", base_url, e);
            return None;
        }
    };

    let pattern = infer_from_urls(&before, &after, SAMPLE_PAGE);

    if after != before {
        if let Err(e) = page.navigate(base_url, opts).await {
            log::warn!("Could not return to listing {}: {}", base_url, e);
        }
    }
    pattern
}

/// Compare the page-1 URL with the URL of `logical_page` and derive a rule.
pub fn infer_from_urls(before: &str, after: &str, logical_page: i64) -> Option<PaginationPattern> {
    let before_url = Url::parse(before).ok()?;
    let after_url = Url::parse(after).ok()?;

    infer_query(&before_url, &after_url, logical_page)
        .or_else(|| infer_path(&before_url, &after_url, logical_page))
        .or_else(|| infer_fragment(&before_url, &after_url, logical_page))
        .filter(|p| p.start_index >= 0)
}

fn pattern_for(
    kind: PaginationKind,
    param_name: &str,
    value: i64,
    logical_page: i64,
    base_url: String,
) -> PaginationPattern {
    let start_index = value.saturating_sub(logical_page - 1);
    PaginationPattern {
        kind,
        param_name: param_name.to_string(),
        start_index,
        is_zero_indexed: start_index == 0,
        base_url,
        trailing_slash: false,
        max_page: None,
        validated: 0,
        checked: 0,
    }
}

fn page_param(url: &Url) -> Option<(String, i64)> {
    url.query_pairs().find_map(|(k, v)| {
        let known = PAGE_PARAMS.contains(&k.to_lowercase().as_str());
        let value = v.trim().parse::<i64>().ok()?;
        known.then(|| (k.into_owned(), value))
    })
}

fn infer_query(before: &Url, after: &Url, logical_page: i64) -> Option<PaginationPattern> {
    let (name, value) = page_param(after)?;
    let previous = before
        .query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        .and_then(|(_, v)| v.trim().parse::<i64>().ok());
    if previous == Some(value) {
        return None;
    }

    let mut base = after.clone();
    base.set_fragment(None);
    Some(pattern_for(
        PaginationKind::Query,
        &name,
        value,
        logical_page,
        base.to_string(),
    ))
}

/// (prefix, has `/page` marker, number, trailing slash)
fn path_page(url: &Url) -> Option<(String, bool, i64, bool)> {
    let path = url.path();
    let caps = PATH_PAGE.captures(path)?;
    let whole = caps.get(0)?;
    let number = caps.get(2)?.as_str().parse().ok()?;
    Some((
        path[..whole.start()].to_string(),
        caps.get(1).is_some(),
        number,
        caps.get(3).is_some_and(|m| !m.as_str().is_empty()),
    ))
}

fn infer_path(before: &Url, after: &Url, logical_page: i64) -> Option<PaginationPattern> {
    let (prefix, marker, value, trailing) = path_page(after)?;
    if path_page(before).is_some_and(|(p, _, v, _)| p == prefix && v == value) {
        return None;
    }
    // A bare numeric segment only counts when page 1 lives at the prefix.
    if !marker && before.path().trim_end_matches('/') != prefix.trim_end_matches('/') {
        return None;
    }

    let mut base = after.clone();
    base.set_path(&prefix);
    base.set_fragment(None);

    let mut pattern = pattern_for(
        PaginationKind::Path,
        if marker { "page" } else { "" },
        value,
        logical_page,
        base.to_string(),
    );
    pattern.trailing_slash = trailing;
    Some(pattern)
}

fn infer_fragment(before: &Url, after: &Url, logical_page: i64) -> Option<PaginationPattern> {
    if without_fragment(before.as_str()) != without_fragment(after.as_str()) {
        return None;
    }
    let fragment = after.fragment()?;
    let caps = FRAGMENT_PAGE.captures(fragment)?;
    let value = caps.get(2)?.as_str().parse().ok()?;
    if before
        .fragment()
        .and_then(|f| FRAGMENT_PAGE.captures(f))
        .and_then(|c| c.get(2)?.as_str().parse::<i64>().ok())
        == Some(value)
    {
        return None;
    }
    Some(pattern_for(
        PaginationKind::Fragment,
        caps.get(1)?.as_str(),
        value,
        logical_page,
        after.to_string(),
    ))
}

/// Page value a URL carries under `pattern`'s addressing rule.
fn pattern_value(pattern: &PaginationPattern, url: &str) -> Option<i64> {
    let url = Url::parse(url).ok()?;
    match pattern.kind {
        PaginationKind::Query => url
            .query_pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case(&pattern.param_name))
            .and_then(|(_, v)| v.trim().parse().ok()),
        PaginationKind::Path => path_page(&url).map(|(_, _, v, _)| v),
        PaginationKind::Fragment => FRAGMENT_PAGE
            .captures(url.fragment()?)
            .and_then(|c| c.get(2)?.as_str().parse().ok()),
    }
}

/// Build the URL of logical page `page_number` (1-based).
pub fn generate_url(pattern: &PaginationPattern, page_number: u32) -> Result<String> {
    if page_number == 0 {
        return Err(AppError::UnsupportedPagination(
            "page numbers start at 1".into(),
        ));
    }
    let value = pattern
        .start_index
        .checked_add(i64::from(page_number) - 1)
        .ok_or_else(|| {
            AppError::UnsupportedPagination(format!(
                "page {} overflows start index {}",
                page_number, pattern.start_index
            ))
        })?;
    let mut url = Url::parse(&pattern.base_url)?;

    match pattern.kind {
        PaginationKind::Query => {
            let mut replaced = false;
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| {
                    if k == pattern.param_name.as_str() {
                        replaced = true;
                        (k.into_owned(), value.to_string())
                    } else {
                        (k.into_owned(), v.into_owned())
                    }
                })
                .collect();
            let mut query = url.query_pairs_mut();
            query.clear().extend_pairs(pairs);
            if !replaced {
                query.append_pair(&pattern.param_name, &value.to_string());
            }
            drop(query);
        }
        PaginationKind::Path => {
            let marker = if pattern.param_name.is_empty() {
                String::new()
            } else {
                format!("/{}", pattern.param_name)
            };
            let slash = if pattern.trailing_slash { "/" } else { "" };
            let path = format!(
                "{}{}/{}{}",
                url.path().trim_end_matches('/'),
                marker,
                value,
                slash
            );
            url.set_path(&path);
        }
        PaginationKind::Fragment => {
            return Err(AppError::UnsupportedPagination(format!(
                "unsupported pagination type: fragment '{}'",
                pattern.param_name
            )));
        }
    }

    Ok(url.to_string())
}

/// URLs for pages `2..=last`.
pub fn follow_up_urls(pattern: &PaginationPattern, last: u32) -> Result<Vec<String>> {
    (2..=last).map(|n| generate_url(pattern, n)).collect()
}
