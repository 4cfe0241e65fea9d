// src/utils/url.rs

//! URL resolution for harvested hrefs.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SCRIPT_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"window\.open\(\s*['"]([^'"]+)['"]"#,
        r#"window\.location(?:\.href)?\s*=\s*['"]([^'"]+)['"]"#,
        r#"(?:^|[^.\w])location\.href\s*=\s*['"]([^'"]+)['"]"#,
        r#"location\.assign\(\s*['"]([^'"]+)['"]"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Resolve an href as found in markup.
///
/// Handles relative, protocol-relative and absolute hrefs plus
/// `javascript:` hrefs that carry a navigation call. Returns `None` for
/// empty hrefs and scripts without a recoverable target.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    if href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
    {
        let target = extract_script_url(&href[11..])?;
        return base.join(&target).ok().map(|u| u.to_string());
    }

    base.join(href).ok().map(|u| u.to_string())
}

/// Pull a navigation target out of an inline script.
pub fn extract_script_url(script: &str) -> Option<String> {
    SCRIPT_URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(script))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract the domain from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}

/// Compare hosts ignoring a leading `www.`.
pub fn same_host(a: &str, b: &str) -> bool {
    match (get_domain(a), get_domain(b)) {
        (Some(x), Some(y)) => x.trim_start_matches("www.") == y.trim_start_matches("www."),
        _ => false,
    }
}

/// Re-resolve the path, query and fragment of `url` against `base`'s origin.
pub fn rebase_to_host(base: &Url, url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut rebased = base.clone();
    rebased.set_path(parsed.path());
    rebased.set_query(parsed.query());
    rebased.set_fragment(parsed.fragment());
    Some(rebased.to_string())
}

/// Drop the fragment so URLs can be compared as documents.
pub fn without_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://acme.io/company/careers").unwrap()
    }

    #[test]
    fn test_resolve_href_relative_and_protocol_relative() {
        assert_eq!(
            resolve_href(&base(), "/jobs").as_deref(),
            Some("https://acme.io/jobs")
        );
        assert_eq!(
            resolve_href(&base(), "//boards.greenhouse.io/acme").as_deref(),
            Some("https://boards.greenhouse.io/acme")
        );
        assert_eq!(resolve_href(&base(), "   "), None);
        assert_eq!(
            resolve_href(&base(), "abcdefghij€").as_deref(),
            Some("https://acme.io/company/abcdefghij%E2%82%AC")
        );
    }

    #[test]
    fn test_resolve_href_javascript() {
        assert_eq!(
            resolve_href(&base(), "javascript:window.open('/openings')").as_deref(),
            Some("https://acme.io/openings")
        );
        assert_eq!(
            resolve_href(&base(), "javascript:location.href=\"https://jobs.acme.io\"").as_deref(),
            Some("https://jobs.acme.io/")
        );
        assert_eq!(resolve_href(&base(), "javascript:void(0)"), None);
    }

    #[test]
    fn test_extract_script_url() {
        assert_eq!(
            extract_script_url("window.location = '/jobs/42'").as_deref(),
            Some("/jobs/42")
        );
        assert_eq!(extract_script_url("toggleMenu()"), None);
    }

    #[test]
    fn test_same_host_ignores_www() {
        assert!(same_host("https://www.acme.io/a", "https://acme.io/b"));
        assert!(!same_host("https://acme.io", "https://jobs.lever.co/acme"));
    }

    #[test]
    fn test_rebase_to_host() {
        assert_eq!(
            rebase_to_host(&base(), "https://cdn.other.com/careers/all?x=1").as_deref(),
            Some("https://acme.io/careers/all?x=1")
        );
    }

    #[test]
    fn test_without_fragment() {
        assert_eq!(
            without_fragment("https://acme.io/jobs#open"),
            "https://acme.io/jobs"
        );
    }
}
