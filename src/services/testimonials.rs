// src/services/testimonials.rs

//! "Trusted by" logo discovery on company homepages.
//!
//! First looks for logo images near trust phrases ("trusted by", "our
//! customers", ...). If none are found, falls back to images inside
//! slider and carousel containers.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::browser::{Element, NavigateOptions, Page};
use crate::error::{AppError, Result};

const TRUST_KEYWORDS: &[&str] = &[
    "trusted by",
    "powered by",
    "our customers",
    "integrated by",
    "used by",
    "loved by",
    "works with",
    "supported platforms",
];

const SLIDER_HINTS: &[&str] = &["slider", "carousel", "swiper", "slick", "marquee", "infinite"];

const BAD_URL_HINTS: &[&str] = &[
    "sanity.io",
    "wistia",
    "dashboard",
    "screenshot",
    "thumbnail",
    "hero",
    "banner",
    "background",
    "mockup",
    "platform",
    "feature",
    "overview",
    "blur(",
    "quality(0)",
    "data:image",
];

const ICON_HINTS: &[&str] = &[
    "icon",
    "integrate",
    "verify",
    "locate",
    "enrich",
    "engage",
    "analyze",
    "connect",
    "build",
    "manage",
    "secure",
];

const BLOCKED_TITLES: &[&str] = &["access denied", "blocked", "forbidden"];

/// Trust labels longer than this are body copy, not a section heading.
const MAX_LABEL_CHARS: usize = 200;

/// Ancestor levels searched above a trust label.
const MAX_REGION_DEPTH: usize = 3;

const TEXT_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, span, strong, em, div, li";

const LAZY_SCROLL_SCRIPT: &str = r#"
    () => new Promise(resolve => {
        let n = 0;
        const t = setInterval(() => {
            window.scrollBy(0, 500);
            if (++n >= 5) { clearInterval(t); window.scrollTo(0, 0); setTimeout(() => resolve(true), 500); }
        }, 200);
    })
"#;

/// Which heuristic found the logos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoPhase {
    Semantic,
    Slider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoScan {
    pub phase: LogoPhase,
    pub images: Vec<String>,
}

/// A logo-like visual with the document path used for region tests.
struct Visual {
    path: Vec<usize>,
    url: String,
}

pub struct TestimonialScanner {
    nav: NavigateOptions,
}

impl TestimonialScanner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            nav: NavigateOptions::with_timeout(timeout),
        }
    }

    /// Load `company_url` and collect customer-logo image URLs.
    ///
    /// `Ok(None)` covers blocked pages and pages without a logo cluster.
    pub async fn scan_company(
        &self,
        page: &mut dyn Page,
        company_url: &str,
    ) -> Result<Option<LogoScan>> {
        let target = if company_url.starts_with("http://") || company_url.starts_with("https://")
        {
            company_url.to_string()
        } else {
            format!("https://{company_url}")
        };

        let response = page.navigate(&target, &self.nav).await?;
        if matches!(response.status, 401 | 403) {
            log::warn!("Access denied ({}) for {}", response.status, target);
            return Ok(None);
        }
        if !response.is_success() {
            return Err(AppError::navigation(
                &target,
                format!("homepage returned {}", response.status),
            ));
        }

        if let Err(e) = page.evaluate(LAZY_SCROLL_SCRIPT).await {
            log::debug!("Lazy-load scroll skipped on {}: {}", target, e);
        }

        let title = page.title().await.unwrap_or_default().to_lowercase();
        if BLOCKED_TITLES.iter().any(|b| title.contains(b)) {
            log::warn!("Page blocked for {}: '{}'", target, title);
            return Ok(None);
        }

        let base = Url::parse(page.url())?;
        let visuals = self.visuals(&*page, &base).await?;
        if visuals.is_empty() {
            return Ok(None);
        }

        let labels = trust_labels(page.locate(TEXT_SELECTOR).await?);
        let semantic = semantic_images(&labels, &visuals);
        if !semantic.is_empty() {
            return Ok(Some(LogoScan {
                phase: LogoPhase::Semantic,
                images: semantic,
            }));
        }

        let sliders: Vec<Element> = page
            .locate("[class]")
            .await?
            .into_iter()
            .filter(|el| {
                let class = el.attr("class").unwrap_or_default().to_lowercase();
                SLIDER_HINTS.iter().any(|h| class.contains(h))
            })
            .collect();
        let slider = images_within(&sliders, &visuals);
        if !slider.is_empty() {
            return Ok(Some(LogoScan {
                phase: LogoPhase::Slider,
                images: slider,
            }));
        }

        Ok(None)
    }

    async fn visuals(&self, page: &dyn Page, base: &Url) -> Result<Vec<Visual>> {
        let mut visuals = Vec::new();

        for img in page.locate("img").await? {
            if in_header_footer_nav(&img) || !looks_like_logo_size(&img) {
                continue;
            }
            let Some(src) = image_source(&img) else {
                continue;
            };
            let src = unwrap_next_image(base, &src);
            if is_noise_url(&src) || is_feature_icon(&src) {
                continue;
            }
            if let Some(url) = to_absolute_url(base, &src) {
                visuals.push(Visual {
                    path: img.path,
                    url,
                });
            }
        }

        for usage in page.locate("svg use").await? {
            let Some(svg) = usage.ancestors.iter().position(|a| a.tag == "svg") else {
                continue;
            };
            if in_header_footer_nav(&usage) || !svg_looks_like_logo(&usage.ancestors[svg].attrs) {
                continue;
            }
            let Some(href) = usage
                .attr("href")
                .or_else(|| usage.attr("xlink:href"))
                .filter(|h| !h.is_empty())
            else {
                continue;
            };
            if is_noise_url(href) || is_feature_icon(href) {
                continue;
            }
            if let Some(url) = to_absolute_url(base, href) {
                let mut path = usage.path.clone();
                path.truncate(path.len().saturating_sub(svg + 1));
                visuals.push(Visual { path, url });
            }
        }

        Ok(visuals)
    }
}

/// Innermost short elements mentioning a trust phrase.
fn trust_labels(elements: Vec<Element>) -> Vec<Element> {
    let matching: Vec<Element> = elements
        .into_iter()
        .filter(|el| {
            let text = el.text.to_lowercase();
            text.chars().count() <= MAX_LABEL_CHARS && TRUST_KEYWORDS.iter().any(|k| text.contains(k))
        })
        .filter(|el| !in_header_footer_nav(el))
        .collect();

    matching
        .iter()
        .filter(|el| {
            !matching
                .iter()
                .any(|other| other.path != el.path && el.contains(other))
        })
        .cloned()
        .collect()
}

/// Images in the nearest ancestor region (up to three levels) of each label.
fn semantic_images(labels: &[Element], visuals: &[Visual]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for label in labels {
        for depth in 1..=MAX_REGION_DEPTH {
            if label.path.len() <= depth {
                break;
            }
            let region = &label.path[..label.path.len() - depth];
            let found: Vec<&Visual> = visuals.iter().filter(|v| v.path.starts_with(region)).collect();
            if found.is_empty() {
                continue;
            }
            for visual in found {
                if seen.insert(visual.url.clone()) {
                    images.push(visual.url.clone());
                }
            }
            break;
        }
    }
    images
}

fn images_within(containers: &[Element], visuals: &[Visual]) -> Vec<String> {
    let mut seen = HashSet::new();
    visuals
        .iter()
        .filter(|v| containers.iter().any(|c| v.path.starts_with(&c.path)))
        .filter(|v| seen.insert(v.url.clone()))
        .map(|v| v.url.clone())
        .collect()
}

fn in_header_footer_nav(el: &Element) -> bool {
    el.ancestors.iter().any(|a| {
        matches!(a.tag.as_str(), "header" | "footer" | "nav") || {
            let hints = a.id_and_class();
            hints.contains("header") || hints.contains("footer") || hints.contains("nav")
        }
    })
}

fn image_source(img: &Element) -> Option<String> {
    ["src", "data-src", "data-lazy-src"]
        .iter()
        .filter_map(|attr| img.attr(attr))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let srcset = img.attr("srcset")?;
            let first = srcset.split(',').next()?.split_whitespace().next()?;
            Some(first.to_string())
        })
}

fn parse_dimension(value: Option<&str>) -> Option<f64> {
    value?.trim().trim_end_matches("px").parse().ok()
}

fn size_ok(width: f64, height: f64) -> bool {
    if width <= 0.0 || height <= 0.0 || width < 48.0 || height < 20.0 {
        return false;
    }
    let ratio = width / height;
    if !(0.25..=6.0).contains(&ratio) {
        return false;
    }
    !(width > 700.0 && height > 500.0)
}

/// Size check from declared dimensions; undeclared sizes pass.
fn looks_like_logo_size(el: &Element) -> bool {
    match (parse_dimension(el.attr("width")), parse_dimension(el.attr("height"))) {
        (Some(w), Some(h)) => size_ok(w, h),
        _ => true,
    }
}

fn svg_looks_like_logo(attrs: &std::collections::BTreeMap<String, String>) -> bool {
    let get = |k: &str| parse_dimension(attrs.get(k).map(String::as_str));
    match (get("width"), get("height")) {
        (Some(w), Some(h)) => size_ok(w, h),
        _ => true,
    }
}

fn is_noise_url(src: &str) -> bool {
    let lower = src.to_lowercase();
    BAD_URL_HINTS.iter().any(|h| lower.contains(h))
}

fn is_feature_icon(src: &str) -> bool {
    let lower = src.to_lowercase();
    ICON_HINTS.iter().any(|h| lower.contains(h))
}

/// Recover the original asset from a Next.js image optimizer URL.
fn unwrap_next_image(base: &Url, src: &str) -> String {
    if !src.contains("/_next/image") {
        return src.to_string();
    }
    base.join(src)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "url")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| src.to_string())
}

fn to_absolute_url(base: &Url, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    base.join(src).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Browser;
    use crate::browser::fake::FakeBrowser;

    const HOME: &str = "https://acme.io/";

    async fn scan(browser: &FakeBrowser) -> Result<Option<LogoScan>> {
        let mut page = browser.new_page().await.unwrap();
        TestimonialScanner::new(Duration::from_secs(5))
            .scan_company(page.as_mut(), "acme.io")
            .await
    }

    #[tokio::test]
    async fn test_semantic_logos_near_trust_label() {
        let html = r#"<html><head><title>Acme</title></head><body>
            <header><img src="/logo.png" width="120" height="40"></header>
            <section class="hero-section"><img src="/img/hero-shot.png" width="1200" height="800"></section>
            <section>
              <div class="heading"><h2>Trusted by the best teams</h2></div>
              <div class="logos">
                <img src="/logos/stripe.png" width="120" height="40">
                <img src="/_next/image?url=%2Flogos%2Ffigma.png&w=256&q=75" width="120" height="40">
                <img src="/logos/tiny.png" width="16" height="16">
                <img src="/icons/connect-icon.png" width="64" height="64">
                <img src="data:image/png;base64,AAAA">
                <svg width="100" height="30"><use href="/sprite.svg#linear"></use></svg>
              </div>
            </section>
            <footer><img src="/logos/footer-badge.png"></footer>
        </body></html>"#;
        let browser = FakeBrowser::new().page(HOME, html);

        let found = scan(&browser).await.unwrap().unwrap();

        assert_eq!(found.phase, LogoPhase::Semantic);
        assert_eq!(
            found.images,
            vec![
                "https://acme.io/logos/stripe.png",
                "https://acme.io/logos/figma.png",
                "https://acme.io/sprite.svg#linear",
            ]
        );
    }

    #[tokio::test]
    async fn test_slider_fallback() {
        let html = r#"<body><main>
            <div class="swiper-wrapper">
              <img src="https://cdn.acme.io/customers/notion.png">
              <img src="https://cdn.acme.io/customers/vercel.png">
            </div>
            <img src="https://cdn.acme.io/team/photo.jpg">
        </main></body>"#;
        let browser = FakeBrowser::new().page(HOME, html);

        let found = scan(&browser).await.unwrap().unwrap();

        assert_eq!(found.phase, LogoPhase::Slider);
        assert_eq!(found.images.len(), 2);
    }

    #[tokio::test]
    async fn test_blocked_pages_yield_nothing() {
        let denied = FakeBrowser::new().status_page(HOME, 403, "<h1>Forbidden</h1>");
        assert_eq!(scan(&denied).await.unwrap(), None);

        let titled = FakeBrowser::new().page(
            HOME,
            "<html><head><title>Access Denied</title></head><body><img src='/a.png'></body></html>",
        );
        assert_eq!(scan(&titled).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_homepage_is_error() {
        let browser = FakeBrowser::new();
        assert!(scan(&browser).await.is_err());
    }

    #[test]
    fn test_size_heuristic() {
        assert!(size_ok(120.0, 40.0));
        assert!(!size_ok(40.0, 40.0));
        assert!(!size_ok(400.0, 30.0));
        assert!(!size_ok(900.0, 600.0));
    }

    #[test]
    fn test_unwrap_next_image() {
        let base = Url::parse("https://acme.io/").unwrap();
        assert_eq!(
            unwrap_next_image(&base, "/_next/image?url=https%3A%2F%2Fcdn.x.com%2Fa.png&w=64"),
            "https://cdn.x.com/a.png"
        );
        assert_eq!(unwrap_next_image(&base, "/a.png"), "/a.png");
    }
}
