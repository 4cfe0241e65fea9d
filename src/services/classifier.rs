// src/services/classifier.rs

//! Job link classification.
//!
//! Everything here is a pure function of its input text and URL, driven by
//! static keyword and regex tables.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::{Classification, ClassifiedJob, JobLink};

/// Shorter trimmed text is always noise.
pub const MIN_TEXT_CHARS: usize = 3;

/// Score at which a generically harvested link counts as a job.
pub const JOB_SCORE_THRESHOLD: i32 = 2;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded regex pattern is valid")
}

/// Boilerplate calls to action, noise anywhere in the text.
static NOISE_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)
        \b(
            (forgot|reset)\s+(your\s+)?password |
            terms\s+(of|and)\s+(use|service|conditions) |
            cookie\s*(policy|settings|preferences|consent) |
            (request|book|schedule|get)\s+a\s+demo | start\s+(a\s+)?free\s+trial |
            all\s+rights\s+reserved |
            skip\s+to\s+(main\s+)?content | back\s+to\s+top |
            read\s+(more|the\s+story) | learn\s+more
        )\b",
    )
});

/// Auth, account, privacy and subscription links. These words also occur in
/// real titles ("Privacy Engineer"), so they only count without a role word.
static NOISE_TOPICS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)
        \b(
            sign[\s-]?(in|up|out) | log[\s-]?(in|out) |
            (create|open|manage|delete|my|your)\s+(an?\s+)?account |
            privacy(\s+policy|\s+notice)? | subscribe | newsletter
        )\b",
    )
});

/// Marketing and navigation sections when they are the whole link text.
static NOISE_SECTIONS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)
        ^\s*(
            home | about(\s+us)? | blog | news(room)? | press | events? | webinars? |
            contact(\s+us)? | pricing | plans | faq | help(\s+cent(er|re))? | support |
            legal | terms | security | status | docs | documentation | resources |
            customers | case\s+studies | partners | company | team | our\s+team |
            culture | values | benefits | perks | careers | jobs | menu | close |
            search | english | language | share | next | previous | prev | apply(\s+now)?
        )\s*$",
    )
});

/// Non-navigable schemes and non-job path sections.
static NOISE_URL: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)
        ^(mailto|tel|sms|javascript): |
        /(login|log-in|signin|sign-in|signup|sign-up|register|auth|oauth|account|
          privacy(-policy)?|terms(-of-service|-of-use)?|cookies?(-policy)?|legal|gdpr|
          blog|press|news|newsroom|events|webinars?|pricing|contact(-us)?|cdn-cgi)
        (/|$|[?\#])",
    )
});

/// Unambiguous engineering role titles.
static ENGINEERING_ROLE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(engineer(s|ing)?|developer|programmer|architect|scientist|sre|sdet|swe|devops|devsecops|mlops)\b",
    )
});

/// Technology and platform vocabulary that suggests an engineering role.
static ENGINEERING_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)\b(
            back[\s-]?end | front[\s-]?end | full[\s-]?stack | software | platform |
            infrastructure | infra | cloud | site\s+reliability | machine\s+learning | ml |
            android | ios | mobile | embedded | firmware | qa | test\s+automation |
            rust | golang | python | java | javascript | typescript | react | node(\.js)? |
            kotlin | swift | ruby | rails | kubernetes | aws | gcp | azure | sql
        )\b",
    )
});

/// Non-engineering roles that outweigh the broad keywords.
static EXCLUDED_ROLES: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)\b(
            manager | management | sales | recruiter | recruiting | talent | account\s+executive |
            marketing | hr | people\s+(ops|operations|partner) | finance | accountant | legal |
            counsel | customer\s+success | support | operations | designer |
            business\s+development | partnerships? | office | administrator | assistant |
            coordinator
        )\b",
    )
});

/// Words that make anchor text look like a posting rather than navigation.
static JOB_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?ix)\b(
            engineer(s|ing)? | developer | programmer | architect | scientist | designer |
            manager | director | head\s+of | vp | lead | analyst | specialist | intern(ship)? |
            associate | consultant | coordinator | representative | executive | administrator |
            technician | officer | recruiter | writer | editor | counsel | accountant |
            researcher | strategist | advocate | sre | devops | marketing | sales | support |
            operations | product | success | partner | principal | staff | senior | junior
        )\b",
    )
});

const JOB_URL_PATTERNS: &[&str] = &[
    "/job/", "/jobs/", "/career/", "/careers/", "/position/", "/positions/", "/opening/",
    "/openings/", "/role/", "/roles/", "/vacancy/", "/vacancies/", "/apply/", "/opportunity/",
    "/opportunities/", "greenhouse.io", "lever.co", "workday.com", "ashbyhq.com", "boards.io",
    "bamboohr.com", "recruitee.com", "workable.com", "smartrecruiters.com", "icims.com",
    "jobvite.com",
];

const JOB_TITLE_KEYWORDS: &[&str] = &[
    "engineer", "developer", "designer", "manager", "director", "analyst", "specialist",
    "coordinator", "lead", "senior", "junior", "intern", "associate", "consultant", "architect",
    "scientist", "researcher", "product", "marketing", "sales", "remote", "full-time",
    "part-time", "contract", "hybrid",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "blog", "article", "news", "press", "team", "about", "culture", "values", "benefits", "perks",
];

/// Domains whose links are never job postings.
pub const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com", "twitter.com", "x.com", "linkedin.com", "instagram.com", "youtube.com",
    "tiktok.com", "github.com", "pinterest.com", "reddit.com", "discord.com", "medium.com",
    "whatsapp.com", "telegram.org",
];

const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".pdf", ".doc", ".docx", ".zip",
    ".mp4", ".mp3", ".css", ".js", ".woff", ".woff2", ".ttf",
];

const GENERIC_URL_NOISE: &[&str] = &[
    "javascript:", "mailto:", "tel:", "sms:", "/cdn-cgi/", "/static/", "/assets/", "/images/",
    "/img/", "/fonts/", "/css/", "/js/", "/media/", "privacy", "terms", "cookie", "legal",
    "policy", "login", "signin", "signup", "register", "auth", "contact", "about-us", "blog",
    "news", "press", "faq", "help", "support",
];

/// Query keys that mark listing controls rather than postings.
const LISTING_PARAMS: &[&str] = &[
    "page", "p", "spage", "paged", "_page", "pagenum", "pagenumber", "offset", "start", "sort",
    "order", "orderby", "filter", "filters", "department", "departments", "location",
    "locations", "team", "teams", "category", "categories", "q", "query", "search", "keyword",
    "keywords",
];

const FILTER_FRAGMENT_HINTS: &[&str] = &[
    "=", "filter", "page", "department", "location", "team", "category", "sort",
];

/// Noise check over link text and URL.
pub fn is_noise(text: &str, url: &str) -> bool {
    let text = text.trim();
    if text.chars().count() < MIN_TEXT_CHARS {
        return true;
    }
    NOISE_PHRASES.is_match(text)
        || (NOISE_TOPICS.is_match(text) && !names_role(text))
        || NOISE_SECTIONS.is_match(text)
        || is_noise_url(url)
}

fn names_role(text: &str) -> bool {
    ENGINEERING_ROLE.is_match(text) || JOB_KEYWORDS.is_match(text)
}

fn is_noise_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    if NOISE_URL.is_match(url) {
        return true;
    }
    host_of(url).is_some_and(|host| is_social_host(&host))
}

/// Engineering verdict for text already known not to be noise.
pub fn is_engineering(text: &str) -> bool {
    if ENGINEERING_ROLE.is_match(text) {
        return true;
    }
    ENGINEERING_KEYWORDS.is_match(text) && !EXCLUDED_ROLES.is_match(text)
}

/// Classify a link by its text and URL.
pub fn classify(text: &str, url: &str) -> Classification {
    if is_noise(text, url) {
        Classification::Noise
    } else if is_engineering(text) {
        Classification::Engineering
    } else {
        Classification::Other
    }
}

/// Classify text with no URL context.
pub fn classify_text(text: &str) -> Classification {
    classify(text, "")
}

/// Attach a verdict to a link; noise comes back as `Err` so callers can
/// route it separately.
pub fn classify_link(link: JobLink) -> std::result::Result<ClassifiedJob, JobLink> {
    match classify(&link.text, &link.url) {
        Classification::Noise => Err(link),
        classification => Ok(ClassifiedJob {
            link,
            classification,
        }),
    }
}

/// Text mentions at least one role-like word.
pub fn has_job_keyword(text: &str) -> bool {
    JOB_KEYWORDS.is_match(text)
}

/// URL points at a pagination or filter control of a listing.
pub fn is_listing_control_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let has_listing_param = parsed
        .query_pairs()
        .any(|(k, _)| LISTING_PARAMS.contains(&k.to_lowercase().as_str()));
    if has_listing_param {
        return true;
    }
    parsed.fragment().is_some_and(|fragment| {
        let fragment = fragment.to_lowercase();
        FILTER_FRAGMENT_HINTS.iter().any(|h| fragment.contains(h))
    })
}

/// Relevance score for generic link harvesting.
pub fn job_score(url: &str, text: &str) -> i32 {
    let combined = format!("{} {}", url, text).to_lowercase();
    let count = |patterns: &[&str]| patterns.iter().filter(|p| combined.contains(*p)).count() as i32;

    3 * count(JOB_URL_PATTERNS) + count(JOB_TITLE_KEYWORDS) - count(NEGATIVE_KEYWORDS)
}

pub fn passes_job_score(url: &str, text: &str) -> bool {
    job_score(url, text) >= JOB_SCORE_THRESHOLD
}

/// URL-level filters for generic harvesting: assets, social links, fragments.
pub fn passes_url_filters(url: &str) -> bool {
    if url.starts_with('#') {
        return false;
    }
    let lower = url.to_lowercase();
    if GENERIC_URL_NOISE.iter().any(|p| lower.contains(p)) {
        return false;
    }
    let path = Url::parse(&lower)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| lower.clone());
    if ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    match host_of(url) {
        Some(host) => !is_social_host(&host),
        None => false,
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_lowercase().trim_start_matches("www.").to_string())
}

fn is_social_host(host: &str) -> bool {
    SOCIAL_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_titles() {
        assert_eq!(
            classify_text("Senior Backend Engineer"),
            Classification::Engineering
        );
        assert_eq!(classify_text("Sales Account Manager"), Classification::Other);
        assert_eq!(classify_text("Create Account"), Classification::Noise);
    }

    #[test]
    fn test_short_text_is_noise() {
        for text in ["", "  ", "ab", " QA ", "→"] {
            assert_eq!(classify_text(text), Classification::Noise, "{text:?}");
        }
        assert_ne!(classify_text("SRE"), Classification::Noise);
    }

    #[test]
    fn test_noise_phrases_and_sections() {
        assert!(is_noise("Sign in", ""));
        assert!(is_noise("Privacy Policy", ""));
        assert!(is_noise("Book a demo", ""));
        assert!(is_noise("About us", ""));
        assert!(!is_noise("Customer Support Specialist", ""));
        assert!(!is_noise("Account Executive, EMEA", ""));
    }

    #[test]
    fn test_role_titles_survive_noise_topics() {
        let url = "https://acme.io/jobs/42";
        assert_eq!(classify("Privacy Engineer", url), Classification::Engineering);
        assert_eq!(
            classify("Login Infrastructure Engineer", url),
            Classification::Engineering
        );
        assert_eq!(classify("Senior Privacy Counsel", url), Classification::Other);
        assert_eq!(classify("Newsletter Editor", url), Classification::Other);
        assert_eq!(classify("Create Account", url), Classification::Noise);
        assert_eq!(classify("Subscribe to our newsletter", url), Classification::Noise);
    }

    #[test]
    fn test_noise_urls() {
        assert!(is_noise("Jobs at Acme", "mailto:jobs@acme.io"));
        assert!(is_noise("Senior Engineer", "https://www.linkedin.com/jobs/view/1"));
        assert!(is_noise("Engineering blog", "https://acme.io/blog/scaling"));
        assert!(!is_noise(
            "Platform Engineer",
            "https://boards.greenhouse.io/acme/jobs/123"
        ));
    }

    #[test]
    fn test_exclusion_does_not_veto_role() {
        assert_eq!(
            classify_text("Engineering Manager, Platform"),
            Classification::Engineering
        );
        assert_eq!(
            classify_text("Product Manager, Cloud Platform"),
            Classification::Other
        );
        assert_eq!(
            classify_text("Full-Stack TypeScript Lead"),
            Classification::Engineering
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let inputs = ["Staff Rust Developer", "Office Coordinator", "Log in"];
        for text in inputs {
            assert_eq!(classify_text(text), classify_text(text));
        }
    }

    #[test]
    fn test_classify_link_routes_noise() {
        let noise = classify_link(JobLink::new("https://acme.io/login", "Log in"));
        assert!(noise.is_err());
        let job = classify_link(JobLink::new("https://acme.io/jobs/7", "Data Scientist")).unwrap();
        assert_eq!(job.classification, Classification::Engineering);
    }

    #[test]
    fn test_listing_control_urls() {
        assert!(is_listing_control_url("https://acme.io/jobs?page=2"));
        assert!(is_listing_control_url("https://acme.io/jobs?Department=eng"));
        assert!(is_listing_control_url("https://acme.io/jobs#filter=remote"));
        assert!(!is_listing_control_url(
            "https://boards.greenhouse.io/acme/jobs/123?gh_jid=123"
        ));
        assert!(!is_listing_control_url("https://acme.io/jobs/backend-engineer"));
    }

    #[test]
    fn test_job_score() {
        // ATS host +3, "engineer" +1, "senior" +1
        assert_eq!(
            job_score("https://jobs.lever.co/acme/abc", "Senior Engineer"),
            5
        );
        // blog and culture both count against
        assert_eq!(job_score("https://acme.io/blog/post", "Our culture"), -2);
        assert!(passes_job_score("https://acme.io/careers/42", "Remote"));
        assert!(!passes_job_score("https://acme.io/team", "Meet the team"));
    }

    #[test]
    fn test_passes_url_filters() {
        assert!(passes_url_filters("https://acme.io/careers/backend"));
        assert!(!passes_url_filters("#openings"));
        assert!(!passes_url_filters("https://acme.io/static/logo.png"));
        assert!(!passes_url_filters("https://acme.io/brochure.pdf"));
        assert!(!passes_url_filters("https://twitter.com/acme"));
        assert!(!passes_url_filters("https://acme.io/privacy"));
    }
}
