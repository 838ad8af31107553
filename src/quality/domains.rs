//! Curated domain knowledge
//!
//! Static tables used before any model is consulted: the elite allow-list
//! (fast-track scores), the auto-reject list, source category keywords,
//! methodological sources and consulting firm priority.
//!
//! Matching works on the parsed host, never on raw substrings of the URL:
//! an entry containing a dot (`europa.eu`, `.gov`) matches the host or any
//! subdomain of it, an entry without a dot (`mckinsey`, `news`) matches a
//! host label, either exactly or, for entries of four or more characters,
//! as part of a label (`news` matches `foxnews.com`).

use url::Url;

use crate::search::canonical::extract_domain;
use crate::types::SourceCategory;

/// Fast-track scores of an allow-listed domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EliteDomain {
    pub domain: &'static str,
    pub reliability: f32,
    pub authenticity: f32,
    /// 1 elite, 2 premium, 3 good
    pub tier: u8,
}

const fn elite(domain: &'static str, reliability: f32, authenticity: f32, tier: u8) -> EliteDomain {
    EliteDomain {
        domain,
        reliability,
        authenticity,
        tier,
    }
}

pub const ELITE_DOMAINS: &[EliteDomain] = &[
    // Strategy consultancies
    elite("mckinsey.com", 9.0, 9.0, 1),
    elite("bcg.com", 9.0, 9.0, 1),
    elite("bain.com", 9.0, 9.0, 1),
    // Big Four
    elite("deloitte.com", 8.0, 9.0, 2),
    elite("pwc.com", 8.0, 9.0, 2),
    elite("ey.com", 8.0, 9.0, 2),
    elite("kpmg.com", 8.0, 9.0, 2),
    // Academia and research
    elite("hbr.org", 9.0, 9.0, 1),
    elite("mit.edu", 9.0, 9.0, 1),
    elite("stanford.edu", 9.0, 9.0, 1),
    elite("harvard.edu", 9.0, 9.0, 1),
    elite("wharton.upenn.edu", 9.0, 9.0, 1),
    elite("insead.edu", 8.0, 9.0, 2),
    elite("lse.ac.uk", 8.0, 9.0, 2),
    // International institutions
    elite("europa.eu", 9.0, 10.0, 1),
    elite("worldbank.org", 9.0, 10.0, 1),
    elite("oecd.org", 9.0, 10.0, 1),
    elite("imf.org", 9.0, 10.0, 1),
    elite("iea.org", 9.0, 10.0, 1),
    elite("un.org", 9.0, 10.0, 1),
    elite("wto.org", 9.0, 10.0, 1),
    // Financial press
    elite("ft.com", 8.0, 9.0, 2),
    elite("bloomberg.com", 8.0, 9.0, 2),
    elite("wsj.com", 8.0, 9.0, 2),
    elite("economist.com", 8.0, 9.0, 2),
    elite("reuters.com", 8.0, 9.0, 2),
    elite("cnbc.com", 7.0, 8.0, 3),
    // Market research
    elite("gartner.com", 8.0, 9.0, 2),
    elite("forrester.com", 8.0, 9.0, 2),
    elite("statista.com", 7.0, 8.0, 3),
    elite("ibisworld.com", 7.0, 8.0, 3),
    elite("euromonitor.com", 8.0, 8.0, 2),
    // Sector bodies and trade press
    elite("ellenmacarthurfoundation.org", 8.0, 9.0, 2),
    elite("wrap.org.uk", 8.0, 9.0, 2),
    elite("packagingeurope.com", 7.0, 8.0, 3),
    elite("packagingdigest.com", 7.0, 8.0, 3),
    elite("plasticstoday.com", 7.0, 8.0, 3),
    elite("recyclingtoday.com", 7.0, 8.0, 3),
    elite("plasticsindustry.org", 7.0, 8.0, 3),
    // Governments and regulators
    elite("epa.gov", 9.0, 10.0, 1),
    elite("gov.uk", 9.0, 10.0, 1),
    elite("boe.es", 9.0, 10.0, 1),
    elite("miteco.gob.es", 9.0, 10.0, 1),
    // Venture intelligence
    elite("crunchbase.com", 7.0, 8.0, 3),
    elite("pitchbook.com", 8.0, 8.0, 2),
    elite("cbinsights.com", 8.0, 8.0, 2),
    elite("dealroom.co", 7.0, 8.0, 3),
];

/// Domains rejected without evaluation. An entry with a path only matches
/// URLs under that path.
pub const AUTO_REJECT: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "pinterest.com",
    "linkedin.com/posts",
    "youtube.com",
    "youtu.be",
    "medium.com/@",
];

const CONSULTING_KEYWORDS: &[&str] = &[
    "mckinsey", "bcg", "bain", "oliverwyman", "accenture", "deloitte", "pwc", "kpmg", "ey",
    "ernst", "strategyand", "rolandberger", "kearney", "atkearney", "booz", "capgemini",
];

const INSTITUTIONAL_KEYWORDS: &[&str] = &[
    ".gov", ".gob.es", "gov.uk", "europa.eu", "oecd.org", "un.org", "worldbank.org", "imf.org",
    "iea.org", "wto.org", "who.int", "eur-lex.europa.eu", "boe.es", "bis.org", "nato.int",
];

const ACADEMIC_KEYWORDS: &[&str] = &[
    ".edu", ".ac.uk", "arxiv.org", "nature.com", "science.org", "ieee.org", "springer.com",
    "elsevier.com", "sciencedirect.com", "wiley.com", "acm.org", "jstor.org",
    "scholar.google.com", "pubmed.ncbi.nlm.nih.gov", "doi.org", "ssrn.com",
];

const GENERAL_MEDIA_KEYWORDS: &[&str] = &[
    "confidencial", "elmundo", "elpais", "abc.es", "lavanguardia", "expansion", "cincodias",
    "publico", "elperiodico", "okdiario", "elespanol", "libertaddigital", "vozpopuli", "news",
    "times", "post", "guardian", "bbc", "cnn", "msnbc", "telegraph", "independent",
];

const METHODOLOGICAL_KEYWORDS: &[&str] = &[
    // International bodies and statistics offices
    "eurostat", "worldbank.org", "imf.org", "oecd.org", "un.org", "wto.org", "iea.org",
    "who.int", "itu.int", "icao.int", "ecb.europa.eu", "bis.org",
    // Government agencies publishing official data
    "defense.gov", "eda.europa.eu", "nato.int", "epa.gov", "fda.gov", "sec.gov", "ftc.gov",
    "eia.gov", "bls.gov", "census.gov",
    // Tier-1 think tanks and research institutes
    "rand.org", "brookings.edu", "csis.org", "chathamhouse.org", "cfr.org", "sipri.org",
    "iiss.org", "piie.com", "carnegieendowment.org", "nber.org", "cepr.org", "bruegel.org",
];

const CONSULTING_HIGH_PRIORITY: &[&str] =
    &["deloitte", "pwc", "kpmg", "ey", "ernst", "mckinsey", "bcg", "bain"];

const CONSULTING_MEDIUM_PRIORITY: &[&str] = &[
    "accenture", "oliverwyman", "rolandberger", "kearney", "atkearney", "booz", "capgemini",
];

/// Host (without `www.`) and path of a URL, lowercased.
fn host_and_path(url: &str) -> Option<(String, String)> {
    let domain = extract_domain(url);
    if domain == "unknown" {
        return None;
    }
    let with_scheme = if url.contains("://") {
        url.trim().to_string()
    } else {
        format!("https://{}", url.trim())
    };
    let path = Url::parse(&with_scheme)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    Some((domain, path))
}

fn host_matches_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn host_matches_keyword(host: &str, keyword: &str) -> bool {
    if keyword.starts_with('.') {
        // TLD-style entries like `.gov` also match `agency.gov.au`
        host.ends_with(keyword) || host.contains(&format!("{}.", keyword))
    } else if keyword.contains('.') {
        host_matches_domain(host, keyword)
    } else {
        host.split('.').any(|label| {
            label == keyword || (keyword.len() >= 4 && label.contains(keyword))
        })
    }
}

fn matches_any(host: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| host_matches_keyword(host, kw))
}

/// Resolve the host to use for matching: the explicit domain when given,
/// otherwise the URL's host.
fn match_host(url: &str, domain: &str) -> Option<String> {
    let domain = domain.trim().to_lowercase();
    if !domain.is_empty() && domain != "unknown" {
        return Some(domain.trim_start_matches("www.").to_string());
    }
    host_and_path(url).map(|(host, _)| host)
}

/// Elite allow-list entry for a URL, if any.
pub fn elite_domain(url: &str) -> Option<&'static EliteDomain> {
    let (host, _) = host_and_path(url)?;
    ELITE_DOMAINS
        .iter()
        .find(|entry| host_matches_domain(&host, entry.domain))
}

pub fn is_elite(url: &str) -> bool {
    elite_domain(url).is_some()
}

/// Matching auto-reject entry for a URL, if any.
pub fn auto_reject_match(url: &str) -> Option<&'static str> {
    let (host, path) = host_and_path(url)?;
    AUTO_REJECT.iter().copied().find(|entry| match entry.split_once('/') {
        Some((domain, prefix)) => {
            host_matches_domain(&host, domain) && path.starts_with(&format!("/{}", prefix))
        }
        None => host_matches_domain(&host, entry),
    })
}

/// Classify a source. First match wins in the order consulting,
/// institutional, academic, general media.
pub fn classify_category(url: &str, domain: &str) -> SourceCategory {
    let Some(host) = match_host(url, domain) else {
        return SourceCategory::Other;
    };

    if matches_any(&host, CONSULTING_KEYWORDS) {
        SourceCategory::Consulting
    } else if matches_any(&host, INSTITUTIONAL_KEYWORDS) {
        SourceCategory::Institutional
    } else if matches_any(&host, ACADEMIC_KEYWORDS) {
        SourceCategory::Academic
    } else if matches_any(&host, GENERAL_MEDIA_KEYWORDS) {
        SourceCategory::GeneralMedia
    } else {
        SourceCategory::Other
    }
}

/// Sources with robust, published methodology (statistics offices,
/// international bodies, tier-1 think tanks).
pub fn is_methodological(url: &str, domain: &str) -> bool {
    let Some(host) = match_host(url, domain) else {
        return false;
    };
    if matches_any(&host, METHODOLOGICAL_KEYWORDS) {
        return true;
    }
    // Sections such as ec.europa.eu/eurostat live under a generic host
    let path = host_and_path(url).map(|(_, p)| p).unwrap_or_default();
    path.split('/').any(|segment| {
        !segment.is_empty()
            && METHODOLOGICAL_KEYWORDS
                .iter()
                .any(|kw| !kw.contains('.') && segment == *kw)
    })
}

/// 2 for Big Four and strategy houses, 1 for other recognised firms, 0 otherwise.
pub fn consulting_priority(url: &str, domain: &str) -> u8 {
    let Some(host) = match_host(url, domain) else {
        return 0;
    };
    if matches_any(&host, CONSULTING_HIGH_PRIORITY) {
        2
    } else if matches_any(&host, CONSULTING_MEDIUM_PRIORITY) {
        1
    } else {
        0
    }
}

/// 1-3 for allow-listed domains, 4 for everything else, 5 for rejected ones.
pub fn domain_tier(url: &str) -> u8 {
    if auto_reject_match(url).is_some() {
        5
    } else {
        elite_domain(url).map(|e| e.tier).unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_elite_lookup() {
        let entry = elite_domain("https://www.mckinsey.com/industries/energy").unwrap();
        assert_eq!(entry.tier, 1);
        assert_eq!(entry.reliability, 9.0);

        let eu = elite_domain("https://ec.europa.eu/eurostat/data").unwrap();
        assert_eq!(eu.domain, "europa.eu");
        assert_eq!(eu.authenticity, 10.0);
    }

    #[test]
    fn test_elite_requires_host_match() {
        assert!(elite_domain("https://journey.com/ey.com").is_none());
        assert!(elite_domain("https://fun.org/report").is_none());
        assert!(elite_domain("https://ey.com/en_gl/insights").is_some());
    }

    #[rstest]
    #[case("https://www.facebook.com/somepage", Some("facebook.com"))]
    #[case("https://m.youtube.com/watch?v=1", Some("youtube.com"))]
    #[case("https://www.linkedin.com/posts/someone_activity", Some("linkedin.com/posts"))]
    #[case("https://www.linkedin.com/pulse/article", None)]
    #[case("https://medium.com/@writer/post", Some("medium.com/@"))]
    #[case("https://medium.com/publication/post", None)]
    #[case("https://oecd.org/report", None)]
    fn test_auto_reject(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(auto_reject_match(url), expected);
    }

    #[rstest]
    #[case("https://www.mckinsey.com/x", SourceCategory::Consulting)]
    #[case("https://www2.deloitte.com/insights", SourceCategory::Consulting)]
    #[case("https://www.epa.gov/recycle", SourceCategory::Institutional)]
    #[case("https://ec.europa.eu/eurostat", SourceCategory::Institutional)]
    #[case("https://data.gov.uk/dataset", SourceCategory::Institutional)]
    #[case("https://arxiv.org/abs/2401.00001", SourceCategory::Academic)]
    #[case("https://www.cam.ac.uk/research", SourceCategory::Academic)]
    #[case("https://www.bbc.co.uk/news/business", SourceCategory::GeneralMedia)]
    #[case("https://www.nytimes.com/2024/01/01/x.html", SourceCategory::GeneralMedia)]
    #[case("https://www.survey-tools.io/post", SourceCategory::Other)]
    #[case("https://example.com", SourceCategory::Other)]
    fn test_classify_category(#[case] url: &str, #[case] expected: SourceCategory) {
        assert_eq!(classify_category(url, ""), expected);
    }

    #[test]
    fn test_classify_uses_explicit_domain() {
        assert_eq!(
            classify_category("not-a-url", "www.kpmg.com"),
            SourceCategory::Consulting
        );
    }

    #[test]
    fn test_methodological_and_priority() {
        assert!(is_methodological("https://ec.europa.eu/eurostat/web", ""));
        assert!(is_methodological("https://www.rand.org/pubs.html", ""));
        assert!(!is_methodological("https://www.brandwatch.com", ""));

        assert_eq!(consulting_priority("https://www.bcg.com/x", ""), 2);
        assert_eq!(consulting_priority("https://www.accenture.com/x", ""), 1);
        assert_eq!(consulting_priority("https://smallstrategyfirm.com", ""), 0);
    }

    #[test]
    fn test_domain_tier() {
        assert_eq!(domain_tier("https://www.oecd.org/"), 1);
        assert_eq!(domain_tier("https://www.statista.com/"), 3);
        assert_eq!(domain_tier("https://random-blog.net/"), 4);
        assert_eq!(domain_tier("https://tiktok.com/@user"), 5);
    }
}
