//! URL canonicalization
//!
//! Every URL that enters the pipeline is reduced to a canonical form that
//! serves as its identity for deduplication and as the evaluation cache key.
//!
//! Rules, applied in order:
//!
//! 1. Trim whitespace
//! 2. Coerce the scheme to `https` (a missing scheme gets `https://`)
//! 3. Strip the fragment
//! 4. Drop tracking query parameters, keep the rest in their original order
//! 5. Strip a leading `www.` from the host
//! 6. Strip trailing slashes
//! 7. Lowercase
//!
//! Invalid or empty input yields an empty string. The function never panics
//! and is idempotent.
//!
//! # Example
//!
//! ```ignore
//! use veritas::search::canonical::canonicalize_url;
//!
//! assert_eq!(
//!     canonicalize_url("http://WWW.Example.com/a/?utm_source=x"),
//!     canonicalize_url("https://example.com/a"),
//! );
//! ```

use url::Url;

/// Query keys that carry campaign or referral tracking only.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_", "cmpid", "source", "medium",
    "campaign",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Prefix `https://` when missing and upgrade plain `http://`.
fn with_https_scheme(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.starts_with("https://") {
        raw.to_string()
    } else if lower.starts_with("http://") {
        format!("https://{}", &raw["http://".len()..])
    } else if raw.contains("://") {
        // Unsupported scheme, let parsing reject it below
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    }
}

fn parse_web_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(&with_https_scheme(trimmed)).ok()?;
    if url.scheme() != "https" {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

/// Canonicalize a URL. Returns `""` for anything that is not a usable web URL.
pub fn canonicalize_url(raw: &str) -> String {
    let Some(mut url) = parse_web_url(raw) else {
        return String::new();
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    if let Some(host) = url.host_str().map(str::to_string) {
        if let Some(stripped) = host.strip_prefix("www.") {
            if !stripped.is_empty() && url.set_host(Some(stripped)).is_err() {
                return String::new();
            }
        }
    }

    url.as_str().trim_end_matches('/').to_lowercase()
}

/// Host of a URL without `www.`, lowercased. `"unknown"` when unparseable.
pub fn extract_domain(raw: &str) -> String {
    parse_web_url(raw)
        .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
        .map(|host| host.trim_start_matches("www.").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

const STRIPPED_EXTENSIONS: &[&str] = &[".html", ".htm", ".pdf", ".php", ".aspx", ".asp"];

fn capitalize_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Synthesize a readable title from a URL's last meaningful path segment.
///
/// `https://www.iea.org/reports/renewables-2023` becomes
/// `"Renewables 2023 - Iea"`; a bare host becomes `"Document from iea.org"`.
pub fn title_from_url(raw: &str) -> String {
    let Some(url) = parse_web_url(raw) else {
        return "Unidentified source".to_string();
    };
    let domain = extract_domain(raw);

    let last_segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| s.chars().count() > 2).last())
        .map(str::to_string);

    if let Some(segment) = last_segment {
        let mut stem = segment.as_str();
        for ext in STRIPPED_EXTENSIONS {
            let cut = stem.len().saturating_sub(ext.len());
            if stem.len() > ext.len()
                && stem.is_char_boundary(cut)
                && stem[cut..].eq_ignore_ascii_case(ext)
            {
                stem = &stem[..cut];
                break;
            }
        }
        let title = capitalize_words(&stem.replace(['-', '_'], " "));
        if title.chars().count() > 5 {
            let label = domain.split('.').next().unwrap_or(domain.as_str());
            return format!("{} - {}", title, capitalize_words(label));
        }
    }

    format!("Document from {}", domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://WWW.Example.com/a/?utm_source=x", "https://example.com/a")]
    #[case("example.com/page#section", "https://example.com/page")]
    #[case("  https://example.com/  ", "https://example.com")]
    #[case(
        "https://site.org/p?id=3&utm_medium=mail&fbclid=abc&lang=en",
        "https://site.org/p?id=3&lang=en"
    )]
    #[case("https://site.org/p?gclid=1&ref=home", "https://site.org/p")]
    #[case("https://www.iea.org/Reports/", "https://iea.org/reports")]
    fn test_canonicalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(canonicalize_url(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("ftp://example.com/file")]
    #[case("https://")]
    fn test_canonicalize_invalid(#[case] input: &str) {
        assert_eq!(canonicalize_url(input), "");
    }

    #[test]
    fn test_canonical_equivalence() {
        assert_eq!(
            canonicalize_url("http://WWW.Example.com/a/?utm_source=x"),
            canonicalize_url("https://example.com/a")
        );
    }

    #[rstest]
    #[case("http://WWW.Example.com/a/?utm_source=x&q=Rust+Lang")]
    #[case("https://example.com/search?q=a%2Fb&page=2#top")]
    #[case("news.site.com/2024/01/story-title/")]
    fn test_canonicalize_idempotent(#[case] input: &str) {
        let once = canonicalize_url(input);
        assert_eq!(canonicalize_url(&once), once);
    }

    #[test]
    fn test_query_order_preserved() {
        assert_eq!(
            canonicalize_url("https://a.com/x?z=1&utm_campaign=c&a=2"),
            "https://a.com/x?z=1&a=2"
        );
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.McKinsey.com/insights"), "mckinsey.com");
        assert_eq!(extract_domain("ec.europa.eu/eurostat"), "ec.europa.eu");
        assert_eq!(extract_domain("not a url at all"), "unknown");
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            title_from_url("https://www.iea.org/reports/renewables-2023"),
            "Renewables 2023 - Iea"
        );
        assert_eq!(
            title_from_url("https://example.com/docs/annual_report.pdf"),
            "Annual Report - Example"
        );
        assert_eq!(title_from_url("https://oecd.org/"), "Document from oecd.org");
        assert_eq!(title_from_url("https://oecd.org/a/b"), "Document from oecd.org");
        assert_eq!(title_from_url(""), "Unidentified source");
    }
}
