//! Reference section extraction
//!
//! Splits a drafted chapter into its body and its trailing reference list,
//! then parses the numbered entries of that list.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::search::canonical::{canonicalize_url, title_from_url};

/// One entry of a chapter's local reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Number used by in-text citations of this chapter
    pub local_number: u32,
    pub title: String,
    pub url: String,
    /// Empty when the URL cannot be canonicalized
    pub canonical_url: String,
}

impl Reference {
    pub fn new(local_number: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            local_number,
            title: title.into(),
            canonical_url: canonicalize_url(&url),
            url,
        }
    }
}

const GENERIC_TITLES: &[&str] = &[
    "",
    "n/a",
    "na",
    "untitled",
    "no title",
    "sin título",
    "sin titulo",
    "unidentified source",
    "fuente sin identificar",
];

/// Whether a title carries no information about the source.
pub fn is_generic_title(title: &str) -> bool {
    let normalized = title.trim().to_lowercase();
    GENERIC_TITLES.contains(&normalized.as_str())
}

struct SectionHeading {
    pattern: Regex,
    /// Marks the start of whatever follows the section
    terminators: &'static [&'static str],
}

static SECTION_HEADINGS: LazyLock<Vec<SectionHeading>> = LazyLock::new(|| {
    [
        (r"(?im)^[ \t]*##[ \t]*References[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*##[ \t]*Referencias[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*##[ \t]*Fuentes[ \t]+Consultadas[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*##[ \t]*Fuentes[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*##[ \t]*Sources[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*##[ \t]*Bibliography[ \t]*$", &["\n##"][..]),
        (r"(?im)^[ \t]*\*\*References\*\*[ \t]*$", &["\n##", "\n**"][..]),
    ]
    .into_iter()
    .map(|(pattern, terminators)| SectionHeading {
        pattern: Regex::new(pattern).expect("valid heading pattern"),
        terminators,
    })
    .collect()
});

static TITLED_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\][ \t]*([^\n]+?)(?:[ \t]*[-–—][ \t]*|[ \t]+)(https?://[^\s)]+)")
        .expect("valid entry pattern")
});

static BARE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\][ \t]*(https?://[^\s)]+)").expect("valid entry pattern")
});

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[(\d+)\]").expect("valid line pattern"));

static FORMAT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[(PDF|HTML|DOC|LINK)\]\s*").expect("valid prefix pattern"));

/// Split `text` into its body and the content of its reference section.
///
/// Headings are tried in a fixed order and the first spelling found wins.
/// Anything after the section (the next `##` heading onward) stays in the
/// body. Without a recognizable heading the whole text is the body.
pub fn split_reference_section(text: &str) -> (String, Option<String>) {
    for heading in SECTION_HEADINGS.iter() {
        let Some(found) = heading.pattern.find(text) else {
            continue;
        };

        let rest = &text[found.end()..];
        let section_len = heading
            .terminators
            .iter()
            .filter_map(|t| rest.find(t))
            .min()
            .unwrap_or(rest.len());

        let section = rest[..section_len].trim().to_string();
        let trailing = rest[section_len..].trim();

        let mut body = text[..found.start()].trim_end().to_string();
        if !trailing.is_empty() {
            body.push_str("\n\n");
            body.push_str(trailing);
        }
        return (body, Some(section));
    }
    (text.to_string(), None)
}

fn clean_url(raw: &str) -> String {
    raw.trim().trim_end_matches(['.', ',', ';', ')']).to_string()
}

fn clean_title(raw: &str) -> String {
    let without_prefix = FORMAT_PREFIX.replace(raw.trim(), "");
    without_prefix
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—'))
        .to_string()
}

/// Parse the numbered entries of a reference section.
///
/// Accepts `[N] Title - URL`, `[N] Title URL` and `[N] URL`. The first entry
/// carrying a given number wins. Entries without a URL are skipped. Generic
/// or missing titles are replaced by one synthesized from the URL.
pub fn parse_reference_entries(section: &str) -> Vec<Reference> {
    let mut found: Vec<(usize, u32, String, String)> = Vec::new();
    let mut claimed: HashSet<usize> = HashSet::new();

    for caps in TITLED_ENTRY.captures_iter(section) {
        let (Some(whole), Some(num), Some(title), Some(url)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let Ok(number) = num.as_str().parse::<u32>() else {
            continue;
        };
        claimed.insert(whole.start());
        found.push((whole.start(), number, clean_title(title.as_str()), clean_url(url.as_str())));
    }

    for caps in BARE_ENTRY.captures_iter(section) {
        let (Some(whole), Some(num), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if claimed.contains(&whole.start()) {
            continue;
        }
        let Ok(number) = num.as_str().parse::<u32>() else {
            continue;
        };
        found.push((whole.start(), number, String::new(), clean_url(url.as_str())));
    }

    found.sort_by_key(|(position, ..)| *position);

    let mut seen_numbers = HashSet::new();
    let mut references = Vec::with_capacity(found.len());
    for (_, number, title, url) in found {
        if !seen_numbers.insert(number) {
            debug!("Ignoring repeated reference number [{}]", number);
            continue;
        }
        let title = if is_generic_title(&title) {
            title_from_url(&url)
        } else {
            title
        };
        references.push(Reference::new(number, title, url));
    }

    for caps in NUMBERED_LINE.captures_iter(section) {
        let parsed = caps.get(1).and_then(|n| n.as_str().parse::<u32>().ok());
        if let Some(number) = parsed {
            if !seen_numbers.contains(&number) {
                warn!("Reference [{}] has no usable URL, skipping it", number);
            }
        }
    }

    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("## References")]
    #[case("## Referencias")]
    #[case("## Fuentes Consultadas")]
    #[case("## Fuentes")]
    #[case("## Sources")]
    #[case("## Bibliography")]
    #[case("**References**")]
    fn test_split_recognizes_headings(#[case] heading: &str) {
        let text = format!("Body cites [1].\n\n{}\n\n[1] Title - https://a.com/x\n", heading);
        let (body, section) = split_reference_section(&text);
        assert_eq!(body, "Body cites [1].");
        assert_eq!(section.as_deref(), Some("[1] Title - https://a.com/x"));
    }

    #[test]
    fn test_split_keeps_trailing_sections_in_body() {
        let text = "Intro [1]\n\n## References\n[1] https://a.com/x\n\n## Appendix\nMore text";
        let (body, section) = split_reference_section(text);
        assert_eq!(section.as_deref(), Some("[1] https://a.com/x"));
        assert_eq!(body, "Intro [1]\n\n## Appendix\nMore text");
    }

    #[test]
    fn test_split_without_section() {
        let (body, section) = split_reference_section("Just text [3].");
        assert_eq!(body, "Just text [3].");
        assert!(section.is_none());
    }

    #[test]
    fn test_parse_entry_shapes() {
        let section = "[1] IEA Outlook 2024 - https://www.iea.org/reports/outlook-2024\n\
                       [2] Plain title https://example.com/study.\n\
                       [3] https://worldbank.org/en/topic/energy-transition\n\
                       [4] [PDF] Annual report - https://sec.gov/annual-report.pdf)";
        let refs = parse_reference_entries(section);
        assert_eq!(refs.len(), 4);

        assert_eq!(refs[0].local_number, 1);
        assert_eq!(refs[0].title, "IEA Outlook 2024");
        assert_eq!(refs[0].canonical_url, "https://iea.org/reports/outlook-2024");

        assert_eq!(refs[1].title, "Plain title");
        assert_eq!(refs[1].url, "https://example.com/study");

        assert_eq!(refs[2].title, "Energy Transition - Worldbank");
        assert_eq!(refs[3].title, "Annual report");
        assert_eq!(refs[3].url, "https://sec.gov/annual-report.pdf");
    }

    #[test]
    fn test_parse_first_number_wins_and_generic_titles_replaced() {
        let section = "[1] N/A - https://example.com/market-outlook\n\
                       [1] Other - https://other.com/page\n\
                       [2] Missing url entirely";
        let refs = parse_reference_entries(section);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "https://example.com/market-outlook");
        assert_eq!(refs[0].title, "Market Outlook - Example");
    }

    #[rstest]
    #[case("n/a", true)]
    #[case("  Untitled ", true)]
    #[case("Sin título", true)]
    #[case("", true)]
    #[case("World Energy Outlook", false)]
    fn test_generic_titles(#[case] title: &str, #[case] expected: bool) {
        assert_eq!(is_generic_title(title), expected);
    }
}
