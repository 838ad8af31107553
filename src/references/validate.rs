//! Reference list rendering and validation
//!
//! Validation works on finished markdown so it can audit documents that were
//! consolidated elsewhere. It never fails: every problem found is reported
//! for manual review.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::consolidate::{cited_numbers, unresolved_markers, GlobalReference};
use super::extract::{is_generic_title, split_reference_section};
use crate::search::canonical::canonicalize_url;
use crate::types::AppError;

/// Layout of reference list entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStyle {
    /// `[N] Title - URL`
    #[default]
    Ieee,
    /// `[N] Title. Available at: URL`
    Generic,
}

impl ReferenceStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceStyle::Ieee => "ieee",
            ReferenceStyle::Generic => "generic",
        }
    }
}

impl fmt::Display for ReferenceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceStyle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ieee" => Ok(ReferenceStyle::Ieee),
            "generic" | "plain" => Ok(ReferenceStyle::Generic),
            other => Err(AppError::InvalidInput(format!(
                "unknown reference style '{}' (expected ieee or generic)",
                other
            ))),
        }
    }
}

/// Render a `## References` section.
pub fn render_reference_section(references: &[GlobalReference], style: ReferenceStyle) -> String {
    if references.is_empty() {
        return "## References\n\n_No references found._\n".to_string();
    }

    let mut section = String::from("## References\n\n");
    for reference in references {
        let line = match style {
            ReferenceStyle::Ieee => {
                format!("[{}] {} - {}", reference.number, reference.title, reference.url)
            }
            ReferenceStyle::Generic => format!(
                "[{}] {}. Available at: {}",
                reference.number,
                reference.title.trim_end_matches('.'),
                reference.url
            ),
        };
        section.push_str(&line);
        section.push_str("\n\n");
    }
    section
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKind {
    Url,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReference {
    pub number: u32,
    pub kind: DuplicateKind,
    pub url: String,
}

/// Problems found in a document's references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceValidation {
    pub total: usize,
    pub valid: usize,
    /// Entries without a meaningful title
    pub untitled: Vec<u32>,
    pub duplicates: Vec<DuplicateReference>,
    /// Listed but never cited
    pub orphans: Vec<u32>,
    /// Cited but never listed, plus the local numbers of `[?k]` markers
    /// left by consolidation
    pub phantoms: Vec<u32>,
    /// No reference section was found
    pub missing_section: bool,
}

impl ReferenceValidation {
    pub fn is_clean(&self) -> bool {
        !self.missing_section
            && self.untitled.is_empty()
            && self.duplicates.is_empty()
            && self.orphans.is_empty()
            && self.phantoms.is_empty()
    }
}

static LISTED_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\[(\d+)\][ \t]*([^\n]*?)[ \t]*(https?://[^\s)]+)")
        .expect("valid entry pattern")
});

/// Title as written, without the separator that precedes the URL.
fn listed_title(raw: &str) -> &str {
    let title = raw.trim();
    let title = title
        .strip_suffix("Available at:")
        .or_else(|| title.strip_suffix("Disponible en:"))
        .unwrap_or(title);
    title.trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | '–' | '—' | '.' | ',')
    })
}

/// Audit the references of a finished document.
pub fn validate_references(document: &str) -> ReferenceValidation {
    let (body, section) = split_reference_section(document);
    let Some(section) = section else {
        return ReferenceValidation {
            missing_section: true,
            phantoms: cited_numbers(&body)
                .union(&unresolved_markers(&body))
                .copied()
                .collect(),
            ..ReferenceValidation::default()
        };
    };

    let mut report = ReferenceValidation::default();
    let mut seen_urls = HashSet::new();
    let mut seen_numbers = HashSet::new();
    let mut listed = BTreeSet::new();
    let mut url_duplicates = 0;

    for caps in LISTED_ENTRY.captures_iter(&section) {
        let Some(number) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let title = caps.get(2).map(|m| listed_title(m.as_str())).unwrap_or("");
        let url = caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string();
        report.total += 1;
        listed.insert(number);

        if is_generic_title(title) {
            report.untitled.push(number);
        }
        if !seen_urls.insert(canonicalize_url(&url)) {
            url_duplicates += 1;
            report.duplicates.push(DuplicateReference {
                number,
                kind: DuplicateKind::Url,
                url: url.clone(),
            });
        }
        if !seen_numbers.insert(number) {
            report.duplicates.push(DuplicateReference {
                number,
                kind: DuplicateKind::Number,
                url,
            });
        }
    }

    let cited = cited_numbers(&body);
    report.orphans = listed.difference(&cited).copied().collect();
    let mut phantoms: BTreeSet<u32> = cited.difference(&listed).copied().collect();
    phantoms.extend(unresolved_markers(&body));
    report.phantoms = phantoms.into_iter().collect();
    report.valid = report
        .total
        .saturating_sub(report.untitled.len() + url_duplicates);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_styles() {
        let refs = vec![
            GlobalReference::new(1, "Outlook", "https://iea.org/weo"),
            GlobalReference::new(2, "Data.", "https://b.org/d"),
        ];
        let ieee = render_reference_section(&refs, ReferenceStyle::Ieee);
        assert!(ieee.starts_with("## References\n\n"));
        assert!(ieee.contains("[1] Outlook - https://iea.org/weo\n"));

        let generic = render_reference_section(&refs, ReferenceStyle::Generic);
        assert!(generic.contains("[2] Data. Available at: https://b.org/d"));
    }

    #[test]
    fn test_render_empty() {
        assert!(render_reference_section(&[], ReferenceStyle::Ieee).contains("No references"));
    }

    #[test]
    fn test_validate_reports_every_issue() {
        let doc = "Text [1], [2, 3] and [7].\n\n## References\n\n\
                   [1] Report - https://a.com/x\n\
                   [2] n/a - https://b.com/y\n\
                   [3] Copy - https://www.a.com/x/\n\
                   [4] Never cited - https://d.com/z\n";
        let report = validate_references(doc);

        assert_eq!(report.total, 4);
        assert_eq!(report.untitled, vec![2]);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].kind, DuplicateKind::Url);
        assert_eq!(report.duplicates[0].number, 3);
        assert_eq!(report.orphans, vec![4]);
        assert_eq!(report.phantoms, vec![7]);
        assert_eq!(report.valid, 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_validate_round_trips_rendered_sections() {
        let refs = vec![
            GlobalReference::new(1, "Outlook", "https://iea.org/weo"),
            GlobalReference::new(2, "Data", "https://b.org/d"),
        ];
        for style in [ReferenceStyle::Ieee, ReferenceStyle::Generic] {
            let doc = format!("Cites [1] and [2].\n\n{}", render_reference_section(&refs, style));
            let report = validate_references(&doc);
            assert!(report.is_clean(), "{:?} produced {:?}", style, report);
            assert_eq!(report.valid, 2);
        }
    }

    #[test]
    fn test_unresolved_markers_are_phantoms() {
        let refs = vec![
            GlobalReference::new(1, "Alpha", "https://alpha.org/a"),
            GlobalReference::new(2, "Gamma", "https://gamma.org/g"),
        ];
        let doc = format!(
            "Alpha [1]. Beta [?2] and gamma [2].\n\n{}",
            render_reference_section(&refs, ReferenceStyle::Ieee)
        );
        let report = validate_references(&doc);

        assert_eq!(report.phantoms, vec![2]);
        assert!(report.orphans.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_missing_section() {
        let report = validate_references("Only text [2].");
        assert!(report.missing_section);
        assert_eq!(report.phantoms, vec![2]);
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("IEEE".parse::<ReferenceStyle>().unwrap(), ReferenceStyle::Ieee);
        assert_eq!("generic".parse::<ReferenceStyle>().unwrap(), ReferenceStyle::Generic);
        assert!("apa".parse::<ReferenceStyle>().is_err());
    }
}
