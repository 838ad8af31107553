//! Cross-chapter reference consolidation
//!
//! Chapters are processed in final document order. Every reference is keyed
//! by its canonical URL: the first appearance assigns the next global
//! number, later appearances reuse it. Citations in each chapter body are
//! then rewritten from local to global numbers in a single pass.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::extract::{is_generic_title, parse_reference_entries, split_reference_section, Reference};
use super::validate::{render_reference_section, ReferenceStyle};
use crate::search::canonical::canonicalize_url;

/// A drafted chapter with its local reference list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterInput {
    pub topic: String,
    /// Chapter text without its reference section
    pub body: String,
    pub references: Vec<Reference>,
}

impl ChapterInput {
    /// Build from a chapter's full markdown, splitting off and parsing its
    /// reference section.
    pub fn from_markdown(topic: impl Into<String>, text: &str) -> Self {
        let topic = topic.into();
        let (body, section) = split_reference_section(text);
        let references = match section {
            Some(section) => parse_reference_entries(&section),
            None => {
                debug!("Chapter '{}' has no reference section", topic);
                Vec::new()
            }
        };
        Self {
            topic,
            body,
            references,
        }
    }
}

/// An entry of the document-wide reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalReference {
    pub number: u32,
    pub title: String,
    /// URL as first cited, not canonicalized
    pub url: String,
    #[serde(skip)]
    canonical_url: String,
}

impl GlobalReference {
    pub fn new(number: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            number,
            title: title.into(),
            canonical_url: canonicalize_url(&url),
            url,
        }
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedChapter {
    pub topic: String,
    /// Body with citations rewritten to global numbers
    pub body: String,
    /// Cited numbers with no matching local reference, left as written
    pub unresolved: Vec<u32>,
}

/// A reference entry dropped because its URL could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedReference {
    pub chapter: String,
    pub local_number: u32,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Local entries folded into an existing global reference
    pub duplicates_merged: usize,
    pub titles_upgraded: usize,
    pub dropped: Vec<DroppedReference>,
    /// Duplicates removed by the final validation pass
    pub final_pass_removed: usize,
    /// Number collisions renumbered by the final validation pass
    pub final_pass_renumbered: usize,
}

impl ConsolidationReport {
    pub fn has_issues(&self) -> bool {
        !self.dropped.is_empty() || self.final_pass_removed > 0 || self.final_pass_renumbered > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedDocument {
    pub chapters: Vec<ConsolidatedChapter>,
    pub references: Vec<GlobalReference>,
    pub report: ConsolidationReport,
}

impl ConsolidatedDocument {
    /// Global number a canonical URL was assigned, if any.
    pub fn number_for(&self, url: &str) -> Option<u32> {
        let canonical = canonicalize_url(url);
        self.references
            .iter()
            .find(|r| r.canonical_url == canonical)
            .map(|r| r.number)
    }

    pub fn reference(&self, number: u32) -> Option<&GlobalReference> {
        self.references.iter().find(|r| r.number == number)
    }

    /// Chapters that cite numbers they never defined.
    pub fn unresolved(&self) -> Vec<(&str, &[u32])> {
        self.chapters
            .iter()
            .filter(|c| !c.unresolved.is_empty())
            .map(|c| (c.topic.as_str(), c.unresolved.as_slice()))
            .collect()
    }

    /// Full markdown: chapter bodies followed by the global reference list.
    pub fn render(&self, style: ReferenceStyle) -> String {
        let bodies: Vec<&str> = self
            .chapters
            .iter()
            .map(|c| c.body.trim())
            .filter(|b| !b.is_empty())
            .collect();
        format!(
            "{}\n\n{}",
            bodies.join("\n\n"),
            render_reference_section(&self.references, style)
        )
    }
}

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+(?:[ \t]*,[ \t]*\d+)*)\]").expect("valid citation pattern")
});

/// Numbers inside every `[k]` / `[k, m, …]` citation of `text`.
pub fn cited_numbers(text: &str) -> BTreeSet<u32> {
    CITATION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .flat_map(|group| {
            group
                .as_str()
                .split(',')
                .filter_map(|n| n.trim().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

static UNRESOLVED_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\?(\d+)\]").expect("valid unresolved pattern"));

/// Marker written in place of a citation whose number has no reference.
/// It never matches a `[k]` citation, so it cannot resolve to a global entry.
pub fn unresolved_marker(local: u32) -> String {
    format!("[?{}]", local)
}

/// Local numbers of every `[?k]` marker left in `text`.
pub fn unresolved_markers(text: &str) -> BTreeSet<u32> {
    UNRESOLVED_CITATION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()))
        .collect()
}

/// Rewrite citations through `mapping` in one pass. Grouped citations are
/// mapped member by member, then deduplicated and sorted. Numbers without
/// a mapping become [`unresolved_marker`]s after the resolved group and are
/// returned as unresolved.
pub fn rewrite_citations(text: &str, mapping: &HashMap<u32, u32>) -> (String, Vec<u32>) {
    let mut unresolved = BTreeSet::new();
    let rewritten = CITATION.replace_all(text, |caps: &Captures| {
        let Some(group) = caps.get(1) else {
            return caps[0].to_string();
        };
        let mut numbers = BTreeSet::new();
        let mut missing = BTreeSet::new();
        for member in group.as_str().split(',') {
            let Ok(local) = member.trim().parse::<u32>() else {
                return caps[0].to_string();
            };
            match mapping.get(&local) {
                Some(global) => {
                    numbers.insert(*global);
                }
                None => {
                    unresolved.insert(local);
                    missing.insert(local);
                }
            }
        }

        let mut out = String::new();
        if !numbers.is_empty() {
            let joined: Vec<String> = numbers.iter().map(u32::to_string).collect();
            out.push_str(&format!("[{}]", joined.join(", ")));
        }
        for local in missing {
            out.push_str(&unresolved_marker(local));
        }
        out
    });
    (rewritten.into_owned(), unresolved.into_iter().collect())
}

/// Whether `candidate` should replace `current` as a reference title.
fn is_better_title(current: &str, candidate: &str) -> bool {
    if is_generic_title(candidate) {
        return false;
    }
    is_generic_title(current) || candidate.trim().chars().count() > current.trim().chars().count()
}

/// Merges chapter reference lists into one globally numbered list.
#[derive(Debug, Clone, Default)]
pub struct ReferenceConsolidator {
    style: ReferenceStyle,
}

impl ReferenceConsolidator {
    pub fn new(style: ReferenceStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> ReferenceStyle {
        self.style
    }

    /// Consolidate chapters given in final document order.
    pub fn consolidate(&self, chapters: &[ChapterInput]) -> ConsolidatedDocument {
        let mut references: Vec<GlobalReference> = Vec::new();
        let mut by_canonical: HashMap<String, usize> = HashMap::new();
        let mut report = ConsolidationReport::default();
        let mut consolidated = Vec::with_capacity(chapters.len());

        for chapter in chapters {
            let mut local_to_global: HashMap<u32, u32> = HashMap::new();

            for reference in &chapter.references {
                let canonical = if reference.canonical_url.is_empty() {
                    canonicalize_url(&reference.url)
                } else {
                    reference.canonical_url.clone()
                };
                if canonical.is_empty() {
                    warn!(
                        "Dropping reference [{}] of '{}': unusable URL '{}'",
                        reference.local_number, chapter.topic, reference.url
                    );
                    report.dropped.push(DroppedReference {
                        chapter: chapter.topic.clone(),
                        local_number: reference.local_number,
                        url: reference.url.clone(),
                    });
                    continue;
                }

                let number = match by_canonical.get(&canonical) {
                    Some(&index) => {
                        report.duplicates_merged += 1;
                        let existing = &mut references[index];
                        if is_better_title(&existing.title, &reference.title) {
                            debug!(
                                "Upgrading title of [{}]: '{}' -> '{}'",
                                existing.number, existing.title, reference.title
                            );
                            existing.title = reference.title.clone();
                            report.titles_upgraded += 1;
                        }
                        existing.number
                    }
                    None => {
                        let number = references.len() as u32 + 1;
                        by_canonical.insert(canonical.clone(), references.len());
                        references.push(GlobalReference {
                            number,
                            title: reference.title.clone(),
                            url: reference.url.clone(),
                            canonical_url: canonical,
                        });
                        number
                    }
                };
                local_to_global.entry(reference.local_number).or_insert(number);
            }

            let (body, unresolved) = rewrite_citations(&chapter.body, &local_to_global);
            if !unresolved.is_empty() {
                warn!(
                    "Chapter '{}' cites undefined references {:?}",
                    chapter.topic, unresolved
                );
            }
            consolidated.push(ConsolidatedChapter {
                topic: chapter.topic.clone(),
                body,
                unresolved,
            });
        }

        let (removed, renumbered) = final_validation(&mut references);
        report.final_pass_removed = removed;
        report.final_pass_renumbered = renumbered;

        info!(
            "Consolidated {} chapters into {} references ({} duplicates merged, {} dropped)",
            chapters.len(),
            references.len(),
            report.duplicates_merged,
            report.dropped.len()
        );

        ConsolidatedDocument {
            chapters: consolidated,
            references,
            report,
        }
    }

    /// Consolidate and render in the configured style.
    pub fn consolidate_to_markdown(
        &self,
        chapters: &[ChapterInput],
    ) -> (String, ConsolidatedDocument) {
        let document = self.consolidate(chapters);
        (document.render(self.style), document)
    }
}

/// Drop residual URL duplicates and renumber number collisions, then sort
/// by number. Returns `(removed, renumbered)`.
fn final_validation(references: &mut Vec<GlobalReference>) -> (usize, usize) {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_numbers: BTreeSet<u32> = BTreeSet::new();
    let mut removed = 0;
    let mut renumbered = 0;
    let mut kept = Vec::with_capacity(references.len());

    for mut reference in references.drain(..) {
        if reference.canonical_url.is_empty() {
            reference.canonical_url = canonicalize_url(&reference.url);
        }
        if reference.canonical_url.is_empty()
            || !seen_urls.insert(reference.canonical_url.clone())
        {
            warn!("Final pass removed duplicate reference [{}]", reference.number);
            removed += 1;
            continue;
        }
        if seen_numbers.contains(&reference.number) {
            let next = seen_numbers.iter().next_back().copied().unwrap_or(0) + 1;
            warn!("Final pass renumbered [{}] to [{}]", reference.number, next);
            reference.number = next;
            renumbered += 1;
        }
        seen_numbers.insert(reference.number);
        kept.push(reference);
    }

    kept.sort_by_key(|r| r.number);
    *references = kept;
    (removed, renumbered)
}
