//! Reference consolidation for multi-chapter documents
//!
//! Each drafted chapter carries its own locally numbered reference list.
//! [`ReferenceConsolidator`] merges them into one list numbered by first
//! appearance and rewrites in-text citations so every number still resolves
//! to the URL it pointed at before the merge.

pub mod consolidate;
pub mod extract;
pub mod validate;

pub use consolidate::{
    cited_numbers, rewrite_citations, unresolved_marker, unresolved_markers, ChapterInput,
    ConsolidatedChapter, ConsolidatedDocument, ConsolidationReport, DroppedReference,
    GlobalReference, ReferenceConsolidator,
};
pub use extract::{is_generic_title, parse_reference_entries, split_reference_section, Reference};
pub use validate::{
    render_reference_section, validate_references, DuplicateKind, DuplicateReference,
    ReferenceStyle, ReferenceValidation,
};
