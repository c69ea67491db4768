//! Redline Composition
//!
//! Everything that happens to a batch of suggested edits once the editor stage
//! has drafted them.
//!
//! # Core Concepts
//!
//! - [`SuggestedEdit`]: track-change edit with half-open deletions and point insertions
//! - [`ConflictStrategy`]: pluggable overlap detection
//! - [`PairwiseResolver`]: per-clause quadratic comparison (default)
//! - [`SweepResolver`]: sort-and-sweep, same answers in O(n log n)
//! - [`apply_edit`]: apply one edit to clause text
//! - [`render_redline`]: HTML / Markdown redline of a document
//!
//! # Example
//!
//! ```rust
//! use redline_composition::{resolve_conflicts, PairwiseResolver, SuggestedEdit};
//!
//! let mut edits = vec![
//!     SuggestedEdit::new("clause-1", "finding-a").with_deletion(0, 10, "0123456789"),
//!     SuggestedEdit::new("clause-1", "finding-b").with_deletion(5, 15, "56789abcde"),
//! ];
//! let report = resolve_conflicts(&PairwiseResolver, &mut edits);
//!
//! assert_eq!(report.conflicting_pairs, 1);
//! assert_eq!(edits[0].conflicts_with, vec![edits[1].edit_id.clone()]);
//! assert_eq!(edits[1].conflicts_with, vec![edits[0].edit_id.clone()]);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod apply;
mod conflict;
mod edit;
mod error;
mod redline;

pub use apply::apply_edit;
pub use conflict::{
    conflict_count, resolve_conflicts, ConflictReport, ConflictStrategy, PairwiseResolver,
    SweepResolver,
};
pub use edit::{
    CharRange, Deletion, EditId, EditStatus, Insertion, PolicyAnchor, SuggestedEdit,
};
pub use error::{ApplyError, RenderError};
pub use redline::{render_redline, RedlineFormat};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
