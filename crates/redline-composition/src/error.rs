//! Error types for edit application and rendering

/// Applying an edit to text failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Deletion range reaches past the text or is inverted
    #[error("deletion [{start}, {end}) out of bounds for text of {len} chars")]
    DeletionOutOfBounds {
        /// Range start
        start: usize,
        /// Range end
        end: usize,
        /// Text length in chars
        len: usize,
    },

    /// Insertion point past the end of the text
    #[error("insertion at {position} out of bounds for text of {len} chars")]
    InsertionOutOfBounds {
        /// Insertion point
        position: usize,
        /// Text length in chars
        len: usize,
    },
}

/// Rendering a redline failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// An edit references text outside the document
    #[error("edit {edit_id}: {source}")]
    OutOfBounds {
        /// Offending edit
        edit_id: String,
        /// Underlying bounds error
        #[source]
        source: ApplyError,
    },

    /// Unrecognised format name
    #[error("unsupported redline format: {0}")]
    UnsupportedFormat(String),
}
