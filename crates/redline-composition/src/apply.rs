//! Applying a suggested edit to clause text

use crate::edit::SuggestedEdit;
use crate::error::ApplyError;

/// Apply `edit` to `text`
///
/// Deletions are applied first, from the highest start downwards; insertions
/// follow, from the highest position downwards, against the already-shortened
/// text. Offsets count chars, not bytes.
///
/// # Errors
/// Returns [`ApplyError`] if a range falls outside the text at the moment it
/// is applied.
pub fn apply_edit(text: &str, edit: &SuggestedEdit) -> Result<String, ApplyError> {
    let mut chars: Vec<char> = text.chars().collect();

    let mut deletions: Vec<_> = edit.deletions.iter().collect();
    deletions.sort_by(|a, b| b.start.cmp(&a.start));
    for d in deletions {
        if d.start > d.end || d.end > chars.len() {
            return Err(ApplyError::DeletionOutOfBounds {
                start: d.start,
                end: d.end,
                len: chars.len(),
            });
        }
        chars.drain(d.start..d.end);
    }

    let mut insertions: Vec<_> = edit.insertions.iter().collect();
    insertions.sort_by(|a, b| b.position.cmp(&a.position));
    for i in insertions {
        if i.position > chars.len() {
            return Err(ApplyError::InsertionOutOfBounds {
                position: i.position,
                len: chars.len(),
            });
        }
        chars.splice(i.position..i.position, i.inserted_text.chars());
    }

    Ok(chars.into_iter().collect())
}
