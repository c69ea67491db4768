//! Track-change rendering of a document with its suggested edits

use crate::edit::SuggestedEdit;
use crate::error::{ApplyError, RenderError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format of [`render_redline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedlineFormat {
    /// Standalone HTML page with `<del>` / `<ins>` markup
    #[default]
    Html,
    /// Markdown with `~~deleted~~` and `**inserted**`
    Markdown,
}

impl FromStr for RedlineFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(RenderError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for RedlineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => f.write_str("html"),
            Self::Markdown => f.write_str("markdown"),
        }
    }
}

/// A single markup operation against the original text
#[derive(Debug)]
enum Mark<'a> {
    Delete { start: usize, end: usize },
    Insert { at: usize, text: &'a str },
}

impl Mark<'_> {
    fn anchor(&self) -> usize {
        match self {
            Mark::Delete { start, .. } => *start,
            Mark::Insert { at, .. } => *at,
        }
    }

    /// Deletions sort ahead of insertions at the same anchor so the insertion
    /// lands in front of the struck-through text.
    fn rank(&self) -> u8 {
        match self {
            Mark::Delete { .. } => 0,
            Mark::Insert { .. } => 1,
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render `text` with every edit shown as a tracked change
///
/// Offsets in the edits are char positions into `text`. Marks are applied
/// from the end of the document backwards. A deletion that overlaps one
/// already rendered is skipped with a warning; conflict detection is
/// expected to have flagged it.
///
/// # Errors
/// Returns [`RenderError::OutOfBounds`] if an edit points outside `text`.
pub fn render_redline(
    text: &str,
    edits: &[SuggestedEdit],
    format: RedlineFormat,
) -> Result<String, RenderError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut marks: Vec<Mark<'_>> = Vec::new();
    for edit in edits {
        let out_of_bounds = |source| RenderError::OutOfBounds {
            edit_id: edit.edit_id.to_string(),
            source,
        };
        for d in &edit.deletions {
            if d.start > d.end || d.end > len {
                return Err(out_of_bounds(ApplyError::DeletionOutOfBounds {
                    start: d.start,
                    end: d.end,
                    len,
                }));
            }
            marks.push(Mark::Delete {
                start: d.start,
                end: d.end,
            });
        }
        for i in &edit.insertions {
            if i.position > len {
                return Err(out_of_bounds(ApplyError::InsertionOutOfBounds {
                    position: i.position,
                    len,
                }));
            }
            marks.push(Mark::Insert {
                at: i.position,
                text: &i.inserted_text,
            });
        }
    }
    marks.sort_by(|a, b| {
        b.anchor()
            .cmp(&a.anchor())
            .then_with(|| a.rank().cmp(&b.rank()))
    });

    // Segments are collected back to front and reversed at the end.
    let plain = |s: String| match format {
        RedlineFormat::Html => escape_html(&s),
        RedlineFormat::Markdown => s,
    };
    let mut segments: Vec<String> = Vec::new();
    let mut cursor = len;
    for mark in marks {
        match mark {
            Mark::Delete { start, end } => {
                if end > cursor {
                    tracing::warn!(start, end, "Skipping overlapping deletion in redline");
                    continue;
                }
                segments.push(plain(chars[end..cursor].iter().collect()));
                let deleted = plain(chars[start..end].iter().collect());
                segments.push(match format {
                    RedlineFormat::Html => format!("<del>{deleted}</del>"),
                    RedlineFormat::Markdown => format!("~~{deleted}~~"),
                });
                cursor = start;
            }
            Mark::Insert { at, text } => {
                if at > cursor {
                    tracing::warn!(at, "Skipping insertion inside a rendered deletion");
                    continue;
                }
                segments.push(plain(chars[at..cursor].iter().collect()));
                segments.push(match format {
                    RedlineFormat::Html => format!("<ins>{}</ins>", escape_html(text)),
                    RedlineFormat::Markdown => format!("**{text}**"),
                });
                cursor = at;
            }
        }
    }
    segments.push(plain(chars[..cursor].iter().collect()));
    segments.reverse();
    let body = segments.concat();

    Ok(match format {
        RedlineFormat::Html => wrap_html(&body),
        RedlineFormat::Markdown => wrap_markdown(&body),
    })
}

fn wrap_html(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>Contract Redline</title>\n<style>\n\
         body {{ font-family: 'Times New Roman', serif; line-height: 1.6; padding: 2em; }}\n\
         del {{ color: red; text-decoration: line-through; }}\n\
         ins {{ color: green; text-decoration: underline; }}\n\
         </style>\n</head>\n<body>\n<h1>Contract with Track Changes</h1>\n\
         <div class=\"content\">\n{body}\n</div>\n</body>\n</html>\n"
    )
}

fn wrap_markdown(body: &str) -> String {
    format!(
        "# Contract with Track Changes\n\n## Legend\n\
         - ~~Strikethrough~~ = Deleted text\n\
         - **Bold** = Inserted text\n\n---\n\n{body}\n"
    )
}
