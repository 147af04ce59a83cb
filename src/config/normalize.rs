//! Line normalizer: classifies raw message lines as headings or bullets.
//!
//! Everything else (prose, separators, notes to other moderators) is dropped
//! so the document can be annotated freely. Code fences and HTML-like tags
//! are rejected outright since they could hide content from the parser.

use crate::error::{SourceLine, StructuralError};
use crate::messaging::mention::is_platform_markup;

use regex::Regex;
use std::sync::LazyLock;

static ANGLE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("hardcoded angle tag regex"));

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*(.*)$").expect("hardcoded heading regex"));

/// `---`, `* * *`, `___` and friends.
static THEMATIC_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*_]\s*){3,}$").expect("hardcoded thematic break regex"));

/// A marker, then whitespace. `**bold**` prose is not a bullet.
static BULLET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*]\s+(.*)$").expect("hardcoded bullet regex"));

const CODE_FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Bullet,
}

/// A retained line of the configuration message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    /// The line exactly as it appeared in the message.
    pub raw_text: String,
    /// 1-based.
    pub line_number: usize,
    pub kind: LineKind,
    /// Headings: text without hashes, lowercased. Bullets: text without the marker.
    pub normalized_text: String,
}

impl NormalizedLine {
    pub fn source(&self) -> SourceLine {
        SourceLine {
            line_number: self.line_number,
            raw_text: self.raw_text.trim().to_string(),
        }
    }
}

pub fn normalize_lines(text: &str) -> Result<Vec<NormalizedLine>, StructuralError> {
    let mut lines = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let source = || SourceLine {
            line_number: index + 1,
            raw_text: trimmed.to_string(),
        };

        if trimmed.contains(CODE_FENCE) {
            return Err(StructuralError::CodeBlock { line: source() });
        }

        if let Some(tag) = ANGLE_TAG_REGEX
            .find_iter(trimmed)
            .map(|found| found.as_str())
            .find(|tag| !is_platform_markup(tag))
        {
            return Err(StructuralError::HtmlTag {
                line: source(),
                tag: tag.to_string(),
            });
        }

        let classified = if let Some(captures) = HEADING_REGEX.captures(trimmed) {
            Some((LineKind::Heading, captures[1].trim().to_lowercase()))
        } else if THEMATIC_BREAK_REGEX.is_match(trimmed) {
            None
        } else if let Some(captures) = BULLET_REGEX.captures(trimmed) {
            Some((LineKind::Bullet, captures[1].trim().to_string()))
        } else {
            None
        };

        if let Some((kind, normalized_text)) = classified {
            lines.push(NormalizedLine {
                raw_text: raw.to_string(),
                line_number: index + 1,
                kind,
                normalized_text,
            });
        }
    }

    Ok(lines)
}
