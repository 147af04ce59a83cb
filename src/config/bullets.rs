//! Bullet decomposer: `key = value` on the first `=`.

use crate::config::normalize::NormalizedLine;
use crate::config::sections::SectionKind;
use crate::error::{SourceLine, StructuralError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBullet {
    pub source_line: SourceLine,
    pub key: String,
    pub value: String,
}

pub fn decompose(
    section: SectionKind,
    lines: &[NormalizedLine],
) -> Result<Vec<ParsedBullet>, StructuralError> {
    lines
        .iter()
        .map(|line| {
            let Some((key, value)) = line.normalized_text.split_once('=') else {
                return Err(StructuralError::MalformedBullet {
                    line: line.source(),
                    section,
                });
            };
            Ok(ParsedBullet {
                source_line: line.source(),
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}
