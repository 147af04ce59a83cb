//! Section builder: groups bullets under the closed set of required headings.

use crate::config::normalize::{LineKind, NormalizedLine};
use crate::error::StructuralError;

use std::collections::BTreeMap;

/// The sections a configuration document must contain, each exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKind {
    Root,
    ChannelPruning,
    MemberInactivity,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [
        SectionKind::Root,
        SectionKind::ChannelPruning,
        SectionKind::MemberInactivity,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            SectionKind::Root => "Bot Config",
            SectionKind::ChannelPruning => "Channel Pruning",
            SectionKind::MemberInactivity => "Member Inactivity",
        }
    }

    /// Lowercased display name, compared against normalized heading text.
    pub fn match_key(self) -> String {
        self.display_name().to_lowercase()
    }

    pub fn from_normalized_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.match_key() == name)
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    heading_line_number: usize,
    bullets: Vec<NormalizedLine>,
}

/// Bullets grouped by the section heading they appeared under.
///
/// Construction guarantees every [`SectionKind`] is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMap {
    sections: BTreeMap<SectionKind, Section>,
}

impl SectionMap {
    pub fn build(lines: Vec<NormalizedLine>) -> Result<Self, StructuralError> {
        let mut sections: BTreeMap<SectionKind, Section> = BTreeMap::new();
        let mut current: Option<SectionKind> = None;

        for line in lines {
            match line.kind {
                LineKind::Heading => {
                    let Some(kind) = SectionKind::from_normalized_name(&line.normalized_text)
                    else {
                        return Err(StructuralError::UnknownSection {
                            heading: line.normalized_text.clone(),
                            line: line.source(),
                        });
                    };

                    if let Some(existing) = sections.get(&kind) {
                        return Err(StructuralError::DuplicateSection {
                            line: line.source(),
                            section: kind,
                            first_line_number: existing.heading_line_number,
                        });
                    }

                    sections.insert(
                        kind,
                        Section {
                            heading_line_number: line.line_number,
                            bullets: Vec::new(),
                        },
                    );
                    current = Some(kind);
                }
                LineKind::Bullet => match current.and_then(|kind| sections.get_mut(&kind)) {
                    Some(section) => section.bullets.push(line),
                    None => {
                        tracing::debug!(
                            line_number = line.line_number,
                            "discarding bullet before first heading"
                        );
                    }
                },
            }
        }

        let missing: Vec<SectionKind> = SectionKind::ALL
            .into_iter()
            .filter(|kind| !sections.contains_key(kind))
            .collect();
        if !missing.is_empty() {
            return Err(StructuralError::MissingSections { missing });
        }

        Ok(Self { sections })
    }

    /// Bullets under `kind`, in document order.
    pub fn bullets(&self, kind: SectionKind) -> &[NormalizedLine] {
        self.sections
            .get(&kind)
            .map(|section| section.bullets.as_slice())
            .unwrap_or_default()
    }
}
