//! Top-level error types for modbot.

use crate::config::SectionKind;
use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Process settings loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("missing required setting: {0}")]
    MissingKey(String),
}

/// Chat platform collaborator errors (history, replies, resolution, moderation calls).
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("discord request failed: {0}")]
    Discord(#[from] serenity::Error),

    #[error("invalid snowflake id: {0}")]
    InvalidId(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure to establish the initial configuration. Fatal for the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(
        "no valid configuration found in the last {scanned} messages of channel {channel_id}"
    )]
    NoValidConfig { channel_id: u64, scanned: usize },

    #[error("failed to fetch configuration channel history: {0}")]
    History(#[source] MessagingError),
}

/// A single retained line of the configuration document, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number in the original message.
    pub line_number: usize,
    /// The line as the moderator wrote it, surrounding whitespace trimmed.
    pub raw_text: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}", self.line_number)
    }
}

/// The configuration message does not have the expected document shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("{line}: code blocks are not allowed")]
    CodeBlock { line: SourceLine },

    #[error("{line}: HTML-like tag `{tag}` is not allowed")]
    HtmlTag { line: SourceLine, tag: String },

    #[error("{line}: unknown section heading `{heading}`")]
    UnknownSection { line: SourceLine, heading: String },

    #[error("{line}: section `{section}` appears more than once (first heading on line {first_line_number})")]
    DuplicateSection {
        line: SourceLine,
        section: SectionKind,
        first_line_number: usize,
    },

    #[error("missing required section(s): {}", display_names(missing))]
    MissingSections { missing: Vec<SectionKind> },

    #[error("{line}: bullet in section `{section}` is missing `=`")]
    MalformedBullet {
        line: SourceLine,
        section: SectionKind,
    },

    #[error("{line}: `{key}` is not a channel mention")]
    InvalidChannelMention { line: SourceLine, key: String },

    #[error("{line}: `{value}` for field `{field}` is not a role mention")]
    InvalidRoleMention {
        line: SourceLine,
        field: String,
        value: String,
    },

    #[error("{line}: `{value}` is not a number of days")]
    InvalidDays {
        line: SourceLine,
        section: SectionKind,
        value: String,
    },

    #[error("{line}: channel `{mention}` could not be found")]
    UnresolvedChannel { line: SourceLine, mention: String },

    #[error("{line}: role `{mention}` could not be found")]
    UnresolvedRole { line: SourceLine, mention: String },

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("{line}: unexpected field `{field}`")]
    UnexpectedField { line: SourceLine, field: String },

    #[error("{line}: field `{field}` appears more than once")]
    DuplicateField { line: SourceLine, field: String },
}

fn display_names(sections: &[SectionKind]) -> String {
    sections
        .iter()
        .map(|section| section.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StructuralError {
    /// The offending line, when the error is tied to one.
    pub fn line(&self) -> Option<&SourceLine> {
        match self {
            Self::CodeBlock { line }
            | Self::HtmlTag { line, .. }
            | Self::UnknownSection { line, .. }
            | Self::DuplicateSection { line, .. }
            | Self::MalformedBullet { line, .. }
            | Self::InvalidChannelMention { line, .. }
            | Self::InvalidRoleMention { line, .. }
            | Self::InvalidDays { line, .. }
            | Self::UnresolvedChannel { line, .. }
            | Self::UnresolvedRole { line, .. }
            | Self::UnexpectedField { line, .. }
            | Self::DuplicateField { line, .. } => Some(line),
            Self::MissingSections { .. } | Self::MissingField { .. } => None,
        }
    }

    /// The section the error is implicated in, when known.
    pub fn section(&self) -> Option<SectionKind> {
        match self {
            Self::DuplicateSection { section, .. }
            | Self::MalformedBullet { section, .. }
            | Self::InvalidDays { section, .. } => Some(*section),
            Self::InvalidChannelMention { .. } | Self::UnresolvedChannel { .. } => {
                Some(SectionKind::ChannelPruning)
            }
            Self::InvalidRoleMention { .. }
            | Self::UnresolvedRole { .. }
            | Self::MissingField { .. }
            | Self::UnexpectedField { .. }
            | Self::DuplicateField { .. } => Some(SectionKind::MemberInactivity),
            Self::CodeBlock { .. }
            | Self::HtmlTag { .. }
            | Self::UnknownSection { .. }
            | Self::MissingSections { .. } => None,
        }
    }

    /// One line describing what the moderator should have written instead.
    pub fn expected_format(&self) -> String {
        match self {
            Self::CodeBlock { .. } => {
                "Write the config as plain markdown, without ``` code blocks.".into()
            }
            Self::HtmlTag { .. } => {
                "Remove the tag. Only channel and role mentions may use `<...>`.".into()
            }
            Self::UnknownSection { .. } => format!(
                "Section headings must be one of: {}.",
                display_names(&SectionKind::ALL)
            ),
            Self::DuplicateSection { .. } => "Each section heading must appear exactly once.".into(),
            Self::MissingSections { .. } => format!(
                "The config needs one heading for each of: {}.",
                display_names(&SectionKind::ALL)
            ),
            Self::MalformedBullet { .. } => "Bullets look like `- key = value`.".into(),
            Self::InvalidChannelMention { .. } => {
                "Channel Pruning bullets look like `- #channel = 30 days`.".into()
            }
            Self::InvalidRoleMention { .. } => "Role fields look like `- Active role = @Role`.".into(),
            Self::InvalidDays { .. } => "Day values look like `30 days` or `1 day`.".into(),
            Self::UnresolvedChannel { .. } => "Mention a channel that exists in this server.".into(),
            Self::UnresolvedRole { .. } => "Mention a role that exists in this server.".into(),
            Self::MissingField { .. }
            | Self::UnexpectedField { .. }
            | Self::DuplicateField { .. } => {
                "Member Inactivity needs exactly: Active role, Inactive role, Days until inactive."
                    .into()
            }
        }
    }
}

/// The underlying rule a policy record broke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("invalid channel_id={0}; expected a positive number")]
    NonPositiveChannelId(u64),

    #[error("invalid delete_older_than_days={0}; please specify a number greater than 0")]
    NonPositiveDeleteDays(i64),

    #[error("invalid days_until_inactive={0}; please specify a number greater than 0")]
    NonPositiveInactiveDays(i64),

    #[error("active role and inactive role are the same role ({role_name}, role_id={role_id})")]
    SameRole { role_id: u64, role_name: String },
}

/// A well-formed configuration broke a business rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "invalid channel pruning policy for channel_id={channel_id} (channel_name={channel_name})"
    )]
    ChannelPruningPolicy {
        channel_id: u64,
        channel_name: String,
        #[source]
        cause: PolicyViolation,
    },

    #[error(
        "more than one channel pruning policy defined for channel_id={channel_id} (channel_name={channel_name})"
    )]
    DuplicateChannel { channel_id: u64, channel_name: String },

    #[error("invalid member inactivity policy")]
    MemberActivityPolicy {
        #[source]
        cause: PolicyViolation,
    },
}

impl ValidationError {
    pub fn section(&self) -> SectionKind {
        match self {
            Self::ChannelPruningPolicy { .. } | Self::DuplicateChannel { .. } => {
                SectionKind::ChannelPruning
            }
            Self::MemberActivityPolicy { .. } => SectionKind::MemberInactivity,
        }
    }

    pub fn expected_format(&self) -> &'static str {
        match self {
            Self::ChannelPruningPolicy { .. } => {
                "Each channel needs a positive number of days, like `30 days`."
            }
            Self::DuplicateChannel { .. } => "List each channel only once under Channel Pruning.",
            Self::MemberActivityPolicy { .. } => {
                "Use two different roles and a positive number of days, like `30 days`."
            }
        }
    }
}

/// Why a configuration message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Structural(#[from] StructuralError),

    #[error("invalid config: {error}")]
    Validation {
        #[source]
        error: ValidationError,
        /// The bullet that broke the rule, when the document is at hand.
        line: Option<SourceLine>,
    },
}

impl From<ValidationError> for ConfigError {
    fn from(error: ValidationError) -> Self {
        Self::Validation { error, line: None }
    }
}

impl ConfigError {
    /// Render the error as a reply a moderator can act on.
    pub fn moderator_message(&self) -> String {
        let mut message =
            String::from("❌ Configuration rejected. The previous configuration is still active.\n");

        let (section, line, expected) = match self {
            Self::Structural(error) => (error.section(), error.line(), error.expected_format()),
            Self::Validation { error, line } => (
                Some(error.section()),
                line.as_ref(),
                error.expected_format().to_string(),
            ),
        };

        if let Some(section) = section {
            message.push_str(&format!("**Section:** {section}\n"));
        }
        if let Some(line) = line {
            message.push_str(&format!(
                "**Line {}:** `{}`\n",
                line.line_number,
                line.raw_text.replace('`', "'")
            ));
        }
        message.push_str(&format!("**Problem:** {}\n", self.problem_chain()));
        message.push_str(&format!("**Expected:** {expected}"));
        message
    }

    /// The wrapped error's message followed by each of its causes.
    fn problem_chain(&self) -> String {
        let mut parts = Vec::new();
        let mut current: Option<&dyn std::error::Error> = match self {
            Self::Structural(error) => Some(error),
            Self::Validation { error, .. } => Some(error),
        };
        while let Some(error) = current {
            parts.push(error.to_string());
            current = error.source();
        }
        parts.join(": ")
    }
}
