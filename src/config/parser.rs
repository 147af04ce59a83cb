//! Semantic section parsers: raw bullets to typed policies.

use crate::config::bullets::{ParsedBullet, decompose};
use crate::config::normalize::normalize_lines;
use crate::config::sections::{SectionKind, SectionMap};
use crate::config::validation::{validate_channel_pruning_policy, validate_config};
use crate::config::{ChannelPruningPolicy, Config, MemberActivityPolicy};
use crate::error::{ConfigError, PolicyViolation, SourceLine, StructuralError, ValidationError};
use crate::messaging::mention::{parse_channel_mention, parse_role_mention};
use crate::messaging::traits::{MentionResolver, ResolvedEntity};

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// `30 days`, `1 day`, `7DAYS`. The sign is accepted so the validator can
/// report non-positive values against the channel they belong to.
static DAYS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(-?\d+)\s*days?$").expect("hardcoded days regex"));

const ACTIVE_ROLE_FIELD: &str = "active role";
const INACTIVE_ROLE_FIELD: &str = "inactive role";
const DAYS_UNTIL_INACTIVE_FIELD: &str = "days until inactive";

const MEMBER_ACTIVITY_FIELDS: [&str; 3] = [
    ACTIVE_ROLE_FIELD,
    INACTIVE_ROLE_FIELD,
    DAYS_UNTIL_INACTIVE_FIELD,
];

/// Converts configuration message text into a [`Config`].
///
/// Holds the resolver used for channel and role mentions; everything else is
/// a pure function of the input text.
#[derive(Clone)]
pub struct ConfigParser {
    resolver: Arc<dyn MentionResolver>,
}

/// Where each parsed value came from, for pointing rule violations at a line.
#[derive(Debug)]
struct ConfigLines {
    /// One per channel pruning policy, same order.
    channel_pruning: Vec<SourceLine>,
    inactive_role: SourceLine,
    days_until_inactive: SourceLine,
}

impl ConfigLines {
    fn locate(&self, config: &Config, error: &ValidationError) -> Option<SourceLine> {
        let policies = &config.channel_pruning_policies;
        let index = match error {
            ValidationError::ChannelPruningPolicy { .. } => policies
                .iter()
                .position(|policy| validate_channel_pruning_policy(policy).is_err()),
            // The second occurrence is the one to remove.
            ValidationError::DuplicateChannel { channel_id, .. } => policies
                .iter()
                .enumerate()
                .filter(|(_, policy)| policy.channel_id == *channel_id)
                .nth(1)
                .map(|(index, _)| index),
            ValidationError::MemberActivityPolicy { cause } => {
                return match cause {
                    PolicyViolation::SameRole { .. } => Some(self.inactive_role.clone()),
                    _ => Some(self.days_until_inactive.clone()),
                };
            }
        };
        index.and_then(|index| self.channel_pruning.get(index).cloned())
    }
}

impl std::fmt::Debug for ConfigParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigParser").finish_non_exhaustive()
    }
}

impl ConfigParser {
    pub fn new(resolver: Arc<dyn MentionResolver>) -> Self {
        Self { resolver }
    }

    /// Parse a configuration message into a candidate config (not yet validated).
    ///
    /// A message looks like:
    ///
    /// ```text
    /// # Bot Config
    /// Free-form notes for other moderators are ignored.
    ///
    /// ## Channel Pruning
    /// - #introductions = 30 days
    /// - #chat = 7 days
    ///
    /// ## Member Inactivity
    /// - Active role = @Active
    /// - Inactive role = @Inactive
    /// - Days until inactive = 30 days
    /// ```
    pub async fn parse(&self, text: &str) -> Result<Config, StructuralError> {
        self.parse_with_lines(text).await.map(|(config, _)| config)
    }

    /// Parse, then check business rules. Only a config that passes both may be published.
    ///
    /// A rule violation carries the bullet line that caused it.
    pub async fn parse_and_validate(&self, text: &str) -> Result<Config, ConfigError> {
        let (config, lines) = self.parse_with_lines(text).await?;
        if let Err(error) = validate_config(&config) {
            let line = lines.locate(&config, &error);
            return Err(ConfigError::Validation { error, line });
        }
        Ok(config)
    }

    async fn parse_with_lines(&self, text: &str) -> Result<(Config, ConfigLines), StructuralError> {
        let lines = normalize_lines(text)?;
        let sections = SectionMap::build(lines)?;

        // Every bullet must be `key = value`, including ones under the root heading.
        decompose(SectionKind::Root, sections.bullets(SectionKind::Root))?;
        let pruning = decompose(
            SectionKind::ChannelPruning,
            sections.bullets(SectionKind::ChannelPruning),
        )?;
        let inactivity = decompose(
            SectionKind::MemberInactivity,
            sections.bullets(SectionKind::MemberInactivity),
        )?;

        let channel_pruning_policies = self.parse_channel_pruning_section(&pruning).await?;
        let (member_activity_policy, inactive_role, days_until_inactive) =
            self.parse_member_activity_section(&inactivity).await?;

        let lines = ConfigLines {
            channel_pruning: pruning
                .iter()
                .map(|bullet| bullet.source_line.clone())
                .collect(),
            inactive_role,
            days_until_inactive,
        };
        Ok((
            Config {
                channel_pruning_policies,
                member_activity_policy,
            },
            lines,
        ))
    }

    async fn parse_channel_pruning_section(
        &self,
        bullets: &[ParsedBullet],
    ) -> Result<Vec<ChannelPruningPolicy>, StructuralError> {
        // Check syntax of every bullet before making any resolver calls.
        let entries = bullets
            .iter()
            .map(|bullet| {
                if parse_channel_mention(&bullet.key).is_none() {
                    return Err(StructuralError::InvalidChannelMention {
                        line: bullet.source_line.clone(),
                        key: bullet.key.clone(),
                    });
                }
                let days = parse_days(&bullet.value).ok_or_else(|| StructuralError::InvalidDays {
                    line: bullet.source_line.clone(),
                    section: SectionKind::ChannelPruning,
                    value: bullet.value.clone(),
                })?;
                Ok((bullet, days))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut policies = Vec::with_capacity(entries.len());
        for (bullet, delete_older_than_days) in entries {
            let channel = self.resolve_channel(bullet).await?;
            policies.push(ChannelPruningPolicy {
                channel_id: channel.id,
                channel_name: channel.name,
                delete_older_than_days,
            });
        }

        Ok(policies)
    }

    async fn parse_member_activity_section(
        &self,
        bullets: &[ParsedBullet],
    ) -> Result<(MemberActivityPolicy, SourceLine, SourceLine), StructuralError> {
        let mut fields: HashMap<String, &ParsedBullet> = HashMap::new();
        for bullet in bullets {
            let name = normalize_field_name(&bullet.key);
            if !MEMBER_ACTIVITY_FIELDS.contains(&name.as_str()) {
                return Err(StructuralError::UnexpectedField {
                    line: bullet.source_line.clone(),
                    field: bullet.key.clone(),
                });
            }
            if fields.insert(name, bullet).is_some() {
                return Err(StructuralError::DuplicateField {
                    line: bullet.source_line.clone(),
                    field: bullet.key.clone(),
                });
            }
        }

        let field = |name: &str| {
            fields
                .get(name)
                .copied()
                .ok_or_else(|| StructuralError::MissingField {
                    field: name.to_string(),
                })
        };
        let active = field(ACTIVE_ROLE_FIELD)?;
        let inactive = field(INACTIVE_ROLE_FIELD)?;
        let days = field(DAYS_UNTIL_INACTIVE_FIELD)?;

        for (name, bullet) in [(ACTIVE_ROLE_FIELD, active), (INACTIVE_ROLE_FIELD, inactive)] {
            if parse_role_mention(&bullet.value).is_none() {
                return Err(StructuralError::InvalidRoleMention {
                    line: bullet.source_line.clone(),
                    field: name.to_string(),
                    value: bullet.value.clone(),
                });
            }
        }
        let days_until_inactive =
            parse_days(&days.value).ok_or_else(|| StructuralError::InvalidDays {
                line: days.source_line.clone(),
                section: SectionKind::MemberInactivity,
                value: days.value.clone(),
            })?;

        let active_role = self.resolve_role(active).await?;
        let inactive_role = self.resolve_role(inactive).await?;

        let policy = MemberActivityPolicy {
            active_role_id: active_role.id,
            active_role_name: active_role.name,
            inactive_role_id: inactive_role.id,
            inactive_role_name: inactive_role.name,
            days_until_inactive,
        };
        Ok((
            policy,
            inactive.source_line.clone(),
            days.source_line.clone(),
        ))
    }

    async fn resolve_channel(&self, bullet: &ParsedBullet) -> Result<ResolvedEntity, StructuralError> {
        match self.resolver.resolve_channel_mention(&bullet.key).await {
            Ok(Some(channel)) => Ok(channel),
            Ok(None) => Err(StructuralError::UnresolvedChannel {
                line: bullet.source_line.clone(),
                mention: bullet.key.clone(),
            }),
            Err(error) => {
                tracing::warn!(%error, mention = %bullet.key, "channel mention lookup failed");
                Err(StructuralError::UnresolvedChannel {
                    line: bullet.source_line.clone(),
                    mention: bullet.key.clone(),
                })
            }
        }
    }

    async fn resolve_role(&self, bullet: &ParsedBullet) -> Result<ResolvedEntity, StructuralError> {
        match self.resolver.resolve_role_mention(&bullet.value).await {
            Ok(Some(role)) => Ok(role),
            Ok(None) => Err(StructuralError::UnresolvedRole {
                line: bullet.source_line.clone(),
                mention: bullet.value.clone(),
            }),
            Err(error) => {
                tracing::warn!(%error, mention = %bullet.value, "role mention lookup failed");
                Err(StructuralError::UnresolvedRole {
                    line: bullet.source_line.clone(),
                    mention: bullet.value.clone(),
                })
            }
        }
    }
}

/// Lowercase and collapse internal whitespace: `"Active   Role"` → `"active role"`.
fn normalize_field_name(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn parse_days(value: &str) -> Option<i64> {
    DAYS_REGEX
        .captures(value.trim())
        .and_then(|captures| captures[1].parse().ok())
}
