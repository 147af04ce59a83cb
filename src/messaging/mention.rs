//! Discord inline markup: channel/role mentions and the other `<...>` forms
//! the platform itself produces.

use regex::Regex;
use std::sync::LazyLock;

static CHANNEL_MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<#(\d+)>$").expect("hardcoded channel mention regex"));

static ROLE_MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@&(\d+)>$").expect("hardcoded role mention regex"));

/// Every `<...>` form Discord renders natively: channel, role and user
/// mentions, custom emoji, and timestamps.
static PLATFORM_MARKUP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?:#\d+|@&\d+|@!?\d+|a?:\w+:\d+|t:-?\d+(?::[tTdDfFR])?)>$")
        .expect("hardcoded platform markup regex")
});

/// Extract the channel id from `<#123>`.
pub fn parse_channel_mention(text: &str) -> Option<u64> {
    CHANNEL_MENTION_REGEX
        .captures(text.trim())
        .and_then(|captures| captures[1].parse().ok())
}

/// Extract the role id from `<@&456>`.
pub fn parse_role_mention(text: &str) -> Option<u64> {
    ROLE_MENTION_REGEX
        .captures(text.trim())
        .and_then(|captures| captures[1].parse().ok())
}

/// Whether a complete `<...>` tag is markup the platform produced.
pub fn is_platform_markup(tag: &str) -> bool {
    PLATFORM_MARKUP_REGEX.is_match(tag)
}

pub fn format_channel_mention(channel_id: u64) -> String {
    format!("<#{channel_id}>")
}

pub fn format_role_mention(role_id: u64) -> String {
    format!("<@&{role_id}>")
}
