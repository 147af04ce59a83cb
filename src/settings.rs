//! Process settings: credentials, ids, and sweep tuning.
//!
//! Sources, lowest precedence first: the TOML settings file, `MODBOT_*`
//! environment variables, then command-line flags (applied by `main`).

use crate::error::SettingsError;
use crate::{ChannelId, GuildId};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_HISTORY_SCAN_LIMIT: usize = 500;

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub discord_token: String,
    pub guild_id: GuildId,
    /// Channel moderators post configuration messages in.
    pub config_channel_id: ChannelId,
    /// Log moderation actions instead of performing them.
    pub dry_run: bool,
    pub sweep_interval_secs: u64,
    /// How many configuration channel messages the startup scan reads.
    pub history_scan_limit: usize,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("discord_token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("config_channel_id", &self.config_channel_id)
            .field("dry_run", &self.dry_run)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("history_scan_limit", &self.history_scan_limit)
            .finish()
    }
}

/// On-disk shape of the settings file. Every key is optional so the
/// environment can supply the rest.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    discord_token: Option<String>,
    guild_id: Option<u64>,
    config_channel_id: Option<u64>,
    dry_run: Option<bool>,
    sweep_interval_secs: Option<u64>,
    history_scan_limit: Option<usize>,
}

impl Settings {
    /// `<config dir>/modbot/settings.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("modbot").join("settings.toml"))
    }

    /// Load from `path` (or the default path) and the process environment.
    ///
    /// An explicit path must exist. A missing default file is treated as empty.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => SettingsFile::default(),
            },
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources(
        file: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let discord_token = env("MODBOT_DISCORD_TOKEN")
            .or(file.discord_token)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SettingsError::MissingKey("discord_token".into()))?;

        let guild_id = env_parsed(&env, "MODBOT_GUILD_ID")?
            .or(file.guild_id)
            .ok_or_else(|| SettingsError::MissingKey("guild_id".into()))?;

        let config_channel_id = env_parsed(&env, "MODBOT_CONFIG_CHANNEL_ID")?
            .or(file.config_channel_id)
            .ok_or_else(|| SettingsError::MissingKey("config_channel_id".into()))?;

        let dry_run = match env("MODBOT_DRY_RUN") {
            Some(value) => parse_bool("MODBOT_DRY_RUN", &value)?,
            None => file.dry_run.unwrap_or(false),
        };

        let sweep_interval_secs = env_parsed(&env, "MODBOT_SWEEP_INTERVAL_SECS")?
            .or(file.sweep_interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let history_scan_limit = env_parsed(&env, "MODBOT_HISTORY_SCAN_LIMIT")?
            .or(file.history_scan_limit)
            .unwrap_or(DEFAULT_HISTORY_SCAN_LIMIT);

        let settings = Self {
            discord_token,
            guild_id,
            config_channel_id,
            dry_run,
            sweep_interval_secs,
            history_scan_limit,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.guild_id == 0 {
            return Err(SettingsError::Invalid("guild_id must be non-zero".into()));
        }
        if self.config_channel_id == 0 {
            return Err(SettingsError::Invalid(
                "config_channel_id must be non-zero".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.history_scan_limit == 0 {
            return Err(SettingsError::Invalid(
                "history_scan_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn read_file(path: &Path) -> Result<SettingsFile, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|error| SettingsError::Load {
        path: path.display().to_string(),
        source: Arc::new(error),
    })?;
    parse_file(&content, path)
}

fn parse_file(content: &str, path: &Path) -> Result<SettingsFile, SettingsError> {
    toml::from_str(content).map_err(|source| SettingsError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn env_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, SettingsError> {
    env(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| SettingsError::Invalid(format!("{key}={value} is not a valid number")))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::Invalid(format!(
            "{key}={value} is not a boolean"
        ))),
    }
}
