use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

use crate::{audio::player::PlayerSettings, sources::ytdlp::ResolverSettings};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproductor
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub queue_preview: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub max_track_duration: Duration,
    pub allow_live: bool,
    pub resolver_concurrency: usize,
    pub resolve_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds a config from any key lookup, applying defaults for missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: get("GUILD_ID").map(|s| parse("GUILD_ID", &s)).transpose()?,

            idle_timeout: get("IDLE_TIMEOUT")
                .map(|s| duration("IDLE_TIMEOUT", &s))
                .transpose()?
                .unwrap_or(defaults.idle_timeout),
            shutdown_grace: get("SHUTDOWN_GRACE")
                .map(|s| duration("SHUTDOWN_GRACE", &s))
                .transpose()?
                .unwrap_or(defaults.shutdown_grace),
            queue_preview: get("QUEUE_PREVIEW")
                .map(|s| parse("QUEUE_PREVIEW", &s))
                .transpose()?
                .unwrap_or(defaults.queue_preview),

            ytdlp_path: get("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            max_track_duration: get("MAX_TRACK_DURATION")
                .map(|s| duration("MAX_TRACK_DURATION", &s))
                .transpose()?
                .unwrap_or(defaults.max_track_duration),
            allow_live: get("ALLOW_LIVE")
                .map(|s| parse("ALLOW_LIVE", &s))
                .transpose()?
                .unwrap_or(defaults.allow_live),
            resolver_concurrency: get("RESOLVER_CONCURRENCY")
                .map(|s| parse("RESOLVER_CONCURRENCY", &s))
                .transpose()?
                .unwrap_or(defaults.resolver_concurrency),
            resolve_timeout: get("RESOLVE_TIMEOUT")
                .map(|s| duration("RESOLVE_TIMEOUT", &s))
                .transpose()?
                .unwrap_or(defaults.resolve_timeout),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Timeouts must be non-zero
    /// - Queue preview must show at least one track
    /// - The resolver needs at least one concurrent slot
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            anyhow::bail!("IDLE_TIMEOUT must be greater than 0");
        }

        if self.shutdown_grace.is_zero() {
            anyhow::bail!("SHUTDOWN_GRACE must be greater than 0");
        }

        if self.queue_preview == 0 {
            anyhow::bail!("QUEUE_PREVIEW must be greater than 0");
        }

        if self.max_track_duration.is_zero() {
            anyhow::bail!("MAX_TRACK_DURATION must be greater than 0");
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("RESOLVER_CONCURRENCY must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("RESOLVE_TIMEOUT must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Player: idle {}, grace {}, preview {}\n  \
            yt-dlp: {} (max {}, live={}, concurrency {}, timeout {})",
            self.guild_id
                .map_or("global".to_string(), |id| format!("guild {id}")),
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.shutdown_grace),
            self.queue_preview,
            self.ytdlp_path,
            humantime::format_duration(self.max_track_duration),
            self.allow_live,
            self.resolver_concurrency,
            humantime::format_duration(self.resolve_timeout),
        )
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_timeout: self.idle_timeout,
            shutdown_grace: self.shutdown_grace,
            preview_len: self.queue_preview,
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            binary: self.ytdlp_path.clone(),
            concurrency: self.resolver_concurrency,
            max_duration: self.max_track_duration,
            allow_live: self.allow_live,
            timeout: self.resolve_timeout,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            idle_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            queue_preview: 5,

            ytdlp_path: "yt-dlp".to_string(),
            max_track_duration: Duration::from_secs(2 * 60 * 60),
            allow_live: true,
            resolver_concurrency: 3,
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} inválido: {raw}"))
}

fn duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim()).with_context(|| format!("{key} inválido: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.queue_preview, 5);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.max_track_duration, Duration::from_secs(7200));
        assert!(config.allow_live);
        assert_eq!(config.resolver_concurrency, 3);
        assert_eq!(config.resolve_timeout, Duration::from_secs(30));
        assert_eq!(config.guild_id, None);
        config.validate().unwrap();
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn reads_humantime_durations_and_flags() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1234"),
            ("IDLE_TIMEOUT", "90s"),
            ("SHUTDOWN_GRACE", "2s"),
            ("MAX_TRACK_DURATION", "30m"),
            ("ALLOW_LIVE", "false"),
            ("QUEUE_PREVIEW", "10"),
            ("RESOLVE_TIMEOUT", "20s"),
        ])
        .unwrap();

        assert_eq!(config.guild_id, Some(1234));
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.max_track_duration, Duration::from_secs(1800));
        assert!(!config.allow_live);
        assert_eq!(config.resolver_settings().timeout, Duration::from_secs(20));

        let settings = config.player_settings();
        assert_eq!(settings.idle_timeout, Duration::from_secs(90));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(2));
        assert_eq!(settings.preview_len, 10);
    }

    #[test]
    fn garbage_values_are_rejected() {
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("IDLE_TIMEOUT", "pronto")]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("ALLOW_LIVE", "quizás")]).is_err());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let config = config_from(&[("DISCORD_TOKEN", "abc"), ("IDLE_TIMEOUT", "0s")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[("DISCORD_TOKEN", "abc"), ("QUEUE_PREVIEW", "0")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_never_leaks_the_token() {
        let config = config_from(&[("DISCORD_TOKEN", "super-secreto")]).unwrap();
        let summary = config.summary();

        assert!(!summary.contains("super-secreto"));
        assert!(summary.contains("idle 5m"));
    }
}
