use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};
use tracing::Level;

use crate::audio::{
    player::PlayerSettings,
    queue::{DEFAULT_QUEUE_CAPACITY, DEFAULT_VOLUME},
    validator::{TrackPolicy, DEFAULT_MAX_DURATION_SECS, DEFAULT_MAX_SIZE_BYTES},
};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub guild_id: Option<u64>, // Para registrar comandos en un solo servidor

    // Logging
    pub log_level: Level,

    // Cola y límites
    pub max_queue_size: usize,
    pub max_song_duration: u64, // En segundos
    pub max_song_size: u64,     // En bytes
    pub default_volume: u8,     // Porcentaje

    // Tareas de fondo
    pub download_tick: Duration,
    pub idle_sweep: Duration,
    pub worker_threads: usize,

    // Resolver
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("BNSS_TOKEN").context("BNSS_TOKEN is not set")?,
            command_prefix: std::env::var("PREFIX").unwrap_or_else(|_| "!".to_string()),
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            log_level: parse_log_level(
                &std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            )?,

            max_queue_size: env_or("MAX_QUEUE_SIZE", DEFAULT_QUEUE_CAPACITY)?,
            max_song_duration: env_or("MAX_SONG_DURATION", DEFAULT_MAX_DURATION_SECS)?,
            max_song_size: env_or("MAX_SONG_SIZE", DEFAULT_MAX_SIZE_BYTES)?,
            default_volume: env_or("DEFAULT_VOLUME", DEFAULT_VOLUME)?,

            download_tick: Duration::from_millis(env_or("DOWNLOAD_TICK_MS", 1000)?),
            idle_sweep: Duration::from_secs(env_or("IDLE_SWEEP_SECS", 120)?),
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The token must not be empty
    /// - Queue size, song limits and worker threads must be greater than 0
    /// - Default volume must be between 0 and 100
    /// - Background task periods must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("BNSS_TOKEN must not be empty");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.max_song_size == 0 {
            anyhow::bail!("Max song size must be greater than 0");
        }

        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.download_tick.is_zero() || self.idle_sweep.is_zero() {
            anyhow::bail!("Background task periods must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Token-free summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}' (Commands: {})\n  \
            Limits: {} queue, {}s max duration, {} MB max size\n  \
            Audio: {}% default volume\n  \
            Tasks: {}ms download tick, {}s idle sweep, {} workers\n  \
            Resolver: {}",
            self.command_prefix,
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.max_queue_size,
            self.max_song_duration,
            self.max_song_size / 1_000_000,
            self.default_volume,
            self.download_tick.as_millis(),
            self.idle_sweep.as_secs(),
            self.worker_threads,
            self.ytdlp_path,
        )
    }

    pub fn policy(&self) -> TrackPolicy {
        TrackPolicy {
            max_duration_secs: self.max_song_duration,
            max_size_bytes: self.max_song_size,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            queue_capacity: self.max_queue_size,
            default_volume: self.default_volume,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            guild_id: None,

            log_level: Level::INFO,

            max_queue_size: DEFAULT_QUEUE_CAPACITY,
            max_song_duration: DEFAULT_MAX_DURATION_SECS,
            max_song_size: DEFAULT_MAX_SIZE_BYTES,
            default_volume: DEFAULT_VOLUME,

            download_tick: Duration::from_secs(1),
            idle_sweep: Duration::from_secs(120),
            worker_threads: num_cpus::get(),

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, val)),
        _ => Ok(default),
    }
}

/// Accepts tracing level names and the numeric levels used by Python loggers.
pub fn parse_log_level(raw: &str) -> Result<Level> {
    let raw = raw.trim();
    let level = match raw {
        "10" => Level::DEBUG,
        "20" => Level::INFO,
        "30" => Level::WARN,
        "40" | "50" => Level::ERROR,
        _ => match raw.to_ascii_lowercase().as_str() {
            "warning" => Level::WARN,
            "critical" => Level::ERROR,
            other => Level::from_str(other)
                .map_err(|_| anyhow::anyhow!("invalid LOG_LEVEL: {:?}", raw))?,
        },
    };
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token".into(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_are_valid_with_token() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(
            config.policy(),
            TrackPolicy {
                max_duration_secs: 600,
                max_size_bytes: 20_000_000
            }
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Config::default().validate().is_err());

        let mut config = valid();
        config.default_volume = 101;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.idle_sweep = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_names_and_numbers() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("10").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("30").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("50").unwrap(), Level::ERROR);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let mut config = valid();
        config.discord_token = "super-secret".into();
        config.guild_id = Some(42);

        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("guild 42"));
    }
}
