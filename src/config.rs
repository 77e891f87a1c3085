use anyhow::{bail, Context, Result};
#[cfg(test)]
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::rtp::JitterConfig;

/// Longest configurable hold-out for a missing packet
pub const MAX_JITTER_WAIT_MS: u64 = 10_000;

/// Longest configurable receive run
pub const MAX_LISTEN_DURATION_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    // UDP port for incoming RTP (0 lets the OS pick)
    pub rtp_port: u16,

    // Jitter buffer settings
    pub jitter_max_wait_ms: u64,
    pub jitter_blocking: bool,
    pub jitter_fifo: bool,

    // How long a receive run lasts
    pub listen_duration_secs: u64,

    // Print final statistics as JSON instead of log lines
    pub stats_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            rtp_port: get("RTP_PORT")
                .unwrap_or_else(|| "0".to_string())
                .parse()
                .context("RTP_PORT must be a valid port number")?,

            jitter_max_wait_ms: get("JITTER_MAX_WAIT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            jitter_blocking: parse_bool(&get, "JITTER_BLOCKING", true)?,
            jitter_fifo: parse_bool(&get, "JITTER_FIFO", false)?,

            listen_duration_secs: get("LISTEN_DURATION_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .unwrap_or(10),

            stats_json: parse_bool(&get, "STATS_JSON", false)?,
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.jitter_max_wait_ms > MAX_JITTER_WAIT_MS {
            errors.push(format!(
                "JITTER_MAX_WAIT_MS={} is too long (max: {}).",
                self.jitter_max_wait_ms, MAX_JITTER_WAIT_MS
            ));
        }

        if self.listen_duration_secs == 0 {
            errors.push("LISTEN_DURATION_SECS must be greater than 0.".to_string());
        } else if self.listen_duration_secs > MAX_LISTEN_DURATION_SECS {
            errors.push(format!(
                "LISTEN_DURATION_SECS={} seems too long (max recommended: {}).",
                self.listen_duration_secs, MAX_LISTEN_DURATION_SECS
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    /// Jitter buffer settings
    pub fn jitter(&self) -> JitterConfig {
        JitterConfig {
            max_wait: Duration::from_millis(self.jitter_max_wait_ms),
            blocking: self.jitter_blocking,
            fifo: self.jitter_fifo,
        }
    }

    pub fn listen_duration(&self) -> Duration {
        Duration::from_secs(self.listen_duration_secs)
    }
}

/// Parse a boolean flag, falling back to `default` when unset
fn parse_bool<F>(get: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean (true/false), got '{}'", key, other),
    }
}
