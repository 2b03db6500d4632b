//! Tunable settings and the optional `ringmend.toml` file.
//!
//! Every knob has a built-in default; a settings file only needs the
//! fields it wants to override. Durations are written as `"5s"`,
//! `"500ms"` or `"1m"`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::error::{Classify, ErrorClass};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid duration for `{field}`: {value}")]
    Duration { field: &'static str, value: String },

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

impl Classify for SettingsError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}

/// Request transport knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    /// Retries after the first attempt before the last error surfaces.
    pub retries: u32,
    /// Base delay; attempt `n` waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Upper bound on a single backoff delay.
    pub max_backoff: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Management API port used when talking to nodes directly.
    pub port: u16,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            retries: 10,
            backoff_factor: Duration::from_secs(5),
            max_backoff: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            port: 10000,
        }
    }
}

/// SSH tunnel knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelSettings {
    /// Address the management API listens on, as seen from the node.
    pub remote_host: String,
    pub remote_port: u16,
    pub keepalive: Duration,
    /// How long to wait for a freshly spawned tunnel to accept connections.
    pub ready_timeout: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            remote_host: "127.0.0.1".to_string(),
            remote_port: 10000,
            keepalive: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(15),
        }
    }
}

/// Orchestrator knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairSettings {
    /// Delay between two status polls of the same job.
    pub poll_interval: Duration,
    /// Pause after a failed range before retrying it table by table.
    pub fallback_cooldown: Duration,
    /// Consecutive failed ranges on one endpoint that abort the run.
    pub max_failures: u32,
    /// Endpoints repaired at the same time. Never more than one job per endpoint.
    pub endpoint_concurrency: usize,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            fallback_cooldown: Duration::from_secs(60),
            max_failures: 20,
            endpoint_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub channel: ChannelSettings,
    pub tunnel: TunnelSettings,
    pub repair: RepairSettings,
}

impl Settings {
    /// Load defaults overridden by the TOML file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            SettingsError::Parse { source, .. } => SettingsError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let file: SettingsFile = toml::from_str(content).map_err(|source| SettingsError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        let mut settings = Settings::default();
        file.apply(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.repair.max_failures == 0 {
            return Err(SettingsError::Zero("repair.max_failures"));
        }
        if self.repair.endpoint_concurrency == 0 {
            return Err(SettingsError::Zero("repair.endpoint_concurrency"));
        }
        Ok(())
    }
}

// ── On-disk representation ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    channel: Option<ChannelSection>,
    tunnel: Option<TunnelSection>,
    repair: Option<RepairSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelSection {
    retries: Option<u32>,
    backoff_factor: Option<String>,
    max_backoff: Option<String>,
    connect_timeout: Option<String>,
    read_timeout: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TunnelSection {
    remote_host: Option<String>,
    remote_port: Option<u16>,
    keepalive: Option<String>,
    ready_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepairSection {
    poll_interval: Option<String>,
    fallback_cooldown: Option<String>,
    max_failures: Option<u32>,
    endpoint_concurrency: Option<usize>,
}

impl SettingsFile {
    fn apply(self, settings: &mut Settings) -> Result<(), SettingsError> {
        if let Some(channel) = self.channel {
            let target = &mut settings.channel;
            if let Some(retries) = channel.retries {
                target.retries = retries;
            }
            if let Some(port) = channel.port {
                target.port = port;
            }
            set_duration(&mut target.backoff_factor, "channel.backoff_factor", channel.backoff_factor)?;
            set_duration(&mut target.max_backoff, "channel.max_backoff", channel.max_backoff)?;
            set_duration(&mut target.connect_timeout, "channel.connect_timeout", channel.connect_timeout)?;
            set_duration(&mut target.read_timeout, "channel.read_timeout", channel.read_timeout)?;
        }

        if let Some(tunnel) = self.tunnel {
            let target = &mut settings.tunnel;
            if let Some(host) = tunnel.remote_host {
                target.remote_host = host;
            }
            if let Some(port) = tunnel.remote_port {
                target.remote_port = port;
            }
            set_duration(&mut target.keepalive, "tunnel.keepalive", tunnel.keepalive)?;
            set_duration(&mut target.ready_timeout, "tunnel.ready_timeout", tunnel.ready_timeout)?;
        }

        if let Some(repair) = self.repair {
            let target = &mut settings.repair;
            if let Some(max) = repair.max_failures {
                target.max_failures = max;
            }
            if let Some(concurrency) = repair.endpoint_concurrency {
                target.endpoint_concurrency = concurrency;
            }
            set_duration(&mut target.poll_interval, "repair.poll_interval", repair.poll_interval)?;
            set_duration(
                &mut target.fallback_cooldown,
                "repair.fallback_cooldown",
                repair.fallback_cooldown,
            )?;
        }

        Ok(())
    }
}

fn set_duration(
    slot: &mut Duration,
    field: &'static str,
    value: Option<String>,
) -> Result<(), SettingsError> {
    if let Some(raw) = value {
        *slot = parse_duration(&raw).ok_or(SettingsError::Duration { field, value: raw })?;
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
