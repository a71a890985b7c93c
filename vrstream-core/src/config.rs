//! Centralized configuration for a streaming client.
//!
//! All tunable parameters of a session are defined here. Values can be
//! loaded from a JSON file and overridden through environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::timer::SimTime;

/// Default trace dataset with per-segment reply sizes.
pub const DEFAULT_TRACE_PATH: &str = "video1_8333333.csv";

/// Errors in client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Stop time set and earlier than start time
    #[error("invalid time bounds: stop time {stop:?} is earlier than start time {start:?}")]
    InvalidTimeBounds { start: SimTime, stop: SimTime },

    /// A field holds a value outside its domain
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Configuration file could not be read
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration of one logical streaming client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Earliest time the first connection is opened
    pub start_time: SimTime,
    /// Hard cutoff for any session activity (None = unbounded)
    pub stop_time: Option<SimTime>,
    /// Size of each request in bytes
    pub request_length: u64,
    /// Reply size used when the trace has no entry for a segment
    pub reply_length: u64,
    /// Delay between a reply arriving and the next request
    pub think_time: Duration,
    /// Delay before reconnecting after a clean close
    pub idle_interval: Duration,
    /// Delay before reconnecting after a transport failure
    pub reconnect_interval: Duration,
    /// Send the first request together with the connection open
    pub early_send: bool,
    /// Number of segments in the video
    pub video_duration: u32,
    /// Segment size trace (None = every lookup falls back to `reply_length`)
    pub trace_path: Option<PathBuf>,
    /// Directory for CSV metric files (None = metrics are not persisted)
    pub metrics_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            start_time: Duration::from_secs(1),
            stop_time: None,
            request_length: 200,
            reply_length: 1_048_576, // 1 MiB
            think_time: Duration::from_secs(1),
            idle_interval: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(30),
            early_send: false,
            video_duration: 60,
            trace_path: Some(PathBuf::from(DEFAULT_TRACE_PATH)),
            metrics_dir: None,
        }
    }
}

impl ClientConfig {
    /// Checks the configuration before any timer is armed.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidTimeBounds` - Stop time is earlier than start time
    /// - `ConfigError::InvalidValue` - Video duration is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(stop) = self.stop_time {
            if stop < self.start_time {
                return Err(ConfigError::InvalidTimeBounds {
                    start: self.start_time,
                    stop,
                });
            }
        }

        if self.video_duration == 0 {
            return Err(ConfigError::InvalidValue {
                field: "video_duration",
                reason: "must contain at least one segment".to_string(),
            });
        }

        Ok(())
    }

    /// Number of requests issued per connection, at least one.
    pub fn session_length(&self) -> u32 {
        self.video_duration.max(1)
    }

    /// Parses configuration from JSON text.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Parse` - Text is not valid configuration JSON
    /// - `ConfigError::InvalidValue` - A time value is negative or not finite
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: ClientConfigFile = serde_json::from_str(json)?;
        file.into_config()
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` - File cannot be read
    /// - `ConfigError::Parse` - File is not valid configuration JSON
    /// - `ConfigError::InvalidValue` - A time value is negative or not finite
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Applies `VRSTREAM_*` environment variable overrides.
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_seconds("VRSTREAM_START_TIME") {
            self.start_time = value;
        }

        if let Ok(raw) = std::env::var("VRSTREAM_STOP_TIME") {
            if let Ok(seconds) = raw.parse::<f64>() {
                self.stop_time = stop_time_from_secs(seconds);
            }
        }

        if let Some(value) = env_seconds("VRSTREAM_THINK_TIME") {
            self.think_time = value;
        }

        if let Some(value) = env_seconds("VRSTREAM_IDLE_INTERVAL") {
            self.idle_interval = value;
        }

        if let Some(value) = env_seconds("VRSTREAM_RECONNECT_INTERVAL") {
            self.reconnect_interval = value;
        }

        if let Ok(early) = std::env::var("VRSTREAM_EARLY_SEND") {
            self.early_send = early.parse().unwrap_or(self.early_send);
        }

        if let Ok(duration) = std::env::var("VRSTREAM_VIDEO_DURATION") {
            if let Ok(count) = duration.parse::<u32>() {
                self.video_duration = count;
            }
        }

        if let Ok(path) = std::env::var("VRSTREAM_TRACE_PATH") {
            self.trace_path = Some(PathBuf::from(path));
        }

        self
    }
}

fn env_seconds(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    let seconds = raw.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

fn stop_time_from_secs(seconds: f64) -> Option<SimTime> {
    if seconds < 0.0 {
        None
    } else {
        Duration::try_from_secs_f64(seconds).ok()
    }
}

/// On-disk configuration schema, times in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfigFile {
    pub start_time: f64,
    /// Negative means unbounded
    pub stop_time: f64,
    pub request_length: u64,
    pub reply_length: u64,
    pub think_time: f64,
    pub idle_interval: f64,
    pub reconnect_interval: f64,
    pub early_send: bool,
    pub video_duration: u32,
    pub trace_path: Option<PathBuf>,
    pub metrics_dir: Option<PathBuf>,
}

impl Default for ClientConfigFile {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            start_time: defaults.start_time.as_secs_f64(),
            stop_time: -1.0,
            request_length: defaults.request_length,
            reply_length: defaults.reply_length,
            think_time: defaults.think_time.as_secs_f64(),
            idle_interval: defaults.idle_interval.as_secs_f64(),
            reconnect_interval: defaults.reconnect_interval.as_secs_f64(),
            early_send: defaults.early_send,
            video_duration: defaults.video_duration,
            trace_path: defaults.trace_path,
            metrics_dir: defaults.metrics_dir,
        }
    }
}

impl ClientConfigFile {
    /// Converts file values into a runtime configuration.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidValue` - A time value is negative or not finite
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let stop_time = if self.stop_time < 0.0 {
            None
        } else {
            Some(seconds_field("stopTime", self.stop_time)?)
        };

        Ok(ClientConfig {
            start_time: seconds_field("startTime", self.start_time)?,
            stop_time,
            request_length: self.request_length,
            reply_length: self.reply_length,
            think_time: seconds_field("thinkTime", self.think_time)?,
            idle_interval: seconds_field("idleInterval", self.idle_interval)?,
            reconnect_interval: seconds_field("reconnectInterval", self.reconnect_interval)?,
            early_send: self.early_send,
            video_duration: self.video_duration,
            trace_path: self.trace_path,
            metrics_dir: self.metrics_dir,
        })
    }
}

fn seconds_field(field: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|e| ConfigError::InvalidValue {
        field,
        reason: format!("{seconds} is not a valid time in seconds: {e}"),
    })
}
