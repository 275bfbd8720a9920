//! # Streaming Configuration
//!
//! Tunables consumed by the chunk streaming core. The configuration is plain data:
//! it is read once at start-up (from JSON) and handed by value to the `World`.
//!
//! Every field has a default, so a configuration file only needs to mention the
//! values it overrides:
//!
//! ```json
//! { "render_distance": 12, "meshing_threads": 4 }
//! ```

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/streaming.json";

/// Errors produced while loading or validating a [`StreamingConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside the range the streaming core can work with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Exponential backoff applied to chunk positions whose generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on the delay between retries, in milliseconds
    pub max_delay_ms: u64,
    /// Number of failing positions remembered at once (least recently failed are forgotten first)
    pub tracked_positions: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            tracked_positions: 1024,
        }
    }
}

impl RetryConfig {
    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum delay between retries.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Configuration surface of the chunk streaming core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Radius, in chunks, of the square of chunks kept around the viewpoint
    pub render_distance: u32,
    /// Extra chunks beyond `render_distance` before a resident chunk is unloaded
    pub unload_margin: u32,
    /// Number of terrain generation worker threads
    pub generation_threads: usize,
    /// Number of meshing worker threads
    pub meshing_threads: usize,
    /// Finished meshes uploaded to the GPU per frame, at most
    pub max_uploads_per_frame: usize,
    /// Dirty chunks sent back for meshing per frame, at most
    pub max_rebuilds_per_frame: usize,
    /// How long shutdown waits for worker threads before detaching them, in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Seed handed to the default terrain generator
    pub world_seed: u32,
    /// Retry policy for failed chunk generation
    pub retry: RetryConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            render_distance: 8,
            unload_margin: 2,
            generation_threads: 2,
            meshing_threads: 2,
            max_uploads_per_frame: 4,
            max_rebuilds_per_frame: 2,
            shutdown_timeout_ms: 3_000,
            world_seed: 0,
            retry: RetryConfig::default(),
        }
    }
}

impl StreamingConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StreamingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads the configuration at `path`, falling back to the defaults when the
    /// file does not exist. Any other failure is returned.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "No configuration found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Checks that every value is usable by the streaming core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_distance == 0 {
            return Err(ConfigError::Invalid(
                "render_distance must be at least 1".into(),
            ));
        }
        if self.generation_threads == 0 || self.meshing_threads == 0 {
            return Err(ConfigError::Invalid(
                "generation_threads and meshing_threads must be at least 1".into(),
            ));
        }
        if self.max_uploads_per_frame == 0 || self.max_rebuilds_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "per-frame upload and rebuild budgets must be at least 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.retry.tracked_positions == 0 {
            return Err(ConfigError::Invalid(
                "retry.tracked_positions must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Chebyshev distance, in chunks, beyond which resident chunks are unloaded.
    pub fn unload_distance(&self) -> i32 {
        (self.render_distance + self.unload_margin) as i32
    }

    /// Bounded wait applied to worker pools on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.unload_distance(), 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            StreamingConfig::from_json(r#"{ "render_distance": 3, "retry": { "base_delay_ms": 5 } }"#)
                .unwrap();

        assert_eq!(config.render_distance, 3);
        assert_eq!(config.meshing_threads, 2);
        assert_eq!(config.retry.base_delay_ms, 5);
        assert_eq!(config.retry.max_delay_ms, 10_000);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let result = StreamingConfig::from_json(r#"{ "meshing_threads": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = StreamingConfig::from_json("{ render_distance: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = StreamingConfig::load_or_default("does/not/exist.json").unwrap();
        assert_eq!(config, StreamingConfig::default());
    }
}
