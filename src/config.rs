//! Runtime configuration
//!
//! Sender-side settings live in [`TrackingConfig`], receiver-side settings in
//! [`ReceiverConfig`]. Both deserialize from JSON; missing fields take their
//! defaults.
//!
//! # Examples
//!
//! ```
//! use mlc_tracking_rust::config::TrackingConfig;
//!
//! let config = TrackingConfig::from_json_str(r#"{
//!     "consumer_addr": "10.0.0.5:31000",
//!     "connect_timeout_ms": 2000,
//!     "upsample_ratio": 4
//! }"#)?;
//! assert_eq!(config.consumer_addr, "10.0.0.5:31000");
//! assert_eq!(config.send_timeout_ms, None);
//! # Ok::<(), mlc_tracking_rust::TrackingError>(())
//! ```

use crate::error::{Result, TrackingError};
use crate::pipeline::inference::{Device, ModelDimensions};
use crate::protocol::{message_size, payload_size};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default address of the tracking consumer
pub const DEFAULT_CONSUMER_ADDR: &str = "localhost:31000";

/// Default receive chunk size of the reference receiver
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// `host:port` of the tracking consumer
    pub consumer_addr: String,
    /// Connect timeout; `None` blocks until the OS gives up
    pub connect_timeout_ms: Option<u64>,
    /// Per-send write timeout; `None` blocks indefinitely
    pub send_timeout_ms: Option<u64>,
    /// Grid upsample ratio of the super-resolution model
    pub upsample_ratio: u32,
    /// Shapes the model was trained for
    pub model_dimensions: ModelDimensions,
    /// Device the model runs on
    pub device: Device,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            consumer_addr: DEFAULT_CONSUMER_ADDR.to_string(),
            connect_timeout_ms: None,
            send_timeout_ms: None,
            upsample_ratio: 4,
            model_dimensions: ModelDimensions::default(),
            device: Device::Cpu,
        }
    }
}

impl TrackingConfig {
    /// Config for the given consumer address, everything else default
    pub fn new(consumer_addr: impl Into<String>) -> Self {
        TrackingConfig {
            consumer_addr: consumer_addr.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.consumer_addr.trim().is_empty() {
            return Err(TrackingError::InvalidConfig(
                "consumer_addr must not be empty".to_string(),
            ));
        }
        if self.upsample_ratio == 0 {
            return Err(TrackingError::InvalidConfig(
                "upsample_ratio must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == Some(0) || self.send_timeout_ms == Some(0) {
            return Err(TrackingError::InvalidConfig(
                "timeouts must be positive; omit them to block".to_string(),
            ));
        }
        self.model_dimensions.validate()?;

        let [_, _, height, width] = self.model_dimensions.input;
        let upsampled = |count: usize| {
            usize::try_from(self.upsample_ratio)
                .ok()
                .and_then(|r| count.checked_mul(r))
        };
        match (upsampled(width), upsampled(height)) {
            (Some(w), Some(h)) if payload_size(w, h).is_ok() => Ok(()),
            _ => Err(TrackingError::InvalidConfig(format!(
                "upsample_ratio {} makes a {} x {} frame too large to send",
                self.upsample_ratio, height, width
            ))),
        }
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Send timeout as a [`Duration`]
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

/// Reference receiver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Address to listen on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Side length of the square image grid carried by each message
    pub side: usize,
    /// Show a preview of the first image
    #[serde(default)]
    pub display: bool,
    /// Maximum bytes requested per read
    #[serde(default = "default_chunk_size")]
    pub read_chunk_size: usize,
}

fn default_bind_addr() -> String {
    DEFAULT_CONSUMER_ADDR.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

impl ReceiverConfig {
    /// Config for a `side` x `side` grid on the default address
    pub fn new(side: usize) -> Self {
        ReceiverConfig {
            bind_addr: default_bind_addr(),
            side,
            display: false,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(TrackingError::InvalidConfig(
                "read_chunk_size must be at least 1".to_string(),
            ));
        }
        if message_size(self.side).is_err() {
            return Err(TrackingError::InvalidConfig(format!(
                "side {} is too large for the payload size field",
                self.side
            )));
        }
        Ok(())
    }
}
