//! Live camera capture served as an MJPEG stream over HTTP.
//!
//! A single capture thread publishes the newest frame into a [`FrameSlot`];
//! every connected client gets its own [`StreamSession`] that reads the slot
//! at its own pace. The [`DeviceController`] owns the start/stop lifecycle.

pub mod capture;
pub mod controller;
pub mod encode;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod telemetry;

use std::net::IpAddr;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use controller::{CaptureState, DeviceController, DeviceStatus};
pub use error::{CaptureError, Result};
pub use pipeline::{FrameSlot, StreamSession};

/// Prefix for environment overrides, e.g. `CAMSTREAM__DEVICE__WIDTH=1280`
pub const ENV_PREFIX: &str = "CAMSTREAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub stream: StreamConfig,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// `/dev/video<index>`
    #[default]
    V4l2,
    /// Built-in colour bars, no hardware needed
    TestPattern,
}

/// Requested capture parameters, fixed for the life of a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub source: SourceKind,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; also the emission cadence of stream sessions
    pub fps: u32,
    pub buffer_count: u32,
    /// Upper bound on one blocking read, so stop is noticed promptly
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub jpeg_quality: u8,
    pub boundary: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::V4l2,
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            buffer_count: 4,
            read_timeout_ms: 1000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 5000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: encode::JPEG_QUALITY,
            boundary: encode::BOUNDARY.to_owned(),
        }
    }
}

impl Config {
    /// Layer built-in defaults, an optional TOML file and `CAMSTREAM__*`
    /// environment variables, later sources winning.
    pub fn load(file: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
