//! Capture settings, layered from defaults, an optional TOML file and
//! `SNAPCAM_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{CameraError, Result};
use crate::format::FormatRequest;
use crate::traits::FourCC;

/// Settings for one capture run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device node. When unset, the first usable camera is discovered.
    pub device: Option<PathBuf>,
    /// Buffers to request for the ring.
    pub buffer_count: u32,
    /// Frames to capture.
    pub frame_count: u32,
    /// Where the last frame is written.
    pub output: PathBuf,
    /// Preferred FourCC, e.g. `"YUYV"`.
    pub pixel_format: Option<String>,
    /// Requested `[width, height]`.
    pub resolution: Option<[u32; 2]>,
    /// Per-frame wait bound in milliseconds. Unset blocks.
    pub frame_timeout_ms: Option<u64>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_count: 10,
            frame_count: 100,
            output: PathBuf::from("image.pgm"),
            pixel_format: None,
            resolution: None,
            frame_timeout_ms: None,
            log_filter: "snapcam=info".into(),
        }
    }
}

impl CaptureConfig {
    /// Load settings. A given file must exist; the environment overrides it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("SNAPCAM").try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|err| CameraError::Config(err.to_string()))
    }

    /// The format preferences these settings describe.
    pub fn format_request(&self) -> Result<FormatRequest> {
        let fourcc = self
            .pixel_format
            .as_deref()
            .map(str::parse::<FourCC>)
            .transpose()
            .map_err(CameraError::Config)?;
        Ok(FormatRequest {
            fourcc,
            resolution: self.resolution.map(|[width, height]| (width, height)),
        })
    }

    /// Per-frame wait bound.
    pub fn frame_timeout(&self) -> Option<Duration> {
        self.frame_timeout_ms.map(Duration::from_millis)
    }
}
