//! Snapcam: single-device V4L2 capture with a brightness feedback loop.
//!
//! The library negotiates capabilities, input, pixel format and controls
//! with one video4linux device, maps a ring of kernel buffers and streams
//! frames through a [`Camera`]. Every device operation goes through the
//! [`VideoDevice`] trait, so the whole pipeline can be driven by a mock in
//! tests.

pub mod camera;
pub mod caps;
pub mod config;
pub mod controls;
pub mod device;
pub mod discovery;
pub mod error;
pub mod format;
pub mod input;
pub mod quality;
pub mod ring;
pub mod sink;
pub mod state;
pub mod stream;
mod sys;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod mock;

pub use camera::Camera;
pub use config::CaptureConfig;
pub use controls::{ControlDescriptor, ControlRegistry};
pub use device::V4L2Device;
pub use error::{CameraError, Result};
pub use format::{FormatCatalog, FormatRequest};
pub use quality::{FrameQualityStats, LumaLayout, QualityFeedbackLoop};
pub use state::SessionState;
pub use stream::Frame;
pub use traits::{DeviceCapabilities, FourCC, PixelFormatDescriptor, VideoDevice};
pub use worker::{CaptureWorker, CapturedFrame};
