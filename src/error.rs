//! Error type for camera operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::traits::ControlId;

/// Error type for camera operations.
///
/// Variants fall into two tiers. Negotiation failures (see
/// [`CameraError::is_negotiation_failure`]) leave the device untouched and a
/// caller may move on to another candidate. Everything else happens after
/// negotiation and is fatal to the session.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device node could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    DeviceOpenFailed {
        /// Path of the device node.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The capability query itself failed.
    #[error("VIDIOC_QUERYCAP failed: {0}")]
    QueryFailed(#[source] io::Error),

    /// The device reports neither single- nor multi-planar capture.
    #[error("device cannot do video capture")]
    NoCapture,

    /// The device can capture but not through streaming I/O.
    #[error("device does not support streaming I/O")]
    NoStreaming,

    /// No enumerated input is of the camera type.
    #[error("no camera input found")]
    NoCameraInput,

    /// The device did not switch to the requested input.
    #[error("input selection failed: requested {expected}, device reports {actual}")]
    InputSelection {
        /// Input index that was written.
        expected: u32,
        /// Input index read back from the device.
        actual: u32,
    },

    /// No enumerated format is usable for video capture.
    #[error("no supported capture format")]
    NoSupportedFormat,

    /// The device rejected the negotiated format.
    #[error("VIDIOC_S_FMT rejected: {0}")]
    SetFormatRejected(#[source] io::Error),

    /// An input or format query failed while negotiating.
    #[error("{op} failed during negotiation: {source}")]
    Negotiation {
        /// Name of the failing operation.
        op: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A control value could not be read.
    #[error("reading control {id} failed: {source}")]
    ControlQuery {
        /// Control identifier.
        id: ControlId,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A control value was rejected by the device.
    #[error("setting control {id} failed: {source}")]
    ControlSet {
        /// Control identifier.
        id: ControlId,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The control is flagged read-only or disabled.
    #[error("control {0} is not writable")]
    ControlNotWritable(ControlId),

    /// The control id was never enumerated.
    #[error("unknown control {0}")]
    UnknownControl(ControlId),

    /// The buffer request was rejected.
    #[error("VIDIOC_REQBUFS failed: {0}")]
    RequestRejected(#[source] io::Error),

    /// The device granted zero buffers.
    #[error("device granted no buffers")]
    NoBuffersGranted,

    /// Mapping a granted buffer failed.
    #[error("mapping buffer {index} failed: {source}")]
    MapFailed {
        /// Ring slot that failed.
        index: u32,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Any other ioctl failure, named by its request.
    #[error("{op} failed: {source}")]
    Ioctl {
        /// Name of the ioctl request.
        op: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A ring slot was used out of order.
    #[error("buffer {index} is {state}, cannot {action}")]
    BufferState {
        /// Ring slot.
        index: u32,
        /// State the slot was in.
        state: &'static str,
        /// Operation that was refused.
        action: &'static str,
    },

    /// The kernel returned a slot index outside the ring.
    #[error("buffer index {index} out of range (ring holds {count})")]
    BufferIndex {
        /// Index reported or requested.
        index: u32,
        /// Ring size.
        count: u32,
    },

    /// Streaming was started with no buffer queued.
    #[error("no buffer queued before stream start")]
    NothingQueued,

    /// The operation requires an active stream.
    #[error("stream is not running")]
    NotStreaming,

    /// The operation requires a stopped stream.
    #[error("stream is already running")]
    AlreadyStreaming,

    /// Negotiation has not been completed.
    #[error("device not negotiated")]
    NotNegotiated,

    /// Buffers have not been allocated.
    #[error("buffers not allocated")]
    NotAllocated,

    /// Waiting for a frame timed out.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// The capture worker thread stopped unexpectedly.
    #[error("capture worker terminated: {0}")]
    Worker(String),

    /// Writing a frame to disk failed.
    #[error("saving frame to {}: {reason}", path.display())]
    Sink {
        /// Destination path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The configuration could not be loaded or holds a bad value.
    #[error("configuration: {0}")]
    Config(String),
}

impl CameraError {
    /// Whether the failure happened during negotiation, before any buffer
    /// or stream state was touched.
    pub const fn is_negotiation_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpenFailed { .. }
                | Self::QueryFailed(_)
                | Self::NoCapture
                | Self::NoStreaming
                | Self::NoCameraInput
                | Self::InputSelection { .. }
                | Self::NoSupportedFormat
                | Self::SetFormatRejected(_)
                | Self::Negotiation { .. }
        )
    }

    pub(crate) const fn ioctl(op: &'static str, source: io::Error) -> Self {
        Self::Ioctl { op, source }
    }

    pub(crate) const fn negotiation(op: &'static str, source: io::Error) -> Self {
        Self::Negotiation { op, source }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
