//! Device-wide session fields shared by the negotiation components.

use crate::error::{CameraError, Result};
use crate::traits::{ControlId, DeviceCapabilities, PixelFormatDescriptor};

/// Everything negotiation learns about the device.
///
/// Each component reads and writes the fields it owns through a reference
/// passed in by the [`Camera`](crate::Camera); nothing is process-wide.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Capabilities read during negotiation.
    pub capabilities: Option<DeviceCapabilities>,
    /// Selected camera input, confirmed by the device.
    pub input: Option<u32>,
    /// Negotiated format as last read back from the device.
    pub format: Option<PixelFormatDescriptor>,
    /// Brightness control, if the device has one.
    pub brightness: Option<ControlId>,
}

impl SessionState {
    /// Whether capabilities, input and format have all been settled.
    pub const fn is_negotiated(&self) -> bool {
        self.capabilities.is_some() && self.input.is_some() && self.format.is_some()
    }

    /// The negotiated format.
    pub fn format(&self) -> Result<&PixelFormatDescriptor> {
        self.format.as_ref().ok_or(CameraError::NotNegotiated)
    }

    /// Forget everything, ahead of a fresh negotiation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
