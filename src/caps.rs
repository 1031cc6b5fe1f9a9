//! Capability probing and video-standard diagnostics.

use v4l::capability::Flags;

use crate::error::{CameraError, Result};
use crate::sys::V4L2_CAP_DEVICE_CAPS;
use crate::traits::{DeviceCapabilities, StandardDescriptor, VideoDevice};

/// Upper bound on standards enumerated, for drivers that never run out.
const MAX_STANDARDS: u32 = 128;

/// Query the device capabilities and check it can stream video.
///
/// When the driver splits capabilities between the whole physical device
/// and this node, the per-node word is used: the global word may
/// advertise features other nodes of the same device provide.
pub fn read_capabilities<D: VideoDevice>(device: &D) -> Result<DeviceCapabilities> {
    let raw = device.query_caps().map_err(CameraError::QueryFailed)?;

    let effective = if raw.capabilities & V4L2_CAP_DEVICE_CAPS == 0 {
        raw.capabilities
    } else {
        raw.device_caps
    };
    let flags = Flags::from_bits_truncate(effective);

    #[allow(clippy::cast_possible_truncation)]
    let version = (
        (raw.version >> 16) as u8,
        (raw.version >> 8) as u8,
        raw.version as u8,
    );

    tracing::info!(
        driver = %raw.driver,
        card = %raw.card,
        bus = %raw.bus_info,
        version = format_args!("{}.{}.{}", version.0, version.1, version.2),
        capabilities = format_args!("{:#010x}", raw.capabilities),
        device_caps = format_args!("{:#010x}", raw.device_caps),
        "device capabilities"
    );

    let caps = DeviceCapabilities {
        driver: raw.driver,
        card: raw.card,
        bus_info: raw.bus_info,
        version,
        flags,
        can_capture: flags.intersects(Flags::VIDEO_CAPTURE | Flags::VIDEO_CAPTURE_MPLANE),
        can_stream: flags.contains(Flags::STREAMING),
    };

    if !caps.can_capture {
        return Err(CameraError::NoCapture);
    }
    if !caps.can_stream {
        return Err(CameraError::NoStreaming);
    }
    Ok(caps)
}

/// Enumerate and log the supported video standards.
///
/// Webcams usually report none; the first failing index ends the list.
pub fn log_standards<D: VideoDevice>(device: &D) -> Vec<StandardDescriptor> {
    let mut standards = Vec::new();
    for index in 0..MAX_STANDARDS {
        match device.enum_standard(index) {
            Ok(standard) => {
                tracing::debug!(
                    index,
                    name = %standard.name,
                    id = format_args!("{:#x}", standard.id),
                    frame_period = format_args!("{}/{}", standard.frame_period.0, standard.frame_period.1),
                    lines = standard.frame_lines,
                    "video standard"
                );
                standards.push(standard);
            }
            Err(err) => {
                tracing::debug!(index, %err, "end of video standards");
                break;
            }
        }
    }
    standards
}
