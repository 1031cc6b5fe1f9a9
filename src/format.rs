//! Format enumeration and negotiation.

use std::cmp::Reverse;

use crate::error::{CameraError, Result};
use crate::quality::LumaLayout;
use crate::state::SessionState;
use crate::traits::{
    BufferType, FormatDescription, FormatFlags, FourCC, PixelFormatDescriptor, VideoDevice,
};

/// Upper bound on formats enumerated per buffer type.
const MAX_FORMATS: u32 = 256;

/// What the caller would like negotiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatRequest {
    /// Preferred pixel format, used when the device offers it.
    pub fourcc: Option<FourCC>,
    /// Frame size; the driver picks stride and image size.
    pub resolution: Option<(u32, u32)>,
}

/// Sort key of a capture format; larger is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    requested: bool,
    measurable: bool,
    native: bool,
    uncompressed: bool,
}

impl Rank {
    fn of(entry: &FormatDescription, preferred: Option<FourCC>) -> Self {
        Self {
            requested: preferred == Some(entry.fourcc),
            measurable: LumaLayout::for_fourcc(entry.fourcc).is_some(),
            native: !entry.flags.contains(FormatFlags::EMULATED),
            uncompressed: !entry.flags.contains(FormatFlags::COMPRESSED),
        }
    }
}

/// Every format the device offers across the capture buffer types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatCatalog {
    entries: Vec<FormatDescription>,
}

impl FormatCatalog {
    /// Enumerate formats for each capture buffer type until the device
    /// reports no more.
    pub fn enumerate<D: VideoDevice>(device: &D) -> Self {
        let mut entries = Vec::new();
        for buffer_type in BufferType::CAPTURE_TYPES {
            for index in 0..MAX_FORMATS {
                let Ok(entry) = device.enum_format(buffer_type, index) else {
                    break;
                };
                tracing::debug!(
                    %buffer_type,
                    index,
                    fourcc = %entry.fourcc,
                    description = %entry.description,
                    compressed = entry.flags.contains(FormatFlags::COMPRESSED),
                    emulated = entry.flags.contains(FormatFlags::EMULATED),
                    "format"
                );
                entries.push(entry);
            }
        }
        Self { entries }
    }

    /// Every enumerated entry, in enumeration order.
    pub fn entries(&self) -> &[FormatDescription] {
        &self.entries
    }

    /// Pick the best single-planar capture format.
    ///
    /// A requested FourCC wins; then formats the feedback loop can measure,
    /// native over emulated, uncompressed over compressed. Ties keep
    /// enumeration order.
    pub fn choose(&self, preferred: Option<FourCC>) -> Option<&FormatDescription> {
        self.entries
            .iter()
            .filter(|entry| entry.buffer_type == BufferType::VideoCapture)
            .min_by_key(|entry| Reverse(Rank::of(entry, preferred)))
    }

    /// Choose a format, write it to the device and read back what the
    /// driver settled on. The read-back is recorded in `state`.
    pub fn find_and_set_format<D: VideoDevice>(
        &self,
        device: &mut D,
        state: &mut SessionState,
        request: &FormatRequest,
    ) -> Result<PixelFormatDescriptor> {
        let chosen = self
            .choose(request.fourcc)
            .ok_or(CameraError::NoSupportedFormat)?;
        if request.fourcc.is_some_and(|fourcc| fourcc != chosen.fourcc) {
            tracing::warn!(
                requested = ?request.fourcc.map(|fourcc| fourcc.to_string()),
                chosen = %chosen.fourcc,
                "requested pixel format not offered"
            );
        }

        let mut format = device
            .format(chosen.buffer_type)
            .map_err(|err| CameraError::negotiation("VIDIOC_G_FMT", err))?;
        format.fourcc = chosen.fourcc;
        match request.resolution {
            Some((width, height)) => {
                format.width = width;
                format.height = height;
                format.bytes_per_line = 0;
                format.size_image = 0;
            }
            None => format.size_image = format.height.saturating_mul(format.bytes_per_line),
        }

        device
            .set_format(&format)
            .map_err(CameraError::SetFormatRejected)?;
        let negotiated = device
            .format(chosen.buffer_type)
            .map_err(|err| CameraError::negotiation("VIDIOC_G_FMT", err))?;

        tracing::info!(
            fourcc = %negotiated.fourcc,
            width = negotiated.width,
            height = negotiated.height,
            bytes_per_line = negotiated.bytes_per_line,
            size = negotiated.size_image,
            colorspace = ?negotiated.colorspace,
            "negotiated format"
        );
        state.format = Some(negotiated.clone());
        Ok(negotiated)
    }
}
