//! Luma statistics and the brightness feedback loop.

use crate::controls::ControlRegistry;
use crate::error::Result;
use crate::state::SessionState;
use crate::stream::Frame;
use crate::traits::{FourCC, VideoDevice};

/// Mean luma above which the picture counts as too bright.
const MIDPOINT: f64 = 128.0;

/// Where the luma samples sit in a frame, per pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LumaLayout {
    /// Packed 4:2:2 with luma first (YUYV, YVYU): luma at even bytes.
    Yuyv,
    /// Packed 4:2:2 with chroma first (UYVY, VYUY): luma at odd bytes.
    Uyvy,
    /// 8-bit greyscale: every byte is luma.
    Grey,
}

impl LumaLayout {
    /// Layout for a pixel format, if luma can be read from it directly.
    pub const fn for_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.0 {
            b"YUYV" | b"YVYU" => Some(Self::Yuyv),
            b"UYVY" | b"VYUY" => Some(Self::Uyvy),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Yuyv | Self::Uyvy => 2,
            Self::Grey => 1,
        }
    }

    const fn first_luma(self) -> usize {
        match self {
            Self::Yuyv | Self::Grey => 0,
            Self::Uyvy => 1,
        }
    }

    /// Accumulate every luma sample of `payload` into `stats`.
    pub fn sample_luma(self, payload: &[u8], stats: &mut FrameQualityStats) {
        payload
            .iter()
            .skip(self.first_luma())
            .step_by(self.bytes_per_pixel())
            .for_each(|&luma| stats.record(luma));
    }

    /// Extract a tightly packed `width x height` luma plane, honouring the
    /// line stride. Bytes missing from a short payload read as black.
    pub fn luma_plane(self, payload: &[u8], width: u32, height: u32, bytes_per_line: u32) -> Vec<u8> {
        let width = width as usize;
        let pixel = self.bytes_per_pixel();
        let stride = (bytes_per_line as usize).max(width * pixel);

        let mut plane = Vec::with_capacity(width * height as usize);
        for row in 0..height as usize {
            let start = row * stride + self.first_luma();
            plane.extend(
                (0..width).map(|x| payload.get(start + x * pixel).copied().unwrap_or(0)),
            );
        }
        plane
    }
}

/// Luma statistics of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameQualityStats {
    /// Darkest sample.
    pub min: u8,
    /// Brightest sample.
    pub max: u8,
    /// Sum of all samples.
    pub sum: u64,
    /// Number of samples.
    pub samples: u64,
}

impl Default for FrameQualityStats {
    fn default() -> Self {
        Self {
            min: u8::MAX,
            max: 0,
            sum: 0,
            samples: 0,
        }
    }
}

impl FrameQualityStats {
    /// Add one luma sample.
    pub fn record(&mut self, luma: u8) {
        self.min = self.min.min(luma);
        self.max = self.max.max(luma);
        self.sum += u64::from(luma);
        self.samples += 1;
    }

    /// Mean luma over the samples taken, or `None` when nothing was sampled.
    ///
    /// Dividing by samples rather than payload bytes keeps the mean on the
    /// 0..=255 luma scale for every layout. For packed 4:2:2 payloads of
    /// whole pixel pairs it equals `2 * sum / bytes_used`; for GREY it is
    /// `sum / bytes_used`.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum as f64 / self.samples as f64)
    }
}

/// Nudges brightness towards a mid-grey mean, one control step per frame.
///
/// A nudge is `max(1, step)` units. A smaller move is rounded back onto
/// the control's grid: with step 2, 100 nudged down by 1 normalizes back
/// to 100 and the frame would have no effect.
#[derive(Debug, Clone, Default)]
pub struct QualityFeedbackLoop {
    budget: Option<u32>,
    evaluated: u32,
}

impl QualityFeedbackLoop {
    /// A loop with no frame budget.
    pub const fn new() -> Self {
        Self {
            budget: None,
            evaluated: 0,
        }
    }

    /// Stop capturing after `frames` evaluated frames. Resets the count.
    pub fn set_budget(&mut self, frames: Option<u32>) {
        self.budget = frames;
        self.evaluated = 0;
    }

    /// Frames evaluated since the budget was last set.
    pub const fn evaluated(&self) -> u32 {
        self.evaluated
    }

    /// Measure `frame` and move brightness one step against the error.
    /// A mean at or below the midpoint brightens.
    ///
    /// Returns whether capturing should continue. Without a brightness
    /// control, a luma layout for the format, or any payload, the frame is
    /// only counted.
    pub fn evaluate<D: VideoDevice>(
        &mut self,
        frame: &Frame<'_>,
        controls: &mut ControlRegistry,
        device: &mut D,
        state: &SessionState,
    ) -> Result<bool> {
        self.evaluated = self.evaluated.saturating_add(1);
        let continue_capturing = !matches!(self.budget, Some(budget) if self.evaluated >= budget);

        let Some(id) = state.brightness else {
            return Ok(continue_capturing);
        };
        let Some(layout) = LumaLayout::for_fourcc(frame.fourcc) else {
            tracing::trace!(fourcc = %frame.fourcc, "no luma layout, skipping feedback");
            return Ok(continue_capturing);
        };

        let mut stats = FrameQualityStats::default();
        layout.sample_luma(frame.data, &mut stats);
        let Some(mean) = stats.mean() else {
            return Ok(continue_capturing);
        };

        let current = controls.get(device, id)?;
        let nudge = controls.descriptor(id).map_or(1, |control| control.step.max(1));
        let target = if mean > MIDPOINT {
            current.saturating_sub(nudge)
        } else {
            current.saturating_add(nudge)
        };
        let applied = controls.set(device, id, target)?;

        tracing::debug!(
            sequence = frame.sequence,
            min = stats.min,
            max = stats.max,
            mean,
            brightness = applied,
            "frame quality"
        );
        Ok(continue_capturing)
    }
}
