//! The camera façade: negotiation, buffers and the capture loop.

use std::path::Path;
use std::time::Duration;

use tracing::instrument;

use crate::caps;
use crate::controls::ControlRegistry;
use crate::device::V4L2Device;
use crate::error::{CameraError, Result};
use crate::format::{FormatCatalog, FormatRequest};
use crate::input;
use crate::quality::QualityFeedbackLoop;
use crate::ring::BufferRing;
use crate::state::SessionState;
use crate::stream::{Frame, StreamingSession};
use crate::traits::{CaptureParams, PixelFormatDescriptor, VideoDevice};

/// A single capture device driven through streaming I/O.
///
/// Typical use: [`negotiate`](Self::negotiate),
/// [`allocate_buffers`](Self::allocate_buffers), [`queue_all`](Self::queue_all),
/// [`start`](Self::start), then [`step`](Self::step) or [`run`](Self::run),
/// and finally [`stop`](Self::stop) and [`release`](Self::release).
/// Dropping the camera stops and releases as needed.
pub struct Camera<D: VideoDevice> {
    device: D,
    state: SessionState,
    controls: ControlRegistry,
    formats: FormatCatalog,
    session: Option<StreamingSession<D::Mapping>>,
    feedback: QualityFeedbackLoop,
    request: FormatRequest,
    frame_timeout: Option<Duration>,
}

impl Camera<V4L2Device> {
    /// Open a device node. Nothing is negotiated yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        V4L2Device::open(path).map(Self::new)
    }
}

impl<D: VideoDevice> Camera<D> {
    /// Wrap an opened device.
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: SessionState::default(),
            controls: ControlRegistry::new(),
            formats: FormatCatalog::default(),
            session: None,
            feedback: QualityFeedbackLoop::new(),
            request: FormatRequest::default(),
            frame_timeout: None,
        }
    }

    /// Set the format preferences used by [`negotiate`](Self::negotiate).
    #[must_use]
    pub fn with_format_request(mut self, request: FormatRequest) -> Self {
        self.request = request;
        self
    }

    /// Bound each wait for a frame. Without a timeout, dequeueing blocks.
    #[must_use]
    pub fn with_frame_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// The underlying device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// What negotiation learned.
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// The device's controls.
    pub const fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    /// The device's controls, for writing.
    ///
    /// Returns the registry together with the device it writes to.
    pub fn controls_mut(&mut self) -> (&mut ControlRegistry, &mut D) {
        (&mut self.controls, &mut self.device)
    }

    /// Formats enumerated during negotiation.
    pub const fn formats(&self) -> &FormatCatalog {
        &self.formats
    }

    /// Number of mapped buffers, once allocated.
    pub fn buffer_count(&self) -> Option<u32> {
        self.session.as_ref().map(StreamingSession::count)
    }

    /// Whether the stream is on.
    pub fn is_streaming(&self) -> bool {
        self.session.as_ref().is_some_and(StreamingSession::is_streaming)
    }

    /// Read capabilities, select the camera input, settle a format and
    /// enumerate controls.
    ///
    /// Refused while streaming. A ring mapped for the previous format is
    /// released first. Stops at the first failure; later steps are not
    /// attempted.
    #[instrument(skip(self), level = "debug")]
    pub fn negotiate(&mut self) -> Result<&PixelFormatDescriptor> {
        if self.is_streaming() {
            return Err(CameraError::AlreadyStreaming);
        }
        self.release()?;
        self.state.reset();

        let capabilities = caps::read_capabilities(&self.device)?;
        self.state.capabilities = Some(capabilities);
        caps::log_standards(&self.device);

        input::select_camera_input(&mut self.device, &mut self.state)?;

        self.formats = FormatCatalog::enumerate(&self.device);
        self.formats
            .find_and_set_format(&mut self.device, &mut self.state, &self.request)?;

        self.controls.refresh(&self.device, &mut self.state);
        self.state.format()
    }

    /// [`negotiate`](Self::negotiate), reduced to success or failure.
    pub fn init(&mut self) -> bool {
        match self.negotiate() {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(%err, "negotiation failed");
                false
            }
        }
    }

    /// Streaming parameters of the negotiated buffer type.
    pub fn capture_params(&self) -> Result<CaptureParams> {
        let format = self.state.format()?;
        self.device
            .capture_params(format.buffer_type)
            .map_err(|err| CameraError::ioctl("VIDIOC_G_PARM", err))
    }

    /// Map `count` buffers, replacing any previous ring. Returns the number
    /// the driver granted.
    #[instrument(skip(self), level = "debug")]
    pub fn allocate_buffers(&mut self, count: u32) -> Result<u32> {
        let buffer_type = self.state.format()?.buffer_type;
        if self.is_streaming() {
            return Err(CameraError::AlreadyStreaming);
        }
        self.release()?;

        let ring = BufferRing::allocate(&mut self.device, buffer_type, count)?;
        let granted = ring.count();
        self.session = Some(StreamingSession::new(ring));
        Ok(granted)
    }

    /// Queue every idle buffer.
    pub fn queue_all(&mut self) -> Result<u32> {
        let session = self.session.as_mut().ok_or(CameraError::NotAllocated)?;
        session.queue_all(&mut self.device)
    }

    /// Turn the stream on.
    pub fn start(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(CameraError::NotAllocated)?;
        session.start(&mut self.device)
    }

    /// Wait up to `timeout` for a filled buffer.
    pub fn wait_ready(&self, timeout: Duration) -> Result<bool> {
        let session = self.session.as_ref().ok_or(CameraError::NotAllocated)?;
        session.wait_ready(&self.device, timeout)
    }

    /// Capture one frame.
    ///
    /// Dequeues a buffer, runs the feedback loop on it and hands it to
    /// `consume` together with the loop's verdict. The buffer is re-queued
    /// if capturing continues and kept in the ring otherwise. Returns the
    /// verdict.
    pub fn step<F>(&mut self, consume: F) -> Result<bool>
    where
        F: FnOnce(&Frame<'_>, bool) -> Result<()>,
    {
        if let Some(timeout) = self.frame_timeout {
            if !self.wait_ready(timeout)? {
                return Err(CameraError::Timeout);
            }
        }

        let format = self.state.format()?;
        let session = self.session.as_mut().ok_or(CameraError::NotAllocated)?;
        let buffer = session.dequeue(&mut self.device)?;

        let outcome = {
            let frame = session.frame(&buffer, format)?;
            self.feedback
                .evaluate(&frame, &mut self.controls, &mut self.device, &self.state)
                .and_then(|verdict| consume(&frame, verdict).map(|()| verdict))
        };

        // A failed frame still goes back to the kernel so the ring stays full.
        if outcome.as_ref().copied().unwrap_or(true) {
            session.requeue(&mut self.device, buffer)?;
        } else {
            session.release_slot(buffer.index)?;
        }
        outcome
    }

    /// Capture `frames` frames, handing each to `sink` with a flag that is
    /// `true` for the last one. Returns the number captured.
    pub fn run<F>(&mut self, frames: u32, mut sink: F) -> Result<u32>
    where
        F: FnMut(&Frame<'_>, bool) -> Result<()>,
    {
        if frames == 0 {
            return Ok(0);
        }
        self.feedback.set_budget(Some(frames));

        let mut captured = 0;
        let outcome = loop {
            match self.step(|frame, more| sink(frame, !more)) {
                Ok(true) => captured += 1,
                Ok(false) => break Ok(captured + 1),
                Err(err) => break Err(err),
            }
        };
        // The budget belongs to this run only, whichever way it ended.
        self.feedback.set_budget(None);
        outcome
    }

    /// Re-read every control from the device.
    pub fn refresh_controls(&mut self) {
        self.controls.refresh(&self.device, &mut self.state);
    }

    /// Turn the stream off if it is on.
    pub fn stop(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) if session.is_streaming() => session.stop(&mut self.device),
            _ => Ok(()),
        }
    }

    /// Unmap and free the buffers. Refused while streaming.
    pub fn release(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            session.release(&mut self.device)?;
        }
        self.session = None;
        Ok(())
    }
}

impl<D: VideoDevice> Drop for Camera<D> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(%err, "failed to stop stream on drop");
        }
        if let Err(err) = self.release() {
            tracing::warn!(%err, "failed to release buffers on drop");
        }
    }
}
