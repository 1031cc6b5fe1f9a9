//! Capture on a background thread.
//!
//! The worker owns the [`Camera`] and streams owned copies of each frame
//! over a bounded channel. When the consumer falls behind, frames are
//! dropped rather than stalling the driver.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::camera::Camera;
use crate::error::{CameraError, Result};
use crate::stream::Frame;
use crate::traits::{FourCC, VideoDevice};

/// An owned copy of a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Ring slot the frame came from.
    pub index: u32,
    /// Payload.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Line stride in bytes.
    pub bytes_per_line: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Driver frame counter.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

impl CapturedFrame {
    /// Borrow as a [`Frame`].
    pub fn as_frame(&self) -> Frame<'_> {
        Frame {
            index: self.index,
            data: &self.data,
            width: self.width,
            height: self.height,
            bytes_per_line: self.bytes_per_line,
            fourcc: self.fourcc,
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }
}

impl From<&Frame<'_>> for CapturedFrame {
    fn from(frame: &Frame<'_>) -> Self {
        Self {
            index: frame.index,
            data: frame.data.to_vec(),
            width: frame.width,
            height: frame.height,
            bytes_per_line: frame.bytes_per_line,
            fourcc: frame.fourcc,
            sequence: frame.sequence,
            timestamp: frame.timestamp,
        }
    }
}

enum Command {
    Stop,
}

/// A camera streaming on its own thread.
pub struct CaptureWorker {
    commands: Sender<Command>,
    frames: Receiver<CapturedFrame>,
    handle: Option<JoinHandle<Result<u32>>>,
}

impl CaptureWorker {
    /// Start streaming on a new thread.
    ///
    /// The camera must be negotiated with buffers allocated; the worker
    /// queues them and turns the stream on. `poll_interval` bounds each
    /// wait for a frame, which is how often a stop request is noticed.
    /// At most `capacity` frames wait in the channel.
    pub fn spawn<D>(mut camera: Camera<D>, poll_interval: Duration, capacity: usize) -> Result<Self>
    where
        D: VideoDevice + Send + 'static,
        D::Mapping: Send,
    {
        camera.queue_all()?;
        camera.start()?;

        let (commands, command_rx) = flume::unbounded();
        let (frame_tx, frames) = flume::bounded(capacity.max(1));

        let handle = thread::Builder::new()
            .name("snapcam-capture".into())
            .spawn(move || capture_loop(camera, poll_interval, &command_rx, &frame_tx))
            .map_err(|err| CameraError::Worker(err.to_string()))?;

        Ok(Self {
            commands,
            frames,
            handle: Some(handle),
        })
    }

    /// The frame channel.
    pub const fn frames(&self) -> &Receiver<CapturedFrame> {
        &self.frames
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `None` on timeout or once the worker has exited.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CapturedFrame> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Ask the worker to stop and wait for it. Returns the number of frames
    /// captured.
    pub fn stop(mut self) -> Result<u32> {
        // The worker may already be gone after an error.
        let _ = self.commands.send(Command::Stop);
        self.join_inner()
    }

    /// Wait for the worker to exit on its own.
    pub fn join(mut self) -> Result<u32> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<u32> {
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };
        handle
            .join()
            .map_err(|_| CameraError::Worker("capture thread panicked".into()))?
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.commands.send(Command::Stop);
            if let Err(err) = self.join_inner() {
                tracing::warn!(%err, "capture worker failed");
            }
        }
    }
}

fn capture_loop<D: VideoDevice>(
    mut camera: Camera<D>,
    poll_interval: Duration,
    commands: &Receiver<Command>,
    frames: &Sender<CapturedFrame>,
) -> Result<u32> {
    let mut captured = 0u32;
    let mut dropped = 0u32;

    let result = loop {
        match commands.try_recv() {
            Ok(Command::Stop) | Err(flume::TryRecvError::Disconnected) => break Ok(()),
            Err(flume::TryRecvError::Empty) => {}
        }

        match camera.wait_ready(poll_interval) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break Err(err),
        }

        let step = camera.step(|frame, _| {
            match frames.try_send(CapturedFrame::from(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => {
                    return Err(CameraError::Worker("frame receiver dropped".into()));
                }
            }
            Ok(())
        });
        match step {
            Ok(_) => captured += 1,
            Err(err) => break Err(err),
        }
    };

    if dropped > 0 {
        tracing::warn!(dropped, "consumer fell behind, frames dropped");
    }
    tracing::info!(captured, "capture worker exiting");

    let stopped = camera.stop();
    if let Err(err) = &stopped {
        tracing::warn!(%err, "failed to stop stream");
    }
    let released = camera.release();
    if let Err(err) = &released {
        tracing::warn!(%err, "failed to release buffers");
    }

    // The loop error is the cause; teardown errors after it are only logged.
    result?;
    stopped?;
    released?;
    Ok(captured)
}
