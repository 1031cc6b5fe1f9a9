//! The streaming state machine over a [`BufferRing`].
//!
//! The session is either idle or streaming. Each slot cycles
//! `Idle -> Queued -> Dequeued -> (Queued | Idle)`, and every transition is
//! checked: a slot cannot be queued twice, and the kernel can only hand
//! back a slot that was queued.

use std::ops::Deref;
use std::time::Duration;

use crate::error::{CameraError, Result};
use crate::quality::LumaLayout;
use crate::ring::{BufferRing, SlotState};
use crate::traits::{DequeuedBuffer, FourCC, PixelFormatDescriptor, VideoDevice};

/// A borrowed view of a dequeued buffer.
///
/// The borrow keeps the session from re-queueing the slot while the
/// payload is still being read.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Ring slot.
    pub index: u32,
    /// Payload, `bytes_used` long.
    pub data: &'a [u8],
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

impl Frame<'_> {
    /// Payload size in bytes.
    pub const fn bytes_used(&self) -> usize {
        self.data.len()
    }

    /// The luma plane, tightly packed, if the format has one.
    pub fn luma_plane(&self) -> Option<Vec<u8>> {
        LumaLayout::for_fourcc(self.fourcc)
            .map(|layout| layout.luma_plane(self.data, self.width, self.height, self.bytes_per_line))
    }
}

/// Start/stop and per-frame queue/dequeue over one buffer ring.
#[derive(Debug)]
pub struct StreamingSession<M> {
    ring: BufferRing<M>,
    streaming: bool,
}

impl<M: Deref<Target = [u8]>> StreamingSession<M> {
    /// Wrap an allocated ring. The session starts idle.
    pub const fn new(ring: BufferRing<M>) -> Self {
        Self {
            ring,
            streaming: false,
        }
    }

    /// The underlying ring.
    pub const fn ring(&self) -> &BufferRing<M> {
        &self.ring
    }

    /// Number of slots.
    pub fn count(&self) -> u32 {
        self.ring.count()
    }

    /// Whether the stream is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Owner of a slot.
    pub fn slot_state(&self, index: u32) -> Result<SlotState> {
        self.ring.slot(index).map(|slot| slot.state())
    }

    /// Hand a slot to the kernel. It must be idle or dequeued.
    pub fn queue<D>(&mut self, device: &mut D, index: u32) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        let buffer_type = self.ring.buffer_type();
        let slot = self.ring.slot_mut(index)?;
        if slot.state() == SlotState::Queued {
            return Err(CameraError::BufferState {
                index,
                state: SlotState::Queued.as_str(),
                action: "queue",
            });
        }

        device
            .queue_buffer(buffer_type, index)
            .map_err(|err| CameraError::ioctl("VIDIOC_QBUF", err))?;
        slot.set_state(SlotState::Queued);
        tracing::trace!(index, "buffer queued");
        Ok(())
    }

    /// Queue every idle slot. Returns how many were queued.
    pub fn queue_all<D>(&mut self, device: &mut D) -> Result<u32>
    where
        D: VideoDevice<Mapping = M>,
    {
        let mut queued = 0;
        for index in 0..self.count() {
            if self.slot_state(index)? == SlotState::Idle {
                self.queue(device, index)?;
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Turn the stream on. At least one slot must be queued.
    pub fn start<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        if self.streaming {
            return Err(CameraError::AlreadyStreaming);
        }
        if !self
            .ring
            .slots()
            .iter()
            .any(|slot| slot.state() == SlotState::Queued)
        {
            return Err(CameraError::NothingQueued);
        }

        device
            .stream_on(self.ring.buffer_type())
            .map_err(|err| CameraError::ioctl("VIDIOC_STREAMON", err))?;
        self.streaming = true;
        tracing::info!(buffers = self.count(), "stream started");
        Ok(())
    }

    /// Wait up to `timeout` for a filled buffer.
    pub fn wait_ready<D>(&self, device: &D, timeout: Duration) -> Result<bool>
    where
        D: VideoDevice<Mapping = M>,
    {
        if !self.streaming {
            return Err(CameraError::NotStreaming);
        }
        device
            .wait_ready(timeout)
            .map_err(|err| CameraError::ioctl("poll", err))
    }

    /// Take the next filled buffer from the kernel. Blocks.
    pub fn dequeue<D>(&mut self, device: &mut D) -> Result<DequeuedBuffer>
    where
        D: VideoDevice<Mapping = M>,
    {
        if !self.streaming {
            return Err(CameraError::NotStreaming);
        }

        let buffer = device
            .dequeue_buffer(self.ring.buffer_type())
            .map_err(|err| CameraError::ioctl("VIDIOC_DQBUF", err))?;
        let slot = self.ring.slot_mut(buffer.index)?;
        if slot.state() != SlotState::Queued {
            return Err(CameraError::BufferState {
                index: buffer.index,
                state: slot.state().as_str(),
                action: "dequeue",
            });
        }
        if buffer.bytes_used > slot.length() {
            tracing::warn!(
                index = buffer.index,
                bytes_used = buffer.bytes_used,
                length = slot.length(),
                "driver reported more bytes than the buffer holds"
            );
        }

        slot.set_state(SlotState::Dequeued);
        tracing::trace!(index = buffer.index, sequence = buffer.sequence, "buffer dequeued");
        Ok(buffer)
    }

    /// Borrow the payload of a dequeued slot.
    pub fn frame(
        &self,
        buffer: &DequeuedBuffer,
        format: &PixelFormatDescriptor,
    ) -> Result<Frame<'_>> {
        let slot = self.ring.slot(buffer.index)?;
        if slot.state() != SlotState::Dequeued {
            return Err(CameraError::BufferState {
                index: buffer.index,
                state: slot.state().as_str(),
                action: "read",
            });
        }

        Ok(Frame {
            index: buffer.index,
            data: slot.payload(buffer.bytes_used),
            width: format.width,
            height: format.height,
            bytes_per_line: format.bytes_per_line,
            fourcc: format.fourcc,
            sequence: buffer.sequence,
            timestamp: buffer.timestamp,
        })
    }

    /// Give a dequeued buffer back to the kernel.
    pub fn requeue<D>(&mut self, device: &mut D, buffer: DequeuedBuffer) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        self.queue(device, buffer.index)
    }

    /// Keep a dequeued slot in the ring instead of re-queueing it.
    pub fn release_slot(&mut self, index: u32) -> Result<()> {
        let slot = self.ring.slot_mut(index)?;
        if slot.state() != SlotState::Dequeued {
            return Err(CameraError::BufferState {
                index,
                state: slot.state().as_str(),
                action: "release",
            });
        }
        slot.set_state(SlotState::Idle);
        Ok(())
    }

    /// Turn the stream off. Every slot returns to the ring.
    pub fn stop<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        if !self.streaming {
            return Err(CameraError::NotStreaming);
        }
        device
            .stream_off(self.ring.buffer_type())
            .map_err(|err| CameraError::ioctl("VIDIOC_STREAMOFF", err))?;
        self.streaming = false;
        self.ring.reset();
        tracing::info!("stream stopped");
        Ok(())
    }

    /// Unmap the ring and free the kernel buffers. Refused while streaming.
    pub fn release<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        if self.streaming {
            return Err(CameraError::AlreadyStreaming);
        }
        self.ring.release(device)
    }
}
