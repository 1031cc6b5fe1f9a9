//! The ring of kernel buffers mapped into the process.

use std::fmt;
use std::ops::Deref;

use tracing::instrument;

use crate::error::{CameraError, Result};
use crate::traits::{BufferType, VideoDevice};

/// Who owns a ring slot right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Held by the ring, free to queue.
    Idle,
    /// Owned by the kernel, waiting to be filled.
    Queued,
    /// Filled and handed to the consumer.
    Dequeued,
}

impl SlotState {
    /// Lower-case name, for errors and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Dequeued => "dequeued",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mapped kernel buffer.
pub struct MappedBuffer<M> {
    index: u32,
    length: u32,
    mapping: M,
    state: SlotState,
}

impl<M: Deref<Target = [u8]>> MappedBuffer<M> {
    /// Ring slot.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Mapped length in bytes.
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// Current owner.
    pub const fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    /// The first `bytes_used` bytes of the mapping.
    pub(crate) fn payload(&self, bytes_used: u32) -> &[u8] {
        let len = (bytes_used as usize).min(self.mapping.len());
        self.mapping.get(..len).unwrap_or_default()
    }
}

impl<M> fmt::Debug for MappedBuffer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("index", &self.index)
            .field("length", &self.length)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A fixed set of mapped buffers for one session.
///
/// The slot count is whatever the driver granted, which may be fewer than
/// requested.
#[derive(Debug)]
pub struct BufferRing<M> {
    buffer_type: BufferType,
    slots: Vec<MappedBuffer<M>>,
}

impl<M: Deref<Target = [u8]>> BufferRing<M> {
    /// Request `requested` buffers and map every one the driver grants.
    ///
    /// If any mapping fails, the ones already made are dropped and the
    /// kernel buffers are freed before the error is returned.
    #[instrument(skip(device), level = "debug")]
    pub fn allocate<D>(device: &mut D, buffer_type: BufferType, requested: u32) -> Result<Self>
    where
        D: VideoDevice<Mapping = M>,
    {
        let granted = device
            .request_buffers(buffer_type, requested)
            .map_err(CameraError::RequestRejected)?;
        if granted == 0 {
            return Err(CameraError::NoBuffersGranted);
        }
        if granted < requested {
            tracing::warn!(requested, granted, "device granted fewer buffers than requested");
        }

        let mut slots = Vec::with_capacity(granted as usize);
        for index in 0..granted {
            match map_slot(device, buffer_type, index) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    drop(slots);
                    if let Err(free_err) = device.request_buffers(buffer_type, 0) {
                        tracing::warn!(%free_err, "failed to free buffers after mapping error");
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(count = granted, "buffer ring mapped");
        Ok(Self { buffer_type, slots })
    }

    /// Buffer type the ring was allocated for.
    pub const fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    /// Number of slots.
    #[allow(clippy::cast_possible_truncation)]
    pub fn count(&self) -> u32 {
        // Bounded by the u32 the driver granted.
        self.slots.len() as u32
    }

    /// All slots, in index order.
    pub fn slots(&self) -> &[MappedBuffer<M>] {
        &self.slots
    }

    /// Look up a slot, rejecting out-of-range indices.
    pub fn slot(&self, index: u32) -> Result<&MappedBuffer<M>> {
        let count = self.count();
        self.slots
            .get(index as usize)
            .ok_or(CameraError::BufferIndex { index, count })
    }

    pub(crate) fn slot_mut(&mut self, index: u32) -> Result<&mut MappedBuffer<M>> {
        let count = self.count();
        self.slots
            .get_mut(index as usize)
            .ok_or(CameraError::BufferIndex { index, count })
    }

    /// Return every slot to the ring.
    pub(crate) fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }
    }

    /// Unmap every buffer and free the kernel buffers.
    ///
    /// The stream must be off. Releasing an empty ring does nothing.
    pub fn release<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: VideoDevice<Mapping = M>,
    {
        if self.slots.is_empty() {
            return Ok(());
        }
        self.slots.clear();
        device
            .request_buffers(self.buffer_type, 0)
            .map_err(CameraError::RequestRejected)?;
        tracing::debug!("buffer ring released");
        Ok(())
    }
}

fn map_slot<D: VideoDevice>(
    device: &D,
    buffer_type: BufferType,
    index: u32,
) -> Result<MappedBuffer<D::Mapping>> {
    let placement = device
        .query_buffer(buffer_type, index)
        .map_err(|err| CameraError::ioctl("VIDIOC_QUERYBUF", err))?;
    let mapping = device
        .map_buffer(&placement)
        .map_err(|source| CameraError::MapFailed { index, source })?;

    tracing::debug!(
        index,
        offset = placement.offset,
        length = placement.length,
        "buffer mapped"
    );
    Ok(MappedBuffer {
        index,
        length: placement.length,
        mapping,
        state: SlotState::Idle,
    })
}
