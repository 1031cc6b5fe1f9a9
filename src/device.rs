//! V4L2 device implementation over the `v4l` kernel bindings.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use libc::c_int;
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_control, v4l2_fmtdesc, v4l2_format, v4l2_input,
    v4l2_pix_format, v4l2_querymenu, v4l2_queryctrl, v4l2_requestbuffers, v4l2_standard,
    v4l2_streamparm,
};

use crate::error::{CameraError, Result};
use crate::sys::{self, vidioc};
use crate::traits::{
    BufferPlacement, BufferType, CaptureParams, Colorspace, ControlFlags, ControlId, ControlInfo,
    ControlType, DequeuedBuffer, FormatDescription, FormatFlags, FourCC, InputDescriptor,
    InputType, PixelFormatDescriptor, RawCapability, RawMenuItem, StandardDescriptor, VideoDevice,
};

/// A V4L2 device node opened for blocking read/write access.
#[derive(Debug)]
pub struct V4L2Device {
    file: File,
    path: PathBuf,
}

impl V4L2Device {
    /// Open a device node (e.g. `/dev/video0`).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| CameraError::DeviceOpenFailed {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "opened device node");
        Ok(Self { file, path })
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> c_int {
        self.file.as_raw_fd()
    }
}

fn to_c_int(value: u32) -> io::Result<c_int> {
    c_int::try_from(value).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

/// Convert a frame timeout to a poll timeout, refusing values poll cannot
/// express instead of shortening them.
fn poll_timeout(timeout: Duration) -> io::Result<PollTimeout> {
    PollTimeout::try_from(timeout).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame timeout {timeout:?} exceeds the poll range"),
        )
    })
}

fn pix_to_descriptor(buffer_type: BufferType, pix: &v4l2_pix_format) -> PixelFormatDescriptor {
    PixelFormatDescriptor {
        buffer_type,
        fourcc: FourCC::from_u32(pix.pixelformat),
        width: pix.width,
        height: pix.height,
        bytes_per_line: pix.bytesperline,
        size_image: pix.sizeimage,
        colorspace: Colorspace::from_raw(pix.colorspace),
        field: pix.field,
    }
}

fn descriptor_to_pix(format: &PixelFormatDescriptor) -> v4l2_pix_format {
    v4l2_pix_format {
        width: format.width,
        height: format.height,
        pixelformat: format.fourcc.to_u32(),
        field: format.field,
        bytesperline: format.bytes_per_line,
        sizeimage: format.size_image,
        colorspace: format.colorspace.as_raw(),
        ..sys::zeroed()
    }
}

fn mmap_buffer(buffer_type: BufferType, index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: buffer_type.as_raw(),
        memory: sys::V4L2_MEMORY_MMAP,
        ..sys::zeroed()
    }
}

impl VideoDevice for V4L2Device {
    type Mapping = MmapMut;

    fn query_caps(&self) -> io::Result<RawCapability> {
        let mut raw: v4l2_capability = sys::zeroed();
        sys::xioctl(self.fd(), vidioc::VIDIOC_QUERYCAP, &mut raw)?;

        Ok(RawCapability {
            driver: sys::cstr(&raw.driver),
            card: sys::cstr(&raw.card),
            bus_info: sys::cstr(&raw.bus_info),
            version: raw.version,
            capabilities: raw.capabilities,
            device_caps: raw.device_caps,
        })
    }

    fn enum_standard(&self, index: u32) -> io::Result<StandardDescriptor> {
        let mut raw = v4l2_standard {
            index,
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_ENUMSTD, &mut raw)?;

        Ok(StandardDescriptor {
            index: raw.index,
            id: raw.id,
            name: sys::cstr(&raw.name),
            frame_period: (raw.frameperiod.numerator, raw.frameperiod.denominator),
            frame_lines: raw.framelines,
        })
    }

    fn enum_input(&self, index: u32) -> io::Result<InputDescriptor> {
        let mut raw = v4l2_input {
            index,
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_ENUMINPUT, &mut raw)?;

        Ok(InputDescriptor {
            index: raw.index,
            name: sys::cstr(&raw.name),
            kind: InputType::from_raw(raw.type_),
            status: raw.status,
            capabilities: raw.capabilities,
        })
    }

    fn input(&self) -> io::Result<u32> {
        let mut index: c_int = 0;
        sys::xioctl(self.fd(), vidioc::VIDIOC_G_INPUT, &mut index)?;
        u32::try_from(index).map_err(|_| io::Error::from(io::ErrorKind::InvalidData))
    }

    fn set_input(&mut self, index: u32) -> io::Result<()> {
        let mut raw = to_c_int(index)?;
        sys::xioctl(self.fd(), vidioc::VIDIOC_S_INPUT, &mut raw)
    }

    fn enum_format(&self, buffer_type: BufferType, index: u32) -> io::Result<FormatDescription> {
        let mut raw = v4l2_fmtdesc {
            index,
            type_: buffer_type.as_raw(),
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_ENUM_FMT, &mut raw)?;

        Ok(FormatDescription {
            index: raw.index,
            buffer_type,
            flags: FormatFlags::from_bits_truncate(raw.flags),
            description: sys::cstr(&raw.description),
            fourcc: FourCC::from_u32(raw.pixelformat),
        })
    }

    fn format(&self, buffer_type: BufferType) -> io::Result<PixelFormatDescriptor> {
        let mut raw = v4l2_format {
            type_: buffer_type.as_raw(),
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_G_FMT, &mut raw)?;
        Ok(pix_to_descriptor(buffer_type, &sys::pix(&raw)))
    }

    fn set_format(&mut self, format: &PixelFormatDescriptor) -> io::Result<PixelFormatDescriptor> {
        let mut raw = v4l2_format {
            type_: format.buffer_type.as_raw(),
            ..sys::zeroed()
        };
        raw.fmt.pix = descriptor_to_pix(format);
        sys::xioctl(self.fd(), vidioc::VIDIOC_S_FMT, &mut raw)?;
        Ok(pix_to_descriptor(format.buffer_type, &sys::pix(&raw)))
    }

    fn capture_params(&self, buffer_type: BufferType) -> io::Result<CaptureParams> {
        let mut raw = v4l2_streamparm {
            type_: buffer_type.as_raw(),
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_G_PARM, &mut raw)?;

        let capture = sys::capture(&raw);
        Ok(CaptureParams {
            capability: capture.capability,
            capture_mode: capture.capturemode,
            time_per_frame: (
                capture.timeperframe.numerator,
                capture.timeperframe.denominator,
            ),
            read_buffers: capture.readbuffers,
        })
    }

    fn query_control(&self, id: u32) -> io::Result<ControlInfo> {
        let mut raw = v4l2_queryctrl {
            id,
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_QUERYCTRL, &mut raw)?;

        Ok(ControlInfo {
            id: ControlId(raw.id),
            name: sys::cstr(&raw.name),
            kind: ControlType::from_raw(raw.type_),
            minimum: raw.minimum,
            maximum: raw.maximum,
            step: raw.step,
            default: raw.default_value,
            flags: ControlFlags::from_bits_truncate(raw.flags),
        })
    }

    fn query_menu(&self, id: ControlId, index: u32) -> io::Result<RawMenuItem> {
        let mut raw = v4l2_querymenu {
            id: id.0,
            index,
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_QUERYMENU, &mut raw)?;

        Ok(RawMenuItem {
            name: sys::menu_name(&raw),
            value: sys::menu_value(&raw),
        })
    }

    fn control(&self, id: ControlId) -> io::Result<i32> {
        let mut raw = v4l2_control { id: id.0, value: 0 };
        sys::xioctl(self.fd(), vidioc::VIDIOC_G_CTRL, &mut raw)?;
        Ok(raw.value)
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        let mut raw = v4l2_control { id: id.0, value };
        sys::xioctl(self.fd(), vidioc::VIDIOC_S_CTRL, &mut raw)
    }

    fn ext_control(&self, id: ControlId) -> io::Result<i32> {
        let mut control = sys::ext_control(id.0, 0);
        let mut controls = sys::single_control(id.class(), &mut control);
        sys::xioctl(self.fd(), vidioc::VIDIOC_G_EXT_CTRLS, &mut controls)?;
        Ok(sys::ext_value(&control))
    }

    fn try_ext_control(&self, id: ControlId, value: i32) -> io::Result<()> {
        let mut control = sys::ext_control(id.0, value);
        let mut controls = sys::single_control(id.class(), &mut control);
        sys::xioctl(self.fd(), vidioc::VIDIOC_TRY_EXT_CTRLS, &mut controls)
    }

    fn set_ext_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        let mut control = sys::ext_control(id.0, value);
        let mut controls = sys::single_control(id.class(), &mut control);
        sys::xioctl(self.fd(), vidioc::VIDIOC_S_EXT_CTRLS, &mut controls)
    }

    fn request_buffers(&mut self, buffer_type: BufferType, count: u32) -> io::Result<u32> {
        let mut raw = v4l2_requestbuffers {
            count,
            type_: buffer_type.as_raw(),
            memory: sys::V4L2_MEMORY_MMAP,
            ..sys::zeroed()
        };
        sys::xioctl(self.fd(), vidioc::VIDIOC_REQBUFS, &mut raw)?;
        Ok(raw.count)
    }

    fn query_buffer(&self, buffer_type: BufferType, index: u32) -> io::Result<BufferPlacement> {
        let mut raw = mmap_buffer(buffer_type, index);
        sys::xioctl(self.fd(), vidioc::VIDIOC_QUERYBUF, &mut raw)?;

        Ok(BufferPlacement {
            index: raw.index,
            offset: sys::mmap_offset(&raw),
            length: raw.length,
        })
    }

    #[allow(unsafe_code)]
    fn map_buffer(&self, placement: &BufferPlacement) -> io::Result<MmapMut> {
        // SAFETY: offset and length were reported by VIDIOC_QUERYBUF on this
        // fd. The kernel keeps the pages alive until the mapping is dropped,
        // and the ring never unmaps while the stream is on.
        unsafe {
            MmapOptions::new()
                .offset(u64::from(placement.offset))
                .len(placement.length as usize)
                .map_mut(&self.file)
        }
    }

    fn queue_buffer(&mut self, buffer_type: BufferType, index: u32) -> io::Result<()> {
        let mut raw = mmap_buffer(buffer_type, index);
        sys::xioctl(self.fd(), vidioc::VIDIOC_QBUF, &mut raw)
    }

    fn dequeue_buffer(&mut self, buffer_type: BufferType) -> io::Result<DequeuedBuffer> {
        let mut raw = mmap_buffer(buffer_type, 0);
        sys::xioctl(self.fd(), vidioc::VIDIOC_DQBUF, &mut raw)?;

        // Timestamps are monotonic and never negative in practice.
        let secs = u64::try_from(raw.timestamp.tv_sec).unwrap_or(0);
        let micros = u64::try_from(raw.timestamp.tv_usec).unwrap_or(0);

        Ok(DequeuedBuffer {
            index: raw.index,
            bytes_used: raw.bytesused,
            sequence: raw.sequence,
            timestamp: Duration::from_secs(secs) + Duration::from_micros(micros),
        })
    }

    fn wait_ready(&self, timeout: Duration) -> io::Result<bool> {
        let timeout = poll_timeout(timeout)?;
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];

        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }

    fn stream_on(&mut self, buffer_type: BufferType) -> io::Result<()> {
        let mut kind = to_c_int(buffer_type.as_raw())?;
        sys::xioctl(self.fd(), vidioc::VIDIOC_STREAMON, &mut kind)
    }

    fn stream_off(&mut self, buffer_type: BufferType) -> io::Result<()> {
        let mut kind = to_c_int(buffer_type.as_raw())?;
        sys::xioctl(self.fd(), vidioc::VIDIOC_STREAMOFF, &mut kind)
    }
}
