//! Mock device implementation for testing without hardware.
//!
//! [`MockDevice`] behaves like a small V4L2 driver: it answers enumeration
//! ioctls from scripted tables, keeps a FIFO of queued buffers, and records
//! every call so tests can assert on ordering.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::sys::{V4L2_CAP_DEVICE_CAPS, V4L2_CTRL_FLAG_NEXT_CTRL};
use crate::traits::{
    BufferPlacement, BufferType, CaptureParams, Colorspace, ControlFlags, ControlId, ControlInfo,
    ControlType, DequeuedBuffer, FormatDescription, FormatFlags, FourCC, InputDescriptor,
    InputType, PixelFormatDescriptor, RawCapability, RawMenuItem, StandardDescriptor, VideoDevice,
};

/// `V4L2_CAP_VIDEO_CAPTURE`.
pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// `V4L2_CAP_VIDEO_OUTPUT`.
pub const CAP_VIDEO_OUTPUT: u32 = 0x0000_0002;
/// `V4L2_CAP_VIDEO_CAPTURE_MPLANE`.
pub const CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
/// `V4L2_CAP_STREAMING`.
pub const CAP_STREAMING: u32 = 0x0400_0000;

/// `V4L2_CID_BRIGHTNESS`.
pub const CID_BRIGHTNESS: ControlId = ControlId(0x0098_0900);
/// `V4L2_CID_CONTRAST`.
pub const CID_CONTRAST: ControlId = ControlId(0x0098_0901);
/// `V4L2_CID_POWER_LINE_FREQUENCY`, a user-class menu control.
pub const CID_POWER_LINE: ControlId = ControlId(0x0098_0918);
/// `V4L2_CID_EXPOSURE_ABSOLUTE`, a camera-class control.
pub const CID_EXPOSURE_ABSOLUTE: ControlId = ControlId(0x009a_0902);

/// One ioctl (or mmap/poll) seen by the mock.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    QueryCaps,
    EnumStandard(u32),
    EnumInput(u32),
    GetInput,
    SetInput(u32),
    EnumFormat(BufferType, u32),
    GetFormat,
    SetFormat(FourCC),
    CaptureParams,
    QueryControl(u32),
    QueryMenu(ControlId, u32),
    GetControl(ControlId),
    SetControl(ControlId, i32),
    GetExtControl(ControlId),
    TryExtControl(ControlId, i32),
    SetExtControl(ControlId, i32),
    RequestBuffers(u32),
    QueryBuffer(u32),
    Map(u32),
    Queue(u32),
    Dequeue,
    WaitReady,
    StreamOn,
    StreamOff,
}

/// A scripted control.
#[derive(Debug, Clone)]
pub struct MockControl {
    /// What `VIDIOC_QUERYCTRL` reports.
    pub info: ControlInfo,
    /// Current value.
    pub value: i32,
    /// Menu entries by index; missing indices are holes.
    pub menu: Vec<(u32, RawMenuItem)>,
    /// Reads of the value fail with `EIO`.
    pub unreadable: bool,
}

impl MockControl {
    /// An integer control.
    #[must_use]
    pub fn integer(id: ControlId, name: &str, minimum: i32, maximum: i32, step: i32, default: i32) -> Self {
        Self {
            info: ControlInfo {
                id,
                name: name.to_owned(),
                kind: ControlType::Integer,
                minimum,
                maximum,
                step,
                default,
                flags: ControlFlags::SLIDER,
            },
            value: default,
            menu: Vec::new(),
            unreadable: false,
        }
    }

    /// A named menu control covering `[minimum, maximum]`.
    #[must_use]
    pub fn menu(id: ControlId, name: &str, minimum: i32, maximum: i32, entries: &[(u32, &str)]) -> Self {
        Self {
            info: ControlInfo {
                id,
                name: name.to_owned(),
                kind: ControlType::Menu,
                minimum,
                maximum,
                step: 1,
                default: minimum,
                flags: ControlFlags::empty(),
            },
            value: minimum,
            menu: entries
                .iter()
                .map(|&(index, label)| {
                    (
                        index,
                        RawMenuItem {
                            name: label.to_owned(),
                            value: 0,
                        },
                    )
                })
                .collect(),
            unreadable: false,
        }
    }

    /// Replace the control flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: ControlFlags) -> Self {
        self.info.flags = flags;
        self
    }

    /// Make value reads fail.
    #[must_use]
    pub const fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    caps: RawCapability,
    fail_query_caps: bool,
    standards: Vec<StandardDescriptor>,
    inputs: Vec<InputDescriptor>,
    current_input: u32,
    sticky_input: bool,
    fail_set_input: bool,
    formats: Vec<FormatDescription>,
    format: PixelFormatDescriptor,
    fail_get_format: bool,
    reject_set_format: bool,
    controls: Vec<MockControl>,
    repeat_controls: bool,
    grant_limit: Option<u32>,
    reject_request: bool,
    fail_map_at: Option<u32>,
    fail_stream_on: bool,
    fail_stream_off: bool,
    rogue_dequeue: Option<u32>,
    frame: Vec<u8>,
    bytes_used: Option<u32>,
    granted: u32,
    kernel_queue: VecDeque<u32>,
    streaming: bool,
    sequence: u32,
    calls: RefCell<Vec<MockCall>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

fn eio() -> io::Error {
    io::Error::from_raw_os_error(libc::EIO)
}

/// A camera-type input.
#[must_use]
pub fn camera_input(index: u32, name: &str) -> InputDescriptor {
    InputDescriptor {
        index,
        name: name.to_owned(),
        kind: InputType::Camera,
        status: 0,
        capabilities: 0,
    }
}

/// A tuner-type input.
#[must_use]
pub fn tuner_input(index: u32, name: &str) -> InputDescriptor {
    InputDescriptor {
        kind: InputType::Tuner,
        ..camera_input(index, name)
    }
}

/// An enumerated format entry.
#[must_use]
pub fn format_entry(buffer_type: BufferType, index: u32, fourcc: FourCC, flags: FormatFlags) -> FormatDescription {
    FormatDescription {
        index,
        buffer_type,
        flags,
        description: fourcc.to_string(),
        fourcc,
    }
}

/// Bytes per pixel of the packed layouts the mock knows about.
const fn bytes_per_pixel(fourcc: FourCC) -> u32 {
    match &fourcc.0 {
        b"GREY" => 1,
        b"RGB3" => 3,
        b"MJPG" => 0,
        _ => 2,
    }
}

impl MockDevice {
    /// Create a new mock device with default settings: a single camera
    /// input, YUYV 640x480, brightness and contrast controls.
    #[must_use]
    pub fn new() -> Self {
        let format = PixelFormatDescriptor {
            buffer_type: BufferType::VideoCapture,
            fourcc: FourCC::YUYV,
            width: 640,
            height: 480,
            bytes_per_line: 1280,
            size_image: 640 * 480 * 2,
            colorspace: Colorspace::Srgb,
            field: 1,
        };
        let frame = generate_test_frame(&format, TestPattern::Gradient);

        Self {
            caps: RawCapability {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                version: 0x0006_0800,
                capabilities: CAP_VIDEO_CAPTURE | CAP_STREAMING | V4L2_CAP_DEVICE_CAPS,
                device_caps: CAP_VIDEO_CAPTURE | CAP_STREAMING,
            },
            fail_query_caps: false,
            standards: Vec::new(),
            inputs: vec![camera_input(0, "Camera 0")],
            current_input: 0,
            sticky_input: false,
            fail_set_input: false,
            formats: vec![format_entry(
                BufferType::VideoCapture,
                0,
                FourCC::YUYV,
                FormatFlags::empty(),
            )],
            format,
            fail_get_format: false,
            reject_set_format: false,
            controls: vec![
                MockControl::integer(CID_BRIGHTNESS, "Brightness", 0, 255, 1, 128),
                MockControl::integer(CID_CONTRAST, "Contrast", 0, 255, 1, 32),
            ],
            repeat_controls: false,
            grant_limit: None,
            reject_request: false,
            fail_map_at: None,
            fail_stream_on: false,
            fail_stream_off: false,
            rogue_dequeue: None,
            frame,
            bytes_used: None,
            granted: 0,
            kernel_queue: VecDeque::new(),
            streaming: false,
            sequence: 0,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Set the capability words. `device_caps` of `Some` also sets
    /// `V4L2_CAP_DEVICE_CAPS` in the global word.
    #[must_use]
    pub const fn with_capability_bits(mut self, capabilities: u32, device_caps: Option<u32>) -> Self {
        match device_caps {
            Some(device) => {
                self.caps.capabilities = capabilities | V4L2_CAP_DEVICE_CAPS;
                self.caps.device_caps = device;
            }
            None => {
                self.caps.capabilities = capabilities;
                self.caps.device_caps = 0;
            }
        }
        self
    }

    /// Make `VIDIOC_QUERYCAP` fail.
    #[must_use]
    pub const fn with_query_failure(mut self) -> Self {
        self.fail_query_caps = true;
        self
    }

    /// Set the video standards.
    #[must_use]
    pub fn with_standards(mut self, standards: Vec<StandardDescriptor>) -> Self {
        self.standards = standards;
        self
    }

    /// Set the inputs and the currently active one.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<InputDescriptor>, current: u32) -> Self {
        self.inputs = inputs;
        self.current_input = current;
        self
    }

    /// `VIDIOC_S_INPUT` succeeds but the active input never changes.
    #[must_use]
    pub const fn with_sticky_input(mut self) -> Self {
        self.sticky_input = true;
        self
    }

    /// Make `VIDIOC_S_INPUT` fail.
    #[must_use]
    pub const fn with_set_input_failure(mut self) -> Self {
        self.fail_set_input = true;
        self
    }

    /// Set the enumerated formats.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<FormatDescription>) -> Self {
        self.formats = formats;
        self
    }

    /// Set the current format. The frame payload is regenerated to match.
    #[must_use]
    pub fn with_format(mut self, format: PixelFormatDescriptor) -> Self {
        self.frame = generate_test_frame(&format, TestPattern::Gradient);
        self.format = format;
        self
    }

    /// Make `VIDIOC_G_FMT` fail.
    #[must_use]
    pub const fn with_get_format_failure(mut self) -> Self {
        self.fail_get_format = true;
        self
    }

    /// Make `VIDIOC_S_FMT` fail.
    #[must_use]
    pub const fn with_set_format_rejected(mut self) -> Self {
        self.reject_set_format = true;
        self
    }

    /// Set the controls.
    #[must_use]
    pub fn with_controls(mut self, controls: Vec<MockControl>) -> Self {
        self.controls = controls;
        self
    }

    /// `VIDIOC_QUERYCTRL` with `NEXT_CTRL` keeps returning the first
    /// control, like a buggy driver.
    #[must_use]
    pub const fn with_repeating_controls(mut self) -> Self {
        self.repeat_controls = true;
        self
    }

    /// Grant at most `limit` buffers.
    #[must_use]
    pub const fn with_grant_limit(mut self, limit: u32) -> Self {
        self.grant_limit = Some(limit);
        self
    }

    /// Make `VIDIOC_REQBUFS` fail for non-zero counts.
    #[must_use]
    pub const fn with_request_rejected(mut self) -> Self {
        self.reject_request = true;
        self
    }

    /// Make mapping of buffer `index` fail.
    #[must_use]
    pub const fn with_map_failure_at(mut self, index: u32) -> Self {
        self.fail_map_at = Some(index);
        self
    }

    /// Make `VIDIOC_STREAMON` fail.
    #[must_use]
    pub const fn with_stream_on_failure(mut self) -> Self {
        self.fail_stream_on = true;
        self
    }

    /// Make `VIDIOC_STREAMOFF` fail, leaving the stream on.
    #[must_use]
    pub const fn with_stream_off_failure(mut self) -> Self {
        self.fail_stream_off = true;
        self
    }

    /// `VIDIOC_DQBUF` reports `index` regardless of the queue.
    #[must_use]
    pub const fn with_rogue_dequeue(mut self, index: u32) -> Self {
        self.rogue_dequeue = Some(index);
        self
    }

    /// Set the payload every mapped buffer is filled with.
    #[must_use]
    pub fn with_frame(mut self, frame: Vec<u8>) -> Self {
        self.frame = frame;
        self
    }

    /// Fill buffers with a generated pattern for the current format.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.frame = generate_test_frame(&self.format, pattern);
        self
    }

    /// Override the `bytesused` reported on dequeue.
    #[must_use]
    pub const fn with_bytes_used(mut self, bytes_used: u32) -> Self {
        self.bytes_used = Some(bytes_used);
        self
    }

    /// Every call seen so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Buffers currently owned by the "kernel", in queue order.
    pub fn queued(&self) -> Vec<u32> {
        self.kernel_queue.iter().copied().collect()
    }

    /// Number of buffers currently granted.
    pub const fn granted(&self) -> u32 {
        self.granted
    }

    /// Whether the stream is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Active input index.
    pub const fn current_input(&self) -> u32 {
        self.current_input
    }

    /// Current format.
    pub const fn current_format(&self) -> &PixelFormatDescriptor {
        &self.format
    }

    /// Current value of a control.
    pub fn control_value(&self, id: ControlId) -> Option<i32> {
        self.find_control(id).map(|control| control.value)
    }

    fn record(&self, call: MockCall) {
        self.calls.borrow_mut().push(call);
    }

    fn find_control(&self, id: ControlId) -> Option<&MockControl> {
        self.controls.iter().find(|control| control.info.id == id)
    }

    fn find_control_mut(&mut self, id: ControlId) -> Option<&mut MockControl> {
        self.controls.iter_mut().find(|control| control.info.id == id)
    }

    fn read_control(&self, id: ControlId) -> io::Result<i32> {
        match self.find_control(id) {
            Some(control) if control.unreadable => Err(eio()),
            Some(control) => Ok(control.value),
            None => Err(einval()),
        }
    }

    fn check_control_write(&self, id: ControlId, value: i32) -> io::Result<()> {
        let control = self.find_control(id).ok_or_else(einval)?;
        if control.info.flags.intersects(ControlFlags::READ_ONLY | ControlFlags::DISABLED) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        if value < control.info.minimum || value > control.info.maximum {
            return Err(io::Error::from_raw_os_error(libc::ERANGE));
        }
        Ok(())
    }

    fn write_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        self.check_control_write(id, value)?;
        if let Some(control) = self.find_control_mut(id) {
            control.value = value;
        }
        Ok(())
    }
}

impl VideoDevice for MockDevice {
    type Mapping = Vec<u8>;

    fn query_caps(&self) -> io::Result<RawCapability> {
        self.record(MockCall::QueryCaps);
        if self.fail_query_caps {
            return Err(eio());
        }
        Ok(self.caps.clone())
    }

    fn enum_standard(&self, index: u32) -> io::Result<StandardDescriptor> {
        self.record(MockCall::EnumStandard(index));
        self.standards.get(index as usize).cloned().ok_or_else(einval)
    }

    fn enum_input(&self, index: u32) -> io::Result<InputDescriptor> {
        self.record(MockCall::EnumInput(index));
        self.inputs.get(index as usize).cloned().ok_or_else(einval)
    }

    fn input(&self) -> io::Result<u32> {
        self.record(MockCall::GetInput);
        Ok(self.current_input)
    }

    fn set_input(&mut self, index: u32) -> io::Result<()> {
        self.record(MockCall::SetInput(index));
        if self.fail_set_input {
            return Err(eio());
        }
        if index as usize >= self.inputs.len() {
            return Err(einval());
        }
        if !self.sticky_input {
            self.current_input = index;
        }
        Ok(())
    }

    fn enum_format(&self, buffer_type: BufferType, index: u32) -> io::Result<FormatDescription> {
        self.record(MockCall::EnumFormat(buffer_type, index));
        self.formats
            .iter()
            .filter(|entry| entry.buffer_type == buffer_type)
            .nth(index as usize)
            .cloned()
            .ok_or_else(einval)
    }

    fn format(&self, buffer_type: BufferType) -> io::Result<PixelFormatDescriptor> {
        self.record(MockCall::GetFormat);
        if self.fail_get_format {
            return Err(eio());
        }
        Ok(PixelFormatDescriptor {
            buffer_type,
            ..self.format.clone()
        })
    }

    fn set_format(&mut self, format: &PixelFormatDescriptor) -> io::Result<PixelFormatDescriptor> {
        self.record(MockCall::SetFormat(format.fourcc));
        if self.reject_set_format {
            return Err(einval());
        }

        // Drivers own stride and size; recompute them like one would.
        let mut applied = format.clone();
        let width = applied.width.max(2);
        applied.width = width;
        applied.bytes_per_line = width * bytes_per_pixel(applied.fourcc);
        applied.size_image = if applied.bytes_per_line == 0 {
            width * applied.height
        } else {
            applied.bytes_per_line * applied.height
        };
        self.format = applied.clone();
        Ok(applied)
    }

    fn capture_params(&self, _buffer_type: BufferType) -> io::Result<CaptureParams> {
        self.record(MockCall::CaptureParams);
        Ok(CaptureParams {
            capability: 0x1000,
            capture_mode: 0,
            time_per_frame: (1, 30),
            read_buffers: 0,
        })
    }

    fn query_control(&self, id: u32) -> io::Result<ControlInfo> {
        self.record(MockCall::QueryControl(id));
        let control = if id & V4L2_CTRL_FLAG_NEXT_CTRL == 0 {
            self.find_control(ControlId(id))
        } else if self.repeat_controls {
            self.controls.first()
        } else {
            let after = id & !V4L2_CTRL_FLAG_NEXT_CTRL;
            self.controls
                .iter()
                .filter(|control| control.info.id.0 > after)
                .min_by_key(|control| control.info.id)
        };
        control.map(|control| control.info.clone()).ok_or_else(einval)
    }

    fn query_menu(&self, id: ControlId, index: u32) -> io::Result<RawMenuItem> {
        self.record(MockCall::QueryMenu(id, index));
        self.find_control(id)
            .and_then(|control| control.menu.iter().find(|(entry, _)| *entry == index))
            .map(|(_, item)| item.clone())
            .ok_or_else(einval)
    }

    fn control(&self, id: ControlId) -> io::Result<i32> {
        self.record(MockCall::GetControl(id));
        self.read_control(id)
    }

    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        self.record(MockCall::SetControl(id, value));
        self.write_control(id, value)
    }

    fn ext_control(&self, id: ControlId) -> io::Result<i32> {
        self.record(MockCall::GetExtControl(id));
        self.read_control(id)
    }

    fn try_ext_control(&self, id: ControlId, value: i32) -> io::Result<()> {
        self.record(MockCall::TryExtControl(id, value));
        self.check_control_write(id, value)
    }

    fn set_ext_control(&mut self, id: ControlId, value: i32) -> io::Result<()> {
        self.record(MockCall::SetExtControl(id, value));
        self.write_control(id, value)
    }

    fn request_buffers(&mut self, _buffer_type: BufferType, count: u32) -> io::Result<u32> {
        self.record(MockCall::RequestBuffers(count));
        if self.streaming {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        if count == 0 {
            self.granted = 0;
            self.kernel_queue.clear();
            return Ok(0);
        }
        if self.reject_request {
            return Err(einval());
        }
        self.granted = self.grant_limit.map_or(count, |limit| count.min(limit));
        Ok(self.granted)
    }

    fn query_buffer(&self, _buffer_type: BufferType, index: u32) -> io::Result<BufferPlacement> {
        self.record(MockCall::QueryBuffer(index));
        if index >= self.granted {
            return Err(einval());
        }
        let length = self.format.size_image;
        Ok(BufferPlacement {
            index,
            offset: index * length,
            length,
        })
    }

    fn map_buffer(&self, placement: &BufferPlacement) -> io::Result<Vec<u8>> {
        self.record(MockCall::Map(placement.index));
        if self.fail_map_at == Some(placement.index) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        let mut mapping = vec![0u8; placement.length as usize];
        let filled = mapping.len().min(self.frame.len());
        if let (Some(dst), Some(src)) = (mapping.get_mut(..filled), self.frame.get(..filled)) {
            dst.copy_from_slice(src);
        }
        Ok(mapping)
    }

    fn queue_buffer(&mut self, _buffer_type: BufferType, index: u32) -> io::Result<()> {
        self.record(MockCall::Queue(index));
        if index >= self.granted || self.kernel_queue.contains(&index) {
            return Err(einval());
        }
        self.kernel_queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self, _buffer_type: BufferType) -> io::Result<DequeuedBuffer> {
        self.record(MockCall::Dequeue);
        if !self.streaming {
            return Err(einval());
        }
        let index = match self.rogue_dequeue {
            Some(index) => index,
            None => self
                .kernel_queue
                .pop_front()
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?,
        };

        let sequence = self.sequence;
        self.sequence += 1;
        let payload = u32::try_from(self.frame.len()).unwrap_or(u32::MAX);

        Ok(DequeuedBuffer {
            index,
            bytes_used: self
                .bytes_used
                .unwrap_or_else(|| payload.min(self.format.size_image)),
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
        })
    }

    fn wait_ready(&self, _timeout: Duration) -> io::Result<bool> {
        self.record(MockCall::WaitReady);
        Ok(self.streaming && !self.kernel_queue.is_empty())
    }

    fn stream_on(&mut self, _buffer_type: BufferType) -> io::Result<()> {
        self.record(MockCall::StreamOn);
        if self.fail_stream_on {
            return Err(eio());
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self, _buffer_type: BufferType) -> io::Result<()> {
        self.record(MockCall::StreamOff);
        if self.fail_stream_off {
            return Err(eio());
        }
        self.streaming = false;
        self.kernel_queue.clear();
        Ok(())
    }
}

/// Generate a frame for `format` filled with `pattern`.
///
/// Packed 4:2:2 layouts get Y/U/Y/V quads in the device's byte order;
/// GREY gets the luma value alone. Other formats are left zeroed.
pub fn generate_test_frame(format: &PixelFormatDescriptor, pattern: TestPattern) -> Vec<u8> {
    let stride = format.bytes_per_line as usize;
    let mut data = vec![0u8; format.size_image as usize];

    for row in 0..format.height as usize {
        for x in 0..format.width as usize {
            #[allow(clippy::cast_possible_truncation)]
            let (y_val, u_val, v_val) = match pattern {
                TestPattern::Gradient => (((x * 255) / format.width as usize) as u8, 128, 128),
                TestPattern::Solid(y, u, v) => (y, u, v),
            };
            let chroma = if x % 2 == 0 { u_val } else { v_val };

            let (luma_at, chroma_at) = match &format.fourcc.0 {
                b"YUYV" | b"YVYU" => (row * stride + x * 2, Some(row * stride + x * 2 + 1)),
                b"UYVY" | b"VYUY" => (row * stride + x * 2 + 1, Some(row * stride + x * 2)),
                b"GREY" => (row * stride + x, None),
                _ => return data,
            };
            if let Some(byte) = data.get_mut(luma_at) {
                *byte = y_val;
            }
            if let Some(byte) = chroma_at.and_then(|at| data.get_mut(at)) {
                *byte = chroma;
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        let caps = device.query_caps().expect("query_caps should succeed");
        assert_eq!(caps.driver, "mock");
        assert_ne!(caps.capabilities & V4L2_CAP_DEVICE_CAPS, 0);
        assert_eq!(device.calls(), vec![MockCall::QueryCaps]);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device
            .format(BufferType::VideoCapture)
            .expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let request = PixelFormatDescriptor {
            fourcc: FourCC::GREY,
            width: 320,
            height: 240,
            ..format
        };
        let actual = device.set_format(&request).expect("set_format should succeed");
        assert_eq!(actual.bytes_per_line, 320);
        assert_eq!(actual.size_image, 320 * 240);
    }

    #[test]
    fn test_mock_queue_is_fifo() {
        let mut device = MockDevice::new();
        let granted = device
            .request_buffers(BufferType::VideoCapture, 3)
            .expect("request should succeed");
        assert_eq!(granted, 3);

        for index in [2, 0, 1] {
            device
                .queue_buffer(BufferType::VideoCapture, index)
                .expect("queue should succeed");
        }
        assert!(device.queue_buffer(BufferType::VideoCapture, 0).is_err());

        device
            .stream_on(BufferType::VideoCapture)
            .expect("stream_on should succeed");
        let first = device
            .dequeue_buffer(BufferType::VideoCapture)
            .expect("dequeue should succeed");
        let second = device
            .dequeue_buffer(BufferType::VideoCapture)
            .expect("dequeue should succeed");
        assert_eq!((first.index, first.sequence), (2, 0));
        assert_eq!((second.index, second.sequence), (0, 1));
    }

    #[test]
    fn test_mock_next_ctrl_walks_in_id_order() {
        let device = MockDevice::new();
        let first = device
            .query_control(V4L2_CTRL_FLAG_NEXT_CTRL)
            .expect("first control should exist");
        assert_eq!(first.id, CID_BRIGHTNESS);
        let second = device
            .query_control(first.id.0 | V4L2_CTRL_FLAG_NEXT_CTRL)
            .expect("second control should exist");
        assert_eq!(second.id, CID_CONTRAST);
        assert!(device
            .query_control(second.id.0 | V4L2_CTRL_FLAG_NEXT_CTRL)
            .is_err());
    }

    #[test]
    fn test_gradient_pattern() {
        let device = MockDevice::new();
        let format = device.current_format().clone();
        let data = generate_test_frame(&format, TestPattern::Gradient);

        assert_eq!(data.len(), (640 * 480 * 2) as usize);
        // Left edge should be dark, right edge bright
        assert!(data.first().copied().unwrap_or(255) < 10);
        let last_row = (479 * 1280) as usize;
        assert!(data.get(last_row + 638 * 2).copied().unwrap_or(0) > 200);
    }

    #[test]
    fn test_solid_pattern_uyvy() {
        let format = PixelFormatDescriptor {
            buffer_type: BufferType::VideoCapture,
            fourcc: FourCC::UYVY,
            width: 4,
            height: 2,
            bytes_per_line: 8,
            size_image: 16,
            colorspace: Colorspace::Default,
            field: 1,
        };
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));
        assert_eq!(data.get(..4), Some(&[64, 128, 192, 128][..]));
    }
}
