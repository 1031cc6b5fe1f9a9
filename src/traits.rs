//! Core types and the kernel-facing device trait.
//!
//! [`VideoDevice`] is the seam between the capture state machine and the
//! kernel: one method per ioctl the core issues, plus buffer mapping and a
//! readiness wait. Everything above it (negotiation, the buffer ring, the
//! feedback loop) is written against the trait so it can run on a real node
//! or on the test mock.

use std::fmt;
use std::io;
use std::ops::Deref;
use std::time::Duration;

use bitflags::bitflags;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Build from the little-endian 32-bit code used by the kernel.
    #[must_use]
    pub const fn from_u32(code: u32) -> Self {
        Self(code.to_le_bytes())
    }

    /// The little-endian 32-bit code used by the kernel.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// YVYU pixel format (4:2:2 packed, chroma swapped).
    pub const YVYU: Self = Self::new(b"YVYU");
    /// UYVY pixel format (4:2:2 packed, chroma first).
    pub const UYVY: Self = Self::new(b"UYVY");
    /// VYUY pixel format (4:2:2 packed, chroma first and swapped).
    pub const VYUY: Self = Self::new(b"VYUY");
    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", v4l::FourCC::from(*self))
    }
}

impl std::str::FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("FourCC must be exactly four bytes, got {s:?}"))?;
        Ok(Self(bytes))
    }
}

/// Buffer (stream) type, `enum v4l2_buf_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// Single-planar video capture.
    VideoCapture,
    /// Video output.
    VideoOutput,
    /// Video overlay.
    VideoOverlay,
    /// Raw VBI capture.
    VbiCapture,
    /// Raw VBI output.
    VbiOutput,
    /// Sliced VBI capture.
    SlicedVbiCapture,
    /// Sliced VBI output.
    SlicedVbiOutput,
    /// Video output overlay.
    VideoOutputOverlay,
    /// Multi-planar video capture.
    VideoCaptureMplane,
    /// Multi-planar video output.
    VideoOutputMplane,
    /// Anything newer.
    Other(u32),
}

impl BufferType {
    /// Buffer types swept when looking for capture formats.
    pub const CAPTURE_TYPES: [Self; 4] = [
        Self::VideoCapture,
        Self::VbiCapture,
        Self::SlicedVbiCapture,
        Self::VideoCaptureMplane,
    ];

    /// Kernel value of the buffer type.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::VideoCapture => 1,
            Self::VideoOutput => 2,
            Self::VideoOverlay => 3,
            Self::VbiCapture => 4,
            Self::VbiOutput => 5,
            Self::SlicedVbiCapture => 6,
            Self::SlicedVbiOutput => 7,
            Self::VideoOutputOverlay => 8,
            Self::VideoCaptureMplane => 9,
            Self::VideoOutputMplane => 10,
            Self::Other(raw) => raw,
        }
    }

    /// Decode a kernel buffer type.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::VideoCapture,
            2 => Self::VideoOutput,
            3 => Self::VideoOverlay,
            4 => Self::VbiCapture,
            5 => Self::VbiOutput,
            6 => Self::SlicedVbiCapture,
            7 => Self::SlicedVbiOutput,
            8 => Self::VideoOutputOverlay,
            9 => Self::VideoCaptureMplane,
            10 => Self::VideoOutputMplane,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VideoCapture => "Capture",
            Self::VideoOutput => "Output",
            Self::VideoOverlay => "Overlay",
            Self::VbiCapture => "VBI-Capture",
            Self::VbiOutput => "VBI-Output",
            Self::SlicedVbiCapture => "Sliced-VBI-Capture",
            Self::SlicedVbiOutput => "Sliced-VBI-Output",
            Self::VideoOutputOverlay => "Output-Overlay",
            Self::VideoCaptureMplane => "Capture-Mplane",
            Self::VideoOutputMplane => "Output-Mplane",
            Self::Other(raw) => return write!(f, "Unknown({raw})"),
        };
        f.write_str(name)
    }
}

/// Physical input class, `V4L2_INPUT_TYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// RF tuner input.
    Tuner,
    /// Camera, composite, S-Video, HDMI.
    Camera,
    /// Touch sensor.
    Touch,
    /// Unrecognised type.
    Other(u32),
}

impl InputType {
    /// Decode a kernel input type.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Tuner,
            2 => Self::Camera,
            3 => Self::Touch,
            other => Self::Other(other),
        }
    }

    /// Kernel value of the input type.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Tuner => 1,
            Self::Camera => 2,
            Self::Touch => 3,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuner => f.write_str("Tuner"),
            Self::Camera => f.write_str("Camera"),
            Self::Touch => f.write_str("Touch"),
            Self::Other(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// Control value type, `enum v4l2_ctrl_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// Signed integer with range and step.
    Integer,
    /// On/off.
    Boolean,
    /// Named menu entries.
    Menu,
    /// Action without a value.
    Button,
    /// 64-bit integer.
    Integer64,
    /// Class header, not a real control.
    CtrlClass,
    /// String payload.
    String,
    /// Bit mask.
    Bitmask,
    /// Integer-valued menu entries.
    IntegerMenu,
    /// Compound or newer types.
    Other(u32),
}

impl ControlType {
    /// Decode a kernel control type.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Integer,
            2 => Self::Boolean,
            3 => Self::Menu,
            4 => Self::Button,
            5 => Self::Integer64,
            6 => Self::CtrlClass,
            7 => Self::String,
            8 => Self::Bitmask,
            9 => Self::IntegerMenu,
            other => Self::Other(other),
        }
    }

    /// Kernel value of the control type.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Integer => 1,
            Self::Boolean => 2,
            Self::Menu => 3,
            Self::Button => 4,
            Self::Integer64 => 5,
            Self::CtrlClass => 6,
            Self::String => 7,
            Self::Bitmask => 8,
            Self::IntegerMenu => 9,
            Self::Other(raw) => raw,
        }
    }

    /// Whether the control enumerates its values through `VIDIOC_QUERYMENU`.
    #[must_use]
    pub const fn has_menu(self) -> bool {
        matches!(self, Self::Menu | Self::IntegerMenu)
    }

    /// Whether the control carries a 32-bit value readable with
    /// `VIDIOC_G_CTRL` / `VIDIOC_G_EXT_CTRLS`.
    #[must_use]
    pub const fn has_value(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Boolean | Self::Menu | Self::Bitmask | Self::IntegerMenu
        )
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::Menu => "Menu",
            Self::Button => "Button",
            Self::Integer64 => "Integer64",
            Self::CtrlClass => "CtrlClass",
            Self::String => "String",
            Self::Bitmask => "Bitmask",
            Self::IntegerMenu => "Integer_menu",
            Self::Other(raw) => return write!(f, "Unknown({raw})"),
        };
        f.write_str(name)
    }
}

/// Colorspace tag, `enum v4l2_colorspace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    /// Driver default.
    Default,
    /// SMPTE 170M (SDTV).
    Smpte170m,
    /// SMPTE 240M.
    Smpte240m,
    /// Rec. 709 (HDTV).
    Rec709,
    /// Broken BT878.
    Bt878,
    /// NTSC 1953.
    System470M,
    /// EBU Tech 3213.
    System470Bg,
    /// JPEG (sRGB primaries, full range).
    Jpeg,
    /// sRGB.
    Srgb,
    /// opRGB.
    Oprgb,
    /// BT.2020.
    Bt2020,
    /// Raw sensor data.
    Raw,
    /// DCI-P3.
    DciP3,
    /// Anything newer.
    Other(u32),
}

impl Colorspace {
    /// Decode a kernel colorspace.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Default,
            1 => Self::Smpte170m,
            2 => Self::Smpte240m,
            3 => Self::Rec709,
            4 => Self::Bt878,
            5 => Self::System470M,
            6 => Self::System470Bg,
            7 => Self::Jpeg,
            8 => Self::Srgb,
            9 => Self::Oprgb,
            10 => Self::Bt2020,
            11 => Self::Raw,
            12 => Self::DciP3,
            other => Self::Other(other),
        }
    }

    /// Kernel value of the colorspace.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Smpte170m => 1,
            Self::Smpte240m => 2,
            Self::Rec709 => 3,
            Self::Bt878 => 4,
            Self::System470M => 5,
            Self::System470Bg => 6,
            Self::Jpeg => 7,
            Self::Srgb => 8,
            Self::Oprgb => 9,
            Self::Bt2020 => 10,
            Self::Raw => 11,
            Self::DciP3 => 12,
            Self::Other(raw) => raw,
        }
    }
}

/// Control identifier (`V4L2_CID_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u32);

impl ControlId {
    /// Control class of this id (`V4L2_CTRL_ID2CLASS`).
    #[must_use]
    pub const fn class(self) -> u32 {
        self.0 & 0x0fff_0000
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

bitflags! {
    /// Control flags, `V4L2_CTRL_FLAG_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControlFlags: u32 {
        /// Control is permanently disabled.
        const DISABLED = 0x0001;
        /// Control is temporarily grabbed by another owner.
        const GRABBED = 0x0002;
        /// Control cannot be written.
        const READ_ONLY = 0x0004;
        /// Changing it may affect other controls.
        const UPDATE = 0x0008;
        /// Currently inactive.
        const INACTIVE = 0x0010;
        /// Best shown as a slider.
        const SLIDER = 0x0020;
        /// Control cannot be read.
        const WRITE_ONLY = 0x0040;
        /// Value changes on its own.
        const VOLATILE = 0x0080;
        /// Value lives in a payload pointer.
        const HAS_PAYLOAD = 0x0100;
        /// Writing triggers an action.
        const EXECUTE_ON_WRITE = 0x0200;
        /// Changing it alters the buffer layout.
        const MODIFY_LAYOUT = 0x0400;
    }
}

bitflags! {
    /// Format description flags, `V4L2_FMT_FLAG_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatFlags: u32 {
        /// Compressed bitstream.
        const COMPRESSED = 0x0001;
        /// Converted in software by libv4l.
        const EMULATED = 0x0002;
    }
}

/// Raw answer of `VIDIOC_QUERYCAP`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCapability {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Packed kernel version.
    pub version: u32,
    /// Capabilities of the whole physical device.
    pub capabilities: u32,
    /// Capabilities of this node, valid when `DEVICE_CAPS` is set.
    pub device_caps: u32,
}

/// Device capability flags.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Kernel version as (major, minor, patch).
    pub version: (u8, u8, u8),
    /// Capability bits that apply to this node.
    pub flags: v4l::capability::Flags,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// One entry of `VIDIOC_ENUMSTD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardDescriptor {
    /// Enumeration index.
    pub index: u32,
    /// `v4l2_std_id` bits.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// Frame period as numerator/denominator seconds.
    pub frame_period: (u32, u32),
    /// Lines per frame.
    pub frame_lines: u32,
}

/// One entry of `VIDIOC_ENUMINPUT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    /// Input index.
    pub index: u32,
    /// Human-readable name.
    pub name: String,
    /// Input class.
    pub kind: InputType,
    /// `V4L2_IN_ST_*` bits.
    pub status: u32,
    /// `V4L2_IN_CAP_*` bits.
    pub capabilities: u32,
}

/// One entry of `VIDIOC_ENUM_FMT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Enumeration index within its buffer type.
    pub index: u32,
    /// Buffer type it was enumerated for.
    pub buffer_type: BufferType,
    /// Compressed/emulated flags.
    pub flags: FormatFlags,
    /// Driver description.
    pub description: String,
    /// Pixel format code.
    pub fourcc: FourCC,
}

/// A single-planar pixel format as read from or written to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// Buffer type the format applies to.
    pub buffer_type: BufferType,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per line (stride).
    pub bytes_per_line: u32,
    /// Total frame size in bytes.
    pub size_image: u32,
    /// Colorspace tag.
    pub colorspace: Colorspace,
    /// Field order, `enum v4l2_field`.
    pub field: u32,
}

/// Streaming parameters from `VIDIOC_G_PARM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureParams {
    /// `V4L2_CAP_TIMEPERFRAME` and friends.
    pub capability: u32,
    /// `V4L2_MODE_HIGHQUALITY` and friends.
    pub capture_mode: u32,
    /// Frame interval as numerator/denominator seconds.
    pub time_per_frame: (u32, u32),
    /// Buffers used for read() I/O.
    pub read_buffers: u32,
}

/// Raw answer of `VIDIOC_QUERYCTRL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    /// Control identifier.
    pub id: ControlId,
    /// Human-readable name.
    pub name: String,
    /// Value type.
    pub kind: ControlType,
    /// Minimum value.
    pub minimum: i32,
    /// Maximum value.
    pub maximum: i32,
    /// Step between valid values.
    pub step: i32,
    /// Default value.
    pub default: i32,
    /// Control flags.
    pub flags: ControlFlags,
}

/// Raw answer of `VIDIOC_QUERYMENU`: the kernel returns either a name or an
/// integer in the same union, so both readings are provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMenuItem {
    /// Entry name for `Menu` controls.
    pub name: String,
    /// Entry value for `IntegerMenu` controls.
    pub value: i64,
}

/// Location of a granted buffer, from `VIDIOC_QUERYBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlacement {
    /// Ring slot.
    pub index: u32,
    /// Offset to pass to mmap.
    pub offset: u32,
    /// Mapped length in bytes.
    pub length: u32,
}

/// Result of `VIDIOC_DQBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Ring slot the kernel handed back.
    pub index: u32,
    /// Payload size, at most the mapped length.
    pub bytes_used: u32,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// Abstraction over the kernel video-device interface.
///
/// Each method maps to one ioctl (or mmap/poll) on the device node and
/// returns the raw OS error on failure; interpretation of failures is left
/// to the caller.
pub trait VideoDevice {
    /// A mapped buffer region, unmapped on drop.
    type Mapping: Deref<Target = [u8]>;

    /// `VIDIOC_QUERYCAP`.
    fn query_caps(&self) -> io::Result<RawCapability>;

    /// `VIDIOC_ENUMSTD`.
    fn enum_standard(&self, index: u32) -> io::Result<StandardDescriptor>;

    /// `VIDIOC_ENUMINPUT`.
    fn enum_input(&self, index: u32) -> io::Result<InputDescriptor>;

    /// `VIDIOC_G_INPUT`.
    fn input(&self) -> io::Result<u32>;

    /// `VIDIOC_S_INPUT`.
    fn set_input(&mut self, index: u32) -> io::Result<()>;

    /// `VIDIOC_ENUM_FMT`.
    fn enum_format(&self, buffer_type: BufferType, index: u32) -> io::Result<FormatDescription>;

    /// `VIDIOC_G_FMT`.
    fn format(&self, buffer_type: BufferType) -> io::Result<PixelFormatDescriptor>;

    /// `VIDIOC_S_FMT`. Returns the format as adjusted by the driver.
    fn set_format(&mut self, format: &PixelFormatDescriptor) -> io::Result<PixelFormatDescriptor>;

    /// `VIDIOC_G_PARM`.
    fn capture_params(&self, buffer_type: BufferType) -> io::Result<CaptureParams>;

    /// `VIDIOC_QUERYCTRL`. `id` may carry `V4L2_CTRL_FLAG_NEXT_CTRL`.
    fn query_control(&self, id: u32) -> io::Result<ControlInfo>;

    /// `VIDIOC_QUERYMENU`.
    fn query_menu(&self, id: ControlId, index: u32) -> io::Result<RawMenuItem>;

    /// `VIDIOC_G_CTRL`.
    fn control(&self, id: ControlId) -> io::Result<i32>;

    /// `VIDIOC_S_CTRL`.
    fn set_control(&mut self, id: ControlId, value: i32) -> io::Result<()>;

    /// `VIDIOC_G_EXT_CTRLS` for a single control of the id's class.
    fn ext_control(&self, id: ControlId) -> io::Result<i32>;

    /// `VIDIOC_TRY_EXT_CTRLS` for a single control of the id's class.
    fn try_ext_control(&self, id: ControlId, value: i32) -> io::Result<()>;

    /// `VIDIOC_S_EXT_CTRLS` for a single control of the id's class.
    fn set_ext_control(&mut self, id: ControlId, value: i32) -> io::Result<()>;

    /// `VIDIOC_REQBUFS` with memory-mapped I/O. Returns the granted count.
    fn request_buffers(&mut self, buffer_type: BufferType, count: u32) -> io::Result<u32>;

    /// `VIDIOC_QUERYBUF`.
    fn query_buffer(&self, buffer_type: BufferType, index: u32) -> io::Result<BufferPlacement>;

    /// Map a queried buffer read-write, shared.
    fn map_buffer(&self, placement: &BufferPlacement) -> io::Result<Self::Mapping>;

    /// `VIDIOC_QBUF`.
    fn queue_buffer(&mut self, buffer_type: BufferType, index: u32) -> io::Result<()>;

    /// `VIDIOC_DQBUF`. Blocks until a filled buffer is available.
    fn dequeue_buffer(&mut self, buffer_type: BufferType) -> io::Result<DequeuedBuffer>;

    /// Wait up to `timeout` for a filled buffer. Returns `false` on timeout.
    fn wait_ready(&self, timeout: Duration) -> io::Result<bool>;

    /// `VIDIOC_STREAMON`.
    fn stream_on(&mut self, buffer_type: BufferType) -> io::Result<()>;

    /// `VIDIOC_STREAMOFF`.
    fn stream_off(&mut self, buffer_type: BufferType) -> io::Result<()>;
}
