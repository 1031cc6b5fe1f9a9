//! Thin layer over the `videodev2.h` bindings shipped with `v4l`.
//!
//! The structs and request numbers come from `v4l::v4l_sys` and
//! `v4l::v4l2::vidioc`. What lives here is the EINTR retry around the raw
//! ioctl, zero-initialisation, and the union reads the device needs.

#![allow(unsafe_code)]

use std::io;
use std::ptr;

use libc::c_int;
use v4l::v4l2;
use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_captureparm, v4l2_control, v4l2_ext_control,
    v4l2_ext_controls, v4l2_fmtdesc, v4l2_format, v4l2_input, v4l2_pix_format, v4l2_querymenu,
    v4l2_queryctrl, v4l2_requestbuffers, v4l2_standard, v4l2_streamparm,
};

pub use v4l::v4l2::vidioc;
pub use v4l::v4l_sys::{V4L2_CAP_DEVICE_CAPS, V4L2_CTRL_FLAG_NEXT_CTRL};

/// `v4l2_memory` value for memory-mapped buffers.
pub const V4L2_MEMORY_MMAP: u32 = v4l::memory::Memory::Mmap as u32;

/// Kernel ABI types for which the all-zero bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must be plain C data: integers, arrays, unions of those and
/// raw pointers.
pub unsafe trait Plain: Copy {}

unsafe impl Plain for c_int {}
unsafe impl Plain for v4l2_buffer {}
unsafe impl Plain for v4l2_capability {}
unsafe impl Plain for v4l2_control {}
unsafe impl Plain for v4l2_ext_control {}
unsafe impl Plain for v4l2_ext_controls {}
unsafe impl Plain for v4l2_fmtdesc {}
unsafe impl Plain for v4l2_format {}
unsafe impl Plain for v4l2_input {}
unsafe impl Plain for v4l2_pix_format {}
unsafe impl Plain for v4l2_querymenu {}
unsafe impl Plain for v4l2_queryctrl {}
unsafe impl Plain for v4l2_requestbuffers {}
unsafe impl Plain for v4l2_standard {}
unsafe impl Plain for v4l2_streamparm {}

/// An all-zero value, the starting point of every ioctl argument.
pub fn zeroed<T: Plain>() -> T {
    // SAFETY: `Plain` types accept the all-zero bit pattern.
    unsafe { std::mem::zeroed() }
}

/// Issue an ioctl, retrying while it is interrupted by a signal.
///
/// The caller pairs `request` with the argument type it was encoded for.
pub fn xioctl<T: Plain>(fd: c_int, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` is a live, exclusively borrowed kernel ABI value that
        // outlives the call.
        match unsafe { v4l2::ioctl(fd, request, ptr::from_mut(arg).cast()) } {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}

/// Decode a fixed-size, NUL-padded kernel string.
pub fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or(bytes)).into_owned()
}

/// The single-planar member of a format.
pub fn pix(format: &v4l2_format) -> v4l2_pix_format {
    // SAFETY: the format was zero-initialised and `pix` is plain u32s.
    unsafe { format.fmt.pix }
}

/// The capture member of stream parameters.
pub fn capture(params: &v4l2_streamparm) -> v4l2_captureparm {
    // SAFETY: as for `pix`, every bit pattern is a valid `v4l2_captureparm`.
    unsafe { params.parm.capture }
}

/// The mmap offset of a buffer.
pub fn mmap_offset(buffer: &v4l2_buffer) -> u32 {
    // SAFETY: MMAP buffers report their offset here; the union started zeroed.
    unsafe { buffer.m.offset }
}

/// An extended control carrying a 32-bit value.
pub fn ext_control(id: u32, value: i32) -> v4l2_ext_control {
    let mut control = v4l2_ext_control { id, ..zeroed() };
    control.__bindgen_anon_1.value = value;
    control
}

/// The 32-bit value of an extended control.
pub fn ext_value(control: &v4l2_ext_control) -> i32 {
    let value = control.__bindgen_anon_1;
    // SAFETY: `value` shares storage with the zero-initialised `value64`.
    unsafe { value.value }
}

/// A container for exactly one control. The pointer must stay valid for
/// the duration of the ioctl.
pub fn single_control(class: u32, control: &mut v4l2_ext_control) -> v4l2_ext_controls {
    let mut controls = v4l2_ext_controls {
        count: 1,
        controls: control,
        ..zeroed()
    };
    controls.__bindgen_anon_1.which = class;
    controls
}

/// Label of a menu entry.
pub fn menu_name(item: &v4l2_querymenu) -> String {
    let union = item.__bindgen_anon_1;
    // SAFETY: `name` is a byte array; any bit pattern is valid.
    cstr(&unsafe { union.name })
}

/// Value of an integer-menu entry, overlapping the label bytes.
pub fn menu_value(item: &v4l2_querymenu) -> i64 {
    let union = item.__bindgen_anon_1;
    // SAFETY: `value` is a plain i64 overlapping the label.
    unsafe { union.value }
}
