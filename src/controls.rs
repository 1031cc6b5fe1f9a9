//! Control enumeration and value access.
//!
//! Controls of the user class go through `VIDIOC_G_CTRL`/`VIDIOC_S_CTRL`;
//! every other class goes through the extended-control ioctls, where a
//! write is validated with `VIDIOC_TRY_EXT_CTRLS` before it is committed.
//! Callers see one get/set contract either way.

use std::fmt;
use std::io;

use crate::error::{CameraError, Result};
use crate::state::SessionState;
use crate::sys::V4L2_CTRL_FLAG_NEXT_CTRL;
use crate::traits::{ControlFlags, ControlId, ControlInfo, ControlType, VideoDevice};

/// `V4L2_CTRL_CLASS_USER`.
pub const USER_CLASS: u32 = 0x0098_0000;

/// `V4L2_CID_BRIGHTNESS`.
pub const BRIGHTNESS: ControlId = ControlId(0x0098_0900);

/// Guard against drivers whose `NEXT_CTRL` walk never terminates.
const MAX_CONTROLS: usize = 1024;

/// Label of a menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuLabel {
    /// Entry of a `Menu` control.
    Name(String),
    /// Entry of an `IntegerMenu` control.
    Value(i64),
}

impl fmt::Display for MenuLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// One valid entry of a menu control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Value to write to select this entry.
    pub index: u32,
    /// What the entry means.
    pub label: MenuLabel,
}

/// Everything known about one control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
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
    /// Current value as last read or written.
    pub value: i32,
    /// Control flags.
    pub flags: ControlFlags,
    /// Menu entries in index order, empty for non-menu controls.
    pub menu: Vec<MenuEntry>,
}

impl ControlDescriptor {
    fn from_info(info: ControlInfo, value: i32, menu: Vec<MenuEntry>) -> Self {
        Self {
            id: info.id,
            name: info.name,
            kind: info.kind,
            minimum: info.minimum,
            maximum: info.maximum,
            step: info.step,
            default: info.default,
            value,
            flags: info.flags,
            menu,
        }
    }

    /// Whether writes are refused outright.
    pub const fn is_writable(&self) -> bool {
        !self
            .flags
            .intersects(ControlFlags::READ_ONLY.union(ControlFlags::DISABLED))
    }

    /// Number of steps between `minimum` and `maximum`, and the step.
    fn grid(&self) -> (i64, i64) {
        let step = i64::from(self.step.max(1));
        let span = (i64::from(self.maximum) - i64::from(self.minimum)).max(0);
        (span / step, step)
    }

    fn at_step(&self, k: i64) -> i32 {
        let (k_max, step) = self.grid();
        let value = i64::from(self.minimum) + k.clamp(0, k_max) * step;
        i32::try_from(value).unwrap_or(self.minimum)
    }

    /// Clamp `value` into range and round it to the nearest
    /// `minimum + k * step`.
    pub fn normalize(&self, value: i32) -> i32 {
        let (_, step) = self.grid();
        let offset = i64::from(value) - i64::from(self.minimum);
        let k = if offset <= 0 { 0 } else { (offset + step / 2) / step };
        self.at_step(k)
    }

    /// Value at fraction `percent` (0.0 to 1.0) of the range, on the step
    /// grid. Out-of-range fractions are clamped.
    pub fn value_at_percent(&self, percent: f64) -> i32 {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 1.0)
        };
        let (_, step) = self.grid();
        #[allow(clippy::cast_precision_loss)]
        let span = (i64::from(self.maximum) - i64::from(self.minimum)).max(0) as f64;
        // Rounding may land one step past the grid; at_step clamps it back.
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let k = (percent * span / step as f64).round() as i64;
        self.at_step(k)
    }
}

/// How a control is reached, decided by its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlAccess {
    Legacy,
    Extended,
}

impl ControlAccess {
    const fn of(id: ControlId) -> Self {
        if id.class() == USER_CLASS {
            Self::Legacy
        } else {
            Self::Extended
        }
    }

    fn read<D: VideoDevice>(self, device: &D, id: ControlId) -> io::Result<i32> {
        match self {
            Self::Legacy => device.control(id),
            Self::Extended => device.ext_control(id),
        }
    }

    fn write<D: VideoDevice>(self, device: &mut D, id: ControlId, value: i32) -> io::Result<()> {
        match self {
            Self::Legacy => device.set_control(id, value),
            Self::Extended => {
                device.try_ext_control(id, value)?;
                device.set_ext_control(id, value)
            }
        }
    }
}

/// The device's controls, as enumerated during negotiation.
#[derive(Debug, Clone, Default)]
pub struct ControlRegistry {
    controls: Vec<ControlDescriptor>,
}

impl ControlRegistry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            controls: Vec::new(),
        }
    }

    /// Walk every control with `V4L2_CTRL_FLAG_NEXT_CTRL`.
    ///
    /// Class headers are skipped. Values that cannot be read fall back to
    /// the default, and menu indices the driver rejects are left out.
    pub fn enumerate<D: VideoDevice>(device: &D) -> Vec<ControlDescriptor> {
        let mut controls = Vec::new();
        let mut last: Option<u32> = None;

        while controls.len() < MAX_CONTROLS {
            let query = last.unwrap_or(0) | V4L2_CTRL_FLAG_NEXT_CTRL;
            let Ok(info) = device.query_control(query) else {
                break;
            };
            if last.is_some_and(|previous| info.id.0 <= previous) {
                tracing::warn!(id = %info.id, "driver repeated a control id, stopping enumeration");
                break;
            }
            last = Some(info.id.0);

            if info.kind == ControlType::CtrlClass {
                tracing::debug!(name = %info.name, "control class");
                continue;
            }

            let value = if info.kind.has_value() && !info.flags.contains(ControlFlags::WRITE_ONLY) {
                ControlAccess::of(info.id)
                    .read(device, info.id)
                    .unwrap_or_else(|err| {
                        tracing::debug!(id = %info.id, %err, "control unreadable, using default");
                        info.default
                    })
            } else {
                info.default
            };

            let menu = if info.kind.has_menu() {
                enumerate_menu(device, &info)
            } else {
                Vec::new()
            };

            controls.push(ControlDescriptor::from_info(info, value, menu));
        }

        controls
    }

    /// Re-enumerate the device's controls and record the brightness control
    /// in `state`.
    pub fn refresh<D: VideoDevice>(&mut self, device: &D, state: &mut SessionState) {
        self.controls = Self::enumerate(device);
        state.brightness = self.brightness();

        tracing::info!(
            count = self.controls.len(),
            brightness = state.brightness.is_some(),
            "controls enumerated"
        );
    }

    /// Every control, in enumeration order.
    pub fn descriptors(&self) -> &[ControlDescriptor] {
        &self.controls
    }

    /// Look up a control.
    pub fn descriptor(&self, id: ControlId) -> Option<&ControlDescriptor> {
        self.controls.iter().find(|control| control.id == id)
    }

    /// The brightness control, if the device has one.
    pub fn brightness(&self) -> Option<ControlId> {
        self.descriptor(BRIGHTNESS).map(|control| control.id)
    }

    /// Read a control's current value from the device.
    pub fn get<D: VideoDevice>(&self, device: &D, id: ControlId) -> Result<i32> {
        ControlAccess::of(id)
            .read(device, id)
            .map_err(|source| CameraError::ControlQuery { id, source })
    }

    /// Write a control. Known controls are clamped and rounded to their
    /// step first; the value actually written is returned.
    pub fn set<D: VideoDevice>(&mut self, device: &mut D, id: ControlId, value: i32) -> Result<i32> {
        let applied = match self.descriptor(id) {
            Some(control) if !control.is_writable() => {
                return Err(CameraError::ControlNotWritable(id));
            }
            Some(control) => control.normalize(value),
            None => value,
        };

        ControlAccess::of(id)
            .write(device, id, applied)
            .map_err(|source| CameraError::ControlSet { id, source })?;

        if let Some(control) = self.controls.iter_mut().find(|control| control.id == id) {
            control.value = applied;
        }
        tracing::debug!(%id, requested = value, applied, "control set");
        Ok(applied)
    }

    /// Write a control to fraction `percent` (0.0 to 1.0) of its range.
    pub fn set_by_percent<D: VideoDevice>(
        &mut self,
        device: &mut D,
        id: ControlId,
        percent: f64,
    ) -> Result<i32> {
        let value = self
            .descriptor(id)
            .ok_or(CameraError::UnknownControl(id))?
            .value_at_percent(percent);
        self.set(device, id, value)
    }

    /// Log every control at info level.
    pub fn log_controls(&self) {
        for control in &self.controls {
            tracing::info!(
                id = %control.id,
                name = %control.name,
                kind = %control.kind,
                min = control.minimum,
                max = control.maximum,
                step = control.step,
                default = control.default,
                value = control.value,
                flags = format_args!("{:#x}", control.flags.bits()),
                "control"
            );
            for entry in &control.menu {
                tracing::info!(id = %control.id, index = entry.index, label = %entry.label, "menu entry");
            }
        }
    }
}

fn enumerate_menu<D: VideoDevice>(device: &D, info: &ControlInfo) -> Vec<MenuEntry> {
    let (Ok(first), Ok(last)) = (u32::try_from(info.minimum), u32::try_from(info.maximum)) else {
        return Vec::new();
    };
    let step = usize::try_from(info.step.max(1)).unwrap_or(1);

    (first..=last)
        .step_by(step)
        .filter_map(|index| match device.query_menu(info.id, index) {
            Ok(item) => Some(MenuEntry {
                index,
                label: if info.kind == ControlType::IntegerMenu {
                    MenuLabel::Value(item.value)
                } else {
                    MenuLabel::Name(item.name)
                },
            }),
            Err(err) => {
                tracing::debug!(id = %info.id, index, %err, "menu index skipped");
                None
            }
        })
        .collect()
}
