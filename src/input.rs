//! Input enumeration and camera input selection.

use crate::error::{CameraError, Result};
use crate::state::SessionState;
use crate::traits::{InputDescriptor, InputType, VideoDevice};

/// Upper bound on inputs enumerated.
const MAX_INPUTS: u32 = 64;

/// Enumerate every input, stopping at the first index the device rejects.
pub fn enumerate_inputs<D: VideoDevice>(device: &D) -> Vec<InputDescriptor> {
    let mut inputs = Vec::new();
    for index in 0..MAX_INPUTS {
        let Ok(input) = device.enum_input(index) else {
            break;
        };
        tracing::debug!(
            index = input.index,
            name = %input.name,
            kind = %input.kind,
            status = format_args!("{:#x}", input.status),
            "input"
        );
        inputs.push(input);
    }
    inputs
}

/// Select the first camera-type input and confirm the device switched to it.
///
/// Tuners and other inputs are logged but never chosen. On success the
/// index is recorded in `state`.
pub fn select_camera_input<D: VideoDevice>(
    device: &mut D,
    state: &mut SessionState,
) -> Result<InputDescriptor> {
    let input = enumerate_inputs(device)
        .into_iter()
        .find(|input| input.kind == InputType::Camera)
        .ok_or(CameraError::NoCameraInput)?;

    let current = device
        .input()
        .map_err(|err| CameraError::negotiation("VIDIOC_G_INPUT", err))?;

    if current != input.index {
        device
            .set_input(input.index)
            .map_err(|err| CameraError::negotiation("VIDIOC_S_INPUT", err))?;
        let actual = device
            .input()
            .map_err(|err| CameraError::negotiation("VIDIOC_G_INPUT", err))?;
        if actual != input.index {
            return Err(CameraError::InputSelection {
                expected: input.index,
                actual,
            });
        }
    }

    tracing::info!(index = input.index, name = %input.name, "selected camera input");
    state.input = Some(input.index);
    Ok(input)
}
