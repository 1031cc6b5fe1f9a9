//! Finding a usable camera without being told which node to open.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::stat::{major, stat, SFlag};

use crate::camera::Camera;
use crate::device::V4L2Device;
use crate::format::FormatRequest;

/// Character-device major number of video4linux nodes.
const V4L2_MAJOR: u64 = 81;

/// Stable per-port links, preferred over `/dev/videoN` numbering.
const BY_PATH: &str = "/dev/v4l/by-path";

/// Whether `path` is a video4linux character device.
pub fn is_video_node(path: &Path) -> bool {
    stat(path).is_ok_and(|st| {
        let kind = SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT;
        kind == SFlag::S_IFCHR && major(st.st_rdev) == V4L2_MAJOR
    })
}

/// Candidate nodes, by-path links first. Falls back to every
/// `/dev/videoN` when no link exists.
pub fn candidates() -> Vec<PathBuf> {
    let mut linked: Vec<PathBuf> = fs::read_dir(BY_PATH)
        .map(|dir| {
            dir.filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| is_video_node(path))
                .collect()
        })
        .unwrap_or_default();
    if !linked.is_empty() {
        linked.sort();
        return linked;
    }

    let mut nodes: Vec<PathBuf> = v4l::context::enum_devices()
        .iter()
        .map(|node| node.path().to_path_buf())
        .filter(|path| is_video_node(path))
        .collect();
    nodes.sort();
    nodes
}

/// Open and negotiate each candidate in turn, returning the first camera
/// that negotiates.
pub fn discover(request: &FormatRequest) -> Option<Camera<V4L2Device>> {
    candidates().into_iter().find_map(|path| {
        tracing::info!(path = %path.display(), "possible camera");
        let mut camera = match Camera::open(&path) {
            Ok(camera) => camera.with_format_request(*request),
            Err(err) => {
                tracing::debug!(%err, "skipping");
                return None;
            }
        };
        camera.init().then_some(camera)
    })
}
