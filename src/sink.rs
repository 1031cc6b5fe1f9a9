//! Writing a frame's luma plane to disk.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, GrayImage, ImageEncoder};

use crate::error::{CameraError, Result};
use crate::stream::Frame;

/// Save the luma plane of `frame` as a greyscale image.
///
/// `.pgm` paths get a binary PGM; any other extension is left to the
/// `image` crate to pick an encoder for.
pub fn save_frame(frame: &Frame<'_>, path: &Path) -> Result<()> {
    let sink_error = |reason: String| CameraError::Sink {
        path: path.to_path_buf(),
        reason,
    };

    let plane = frame
        .luma_plane()
        .ok_or_else(|| sink_error(format!("no luma plane in {}", frame.fourcc)))?;
    let image = GrayImage::from_raw(frame.width, frame.height, plane)
        .ok_or_else(|| sink_error("frame dimensions do not match plane".into()))?;

    let is_pgm = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pgm"));
    if is_pgm {
        let file = File::create(path).map_err(|err| sink_error(err.to_string()))?;
        PnmEncoder::new(BufWriter::new(file))
            .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary))
            .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::L8)
            .map_err(|err| sink_error(err.to_string()))?;
    } else {
        image.save(path).map_err(|err| sink_error(err.to_string()))?;
    }

    tracing::info!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        "frame saved"
    );
    Ok(())
}
