//! Bounds-only probing of encoded bytes.

use std::io::Cursor;

use image::ImageReader;

use super::{DecodeError, ImageFormat, ProbeInfo};
use crate::transform::OrientationCorrector;

/// Read dimensions, container format and EXIF orientation without decoding pixels.
///
/// # Errors
///
/// Returns `DecodeError::Probe` if the format is not recognized or the header
/// does not yield non-zero dimensions.
pub fn probe(bytes: &[u8]) -> Result<ProbeInfo, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let format = reader
        .format()
        .map(ImageFormat::from)
        .ok_or_else(|| DecodeError::Probe("Unrecognized image format".to_string()))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| DecodeError::Probe(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(DecodeError::Probe(format!(
            "Invalid image dimensions {width}x{height}"
        )));
    }

    let orientation = OrientationCorrector::read(bytes);
    Ok(ProbeInfo::new(width, height, format).with_orientation(orientation))
}
