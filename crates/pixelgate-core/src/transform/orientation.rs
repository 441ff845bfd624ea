//! EXIF orientation handling.
//!
//! Orientation is read from the encoded bytes before decoding, used to swap
//! the probed size so that sizing works on the on-screen aspect, and finally
//! applied to the decoded pixels.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::{imageops, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use thiserror::Error;

use crate::config::OrientationPolicy;
use crate::decode::{Bitmap, Orientation, ProbeInfo};
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};

/// Errors raised while applying orientation to decoded pixels.
#[derive(Debug, Error)]
pub enum CorrectOrientationError {
    /// The pixel layout cannot be rotated channel-wise.
    #[error("Cannot apply {orientation:?} to {format:?} pixels")]
    UnsupportedLayout {
        format: PixelFormat,
        orientation: Orientation,
    },

    /// The buffer does not hold the pixels the bitmap claims.
    #[error("Pixel buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
}

/// Reads and applies EXIF orientation according to the configured policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrientationCorrector {
    policy: OrientationPolicy,
}

impl OrientationCorrector {
    pub fn new(policy: OrientationPolicy) -> Self {
        Self { policy }
    }

    /// Extract EXIF orientation from encoded bytes.
    ///
    /// Returns `Orientation::Normal` if no EXIF data is found or orientation
    /// cannot be determined.
    pub fn read(bytes: &[u8]) -> Orientation {
        let exif_reader = Reader::new();
        let mut cursor = Cursor::new(bytes);

        match exif_reader.read_from_container(&mut cursor) {
            Ok(exif) => exif
                .get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
                .map(Orientation::from)
                .unwrap_or_default(),
            Err(_) => Orientation::Normal,
        }
    }

    /// The orientation that will actually be applied for `tag`.
    pub fn effective(&self, tag: Orientation) -> Orientation {
        match self.policy {
            OrientationPolicy::Correct => tag,
            OrientationPolicy::Ignore => Orientation::Normal,
        }
    }

    /// Swap the probed width and height when `orientation` rotates by 90/270.
    pub fn adjust_probed_size(&self, probe: &mut ProbeInfo, orientation: Orientation) {
        if self.effective(orientation).swaps_dimensions() {
            std::mem::swap(&mut probe.width, &mut probe.height);
        }
    }

    /// Rotate/flip the decoded bitmap to match `orientation`.
    ///
    /// The corrected pixels are written into a second buffer, borrowed from
    /// `pool` when given, and the original buffer is then released to it.
    /// On error the bitmap is left untouched and no buffer changes hands.
    /// Must be called once per decode: the tag describes the stored pixels,
    /// not already corrected ones.
    pub fn apply_to_decoded(
        &self,
        bitmap: &mut Bitmap,
        orientation: Orientation,
        pool: Option<&BufferPool>,
    ) -> Result<(), CorrectOrientationError> {
        let orientation = self.effective(orientation);
        if orientation == Orientation::Normal {
            return Ok(());
        }

        let format = bitmap.format();
        let expected = bitmap.byte_count();
        let src = bitmap
            .buffer
            .as_slice()
            .get(..expected)
            .ok_or(CorrectOrientationError::BufferTooSmall {
                expected,
                actual: bitmap.buffer.capacity(),
            })?;

        let (width, height) = (bitmap.width, bitmap.height);
        let oriented = match format {
            PixelFormat::Rgba8888 => reorient::<Rgba<u8>>(src, width, height, orientation),
            PixelFormat::Rgb888 => reorient::<Rgb<u8>>(src, width, height, orientation),
            PixelFormat::Alpha8 => reorient::<Luma<u8>>(src, width, height, orientation),
            PixelFormat::Rgb565 => {
                return Err(CorrectOrientationError::UnsupportedLayout {
                    format,
                    orientation,
                })
            }
        }
        .ok_or(CorrectOrientationError::BufferTooSmall {
            expected,
            actual: src.len(),
        })?;

        let (out_width, out_height) = if orientation.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        };

        let mut dest = pool
            .and_then(|p| p.try_borrow(out_width, out_height, format))
            .unwrap_or_else(|| PixelBuffer::allocate(out_width, out_height, format));
        dest.as_mut_slice()[..expected].copy_from_slice(&oriented);

        let original = std::mem::replace(&mut bitmap.buffer, dest);
        bitmap.width = out_width;
        bitmap.height = out_height;
        if let Some(pool) = pool {
            pool.release(original);
        }
        Ok(())
    }
}

/// Apply EXIF orientation to a packed pixel slice.
fn reorient<P>(src: &[u8], width: u32, height: u32, orientation: Orientation) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let view: ImageBuffer<P, &[u8]> = ImageBuffer::from_raw(width, height, src)?;
    let out = match orientation {
        Orientation::Normal => return Some(src.to_vec()),
        Orientation::FlipHorizontal => imageops::flip_horizontal(&view),
        Orientation::Rotate180 => imageops::rotate180(&view),
        Orientation::FlipVertical => imageops::flip_vertical(&view),
        Orientation::Transpose => {
            let mut out = imageops::rotate90(&view);
            imageops::flip_horizontal_in_place(&mut out);
            out
        }
        Orientation::Rotate90CW => imageops::rotate90(&view),
        Orientation::Transverse => {
            let mut out = imageops::rotate270(&view);
            imageops::flip_horizontal_in_place(&mut out);
            out
        }
        Orientation::Rotate270CW => imageops::rotate270(&view),
    };
    Some(out.into_raw())
}
