//! The native decode primitive and its failure classification.
//!
//! The engine treats decoding as a black box behind [`NativeDecoder`]. A
//! decoder reports failures as a [`NativeFailure`] whose [`FaultClass`]
//! says whether the destination buffer it was handed caused the failure,
//! which is the only thing the engine's retry decision depends on.

use std::io::Cursor;

use image::{DynamicImage, ImageReader};
use thiserror::Error;

use super::downsample::{downsample, FilterType};
use super::{ImageFormat, SampleFactor};
use crate::pool::{PixelBuffer, PixelFormat};

/// Why a native decode failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// The supplied destination buffer cannot hold the decoder's output.
    ReuseFault,
    /// Anything else: corrupt data, unsupported codec, I/O.
    Other,
}

/// A classified decoder failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NativeFault {
    pub class: FaultClass,
    pub message: String,
}

impl NativeFault {
    pub fn reuse(message: impl Into<String>) -> Self {
        Self {
            class: FaultClass::ReuseFault,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            class: FaultClass::Other,
            message: message.into(),
        }
    }
}

/// A failed decode call, handing back the destination buffer if one was given.
#[derive(Debug)]
pub struct NativeFailure {
    pub fault: NativeFault,
    pub buffer: Option<PixelBuffer>,
}

impl NativeFailure {
    pub fn new(fault: NativeFault, buffer: Option<PixelBuffer>) -> Self {
        Self { fault, buffer }
    }

    pub fn classify(&self) -> FaultClass {
        self.fault.class
    }
}

/// Parameters of one decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeDecodeParams {
    pub sample_factor: SampleFactor,
    pub pixel_format: PixelFormat,
    /// Container format from the probe, a hint for the decoder.
    pub image_format: ImageFormat,
}

/// Raw decoder output before validation and orientation correction.
#[derive(Debug)]
pub struct Bitmap {
    pub buffer: PixelBuffer,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    pub fn new(buffer: PixelBuffer, width: u32, height: u32) -> Self {
        Self {
            buffer,
            width,
            height,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format()
    }

    /// Bytes the bitmap's pixels occupy.
    pub fn byte_count(&self) -> usize {
        self.format().byte_count(self.width, self.height)
    }

    /// Whether the buffer actually holds the pixels the bitmap claims.
    pub fn is_usable(&self) -> bool {
        let len = self.byte_count();
        len > 0 && self.buffer.capacity() >= len
    }
}

/// Decodes encoded bytes at a sample factor into a pixel buffer.
///
/// When `dest` is `Some`, the decoder must write into it or fail with a
/// [`FaultClass::ReuseFault`] that returns it. `Ok(None)` means the decoder
/// produced no bitmap at all.
pub trait NativeDecoder: Send + Sync {
    fn decode(
        &self,
        bytes: &[u8],
        params: &NativeDecodeParams,
        dest: Option<PixelBuffer>,
    ) -> Result<Option<Bitmap>, NativeFailure>;
}

/// [`NativeDecoder`] backed by the `image` crate.
///
/// The full image is decoded, downsampled by the sample factor and converted
/// to the requested layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder {
    filter: FilterType,
}

impl ImageCrateDecoder {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl NativeDecoder for ImageCrateDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        params: &NativeDecodeParams,
        dest: Option<PixelBuffer>,
    ) -> Result<Option<Bitmap>, NativeFailure> {
        let img = match decode_dynamic(bytes) {
            Ok(img) => img,
            Err(message) => return Err(NativeFailure::new(NativeFault::other(message), dest)),
        };

        let img = downsample(img, params.sample_factor, self.filter);
        let (width, height) = (img.width(), img.height());
        let format = params.pixel_format;

        let mut buffer = match dest {
            Some(buffer) if buffer.fits(width, height, format) => buffer,
            Some(buffer) => {
                let fault = NativeFault::reuse(format!(
                    "destination buffer of {} bytes ({:?}) cannot hold {}x{} {:?}",
                    buffer.capacity(),
                    buffer.format(),
                    width,
                    height,
                    format
                ));
                return Err(NativeFailure::new(fault, Some(buffer)));
            }
            None => PixelBuffer::allocate(width, height, format),
        };

        buffer.reconfigure(format);
        let len = format.byte_count(width, height);
        write_pixels(&img, format, &mut buffer.as_mut_slice()[..len]);

        Ok(Some(Bitmap::new(buffer, width, height)))
    }
}

fn decode_dynamic(bytes: &[u8]) -> Result<DynamicImage, String> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    reader.decode().map_err(|e| e.to_string())
}

/// Convert `img` into `format` and copy it into `out`.
///
/// `out` must be exactly `format.byte_count(width, height)` long.
fn write_pixels(img: &DynamicImage, format: PixelFormat, out: &mut [u8]) {
    match format {
        PixelFormat::Rgba8888 => out.copy_from_slice(img.to_rgba8().as_raw()),
        PixelFormat::Rgb888 => out.copy_from_slice(img.to_rgb8().as_raw()),
        PixelFormat::Alpha8 => {
            let rgba = img.to_rgba8();
            for (dst, px) in out.iter_mut().zip(rgba.pixels()) {
                *dst = px[3];
            }
        }
        PixelFormat::Rgb565 => {
            let rgb = img.to_rgb8();
            for (dst, px) in out.chunks_exact_mut(2).zip(rgb.pixels()) {
                let [r, g, b] = px.0;
                let packed = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                dst.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }
}
