//! Core types for the decode pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::native::NativeFault;
use crate::config::MaxSize;
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};
use crate::transform::CorrectOrientationError;

/// Taxonomy of decode failures, independent of the concrete error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The decoder failed for a reason unrelated to buffer reuse, or failed
    /// again after the reuse retry.
    DecodeUnknownException,
    /// The decoder produced no usable pixel buffer.
    DecodeResultBitmapInvalid,
    /// The decoded bitmap is 1px or less on an axis.
    DecodeResultBitmapSizeInvalid,
    /// Orientation correction failed.
    DecodeCorrectOrientationFail,
    /// The byte source could not be opened or read.
    DecodeFileIoException,
    /// The bounds-only probe could not read dimensions or format.
    DecodeUnableReadBoundInformation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DecodeUnknownException => "DECODE_UNKNOWN_EXCEPTION",
            ErrorKind::DecodeResultBitmapInvalid => "DECODE_RESULT_BITMAP_INVALID",
            ErrorKind::DecodeResultBitmapSizeInvalid => "DECODE_RESULT_BITMAP_SIZE_INVALID",
            ErrorKind::DecodeCorrectOrientationFail => "DECODE_CORRECT_ORIENTATION_FAIL",
            ErrorKind::DecodeFileIoException => "DECODE_FILE_IO_EXCEPTION",
            ErrorKind::DecodeUnableReadBoundInformation => "DECODE_UNABLE_READ_BOUND_INFORMATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for decode operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading the byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The probe could not read the image header.
    #[error("Unable to read bound information: {0}")]
    Probe(String),

    /// The decoder failed.
    #[error("Decode failed (retried without reuse: {retried}): {fault}")]
    Unknown {
        #[source]
        fault: NativeFault,
        retried: bool,
    },

    /// The decoder returned nothing usable.
    #[error("Bitmap invalid")]
    BitmapInvalid,

    /// The decoded bitmap is degenerate.
    #[error(
        "Bitmap width or height less than or equal to 1px. imageSize: {image_width}x{image_height}. bitmapSize: {bitmap_width}x{bitmap_height}"
    )]
    BitmapSizeInvalid {
        image_width: u32,
        image_height: u32,
        bitmap_width: u32,
        bitmap_height: u32,
    },

    /// Orientation correction failed; the decoded pixels were discarded.
    #[error("Orientation correction failed: {0}")]
    CorrectOrientation(#[from] CorrectOrientationError),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Io(_) => ErrorKind::DecodeFileIoException,
            DecodeError::Probe(_) => ErrorKind::DecodeUnableReadBoundInformation,
            DecodeError::Unknown { .. } => ErrorKind::DecodeUnknownException,
            DecodeError::BitmapInvalid => ErrorKind::DecodeResultBitmapInvalid,
            DecodeError::BitmapSizeInvalid { .. } => ErrorKind::DecodeResultBitmapSizeInvalid,
            DecodeError::CorrectOrientation(_) => ErrorKind::DecodeCorrectOrientationFail,
        }
    }
}

/// Encoded container format reported by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Unknown,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }
}

impl From<image::ImageFormat> for ImageFormat {
    fn from(format: image::ImageFormat) -> Self {
        match format {
            image::ImageFormat::Jpeg => ImageFormat::Jpeg,
            image::ImageFormat::Png => ImageFormat::Png,
            image::ImageFormat::Gif => ImageFormat::Gif,
            image::ImageFormat::WebP => ImageFormat::WebP,
            image::ImageFormat::Bmp => ImageFormat::Bmp,
            _ => ImageFormat::Unknown,
        }
    }
}

/// Where the encoded bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageFrom {
    Network,
    Disk,
    Asset,
    #[default]
    Memory,
}

impl fmt::Display for ImageFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFrom::Network => "network",
            ImageFrom::Disk => "disk",
            ImageFrom::Asset => "asset",
            ImageFrom::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// EXIF orientation values (1-8).
/// See: https://exiftool.org/TagNames/EXIF.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    /// Normal (no transformation needed).
    #[default]
    Normal = 1,
    /// Horizontal flip.
    FlipHorizontal = 2,
    /// Rotate 180 degrees.
    Rotate180 = 3,
    /// Vertical flip.
    FlipVertical = 4,
    /// Transpose (flip horizontal + rotate 270 CW).
    Transpose = 5,
    /// Rotate 90 degrees clockwise.
    Rotate90CW = 6,
    /// Transverse (flip horizontal + rotate 90 CW).
    Transverse = 7,
    /// Rotate 270 degrees clockwise (90 CCW).
    Rotate270CW = 8,
}

impl Orientation {
    /// Returns true if this orientation swaps width and height dimensions.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90CW
                | Orientation::Transverse
                | Orientation::Rotate270CW
        )
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            1 => Orientation::Normal,
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}

/// Result of a bounds-only probe of the encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Declared width in pixels, as stored (before orientation).
    pub width: u32,
    /// Declared height in pixels, as stored (before orientation).
    pub height: u32,
    pub format: ImageFormat,
    /// Embedded EXIF orientation, `Normal` when absent.
    pub orientation: Orientation,
}

impl ProbeInfo {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            orientation: Orientation::Normal,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// Per-request decode constraints supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeConstraints {
    /// Request identity, used in logs and error events.
    pub key: String,
    /// Target bounds; `None` falls back to the configured display bounds.
    pub max_size: Option<MaxSize>,
    /// Never borrow from the buffer pool for this request.
    pub pool_disabled: bool,
    /// Allow shrinking to fit under a smaller thumbnail bucket.
    pub allow_smaller_thumbnail: bool,
    /// Output layout; `None` uses the configured default.
    pub pixel_format: Option<PixelFormat>,
}

impl DecodeConstraints {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = Some(MaxSize::new(width, height));
        self
    }

    pub fn without_pool(mut self) -> Self {
        self.pool_disabled = true;
        self
    }

    pub fn with_smaller_thumbnail(mut self) -> Self {
        self.allow_smaller_thumbnail = true;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }
}

/// Integer downsample divisor applied while decoding. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleFactor(u32);

impl SampleFactor {
    pub const ONE: SampleFactor = SampleFactor(1);

    /// Clamps to 1 so a zero divisor can never be constructed.
    pub fn new(factor: u32) -> Self {
        SampleFactor(factor.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether decoding at this factor yields fewer pixels than the source.
    pub fn is_downsampled(self) -> bool {
        self.0 > 1
    }

    /// Size of one axis after sampling, rounded up.
    pub fn sample(self, dimension: u32) -> u32 {
        dimension.div_ceil(self.0)
    }

    pub fn sample_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        (self.sample(width), self.sample(height))
    }
}

impl Default for SampleFactor {
    fn default() -> Self {
        SampleFactor::ONE
    }
}

/// A validated, correctly oriented decode result.
#[derive(Debug)]
pub struct DecodedImage {
    buffer: PixelBuffer,
    /// Pixel width after orientation correction.
    pub width: u32,
    /// Pixel height after orientation correction.
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub image_format: ImageFormat,
    /// Declared width of the encoded image, as stored.
    pub original_width: u32,
    /// Declared height of the encoded image, as stored.
    pub original_height: u32,
    /// Orientation that was applied.
    pub orientation: Orientation,
    pub sample_factor: SampleFactor,
    /// Pixels are already downsampled and may feed the transform cache.
    pub processed: bool,
    pub image_from: ImageFrom,
}

impl DecodedImage {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        buffer: PixelBuffer,
        width: u32,
        height: u32,
        probe: &ProbeInfo,
        orientation: Orientation,
        sample_factor: SampleFactor,
        processed: bool,
        image_from: ImageFrom,
    ) -> Self {
        Self {
            pixel_format: buffer.format(),
            buffer,
            width,
            height,
            image_format: probe.format,
            original_width: probe.width,
            original_height: probe.height,
            orientation,
            sample_factor,
            processed,
            image_from,
        }
    }

    /// Pixel bytes in row-major order, exactly `width * height * bpp` long.
    pub fn pixels(&self) -> &[u8] {
        let len = self.pixel_format.byte_count(self.width, self.height);
        &self.buffer.as_slice()[..len]
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Hand the pixel buffer back to the pool once the image is no longer shown.
    pub fn release_into(self, pool: &BufferPool) -> bool {
        pool.release(self.buffer)
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Convert to an `image::RgbaImage` for display or further processing.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        let pixels = self.pixels();
        let rgba: Vec<u8> = match self.pixel_format {
            PixelFormat::Rgba8888 => pixels.to_vec(),
            PixelFormat::Rgb888 => pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            PixelFormat::Rgb565 => pixels
                .chunks_exact(2)
                .flat_map(|p| {
                    let v = u16::from_le_bytes([p[0], p[1]]);
                    let r = ((v >> 11) & 0x1F) as u8;
                    let g = ((v >> 5) & 0x3F) as u8;
                    let b = (v & 0x1F) as u8;
                    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
                })
                .collect(),
            PixelFormat::Alpha8 => pixels.iter().flat_map(|&a| [0, 0, 0, a]).collect(),
        };
        image::RgbaImage::from_raw(self.width, self.height, rgba)
    }
}
