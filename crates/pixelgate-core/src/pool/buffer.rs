//! Pixel buffers and the layouts they can hold.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory pixel layout of a decoded bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit red, green, blue and alpha (4 bytes per pixel).
    #[default]
    Rgba8888,
    /// 8-bit red, green and blue (3 bytes per pixel).
    Rgb888,
    /// Packed 5-6-5 RGB, little endian (2 bytes per pixel).
    Rgb565,
    /// Alpha channel only (1 byte per pixel).
    Alpha8,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Alpha8 => 1,
        }
    }

    /// Bytes needed to store a `width` x `height` bitmap in this format.
    ///
    /// Saturates at `usize::MAX`, which no buffer can hold.
    #[inline]
    pub fn byte_count(self, width: u32, height: u32) -> usize {
        self.checked_byte_count(width, height).unwrap_or(usize::MAX)
    }

    /// Like [`byte_count`](Self::byte_count), but `None` on overflow.
    #[inline]
    pub fn checked_byte_count(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

/// Stable identity of a pixel buffer across borrow and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful for logging.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A mutable memory region tagged with its pixel layout.
///
/// A buffer is exclusively owned: it is not `Clone`, and moving it into
/// [`BufferPool::release`](super::BufferPool::release) or
/// [`BufferPool::evict`](super::BufferPool::evict) ends the caller's access.
#[derive(Debug)]
pub struct PixelBuffer {
    id: BufferId,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer sized exactly for a `width` x `height` bitmap.
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::with_capacity(format.byte_count(width, height), format)
    }

    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize, format: PixelFormat) -> Self {
        Self {
            id: BufferId::next(),
            format,
            data: vec![0; capacity],
        }
    }

    /// Wrap existing bytes; the capacity is `data.len()`.
    pub fn from_vec(data: Vec<u8>, format: PixelFormat) -> Self {
        Self {
            id: BufferId::next(),
            format,
            data,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Usable size of the buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whether this buffer can receive a `width` x `height` bitmap in `format`.
    ///
    /// Only capacity matters; the current layout tag is rewritten on reuse.
    pub fn fits(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        format
            .checked_byte_count(width, height)
            .is_some_and(|required| self.capacity() >= required)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Retag the buffer for a new layout. The bytes are left as they are.
    pub(crate) fn reconfigure(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Rgba8888.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb888.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Alpha8.bytes_per_pixel(), 1);
    }

    #[test]
    fn test_byte_count() {
        assert_eq!(PixelFormat::Rgba8888.byte_count(400, 300), 480_000);
        assert_eq!(PixelFormat::Rgb565.byte_count(10, 10), 200);
        assert_eq!(PixelFormat::Alpha8.byte_count(0, 10), 0);
    }

    #[test]
    fn test_byte_count_overflow() {
        assert_eq!(
            PixelFormat::Rgba8888.checked_byte_count(0x7FFF_FFFF, 0x7FFF_FFFF),
            None
        );
        assert_eq!(
            PixelFormat::Rgba8888.byte_count(u32::MAX, u32::MAX),
            usize::MAX
        );
        assert_eq!(PixelFormat::Rgb888.checked_byte_count(10, 10), Some(300));
    }

    #[test]
    fn test_allocate_sizes_buffer() {
        let buffer = PixelBuffer::allocate(40, 30, PixelFormat::Rgb888);
        assert_eq!(buffer.capacity(), 40 * 30 * 3);
        assert_eq!(buffer.format(), PixelFormat::Rgb888);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = PixelBuffer::with_capacity(16, PixelFormat::Alpha8);
        let b = PixelBuffer::with_capacity(16, PixelFormat::Alpha8);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_fits() {
        let buffer = PixelBuffer::allocate(100, 100, PixelFormat::Rgba8888);
        assert!(buffer.fits(100, 100, PixelFormat::Rgba8888));
        assert!(buffer.fits(200, 100, PixelFormat::Rgb565));
        assert!(!buffer.fits(101, 100, PixelFormat::Rgba8888));

        // A buffer allocated for a narrow layout still takes a wider one
        // when the bytes are there.
        let narrow = PixelBuffer::allocate(100, 100, PixelFormat::Alpha8);
        assert!(narrow.fits(50, 50, PixelFormat::Rgba8888));
        assert!(!narrow.fits(51, 50, PixelFormat::Rgba8888));

        assert!(!buffer.fits(u32::MAX, u32::MAX, PixelFormat::Rgba8888));
    }

    #[test]
    fn test_reconfigure_keeps_identity() {
        let mut buffer = PixelBuffer::allocate(8, 8, PixelFormat::Rgba8888);
        let id = buffer.id();
        buffer.reconfigure(PixelFormat::Rgb565);
        assert_eq!(buffer.id(), id);
        assert_eq!(buffer.format(), PixelFormat::Rgb565);
        assert_eq!(buffer.capacity(), 8 * 8 * 4);
    }
}
