//! Decode configuration.
//!
//! [`DecodeConfig`] carries the data half of the pipeline configuration. The
//! behavioural collaborators (error sink, memory diagnostics, native decoder)
//! are injected through [`DecodeEngine::builder`](crate::decode::DecodeEngine::builder).

use serde::{Deserialize, Serialize};

use crate::decode::{DecodeConstraints, ThumbnailPolicy};
use crate::pool::{PixelFormat, DEFAULT_POOL_MAX_BYTES};

/// Maximum decoded size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxSize {
    pub width: u32,
    pub height: u32,
}

impl MaxSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Whether embedded EXIF orientation is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrientationPolicy {
    /// Rotate/flip decoded pixels to match the EXIF tag.
    #[default]
    Correct,
    /// Treat every image as upright.
    Ignore,
}

/// Settings for the transform cache collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformCacheConfig {
    pub enabled: bool,
    /// Smallest sample factor whose output downstream transforms may reuse.
    pub min_sample_factor: u32,
}

impl Default for TransformCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_sample_factor: 2,
        }
    }
}

/// Pipeline-wide decode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Master switch for bitmap reuse.
    pub bitmap_pool_enabled: bool,
    /// Byte budget of the shared buffer pool.
    pub pool_max_bytes: usize,
    /// Bounds applied when a request has no max size of its own.
    pub display_bounds: Option<MaxSize>,
    pub orientation: OrientationPolicy,
    pub thumbnail_policy: ThumbnailPolicy,
    pub transform_cache: TransformCacheConfig,
    /// Output layout used when a request does not pick one.
    pub pixel_format: PixelFormat,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            bitmap_pool_enabled: true,
            pool_max_bytes: DEFAULT_POOL_MAX_BYTES,
            display_bounds: None,
            orientation: OrientationPolicy::default(),
            thumbnail_policy: ThumbnailPolicy::default(),
            transform_cache: TransformCacheConfig::default(),
            pixel_format: PixelFormat::default(),
        }
    }
}

impl DecodeConfig {
    /// Max size for a request: its own, else the display bounds, else unset.
    pub fn resolve_max_size(&self, constraints: &DecodeConstraints) -> Option<MaxSize> {
        constraints.max_size.or(self.display_bounds)
    }

    /// Whether a request may borrow from the pool.
    pub fn pool_enabled_for(&self, constraints: &DecodeConstraints) -> bool {
        self.bitmap_pool_enabled && !constraints.pool_disabled
    }

    /// Output layout for a request.
    pub fn resolve_pixel_format(&self, constraints: &DecodeConstraints) -> PixelFormat {
        constraints.pixel_format.unwrap_or(self.pixel_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecodeConfig::default();
        assert!(config.bitmap_pool_enabled);
        assert_eq!(config.pool_max_bytes, DEFAULT_POOL_MAX_BYTES);
        assert_eq!(config.orientation, OrientationPolicy::Correct);
        assert_eq!(config.pixel_format, PixelFormat::Rgba8888);
        assert!(config.transform_cache.enabled);
        assert_eq!(config.transform_cache.min_sample_factor, 2);
    }

    #[test]
    fn test_request_max_size_wins() {
        let mut config = DecodeConfig::default();
        config.display_bounds = Some(MaxSize::new(1080, 1920));

        let constraints = DecodeConstraints::new("a").with_max_size(400, 300);
        assert_eq!(
            config.resolve_max_size(&constraints),
            Some(MaxSize::new(400, 300))
        );
    }

    #[test]
    fn test_unset_max_size_uses_display_bounds() {
        let mut config = DecodeConfig::default();
        let constraints = DecodeConstraints::new("a");
        assert_eq!(config.resolve_max_size(&constraints), None);

        config.display_bounds = Some(MaxSize::new(1080, 1920));
        assert_eq!(
            config.resolve_max_size(&constraints),
            Some(MaxSize::new(1080, 1920))
        );
    }

    #[test]
    fn test_pool_switches() {
        let mut config = DecodeConfig::default();
        let enabled = DecodeConstraints::new("a");
        let disabled = DecodeConstraints::new("a").without_pool();

        assert!(config.pool_enabled_for(&enabled));
        assert!(!config.pool_enabled_for(&disabled));

        config.bitmap_pool_enabled = false;
        assert!(!config.pool_enabled_for(&enabled));
    }

    #[test]
    fn test_pixel_format_resolution() {
        let config = DecodeConfig::default();
        let plain = DecodeConstraints::new("a");
        let low = DecodeConstraints::new("a").with_pixel_format(PixelFormat::Rgb565);

        assert_eq!(config.resolve_pixel_format(&plain), PixelFormat::Rgba8888);
        assert_eq!(config.resolve_pixel_format(&low), PixelFormat::Rgb565);
    }
}
