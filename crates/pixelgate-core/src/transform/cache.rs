//! Transform cache eligibility.
//!
//! Downstream transforms (rounded corners, blur, crops) may reuse a result
//! derived from already downsampled pixels instead of decoding again. Whether
//! that is allowed depends only on the sample factor the decode used.

use crate::config::TransformCacheConfig;
use crate::decode::SampleFactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformCacheManager {
    enabled: bool,
    min_sample_factor: u32,
}

impl TransformCacheManager {
    pub fn new(config: &TransformCacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_sample_factor: config.min_sample_factor.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an image decoded at `factor` may be reused by transforms.
    pub fn can_use_by_sample_factor(&self, factor: SampleFactor) -> bool {
        self.enabled && factor.get() >= self.min_sample_factor
    }
}

impl Default for TransformCacheManager {
    fn default() -> Self {
        Self::new(&TransformCacheConfig::default())
    }
}
