//! Sample factor computation.
//!
//! The factor is the smallest power of two that brings both axes within the
//! requested bounds. When a request allows smaller thumbnails and the policy
//! is [`ThumbnailPolicy::Bucketed`], the factor may grow further so that the
//! longer edge comes out at most a common thumbnail size. The output is not
//! necessarily equal to that size: `ceil(long / bucket)` usually lands below it.

use serde::{Deserialize, Serialize};

use super::SampleFactor;
use crate::config::MaxSize;

/// Common longer-edge sizes of list thumbnails.
pub const DEFAULT_THUMBNAIL_BUCKETS: [u32; 8] = [96, 128, 192, 256, 384, 512, 768, 1024];

/// How far a "smaller thumbnail allowed" request may shrink past an exact fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbnailPolicy {
    /// Always use the exact power-of-two fit.
    ExactFit,
    /// Shrink until the longer edge is at most the largest bucket not above
    /// the exact fit, as long as that at most doubles the sample factor.
    Bucketed { buckets: Vec<u32> },
}

impl Default for ThumbnailPolicy {
    fn default() -> Self {
        ThumbnailPolicy::Bucketed {
            buckets: DEFAULT_THUMBNAIL_BUCKETS.to_vec(),
        }
    }
}

/// Computes sample factors from source size and target bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeCalculator {
    policy: ThumbnailPolicy,
}

impl SizeCalculator {
    pub fn new(policy: ThumbnailPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ThumbnailPolicy {
        &self.policy
    }

    /// Sample factor for decoding a `src_width` x `src_height` image into `max`.
    ///
    /// Source dimensions must already reflect orientation. A zero bound on
    /// one axis leaves that axis unconstrained; no bounds at all, or a source
    /// that already fits, yields factor 1. Images are never upsampled.
    pub fn compute_sample_factor(
        &self,
        src_width: u32,
        src_height: u32,
        max: Option<MaxSize>,
        allow_smaller_thumbnail: bool,
    ) -> SampleFactor {
        let Some(max) = max else {
            return SampleFactor::ONE;
        };
        if src_width == 0 || src_height == 0 || (max.width == 0 && max.height == 0) {
            return SampleFactor::ONE;
        }

        let exact = exact_fit_factor(src_width, src_height, max);

        match &self.policy {
            ThumbnailPolicy::Bucketed { buckets } if allow_smaller_thumbnail => {
                fit_under_bucket(src_width, src_height, exact, buckets)
            }
            _ => exact,
        }
    }
}

/// Smallest power of two with `ceil(src / f) <= max` on every bounded axis.
fn exact_fit_factor(src_width: u32, src_height: u32, max: MaxSize) -> SampleFactor {
    let exceeds = |src: u32, bound: u32, factor: u64| {
        bound > 0 && (src as u64).div_ceil(factor) > bound as u64
    };

    let mut factor: u64 = 1;
    while exceeds(src_width, max.width, factor) || exceeds(src_height, max.height, factor) {
        factor *= 2;
    }
    SampleFactor::new(u32::try_from(factor).unwrap_or(u32::MAX))
}

/// Smallest factor whose longer edge is at most the chosen bucket.
fn fit_under_bucket(src_width: u32, src_height: u32, exact: SampleFactor, buckets: &[u32]) -> SampleFactor {
    let long_src = src_width.max(src_height);
    let long_out = exact.sample(long_src);

    let Some(bucket) = buckets
        .iter()
        .copied()
        .filter(|&b| b > 0 && b <= long_out)
        .max()
    else {
        return exact;
    };

    let shrunk = long_src.div_ceil(bucket);
    if shrunk > exact.get().saturating_mul(2) {
        return exact;
    }
    SampleFactor::new(shrunk.max(exact.get()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> SizeCalculator {
        SizeCalculator::new(ThumbnailPolicy::ExactFit)
    }

    fn bounds(width: u32, height: u32) -> Option<MaxSize> {
        Some(MaxSize::new(width, height))
    }

    #[test]
    fn test_unset_bounds_is_one() {
        assert_eq!(
            exact().compute_sample_factor(4000, 3000, None, false),
            SampleFactor::ONE
        );
        assert_eq!(
            exact().compute_sample_factor(4000, 3000, bounds(0, 0), false),
            SampleFactor::ONE
        );
    }

    #[test]
    fn test_source_smaller_than_bounds_never_upsamples() {
        assert_eq!(
            exact().compute_sample_factor(100, 50, bounds(400, 300), false),
            SampleFactor::ONE
        );
    }

    #[test]
    fn test_exact_half() {
        let factor = exact().compute_sample_factor(800, 600, bounds(400, 300), false);
        assert_eq!(factor.get(), 2);
        assert_eq!(factor.sample_dimensions(800, 600), (400, 300));
    }

    #[test]
    fn test_limiting_axis_drives_factor() {
        // Width fits at 2, height needs 4.
        let factor = exact().compute_sample_factor(1000, 2000, bounds(600, 500), false);
        assert_eq!(factor.get(), 4);
    }

    #[test]
    fn test_rounding_up_requires_next_power() {
        // ceil(801 / 2) = 401 > 400
        let factor = exact().compute_sample_factor(801, 600, bounds(400, 300), false);
        assert_eq!(factor.get(), 4);
    }

    #[test]
    fn test_single_axis_bound() {
        let factor = exact().compute_sample_factor(4000, 100, bounds(500, 0), false);
        assert_eq!(factor.get(), 8);
    }

    #[test]
    fn test_huge_source_terminates() {
        let factor = exact().compute_sample_factor(u32::MAX, u32::MAX, bounds(1, 1), false);
        assert!(factor.get() >= 1 << 31);
    }

    #[test]
    fn test_exact_fit_ignores_smaller_thumbnail_flag() {
        let a = exact().compute_sample_factor(1600, 1200, bounds(500, 500), true);
        let b = exact().compute_sample_factor(1600, 1200, bounds(500, 500), false);
        assert_eq!(a, b);
        assert_eq!(a.get(), 4);
    }

    #[test]
    fn test_bucketed_fits_under_bucket() {
        let calc = SizeCalculator::default();
        // Exact fit is 4 (400x300); 384 is the bucket below, ceil(1600/384) = 5
        // gives 320, under the bucket rather than on it.
        let factor = calc.compute_sample_factor(1600, 1200, bounds(500, 500), true);
        assert_eq!(factor.get(), 5);
        assert_eq!(factor.sample_dimensions(1600, 1200), (320, 240));
    }

    #[test]
    fn test_bucketed_requires_flag() {
        let calc = SizeCalculator::default();
        let factor = calc.compute_sample_factor(1600, 1200, bounds(500, 500), false);
        assert_eq!(factor.get(), 4);
    }

    #[test]
    fn test_bucketed_on_bucket_is_unchanged() {
        let calc = SizeCalculator::default();
        // Exact fit already lands on 256.
        let factor = calc.compute_sample_factor(1024, 512, bounds(256, 256), true);
        assert_eq!(factor.get(), 4);
    }

    #[test]
    fn test_bucketed_below_smallest_bucket_keeps_exact() {
        let calc = SizeCalculator::new(ThumbnailPolicy::Bucketed {
            buckets: vec![128, 256],
        });
        let factor = calc.compute_sample_factor(200, 100, bounds(100, 100), true);
        assert_eq!(factor.get(), 2);
    }

    #[test]
    fn test_bucketed_never_more_than_doubles() {
        let calc = SizeCalculator::new(ThumbnailPolicy::Bucketed { buckets: vec![10] });
        // Exact fit is 1 (500 long edge), fitting under 10 would need 50.
        let factor = calc.compute_sample_factor(500, 400, bounds(1000, 1000), true);
        assert_eq!(factor.get(), 1);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimensions_strategy() -> impl Strategy<Value = (u32, u32)> {
        (1u32..=20_000, 1u32..=20_000)
    }

    fn bounds_strategy() -> impl Strategy<Value = (u32, u32)> {
        (1u32..=4_000, 1u32..=4_000)
    }

    fn policy_strategy() -> impl Strategy<Value = ThumbnailPolicy> {
        prop_oneof![
            Just(ThumbnailPolicy::ExactFit),
            Just(ThumbnailPolicy::default()),
        ]
    }

    proptest! {
        /// Property: the factor is at least 1 and the sampled size fits.
        #[test]
        fn prop_factor_fits_bounds(
            (src_w, src_h) in dimensions_strategy(),
            (max_w, max_h) in bounds_strategy(),
            policy in policy_strategy(),
            allow_smaller in any::<bool>(),
        ) {
            let calc = SizeCalculator::new(policy);
            let factor = calc.compute_sample_factor(
                src_w, src_h, Some(MaxSize::new(max_w, max_h)), allow_smaller,
            );

            prop_assert!(factor.get() >= 1);
            let (w, h) = factor.sample_dimensions(src_w, src_h);
            prop_assert!(w <= max_w, "width {} exceeds {}", w, max_w);
            prop_assert!(h <= max_h, "height {} exceeds {}", h, max_h);
        }

        /// Property: a source that already fits is never downsampled.
        #[test]
        fn prop_fitting_source_is_factor_one(
            (max_w, max_h) in bounds_strategy(),
            shrink in 1u32..=8,
        ) {
            let src_w = (max_w / shrink).max(1);
            let src_h = (max_h / shrink).max(1);
            let factor = SizeCalculator::new(ThumbnailPolicy::ExactFit)
                .compute_sample_factor(src_w, src_h, Some(MaxSize::new(max_w, max_h)), false);
            prop_assert_eq!(factor, SampleFactor::ONE);
        }

        /// Property: the exact fit is minimal - half of it would not fit.
        #[test]
        fn prop_exact_fit_is_minimal(
            (src_w, src_h) in dimensions_strategy(),
            (max_w, max_h) in bounds_strategy(),
        ) {
            let factor = SizeCalculator::new(ThumbnailPolicy::ExactFit)
                .compute_sample_factor(src_w, src_h, Some(MaxSize::new(max_w, max_h)), false);

            prop_assert!(factor.get().is_power_of_two());
            if factor.get() > 1 {
                let half = SampleFactor::new(factor.get() / 2);
                let (w, h) = half.sample_dimensions(src_w, src_h);
                prop_assert!(w > max_w || h > max_h);
            }
        }
    }
}
