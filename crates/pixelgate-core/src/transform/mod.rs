//! Post-decode pixel transforms.
//!
//! - EXIF orientation correction, applied to every decoded bitmap unless the
//!   config ignores orientation
//! - The transform-cache eligibility check that marks downsampled results as
//!   `processed`

mod cache;
mod orientation;

pub use cache::TransformCacheManager;
pub use orientation::{CorrectOrientationError, OrientationCorrector};
