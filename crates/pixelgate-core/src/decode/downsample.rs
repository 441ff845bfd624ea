//! Downsampling of fully decoded images by an integer sample factor.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::SampleFactor;

/// Filter type for downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterType {
    /// Nearest neighbor interpolation (fastest, lowest quality).
    Nearest,
    /// Bilinear interpolation (fast, acceptable quality).
    #[default]
    Bilinear,
    /// Lanczos3 interpolation (slower, highest quality).
    Lanczos3,
}

impl FilterType {
    /// Convert to the image crate's FilterType.
    pub fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Bilinear => image::imageops::FilterType::Triangle,
            FilterType::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Shrink `image` by `factor` on both axes.
///
/// Each output axis is `ceil(src / factor)`, so a factor never produces an
/// empty image. Factor 1 returns the input untouched.
pub fn downsample(image: DynamicImage, factor: SampleFactor, filter: FilterType) -> DynamicImage {
    if !factor.is_downsampled() {
        return image;
    }

    let (width, height) = factor.sample_dimensions(image.width(), image.height());
    if width == image.width() && height == image.height() {
        return image;
    }

    image.resize_exact(width, height, filter.to_image_filter())
}
