//! Image decoding pipeline for Pixelgate.
//!
//! This module provides:
//! - Header probing without a pixel decode ([`probe`])
//! - Sample factor computation against display bounds ([`SizeCalculator`])
//! - The pluggable decode primitive ([`NativeDecoder`]) and an `image`-crate
//!   implementation
//! - The orchestrator that ties pooling, decoding, validation and
//!   orientation together ([`DecodeEngine`])
//!
//! # Buffer reuse
//!
//! Decoded pixels live in [`PixelBuffer`](crate::pool::PixelBuffer)s that
//! cycle through a shared [`BufferPool`](crate::pool::BufferPool). A decode
//! first tries a pooled buffer; if the decoder rejects it, the buffer is
//! evicted and the decode is retried once with a fresh allocation.
//!
//! # Examples
//!
//! ```ignore
//! use pixelgate_core::config::DecodeConfig;
//! use pixelgate_core::decode::{DecodeConstraints, DecodeEngine, FileSource};
//!
//! let engine = DecodeEngine::new(DecodeConfig::default());
//! let source = FileSource::new("photo.jpg");
//! let image = engine.load(&source, &DecodeConstraints::new("photo").with_max_size(400, 300))?;
//! println!("Decoded {}x{} at 1/{}", image.width, image.height, image.sample_factor.get());
//! image.release_into(engine.pool());
//! ```

mod diagnostics;
mod downsample;
mod engine;
mod native;
mod probe;
mod size;
mod source;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use diagnostics::{
    format_file_size, DecodeFailureEvent, ErrorCallback, MemoryDiagnostics, MemorySnapshot,
    PoolMemory, TracingErrorCallback,
};
pub use downsample::{downsample, FilterType};
pub use engine::{DecodeEngine, DecodeEngineBuilder};
pub use native::{
    Bitmap, FaultClass, ImageCrateDecoder, NativeDecodeParams, NativeDecoder, NativeFailure,
    NativeFault,
};
pub use probe::probe;
pub use size::{SizeCalculator, ThumbnailPolicy, DEFAULT_THUMBNAIL_BUCKETS};
pub use source::{ByteSource, FileSource, MemorySource};
pub use types::{
    DecodeConstraints, DecodeError, DecodedImage, ErrorKind, ImageFormat, ImageFrom, Orientation,
    ProbeInfo, SampleFactor,
};
