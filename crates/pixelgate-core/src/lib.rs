//! Pixelgate Core - memory-bounded image decoding
//!
//! This crate decodes encoded images into pixel buffers sized for display,
//! reusing buffers through a shared pool so that scrolling through long image
//! lists does not allocate a fresh bitmap per item.

pub mod config;
pub mod decode;
pub mod pool;
pub mod transform;

pub use config::{DecodeConfig, MaxSize, OrientationPolicy, TransformCacheConfig};
pub use decode::{
    probe, ByteSource, DecodeConstraints, DecodeEngine, DecodeError, DecodedImage, ErrorKind,
    FileSource, MemorySource, ProbeInfo, SampleFactor,
};
pub use pool::{BufferPool, PixelBuffer, PixelFormat, PoolStats};
