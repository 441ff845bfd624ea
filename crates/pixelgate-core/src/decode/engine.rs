//! Decode orchestration.
//!
//! One call runs the whole pipeline on the calling thread:
//!
//! 1. **Sizing** - swap the probed size for 90/270 orientations, then compute
//!    the sample factor against the request bounds.
//! 2. **Reuse attempt** - borrow a compatible buffer from the shared pool
//!    unless pooling is disabled for the request.
//! 3. **Decode** - hand bytes and buffer to the [`NativeDecoder`]. A failure
//!    the decoder classifies as a reuse fault evicts the borrowed buffer and
//!    retries exactly once with a fresh allocation; any other failure is
//!    reported immediately.
//! 4. **Validation** - reject missing/unusable bitmaps and bitmaps 1px or
//!    less on an axis. Rejected buffers are discarded, never pooled.
//! 5. **Orientation** - rotate/flip the pixels. On failure the bitmap is
//!    discarded.
//!
//! Every failure that reaches the caller is also sent to the configured
//! [`ErrorCallback`]. A recovered reuse fault is not.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::diagnostics::format_optional_size;
use super::native::{FaultClass, NativeDecodeParams, NativeFailure};
use super::source::read_all;
use super::{
    probe, Bitmap, ByteSource, DecodeConstraints, DecodeError, DecodeFailureEvent, DecodedImage,
    ErrorCallback, ImageCrateDecoder, ImageFrom, MemoryDiagnostics, NativeDecoder, NativeFault,
    PoolMemory, ProbeInfo, SizeCalculator, TracingErrorCallback,
};
use crate::config::DecodeConfig;
use crate::pool::BufferPool;
use crate::transform::{OrientationCorrector, TransformCacheManager};

/// Builder for [`DecodeEngine`].
pub struct DecodeEngineBuilder {
    config: DecodeConfig,
    pool: Option<Arc<BufferPool>>,
    decoder: Arc<dyn NativeDecoder>,
    error_callback: Arc<dyn ErrorCallback>,
    memory: Option<Arc<dyn MemoryDiagnostics>>,
}

impl DecodeEngineBuilder {
    /// Share an existing pool instead of creating one from the config budget.
    pub fn pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn NativeDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn error_callback(mut self, callback: Arc<dyn ErrorCallback>) -> Self {
        self.error_callback = callback;
        self
    }

    /// Memory figures for failure logs; defaults to [`PoolMemory`].
    pub fn memory_diagnostics(mut self, memory: Arc<dyn MemoryDiagnostics>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> DecodeEngine {
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(BufferPool::new(self.config.pool_max_bytes)));
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(PoolMemory::new(Arc::clone(&pool))));
        DecodeEngine {
            sizes: SizeCalculator::new(self.config.thumbnail_policy.clone()),
            corrector: OrientationCorrector::new(self.config.orientation),
            transform_cache: TransformCacheManager::new(&self.config.transform_cache),
            config: self.config,
            pool,
            decoder: self.decoder,
            error_callback: self.error_callback,
            memory,
        }
    }
}

/// Turns encoded bytes into validated, oriented bitmaps, reusing pooled buffers.
///
/// The engine is `Send + Sync`; decode workers share one instance and with it
/// one [`BufferPool`].
pub struct DecodeEngine {
    config: DecodeConfig,
    pool: Arc<BufferPool>,
    decoder: Arc<dyn NativeDecoder>,
    sizes: SizeCalculator,
    corrector: OrientationCorrector,
    transform_cache: TransformCacheManager,
    error_callback: Arc<dyn ErrorCallback>,
    memory: Arc<dyn MemoryDiagnostics>,
}

impl DecodeEngine {
    /// Engine with default collaborators.
    pub fn new(config: DecodeConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: DecodeConfig) -> DecodeEngineBuilder {
        DecodeEngineBuilder {
            config,
            pool: None,
            decoder: Arc::new(ImageCrateDecoder::default()),
            error_callback: Arc::new(TracingErrorCallback),
            memory: None,
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Probe and decode in one step.
    pub fn load(
        &self,
        source: &dyn ByteSource,
        constraints: &DecodeConstraints,
    ) -> Result<DecodedImage, DecodeError> {
        let bytes = self.read_source(source, constraints)?;
        let info = probe(&bytes).inspect_err(|e| {
            warn!(key = %constraints.key, "Probe failed: {e}");
        })?;
        self.decode_bytes(&bytes, source.image_from(), &info, constraints)
    }

    /// Decode `source` using bounds from an earlier probe.
    pub fn decode(
        &self,
        source: &dyn ByteSource,
        probe: &ProbeInfo,
        constraints: &DecodeConstraints,
    ) -> Result<DecodedImage, DecodeError> {
        let bytes = self.read_source(source, constraints)?;
        self.decode_bytes(&bytes, source.image_from(), probe, constraints)
    }

    fn read_source(
        &self,
        source: &dyn ByteSource,
        constraints: &DecodeConstraints,
    ) -> Result<Vec<u8>, DecodeError> {
        read_all(source).map_err(|e| {
            warn!(key = %constraints.key, from = %source.image_from(), "Unable to read source: {e}");
            DecodeError::Io(e)
        })
    }

    fn decode_bytes(
        &self,
        bytes: &[u8],
        image_from: ImageFrom,
        probe: &ProbeInfo,
        constraints: &DecodeConstraints,
    ) -> Result<DecodedImage, DecodeError> {
        let key = constraints.key.as_str();
        let orientation = self.corrector.effective(probe.orientation);

        let mut bounds = *probe;
        self.corrector.adjust_probed_size(&mut bounds, orientation);
        let sample_factor = self.sizes.compute_sample_factor(
            bounds.width,
            bounds.height,
            self.config.resolve_max_size(constraints),
            constraints.allow_smaller_thumbnail,
        );

        let params = NativeDecodeParams {
            sample_factor,
            pixel_format: self.config.resolve_pixel_format(constraints),
            image_format: probe.format,
        };
        let use_pool = self.config.pool_enabled_for(constraints);

        let bitmap = self.decode_with_reuse(bytes, probe, &params, use_pool, key)?;
        let mut bitmap = self.validate(bitmap, probe, key)?;

        let pool = use_pool.then_some(self.pool.as_ref());
        if let Err(e) = self.corrector.apply_to_decoded(&mut bitmap, orientation, pool) {
            warn!(key, ?orientation, "Orientation correction failed: {e}");
            drop(bitmap);
            return Err(self.report(DecodeError::CorrectOrientation(e), probe, key));
        }

        let processed = self.transform_cache.can_use_by_sample_factor(sample_factor);
        debug!(
            key,
            image_size = %format!("{}x{}", probe.width, probe.height),
            bitmap_size = %format!("{}x{}", bitmap.width, bitmap.height),
            sample_factor = sample_factor.get(),
            from = %image_from,
            processed,
            "Decode success"
        );

        Ok(DecodedImage::new(
            bitmap.buffer,
            bitmap.width,
            bitmap.height,
            probe,
            orientation,
            sample_factor,
            processed,
            image_from,
        ))
    }

    /// Run the decoder, with at most one retry after a reuse fault.
    fn decode_with_reuse(
        &self,
        bytes: &[u8],
        probe: &ProbeInfo,
        params: &NativeDecodeParams,
        use_pool: bool,
        key: &str,
    ) -> Result<Option<Bitmap>, DecodeError> {
        let dest = if use_pool {
            let (width, height) = params.sample_factor.sample_dimensions(probe.width, probe.height);
            self.pool.try_borrow(width, height, params.pixel_format)
        } else {
            None
        };
        let reused = dest.is_some();

        let failure = match self.decoder.decode(bytes, params, dest) {
            Ok(bitmap) => return Ok(bitmap),
            Err(failure) => failure,
        };

        if reused && failure.classify() == FaultClass::ReuseFault {
            let NativeFailure { fault, buffer } = failure;
            if let Some(buffer) = buffer {
                self.pool.evict(buffer);
            }
            self.log_failure(&fault, probe, key, true);

            return self.decoder.decode(bytes, params, None).map_err(|retry| {
                self.log_failure(&retry.fault, probe, key, false);
                let err = DecodeError::Unknown {
                    fault: retry.fault,
                    retried: true,
                };
                self.report(err, probe, key)
            });
        }

        let NativeFailure { fault, buffer } = failure;
        if let Some(buffer) = buffer.filter(|_| reused) {
            // Not the buffer's fault; it goes back into circulation.
            self.pool.release(buffer);
        }
        self.log_failure(&fault, probe, key, false);
        let err = DecodeError::Unknown {
            fault,
            retried: false,
        };
        Err(self.report(err, probe, key))
    }

    fn validate(
        &self,
        bitmap: Option<Bitmap>,
        probe: &ProbeInfo,
        key: &str,
    ) -> Result<Bitmap, DecodeError> {
        let bitmap = match bitmap {
            Some(bitmap) if bitmap.is_usable() => bitmap,
            _ => {
                warn!(key, "Bitmap invalid");
                return Err(self.report(DecodeError::BitmapInvalid, probe, key));
            }
        };

        if bitmap.width <= 1 || bitmap.height <= 1 {
            let err = DecodeError::BitmapSizeInvalid {
                image_width: probe.width,
                image_height: probe.height,
                bitmap_width: bitmap.width,
                bitmap_height: bitmap.height,
            };
            warn!(key, "{err}");
            // Discarded, not pooled.
            drop(bitmap);
            return Err(self.report(err, probe, key));
        }

        Ok(bitmap)
    }

    fn log_failure(&self, fault: &NativeFault, probe: &ProbeInfo, key: &str, retrying: bool) {
        let memory = self.memory.snapshot();
        let max_memory = format_optional_size(memory.max);
        let free_memory = format_optional_size(memory.free);
        let total_memory = format_optional_size(memory.total);
        let pool = self.pool.stats();

        if retrying {
            warn!(
                key,
                width = probe.width,
                height = probe.height,
                mime = probe.format.mime_type(),
                %max_memory,
                %free_memory,
                %total_memory,
                pool_buffers = pool.buffers,
                "Decode into reused buffer failed, retrying with a fresh buffer: {fault}"
            );
        } else {
            error!(
                key,
                width = probe.width,
                height = probe.height,
                mime = probe.format.mime_type(),
                %max_memory,
                %free_memory,
                %total_memory,
                pool_buffers = pool.buffers,
                "Decode failed: {fault}"
            );
        }
    }

    /// Send `err` to the error callback and hand it back.
    fn report(&self, err: DecodeError, probe: &ProbeInfo, key: &str) -> DecodeError {
        let cause = match &err {
            DecodeError::Unknown { fault, .. } => Some(fault.clone()),
            _ => None,
        };
        let event = DecodeFailureEvent {
            key: key.to_string(),
            kind: err.kind(),
            message: err.to_string(),
            cause,
            width: probe.width,
            height: probe.height,
            format: probe.format,
        };
        self.error_callback.on_error(&event);
        err
    }
}

impl std::fmt::Debug for DecodeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeEngine")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
