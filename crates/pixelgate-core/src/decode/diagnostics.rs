//! Failure reporting collaborators: the error callback sink and memory diagnostics.

use std::sync::Arc;

use tracing::error;

use super::{ErrorKind, ImageFormat, NativeFault};
use crate::pool::BufferPool;

/// Structured failure event handed to the [`ErrorCallback`].
#[derive(Debug, Clone)]
pub struct DecodeFailureEvent {
    /// Request identity.
    pub key: String,
    pub kind: ErrorKind,
    /// Human-readable description of the failure.
    pub message: String,
    /// The decoder fault behind the failure, if the decoder failed.
    pub cause: Option<NativeFault>,
    /// Probed width, as stored.
    pub width: u32,
    /// Probed height, as stored.
    pub height: u32,
    pub format: ImageFormat,
}

/// Sink for decode failures, used for external logging and telemetry.
pub trait ErrorCallback: Send + Sync {
    fn on_error(&self, event: &DecodeFailureEvent);
}

/// Default sink: reports each failure through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorCallback;

impl ErrorCallback for TracingErrorCallback {
    fn on_error(&self, event: &DecodeFailureEvent) {
        error!(
            key = %event.key,
            kind = %event.kind,
            width = event.width,
            height = event.height,
            mime = event.format.mime_type(),
            "{}",
            event.message
        );
    }
}

/// Memory figures captured when a decode fails. `None` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySnapshot {
    /// Ceiling in bytes.
    pub max: Option<u64>,
    /// Bytes still available below `max`.
    pub free: Option<u64>,
    /// Bytes currently in use.
    pub total: Option<u64>,
}

/// Provider of memory-pressure figures, queried only on failure paths.
pub trait MemoryDiagnostics: Send + Sync {
    fn snapshot(&self) -> MemorySnapshot;
}

/// Default provider: reports the shared buffer pool's budget and occupancy.
///
/// Hosts that can query process memory should inject their own provider.
#[derive(Debug, Clone)]
pub struct PoolMemory {
    pool: Arc<BufferPool>,
}

impl PoolMemory {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }
}

impl MemoryDiagnostics for PoolMemory {
    fn snapshot(&self) -> MemorySnapshot {
        let stats = self.pool.stats();
        let max = stats.max_bytes as u64;
        let held = stats.held_bytes as u64;
        MemorySnapshot {
            max: Some(max),
            free: Some(max.saturating_sub(held)),
            total: Some(held),
        }
    }
}

/// Format a byte count for logs, e.g. `"12.0 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub(crate) fn format_optional_size(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "unknown".to_string(), format_file_size)
}
