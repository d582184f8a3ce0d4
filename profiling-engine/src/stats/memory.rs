//! Process memory sampling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default fraction of the memory ceiling at which a partition starts flushing.
pub const DEFAULT_NEAR_LIMIT_RATIO: f64 = 0.8;

/// Source of resident-memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size of the process in bytes.
    fn resident_bytes(&self) -> Result<u64>;
}

/// Reads `VmRSS` from `/proc/self/status`. Reports 0 on other platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Result<u64> {
        #[cfg(target_os = "linux")]
        {
            let status = std::fs::read_to_string("/proc/self/status")?;
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        return Ok(kb * 1024);
                    }
                }
            }
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "VmRSS not found").into())
        }

        #[cfg(not(target_os = "linux"))]
        {
            Ok(0)
        }
    }
}

/// A probe that reports a settable value, for deterministic runs.
#[derive(Debug, Default)]
pub struct StaticMemoryProbe {
    bytes: AtomicU64,
}

impl StaticMemoryProbe {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    pub fn from_mb(mb: u64) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for StaticMemoryProbe {
    fn resident_bytes(&self) -> Result<u64> {
        Ok(self.bytes.load(Ordering::Relaxed))
    }
}

/// Samples memory through a probe and remembers the running peak.
pub struct MemoryTracker {
    probe: Arc<dyn MemoryProbe>,
    near_limit_ratio: f64,
    peak_bytes: AtomicU64,
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("near_limit_ratio", &self.near_limit_ratio)
            .field("peak_bytes", &self.peak_bytes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new(Arc::new(ProcessMemoryProbe))
    }
}

impl MemoryTracker {
    pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            near_limit_ratio: DEFAULT_NEAR_LIMIT_RATIO,
            peak_bytes: AtomicU64::new(0),
        }
    }

    pub fn with_near_limit_ratio(mut self, ratio: f64) -> Self {
        self.near_limit_ratio = ratio;
        self
    }

    /// Current resident memory in bytes. A failed reading counts as 0.
    pub fn get_current_usage(&self) -> u64 {
        let bytes = match self.probe.resident_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Memory probe failed");
                0
            }
        };
        self.peak_bytes.fetch_max(bytes, Ordering::Relaxed);
        bytes
    }

    /// Returns true when current usage exceeds the near-limit ratio of `limit_mb`.
    pub fn is_near_limit(&self, limit_mb: u64) -> bool {
        let usage = self.get_current_usage() as f64;
        usage > limit_mb as f64 * BYTES_PER_MB * self.near_limit_ratio
    }

    /// Highest usage observed so far, in bytes.
    pub fn get_peak_usage(&self) -> u64 {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn peak_usage_mb(&self) -> f64 {
        self.get_peak_usage() as f64 / BYTES_PER_MB
    }
}
