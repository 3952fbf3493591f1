//! Service telemetry for observability.
//!
//! Provides lock-free metrics collection for the tile service plus the
//! tracing subscriber setup used by binaries.
//!
//! ```text
//! TileService ─────► ServiceMetrics ─────► MetricsSnapshot ─────► Views
//!                    (atomic counters)     (point-in-time copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Lock-free counters recorded by the tile service.
///
/// Counters only ever increase; readers take a [`MetricsSnapshot`] for a
/// consistent point-in-time view.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    tiles_created: AtomicU64,
    upstream_failures: AtomicU64,
    bytes_served: AtomicU64,
}

impl ServiceMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from the store.
    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that had to build its tile.
    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly persisted tile.
    pub fn tile_created(&self) {
        self.tiles_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed remote fetch.
    pub fn upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record payload bytes returned to a caller.
    pub fn bytes_served(&self, bytes: usize) {
        self.bytes_served.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            tiles_created: self.tiles_created.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceMetrics`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub tiles_created: u64,
    pub upstream_failures: u64,
    pub bytes_served: u64,
}

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set and defaults to `info`. Binaries
/// call this once at startup; tests and library consumers that bring their
/// own subscriber skip it.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
