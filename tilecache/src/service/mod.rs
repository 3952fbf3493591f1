//! Tile cache manager.
//!
//! Coordinates one request's path through the system:
//!
//! ```text
//! LOOKUP ──► HIT ───────────────────────────────► RESPOND
//!    │
//!    └────► MISS ──► FETCH ──► ENCODE ──► STORE ──► RESPOND
//! ```
//!
//! # Concurrency
//!
//! Two layers guard against duplicate work on concurrent cold requests for
//! the same coordinate:
//!
//! 1. A per-coordinate in-process lock serializes cold builds, so at most
//!    one fetch runs per tile within this process. Waiters re-check the
//!    store after acquiring the lock and serve the fresh row.
//! 2. The store's uniqueness constraint stays the source of truth. If
//!    another process wins the race, the resulting `Duplicate` error is
//!    recovered by re-reading and serving the existing row. The race is
//!    never surfaced to the caller.
//!
//! Nothing is persisted unless fetch and encode both succeed; a timed-out
//! fetch fails the whole request and leaves no partial tile behind.

mod rebuild;

pub use rebuild::{
    rebuild_custom_data, RebuildError, RebuildReport, DEFAULT_REBUILD_BATCH_SIZE,
};

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, FeatureSet};
use crate::coord::{CoordError, TileCoord};
use crate::fetch::{FetchError, GeodataSource};
use crate::store::{StoreError, Tile, TileStore};
use crate::telemetry::ServiceMetrics;
use crate::transform::CustomTransform;

/// Errors a tile request can surface to its caller.
#[derive(Debug, Error)]
pub enum TileError {
    /// The requested coordinate is invalid. A client error.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// The remote geodata service failed. Nothing was persisted.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The fetched features could not be encoded. Nothing was persisted.
    #[error("tile encoding failed: {0}")]
    Codec(#[from] CodecError),

    /// The store failed with something other than a recoverable duplicate.
    #[error("tile store failed: {0}")]
    Store(#[from] StoreError),
}

/// The fetch-or-build tile cache service.
///
/// Owns its collaborators behind trait objects; construction wires the
/// store and geodata source, and the optional transform and metrics attach
/// builder-style.
pub struct TileService {
    store: Arc<dyn TileStore>,
    source: Arc<dyn GeodataSource>,
    transform: Option<CustomTransform>,
    metrics: Option<Arc<ServiceMetrics>>,
    /// Per-coordinate gates serializing cold builds.
    building: DashMap<TileCoord, Arc<Mutex<()>>>,
}

impl TileService {
    /// Create a service over a store and a geodata source.
    pub fn new(store: Arc<dyn TileStore>, source: Arc<dyn GeodataSource>) -> Self {
        Self {
            store,
            source,
            transform: None,
            metrics: None,
            building: DashMap::new(),
        }
    }

    /// Attach a custom-serialization transform.
    ///
    /// When set, every created tile also stores the transform's output, and
    /// requests are answered with it instead of the canonical payload.
    pub fn with_transform(mut self, transform: CustomTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Serve the tile at the given raw coordinate.
    ///
    /// `lat` and `lon` are in hundredths of a degree. Latitude outside
    /// [-9000, 9000) is rejected; longitude is wrapped. The returned bytes
    /// are the stored `custom_data` when a transform is configured and the
    /// row carries one, otherwise the canonical `data`.
    ///
    /// # Errors
    ///
    /// See [`TileError`]. Duplicate-creation races are recovered
    /// internally and never returned.
    pub async fn get_tile(&self, lat: i32, lon: i32) -> Result<Bytes, TileError> {
        let coord = TileCoord::new(lat, lon)?;

        if let Some(tile) = self.store.find(coord).await? {
            debug!(%coord, "Tile served from store");
            if let Some(ref m) = self.metrics {
                m.cache_hit();
            }
            return Ok(self.select_payload(&tile));
        }

        // Cold path: take this coordinate's gate, dropping the map guard
        // before awaiting the lock.
        let gate = {
            let entry = self.building.entry(coord).or_default();
            Arc::clone(entry.value())
        };
        let result = {
            let _held = gate.lock().await;
            self.build_tile(coord).await
        };
        self.building
            .remove_if(&coord, |_, in_map| Arc::ptr_eq(in_map, &gate));
        result
    }

    /// Build, persist, and serve a missing tile. Runs under the gate.
    async fn build_tile(&self, coord: TileCoord) -> Result<Bytes, TileError> {
        // Another waiter may have built the tile while this request queued
        // on the gate.
        if let Some(tile) = self.store.find(coord).await? {
            if let Some(ref m) = self.metrics {
                m.cache_hit();
            }
            return Ok(self.select_payload(&tile));
        }

        if let Some(ref m) = self.metrics {
            m.cache_miss();
        }

        let bbox = coord.bounding_box();
        let features = match self.fetch_features(&bbox).await {
            Ok(features) => features,
            Err(e) => {
                warn!(%coord, error = %e, "Geodata fetch failed");
                if let Some(ref m) = self.metrics {
                    m.upstream_failure();
                }
                return Err(e.into());
            }
        };

        let data = features.encode()?;
        let custom_data = self
            .transform
            .as_ref()
            .map(|transform| Bytes::from(transform(&features)));
        let tile = Tile::new(coord, data).with_custom_data(custom_data);

        match self.store.insert(tile.clone()).await {
            Ok(()) => {
                info!(
                    %coord,
                    bytes = tile.data.len(),
                    nodes = features.nodes.len(),
                    ways = features.ways.len(),
                    "Tile created"
                );
                if let Some(ref m) = self.metrics {
                    m.tile_created();
                }
                Ok(self.select_payload(&tile))
            }
            Err(StoreError::Duplicate(_)) => {
                // Lost a cross-process race; the winner's row is canonical.
                debug!(%coord, "Concurrent creation detected, serving existing tile");
                match self.store.find(coord).await? {
                    Some(existing) => Ok(self.select_payload(&existing)),
                    None => Err(TileError::Store(StoreError::Backend(format!(
                        "tile at ({coord}) vanished after duplicate insert"
                    )))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_features(
        &self,
        bbox: &crate::coord::BoundingBox,
    ) -> Result<FeatureSet, FetchError> {
        let nodes = self.source.query_nodes(bbox).await?;
        let ways = self.source.query_ways(bbox).await?;
        Ok(FeatureSet { nodes, ways })
    }

    /// Pick the payload to serve from a stored row.
    fn select_payload(&self, tile: &Tile) -> Bytes {
        let payload = if self.transform.is_some() {
            tile.custom_data.clone().unwrap_or_else(|| tile.data.clone())
        } else {
            tile.data.clone()
        };
        if let Some(ref m) = self.metrics {
            m.bytes_served(payload.len());
        }
        payload
    }
}
