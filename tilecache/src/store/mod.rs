//! Persistent tile store boundary.
//!
//! The store is the single shared mutable resource in the system. It is a
//! key-value table keyed by tile coordinate, with a uniqueness constraint on
//! the key: at most one row per `TileCoord`, created exactly once on the
//! first cold request and never rewritten through the serving path. Only
//! `custom_data` has a write-back operation, used by the offline rebuild.
//!
//! Backends implement [`TileStore`]; [`MemoryTileStore`] is the in-process
//! reference implementation and [`DiskTileStore`] a snapshot-backed
//! persistent one. Production deployments are expected to implement the
//! trait against their own database.

mod disk;
mod memory;
mod pages;

pub use disk::DiskTileStore;
pub use memory::MemoryTileStore;
pub use pages::tile_pages;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::TileCoord;

/// Errors produced by tile store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row for this coordinate already exists.
    ///
    /// This is the uniqueness constraint firing; callers recover by
    /// re-reading the existing row.
    #[error("tile already exists at ({0})")]
    Duplicate(TileCoord),

    /// I/O failure in a persistent backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One cached tile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// The tile coordinate, unique per row.
    pub coord: TileCoord,
    /// Canonical encoded payload. Immutable after creation.
    pub data: Bytes,
    /// Payload produced by the injected transform, when one is configured.
    pub custom_data: Option<Bytes>,
    /// Optional expiry timestamp. Persisted but not consulted when serving.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tile {
    /// Create a tile row with no custom payload and no expiry.
    pub fn new(coord: TileCoord, data: Bytes) -> Self {
        Self {
            coord,
            data,
            custom_data: None,
            expires_at: None,
        }
    }

    /// Attach a custom payload.
    pub fn with_custom_data(mut self, custom_data: Option<Bytes>) -> Self {
        self.custom_data = custom_data;
        self
    }
}

/// A tile row together with its store-assigned id.
///
/// Ids increase monotonically in insertion order and are the pagination key
/// for maintenance scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTile {
    /// Store-assigned row id.
    pub id: u64,
    /// The row itself.
    pub tile: Tile,
}

/// Key-value store of tiles keyed by coordinate.
///
/// Implementations must be `Send + Sync`; methods return boxed futures so
/// the trait stays usable as `Arc<dyn TileStore>`.
pub trait TileStore: Send + Sync {
    /// Look up the tile at `coord`.
    fn find(&self, coord: TileCoord) -> BoxFuture<'_, Result<Option<Tile>, StoreError>>;

    /// Insert a new tile row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` when a row already exists at the
    /// tile's coordinate; the existing row is left untouched.
    fn insert(&self, tile: Tile) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Total number of stored tiles.
    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Return up to `limit` rows with id greater than `after_id`, in
    /// ascending id order.
    fn page_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<StoredTile>, StoreError>>;

    /// Bulk-replace `custom_data` for the given row ids.
    ///
    /// Unknown ids are ignored; `data` is never touched.
    fn update_custom_data(
        &self,
        updates: Vec<(u64, Option<Bytes>)>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}
