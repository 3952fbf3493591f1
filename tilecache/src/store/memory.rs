//! In-memory tile store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::coord::TileCoord;

use super::{StoreError, StoredTile, Tile, TileStore};

/// Non-persistent reference store.
///
/// Rows live in a `BTreeMap` keyed by insertion-ordered id, with a
/// coordinate index enforcing the uniqueness constraint. Suitable for tests
/// and for running the service without persistence.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<u64, Tile>,
    by_coord: HashMap<TileCoord, u64>,
    next_id: u64,
}

impl MemoryTileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileStore for MemoryTileStore {
    fn find(&self, coord: TileCoord) -> BoxFuture<'_, Result<Option<Tile>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.read();
            Ok(inner
                .by_coord
                .get(&coord)
                .and_then(|id| inner.rows.get(id))
                .cloned())
        })
    }

    fn insert(&self, tile: Tile) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            if inner.by_coord.contains_key(&tile.coord) {
                return Err(StoreError::Duplicate(tile.coord));
            }
            inner.next_id += 1;
            let id = inner.next_id;
            inner.by_coord.insert(tile.coord, id);
            inner.rows.insert(id, tile);
            Ok(())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move { Ok(self.inner.read().rows.len() as u64) })
    }

    fn page_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<StoredTile>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.read();
            Ok(inner
                .rows
                .range((Bound::Excluded(after_id), Bound::Unbounded))
                .take(limit)
                .map(|(&id, tile)| StoredTile {
                    id,
                    tile: tile.clone(),
                })
                .collect())
        })
    }

    fn update_custom_data(
        &self,
        updates: Vec<(u64, Option<Bytes>)>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            for (id, custom_data) in updates {
                if let Some(tile) = inner.rows.get_mut(&id) {
                    tile.custom_data = custom_data;
                }
            }
            Ok(())
        })
    }
}
