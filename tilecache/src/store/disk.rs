//! Snapshot-backed persistent tile store.
//!
//! Rows are held in memory and written through to a single bincode snapshot
//! file on every mutation. The write is atomic: the snapshot is serialized
//! to a sibling temp file and renamed over the live one, so a crash leaves
//! either the old or the new snapshot, never a torn file.
//!
//! This backend trades write amplification for simplicity; the tile table
//! grows by whole-world request patterns slowly enough that rewriting the
//! snapshot per insert is acceptable for a single-process deployment.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::coord::TileCoord;

use super::{StoreError, StoredTile, Tile, TileStore};

/// Persistent store backed by a bincode snapshot file.
#[derive(Debug)]
pub struct DiskTileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Default, Debug)]
struct Inner {
    rows: BTreeMap<u64, Tile>,
    by_coord: HashMap<TileCoord, u64>,
    next_id: u64,
}

/// On-disk representation of the whole store.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    rows: Vec<StoredTile>,
}

impl DiskTileStore {
    /// Open a store at `path`, loading the existing snapshot if present.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` when the file cannot be read and
    /// `StoreError::Backend` when it cannot be deserialized.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let snapshot: Snapshot = bincode::deserialize(&raw)
                    .map_err(|e| StoreError::Backend(format!("corrupt store snapshot: {e}")))?;
                let mut rows = BTreeMap::new();
                let mut by_coord = HashMap::new();
                for stored in snapshot.rows {
                    by_coord.insert(stored.tile.coord, stored.id);
                    rows.insert(stored.id, stored.tile);
                }
                info!(path = %path.display(), tiles = rows.len(), "Loaded tile store snapshot");
                Inner {
                    rows,
                    by_coord,
                    next_id: snapshot.next_id,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Inner::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    async fn persist(&self, inner: &Inner) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            next_id: inner.next_id,
            rows: inner
                .rows
                .iter()
                .map(|(&id, tile)| StoredTile {
                    id,
                    tile: tile.clone(),
                })
                .collect(),
        };
        let raw = bincode::serialize(&snapshot)
            .map_err(|e| StoreError::Backend(format!("failed to serialize snapshot: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl TileStore for DiskTileStore {
    fn find(&self, coord: TileCoord) -> BoxFuture<'_, Result<Option<Tile>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            Ok(inner
                .by_coord
                .get(&coord)
                .and_then(|id| inner.rows.get(id))
                .cloned())
        })
    }

    fn insert(&self, tile: Tile) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if inner.by_coord.contains_key(&tile.coord) {
                return Err(StoreError::Duplicate(tile.coord));
            }
            inner.next_id += 1;
            let id = inner.next_id;
            inner.by_coord.insert(tile.coord, id);
            inner.rows.insert(id, tile);
            self.persist(&inner).await
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move { Ok(self.inner.lock().await.rows.len() as u64) })
    }

    fn page_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<StoredTile>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            Ok(inner
                .rows
                .range((std::ops::Bound::Excluded(after_id), std::ops::Bound::Unbounded))
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
            let mut inner = self.inner.lock().await;
            for (id, custom_data) in updates {
                if let Some(tile) = inner.rows.get_mut(&id) {
                    tile.custom_data = custom_data;
                }
            }
            self.persist(&inner).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: i32, lon: i32) -> TileCoord {
        TileCoord::new(lat, lon).unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_file_creates_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskTileStore::open(dir.path().join("tiles.bin"))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.bin");

        {
            let store = DiskTileStore::open(&path).await.unwrap();
            store
                .insert(Tile::new(coord(4050, -740), Bytes::from_static(b"payload")))
                .await
                .unwrap();
        }

        let reopened = DiskTileStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let found = reopened.find(coord(4050, -740)).await.unwrap().unwrap();
        assert_eq!(found.data, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_ids_keep_increasing_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.bin");

        {
            let store = DiskTileStore::open(&path).await.unwrap();
            store
                .insert(Tile::new(coord(1, 1), Bytes::from_static(b"a")))
                .await
                .unwrap();
        }
        {
            let store = DiskTileStore::open(&path).await.unwrap();
            store
                .insert(Tile::new(coord(2, 2), Bytes::from_static(b"b")))
                .await
                .unwrap();
            let page = store.page_after(0, 10).await.unwrap();
            assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskTileStore::open(dir.path().join("tiles.bin"))
            .await
            .unwrap();
        store
            .insert(Tile::new(coord(1, 1), Bytes::from_static(b"a")))
            .await
            .unwrap();
        let err = store
            .insert(Tile::new(coord(1, 1), Bytes::from_static(b"b")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.bin");
        tokio::fs::write(&path, b"not a snapshot").await.unwrap();

        let err = DiskTileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_custom_data_update_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.bin");

        {
            let store = DiskTileStore::open(&path).await.unwrap();
            store
                .insert(Tile::new(coord(1, 1), Bytes::from_static(b"a")))
                .await
                .unwrap();
            store
                .update_custom_data(vec![(1, Some(Bytes::from_static(b"custom")))])
                .await
                .unwrap();
        }

        let reopened = DiskTileStore::open(&path).await.unwrap();
        let found = reopened.find(coord(1, 1)).await.unwrap().unwrap();
        assert_eq!(found.custom_data, Some(Bytes::from_static(b"custom")));
    }
}
