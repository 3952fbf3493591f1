//! Offline rebuild of custom tile payloads.
//!
//! When the injected transform changes, stored `custom_data` goes stale.
//! This maintenance operation re-derives it for every stored tile: rows are
//! streamed in ascending id order in fixed-size batches, each canonical
//! payload is decoded and re-transformed, and the batch is written back in
//! bulk. Fractional progress is reported after each batch, and the scan can
//! resume from any id if interrupted.

use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use thiserror::Error;
use tracing::info;

use crate::codec::{CodecError, FeatureSet};
use crate::coord::TileCoord;
use crate::store::{tile_pages, StoreError, TileStore};
use crate::transform::CustomTransform;

/// Default number of rows per rebuild batch.
pub const DEFAULT_REBUILD_BATCH_SIZE: usize = 100;

/// Errors that can abort a rebuild.
#[derive(Debug, Error)]
pub enum RebuildError {
    /// The store failed mid-scan.
    #[error("tile store failed: {0}")]
    Store(#[from] StoreError),

    /// A stored canonical payload no longer decodes. The store is corrupt;
    /// the rebuild stops rather than skipping rows silently.
    #[error("stored payload for tile ({coord}) is invalid: {source}")]
    Codec {
        coord: TileCoord,
        #[source]
        source: CodecError,
    },
}

/// Summary of a completed rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Number of tiles whose `custom_data` was rewritten.
    pub tiles_rebuilt: u64,
    /// Number of batches processed.
    pub batches: u64,
}

/// Re-run `transform` over every stored tile's canonical payload.
///
/// `progress` is invoked after each batch with the fraction of rows
/// processed so far, in (0, 1].
///
/// # Errors
///
/// Stops at the first store or decode failure; batches already written
/// back stay written.
pub async fn rebuild_custom_data(
    store: Arc<dyn TileStore>,
    transform: &CustomTransform,
    batch_size: usize,
    mut progress: impl FnMut(f64),
) -> Result<RebuildReport, RebuildError> {
    let total = store.count().await?;
    if total == 0 {
        progress(1.0);
        return Ok(RebuildReport {
            tiles_rebuilt: 0,
            batches: 0,
        });
    }

    let mut pages = pin!(tile_pages(Arc::clone(&store), batch_size));
    let mut tiles_rebuilt = 0u64;
    let mut batches = 0u64;

    while let Some(page) = pages.try_next().await? {
        let mut updates = Vec::with_capacity(page.len());
        for row in &page {
            let features =
                FeatureSet::decode(&row.tile.data).map_err(|source| RebuildError::Codec {
                    coord: row.tile.coord,
                    source,
                })?;
            updates.push((row.id, Some(Bytes::from(transform(&features)))));
        }

        tiles_rebuilt += updates.len() as u64;
        store.update_custom_data(updates).await?;
        batches += 1;
        progress(tiles_rebuilt as f64 / total as f64);
    }

    info!(tiles_rebuilt, batches, "Custom data rebuild complete");
    Ok(RebuildReport {
        tiles_rebuilt,
        batches,
    })
}
