//! Lazy id-ordered pagination over a tile store.

use std::sync::Arc;

use futures::stream::{self, Stream};

use super::{StoreError, StoredTile, TileStore};

/// Stream the whole store as batches of at most `batch_size` rows, in
/// ascending id order.
///
/// Each batch is fetched on demand, keyed by the last id of the previous
/// batch, so the scan is finite, lazy, and restartable from any id. Rows
/// inserted behind the cursor are not revisited.
pub fn tile_pages(
    store: Arc<dyn TileStore>,
    batch_size: usize,
) -> impl Stream<Item = Result<Vec<StoredTile>, StoreError>> {
    let batch_size = batch_size.max(1);
    stream::try_unfold(0u64, move |after_id| {
        let store = Arc::clone(&store);
        async move {
            let page = store.page_after(after_id, batch_size).await?;
            match page.last() {
                Some(last) => {
                    let next = last.id;
                    Ok(Some((page, next)))
                }
                None => Ok(None),
            }
        }
    })
}
