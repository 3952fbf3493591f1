//! CLI subcommands and shared wiring.

pub mod rebuild;
pub mod serve;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;

use tilecache::codec::FeatureSet;
use tilecache::store::{DiskTileStore, MemoryTileStore, TileStore};
use tilecache::transform::CustomTransform;

/// Boxed error type shared by all subcommands.
pub type CommandError = Box<dyn Error + Send + Sync>;

/// Open the configured store backend.
///
/// A path selects the persistent disk store; omitting it falls back to a
/// process-local in-memory store.
pub async fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn TileStore>, CommandError> {
    match path {
        Some(path) => Ok(Arc::new(DiskTileStore::open(path).await?)),
        None => Ok(Arc::new(MemoryTileStore::new())),
    }
}

/// Built-in custom-serialization transforms selectable from the CLI.
///
/// Stands in for a deployment-specific function; the service only ever
/// sees the resulting [`CustomTransform`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransformKind {
    /// Feature counts and mean node position, 16 bytes big-endian.
    Centroid,
}

impl TransformKind {
    /// Resolve to the transform function.
    pub fn transform(self) -> CustomTransform {
        match self {
            TransformKind::Centroid => Arc::new(centroid_summary),
        }
    }
}

/// Summarize a tile as node count, way count, and mean fixed-point node
/// position, each big-endian.
fn centroid_summary(features: &FeatureSet) -> Vec<u8> {
    let count = features.nodes.len();
    let (lat_sum, lon_sum) = features
        .nodes
        .values()
        .fold((0i64, 0i64), |(lat, lon), node| {
            (lat + node.lat as i64, lon + node.lon as i64)
        });
    let (mean_lat, mean_lon) = if count == 0 {
        (0i32, 0i32)
    } else {
        ((lat_sum / count as i64) as i32, (lon_sum / count as i64) as i32)
    };

    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&(count as u32).to_be_bytes());
    out.extend_from_slice(&(features.ways.len() as u32).to_be_bytes());
    out.extend_from_slice(&mean_lat.to_be_bytes());
    out.extend_from_slice(&mean_lon.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tilecache::codec::Node;

    #[test]
    fn test_centroid_summary_of_empty_tile() {
        let out = centroid_summary(&FeatureSet::default());
        assert_eq!(out, vec![0u8; 16]);
    }

    #[test]
    fn test_centroid_summary_averages_nodes() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            1,
            Node {
                lat: 100,
                lon: -200,
                tags: BTreeMap::new(),
            },
        );
        nodes.insert(
            2,
            Node {
                lat: 300,
                lon: -400,
                tags: BTreeMap::new(),
            },
        );
        let features = FeatureSet {
            nodes,
            ways: BTreeMap::new(),
        };

        let out = centroid_summary(&features);
        assert_eq!(&out[0..4], &2u32.to_be_bytes());
        assert_eq!(&out[4..8], &0u32.to_be_bytes());
        assert_eq!(&out[8..12], &200i32.to_be_bytes());
        assert_eq!(&out[12..16], &(-300i32).to_be_bytes());
    }
}
