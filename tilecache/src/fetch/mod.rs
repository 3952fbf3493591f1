//! Remote geodata fetch adapter.
//!
//! The cache manager never talks to the network directly; it goes through
//! the [`GeodataSource`] trait, which hides the upstream service behind two
//! bounding-box queries: one for point features, one for ways. The shipped
//! implementation is [`OverpassSource`], which queries an OSM Overpass
//! interpreter endpoint.
//!
//! No retry policy lives here: a fetch either completes within its bounded
//! timeout or the whole tile request fails.

mod http;
mod overpass;

pub use http::{AsyncHttpClient, ReqwestClient, DEFAULT_FETCH_TIMEOUT};
pub use overpass::{OverpassSource, DEFAULT_OVERPASS_URL};

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::codec::{Node, Way};
use crate::coord::BoundingBox;

/// Errors produced while fetching raw map data from the remote service.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The service could not be reached, timed out, or returned a failure
    /// status.
    #[error("geodata service unavailable: {0}")]
    Unavailable(String),

    /// The service responded, but the payload could not be interpreted.
    #[error("geodata service returned a malformed response: {0}")]
    Malformed(String),
}

/// Source of raw map features for a bounding box.
///
/// Implementations must be `Send + Sync`; methods return boxed futures so
/// the trait stays usable as `Arc<dyn GeodataSource>`.
pub trait GeodataSource: Send + Sync {
    /// Fetch all point features inside `bbox`, keyed by node id.
    ///
    /// Coordinates in the result are already fixed-point.
    fn query_nodes(
        &self,
        bbox: &BoundingBox,
    ) -> BoxFuture<'_, Result<BTreeMap<u64, Node>, FetchError>>;

    /// Fetch all way features inside `bbox`, keyed by way id.
    fn query_ways(&self, bbox: &BoundingBox)
        -> BoxFuture<'_, Result<BTreeMap<u64, Way>, FetchError>>;
}
