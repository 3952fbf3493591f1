//! TileCache - binary map tile cache and proxy
//!
//! This library implements a caching proxy for OpenStreetMap data. A request
//! for a tile coordinate is served from the persistent store when possible;
//! on a miss the raw features are fetched from a remote geodata service,
//! encoded into a compact binary format, persisted, and returned.
//!
//! # Architecture
//!
//! ```text
//! Request (lat, lon)
//!       │
//!       ▼
//! TileService ──► TileStore (hit? serve stored bytes)
//!       │ miss
//!       ▼
//! GeodataSource ──► FeatureSet ──► codec::encode ──► TileStore ──► Response
//! ```
//!
//! The modules mirror that flow:
//!
//! - [`coord`] - fixed-point coordinate conversion, tile quantization, and
//!   bounding-box derivation
//! - [`codec`] - the versioned, string-interned binary tile format
//! - [`fetch`] - the remote geodata adapter (Overpass)
//! - [`store`] - the persistent tile store boundary and its backends
//! - [`service`] - the fetch-or-build cache manager
//! - [`transform`] - the optional injected custom-serialization hook
//! - [`telemetry`] - metrics counters and tracing setup

pub mod codec;
pub mod coord;
pub mod fetch;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod transform;

pub use codec::{CodecError, FeatureSet, Node, Way};
pub use coord::{BoundingBox, CoordError, TileCoord};
pub use service::{TileError, TileService};
pub use store::{Tile, TileStore};
