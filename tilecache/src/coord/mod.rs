//! Coordinate conversion module
//!
//! Provides conversions between decimal-degree coordinates and the fixed-point
//! integer representations used by the wire format, plus the quantized tile
//! coordinates that key the cache.
//!
//! Latitude and longitude are treated asymmetrically on purpose: latitude out
//! of range is a hard error, longitude is wrapped around the antimeridian.

use std::fmt;

use thiserror::Error;

/// Scale factor between decimal degrees and fixed-point coordinates.
pub const FIXED_POINT_SCALE: f64 = 10_000_000.0;

/// Largest representable fixed-point latitude (+90°).
pub const MAX_FIXED_LAT: i32 = 900_000_000;

/// Half the fixed-point longitude range (+180°).
const HALF_FIXED_LON_RANGE: i64 = 1_800_000_000;

/// Full fixed-point longitude range (360°).
const FIXED_LON_RANGE: i64 = 3_600_000_000;

/// Lowest valid tile latitude, in hundredths of a degree (inclusive).
pub const MIN_TILE_LAT: i32 = -9000;

/// Highest valid tile latitude, in hundredths of a degree (exclusive).
pub const MAX_TILE_LAT: i32 = 9000;

/// Tile longitude range in hundredths of a degree (360°).
const TILE_LON_RANGE: i64 = 36_000;

/// Nominal tile size per axis, in decimal degrees.
pub const TILE_SIZE_DEG: f64 = 0.01;

/// Bounding-box overlap margin, in decimal degrees.
///
/// Each tile's query box extends this far into its neighbors so that features
/// sitting on a tile edge are not dropped from either side.
pub const BBOX_MARGIN_DEG: f64 = 0.008;

/// Errors produced by coordinate validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Latitude outside [-9000, 9000) hundredths of a degree.
    #[error("invalid latitude {0}: must be in [-9000, 9000) hundredths of a degree")]
    InvalidLatitude(i32),
}

/// Converts a decimal-degree latitude to its fixed-point representation.
///
/// The value is scaled by 1e7, rounded half-up (ties away from zero), and
/// clamped to [-900_000_000, 900_000_000]. Latitude clamps rather than wraps:
/// there is nothing north of the pole.
#[inline]
pub fn lat_to_fixed(lat: f64) -> i32 {
    let scaled = (lat * FIXED_POINT_SCALE).round() as i64;
    scaled.clamp(-(MAX_FIXED_LAT as i64), MAX_FIXED_LAT as i64) as i32
}

/// Converts a decimal-degree longitude to its fixed-point representation.
///
/// The value is scaled by 1e7, rounded half-up (ties away from zero), and
/// wrapped into [-1_800_000_000, 1_800_000_000). Longitude wraps rather than
/// clamps: +180.0000001° is the same meridian as just past -180°.
#[inline]
pub fn lon_to_fixed(lon: f64) -> i32 {
    let scaled = (lon * FIXED_POINT_SCALE).round() as i64;
    let reduced = scaled.rem_euclid(FIXED_LON_RANGE);
    ((reduced + HALF_FIXED_LON_RANGE) % FIXED_LON_RANGE - HALF_FIXED_LON_RANGE) as i32
}

/// Wraps a tile longitude into [-18000, 18000) hundredths of a degree.
#[inline]
pub fn wrap_tile_lon(lon: i32) -> i16 {
    ((lon as i64 + TILE_LON_RANGE / 2).rem_euclid(TILE_LON_RANGE) - TILE_LON_RANGE / 2) as i16
}

/// A quantized tile coordinate.
///
/// Tiles are fixed 0.01° × 0.01° cells identified by their southwest corner
/// in hundredths of a degree. This pair is the cache key: at most one stored
/// tile exists per `TileCoord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TileCoord {
    lat: i16,
    lon: i16,
}

impl TileCoord {
    /// Create a tile coordinate from raw request values.
    ///
    /// Latitude must be in [-9000, 9000) and is rejected otherwise; longitude
    /// is wrapped into [-18000, 18000) and always accepted.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidLatitude` when `lat` is out of range.
    pub fn new(lat: i32, lon: i32) -> Result<Self, CoordError> {
        if !(MIN_TILE_LAT..MAX_TILE_LAT).contains(&lat) {
            return Err(CoordError::InvalidLatitude(lat));
        }
        Ok(Self {
            lat: lat as i16,
            lon: wrap_tile_lon(lon),
        })
    }

    /// Tile latitude in hundredths of a degree.
    pub fn lat(&self) -> i16 {
        self.lat
    }

    /// Tile longitude in hundredths of a degree.
    pub fn lon(&self) -> i16 {
        self.lon
    }

    /// Tile latitude in decimal degrees (southwest corner).
    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / 100.0
    }

    /// Tile longitude in decimal degrees (southwest corner).
    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / 100.0
    }

    /// The geographic query box for this tile.
    ///
    /// Covers the 0.01° tile cell plus a 0.008° margin on every side, so the
    /// box deliberately overlaps the eight neighboring tiles.
    pub fn bounding_box(&self) -> BoundingBox {
        let lat = self.lat_degrees();
        let lon = self.lon_degrees();
        BoundingBox {
            south: lat - BBOX_MARGIN_DEG,
            north: lat + TILE_SIZE_DEG + BBOX_MARGIN_DEG,
            west: lon - BBOX_MARGIN_DEG,
            east: lon + TILE_SIZE_DEG + BBOX_MARGIN_DEG,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}, {:.2}", self.lat_degrees(), self.lon_degrees())
    }
}

/// A geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Southern edge latitude.
    pub south: f64,
    /// Northern edge latitude.
    pub north: f64,
    /// Western edge longitude.
    pub west: f64,
    /// Eastern edge longitude.
    pub east: f64,
}
