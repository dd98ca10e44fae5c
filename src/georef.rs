//! The boundary between a track and the map's georeferencing.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt::Debug;

use crate::track_point::{LatLon, MapCoord};

/// CRS specification of plain geographic WGS84 coordinates.
pub const GEOGRAPHIC_CRS_SPEC: &str = "+proj=latlong +datum=WGS84";

/// Converts between geographic coordinates and the map's local coordinates.
///
/// Implementations return `None` when a coordinate cannot be transformed.
pub trait Georeferencing: Debug + Send + Sync {
    fn to_local(&self, latlon: LatLon) -> Option<MapCoord>;
    fn to_geographic(&self, coord: MapCoord) -> Option<LatLon>;

    /// The CRS specification in PROJ format.
    fn crs_spec(&self) -> String;
}

const WGS84_SEMIMAJOR: f64 = 6_378_137.0;

/// Spherical mercator (EPSG:3857), in meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Georeferencing for WebMercator {
    fn to_local(&self, latlon: LatLon) -> Option<MapCoord> {
        if latlon.latitude.abs() >= 90.0 {
            return None;
        }

        let x = WGS84_SEMIMAJOR * latlon.longitude.to_radians();
        let y = WGS84_SEMIMAJOR * (FRAC_PI_4 + latlon.latitude.to_radians() / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(MapCoord::new(x, y))
        } else {
            None
        }
    }

    fn to_geographic(&self, coord: MapCoord) -> Option<LatLon> {
        let lat = FRAC_PI_2 - 2.0 * (-coord.y / WGS84_SEMIMAJOR).exp().atan();
        let lon = coord.x / WGS84_SEMIMAJOR;

        Some(LatLon::new(lat.to_degrees(), lon.to_degrees()))
    }

    fn crs_spec(&self) -> String {
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +no_defs"
            .to_string()
    }
}
