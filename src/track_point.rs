use chrono::{DateTime, Utc};

/// A geographic WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A planar coordinate in the map's local coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MapCoord {
    pub x: f64,
    pub y: f64,
}

impl MapCoord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single GPX point (used for wpt, trkpt, and imported rtept).
///
/// Optional numeric fields are `None` when absent. A non-finite value stored
/// through the public fields is treated as absent by equality and by the
/// GPX writer. `position` must be finite for the point to be saved.
#[derive(Debug, Clone)]
pub struct TrackPoint {
    pub position: LatLon,
    pub time: Option<DateTime<Utc>>,
    pub elevation: Option<f32>,
    pub hdop: Option<f32>,
    pub name: Option<String>,
    /// Derived from `position` by the track's georeferencing.
    pub local: Option<MapCoord>,
}

impl TrackPoint {
    pub fn new(position: LatLon) -> Self {
        Self {
            position,
            time: None,
            elevation: None,
            hdop: None,
            name: None,
            local: None,
        }
    }

    pub fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
        Self::new(LatLon::new(latitude, longitude))
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// A non-finite value is taken as "no elevation".
    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = present(Some(elevation));
        self
    }

    /// A non-finite value is taken as "no hDOP".
    pub fn with_hdop(mut self, hdop: f32) -> Self {
        self.hdop = present(Some(hdop));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The elevation in meters, if present.
    pub fn elevation(&self) -> Option<f32> {
        present(self.elevation)
    }

    /// The horizontal dilution of precision, if present.
    pub fn hdop(&self) -> Option<f32> {
        present(self.hdop)
    }
}

/// Equality over the recorded data: position, time, elevation, hDOP and name.
/// The derived local coordinate does not take part.
impl PartialEq for TrackPoint {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.time == other.time
            && self.elevation() == other.elevation()
            && self.hdop() == other.hdop()
            && self.name == other.name
    }
}

fn present(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_absent_fields_compare_equal() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4);
        let b = TrackPoint::from_lat_lon(52.5, 13.4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nan_is_absent() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4).with_elevation(f32::NAN);
        assert_eq!(a.elevation, None);

        let mut b = TrackPoint::from_lat_lon(52.5, 13.4);
        b.elevation = Some(f32::NAN);
        b.hdop = Some(f32::NAN);
        assert_eq!(a, b);
        assert_eq!(b.elevation(), None);
    }

    #[test]
    fn test_infinity_is_absent() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4)
            .with_elevation(f32::INFINITY)
            .with_hdop(f32::NEG_INFINITY);
        assert_eq!(a.elevation, None);
        assert_eq!(a.hdop, None);

        let mut b = TrackPoint::from_lat_lon(52.5, 13.4);
        b.elevation = Some(f32::INFINITY);
        assert_eq!(b.elevation(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_differs_from_zero() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4);
        let b = TrackPoint::from_lat_lon(52.5, 13.4).with_elevation(0.0);
        assert_ne!(a, b);

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let c = TrackPoint::from_lat_lon(52.5, 13.4).with_time(epoch);
        assert_ne!(a, c);
    }

    #[test]
    fn test_local_coordinate_ignored() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4);
        let mut b = a.clone();
        b.local = Some(MapCoord::new(1.0, 2.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_name_compared() {
        let a = TrackPoint::from_lat_lon(52.5, 13.4).with_name("Start");
        let b = TrackPoint::from_lat_lon(52.5, 13.4).with_name("Finish");
        assert_ne!(a, b);
    }
}
