use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::error::TrackError;
use crate::georef::{GEOGRAPHIC_CRS_SPEC, Georeferencing};
use crate::options::DecodeOptions;
use crate::parser;
use crate::track_point::{LatLon, TrackPoint};
use crate::writer;

type Result<T> = std::result::Result<T, TrackError>;

/// A continuous span of track data.
pub type TrackSegment = Vec<TrackPoint>;

/// Shared, immutable georeferencing context.
pub type SharedGeoreferencing = Arc<dyn Georeferencing>;

/// A set of track segments and waypoints, e.g. taken from a GPS device.
///
/// Positions are geographic WGS84 coordinates. When a georeferencing is set,
/// every stored point also carries its local map coordinate.
///
/// Cloning yields an independent copy; only the immutable georeferencing is
/// shared.
#[derive(Debug, Clone)]
pub struct Track {
    waypoints: TrackSegment,
    segments: Vec<TrackSegment>,
    current_segment_finished: bool,
    georef: Option<SharedGeoreferencing>,
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}

impl Track {
    /// Constructs an empty track without georeferencing.
    pub fn new() -> Self {
        Self {
            waypoints: Vec::new(),
            segments: Vec::new(),
            current_segment_finished: true,
            georef: None,
        }
    }

    /// Constructs an empty track which projects points with `georef`.
    pub fn with_georeferencing(georef: SharedGeoreferencing) -> Self {
        Self {
            georef: Some(georef),
            ..Self::new()
        }
    }

    pub fn georeferencing(&self) -> Option<&SharedGeoreferencing> {
        self.georef.as_ref()
    }

    /// Returns true when the track contains no points.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.segments.is_empty()
    }

    /// Deletes all points. The georeferencing is kept.
    pub fn clear(&mut self) {
        self.waypoints.clear();
        self.segments.clear();
        self.current_segment_finished = true;
    }

    /// Returns the CRS specification of the track's local coordinates, or of
    /// geographic WGS84 when no georeferencing is set.
    pub fn crs_spec(&self) -> String {
        match &self.georef {
            Some(georef) => georef.crs_spec(),
            None => GEOGRAPHIC_CRS_SPEC.to_string(),
        }
    }

    /// Appends a track point to the current segment, or starts a new segment
    /// if the current one was finished.
    pub fn append_track_point(&mut self, mut point: TrackPoint) {
        self.project(&mut point);
        match self.segments.last_mut() {
            Some(segment) if !self.current_segment_finished => segment.push(point),
            _ => {
                self.segments.push(vec![point]);
                self.current_segment_finished = false;
            }
        }
    }

    /// Ends the current segment; the next track point starts a new one.
    pub fn finish_current_segment(&mut self) {
        self.current_segment_finished = true;
    }

    pub fn append_waypoint(&mut self, mut point: TrackPoint) {
        self.project(&mut point);
        self.waypoints.push(point);
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    pub fn waypoints(&self) -> &[TrackPoint] {
        &self.waypoints
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// # Panics
    ///
    /// Panics if `segment` is out of range.
    pub fn segment_point_count(&self, segment: usize) -> usize {
        self.segment(segment).len()
    }

    /// # Panics
    ///
    /// Panics if `segment` or `index` is out of range.
    pub fn segment_point(&self, segment: usize, index: usize) -> &TrackPoint {
        let points = self.segment(segment);
        points.get(index).unwrap_or_else(|| {
            panic!(
                "point index {index} out of range for segment {segment} with {} points",
                points.len()
            )
        })
    }

    pub fn num_waypoints(&self) -> usize {
        self.waypoints.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn waypoint(&self, index: usize) -> &TrackPoint {
        self.waypoints.get(index).unwrap_or_else(|| {
            panic!(
                "waypoint index {index} out of range for {} waypoints",
                self.waypoints.len()
            )
        })
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn waypoint_name(&self, index: usize) -> Option<&str> {
        self.waypoint(index).name.as_deref()
    }

    fn segment(&self, segment: usize) -> &TrackSegment {
        self.segments.get(segment).unwrap_or_else(|| {
            panic!(
                "segment index {segment} out of range for {} segments",
                self.segments.len()
            )
        })
    }

    /// Averages the coordinates of all track points and waypoints.
    ///
    /// Returns `None` for an empty track.
    pub fn calc_average_position(&self) -> Option<LatLon> {
        let (count, lat, lon) = self
            .segments
            .iter()
            .flatten()
            .chain(&self.waypoints)
            .fold((0usize, 0.0, 0.0), |(n, lat, lon), p| {
                (n + 1, lat + p.position.latitude, lon + p.position.longitude)
            });

        (count > 0).then(|| LatLon::new(lat / count as f64, lon / count as f64))
    }

    /// Replaces the georeferencing and recomputes the local coordinates of
    /// all points from their geographic positions.
    pub fn change_map_georeferencing(&mut self, georef: Option<SharedGeoreferencing>) {
        self.georef = georef;

        let georef = self.georef.as_deref();
        for point in self.segments.iter_mut().flatten().chain(&mut self.waypoints) {
            point.local = georef.and_then(|g| g.to_local(point.position));
        }
    }

    fn project(&self, point: &mut TrackPoint) {
        point.local = self
            .georef
            .as_deref()
            .and_then(|g| g.to_local(point.position));
    }

    /// Replaces the track's content with the given GPX file.
    ///
    /// On failure, the track is left unchanged.
    pub fn load_from(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_gpx_extension(path)?;

        let file = File::open(path)?;
        self.load_gpx_from(file)?;
        debug!(
            "Loaded {} segments and {} waypoints from {}",
            self.segments.len(),
            self.waypoints.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the track's content with GPX data read from `reader`.
    ///
    /// On failure, the track is left unchanged.
    pub fn load_gpx_from(&mut self, reader: impl Read) -> Result<()> {
        self.load_gpx_with(reader, &DecodeOptions::default())
    }

    pub fn load_gpx_with(&mut self, mut reader: impl Read, opts: &DecodeOptions) -> Result<()> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let xml = std::str::from_utf8(&bytes)
            .map_err(|e| TrackError::MalformedDocument(format!("invalid UTF-8: {e}")))?;

        let mut loaded = parser::parse_gpx(xml, opts)?;
        if opts.project_points {
            loaded.change_map_georeferencing(self.georef.clone());
        } else {
            loaded.georef = self.georef.clone();
        }

        *self = loaded;
        Ok(())
    }

    /// Saves the track as a GPX file.
    ///
    /// Data is written to a temporary sibling file which replaces `path` only
    /// after it was written completely.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_gpx_extension(path)?;

        let file_name = path.file_name().and_then(OsStr::to_str).unwrap_or("track.gpx");
        let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

        let result = File::create(&temp_path)
            .map_err(TrackError::from)
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                self.save_gpx_to(&mut out)?;
                out.flush()?;
                out.get_ref().sync_all()?;
                Ok(())
            })
            .and_then(|()| fs::rename(&temp_path, path).map_err(TrackError::from));

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        } else {
            debug!("Saved track to {}", path.display());
        }
        result
    }

    /// Writes the track as GPX data to `out`.
    pub fn save_gpx_to(&self, out: impl Write) -> Result<()> {
        writer::write_gpx(self, out)
    }
}

/// Compares waypoints and segments point by point.
impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.waypoints == other.waypoints && self.segments == other.segments
    }
}

fn ensure_gpx_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("gpx") => Ok(()),
        _ => Err(TrackError::UnsupportedFormat(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georef::WebMercator;
    use crate::track_point::MapCoord;

    fn point(lat: f64, lon: f64) -> TrackPoint {
        TrackPoint::from_lat_lon(lat, lon)
    }

    /// Shifts coordinates by a fixed offset.
    #[derive(Debug)]
    struct Offset(f64);

    impl Georeferencing for Offset {
        fn to_local(&self, latlon: LatLon) -> Option<MapCoord> {
            Some(MapCoord::new(latlon.longitude + self.0, latlon.latitude + self.0))
        }

        fn to_geographic(&self, coord: MapCoord) -> Option<LatLon> {
            Some(LatLon::new(coord.y - self.0, coord.x - self.0))
        }

        fn crs_spec(&self) -> String {
            format!("offset {}", self.0)
        }
    }

    #[test]
    fn test_new_track_is_empty() {
        let track = Track::new();
        assert!(track.is_empty());
        assert_eq!(track.num_segments(), 0);
        assert_eq!(track.num_waypoints(), 0);
        assert_eq!(track.crs_spec(), GEOGRAPHIC_CRS_SPEC);
    }

    #[test]
    fn test_append_without_finish_single_segment() {
        let mut track = Track::new();
        for i in 0..5 {
            track.append_track_point(point(50.0 + i as f64, 8.0));
        }
        assert_eq!(track.num_segments(), 1);
        assert_eq!(track.segment_point_count(0), 5);
        assert_eq!(track.segment_point(0, 4).position.latitude, 54.0);
    }

    #[test]
    fn test_finish_between_appends() {
        let mut track = Track::new();
        for i in 0..4 {
            track.append_track_point(point(50.0, 8.0 + i as f64));
            track.finish_current_segment();
        }
        assert_eq!(track.num_segments(), 4);
        for s in 0..4 {
            assert_eq!(track.segment_point_count(s), 1);
        }
    }

    #[test]
    fn test_finish_never_creates_empty_segments() {
        let mut track = Track::new();
        track.finish_current_segment();
        track.finish_current_segment();
        assert_eq!(track.num_segments(), 0);

        track.append_track_point(point(1.0, 2.0));
        track.finish_current_segment();
        track.finish_current_segment();
        track.append_track_point(point(3.0, 4.0));
        assert_eq!(track.num_segments(), 2);
        assert!(track.segments().iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_clear_keeps_georeferencing() {
        let mut track = Track::with_georeferencing(Arc::new(Offset(1.0)));
        track.append_track_point(point(1.0, 2.0));
        track.append_waypoint(point(3.0, 4.0));
        track.clear();

        assert_eq!(track.num_segments(), 0);
        assert_eq!(track.num_waypoints(), 0);
        assert_eq!(track.crs_spec(), "offset 1");

        track.append_track_point(point(5.0, 6.0));
        assert_eq!(track.num_segments(), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut track = Track::new();
        track.append_track_point(point(1.0, 2.0));
        let copy = track.clone();

        track.append_track_point(point(3.0, 4.0));
        track.append_waypoint(point(5.0, 6.0));

        assert_eq!(copy.segment_point_count(0), 1);
        assert_eq!(copy.num_waypoints(), 0);
        assert_ne!(copy, track);
    }

    #[test]
    fn test_equality_is_structural() {
        let mut a = Track::new();
        let mut b = Track::with_georeferencing(Arc::new(WebMercator));
        for track in [&mut a, &mut b] {
            track.append_waypoint(point(52.5, 13.4).with_name("Start"));
            track.append_track_point(point(1.0, 2.0).with_elevation(3.0));
            track.finish_current_segment();
            track.append_track_point(point(4.0, 5.0));
        }
        assert_eq!(a, b);

        b.append_waypoint(point(0.0, 0.0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_segment_boundaries_matter_for_equality() {
        let mut a = Track::new();
        a.append_track_point(point(1.0, 2.0));
        a.append_track_point(point(3.0, 4.0));

        let mut b = Track::new();
        b.append_track_point(point(1.0, 2.0));
        b.finish_current_segment();
        b.append_track_point(point(3.0, 4.0));

        assert_ne!(a, b);
    }

    #[test]
    fn test_waypoint_name() {
        let mut track = Track::new();
        track.append_waypoint(point(52.5, 13.4).with_name("Start"));
        track.append_waypoint(point(52.6, 13.5));
        assert_eq!(track.waypoint_name(0), Some("Start"));
        assert_eq!(track.waypoint_name(1), None);
    }

    #[test]
    #[should_panic(expected = "segment index 0 out of range")]
    fn test_segment_index_out_of_range() {
        Track::new().segment_point_count(0);
    }

    #[test]
    #[should_panic(expected = "point index 1 out of range")]
    fn test_point_index_out_of_range() {
        let mut track = Track::new();
        track.append_track_point(point(1.0, 2.0));
        track.segment_point(0, 1);
    }

    #[test]
    #[should_panic(expected = "waypoint index 0 out of range")]
    fn test_waypoint_index_out_of_range() {
        Track::new().waypoint(0);
    }

    #[test]
    fn test_average_position() {
        let mut track = Track::new();
        assert_eq!(track.calc_average_position(), None);

        track.append_track_point(point(10.0, 20.0));
        track.append_track_point(point(20.0, 30.0));
        track.append_waypoint(point(30.0, 40.0));

        let avg = track.calc_average_position().unwrap();
        assert!((avg.latitude - 20.0).abs() < 1e-12);
        assert!((avg.longitude - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_append_projects_points() {
        let mut track = Track::with_georeferencing(Arc::new(Offset(10.0)));
        track.append_track_point(point(1.0, 2.0));
        track.append_waypoint(point(3.0, 4.0));

        assert_eq!(track.segment_point(0, 0).local, Some(MapCoord::new(12.0, 11.0)));
        assert_eq!(track.waypoint(0).local, Some(MapCoord::new(14.0, 13.0)));
    }

    #[test]
    fn test_change_georeferencing_reprojects_everything() {
        let mut track = Track::new();
        track.append_track_point(point(1.0, 2.0));
        track.finish_current_segment();
        track.append_track_point(point(5.0, 6.0));
        track.append_waypoint(point(3.0, 4.0));
        assert!(track.segment_point(0, 0).local.is_none());

        let before: Vec<LatLon> = track
            .segments()
            .iter()
            .flatten()
            .chain(track.waypoints())
            .map(|p| p.position)
            .collect();

        track.change_map_georeferencing(Some(Arc::new(Offset(100.0))));
        assert_eq!(track.segment_point(0, 0).local, Some(MapCoord::new(102.0, 101.0)));
        assert_eq!(track.segment_point(1, 0).local, Some(MapCoord::new(106.0, 105.0)));
        assert_eq!(track.waypoint(0).local, Some(MapCoord::new(104.0, 103.0)));
        assert_eq!(track.crs_spec(), "offset 100");

        let after: Vec<LatLon> = track
            .segments()
            .iter()
            .flatten()
            .chain(track.waypoints())
            .map(|p| p.position)
            .collect();
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.latitude.to_bits(), b.latitude.to_bits());
            assert_eq!(a.longitude.to_bits(), b.longitude.to_bits());
        }

        track.change_map_georeferencing(None);
        assert!(track.waypoint(0).local.is_none());
        assert_eq!(track.crs_spec(), GEOGRAPHIC_CRS_SPEC);
    }

    #[test]
    fn test_unsupported_extension() {
        let mut track = Track::new();
        let err = track.load_from("track.kml").unwrap_err();
        assert!(matches!(err, TrackError::UnsupportedFormat(_)));
    }
}
