use chrono::SecondsFormat;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::options::{ConvertOptions, GpxElementType};
use crate::track::{Track, TrackSegment};
use crate::track_point::TrackPoint;

/// Convert a track to a GeoJSON FeatureCollection.
///
/// Waypoints become Point features. Segments become LineString features in
/// track order, each tagged with its `segmentIndex`; single-point segments
/// become Point features. With `join_track_segments`, the multi-point
/// segments form one MultiLineString placed where the first of them was.
pub fn to_feature_collection(track: &Track, opts: &ConvertOptions) -> FeatureCollection {
    let mut features = Vec::new();

    if opts.should_include(GpxElementType::Waypoint) {
        for wpt in track.waypoints() {
            features.push(point_feature(wpt, "waypoint", opts));
        }
    }

    if opts.should_include(GpxElementType::Track) {
        features.extend(track_to_features(track.segments(), opts));
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn track_to_features(segments: &[TrackSegment], opts: &ConvertOptions) -> Vec<Feature> {
    let line_count = segments.iter().filter(|s| s.len() >= 2).count();
    let join = opts.join_track_segments && line_count > 1;

    let mut features = Vec::new();
    // Position of the joined MultiLineString among the emitted features
    let mut joined_at: Option<usize> = None;
    let mut joined_lines = Vec::new();
    let mut joined_times = Vec::new();
    let mut joined_has_time = false;

    for (index, seg) in segments.iter().enumerate() {
        match seg.as_slice() {
            [] => {}
            [pt] => {
                let mut f = point_feature(pt, "track", opts);
                if let Some(props) = f.properties.as_mut() {
                    insert_segment_index(props, index);
                }
                features.push(f);
            }
            points if join => {
                joined_at.get_or_insert(features.len());
                joined_lines.push(line_coords(points, opts.include_elevation));
                joined_times.push(JsonValue::Array(times(points)));
                joined_has_time |= has_time(points);
            }
            points => {
                let mut props = track_props();
                insert_segment_index(&mut props, index);
                if opts.include_time && has_time(points) {
                    insert_coordinate_times(&mut props, JsonValue::Array(times(points)));
                }

                let coords = line_coords(points, opts.include_elevation);
                features.push(feature(Value::LineString(coords), props));
            }
        }
    }

    if let Some(at) = joined_at {
        let mut props = track_props();
        if opts.include_time && joined_has_time {
            insert_coordinate_times(&mut props, JsonValue::Array(joined_times));
        }
        features.insert(at, feature(Value::MultiLineString(joined_lines), props));
    }

    features
}

fn point_feature(pt: &TrackPoint, gpx_type: &str, opts: &ConvertOptions) -> Feature {
    let coords = point_coords(pt, opts.include_elevation);

    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String(gpx_type.to_string()),
    );

    if opts.include_metadata {
        insert_point_metadata(&mut props, pt);
    }

    feature(Value::Point(coords), props)
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn track_props() -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("track".to_string()),
    );
    props
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &TrackPoint, include_elevation: bool) -> Vec<f64> {
    let lat = pt.position.latitude;
    let lon = pt.position.longitude;
    match (include_elevation, pt.elevation()) {
        (true, Some(ele)) => vec![lon, lat, f64::from(ele)],
        _ => vec![lon, lat],
    }
}

fn line_coords(seg: &[TrackPoint], include_elevation: bool) -> Vec<Vec<f64>> {
    seg.iter()
        .map(|pt| point_coords(pt, include_elevation))
        .collect()
}

fn format_time(pt: &TrackPoint) -> Option<String> {
    pt.time
        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn insert_point_metadata(props: &mut Map<String, JsonValue>, pt: &TrackPoint) {
    if let Some(name) = &pt.name {
        props.insert("name".to_string(), JsonValue::String(name.clone()));
    }
    insert_number(props, "ele", pt.elevation());
    if let Some(time) = format_time(pt) {
        props.insert("time".to_string(), JsonValue::String(time));
    }
    insert_number(props, "hdop", pt.hdop());
}

fn insert_number(props: &mut Map<String, JsonValue>, key: &str, value: Option<f32>) {
    if let Some(n) = value.and_then(|v| serde_json::Number::from_f64(f64::from(v))) {
        props.insert(key.to_string(), JsonValue::Number(n));
    }
}

fn insert_segment_index(props: &mut Map<String, JsonValue>, index: usize) {
    props.insert("segmentIndex".to_string(), JsonValue::Number(index.into()));
}

fn has_time(seg: &[TrackPoint]) -> bool {
    seg.iter().any(|pt| pt.time.is_some())
}

fn times(seg: &[TrackPoint]) -> Vec<JsonValue> {
    seg.iter()
        .map(|pt| match format_time(pt) {
            Some(t) => JsonValue::String(t),
            None => JsonValue::Null,
        })
        .collect()
}

fn insert_coordinate_times(props: &mut Map<String, JsonValue>, times: JsonValue) {
    let mut coord_props = Map::new();
    coord_props.insert("times".to_string(), times);
    props.insert(
        "coordinateProperties".to_string(),
        JsonValue::Object(coord_props),
    );
}
