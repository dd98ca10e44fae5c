use serde::Deserialize;

/// Options for decoding GPX into a track.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeOptions {
    /// What to do with points lacking a parseable lat/lon (default: strict)
    #[serde(default)]
    pub coordinate_policy: CoordinatePolicy,

    /// Import each <rte> as one track segment (default: false)
    #[serde(default)]
    pub import_routes: bool,

    /// Compute local coordinates while decoding (default: true)
    #[serde(default = "default_true")]
    pub project_points: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            coordinate_policy: CoordinatePolicy::default(),
            import_routes: false,
            project_points: true,
        }
    }
}

/// Handling of point elements without usable coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoordinatePolicy {
    /// Fail the whole document.
    #[default]
    Strict,
    /// Drop the point and keep decoding.
    SkipPoint,
}

/// Options for track to GeoJSON conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Include elevation as the 3rd coordinate value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Include point metadata (name, ele, time, hdop) in properties (default: true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Which element types to convert (default: all)
    #[serde(default)]
    pub types: Option<Vec<GpxElementType>>,

    /// Join track segments into a single MultiLineString (default: false)
    #[serde(default)]
    pub join_track_segments: bool,

    /// Decoding options used by the wasm entry points
    #[serde(default)]
    pub decode: DecodeOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_elevation: true,
            include_time: true,
            include_metadata: true,
            types: None,
            join_track_segments: false,
            decode: DecodeOptions::default(),
        }
    }
}

impl ConvertOptions {
    pub fn should_include(&self, element_type: GpxElementType) -> bool {
        match &self.types {
            None => true,
            Some(types) => types.contains(&element_type),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpxElementType {
    Waypoint,
    Track,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_options_defaults() {
        let opts: DecodeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.coordinate_policy, CoordinatePolicy::Strict);
        assert!(!opts.import_routes);
        assert!(opts.project_points);
    }

    #[test]
    fn test_decode_options_camel_case() {
        let opts: DecodeOptions = serde_json::from_str(
            r#"{"coordinatePolicy":"skipPoint","importRoutes":true,"projectPoints":false}"#,
        )
        .unwrap();
        assert_eq!(opts.coordinate_policy, CoordinatePolicy::SkipPoint);
        assert!(opts.import_routes);
        assert!(!opts.project_points);
    }

    #[test]
    fn test_convert_options_nested_decode() {
        let opts: ConvertOptions = serde_json::from_str(
            r#"{"types":["waypoint"],"decode":{"importRoutes":true}}"#,
        )
        .unwrap();
        assert!(opts.should_include(GpxElementType::Waypoint));
        assert!(!opts.should_include(GpxElementType::Track));
        assert!(opts.decode.import_routes);
        assert!(opts.include_elevation);
    }
}
