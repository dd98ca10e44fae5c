pub mod converter;
pub mod error;
pub mod georef;
pub mod options;
pub mod parser;
pub mod track;
pub mod track_point;
pub mod writer;

use wasm_bindgen::prelude::*;

pub use crate::error::TrackError;
pub use crate::georef::{GEOGRAPHIC_CRS_SPEC, Georeferencing, WebMercator};
pub use crate::options::{ConvertOptions, CoordinatePolicy, DecodeOptions, GpxElementType};
pub use crate::track::{SharedGeoreferencing, Track, TrackSegment};
pub use crate::track_point::{LatLon, MapCoord, TrackPoint};

/// Convert GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let track = parser::parse_gpx(gpx_string, &opts.decode)?;
    let fc = converter::to_feature_collection(&track, &opts);
    serde_wasm_bindgen::to_value(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let track = parser::parse_gpx(gpx_string, &opts.decode)?;
    let fc = converter::to_feature_collection(&track, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Decode a GPX string and encode it again as plain GPX 1.1.
#[wasm_bindgen(js_name = normalizeGpx)]
pub fn normalize_gpx(gpx_string: &str) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let track = parser::parse_gpx(gpx_string, &DecodeOptions::default())?;
    Ok(writer::to_gpx_string(&track)?)
}

/// Average position of all points as `[lat, lon]`, or `null` for an empty track.
#[wasm_bindgen(js_name = gpxAveragePosition)]
pub fn gpx_average_position(gpx_string: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let track = parser::parse_gpx(gpx_string, &DecodeOptions::default())?;
    Ok(match track.calc_average_position() {
        Some(avg) => js_sys::Array::of2(&avg.latitude.into(), &avg.longitude.into()).into(),
        None => JsValue::NULL,
    })
}

fn parse_options(options: JsValue) -> Result<ConvertOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ConvertOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
