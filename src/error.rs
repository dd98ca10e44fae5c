use std::path::PathBuf;

use thiserror::Error;
use wasm_bindgen::JsValue;

/// Errors raised while loading or saving a track.
///
/// Malformed optional fields (`ele`, `time`, `hdop`) never surface here; they
/// are dropped with a warning and decoding continues.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed GPX document: {0}")]
    MalformedDocument(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("Unsupported track file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

impl TrackError {
    /// Whether the error is about a point lacking a usable `lat`/`lon`.
    pub fn is_missing_coordinate(&self) -> bool {
        matches!(
            self,
            Self::MissingAttribute { .. } | Self::InvalidAttribute { .. }
        )
    }
}

impl From<quick_xml::events::attributes::AttrError> for TrackError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}

impl From<TrackError> for JsValue {
    fn from(e: TrackError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
