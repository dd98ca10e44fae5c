use std::io::Write;

use chrono::SecondsFormat;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::TrackError;
use crate::track::Track;
use crate::track_point::TrackPoint;

type Result<T> = std::result::Result<T, TrackError>;

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const CREATOR: &str = "gpx-track";

/// Write a track as a GPX 1.1 document.
///
/// Waypoints come first, followed by a single <trk> holding one <trkseg> per
/// segment.
pub fn write_gpx(track: &Track, out: impl Write) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute(("creator", CREATOR));
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    writer.write_event(Event::Start(root))?;

    for waypoint in track.waypoints() {
        write_point(&mut writer, "wpt", waypoint)?;
    }

    writer.write_event(Event::Start(BytesStart::new("trk")))?;
    for segment in track.segments() {
        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
        for point in segment {
            write_point(&mut writer, "trkpt", point)?;
        }
        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("trk")))?;

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

/// Write a track as a GPX 1.1 document into a string.
pub fn to_gpx_string(track: &Track) -> Result<String> {
    let mut out = Vec::new();
    write_gpx(track, &mut out)?;
    String::from_utf8(out).map_err(|e| TrackError::MalformedDocument(e.to_string()))
}

/// Children follow the `wptType` sequence: ele, time, name, hdop.
fn write_point<W: Write>(
    writer: &mut Writer<W>,
    element: &'static str,
    point: &TrackPoint,
) -> Result<()> {
    let lat = coordinate(point.position.latitude, element, "lat")?;
    let lon = coordinate(point.position.longitude, element, "lon")?;

    let mut start = BytesStart::new(element);
    start.push_attribute(("lat", lat.as_str()));
    start.push_attribute(("lon", lon.as_str()));
    writer.write_event(Event::Start(start))?;

    if let Some(ele) = point.elevation() {
        write_text_element(writer, "ele", &ele.to_string())?;
    }
    if let Some(time) = point.time {
        let time = time.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        write_text_element(writer, "time", &time)?;
    }
    if let Some(name) = &point.name {
        write_text_element(writer, "name", name)?;
    }
    if let Some(hdop) = point.hdop() {
        write_text_element(writer, "hdop", &hdop.to_string())?;
    }

    writer.write_event(Event::End(BytesEnd::new(element)))?;
    Ok(())
}

/// Non-finite coordinates could not be read back.
fn coordinate(value: f64, element: &'static str, attribute: &'static str) -> Result<String> {
    if value.is_finite() {
        Ok(value.to_string())
    } else {
        Err(TrackError::InvalidAttribute {
            element,
            attribute,
            value: value.to_string(),
        })
    }
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
