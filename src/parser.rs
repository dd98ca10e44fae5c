use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::error::TrackError;
use crate::options::{CoordinatePolicy, DecodeOptions};
use crate::track::Track;
use crate::track_point::{LatLon, TrackPoint};

type Result<T> = std::result::Result<T, TrackError>;

/// Parse a GPX XML string into a new track without georeferencing.
///
/// Waypoints become the track's waypoints, every non-empty `<trkseg>` one
/// segment.
pub fn parse_gpx(xml: &str, opts: &DecodeOptions) -> Result<Track> {
    let mut reader = Reader::from_str(xml);
    let mut track = Track::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                expect_root(&e)?;
                parse_gpx_content(&mut reader, &mut track, opts)?;
                break;
            }
            Event::Empty(e) => {
                expect_root(&e)?;
                break;
            }
            Event::Eof => {
                return Err(TrackError::MalformedDocument(
                    "missing <gpx> root element".to_string(),
                ));
            }
            _ => {}
        }
    }

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Err(TrackError::MalformedDocument(format!(
                    "unexpected <{}> after the root element",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(track)
}

fn expect_root(e: &BytesStart<'_>) -> Result<()> {
    if e.local_name().as_ref() == b"gpx" {
        Ok(())
    } else {
        Err(TrackError::MalformedDocument(format!(
            "root element is <{}>, expected <gpx>",
            String::from_utf8_lossy(e.name().as_ref())
        )))
    }
}

fn unexpected_eof(element: &str) -> TrackError {
    TrackError::MalformedDocument(format!("unexpected end of document inside <{element}>"))
}

/// Parse the children of <gpx>.
fn parse_gpx_content<'a>(
    reader: &mut Reader<&'a [u8]>,
    track: &mut Track,
    opts: &DecodeOptions,
) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"wpt" => {
                    if let Some(pt) = parse_point(&e, reader, "wpt", opts)? {
                        track.append_waypoint(pt);
                    }
                }
                b"trk" => parse_track(reader, track, opts)?,
                b"rte" if opts.import_routes => parse_route(reader, track, opts)?,
                _ => {
                    // Skip metadata, routes, extensions
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"wpt" => {
                    if let Some(latlon) = locate(&e, "wpt", opts)? {
                        track.append_waypoint(TrackPoint::new(latlon));
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"gpx" => break,
            Event::Eof => return Err(unexpected_eof("gpx")),
            _ => {}
        }
    }

    Ok(())
}

/// Parse a <trk> element.
fn parse_track<'a>(
    reader: &mut Reader<&'a [u8]>,
    track: &mut Track,
    opts: &DecodeOptions,
) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkseg" => parse_segment(reader, track, opts)?,
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"trk" => break,
            Event::Eof => return Err(unexpected_eof("trk")),
            _ => {}
        }
    }

    Ok(())
}

/// Parse a <trkseg> element into a segment of its own.
fn parse_segment<'a>(
    reader: &mut Reader<&'a [u8]>,
    track: &mut Track,
    opts: &DecodeOptions,
) -> Result<()> {
    track.finish_current_segment();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => {
                    if let Some(pt) = parse_point(&e, reader, "trkpt", opts)? {
                        track.append_track_point(pt);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    if let Some(latlon) = locate(&e, "trkpt", opts)? {
                        track.append_track_point(TrackPoint::new(latlon));
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"trkseg" => break,
            Event::Eof => return Err(unexpected_eof("trkseg")),
            _ => {}
        }
    }

    track.finish_current_segment();
    Ok(())
}

/// Parse a <rte> element into a segment of its own.
fn parse_route<'a>(
    reader: &mut Reader<&'a [u8]>,
    track: &mut Track,
    opts: &DecodeOptions,
) -> Result<()> {
    track.finish_current_segment();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"rtept" => {
                    if let Some(pt) = parse_point(&e, reader, "rtept", opts)? {
                        track.append_track_point(pt);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"rtept" {
                    if let Some(latlon) = locate(&e, "rtept", opts)? {
                        track.append_track_point(TrackPoint::new(latlon));
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"rte" => break,
            Event::Eof => return Err(unexpected_eof("rte")),
            _ => {}
        }
    }

    track.finish_current_segment();
    Ok(())
}

/// Reads lat/lon, applying the coordinate policy.
///
/// `Ok(None)` means the point is to be skipped.
fn locate(
    e: &BytesStart<'_>,
    element: &'static str,
    opts: &DecodeOptions,
) -> Result<Option<LatLon>> {
    match parse_lat_lon(e, element) {
        Ok(latlon) => Ok(Some(latlon)),
        Err(err)
            if err.is_missing_coordinate()
                && opts.coordinate_policy == CoordinatePolicy::SkipPoint =>
        {
            warn!("Skipping point: {err}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>, element: &'static str) -> Result<LatLon> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result?;
        let attribute = match attr.key.local_name().as_ref() {
            b"lat" => "lat",
            b"lon" => "lon",
            _ => continue,
        };
        let value = parse_coordinate(&attr.value, element, attribute)?;
        if attribute == "lat" {
            lat = Some(value);
        } else {
            lon = Some(value);
        }
    }

    let lat = lat.ok_or(TrackError::MissingAttribute {
        element,
        attribute: "lat",
    })?;
    let lon = lon.ok_or(TrackError::MissingAttribute {
        element,
        attribute: "lon",
    })?;

    Ok(LatLon::new(lat, lon))
}

/// Parse a raw attribute value, resolving character and entity references.
fn parse_coordinate(raw: &[u8], element: &'static str, attribute: &'static str) -> Result<f64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|val| unescape(val).ok())
        .and_then(|val| val.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrackError::InvalidAttribute {
            element,
            attribute,
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Parse a point element (wpt, trkpt, rtept) and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    element: &'static str,
    opts: &DecodeOptions,
) -> Result<Option<TrackPoint>> {
    let Some(latlon) = locate(start, element, opts)? else {
        reader.read_to_end(start.name())?;
        return Ok(None);
    };

    let mut point = TrackPoint::new(latlon);
    let end_name = start.name().0.to_vec(); // own the end tag name for comparison

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => {
                    let text = read_text_owned(reader, &e)?;
                    point.elevation = parse_optional_number(&text, "ele", |v| v.is_finite());
                }
                b"time" => {
                    let text = read_text_owned(reader, &e)?;
                    point.time = parse_time(&text);
                }
                b"hdop" => {
                    let text = read_text_owned(reader, &e)?;
                    point.hdop =
                        parse_optional_number(&text, "hdop", |v| v.is_finite() && *v >= 0.0);
                }
                b"name" => {
                    point.name = Some(read_text_owned(reader, &e)?);
                }
                _ => {
                    // Skip unknown/extensions elements
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => return Err(unexpected_eof(element)),
            _ => {}
        }
    }

    Ok(Some(point))
}

/// Malformed values count as absent.
fn parse_optional_number(text: &str, element: &str, valid: impl Fn(&f32) -> bool) -> Option<f32> {
    let value = text.trim().parse::<f32>().ok().filter(valid);
    if value.is_none() {
        warn!("Ignoring malformed <{element}> value '{}'", text.trim());
    }
    value
}

/// Parse an ISO 8601 instant. A missing zone designator means UTC.
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let time = DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc()))
        .ok();
    if time.is_none() {
        warn!("Ignoring malformed <time> value '{text}'");
    }
    time
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let raw = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(raw);
            }
            Event::CData(e) => {
                let s = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                text.push_str(s);
            }
            Event::GeneralRef(e) => {
                // Character references (&#60; &#x3C;) and predefined entities
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    let name = std::str::from_utf8(e.as_ref()).unwrap_or_default();
                    match name {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {} // Unknown entity, skip
                    }
                }
            }
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => return Err(unexpected_eof("text element")),
            _ => {}
        }
    }

    Ok(text)
}
