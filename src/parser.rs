use crate::error::{ResolveError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::from_utf8;

/// One parsed ad-serving XML document, before extraction.
///
/// This is the raw per-document shape the element extractors read; nothing
/// here accumulates across wrapper hops.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedDocument {
    /// The declared document version, empty when absent
    pub version: String,

    /// Document-level error pixels (present on no-ad responses)
    pub error_urls: Vec<String>,

    /// The Ad elements within the document
    pub ads: Vec<ParsedAd>,
}

/// A single Ad element, inline or wrapper
#[derive(Debug, Default, PartialEq)]
pub struct ParsedAd {
    /// Impression tracking URLs
    pub impressions: Vec<String>,

    /// Error tracking URLs
    pub error_urls: Vec<String>,

    /// Linear creatives carrying media files and trackers
    pub linears: Vec<ParsedLinear>,

    /// Present when the ad is a wrapper referencing the next document
    pub wrapper_uri: Option<String>,
}

/// A linear creative
#[derive(Debug, Default, PartialEq)]
pub struct ParsedLinear {
    pub media_files: Vec<ParsedMediaFile>,
    pub ad_parameters: Option<String>,
    pub click_through: Option<String>,

    /// (event name, tracker URL) pairs in declaration order
    pub tracking: Vec<(String, String)>,
}

/// A media file as declared, optional attributes left unresolved
#[derive(Debug, Default, PartialEq)]
pub struct ParsedMediaFile {
    pub url: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u32>,
    pub api_framework: Option<String>,
}

/// Parse one ad-serving XML document into its raw tree.
///
/// Fails with [`ResolveError::MalformedDocument`] when the input is not
/// well-formed XML or the VAST root element is absent or unexpected.
pub fn parse_document(xml: &str) -> Result<ParsedDocument> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    // Look for the VAST root element
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"VAST" => {
                let version = attribute_value(e, b"version").unwrap_or_default();
                return parse_vast_body(&mut reader, version);
            }
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                return Err(ResolveError::MalformedDocument(format!(
                    "unexpected root element <{name}>"
                )));
            }
            Ok(Event::Eof) => {
                return Err(ResolveError::MalformedDocument(
                    "missing VAST root element".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }
}

/// Parse the children of the VAST root
fn parse_vast_body(reader: &mut Reader<&[u8]>, version: String) -> Result<ParsedDocument> {
    let mut doc = ParsedDocument {
        version,
        ..Default::default()
    };

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Ad" => {
                    let ad = parse_ad(reader)?;
                    doc.ads.push(ad);
                }
                b"Error" => {
                    doc.error_urls.push(read_text_element(reader)?);
                }
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"VAST" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(doc)
}

/// Parse a single Ad element, covering both InLine and Wrapper forms
fn parse_ad(reader: &mut Reader<&[u8]>) -> Result<ParsedAd> {
    let mut ad = ParsedAd::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                // InLine and Wrapper share their child vocabulary apart from
                // VASTAdTagURI, so one body loop handles both
                b"InLine" => parse_ad_unit(reader, b"InLine", &mut ad)?,
                b"Wrapper" => parse_ad_unit(reader, b"Wrapper", &mut ad)?,
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Ad" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(ad)
}

/// Parse the body shared by InLine and Wrapper elements
fn parse_ad_unit(reader: &mut Reader<&[u8]>, end_tag: &[u8], ad: &mut ParsedAd) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Impression" => ad.impressions.push(read_text_element(reader)?),
                b"Error" => ad.error_urls.push(read_text_element(reader)?),
                b"VASTAdTagURI" => ad.wrapper_uri = Some(read_text_element(reader)?),
                b"Creatives" => parse_creatives(reader, &mut ad.linears)?,
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == end_tag => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse a Creatives element, collecting every Linear creative
fn parse_creatives(reader: &mut Reader<&[u8]>, linears: &mut Vec<ParsedLinear>) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                // Descend through Creative to its payload
                b"Creative" => (),
                b"Linear" => linears.push(parse_linear(reader)?),
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Creatives" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse a Linear element
fn parse_linear(reader: &mut Reader<&[u8]>) -> Result<ParsedLinear> {
    let mut linear = ParsedLinear::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"MediaFiles" => parse_media_files(reader, &mut linear.media_files)?,
                b"TrackingEvents" => parse_tracking_events(reader, &mut linear.tracking)?,
                b"VideoClicks" => parse_video_clicks(reader, &mut linear)?,
                b"AdParameters" => linear.ad_parameters = Some(read_text_element(reader)?),
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Linear" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(linear)
}

/// Parse a MediaFiles element
fn parse_media_files(reader: &mut Reader<&[u8]>, files: &mut Vec<ParsedMediaFile>) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"MediaFile" => {
                    let file = parse_media_file(reader, e)?;
                    files.push(file);
                }
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"MediaFiles" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse one MediaFile element
fn parse_media_file(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<ParsedMediaFile> {
    let mut file = ParsedMediaFile {
        url: String::new(),
        mime_type: attribute_value(start, b"type").unwrap_or_default(),
        width: attribute_value(start, b"width").and_then(|v| v.parse().ok()),
        height: attribute_value(start, b"height").and_then(|v| v.parse().ok()),
        bitrate: attribute_value(start, b"bitrate").and_then(|v| v.parse().ok()),
        api_framework: attribute_value(start, b"apiFramework"),
    };

    file.url = read_text_element(reader)?;

    Ok(file)
}

/// Parse a VideoClicks element, keeping only the click-through URL
fn parse_video_clicks(reader: &mut Reader<&[u8]>, linear: &mut ParsedLinear) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"ClickThrough" => linear.click_through = Some(read_text_element(reader)?),
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"VideoClicks" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse a TrackingEvents element
fn parse_tracking_events(
    reader: &mut Reader<&[u8]>,
    tracking: &mut Vec<(String, String)>,
) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Tracking" => {
                    let event = attribute_value(e, b"event").unwrap_or_default();
                    let url = read_text_element(reader)?;
                    if !event.is_empty() && !url.is_empty() {
                        tracking.push((event, url));
                    }
                }
                _ => skip_element(reader)?,
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"TrackingEvents" => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Read one attribute of an element as an owned string
fn attribute_value(start: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in start.attributes().flatten() {
        if attr.key.as_ref() == key {
            if let Ok(value) = from_utf8(&attr.value) {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Read the text or CDATA content of the current element up to its end tag
fn read_text_element(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(e)) => {
                text = e.unescape()?.into_owned();
            }
            Ok(Event::CData(e)) => {
                if let Ok(value) = from_utf8(&e) {
                    text = value.to_string();
                }
            }
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}

/// Skip the element whose Start event the caller just consumed,
/// including all of its children
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
    let mut depth = 1usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(e.into()),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

fn truncated() -> ResolveError {
    ResolveError::MalformedDocument("unexpected end of document".to_string())
}
