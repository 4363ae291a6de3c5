//! Helpers for reading broker response bodies.

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Synthetic body returned for a de-duplicated search (the broker is never
/// contacted, so the engine fabricates the OK status itself).
pub const SEARCH_OK: &str = "<search><status>OK</status></search>";

/// Failure to read a broker response body. Malformed broker output is always
/// fatal (never retried), so these surface unchanged to the engine.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed broker response: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("broker response is missing <{0}>")]
    MissingElement(String),

    #[error("broker response has a non-numeric <{element}> value: {value}")]
    BadNumber { element: String, value: String },
}

/// Whether a response content type should be treated as XML by the results
/// cache. The broker reports variations like `text/xml` and
/// `application/xml; charset=UTF-8`.
pub fn looks_like_xml(content_type: &str) -> bool {
    content_type.contains("xml")
}

/// True when the body parses as XML end to end. The results cache refuses to
/// store anything that does not.
pub fn is_well_formed(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

/// First `<session>` value of an init response.
pub fn session_id(init_xml: &str) -> Result<String, ParseError> {
    text_of(init_xml, "session")?
        .ok_or_else(|| ParseError::MissingElement("session".to_string()))
}

/// First `<activeclients>` value of a show response. The missing-record
/// retry loop keeps going only while this is non-zero.
pub fn parse_active_clients(show_xml: &str) -> Result<u32, ParseError> {
    let raw = text_of(show_xml, "activeclients")?
        .ok_or_else(|| ParseError::MissingElement("activeclients".to_string()))?;
    raw.trim().parse().map_err(|_| ParseError::BadNumber {
        element: "activeclients".to_string(),
        value: raw,
    })
}

/// Select the single `<hit>` of a show response whose `<recid>` equals
/// `recid`, re-labeled as a standalone `<record>` fragment. `None` when zero
/// or more than one hit matches.
pub fn extract_hit(show_xml: &str, recid: &str) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_str(show_xml);
    let mut matches: Vec<String> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"hit" => {
                let inner = reader.read_text(e.name())?.into_owned();
                if text_of(&inner, "recid")?.as_deref() == Some(recid) {
                    matches.push(inner);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if matches.len() == 1 {
        let inner = matches.remove(0);
        Ok(Some(format!("<record>{inner}</record>")))
    } else {
        Ok(None)
    }
}

/// Trimmed text content of the first `<element>` in `xml`, if present.
fn text_of(xml: &str, element: &str) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == element.as_bytes() => inside = true,
            Event::Text(t) if inside => return Ok(Some(t.unescape()?.into_owned())),
            Event::End(e) if e.name().as_ref() == element.as_bytes() => {
                // Empty element: treat as present but blank.
                return Ok(Some(String::new()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
