//! The broker's application-level error envelope.
//!
//! A transport status of 417 always carries an
//! `<error code="N" msg="...">detail</error>` body. Code 1 means the broker
//! session is dead and must be reinitialized; code 7 means a requested
//! record is missing from the current result set. Everything else is a
//! generic application error rendered back to the caller.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};

use crate::wire::ParseError;

/// Session dead / init required.
pub const CODE_SESSION_DEAD: i32 = 1;
/// Requested record missing from the current result set.
pub const CODE_RECORD_MISSING: i32 = 7;

/// Parsed broker error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub short_message: String,
    pub detail: String,
}

impl ErrorEnvelope {
    /// Parse a 417 response body. Unparseable input is an error: a broker
    /// that answers 417 without a well-formed envelope is emitting malformed
    /// output, which is fatal.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut envelope: Option<ErrorEnvelope> = None;
        let mut in_error = false;
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"error" => {
                    let mut code: Option<i32> = None;
                    let mut msg = String::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        let value = attr.unescape_value()?;
                        match attr.key.as_ref() {
                            b"code" => code = value.parse().ok(),
                            b"msg" => msg = value.into_owned(),
                            _ => {}
                        }
                    }
                    let code = code.ok_or_else(|| {
                        ParseError::MissingElement("error/@code".to_string())
                    })?;
                    envelope = Some(ErrorEnvelope {
                        code,
                        short_message: msg,
                        detail: String::new(),
                    });
                    in_error = true;
                }
                Event::Text(t) if in_error => {
                    if let Some(env) = envelope.as_mut() {
                        env.detail = t.unescape()?.into_owned();
                    }
                }
                Event::End(e) if e.name().as_ref() == b"error" => in_error = false,
                Event::Eof => break,
                _ => {}
            }
        }
        envelope.ok_or_else(|| ParseError::MissingElement("error".to_string()))
    }

    pub fn is_session_dead(&self) -> bool {
        self.code == CODE_SESSION_DEAD
    }

    pub fn is_record_missing(&self) -> bool {
        self.code == CODE_RECORD_MISSING
    }

    /// Re-render the envelope for a 417 response body.
    pub fn to_xml(&self) -> String {
        let mut writer = quick_xml::Writer::new(Vec::new());
        let mut el = BytesStart::new("error");
        el.push_attribute(("code", self.code.to_string().as_str()));
        el.push_attribute(("msg", self.short_message.as_str()));
        // The writer only fails on I/O and Vec<u8> cannot.
        let _ = writer.write_event(Event::Start(el));
        let _ = writer.write_event(Event::Text(BytesText::new(&self.detail)));
        let _ = writer.write_event(Event::End(quick_xml::events::BytesEnd::new("error")));
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "broker error {} ({}): {}",
            self.code, self.short_message, self.detail
        )
    }
}
