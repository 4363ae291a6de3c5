//! Response sinks.
//!
//! The engine writes the broker's (possibly re-wrapped) response body to a
//! caller-supplied sink. Buffered sinks additionally allow the engine to
//! cache the body; direct-streaming sinks are never cached, a documented
//! limitation rather than an error.

use std::io::{self, Write};

/// Where a command's response body goes.
pub trait ResponseSink {
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Whether the sink holds the full body in memory. Only buffered sinks
    /// participate in result caching.
    fn is_buffered(&self) -> bool;
}

/// Vec-backed sink. The normal case: the embedding layer hands the body on
/// after the call returns.
#[derive(Debug, Default)]
pub struct BufferedSink {
    buf: Vec<u8>,
}

impl BufferedSink {
    pub fn new() -> Self {
        BufferedSink::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl ResponseSink for BufferedSink {
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    fn is_buffered(&self) -> bool {
        true
    }
}

/// Pass-through sink over any writer. Responses routed here bypass the
/// results cache.
pub struct StreamingSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamingSink<W> {
    pub fn new(writer: W) -> Self {
        StreamingSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResponseSink for StreamingSink<W> {
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)
    }

    fn is_buffered(&self) -> bool {
        false
    }
}
