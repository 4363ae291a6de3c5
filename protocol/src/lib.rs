//! Wire-level types for the metasearch broker protocol.
//!
//! This crate is pure data and parsing: the command descriptor built from an
//! inbound query string, the broker's error envelope, and the small XML
//! helpers the engine needs to read broker responses. Nothing here performs
//! I/O; the HTTP side lives in `pansearch-core`.

pub mod command;
pub mod envelope;
pub mod verb;
pub mod wire;

pub use command::Command;
pub use envelope::ErrorEnvelope;
pub use verb::Verb;
