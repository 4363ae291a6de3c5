//! Error taxonomy for the engine.
//!
//! Transport, malformed-output, and configuration failures are fatal and
//! propagate to the embedding layer. Broker application errors travel as
//! [`EngineError::Broker`]; the engine recovers locally from the two
//! retryable codes (session dead, record missing) and renders everything
//! else into the response sink as a 417 body instead of returning an error.

use pansearch_protocol::ErrorEnvelope;
use pansearch_protocol::wire::ParseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Network or HTTP-protocol failure talking to the broker or registry.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The broker answered with a status that is neither 200 nor 417.
    #[error("unexpected broker status {status}")]
    UnexpectedStatus { status: u16, body: String },

    /// Application-level broker error (HTTP 417 with an error envelope).
    #[error("{0}")]
    Broker(ErrorEnvelope),

    /// The broker answered 200 (or 417) with a body this client cannot read.
    #[error("malformed broker output: {0}")]
    MalformedResponse(#[from] ParseError),

    /// Missing mandatory parameter, ambiguous engine mode, unreachable
    /// registry, or an empty registry result set. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Failure writing to the caller's response sink.
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The broker reported the session dead (code 1).
    pub fn is_session_dead(&self) -> bool {
        matches!(self, EngineError::Broker(env) if env.is_session_dead())
    }

    /// The broker reported the requested record missing (code 7).
    pub fn is_record_missing(&self) -> bool {
        matches!(self, EngineError::Broker(env) if env.is_record_missing())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }
}
