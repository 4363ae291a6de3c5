//! Root of the `pansearch-core` library.
//!
//! A protocol-translating client for a metasearch broker. One [`Engine`]
//! owns one broker session on behalf of one end-user session: it translates
//! inbound commands into broker requests, recovers transparently from
//! session death and mid-pagination record loss, and assembles per-target
//! settings from an external target registry before each (re)initialization.
//!
//! Callers must serialize command execution per engine instance; nothing
//! here is designed for concurrent invocation (see the crate-level docs on
//! [`Engine::execute_command`]).

// Library code must not write to stdout/stderr directly; everything
// user-visible goes through tracing or the response sink.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod assembly;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod settings;
pub mod sink;
pub mod transport;

pub use config::{
    AssemblyPolicy, BrokerConfig, CclDefaults, EngineConfig, EngineMode, RegistryConfig,
    ServiceDefinition,
};
pub use engine::{Engine, ExecuteOutcome};
pub use error::{EngineError, Result};
pub use pansearch_protocol::{Command, ErrorEnvelope, Verb};
pub use registry::{TargetDirectory, TargetRecord};
pub use session::SessionState;
pub use settings::{SettingValue, TargetSettings};
pub use sink::{BufferedSink, ResponseSink, StreamingSink};
