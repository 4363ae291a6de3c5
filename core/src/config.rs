//! Engine configuration.
//!
//! Everything the engine needs is passed in explicitly at construction; the
//! embedding layer owns loading and caching. Validation failures are
//! [`EngineError::Configuration`] and are never retried.

use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::{EngineError, Result};

/// How to reach the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Base URL of the broker endpoint (e.g. `http://localhost:9004/search.pz2`).
    pub base_url: Url,
    /// Requests whose assembled GET URL reaches this many bytes are sent as
    /// POST form bodies instead.
    pub get_url_limit: usize,
}

impl BrokerConfig {
    pub fn new(base_url: Url) -> Self {
        BrokerConfig {
            base_url,
            get_url_limit: 2048,
        }
    }
}

/// Which of the three init strategies a service definition resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStrategyKind {
    /// POST the service definition XML as the init request body.
    ServiceXml(String),
    /// Pass `service=<id>` on the init request.
    ServiceId(String),
    /// Let the broker use its default service.
    BrokerDefault,
}

/// Broker service selection. Passive input to the engine, resolved once and
/// cached for the lifetime of the engine instance.
#[derive(Debug, Clone, Default)]
pub struct ServiceDefinition {
    /// Full service definition XML to post with init.
    pub xml: Option<String>,
    /// Id of a service predefined on the broker.
    pub id: Option<String>,
}

impl ServiceDefinition {
    pub fn resolve(&self) -> Result<InitStrategyKind> {
        match (&self.xml, &self.id) {
            (Some(_), Some(_)) => Err(EngineError::configuration(
                "service definition carries both an XML body and a service id",
            )),
            (Some(xml), None) => Ok(InitStrategyKind::ServiceXml(xml.clone())),
            (None, Some(id)) => Ok(InitStrategyKind::ServiceId(id.clone())),
            (None, None) => Ok(InitStrategyKind::BrokerDefault),
        }
    }
}

/// One well-known CCL index: the setting key it is published under and the
/// attribute combination used when the target record supplies none.
#[derive(Debug, Clone)]
pub struct CclDefault {
    pub key: String,
    pub fallback: String,
}

impl CclDefault {
    fn new(key: &str, fallback: &str) -> Self {
        CclDefault {
            key: key.to_string(),
            fallback: fallback.to_string(),
        }
    }
}

/// The eight well-known CCL indexes. Key names are configurable so a
/// deployment can rename e.g. `au` to `author`; `term` is special-cased by
/// the assembly: `pz:cclmap:term` is always written even when renamed.
#[derive(Debug, Clone)]
pub struct CclDefaults {
    pub term: CclDefault,
    pub any: CclDefault,
    pub au: CclDefault,
    pub ti: CclDefault,
    pub su: CclDefault,
    pub isbn: CclDefault,
    pub issn: CclDefault,
    pub date: CclDefault,
}

impl Default for CclDefaults {
    fn default() -> Self {
        CclDefaults {
            term: CclDefault::new("term", "u=1016 t=l,r s=al"),
            any: CclDefault::new("any", "u=1016"),
            au: CclDefault::new("au", "u=1004 s=al"),
            ti: CclDefault::new("ti", "u=4 s=al"),
            su: CclDefault::new("su", "u=21 s=al"),
            isbn: CclDefault::new("isbn", "u=7"),
            issn: CclDefault::new("issn", "u=8"),
            date: CclDefault::new("date", "u=30 r=r"),
        }
    }
}

impl CclDefaults {
    /// Canonical-name/default pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, &CclDefault); 8] {
        [
            ("term", &self.term),
            ("any", &self.any),
            ("au", &self.au),
            ("ti", &self.ti),
            ("su", &self.su),
            ("isbn", &self.isbn),
            ("issn", &self.issn),
            ("date", &self.date),
        ]
    }
}

/// Knobs for settings assembly from registry records.
#[derive(Debug, Clone)]
pub struct AssemblyPolicy {
    /// Prefer turbomarc (`txml`) native syntax for MARC-family targets.
    pub use_turbo_marc: bool,
    /// Key targets by their registry record id instead of the constructed
    /// URL when an id is present.
    pub use_opaque_ids: bool,
    pub ccl_defaults: CclDefaults,
}

impl Default for AssemblyPolicy {
    fn default() -> Self {
        AssemblyPolicy {
            use_turbo_marc: true,
            use_opaque_ids: false,
            ccl_defaults: CclDefaults::default(),
        }
    }
}

/// Where the target registry lives and which slice of it applies.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: Url,
    /// Registry partition scoping which target records apply to this caller.
    pub realm: String,
    /// Optional opaque query appended to every searchables fetch.
    pub query: Option<String>,
}

/// Which engine variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Settings come from a local file (or broker defaults).
    StaticSettings,
    /// Settings are rebuilt from the target registry on every init.
    RegistryBacked,
}

impl FromStr for EngineMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(EngineMode::StaticSettings),
            "registry" => Ok(EngineMode::RegistryBacked),
            other => Err(EngineError::Configuration(format!(
                "unknown engine mode '{other}' (expected 'static' or 'registry')"
            ))),
        }
    }
}

/// Everything an [`crate::Engine`] is built from.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub broker: BrokerConfig,
    pub service: ServiceDefinition,
    pub mode: EngineMode,
    /// Static-settings variant: local settings file to push after init.
    pub settings_file: Option<PathBuf>,
    /// Registry-backed variant: where to fetch searchable records.
    pub registry: Option<RegistryConfig>,
    pub policy: AssemblyPolicy,
    /// Optional cap on the missing-record retry loop. `None` preserves the
    /// original behavior: the loop is bounded only by the broker's
    /// active-client count reaching zero.
    pub max_record_retries: Option<u32>,
}

impl EngineConfig {
    pub fn new(broker: BrokerConfig, mode: EngineMode) -> Self {
        EngineConfig {
            broker,
            service: ServiceDefinition::default(),
            mode,
            settings_file: None,
            registry: None,
            policy: AssemblyPolicy::default(),
            max_record_retries: None,
        }
    }
}
