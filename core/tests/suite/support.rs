//! Shared fixtures for the engine integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pansearch_core::error::EngineError;
use pansearch_core::registry::{TargetDirectory, TargetRecord};
use pansearch_core::{BrokerConfig, Command, Engine, EngineConfig, EngineMode};

pub fn search_cmd(query: &str) -> Command {
    Command::from_query(&format!("command=search&query={query}"))
}

pub fn broker_config(server: &MockServer) -> BrokerConfig {
    BrokerConfig::new(url::Url::parse(&server.uri()).expect("mock server uri"))
}

pub fn static_engine(server: &MockServer) -> Engine {
    init_logging();
    let config = EngineConfig::new(broker_config(server), EngineMode::StaticSettings);
    Engine::from_config(config, None).expect("engine config is valid")
}

pub fn registry_engine(server: &MockServer, directory: Arc<dyn TargetDirectory>) -> Engine {
    init_logging();
    let config = EngineConfig::new(broker_config(server), EngineMode::RegistryBacked);
    Engine::from_config(config, Some(directory)).expect("engine config is valid")
}

/// Opt-in engine logs during test runs via `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// In-memory registry stub; counts fetches so tests can assert when the
/// settings cache was bypassed.
pub struct StubDirectory {
    records: Vec<TargetRecord>,
    calls: AtomicUsize,
}

impl StubDirectory {
    pub fn with_one_target(z_url: &str) -> Self {
        let record = TargetRecord {
            z_url: Some(z_url.to_string()),
            name: Some("Stub Target".to_string()),
            ..Default::default()
        };
        StubDirectory {
            records: vec![record],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetDirectory for StubDirectory {
    async fn searchables(
        &self,
        _selection: Option<&str>,
    ) -> pansearch_core::Result<Vec<TargetRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.records.is_empty() {
            return Err(EngineError::configuration("stub registry is empty"));
        }
        Ok(self.records.clone())
    }
}

pub fn xml_ok(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/xml")
}

pub fn broker_error(code: i32, msg: &str) -> ResponseTemplate {
    ResponseTemplate::new(417).set_body_raw(
        format!(r#"<error code="{code}" msg="{msg}"/>"#),
        "text/xml",
    )
}

pub fn init_ok(session_id: &str) -> ResponseTemplate {
    xml_ok(&format!(
        "<init><status>OK</status><session>{session_id}</session></init>"
    ))
}

pub fn show_ok(active_clients: u32) -> ResponseTemplate {
    xml_ok(&format!(
        "<show><status>OK</status><activeclients>{active_clients}</activeclients>\
         <hit><md-title>Hit</md-title><recid>rec-1</recid></hit></show>"
    ))
}

/// Mount a GET mock matched on the `command` query parameter, with an
/// exact expectation on the number of matched requests (verified when the
/// server drops).
pub async fn mount_command_expect(
    server: &MockServer,
    command: &str,
    response: ResponseTemplate,
    hits: u64,
) {
    Mock::given(method("GET"))
        .and(query_param("command", command))
        .respond_with(response)
        .expect(hits)
        .mount(server)
        .await;
}
