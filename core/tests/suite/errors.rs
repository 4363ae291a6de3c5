//! Error paths: fatal transport failures, rendered application errors,
//! and the GET-to-POST fallback.

use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pansearch_core::{BufferedSink, Engine, EngineConfig, EngineError, EngineMode};
use pansearch_protocol::wire;

use super::support::{
    broker_config, broker_error, init_ok, mount_command_expect, search_cmd, static_engine, xml_ok,
};

#[tokio::test]
async fn unexpected_status_is_fatal() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(
        &server,
        "search",
        ResponseTemplate::new(500).set_body_string("boom"),
        1,
    )
    .await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let err = engine
        .execute_command(&search_cmd("water"), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::UnexpectedStatus { status: 500, .. }
    ));
    // Search provenance is reset, the broker session survives.
    assert!(engine.session().current_search().is_none());
    assert!(engine.session().is_bound());
}

#[tokio::test]
async fn application_error_is_rendered_as_417_body() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", broker_error(12, "query syntax"), 1).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let outcome = engine
        .execute_command(&search_cmd("wat)er"), &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.status_code, 417);
    assert_eq!(outcome.content_type, "text/xml");
    assert!(sink.as_str().contains(r#"code="12""#));
    assert!(engine.session().current_search().is_none());
}

#[tokio::test]
async fn oversized_get_urls_are_sent_as_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("command=init"))
        .respond_with(init_ok("s1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("command=search"))
        .respond_with(xml_ok(wire::SEARCH_OK))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = EngineConfig::new(broker_config(&server), EngineMode::StaticSettings);
    config.broker.get_url_limit = 1;
    let mut engine = Engine::from_config(config, None).unwrap();

    let mut sink = BufferedSink::new();
    let outcome = engine
        .execute_command(&search_cmd("water"), &mut sink)
        .await
        .unwrap();
    assert_eq!(outcome.status_code, 200);
    assert_eq!(sink.as_str(), wire::SEARCH_OK);
}
