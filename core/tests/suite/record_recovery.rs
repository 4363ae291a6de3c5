//! Missing-record (code 7) recovery: rebuild the record's search context
//! and retry while the broker still reports active clients.

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer};

use pansearch_core::{BufferedSink, Command, Engine, EngineConfig, EngineMode};
use pansearch_protocol::wire;

use super::support::{
    broker_config, broker_error, init_ok, mount_command_expect, show_ok, static_engine, xml_ok,
};

fn record_cmd() -> Command {
    Command::from_query("command=record&id=rec-1&recordquery=water")
}

#[tokio::test]
async fn gives_up_once_no_clients_remain() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    // Initial bootstrap plus exactly one recovery bootstrap.
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    mount_command_expect(&server, "show", show_ok(0), 2).await;
    mount_command_expect(&server, "record", broker_error(7, "record missing"), 2).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let err = engine
        .execute_command(&record_cmd(), &mut sink)
        .await
        .unwrap_err();

    assert!(err.is_record_missing());
    assert!(engine.session().is_bound());
}

#[tokio::test]
async fn retries_while_broker_reports_active_clients() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    mount_command_expect(&server, "show", show_ok(1), 3).await;
    Mock::given(method("GET"))
        .and(query_param("command", "record"))
        .respond_with(broker_error(7, "record missing"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_command_expect(
        &server,
        "record",
        xml_ok("<record><recid>rec-1</recid></record>"),
        1,
    )
    .await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let outcome = engine
        .execute_command(&record_cmd(), &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.status_code, 200);
    assert!(sink.as_str().contains("<record>"));
    // The recovery shows were cached, so single hits are servable locally.
    assert!(engine.get_hit("rec-1").is_some());
}

#[tokio::test]
async fn record_without_recovery_query_is_fatal() {
    let server = MockServer::start().await;
    // No init, search, or show mocks: recovery must not even start.
    mount_command_expect(&server, "record", broker_error(7, "record missing"), 1).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let err = engine
        .execute_command(&Command::from_query("command=record&id=rec-1"), &mut sink)
        .await
        .unwrap_err();

    assert!(err.is_record_missing());
    assert!(!engine.session().is_bound());
}

#[tokio::test]
async fn retry_cap_bounds_the_recovery_loop() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    // Active clients never converge; without the cap this would loop.
    mount_command_expect(&server, "show", show_ok(1), 2).await;
    mount_command_expect(&server, "record", broker_error(7, "record missing"), 2).await;

    let mut config = EngineConfig::new(broker_config(&server), EngineMode::StaticSettings);
    config.max_record_retries = Some(1);
    let mut engine = Engine::from_config(config, None).unwrap();

    let mut sink = BufferedSink::new();
    let err = engine
        .execute_command(&record_cmd(), &mut sink)
        .await
        .unwrap_err();

    assert!(err.is_record_missing());
}
