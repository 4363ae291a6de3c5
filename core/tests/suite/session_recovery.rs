//! Dead-session (code 1) recovery: reinitialize, replay, retry once.

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer};

use pansearch_core::{BufferedSink, Command};
use pansearch_protocol::wire;

use super::support::{
    broker_error, init_ok, mount_command_expect, search_cmd, show_ok, static_engine, xml_ok,
};

#[tokio::test]
async fn dead_session_reinitializes_and_retries_the_search() {
    let server = MockServer::start().await;
    // First init binds s1, the recovery init binds s2.
    Mock::given(method("GET"))
        .and(query_param("command", "init"))
        .respond_with(init_ok("s1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_command_expect(&server, "init", init_ok("s2"), 1).await;
    // The first search attempt hits a dead session.
    Mock::given(method("GET"))
        .and(query_param("command", "search"))
        .respond_with(broker_error(1, "session does not exist"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 1).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let outcome = engine
        .execute_command(&search_cmd("water"), &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.status_code, 200);
    assert_eq!(sink.as_str(), wire::SEARCH_OK);
    assert_eq!(engine.session().broker_session_id(), Some("s2"));
}

#[tokio::test]
async fn second_dead_session_error_is_fatal() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 2).await;
    mount_command_expect(&server, "search", broker_error(1, "session does not exist"), 2).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    let err = engine
        .execute_command(&search_cmd("water"), &mut sink)
        .await
        .unwrap_err();

    assert!(err.is_session_dead());
    assert!(!engine.session().is_bound());
}

#[tokio::test]
async fn dead_session_on_show_replays_the_previous_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("command", "init"))
        .respond_with(init_ok("s1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_command_expect(&server, "init", init_ok("s2"), 1).await;
    // One search from the user, one from the bootstrap replay.
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    Mock::given(method("GET"))
        .and(query_param("command", "show"))
        .respond_with(broker_error(1, "session does not exist"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // The bootstrap's own show plus the retried user show.
    mount_command_expect(&server, "show", show_ok(0), 2).await;

    let mut engine = static_engine(&server);
    let mut sink = BufferedSink::new();
    engine
        .execute_command(&search_cmd("water"), &mut sink)
        .await
        .unwrap();

    let mut sink = BufferedSink::new();
    let outcome = engine
        .execute_command(&Command::from_query("command=show&start=0"), &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.status_code, 200);
    assert_eq!(engine.session().broker_session_id(), Some("s2"));
    assert!(sink.as_str().contains("activeclients"));
}
