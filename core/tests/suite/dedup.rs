//! Consecutive identical searches are answered locally, without touching
//! the broker.

use pretty_assertions::assert_eq;
use wiremock::MockServer;

use pansearch_core::BufferedSink;
use pansearch_protocol::wire;

use super::support::{init_ok, mount_command_expect, search_cmd, static_engine, xml_ok};

#[tokio::test]
async fn identical_consecutive_search_skips_the_broker() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 1).await;

    let mut engine = static_engine(&server);
    let cmd = search_cmd("water");

    let mut first = BufferedSink::new();
    let outcome = engine.execute_command(&cmd, &mut first).await.unwrap();
    assert_eq!(outcome.status_code, 200);

    // Same query again: the mocks above allow exactly one init and one
    // search, so this answer can only have come from the engine itself.
    let mut second = BufferedSink::new();
    let outcome = engine.execute_command(&cmd, &mut second).await.unwrap();
    assert_eq!(outcome.status_code, 200);
    assert_eq!(second.as_str(), wire::SEARCH_OK);
    assert!(engine.session().is_bound());
}

#[tokio::test]
async fn changed_query_reaches_the_broker_again() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;

    let mut engine = static_engine(&server);
    for query in ["water", "fire"] {
        let mut sink = BufferedSink::new();
        let outcome = engine
            .execute_command(&search_cmd(query), &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.status_code, 200);
    }
}
