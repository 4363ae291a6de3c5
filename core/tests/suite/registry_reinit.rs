//! Registry-backed variant: reinitialization on target-selection and
//! record-filter changes.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer};

use pansearch_core::{BufferedSink, Command};
use pansearch_protocol::wire;

use super::support::{StubDirectory, init_ok, mount_command_expect, registry_engine, xml_ok};

async fn mount_settings(server: &MockServer, hits: u64) {
    Mock::given(method("POST"))
        .and(query_param("command", "settings"))
        .respond_with(xml_ok("<settings><status>OK</status></settings>"))
        .expect(hits)
        .mount(server)
        .await;
}

fn search(query: &str, selection: &str) -> Command {
    Command::from_query(&format!(
        "command=search&query={query}&torusquery={selection}"
    ))
}

#[tokio::test]
async fn changed_target_selection_refetches_settings() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 2).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    mount_settings(&server, 2).await;

    let stub = Arc::new(StubDirectory::with_one_target("z.example.org:210/db"));
    let mut engine = registry_engine(&server, stub.clone());

    for selection in ["udb%3Da", "udb%3Db"] {
        let mut sink = BufferedSink::new();
        let outcome = engine
            .execute_command(&search("water", selection), &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.status_code, 200);
    }
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn unchanged_selection_reuses_assembled_settings() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 1).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    mount_settings(&server, 1).await;

    let stub = Arc::new(StubDirectory::with_one_target("z.example.org:210/db"));
    let mut engine = registry_engine(&server, stub.clone());

    for query in ["water", "fire"] {
        let mut sink = BufferedSink::new();
        let outcome = engine
            .execute_command(&search(query, "udb%3Da"), &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.status_code, 200);
    }
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn filter_change_repushes_without_refetching() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "init", init_ok("s1"), 2).await;
    mount_command_expect(&server, "search", xml_ok(wire::SEARCH_OK), 2).await;
    mount_settings(&server, 2).await;

    let stub = Arc::new(StubDirectory::with_one_target("z.example.org:210/db"));
    let mut engine = registry_engine(&server, stub.clone());

    let mut sink = BufferedSink::new();
    engine
        .execute_command(&search("water", "udb%3Da"), &mut sink)
        .await
        .unwrap();

    let filtered = Command::from_query(
        "command=search&query=water&torusquery=udb%3Da&recordfilter=location",
    );
    let mut sink = BufferedSink::new();
    let outcome = engine.execute_command(&filtered, &mut sink).await.unwrap();
    assert_eq!(outcome.status_code, 200);

    // Same selection, so the registry was only consulted once; the filter
    // change still forced a second settings push carrying the filter.
    assert_eq!(stub.calls(), 1);
    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<String> = requests
        .iter()
        .filter(|r| r.url.query().unwrap_or_default().contains("command=settings"))
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect();
    assert_eq!(bodies.len(), 2);
    assert!(!bodies[0].contains("pz:recordfilter"));
    assert!(bodies[1].contains("pz:recordfilter"));
    assert!(bodies[1].contains("location"));
}
