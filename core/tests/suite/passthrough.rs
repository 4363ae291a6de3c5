//! Verbs outside the known set are forwarded untouched and never trigger
//! session bootstrap.

use pretty_assertions::assert_eq;
use wiremock::MockServer;

use pansearch_core::{BufferedSink, Command};

use super::support::{mount_command_expect, static_engine, xml_ok};

#[tokio::test]
async fn unknown_verb_is_forwarded_without_bootstrap() {
    let server = MockServer::start().await;
    // No init mock mounted: an init attempt would 404 and fail the test.
    mount_command_expect(&server, "exportsession", xml_ok("<exportsession/>"), 1).await;

    let mut engine = static_engine(&server);
    let cmd = Command::from_query("command=exportsession&window=1");
    let mut sink = BufferedSink::new();
    let outcome = engine.execute_command(&cmd, &mut sink).await.unwrap();

    assert_eq!(outcome.status_code, 200);
    assert_eq!(sink.as_str(), "<exportsession/>");
    assert!(!engine.session().is_bound());
}

#[tokio::test]
async fn client_only_params_never_reach_the_broker() {
    let server = MockServer::start().await;
    mount_command_expect(&server, "exportsession", xml_ok("<exportsession/>"), 1).await;

    let mut engine = static_engine(&server);
    let cmd = Command::from_query("command=exportsession&windowid=w1&torusquery=udb%3Dlocal");
    let mut sink = BufferedSink::new();
    engine.execute_command(&cmd, &mut sink).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let query = requests[0].url.query().unwrap_or_default();
    assert!(!query.contains("windowid"));
    assert!(!query.contains("torusquery"));
}
