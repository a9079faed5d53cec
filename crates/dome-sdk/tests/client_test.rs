//! Lifecycle tests against a stub agent registry.
//!
//! The stub speaks the registry's Connect-style JSON protocol: POST
//! `/dome.agent.v1.AgentRegistry/{Method}` with JSON bodies, and
//! `{"code": "already_exists"}` on duplicate names.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dome_sdk::{Client, DomeError, StartOptions};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGISTER_PATH: &str = "/dome.agent.v1.AgentRegistry/RegisterAgent";
const LIST_PATH: &str = "/dome.agent.v1.AgentRegistry/ListAgents";
const HEARTBEAT_PATH: &str = "/dome.agent.v1.AgentRegistry/Heartbeat";
const REPORT_EVENT_PATH: &str = "/dome.agent.v1.AgentRegistry/ReportEvent";

fn agent_json(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "agent": {
            "id": id,
            "name": name,
            "status": "active",
            "capabilities": [],
            "metadata": {},
        },
        "token": "issued-token",
    })
}

/// Stub registry that accepts registration and swallows events.
async fn registry_server(id: &str, name: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json(id, name)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    server
}

fn test_client(server: &MockServer) -> Client {
    Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap()
}

fn opts(name: &str) -> StartOptions {
    StartOptions {
        name: name.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn start_registers_and_sets_agent_id() {
    let server = registry_server("agent-1", "test-agent").await;
    let client = test_client(&server);

    let info = client.start(opts("test-agent")).await.unwrap();

    assert_eq!(info.id, "agent-1");
    assert_eq!(info.name, "test-agent");
    assert_eq!(info.status, "active");
    assert_eq!(client.agent_id(), "agent-1");

    client.close().await.unwrap();
}

#[tokio::test]
async fn start_requires_name() {
    let server = registry_server("agent-1", "x").await;
    let client = test_client(&server);

    let err = client.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, DomeError::MissingAgentName));

    client.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_name_adopts_existing_agent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_string(r#"{"code":"already_exists","message":"agent exists"}"#),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .and(body_partial_json(serde_json::json!({"limit": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "agents": [
                {"id": "agent-3", "name": "other", "status": "active"},
                {"id": "agent-7", "name": "dup", "status": "active"},
            ],
            "total": 2,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let info = client.start(opts("dup")).await.unwrap();

    assert_eq!(info.id, "agent-7");
    assert_eq!(client.agent_id(), "agent-7");

    client.close().await.unwrap();
}

#[tokio::test]
async fn second_start_with_same_name_returns_same_id() {
    let server = MockServer::start().await;

    // First registration wins; the repeat gets the duplicate-name response
    // and must adopt the same identity via the listing.
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("agent-1", "twice")))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string(r#"{"code":"already_exists"}"#))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "agents": [{"id": "agent-1", "name": "twice", "status": "active"}],
            "total": 1,
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = test_client(&server);

    let first = client.start(opts("twice")).await.unwrap();
    let second = client.start(opts("twice")).await.unwrap();
    assert_eq!(first.id, "agent-1");
    assert_eq!(first.id, second.id);

    client.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_name_missing_from_listing_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_string(r#"{"code":"already_exists"}"#))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"agents": [], "total": 0})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client.start(opts("ghost")).await.unwrap_err();
    assert!(err.to_string().contains("could not be found"), "{err}");

    client.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent() {
    let server = registry_server("agent-1", "heartbeat-agent").await;

    let client = Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .disable_policy()
        .build()
        .unwrap();

    client.start(opts("heartbeat-agent")).await.unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn graceful_degradation_returns_placeholder_on_unreachable_api() {
    let client = Client::builder()
        .api_key("test-key")
        .api_url("http://127.0.0.1:1") // nothing listens here
        .graceful_degradation()
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap();

    let info = client.start(opts("graceful-agent")).await.unwrap();

    assert_eq!(info.name, "graceful-agent");
    assert_eq!(info.id, "");
    assert_eq!(client.agent_id(), "");

    client.close().await.unwrap();
}

#[tokio::test]
async fn graceful_degradation_registers_in_background() {
    let server = MockServer::start().await;

    // First registration attempt fails, later ones succeed.
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("agent-9", "eventual")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1..)
        .mount(&server)
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .graceful_degradation()
        .heartbeat_interval(Duration::from_millis(50))
        .disable_policy()
        .build()
        .unwrap();

    let info = client.start(opts("eventual")).await.unwrap();
    assert_eq!(info.id, "");

    // Background retry base is 5s; allow the same window the server allows.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while client.agent_id().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "background registration did not succeed within 30s"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(client.agent_id(), "agent-9");

    // Heartbeats begin inside the same background worker.
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.close().await.unwrap();
}

#[tokio::test]
async fn unreachable_api_without_graceful_degradation_is_an_error() {
    let client = Client::builder()
        .api_key("test-key")
        .api_url("http://127.0.0.1:1")
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap();

    let err = client.start(opts("strict-agent")).await.unwrap_err();
    assert!(err.to_string().starts_with("dome:"), "{err}");

    client.close().await.unwrap();
}

#[tokio::test]
async fn check_fails_open_without_policies() {
    let client = Client::builder()
        .api_key("test-key")
        .without_heartbeat()
        .build()
        .unwrap();

    let decision = client
        .check(dome_sdk::CheckRequest {
            action: "read".into(),
            resource: "users".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.reason, "no policy bundle loaded");
    assert_eq!(decision.policy_version, "");

    client.close().await.unwrap();
}

#[tokio::test]
async fn check_fails_closed_when_configured() {
    let client = Client::builder()
        .api_key("test-key")
        .without_heartbeat()
        .fail_closed()
        .build()
        .unwrap();

    let decision = client
        .check(dome_sdk::CheckRequest {
            action: "read".into(),
            resource: "users".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "no policy bundle loaded");

    client.close().await.unwrap();
}

#[tokio::test]
async fn credential_blob_selects_token_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "exchanged-jwt",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .and(header("authorization", "Bearer exchanged-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("agent-5", "exch")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let blob = BASE64.encode(
        serde_json::to_vec(&serde_json::json!({
            "api_url": server.uri(),
            "auth_method": "approle",
            "role_id": "r-1",
            "secret_id": "s-1",
        }))
        .unwrap(),
    );

    let client = Client::builder()
        .credentials(blob)
        .api_url(server.uri())
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap();

    let info = client.start(opts("exch")).await.unwrap();
    assert_eq!(info.id, "agent-5");

    client.close().await.unwrap();
}

#[tokio::test]
async fn auth_events_queued_before_registration_drain_with_agent_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "jwt",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent_json("agent-1", "ev")))
        .mount(&server)
        .await;

    // The authenticated event fires during the registration round trip,
    // before any agent id exists. It must arrive under the assigned id.
    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .and(body_partial_json(serde_json::json!({
            "agentId": "agent-1",
            "eventType": "agent.authenticated",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let blob = BASE64.encode(
        serde_json::to_vec(&serde_json::json!({
            "api_url": server.uri(),
            "auth_method": "approle",
            "role_id": "r-1",
            "secret_id": "s-1",
        }))
        .unwrap(),
    );

    let client = Client::builder()
        .credentials(blob)
        .api_url(server.uri())
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap();

    client.start(opts("ev")).await.unwrap();

    // Let the drained dispatch task run before expectations are verified.
    tokio::time::sleep(Duration::from_millis(300)).await;

    client.close().await.unwrap();
}

#[tokio::test]
async fn global_init_and_shutdown_are_idempotent() {
    dome_sdk::init(Client::builder().api_key("test-key").without_heartbeat())
        .await
        .unwrap();

    let decision = dome_sdk::check(dome_sdk::CheckRequest {
        action: "read".into(),
        resource: "users".into(),
        ..Default::default()
    })
    .await
    .unwrap();
    assert!(decision.allowed);

    dome_sdk::shutdown().await.unwrap();
    dome_sdk::shutdown().await.unwrap();

    // Calls after shutdown report the missing client.
    let err = dome_sdk::check(dome_sdk::CheckRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomeError::NotInitialized));
}
