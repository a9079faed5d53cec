//! End-to-end policy checks: bundle sync through the client, capability
//! gating against the registered identity, and syncer shutdown.

use std::time::Duration;

use dome_sdk::{CheckRequest, Client, StartOptions};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGISTER_PATH: &str = "/dome.agent.v1.AgentRegistry/RegisterAgent";
const REPORT_EVENT_PATH: &str = "/dome.agent.v1.AgentRegistry/ReportEvent";
const BUNDLE_PATH: &str = "/api/v1/policies/bundle";

const BASE_CEDAR: &str = r#"
@id("capability-based-access")
permit(
    principal is Dome::Agent,
    action,
    resource
) when {
    principal.capabilities.contains(context.required_capability)
};
"#;

const SALARY_CEDAR: &str = r#"
@id("hr-salary-restriction")
forbid(
    principal is Dome::Agent,
    action == Dome::Action::"mcp:call",
    resource == Dome::MCPTool::"hr-mcp/get_salary"
) when {
    principal.capabilities.contains("hr:salary:read") == false
};
"#;

async fn mount_registry(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "agent": {
                "id": "agent-1",
                "name": "governed",
                "status": "active",
                "capabilities": ["mcp:call"],
            },
            "token": "t",
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(REPORT_EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
}

async fn mount_bundle(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(BUNDLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "v1",
            "hash": "h1",
            "policies": [
                {"filename": "base.cedar", "content": BASE_CEDAR},
                {"filename": "salary.cedar", "content": SALARY_CEDAR},
            ],
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn check_enforces_synced_bundle_against_registered_identity() {
    let server = MockServer::start().await;
    mount_registry(&server).await;
    mount_bundle(&server).await;

    let client = Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .without_heartbeat()
        .build()
        .unwrap();

    // start() runs the initial bundle sync before returning.
    client
        .start(StartOptions {
            name: "governed".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let allowed = client
        .check(CheckRequest {
            action: "mcp:call".into(),
            resource: "hr-mcp/search_employees".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(allowed.allowed, "{}", allowed.reason);
    assert_eq!(allowed.policy_version, "v1");

    let denied = client
        .check(CheckRequest {
            action: "mcp:call".into(),
            resource: "hr-mcp/get_salary".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!denied.allowed);
    assert!(
        denied.reason.starts_with("denied by policy"),
        "{}",
        denied.reason
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn disable_policy_skips_sync_and_allows() {
    let server = MockServer::start().await;
    mount_registry(&server).await;

    Mock::given(method("GET"))
        .and(path(BUNDLE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .without_heartbeat()
        .disable_policy()
        .build()
        .unwrap();

    client
        .start(StartOptions {
            name: "governed".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let decision = client
        .check(CheckRequest {
            action: "mcp:call".into(),
            resource: "anything".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(decision.allowed);

    client.close().await.unwrap();
}

#[tokio::test]
async fn close_stops_bundle_sync() {
    let server = MockServer::start().await;
    mount_registry(&server).await;
    mount_bundle(&server).await;

    let client = Client::builder()
        .api_key("test-key")
        .api_url(server.uri())
        .without_heartbeat()
        .policy_refresh_interval(Duration::from_millis(100))
        .build()
        .unwrap();

    client
        .start(StartOptions {
            name: "governed".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    client.close().await.unwrap();

    // No fetches may arrive after close; the reset clears the request log.
    server.reset().await;
    tokio::time::sleep(Duration::from_millis(350)).await;

    let late_fetches = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == BUNDLE_PATH)
        .count();
    assert_eq!(late_fetches, 0, "policy sync kept running after close");
}
