//! Contract tests for the two-step Vault identity transport.

use std::io::Write;
use std::sync::Arc;

use dome_auth::{
    AuthError, AuthTransport, VaultIdentity, VaultIdentityConfig, VaultLogin,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

fn approle_transport(server: &MockServer) -> AuthTransport {
    let http = reqwest::Client::new();
    let source = VaultIdentity::new(
        http.clone(),
        VaultIdentityConfig {
            vault_addr: server.uri(),
            oidc_role: "dome-agent".into(),
            login: VaultLogin::AppRole {
                role_id: "test-role".into(),
                secret_id: Zeroizing::new("test-secret".into()),
            },
        },
        None,
    );
    AuthTransport::new(http, Arc::new(source))
}

async fn get(transport: &AuthTransport, url: &str) -> Result<reqwest::Response, AuthError> {
    let req = transport.http().get(url).build().unwrap();
    transport.execute(req).await
}

fn login_response(token: &str, lease: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "auth": {"client_token": token, "lease_duration": lease}
    }))
}

fn oidc_response(token: &str, ttl: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "data": {"token": token, "ttl": ttl}
    }))
}

#[tokio::test]
async fn approle_login_then_oidc_token_injected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .and(body_partial_json(serde_json::json!({
            "role_id": "test-role",
            "secret_id": "test-secret",
        })))
        .respond_with(login_response("vault-token", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/identity/oidc/token/dome-agent"))
        .and(header("X-Vault-Token", "vault-token"))
        .respond_with(oidc_response("oidc-jwt", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/test-api"))
        .and(header("authorization", "Bearer oidc-jwt"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = approle_transport(&server);
    let resp = get(&transport, &format!("{}/test-api", server.uri()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn kubernetes_login_reads_service_account_jwt() {
    let server = MockServer::start().await;

    let mut sa_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(sa_file, "k8s-sa-jwt").unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/auth/kubernetes/login"))
        .and(body_partial_json(serde_json::json!({
            "role": "dome-k8s",
            "jwt": "k8s-sa-jwt",
        })))
        .respond_with(login_response("vault-token", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/identity/oidc/token/dome-agent"))
        .respond_with(oidc_response("oidc-jwt", 3600))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/test-api"))
        .and(header("authorization", "Bearer oidc-jwt"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let source = VaultIdentity::new(
        http.clone(),
        VaultIdentityConfig {
            vault_addr: server.uri(),
            oidc_role: "dome-agent".into(),
            login: VaultLogin::Kubernetes {
                role: "dome-k8s".into(),
                token_path: sa_file.path().to_path_buf(),
            },
        },
        None,
    );
    let transport = AuthTransport::new(http, Arc::new(source));

    let resp = get(&transport, &format!("{}/test-api", server.uri()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn primary_token_is_reused_when_oidc_refreshes() {
    let server = MockServer::start().await;

    // OIDC ttl of 5s is inside its 30s buffer, so each request re-mints the
    // OIDC token; the primary (1h lease) must be acquired only once.
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(login_response("vault-token", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/identity/oidc/token/dome-agent"))
        .respond_with(oidc_response("oidc-jwt", 5))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/test-api"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let transport = approle_transport(&server);
    let url = format!("{}/test-api", server.uri());
    get(&transport, &url).await.unwrap();
    get(&transport, &url).await.unwrap();
}

#[tokio::test]
async fn login_failure_surfaces_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let transport = approle_transport(&server);
    let err = get(&transport, &format!("{}/test-api", server.uri()))
        .await
        .unwrap_err();

    match err {
        AuthError::VaultLogin { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("permission denied"));
        }
        other => panic!("expected VaultLogin error, got: {other:?}"),
    }
}
