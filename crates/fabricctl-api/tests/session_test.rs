#![allow(clippy::unwrap_used)]
// Integration tests for `Session` using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fabricctl_api::{
    ApiRequest, CredentialSource, Credentials, Error, RetryPolicy, Session, TOKEN_HEADER,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        backoff_factor: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

fn session_for(server: &MockServer) -> Session {
    Session::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap())
        .with_retry(fast_retry())
}

async fn setup() -> (MockServer, Session) {
    let server = MockServer::start().await;
    let session = session_for(&server);
    (server, session)
}

fn password(s: &str) -> SecretString {
    s.to_string().into()
}

async fn mount_logon(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ TOKEN_HEADER: token })))
        .mount(server)
        .await;
}

/// Counts prompts and hands back fixed credentials.
struct CountingPrompt {
    calls: Arc<AtomicU32>,
}

impl CredentialSource for CountingPrompt {
    fn credentials(&self, _attempt: u32) -> Result<Credentials, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials::new("admin", password("still-wrong")))
    }
}

// ── Login / logout ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_token() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .and(basic_auth("admin", "secret"))
        .and(body_json(json!({ "expirationTime": 1_000_000_000_u64 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Dcnm-Token": "tok-1" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/inventory/switches"))
        .and(header(TOKEN_HEADER, "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    assert!(session.is_authenticated());

    let resp = session
        .request(ApiRequest::get("/inventory/switches"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, json!([]));
}

#[tokio::test]
async fn test_login_rejected_reprompts_until_bound() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicU32::new(0));
    let session = session_for(&server)
        .with_login_attempts(3)
        .with_credential_source(CountingPrompt {
            calls: Arc::clone(&calls),
        });

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let result = session.login("admin", &password("wrong")).await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_login_rejected_without_prompt_fails_fast() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = session.login("admin", &password("wrong")).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_login_without_token_field() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "other": 1 })))
        .mount(&server)
        .await;

    let result = session.login("admin", &password("secret")).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_logout_clears_state_even_on_failure() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok-1").await;

    Mock::given(method("POST"))
        .and(path("/rest/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let result = session.logout().await;

    assert!(matches!(result, Err(Error::ServerResponse { status: 500, .. })));
    assert!(!session.is_authenticated());

    let after = session.request(ApiRequest::get("/inventory/switches")).await;
    assert!(matches!(after, Err(Error::Authentication { .. })));
}

// ── Request validation ──────────────────────────────────────────────

#[tokio::test]
async fn test_request_before_login_is_rejected() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = session.request(ApiRequest::get("/inventory/switches")).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_relative_path_is_parameter_error() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok-1").await;
    session.login("admin", &password("secret")).await.unwrap();

    let result = session.request(ApiRequest::get("inventory/switches")).await;
    assert!(matches!(result, Err(Error::Parameter(_))));
}

// ── Re-authentication ───────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_relogs_and_replays() {
    let (server, session) = setup().await;

    // First login hands out a token the controller later rejects.
    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ TOKEN_HEADER: "stale" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_logon(&server, "fresh").await;

    Mock::given(method("GET"))
        .and(path("/rest/control/policies/switches"))
        .and(header(TOKEN_HEADER, "stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/control/policies/switches"))
        .and(header(TOKEN_HEADER, "fresh"))
        .and(query_param("serialNumber", "SN1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "policyId": "POLICY-1" }])))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let resp = session
        .request(ApiRequest::get("/control/policies/switches").query("serialNumber", "SN1"))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, json!([{ "policyId": "POLICY-1" }]));
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_second_unauthorized_is_connection_error() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ TOKEN_HEADER: "tok" })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/interface"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let result = session.request(ApiRequest::get("/interface")).await;

    assert!(
        matches!(result, Err(Error::Connection { .. })),
        "expected Connection error, got: {result:?}"
    );
}

// ── Retry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_retryable_status_is_retried_for_get() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path("/rest/inventory/switches"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/inventory/switches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "serialNumber": "SN1" }])))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let resp = session
        .request(ApiRequest::get("/inventory/switches"))
        .await
        .unwrap();
    assert_eq!(resp.body, json!([{ "serialNumber": "SN1" }]));
}

#[tokio::test]
async fn test_status_retries_are_bounded() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok").await;

    // One initial attempt plus three status retries.
    Mock::given(method("GET"))
        .and(path("/rest/inventory/switches"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let result = session.request(ApiRequest::get("/inventory/switches")).await;
    assert!(matches!(result, Err(Error::ServerResponse { status: 502, .. })));
}

#[tokio::test]
async fn test_post_is_not_retried_on_status() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok").await;

    Mock::given(method("POST"))
        .and(path("/rest/globalInterface/deploy"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let result = session
        .request(ApiRequest::post("/globalInterface/deploy").json(json!([])))
        .await;

    match result {
        Err(err @ Error::ServerResponse { .. }) => {
            assert_eq!(err.status(), Some(503));
            assert!(err.is_transient());
        }
        other => panic!("expected ServerResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_maps_to_connection_error() {
    // Port 9 (discard) is not listening on test hosts.
    let session = Session::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
    )
    .with_retry(RetryPolicy::none());

    let result = session.login("admin", &password("secret")).await;
    assert!(
        matches!(result, Err(Error::Connection { .. })),
        "expected Connection error, got: {result:?}"
    );
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_carries_body_and_expected_message() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok").await;

    Mock::given(method("POST"))
        .and(path("/rest/control/fabrics/f1/config-deploy/SN1"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "bad serial" })),
        )
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let result = session
        .request(
            ApiRequest::post("/control/fabrics/f1/config-deploy/SN1")
                .expect_error(400, "Invalid value supplied"),
        )
        .await;

    match result {
        Err(Error::ServerResponse {
            status,
            message,
            body,
            ..
        }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid value supplied");
            assert_eq!(body, json!({ "message": "bad serial" }));
        }
        other => panic!("expected ServerResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_text_body_is_kept() {
    let (server, session) = setup().await;
    mount_logon(&server, "tok").await;

    Mock::given(method("PUT"))
        .and(path("/rest/interface"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Success"))
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    let resp = session
        .request(ApiRequest::put("/interface").json(json!({ "policy": "int_trunk_host" })))
        .await
        .unwrap();
    assert_eq!(resp.body, json!("Success"));
}

// ── Dry run ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dry_run_suppresses_mutations() {
    let server = MockServer::start().await;
    let session = session_for(&server).with_dry_run(true);

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let put = session
        .request(ApiRequest::put("/interface").json(json!({})))
        .await
        .unwrap();
    let delete = session
        .request(ApiRequest::delete("/control/policies/POLICY-1"))
        .await
        .unwrap();

    assert_eq!(put.status, 200);
    assert_eq!(delete.status, 200);
}

#[tokio::test]
async fn test_dry_run_still_reads() {
    let server = MockServer::start().await;
    let session = session_for(&server).with_dry_run(true);
    mount_logon(&server, "tok").await;

    Mock::given(method("GET"))
        .and(path("/rest/inventory/switches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    session
        .request(ApiRequest::get("/inventory/switches"))
        .await
        .unwrap();
}

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_relogs_on_unauthorized() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rest/logon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ TOKEN_HEADER: "stale" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_logon(&server, "fresh").await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .and(header(TOKEN_HEADER, "stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .and(header(TOKEN_HEADER, "fresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    session.login("admin", &password("secret")).await.unwrap();
    session.probe().await.unwrap();
}
