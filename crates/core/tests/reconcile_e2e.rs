//! End-to-end tests for a full reconciliation run.
//!
//! Every external endpoint (token exchange, source dataset, feature layer
//! query, applyEdits) is served by a local `wiremock` server, so the real
//! HTTP client, loaders and classification run unmodified.

use std::io::Write;

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use featuresync_core::config::AppConfig;
use featuresync_core::errors::{
    AuthError, MappingError, ReconcileError, RemoteError, SourceError, UpdateError,
};
use featuresync_core::mapping::FieldMapping;
use featuresync_core::models::{Attributes, RemoteId, SourceRecord};
use featuresync_core::reconcile::{fetch_remote_index, plan, resolve_token};
use featuresync_core::{reconcile, reconcile_with_summary, Credential, ReconciliationConfig};

const LAYER: &str = "/arcgis/rest/services/areas/FeatureServer/0";

// ===========================================================================
// Helpers
// ===========================================================================

fn layer_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), LAYER)
}

fn config(server: &MockServer, credential: Credential) -> ReconciliationConfig {
    let mut config = ReconciliationConfig::new(
        format!("{}/source.json", server.uri()),
        layer_url(server),
        credential,
    );
    config.token_url = format!("{}/sharing/generateToken", server.uri());
    config
}

fn token() -> Credential {
    Credential::Token("tok-123".into())
}

/// Mapper that sends the record's `status` as `STATUS`.
fn status_mapper(record: &SourceRecord) -> Result<Attributes, MappingError> {
    let mut attributes = Attributes::new();
    let status = record
        .get("status")
        .cloned()
        .ok_or_else(|| MappingError::MissingField("status".into()))?;
    attributes.insert("STATUS".into(), status);
    Ok(attributes)
}

async fn mount_source(server: &MockServer, records: Value) {
    Mock::given(method("GET"))
        .and(path("/source.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records))
        .mount(server)
        .await;
}

async fn mount_features(server: &MockServer, features: &[(&str, i64)]) {
    let features: Vec<Value> = features
        .iter()
        .map(|(name, id)| json!({"attributes": {"pa_name": name, "OBJECTID": id}}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER)))
        .and(query_param("where", "1=1"))
        .and(query_param("outFields", "pa_name, OBJECTID"))
        .and(query_param("f", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objectIdFieldName": "OBJECTID",
            "features": features
        })))
        .mount(server)
        .await;
}

/// applyEdits answer for the update targeting `id`.
async fn mount_edit(server: &MockServer, id: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER)))
        .and(body_string_contains(format!("\"OBJECTID\":\"{}\"", id)))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn edit_ok(id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "addResults": [],
        "updateResults": [{"objectId": id, "success": true}],
        "deleteResults": []
    }))
}

// ===========================================================================
// Classification
// ===========================================================================

#[tokio::test]
async fn test_run_classifies_every_record_in_source_order() {
    let server = MockServer::start().await;
    mount_source(
        &server,
        json!([
            {"name": "Northgate", "status": "open"},
            {"name": "Eastway", "status": "open"},
            {"name": "Albany", "status": "closed"},
            {"name": "Riverside", "status": "open"},
            {"name": "Hillcrest", "status": "closed"}
        ]),
    )
    .await;
    mount_features(
        &server,
        &[("Northgate", 101), ("Albany", 102), ("Riverside", 103), ("Hillcrest", 104)],
    )
    .await;
    mount_edit(&server, "101", edit_ok(101), 1).await;
    mount_edit(
        &server,
        "102",
        ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 400, "message": "Unable to complete operation.", "details": []}
        })),
        1,
    )
    .await;
    mount_edit(&server, "103", ResponseTemplate::new(200).set_body_json(json!([])), 1).await;
    mount_edit(&server, "104", edit_ok(104), 1).await;

    let report = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap();

    assert_eq!(report.sent, vec!["Northgate", "Hillcrest"]);
    assert_eq!(report.failures, vec!["Eastway"]);
    assert_eq!(report.errors, vec!["Albany"]);
    assert_eq!(report.ambiguous, vec!["Riverside"]);
    assert_eq!(report.total(), 5);
}

#[tokio::test]
async fn test_unmatched_names_send_no_update() {
    let server = MockServer::start().await;
    mount_source(
        &server,
        json!([{"name": "northgate", "status": "open"}, {"name": "Northgate ", "status": "open"}]),
    )
    .await;
    mount_features(&server, &[("Northgate", 101)]).await;
    mount_edit(&server, "101", edit_ok(101), 0).await;

    let report = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap();

    assert!(report.sent.is_empty());
    assert_eq!(report.failures, vec!["northgate", "Northgate "]);
}

#[tokio::test]
async fn test_empty_source_yields_empty_report() {
    let server = MockServer::start().await;
    mount_source(&server, json!([])).await;
    mount_features(&server, &[("Northgate", 101)]).await;

    let report = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap();
    assert_eq!(report.total(), 0);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_non_json_edit_response_is_ambiguous() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Northgate", "status": "open"}])).await;
    mount_features(&server, &[("Northgate", 101)]).await;
    mount_edit(
        &server,
        "101",
        ResponseTemplate::new(200).set_body_string("<html>gateway hiccup</html>"),
        1,
    )
    .await;

    let report = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap();
    assert_eq!(report.ambiguous, vec!["Northgate"]);
}

#[tokio::test]
async fn test_update_carries_target_id_and_token() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Northgate", "status": "open"}])).await;
    mount_features(&server, &[("Northgate", 101)]).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER)))
        .and(body_string_contains(r#"[{"attributes":{"#))
        .and(body_string_contains(r#""OBJECTID":"101""#))
        .and(body_string_contains(r#""STATUS":"open""#))
        .and(body_string_contains("tok-123"))
        .respond_with(edit_ok(101))
        .expect(1)
        .mount(&server)
        .await;

    // A mapped OBJECTID must not replace the target id.
    let mapper = |record: &SourceRecord| -> Result<Attributes, MappingError> {
        let mut attributes = status_mapper(record)?;
        attributes.insert("OBJECTID".into(), json!(999));
        Ok(attributes)
    };

    let report = reconcile(&config(&server, token()), &mapper).await.unwrap();
    assert_eq!(report.sent, vec!["Northgate"]);

    let requests = server.received_requests().await.unwrap();
    let edit = requests
        .iter()
        .find(|r| r.url.path().ends_with("/applyEdits"))
        .unwrap();
    assert!(!String::from_utf8_lossy(&edit.body).contains("999"));
}

#[tokio::test]
async fn test_duplicate_remote_names_last_wins() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Dup", "status": "open"}])).await;
    mount_features(&server, &[("Dup", 1), ("Dup", 2)]).await;
    mount_edit(&server, "2", edit_ok(2), 1).await;
    mount_edit(&server, "1", edit_ok(1), 0).await;

    let report = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap();
    assert_eq!(report.sent, vec!["Dup"]);
}

// ===========================================================================
// Credentials
// ===========================================================================

#[tokio::test]
async fn test_username_credential_is_exchanged_once_per_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sharing/generateToken"))
        .and(query_param("username", "svc_sync"))
        .and(query_param("password", "hunter2"))
        .and(query_param("f", "json"))
        .and(query_param("referer", "localhost"))
        .and(query_param("expiration", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "issued-token",
            "expires": 1700000000000_i64,
            "ssl": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_source(
        &server,
        json!([{"name": "A", "status": "x"}, {"name": "B", "status": "y"}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER)))
        .and(query_param("token", "issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                {"attributes": {"pa_name": "A", "OBJECTID": 1}},
                {"attributes": {"pa_name": "B", "OBJECTID": 2}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER)))
        .and(body_string_contains("issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updateResults": []})))
        .expect(2)
        .mount(&server)
        .await;

    let credential = Credential::UsernamePassword {
        username: "svc_sync".into(),
        password: "hunter2".into(),
    };
    let summary = reconcile_with_summary(&config(&server, credential), &status_mapper)
        .await
        .unwrap();

    assert_eq!(summary.report.sent, vec!["A", "B"]);
    assert_eq!(summary.source_count, 2);
    assert_eq!(summary.index_size, 2);
    assert!(summary.completed_at >= summary.started_at);
}

#[tokio::test]
async fn test_token_credential_makes_no_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sharing/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "other"})))
        .expect(0)
        .mount(&server)
        .await;

    let token = resolve_token(&config(&server, token())).await.unwrap();
    assert_eq!(token, "tok-123");
}

#[tokio::test]
async fn test_rejected_credential_aborts_before_loading() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sharing/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 400, "message": "Unable to generate token.", "details": ["Invalid username or password."]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/source.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let credential = Credential::UsernamePassword {
        username: "svc_sync".into(),
        password: "wrong".into(),
    };
    let err = reconcile(&config(&server, credential), &status_mapper)
        .await
        .unwrap_err();
    match err {
        ReconcileError::Auth(AuthError::Rejected { code, message }) => {
            assert_eq!(code, 400);
            assert!(message.contains("Invalid username or password."));
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn account() -> Credential {
    Credential::UsernamePassword {
        username: "svc_sync".into(),
        password: "hunter2".into(),
    }
}

#[tokio::test]
async fn test_token_reply_without_token_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sharing/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/source.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = reconcile(&config(&server, account()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Auth(AuthError::MissingToken)));
}

#[tokio::test]
async fn test_token_endpoint_http_error_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sharing/generateToken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = reconcile(&config(&server, account()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Auth(AuthError::Status { status: 500 })
    ));
}

// ===========================================================================
// Fatal errors
// ===========================================================================

#[tokio::test]
async fn test_query_http_error_is_fatal_and_sends_nothing() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Northgate", "status": "open"}])).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER)))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    mount_edit(&server, "101", edit_ok(101), 0).await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Remote(RemoteError::Status { status: 500 })
    ));
}

#[tokio::test]
async fn test_source_failure_is_fatal_and_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/source.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_features(&server, &[("Northgate", 101)]).await;
    mount_edit(&server, "101", edit_ok(101), 0).await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Source(SourceError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_source_body_must_be_an_array() {
    let server = MockServer::start().await;
    mount_source(&server, json!({"records": []})).await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Source(SourceError::NotAnArray)));
}

#[tokio::test]
async fn test_query_error_object_is_fatal() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Northgate", "status": "open"}])).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 498, "message": "Invalid token.", "details": []}
        })))
        .mount(&server)
        .await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Remote(RemoteError::Service { code: 498, .. })
    ));
}

#[tokio::test]
async fn test_strict_duplicates_abort_the_run() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Dup", "status": "open"}])).await;
    mount_features(&server, &[("Dup", 1), ("Dup", 2)]).await;

    let mut config = config(&server, token());
    config.strict_duplicates = true;
    let err = reconcile(&config, &status_mapper).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Remote(RemoteError::DuplicateName { ref name }) if name == "Dup"
    ));
}

#[tokio::test]
async fn test_update_http_failure_aborts_mid_run() {
    let server = MockServer::start().await;
    mount_source(
        &server,
        json!([
            {"name": "A", "status": "x"},
            {"name": "B", "status": "x"},
            {"name": "C", "status": "x"}
        ]),
    )
    .await;
    mount_features(&server, &[("A", 1), ("B", 2), ("C", 3)]).await;
    mount_edit(&server, "1", edit_ok(1), 1).await;
    mount_edit(&server, "2", ResponseTemplate::new(502), 1).await;
    mount_edit(&server, "3", edit_ok(3), 0).await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    match err {
        ReconcileError::Update { name, source } => {
            assert_eq!(name, "B");
            assert!(matches!(source, UpdateError::Status { status: 502 }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_mapping_failure_aborts_before_sending() {
    let server = MockServer::start().await;
    mount_source(&server, json!([{"name": "Northgate"}])).await;
    mount_features(&server, &[("Northgate", 101)]).await;
    mount_edit(&server, "101", edit_ok(101), 0).await;

    let err = reconcile(&config(&server, token()), &status_mapper)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Mapping { ref name, source: MappingError::MissingField(_) } if name == "Northgate"
    ));
}

// ===========================================================================
// Read-only operations
// ===========================================================================

#[tokio::test]
async fn test_plan_sends_no_updates() {
    let server = MockServer::start().await;
    mount_source(
        &server,
        json!([{"name": "Northgate"}, {"name": "Eastway"}]),
    )
    .await;
    mount_features(&server, &[("Northgate", 101)]).await;
    mount_edit(&server, "101", edit_ok(101), 0).await;

    let plan = plan(&config(&server, token())).await.unwrap();
    assert_eq!(
        plan.matched,
        vec![("Northgate".to_string(), RemoteId::new("101"))]
    );
    assert_eq!(plan.failures, vec!["Eastway"]);
}

#[tokio::test]
async fn test_fetch_remote_index_skips_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/source.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    mount_features(&server, &[("Northgate", 101), ("Albany", 102)]).await;

    let index = fetch_remote_index(&config(&server, token())).await.unwrap();
    assert_eq!(index.len(), 2);
    let names: Vec<&str> = index.sorted_entries().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["Albany", "Northgate"]);
}

// ===========================================================================
// Config-driven run
// ===========================================================================

#[tokio::test]
async fn test_run_from_config_file_with_field_mapping() {
    let server = MockServer::start().await;
    mount_source(
        &server,
        json!([{"name": "Northgate", "status": "open", "votes": 12, "notes": ["x"]}]),
    )
    .await;
    mount_features(&server, &[("Northgate", 101)]).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER)))
        .and(body_string_contains(r#""OBJECTID":"101""#))
        .and(body_string_contains(r#""STATUS":"open""#))
        .and(body_string_contains(r#""VOTES":12"#))
        .and(body_string_contains("e2e-token"))
        .respond_with(edit_ok(101))
        .expect(1)
        .mount(&server)
        .await;

    std::env::set_var("FEATURESYNC_E2E_TOKEN", "e2e-token");
    let toml = format!(
        r#"
[run]
timeout_secs = 10

[source]
url = "{uri}/source.json"

[feature_service]
url = "{uri}{layer}"

[auth]
mode = "token"
token_env = "FEATURESYNC_E2E_TOKEN"

[mapping]
fields = {{ STATUS = "status", VOTES = "votes" }}
"#,
        uri = server.uri(),
        layer = LAYER,
    );
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();

    let app = AppConfig::load_and_resolve(file.path()).unwrap();
    let run_config = app.reconciliation_config().unwrap();
    let mapper = FieldMapping::new(&app.mapping, &app.source.name_field);

    let report = reconcile(&run_config, &mapper).await.unwrap();
    assert_eq!(report.sent, vec!["Northgate"]);
}
