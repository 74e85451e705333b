//! Integration tests for the onboarding REST surface.
//!
//! Requests go straight into the router through `tower::ServiceExt::oneshot`,
//! so every test exercises the real JSON contract without binding a port.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use partner_onboard::config::OnboardingConfig;
use partner_onboard::error::PortError;
use partner_onboard::onboarding::{
    DocumentMetadata, DocumentSink, OnboardingService, TracingNotifier, onboarding_routes,
};
use partner_onboard::store::LibSqlBackend;

const BASE: &str = "/api/partners/partner-1/onboarding";

struct NullSink;

#[async_trait]
impl DocumentSink for NullSink {
    async fn persist(&self, file: &[u8], metadata: &DocumentMetadata) -> Result<String, PortError> {
        Ok(format!("mem://{}/{}/{}", metadata.partner_id, metadata.document_id, file.len()))
    }
}

async fn service() -> Arc<OnboardingService> {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let service = OnboardingService::new(
        db,
        Arc::new(TracingNotifier::default()),
        OnboardingConfig::immediate(),
    )
    .with_document_sink(Arc::new(NullSink));
    Arc::new(service)
}

async fn app() -> Router {
    onboarding_routes(service().await)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start(app: &Router) -> Value {
    let (status, body) = send(
        app,
        "POST",
        BASE,
        Some(json!({"name": "Ada Obi", "organization": "Kora Remit", "email": "ada@kora.example"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn initialize_then_fetch_session() {
    let app = app().await;
    let created = start(&app).await;
    assert_eq!(created["currentStage"], "nda");
    assert_eq!(created["messages"].as_array().unwrap().len(), 2);
    assert_eq!(created["messages"][1]["type"], "document-request");
    assert_eq!(created["stages"].as_array().unwrap().len(), 7);
    assert_eq!(created["stages"][6]["id"], "go-live");

    let (status, fetched) = send(&app, "GET", BASE, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["partnerId"], "partner-1");
    assert_eq!(fetched["partnerInfo"]["organization"], "Kora Remit");
}

#[tokio::test]
async fn unknown_partner_is_404() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/partners/ghost/onboarding", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn unknown_partners_leave_no_engines_behind() {
    let service = service().await;
    let app = onboarding_routes(service.clone());

    for i in 0..50 {
        let base = format!("/api/partners/ghost-{i}/onboarding");
        let (status, _) = send(&app, "GET", &base, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", &format!("{base}/advance"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &format!("{base}/pending-approvals"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    assert!(service.partners().await.is_empty());

    start(&app).await;
    assert_eq!(service.partners().await, vec!["partner-1".to_string()]);

    let (status, _) = send(&app, "DELETE", BASE, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(service.partners().await.is_empty());

    let (status, _) = send(&app, "DELETE", "/api/partners/ghost/onboarding", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(service.partners().await.is_empty());
}

#[tokio::test]
async fn nda_stage_through_the_api() {
    let app = app().await;
    start(&app).await;

    let (status, body) = send(&app, "POST", &format!("{BASE}/advance"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "the nda stage is not complete yet");

    let (status, doc) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/nda/documents/signed_nda"),
        Some(json!({"fileName": "nda.pdf"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["status"], "uploaded");
    assert_eq!(doc["fileName"], "nda.pdf");

    let (status, approval) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/nda/approvals/Legal"),
        Some(json!({"decision": "approve", "decidedBy": "legal@bank"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["status"], "approved");
    assert_eq!(approval["approvedBy"], "legal@bank");

    let (status, session) = send(&app, "POST", &format!("{BASE}/advance"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["currentStage"], "commercials");
    assert_eq!(session["overallProgress"], 14);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let app = app().await;
    start(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/onboarding/documents/signed_nda"),
        Some(json!({"fileName": "x.pdf"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/approvals/Marketing"),
        Some(json!({"decision": "approve", "decidedBy": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/documents/aml_policy/skip"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cannot skip a required document: aml_policy");

    let (status, _) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/skip"),
        Some(json!({"reason": "in a hurry"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/nda/approvals/Legal"),
        Some(json!({"decision": "reject", "decidedBy": "legal@bank"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "a rejection needs a reason");
}

#[tokio::test]
async fn optional_documents_and_stage_skips() {
    let app = app().await;
    start(&app).await;

    let (status, doc) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/documents/regulatory_license/skip"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["status"], "approved");
    assert_eq!(doc["fileName"], "Skipped (Optional)");

    let (status, session) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/uat/skip"),
        Some(json!({"reason": "pre-certified platform"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["currentStage"], "nda");
    let uat = &session["stages"][5];
    assert_eq!(uat["skipped"], true);
    assert_eq!(uat["skipReason"], "pre-certified platform");
    assert_eq!(session["overallProgress"], 14);
}

#[tokio::test]
async fn upload_received_and_reject_documents() {
    let app = app().await;
    start(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("{BASE}/stages/kyc/documents/aml_policy/upload?fileName=aml.pdf"))
        .body(Body::from(vec![1u8, 2, 3, 4]))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["reference"], "mem://partner-1/aml_policy/4");
    assert_eq!(body["document"]["status"], "uploaded");

    let (status, doc) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/documents/aml_policy/reject"),
        Some(json!({"reason": "policy is out of date"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["status"], "rejected");
    assert_eq!(doc["rejectionReason"], "policy is out of date");

    let (status, doc) = send(
        &app,
        "POST",
        &format!("{BASE}/stages/kyc/documents/aml_policy/received"),
        Some(json!({"fileName": "aml-2025.pdf"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["status"], "received");
}

#[tokio::test]
async fn messages_pending_approvals_and_reset() {
    let app = app().await;
    start(&app).await;

    let (status, message) = send(
        &app,
        "POST",
        &format!("{BASE}/messages"),
        Some(json!({"content": "Where do I find the NDA template?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["sender"], "partner");
    assert_eq!(message["type"], "message");

    let (status, pending) = send(&app, "GET", "/api/onboarding/pending-approvals", None).await;
    assert_eq!(status, StatusCode::OK);
    let pending = pending.as_array().unwrap();
    assert_eq!(pending[0]["partnerId"], "partner-1");
    assert_eq!(pending[0]["stageId"], "nda");
    assert_eq!(pending[0]["team"], "Legal");

    let (status, own) = send(&app, "GET", &format!("{BASE}/pending-approvals"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own.as_array().unwrap().len(), pending.len());

    let (status, _) = send(&app, "DELETE", &format!("{BASE}?reason=duplicate%20account"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", BASE, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
