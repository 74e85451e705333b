//! REST endpoints for the onboarding UI and back-office tools.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::WorkflowError;

use super::approvals::Decision;
use super::catalog::StageId;
use super::engine::ResetOptions;
use super::model::PartnerProfile;
use super::service::OnboardingService;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub service: Arc<OnboardingService>,
}

#[derive(Debug, Deserialize)]
struct ResetQuery {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ReasonBody {
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentBody {
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DecisionKind {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalBody {
    decision: DecisionKind,
    decided_by: String,
    reason: Option<String>,
}

fn error_response(e: WorkflowError) -> Response {
    let status = match &e {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        WorkflowError::Persistence(_)
        | WorkflowError::DocumentStorage(_)
        | WorkflowError::InvalidPersistedState(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::CONFLICT,
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}

fn parse_stage(stage: &str) -> Result<StageId, WorkflowError> {
    stage.parse().map_err(|_| WorkflowError::UnknownStage(stage.to_string()))
}

/// POST /api/partners/{partner_id}/onboarding
///
/// Starts onboarding for the partner, or resumes it if a session exists.
async fn initialize(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
    Json(profile): Json<PartnerProfile>,
) -> Response {
    let engine = state.service.engine_for(&partner_id).await;
    respond(engine.initialize(profile).await)
}

/// GET /api/partners/{partner_id}/onboarding
///
/// Unknown partners get a 404 without an engine being created for them.
async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
) -> Response {
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.session().await)
}

/// DELETE /api/partners/{partner_id}/onboarding?reason=...
async fn reset(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
    Query(query): Query<ResetQuery>,
) -> Response {
    let reason = query.reason.unwrap_or_else(|| "requested via API".to_string());
    match state.service.reset(&partner_id, ResetOptions::full(reason)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/partners/{partner_id}/onboarding/advance
async fn advance(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
) -> Response {
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.request_advance().await)
}

/// POST /api/partners/{partner_id}/onboarding/messages
async fn post_message(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Response {
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.append_partner_message(&body.content).await)
}

/// GET /api/partners/{partner_id}/onboarding/pending-approvals
async fn partner_pending_approvals(
    State(state): State<OnboardingRouteState>,
    Path(partner_id): Path<String>,
) -> Response {
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    Json(engine.pending_approvals().await).into_response()
}

/// POST /api/partners/{partner_id}/onboarding/stages/{stage}/skip
async fn skip_stage(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage)): Path<(String, String)>,
    Json(body): Json<ReasonBody>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.skip_stage(stage, &body.reason).await)
}

/// POST /api/partners/{partner_id}/onboarding/stages/{stage}/documents/{document}
async fn submit_document(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, document)): Path<(String, String, String)>,
    Json(body): Json<DocumentBody>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.submit_document(stage, &document, &body.file_name).await)
}

/// POST .../documents/{document}/upload?fileName=...
///
/// The request body is the raw file.
async fn upload_document(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, document)): Path<(String, String, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    match engine
        .upload_document(stage, &document, &query.file_name, &body)
        .await
    {
        Ok((document, reference)) => {
            Json(json!({"document": document, "reference": reference})).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST .../documents/{document}/received
async fn document_received(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, document)): Path<(String, String, String)>,
    Json(body): Json<DocumentBody>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(
        engine
            .mark_document_received(stage, &document, &body.file_name)
            .await,
    )
}

/// POST .../documents/{document}/skip
async fn skip_document(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, document)): Path<(String, String, String)>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.skip_optional_document(stage, &document).await)
}

/// POST .../documents/{document}/reject
async fn reject_document(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, document)): Path<(String, String, String)>,
    Json(body): Json<ReasonBody>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(engine.reject_document(stage, &document, &body.reason).await)
}

/// POST /api/partners/{partner_id}/onboarding/stages/{stage}/approvals/{team}
///
/// Body: `{"decision": "approve" | "reject", "decidedBy": "...", "reason": "..."}`.
/// A rejection needs a reason.
async fn record_approval(
    State(state): State<OnboardingRouteState>,
    Path((partner_id, stage, team)): Path<(String, String, String)>,
    Json(body): Json<ApprovalBody>,
) -> Response {
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(e) => return error_response(e),
    };
    let decision = match (body.decision, body.reason) {
        (DecisionKind::Approve, _) => Decision::Approve,
        (DecisionKind::Reject, Some(reason)) if !reason.trim().is_empty() => Decision::Reject { reason },
        (DecisionKind::Reject, _) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "a rejection needs a reason"})),
            )
                .into_response();
        }
    };

    let engine = match state.service.existing_engine(&partner_id).await {
        Ok(engine) => engine,
        Err(e) => return error_response(e),
    };
    respond(
        engine
            .record_approval(stage, &team, decision, &body.decided_by)
            .await,
    )
}

/// GET /api/onboarding/pending-approvals
///
/// Waiting sign-offs across every partner loaded in this process.
async fn pending_approvals(State(state): State<OnboardingRouteState>) -> Response {
    Json(state.service.pending_approvals().await).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(service: Arc<OnboardingService>) -> Router {
    let state = OnboardingRouteState { service };
    let stage = "/api/partners/{partner_id}/onboarding/stages/{stage}";

    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/pending-approvals", get(pending_approvals))
        .route(
            "/api/partners/{partner_id}/onboarding",
            post(initialize).get(get_session).delete(reset),
        )
        .route("/api/partners/{partner_id}/onboarding/advance", post(advance))
        .route("/api/partners/{partner_id}/onboarding/messages", post(post_message))
        .route(
            "/api/partners/{partner_id}/onboarding/pending-approvals",
            get(partner_pending_approvals),
        )
        .route(&format!("{stage}/skip"), post(skip_stage))
        .route(&format!("{stage}/documents/{{document}}"), post(submit_document))
        .route(&format!("{stage}/documents/{{document}}/upload"), post(upload_document))
        .route(&format!("{stage}/documents/{{document}}/received"), post(document_received))
        .route(&format!("{stage}/documents/{{document}}/skip"), post(skip_document))
        .route(&format!("{stage}/documents/{{document}}/reject"), post(reject_document))
        .route(&format!("{stage}/approvals/{{team}}"), post(record_approval))
        .with_state(state)
}
