//! End-to-end scenarios for the onboarding workflow engine.
//!
//! Engines run against the libSQL backend (in-memory or a temp file) so the
//! persisted snapshot is exercised exactly as the server uses it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;

use partner_onboard::config::OnboardingConfig;
use partner_onboard::error::{DatabaseError, PortError, WorkflowError};
use partner_onboard::onboarding::documents::SKIPPED_FILE_NAME;
use partner_onboard::onboarding::{
    Decision, DocumentStatus, MessageType, NotificationPort, OnboardingEvent, OnboardingService,
    OnboardingSession, PartnerProfile, Sender, StageEvent, StageId, TracingNotifier,
    WorkflowEngine,
};
use partner_onboard::store::{Database, LibSqlBackend, MemoryDatabase, SessionStore};

fn profile() -> PartnerProfile {
    PartnerProfile::new("Ada Obi", "Kora Remit", "ada@kora.example")
}

fn service_on(db: Arc<dyn Database>) -> OnboardingService {
    OnboardingService::new(
        db,
        Arc::new(TracingNotifier::default()),
        OnboardingConfig::immediate(),
    )
}

fn count_event(session: &OnboardingSession, stage: StageId, event: StageEvent) -> usize {
    session
        .messages
        .iter()
        .filter(|m| m.stage_id() == Some(stage) && m.event() == Some(event))
        .count()
}

/// Upload every required document and approve every team on the current stage.
async fn satisfy_current_stage(engine: &WorkflowEngine) {
    let session = engine.snapshot().await.unwrap();
    let stage = session.current();
    for doc in stage.documents.iter().filter(|d| d.required) {
        engine
            .submit_document(stage.id, &doc.id, &format!("{}.pdf", doc.id))
            .await
            .unwrap();
    }
    for approval in &stage.approvals {
        engine
            .record_approval(stage.id, &approval.team, Decision::Approve, "reviewer@bank")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn partner_runs_the_whole_workflow() {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let service = service_on(db);
    let engine = service.engine_for("partner-1").await;

    let session = engine.initialize(profile()).await.unwrap();
    assert_eq!(session.current_stage, StageId::Nda);
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages.iter().filter(|m| m.sender == Sender::Agent).count(), 1);
    assert_eq!(session.messages.iter().filter(|m| m.sender == Sender::System).count(), 1);

    satisfy_current_stage(&engine).await;
    let session = engine.request_advance().await.unwrap();
    assert_eq!(session.current_stage, StageId::Commercials);
    assert_eq!(session.overall_progress, 14);

    satisfy_current_stage(&engine).await;
    let session = engine.request_advance().await.unwrap();
    assert_eq!(session.current_stage, StageId::Kyc);

    let doc = engine
        .skip_optional_document(StageId::Kyc, "audited_financials")
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Approved);
    assert_eq!(doc.file_name.as_deref(), Some(SKIPPED_FILE_NAME));

    for expected in [
        StageId::Agreement,
        StageId::Integration,
        StageId::Uat,
        StageId::GoLive,
    ] {
        satisfy_current_stage(&engine).await;
        let session = engine.request_advance().await.unwrap();
        assert_eq!(session.current_stage, expected);
    }

    satisfy_current_stage(&engine).await;
    let session = engine.request_advance().await.unwrap();
    assert!(session.is_completed);
    assert_eq!(session.overall_progress, 100);
    assert!(session.activation_date.is_some());
    assert!(session.stages.iter().all(|s| s.completed));

    for stage in StageId::ALL {
        assert_eq!(count_event(&session, stage, StageEvent::Entered), 1, "{stage}");
    }
    assert!(service.pending_approvals().await.is_empty());
}

#[tokio::test]
async fn advance_is_blocked_until_every_gate_is_satisfied() {
    let service = service_on(Arc::new(MemoryDatabase::new()));
    let engine = service.engine_for("partner-1").await;
    engine.initialize(profile()).await.unwrap();

    engine
        .submit_document(StageId::Nda, "signed_nda", "nda.pdf")
        .await
        .unwrap();
    let err = engine.request_advance().await.unwrap_err();
    assert_eq!(err.to_string(), "the nda stage is not complete yet");

    engine
        .record_approval(
            StageId::Nda,
            "Legal",
            Decision::Reject {
                reason: "wrong entity name".into(),
            },
            "legal@bank",
        )
        .await
        .unwrap();
    assert!(engine.request_advance().await.is_err());

    engine
        .reject_document(StageId::Nda, "signed_nda", "wrong entity name")
        .await
        .unwrap();
    engine
        .submit_document(StageId::Nda, "signed_nda", "nda-v2.pdf")
        .await
        .unwrap();
    engine
        .record_approval(StageId::Nda, "Legal", Decision::Approve, "legal@bank")
        .await
        .unwrap();

    let session = engine.request_advance().await.unwrap();
    assert_eq!(session.current_stage, StageId::Commercials);
    let nda = session.stage(StageId::Nda);
    assert_eq!(nda.documents[0].file_name.as_deref(), Some("nda-v2.pdf"));
    assert!(nda.approvals[0].rejection_reason.is_none());
}

#[tokio::test]
async fn resume_after_restart_keeps_progress_without_duplicate_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("onboarding.db");

    {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let engine = service_on(db).engine_for("partner-1").await;
        engine.initialize(profile()).await.unwrap();
        satisfy_current_stage(&engine).await;
        engine.request_advance().await.unwrap();
        engine
            .submit_document(StageId::Commercials, "pricing_proposal", "pricing.pdf")
            .await
            .unwrap();
    }

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let engine = service_on(db).engine_for("partner-1").await;

    let first = engine.initialize(profile()).await.unwrap();
    let second = engine.initialize(profile()).await.unwrap();

    assert_eq!(second.current_stage, StageId::Commercials);
    assert_eq!(
        second.stage(StageId::Commercials).documents[0].status,
        DocumentStatus::Uploaded
    );
    assert_eq!(second.messages.len(), first.messages.len() + 1);
    assert_eq!(count_event(&second, StageId::Nda, StageEvent::Welcome), 1);
    assert_eq!(count_event(&second, StageId::Nda, StageEvent::Entered), 1);
    assert_eq!(count_event(&second, StageId::Commercials, StageEvent::Entered), 1);
    assert_eq!(
        second.messages.last().unwrap().event(),
        Some(StageEvent::WelcomeBack)
    );
}

#[tokio::test]
async fn resume_recognizes_prompts_written_without_metadata() {
    let db = Arc::new(MemoryDatabase::new());
    let config = OnboardingConfig::immediate();
    let store = SessionStore::new(db.clone(), &config);

    let mut session = OnboardingSession::new("partner-1", profile(), Utc::now());
    let legacy = partner_onboard::onboarding::messages::compose(StageId::Nda, StageEvent::Entered, &[])
        .unwrap();
    session.messages.push(partner_onboard::onboarding::ChatMessage {
        metadata: None,
        ..legacy
    });
    store.save(&session).await.unwrap();

    let engine = service_on(db).engine_for("partner-1").await;
    let resumed = engine.initialize(profile()).await.unwrap();

    let prompts = resumed
        .messages
        .iter()
        .filter(|m| m.kind == MessageType::DocumentRequest)
        .count();
    assert_eq!(prompts, 1);
    assert!(resumed.stage(StageId::Nda).messages_initialized);
}

#[tokio::test]
async fn stale_session_starts_over() {
    let db = Arc::new(MemoryDatabase::new());
    let config = OnboardingConfig::immediate();
    let store = SessionStore::new(db.clone(), &config);

    let mut old = OnboardingSession::new("partner-1", profile(), Utc::now());
    old.current_stage = StageId::Kyc;
    old.last_activity = Utc::now() - ChronoDuration::days(8);
    store.save(&old).await.unwrap();

    let engine = service_on(db).engine_for("partner-1").await;
    let session = engine.initialize(profile()).await.unwrap();

    assert_eq!(session.current_stage, StageId::Nda);
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].event(), Some(StageEvent::Welcome));
}

struct FailingNotifier;

#[async_trait]
impl NotificationPort for FailingNotifier {
    async fn notify(&self, event: &OnboardingEvent) -> Result<(), PortError> {
        Err(PortError::Delivery {
            target: event.name().to_string(),
            reason: "smtp down".into(),
        })
    }
}

#[tokio::test]
async fn notification_failures_do_not_fail_operations() {
    let service = OnboardingService::new(
        Arc::new(MemoryDatabase::new()),
        Arc::new(FailingNotifier),
        OnboardingConfig::immediate(),
    );
    let engine = service.engine_for("partner-1").await;

    engine.initialize(profile()).await.unwrap();
    satisfy_current_stage(&engine).await;
    let session = engine.request_advance().await.unwrap();
    assert_eq!(session.current_stage, StageId::Commercials);
}

/// Reads succeed, writes always fail.
struct ReadOnlyDatabase;

#[async_trait]
impl Database for ReadOnlyDatabase {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn get_setting(&self, _owner: &str, _key: &str) -> Result<Option<Value>, DatabaseError> {
        Ok(None)
    }

    async fn set_setting(&self, _owner: &str, _key: &str, _value: &Value) -> Result<(), DatabaseError> {
        Err(DatabaseError::Query("disk full".into()))
    }

    async fn delete_setting(&self, _owner: &str, _key: &str) -> Result<bool, DatabaseError> {
        Ok(false)
    }
}

#[tokio::test]
async fn persistence_failure_is_reported_and_nothing_is_kept() {
    let service = service_on(Arc::new(ReadOnlyDatabase));
    let engine = service.engine_for("partner-1").await;

    let err = engine.initialize(profile()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Persistence(_)));
    assert!(err.to_string().contains("disk full"));
    assert!(engine.snapshot().await.is_none());
}

#[tokio::test]
async fn partners_are_isolated() {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let service = service_on(db);

    let a = service.engine_for("partner-a").await;
    let b = service.engine_for("partner-b").await;
    a.initialize(profile()).await.unwrap();
    b.initialize(PartnerProfile::new("Bo Li", "Li Pay", "bo@lipay.example"))
        .await
        .unwrap();

    satisfy_current_stage(&a).await;
    a.request_advance().await.unwrap();

    assert_eq!(a.snapshot().await.unwrap().current_stage, StageId::Commercials);
    assert_eq!(b.snapshot().await.unwrap().current_stage, StageId::Nda);
    assert_eq!(b.snapshot().await.unwrap().partner_info.organization, "Li Pay");
}
