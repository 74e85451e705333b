//! WorkflowEngine: drives one partner's onboarding session.
//!
//! Every mutation runs against a draft copy of the session: the operation
//! edits the draft, progress is recomputed, the full snapshot is saved and
//! only then does the draft replace the in-memory session. A rejected
//! operation or a failed save therefore leaves both copies untouched.
//! Messages appended by a mutation are broadcast to subscribers after the
//! save succeeds, and notifications go out after the lock is released.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, RwLockWriteGuard, broadcast};
use tracing::{debug, info, warn};

use crate::config::OnboardingConfig;
use crate::error::{PortError, WorkflowError};
use crate::store::SessionStore;

use super::approvals::{self, Decision, PendingApproval};
use super::catalog::{self, StageId};
use super::documents;
use super::messages::{self, ChatMessage, StageEvent};
use super::model::{ComplianceDocument, OnboardingSession, PartnerProfile, StageApproval};
use super::notify::{DocumentMetadata, DocumentSink, NotificationPort, OnboardingEvent};
use super::progress;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// What `reset` should clear.
#[derive(Debug, Clone)]
pub struct ResetOptions {
    pub clear_persistence: bool,
    pub clear_in_memory: bool,
    pub reason: String,
}

impl ResetOptions {
    /// Clear both the persisted record and the in-memory session.
    pub fn full(reason: impl Into<String>) -> Self {
        Self {
            clear_persistence: true,
            clear_in_memory: true,
            reason: reason.into(),
        }
    }
}

/// Where the current stage moved after an advance or skip.
enum Transition {
    Stay,
    Entered(StageId),
    Finished,
}

/// Owns the session of a single partner.
pub struct WorkflowEngine {
    partner_id: String,
    store: Arc<SessionStore>,
    notifier: Arc<dyn NotificationPort>,
    documents: Option<Arc<dyn DocumentSink>>,
    config: OnboardingConfig,
    session: RwLock<Option<OnboardingSession>>,
    tx: broadcast::Sender<ChatMessage>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("partner_id", &self.partner_id)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn new(
        partner_id: impl Into<String>,
        store: Arc<SessionStore>,
        notifier: Arc<dyn NotificationPort>,
        config: OnboardingConfig,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            partner_id: partner_id.into(),
            store,
            notifier,
            documents: None,
            config,
            session: RwLock::new(None),
            tx,
        }
    }

    /// Attach file storage used by `upload_document`.
    pub fn with_document_sink(mut self, sink: Arc<dyn DocumentSink>) -> Self {
        self.documents = Some(sink);
        self
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    /// Receive every chat message appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.tx.subscribe()
    }

    /// Clone of the in-memory session, if one is loaded.
    pub async fn snapshot(&self) -> Option<OnboardingSession> {
        self.session.read().await.clone()
    }

    /// The current session, loading the persisted one without resume side effects.
    pub async fn session(&self) -> Result<OnboardingSession, WorkflowError> {
        let mut guard = self.session.write().await;
        self.load_into(&mut guard).await?;
        guard
            .clone()
            .ok_or_else(|| WorkflowError::SessionNotFound(self.partner_id.clone()))
    }

    /// Start onboarding, or resume the existing session.
    ///
    /// Resuming appends a welcome-back line and re-checks the current stage's
    /// entry prompt through the duplicate guard; the profile argument is
    /// ignored because the stored profile is authoritative.
    pub async fn initialize(
        self: &Arc<Self>,
        profile: PartnerProfile,
    ) -> Result<OnboardingSession, WorkflowError> {
        let mut guard = self.session.write().await;
        self.load_into(&mut guard).await?;

        if let Some(existing) = guard.as_ref() {
            let mut draft = existing.clone();
            let before = draft.messages.len();
            let stage = draft.current_stage;
            let name = draft.partner_info.name.clone();
            let progress = draft.overall_progress.to_string();
            append(
                &mut draft,
                stage,
                StageEvent::WelcomeBack,
                &[("partner", name), ("progress", progress)],
            );
            if !draft.is_completed {
                send_stage_specific_message(&mut draft, stage);
            }
            let snapshot = self.commit(&mut guard, draft, before).await?;
            drop(guard);

            info!(partner_id = %self.partner_id, stage = %stage, "Onboarding session resumed");
            self.notify(OnboardingEvent::SessionResumed {
                partner_id: self.partner_id.clone(),
                stage,
            })
            .await;
            return Ok(snapshot);
        }

        let now = Utc::now();
        let organization = profile.organization.clone();
        let mut draft = OnboardingSession::new(&self.partner_id, profile, now);
        let first = catalog::first();
        let name = draft.partner_info.name.clone();
        append(
            &mut draft,
            first,
            StageEvent::Welcome,
            &[("partner", name), ("organization", organization.clone())],
        );

        let immediate = self.config.welcome_delay.is_zero();
        if immediate {
            send_stage_specific_message(&mut draft, first);
        }
        let snapshot = self.commit(&mut guard, draft, 0).await?;
        drop(guard);

        if !immediate {
            self.schedule_stage_prompt(first);
        }

        info!(partner_id = %self.partner_id, organization = %organization, "Onboarding session created");
        self.notify(OnboardingEvent::SessionStarted {
            partner_id: self.partner_id.clone(),
            organization,
        })
        .await;
        Ok(snapshot)
    }

    /// Record a partner upload for a stage document.
    pub async fn submit_document(
        &self,
        stage: StageId,
        document_id: &str,
        file_name: &str,
    ) -> Result<ComplianceDocument, WorkflowError> {
        let doc = self
            .mutate(|s| {
                let now = Utc::now();
                let doc = documents::submit_document(s.stage_mut(stage), document_id, file_name, now)?;
                append(
                    s,
                    stage,
                    StageEvent::DocumentSubmitted,
                    &[("document", doc.label.clone()), ("file_name", file_name.to_string())],
                );
                Ok(doc)
            })
            .await?;

        self.notify_document(stage, &doc).await;
        Ok(doc)
    }

    /// Record a document that arrived outside the upload flow.
    pub async fn mark_document_received(
        &self,
        stage: StageId,
        document_id: &str,
        file_name: &str,
    ) -> Result<ComplianceDocument, WorkflowError> {
        let doc = self
            .mutate(|s| {
                let now = Utc::now();
                let doc = documents::mark_received(s.stage_mut(stage), document_id, file_name, now)?;
                append(
                    s,
                    stage,
                    StageEvent::DocumentReceived,
                    &[("document", doc.label.clone()), ("file_name", file_name.to_string())],
                );
                Ok(doc)
            })
            .await?;

        self.notify_document(stage, &doc).await;
        Ok(doc)
    }

    /// Approve an optional document without a file.
    pub async fn skip_optional_document(
        &self,
        stage: StageId,
        document_id: &str,
    ) -> Result<ComplianceDocument, WorkflowError> {
        let doc = self
            .mutate(|s| {
                let doc = documents::skip_optional_document(s.stage_mut(stage), document_id, Utc::now())?;
                append(
                    s,
                    stage,
                    StageEvent::DocumentSkipped,
                    &[("document", doc.label.clone())],
                );
                Ok(doc)
            })
            .await?;

        self.notify_document(stage, &doc).await;
        Ok(doc)
    }

    /// Send a document back to the partner.
    pub async fn reject_document(
        &self,
        stage: StageId,
        document_id: &str,
        reason: &str,
    ) -> Result<ComplianceDocument, WorkflowError> {
        let doc = self
            .mutate(|s| {
                let doc = documents::reject_document(s.stage_mut(stage), document_id, reason)?;
                append(
                    s,
                    stage,
                    StageEvent::DocumentRejected,
                    &[("document", doc.label.clone()), ("reason", reason.to_string())],
                );
                Ok(doc)
            })
            .await?;

        self.notify_document(stage, &doc).await;
        Ok(doc)
    }

    /// Store the file through the document sink, then record the upload.
    ///
    /// The session and document are checked first so a rejected upload
    /// never reaches storage.
    ///
    /// Returns the updated document and the sink's storage reference.
    pub async fn upload_document(
        &self,
        stage: StageId,
        document_id: &str,
        file_name: &str,
        file: &[u8],
    ) -> Result<(ComplianceDocument, String), WorkflowError> {
        let session = self.session().await?;
        documents::ensure_deliverable(session.stage(stage), document_id)?;
        let sink = self
            .documents
            .as_ref()
            .ok_or_else(|| PortError::Storage("no document storage configured".to_string()))?;

        let metadata = DocumentMetadata {
            partner_id: self.partner_id.clone(),
            stage,
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            content_length: file.len(),
        };
        let reference = sink.persist(file, &metadata).await?;
        debug!(partner_id = %self.partner_id, document_id, reference = %reference, "Document stored");

        let doc = self.submit_document(stage, document_id, file_name).await?;
        Ok((doc, reference))
    }

    /// Record a team's decision on a stage.
    pub async fn record_approval(
        &self,
        stage: StageId,
        team: &str,
        decision: Decision,
        decided_by: &str,
    ) -> Result<StageApproval, WorkflowError> {
        let approval = self
            .mutate(|s| {
                let approval =
                    approvals::record_approval(s.stage_mut(stage), team, &decision, decided_by, Utc::now())?;
                match &decision {
                    Decision::Approve => {
                        append(s, stage, StageEvent::ApprovalGranted, &[("team", team.to_string())])
                    }
                    Decision::Reject { reason } => append(
                        s,
                        stage,
                        StageEvent::ApprovalRejected,
                        &[("team", team.to_string()), ("reason", reason.clone())],
                    ),
                }
                Ok(approval)
            })
            .await?;

        info!(
            partner_id = %self.partner_id,
            stage = %stage,
            team,
            status = ?approval.status,
            "Approval recorded"
        );
        self.notify(OnboardingEvent::ApprovalRecorded {
            partner_id: self.partner_id.clone(),
            stage,
            team: team.to_string(),
            status: approval.status,
        })
        .await;
        Ok(approval)
    }

    /// Close the current stage and move to the next one.
    ///
    /// On the last stage this completes onboarding instead. The completion
    /// message is saved before the next stage's entry prompt is evaluated.
    pub async fn request_advance(&self) -> Result<OnboardingSession, WorkflowError> {
        let (from, transition) = self
            .mutate(|s| {
                if s.is_completed {
                    return Err(WorkflowError::SessionCompleted);
                }
                let from = s.current_stage;
                progress::refresh(s);
                if !s.current().completed {
                    return Err(WorkflowError::StageNotComplete(from));
                }
                s.stage_mut(from).completed = true;
                Ok((from, move_past(s, from)))
            })
            .await?;

        self.finish_transition(from, transition).await
    }

    /// Skip a stage that allows skipping.
    pub async fn skip_stage(
        &self,
        stage: StageId,
        reason: &str,
    ) -> Result<OnboardingSession, WorkflowError> {
        let transition = self
            .mutate(|s| {
                if s.is_completed {
                    return Err(WorkflowError::SessionCompleted);
                }
                let instance = s.stage(stage);
                if !instance.definition().can_skip || instance.completed {
                    return Err(WorkflowError::CannotSkipStage(stage));
                }

                let instance = s.stage_mut(stage);
                instance.skipped = true;
                instance.skip_reason = Some(reason.to_string());
                instance.completed = true;
                append(s, stage, StageEvent::Skipped, &[("reason", reason.to_string())]);

                if s.current_stage == stage {
                    Ok(move_past(s, stage))
                } else {
                    Ok(Transition::Stay)
                }
            })
            .await?;

        info!(partner_id = %self.partner_id, stage = %stage, reason, "Stage skipped");
        self.notify(OnboardingEvent::StageSkipped {
            partner_id: self.partner_id.clone(),
            stage,
            reason: reason.to_string(),
        })
        .await;

        self.finish_transition(stage, transition).await
    }

    /// Clear persisted and/or in-memory state.
    pub async fn reset(&self, options: ResetOptions) -> Result<(), WorkflowError> {
        let mut guard = self.session.write().await;
        if options.clear_in_memory {
            *guard = None;
        }
        let deleted = if options.clear_persistence {
            self.store.delete(&self.partner_id).await?
        } else {
            false
        };
        drop(guard);

        info!(
            partner_id = %self.partner_id,
            reason = %options.reason,
            clear_persistence = options.clear_persistence,
            clear_in_memory = options.clear_in_memory,
            deleted,
            "Onboarding session reset"
        );
        self.notify(OnboardingEvent::SessionReset {
            partner_id: self.partner_id.clone(),
            reason: options.reason,
        })
        .await;
        Ok(())
    }

    /// Approvals still waiting on a team.
    pub async fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.session
            .read()
            .await
            .as_ref()
            .map(approvals::pending_approvals)
            .unwrap_or_default()
    }

    /// Record a free-form line from the partner.
    pub async fn append_partner_message(&self, content: &str) -> Result<ChatMessage, WorkflowError> {
        self.mutate(|s| {
            let message = ChatMessage::partner(content);
            s.messages.push(message.clone());
            Ok(message)
        })
        .await
    }

    /// Append the entry prompt for `stage` unless it was already sent.
    ///
    /// Returns whether a message was appended.
    pub async fn send_stage_specific_message(&self, stage: StageId) -> Result<bool, WorkflowError> {
        self.mutate(|s| Ok(send_stage_specific_message(s, stage))).await
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Emit the entry prompt after the configured pacing delay.
    fn schedule_stage_prompt(self: &Arc<Self>, stage: StageId) {
        let engine = Arc::clone(self);
        let delay = self.config.welcome_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match engine.send_stage_specific_message(stage).await {
                Ok(sent) => debug!(partner_id = %engine.partner_id, stage = %stage, sent, "Delayed stage prompt"),
                // A reset in the meantime leaves nothing to prompt; resume recovers otherwise.
                Err(e) => warn!(partner_id = %engine.partner_id, stage = %stage, error = %e, "Delayed stage prompt failed"),
            }
        });
    }

    /// Entry prompt, logging and notifications after an advance or skip.
    async fn finish_transition(
        &self,
        from: StageId,
        transition: Transition,
    ) -> Result<OnboardingSession, WorkflowError> {
        match transition {
            Transition::Stay => {}
            Transition::Entered(next) => {
                // The advance is already saved; resume re-sends a lost prompt.
                if let Err(e) = self.send_stage_specific_message(next).await {
                    warn!(partner_id = %self.partner_id, stage = %next, error = %e, "Stage prompt not saved");
                }
                info!(partner_id = %self.partner_id, from = %from, to = %next, "Stage advanced");
                self.notify(OnboardingEvent::StageAdvanced {
                    partner_id: self.partner_id.clone(),
                    from,
                    to: next,
                })
                .await;
            }
            Transition::Finished => {
                let activation_date = self
                    .session
                    .read()
                    .await
                    .as_ref()
                    .and_then(|s| s.activation_date)
                    .unwrap_or_else(Utc::now);
                info!(partner_id = %self.partner_id, activation_date = %activation_date, "Onboarding completed");
                self.notify(OnboardingEvent::OnboardingCompleted {
                    partner_id: self.partner_id.clone(),
                    activation_date,
                })
                .await;
            }
        }

        self.snapshot()
            .await
            .ok_or_else(|| WorkflowError::SessionNotFound(self.partner_id.clone()))
    }

    /// Make `guard` hold the live session, if there is one.
    ///
    /// An in-memory session idle past the staleness window is dropped along
    /// with its persisted record, the same as a stale record on load.
    async fn load_into(
        &self,
        guard: &mut RwLockWriteGuard<'_, Option<OnboardingSession>>,
    ) -> Result<(), WorkflowError> {
        if let Some(current) = guard.as_ref()
            && self.store.is_expired(current, Utc::now())
        {
            info!(partner_id = %self.partner_id, "Discarding stale onboarding session");
            **guard = None;
            self.store.delete(&self.partner_id).await?;
        }
        if guard.is_none() {
            **guard = self.store.load(&self.partner_id).await?;
        }
        Ok(())
    }

    /// Apply `op` to a draft of the session and commit it.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut OnboardingSession) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let mut guard = self.session.write().await;
        self.load_into(&mut guard).await?;
        let Some(current) = guard.as_ref() else {
            return Err(WorkflowError::SessionNotFound(self.partner_id.clone()));
        };

        let mut draft = current.clone();
        let before = draft.messages.len();
        let out = match op(&mut draft) {
            Ok(out) => out,
            Err(e) => {
                debug!(partner_id = %self.partner_id, error = %e, "Onboarding operation rejected");
                return Err(e);
            }
        };
        self.commit(&mut guard, draft, before).await?;
        Ok(out)
    }

    /// Recompute progress, save, swap in the draft and broadcast new messages.
    async fn commit(
        &self,
        guard: &mut RwLockWriteGuard<'_, Option<OnboardingSession>>,
        mut draft: OnboardingSession,
        before: usize,
    ) -> Result<OnboardingSession, WorkflowError> {
        progress::refresh(&mut draft);
        draft.touch(Utc::now());

        if let Err(e) = self.store.save(&draft).await {
            warn!(partner_id = %self.partner_id, error = %e, "Failed to persist onboarding session");
            return Err(e.into());
        }

        for message in &draft.messages[before..] {
            // Ok if nobody is listening
            let _ = self.tx.send(message.clone());
        }
        **guard = Some(draft.clone());
        Ok(draft)
    }

    async fn notify_document(&self, stage: StageId, doc: &ComplianceDocument) {
        debug!(
            partner_id = %self.partner_id,
            stage = %stage,
            document_id = %doc.id,
            status = %doc.status,
            "Document updated"
        );
        self.notify(OnboardingEvent::DocumentSubmitted {
            partner_id: self.partner_id.clone(),
            stage,
            document_id: doc.id.clone(),
            status: doc.status,
        })
        .await;
    }

    async fn notify(&self, event: OnboardingEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(partner_id = %self.partner_id, event = event.name(), error = %e, "Notification failed");
        }
    }
}

/// Append the templated message for `(stage, event)`.
fn append(session: &mut OnboardingSession, stage: StageId, event: StageEvent, vars: &[(&str, String)]) {
    match messages::compose(stage, event, vars) {
        Some(message) => session.messages.push(message),
        None => debug!(stage = %stage, event = ?event, "No message template"),
    }
}

/// Append the entry prompt for `stage` at most once.
fn send_stage_specific_message(session: &mut OnboardingSession, stage: StageId) -> bool {
    if session.stage(stage).messages_initialized {
        return false;
    }
    if messages::has_entry_prompt(&session.messages, stage) {
        session.stage_mut(stage).messages_initialized = true;
        return false;
    }
    append(session, stage, StageEvent::Entered, &[]);
    session.stage_mut(stage).messages_initialized = true;
    true
}

/// Move `current_stage` past `from`, completing onboarding after the last stage.
fn move_past(session: &mut OnboardingSession, from: StageId) -> Transition {
    match from.next() {
        Some(next) => {
            let def = catalog::definition(next);
            append(
                session,
                from,
                StageEvent::Completed,
                &[
                    ("next_stage", def.title.to_string()),
                    ("next_description", def.description.to_string()),
                ],
            );
            session.current_stage = next;
            Transition::Entered(next)
        }
        None => {
            let now = Utc::now();
            session.is_completed = true;
            session.activation_date = Some(now);
            let organization = session.partner_info.organization.clone();
            append(
                session,
                from,
                StageEvent::OnboardingCompleted,
                &[
                    ("organization", organization),
                    ("activation_date", now.format("%Y-%m-%d").to_string()),
                ],
            );
            Transition::Finished
        }
    }
}
