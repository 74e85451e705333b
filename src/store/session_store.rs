//! Session store: one JSON snapshot per partner, with validation and expiry.
//!
//! Records that are stale, undecodable or structurally wrong are deleted and
//! reported as absent, so the caller starts a fresh session instead of failing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::OnboardingConfig;
use crate::error::{DatabaseError, WorkflowError};
use crate::onboarding::catalog;
use crate::onboarding::model::OnboardingSession;
use crate::store::traits::Database;

pub struct SessionStore {
    db: Arc<dyn Database>,
    key: String,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(db: Arc<dyn Database>, config: &OnboardingConfig) -> Self {
        Self {
            db,
            key: config.storage_key.clone(),
            max_age: config.max_session_age,
        }
    }

    /// Load a partner's session, or `None` when absent, stale or invalid.
    pub async fn load(&self, partner_id: &str) -> Result<Option<OnboardingSession>, DatabaseError> {
        let Some(value) = self.db.get_setting(partner_id, &self.key).await? else {
            return Ok(None);
        };

        match decode(partner_id, value, Utc::now(), self.max_age) {
            Ok(session) => {
                debug!(partner_id, stage = %session.current_stage, "Loaded onboarding session");
                Ok(Some(session))
            }
            Err(e) => {
                match &e {
                    WorkflowError::SessionNotFound(_) => {
                        info!(partner_id, "Discarding stale onboarding session")
                    }
                    other => warn!(partner_id, reason = %other, "Discarding persisted onboarding session"),
                }
                self.db.delete_setting(partner_id, &self.key).await?;
                Ok(None)
            }
        }
    }

    /// Write the full snapshot, replacing whatever was stored.
    pub async fn save(&self, session: &OnboardingSession) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(session)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.db.set_setting(&session.partner_id, &self.key, &value).await
    }

    /// Whether `session` has been idle for longer than the staleness window.
    pub fn is_expired(&self, session: &OnboardingSession, now: DateTime<Utc>) -> bool {
        expired(session, now, self.max_age)
    }

    /// Remove the persisted record. Returns whether one existed.
    pub async fn delete(&self, partner_id: &str) -> Result<bool, DatabaseError> {
        self.db.delete_setting(partner_id, &self.key).await
    }
}

/// Decode and check a persisted snapshot.
///
/// Fails with `SessionNotFound` when the record is older than `max_age` and
/// with `InvalidPersistedState` when it cannot be trusted.
pub fn decode(
    partner_id: &str,
    value: Value,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<OnboardingSession, WorkflowError> {
    let session: OnboardingSession = serde_json::from_value(value)
        .map_err(|e| WorkflowError::InvalidPersistedState(e.to_string()))?;

    validate(partner_id, &session).map_err(WorkflowError::InvalidPersistedState)?;

    if expired(&session, now, max_age) {
        return Err(WorkflowError::SessionNotFound(partner_id.to_string()));
    }

    Ok(session)
}

fn expired(session: &OnboardingSession, now: DateTime<Utc>, max_age: Duration) -> bool {
    // Timestamps in the future are clock skew, not staleness.
    (now - session.last_activity)
        .to_std()
        .is_ok_and(|age| age > max_age)
}

fn validate(partner_id: &str, session: &OnboardingSession) -> Result<(), String> {
    if session.partner_id != partner_id {
        return Err(format!(
            "record belongs to partner {}, expected {partner_id}",
            session.partner_id
        ));
    }
    if session.partner_info.name.trim().is_empty() || session.partner_info.email.trim().is_empty() {
        return Err("partner profile is incomplete".to_string());
    }
    if session.stages.len() != catalog::len() {
        return Err(format!(
            "expected {} stages, found {}",
            catalog::len(),
            session.stages.len()
        ));
    }
    if session.overall_progress > 100 {
        return Err(format!("overall progress {} out of range", session.overall_progress));
    }

    for (stage, def) in session.stages.iter().zip(catalog::stages()) {
        if stage.id != def.id {
            return Err(format!("stage {} found where {} was expected", stage.id, def.id));
        }
        if stage.progress > 100 {
            return Err(format!("stage {} progress {} out of range", stage.id, stage.progress));
        }
        if let Some(doc) = stage.documents.iter().find(|d| def.document(&d.id).is_none()) {
            return Err(format!("stage {} has unknown document {}", stage.id, doc.id));
        }
        if let Some(approval) = stage.approvals.iter().find(|a| !def.has_approver(&a.team)) {
            return Err(format!("stage {} has unknown team {}", stage.id, approval.team));
        }
        if let Some(doc) = def.documents.iter().find(|t| stage.document(t.id).is_none()) {
            return Err(format!("stage {} is missing document {}", stage.id, doc.id));
        }
        if let Some(team) = def.approvers.iter().find(|team| stage.approval(team).is_none()) {
            return Err(format!("stage {} is missing approval from {team}", stage.id));
        }
        if stage.documents.len() != def.documents.len() || stage.approvals.len() != def.approvers.len() {
            return Err(format!("stage {} has duplicate documents or approvals", stage.id));
        }
    }

    if session.messages.iter().any(|m| m.id.trim().is_empty()) {
        return Err("message without id".to_string());
    }

    Ok(())
}
