//! Approval gate: named-team sign-offs per stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

use super::catalog::StageId;
use super::model::{ApprovalStatus, OnboardingSession, StageApproval, StageInstance};
use super::progress;

/// A team's decision on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// A sign-off still waiting on its team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub partner_id: String,
    pub stage_id: StageId,
    pub stage_title: String,
    pub team: String,
}

/// Record `team`'s decision and recompute the stage's completion flag.
pub fn record_approval(
    stage: &mut StageInstance,
    team: &str,
    decision: &Decision,
    decided_by: &str,
    now: DateTime<Utc>,
) -> Result<StageApproval, WorkflowError> {
    let stage_id = stage.id;
    if !stage.definition().has_approver(team) {
        return Err(WorkflowError::UnknownTeam {
            stage: stage_id,
            team: team.to_string(),
        });
    }
    let approval = stage
        .approval_mut(team)
        .ok_or_else(|| WorkflowError::UnknownTeam {
            stage: stage_id,
            team: team.to_string(),
        })?;

    approval.approved_by = Some(decided_by.to_string());
    approval.approved_date = Some(now);
    match decision {
        Decision::Approve => {
            approval.status = ApprovalStatus::Approved;
            approval.rejection_reason = None;
        }
        Decision::Reject { reason } => {
            approval.status = ApprovalStatus::Rejected;
            approval.rejection_reason = Some(reason.clone());
        }
    }
    let updated = approval.clone();

    progress::refresh_stage(stage);
    Ok(updated)
}

/// Whether no approval on the stage is still blocking.
pub fn all_approved(stage: &StageInstance) -> bool {
    stage.approvals.iter().all(|a| a.status.is_satisfied())
}

/// Every pending sign-off across the session, in catalog order.
pub fn pending_approvals(session: &OnboardingSession) -> Vec<PendingApproval> {
    session
        .stages
        .iter()
        .filter(|s| !s.skipped)
        .flat_map(|stage| {
            let title = stage.definition().title;
            stage
                .approvals
                .iter()
                .filter(|a| a.status == ApprovalStatus::Pending)
                .map(move |a| PendingApproval {
                    partner_id: session.partner_id.clone(),
                    stage_id: stage.id,
                    stage_title: title.to_string(),
                    team: a.team.clone(),
                })
        })
        .collect()
}
