//! Partner profile and onboarding session data models.
//!
//! Field names serialize in camelCase; the session snapshot is the exact JSON
//! document the `SessionStore` persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{self, DocumentTemplate, StageDefinition, StageId};
use super::messages::ChatMessage;

/// Identity of the partner being onboarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerProfile {
    pub name: String,
    pub organization: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Reference id of the partner record in the external CRM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm_reference: Option<String>,
}

impl PartnerProfile {
    pub fn new(
        name: impl Into<String>,
        organization: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            organization: organization.into(),
            email: email.into(),
            phone: None,
            role: None,
            country: None,
            crm_reference: None,
        }
    }
}

/// Submission status of a compliance document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Uploaded,
    Received,
    Approved,
    Rejected,
}

impl DocumentStatus {
    /// Whether the document counts as satisfied for progress and completion.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Received | Self::Approved)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Received => "received",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// A document on a stage checklist, bound to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceDocument {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub conditional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ComplianceDocument {
    pub fn from_template(template: &DocumentTemplate) -> Self {
        Self {
            id: template.id.to_string(),
            label: template.label.to_string(),
            description: template.description.to_string(),
            required: template.required,
            conditional: template.condition.is_some(),
            condition: template.condition.map(str::to_string),
            status: DocumentStatus::Pending,
            file_name: None,
            upload_date: None,
            rejection_reason: None,
        }
    }
}

/// Decision status of one team's sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    NotRequired,
}

impl ApprovalStatus {
    /// Whether this sign-off no longer blocks the stage.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Approved | Self::NotRequired)
    }
}

/// A named team's sign-off on a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageApproval {
    pub team: String,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl StageApproval {
    pub fn pending(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            status: ApprovalStatus::Pending,
            approved_by: None,
            approved_date: None,
            rejection_reason: None,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A catalog stage bound to one session's mutable documents and approvals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInstance {
    pub id: StageId,
    pub completed: bool,
    pub progress: u8,
    pub documents: Vec<ComplianceDocument>,
    pub approvals: Vec<StageApproval>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Set once the stage-entry prompt has been sent.
    #[serde(default)]
    pub messages_initialized: bool,
}

impl StageInstance {
    pub fn from_definition(def: &StageDefinition) -> Self {
        Self {
            id: def.id,
            completed: false,
            progress: 0,
            documents: def.documents.iter().map(ComplianceDocument::from_template).collect(),
            approvals: def.approvers.iter().map(|t| StageApproval::pending(*t)).collect(),
            skipped: false,
            skip_reason: None,
            messages_initialized: false,
        }
    }

    pub fn definition(&self) -> &'static StageDefinition {
        catalog::definition(self.id)
    }

    pub fn document(&self, id: &str) -> Option<&ComplianceDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn document_mut(&mut self, id: &str) -> Option<&mut ComplianceDocument> {
        self.documents.iter_mut().find(|d| d.id == id)
    }

    pub fn approval(&self, team: &str) -> Option<&StageApproval> {
        self.approvals.iter().find(|a| a.team == team)
    }

    pub fn approval_mut(&mut self, team: &str) -> Option<&mut StageApproval> {
        self.approvals.iter_mut().find(|a| a.team == team)
    }
}

/// The aggregate root: one partner's onboarding progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub partner_id: String,
    pub partner_info: PartnerProfile,
    pub current_stage: StageId,
    pub stages: Vec<StageInstance>,
    pub messages: Vec<ChatMessage>,
    pub overall_progress: u8,
    pub is_completed: bool,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_date: Option<DateTime<Utc>>,
}

impl OnboardingSession {
    /// Fresh session positioned at the first catalog stage.
    pub fn new(partner_id: impl Into<String>, profile: PartnerProfile, now: DateTime<Utc>) -> Self {
        Self {
            partner_id: partner_id.into(),
            partner_info: profile,
            current_stage: catalog::first(),
            stages: catalog::stages().iter().map(StageInstance::from_definition).collect(),
            messages: Vec::new(),
            overall_progress: 0,
            is_completed: false,
            last_activity: now,
            activation_date: None,
        }
    }

    /// Stage instances are stored in catalog order, so position indexes them.
    pub fn stage(&self, id: StageId) -> &StageInstance {
        &self.stages[id.position()]
    }

    pub fn stage_mut(&mut self, id: StageId) -> &mut StageInstance {
        &mut self.stages[id.position()]
    }

    pub fn current(&self) -> &StageInstance {
        self.stage(self.current_stage)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
