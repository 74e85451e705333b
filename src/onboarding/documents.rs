//! Document tracker: per-stage document status bookkeeping.
//!
//! Status moves pending → uploaded|received → approved|rejected. A rejected
//! document can be submitted again. Optional documents can jump straight to
//! approved through `skip_optional_document`.

use chrono::{DateTime, Utc};

use crate::error::WorkflowError;

use super::model::{ComplianceDocument, DocumentStatus, StageInstance};

/// File name recorded on a skipped optional document.
pub const SKIPPED_FILE_NAME: &str = "Skipped (Optional)";

/// Record a partner upload.
pub fn submit_document(
    stage: &mut StageInstance,
    document_id: &str,
    file_name: &str,
    now: DateTime<Utc>,
) -> Result<ComplianceDocument, WorkflowError> {
    set_delivered(stage, document_id, file_name, DocumentStatus::Uploaded, now)
}

/// Record a document that reached the team through another path (e.g. email).
pub fn mark_received(
    stage: &mut StageInstance,
    document_id: &str,
    file_name: &str,
    now: DateTime<Utc>,
) -> Result<ComplianceDocument, WorkflowError> {
    set_delivered(stage, document_id, file_name, DocumentStatus::Received, now)
}

/// Approve an optional document without a file.
pub fn skip_optional_document(
    stage: &mut StageInstance,
    document_id: &str,
    now: DateTime<Utc>,
) -> Result<ComplianceDocument, WorkflowError> {
    let stage_id = stage.id;
    let doc = lookup(stage, document_id)?;
    if doc.required {
        return Err(WorkflowError::CannotSkipRequired {
            stage: stage_id,
            document: document_id.to_string(),
        });
    }
    if doc.status == DocumentStatus::Approved {
        return Err(WorkflowError::AlreadyTerminal {
            stage: stage_id,
            document: document_id.to_string(),
        });
    }

    doc.status = DocumentStatus::Approved;
    doc.file_name = Some(SKIPPED_FILE_NAME.to_string());
    doc.upload_date = Some(now);
    doc.rejection_reason = None;
    let updated = doc.clone();

    refresh_progress(stage);
    Ok(updated)
}

/// Send a submitted document back to the partner.
pub fn reject_document(
    stage: &mut StageInstance,
    document_id: &str,
    reason: &str,
) -> Result<ComplianceDocument, WorkflowError> {
    let stage_id = stage.id;
    let doc = lookup(stage, document_id)?;
    if doc.status == DocumentStatus::Approved {
        return Err(WorkflowError::AlreadyTerminal {
            stage: stage_id,
            document: document_id.to_string(),
        });
    }

    doc.status = DocumentStatus::Rejected;
    doc.rejection_reason = Some(reason.to_string());
    let updated = doc.clone();

    refresh_progress(stage);
    Ok(updated)
}

/// Check that `document_id` exists on the stage and can still take a file.
pub fn ensure_deliverable(stage: &StageInstance, document_id: &str) -> Result<(), WorkflowError> {
    match stage.document(document_id) {
        None => Err(WorkflowError::UnknownDocument {
            stage: stage.id,
            document: document_id.to_string(),
        }),
        Some(doc) if doc.status == DocumentStatus::Approved => Err(WorkflowError::AlreadyTerminal {
            stage: stage.id,
            document: document_id.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

/// Whether every required document is uploaded, received or approved.
pub fn all_required_satisfied(stage: &StageInstance) -> bool {
    stage
        .documents
        .iter()
        .filter(|d| d.required)
        .all(|d| d.status.is_satisfied())
}

/// Share of satisfied documents, rounded to a whole percent.
///
/// A stage without documents is gated by approvals alone and reports 100
/// once every approval is satisfied.
pub fn stage_progress(stage: &StageInstance) -> u8 {
    let total = stage.documents.len();
    if total == 0 {
        let approved = stage.approvals.iter().all(|a| a.status.is_satisfied());
        return if approved { 100 } else { 0 };
    }
    let satisfied = stage.documents.iter().filter(|d| d.status.is_satisfied()).count();
    percent(satisfied, total)
}

/// `round(100 * part / total)`; `total` must be non-zero.
pub(crate) fn percent(part: usize, total: usize) -> u8 {
    ((part as f64 * 100.0) / total as f64).round() as u8
}

pub(crate) fn refresh_progress(stage: &mut StageInstance) {
    stage.progress = stage_progress(stage);
}

fn set_delivered(
    stage: &mut StageInstance,
    document_id: &str,
    file_name: &str,
    status: DocumentStatus,
    now: DateTime<Utc>,
) -> Result<ComplianceDocument, WorkflowError> {
    ensure_deliverable(stage, document_id)?;
    let doc = lookup(stage, document_id)?;

    doc.status = status;
    doc.file_name = Some(file_name.to_string());
    doc.upload_date = Some(now);
    doc.rejection_reason = None;
    let updated = doc.clone();

    refresh_progress(stage);
    Ok(updated)
}

fn lookup<'a>(
    stage: &'a mut StageInstance,
    document_id: &str,
) -> Result<&'a mut ComplianceDocument, WorkflowError> {
    let stage_id = stage.id;
    stage
        .document_mut(document_id)
        .ok_or_else(|| WorkflowError::UnknownDocument {
            stage: stage_id,
            document: document_id.to_string(),
        })
}
