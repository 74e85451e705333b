//! Progress calculator: stage completion flags and overall percentage.
//!
//! Results are written into the session after every mutation so the persisted
//! snapshot is self-consistent; nothing is derived lazily at read time.

use super::approvals;
use super::documents;
use super::model::{OnboardingSession, StageInstance};

/// A stage is complete when it was skipped, or when every approval is
/// satisfied and every required document is uploaded, received or approved.
pub fn is_stage_complete(stage: &StageInstance) -> bool {
    stage.skipped || (approvals::all_approved(stage) && documents::all_required_satisfied(stage))
}

/// Recompute a stage's document progress and completion flag.
pub fn refresh_stage(stage: &mut StageInstance) {
    documents::refresh_progress(stage);
    stage.completed = is_stage_complete(stage);
}

/// `round(100 * completed stages / total stages)`.
pub fn overall_progress(session: &OnboardingSession) -> u8 {
    let completed = session.stages.iter().filter(|s| s.completed).count();
    documents::percent(completed, session.stages.len().max(1))
}

/// Recompute every stage and the overall percentage.
pub fn refresh(session: &mut OnboardingSession) {
    for stage in &mut session.stages {
        refresh_stage(stage);
    }
    session.overall_progress = overall_progress(session);
}
