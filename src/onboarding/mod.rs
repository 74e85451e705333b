//! Partner onboarding: a seven-stage compliance workflow.
//!
//! A partner moves through NDA, commercial terms, KYC, the partnership
//! agreement, technical integration, UAT and go-live. Each stage collects
//! documents and team sign-offs; the `WorkflowEngine` gates every transition
//! on both and keeps a chat-style log of what happened.

pub mod approvals;
pub mod catalog;
pub mod documents;
pub mod engine;
pub mod files;
pub mod messages;
pub mod model;
pub mod notify;
pub mod progress;
pub mod routes;
pub mod service;

pub use approvals::{Decision, PendingApproval};
pub use catalog::{DocumentTemplate, StageDefinition, StageId};
pub use engine::{ResetOptions, WorkflowEngine};
pub use files::DirectorySink;
pub use messages::{ChatMessage, MessageType, Sender, StageEvent};
pub use model::{
    ApprovalStatus, ComplianceDocument, DocumentStatus, OnboardingSession, PartnerProfile,
    StageApproval, StageInstance,
};
pub use notify::{
    BroadcastNotifier, DocumentMetadata, DocumentSink, NotificationPort, OnboardingEvent,
    TeamRouting, TracingNotifier,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use service::OnboardingService;
