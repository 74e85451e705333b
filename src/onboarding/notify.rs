//! Outbound collaborator ports: human-facing notifications and file storage.
//!
//! The engine calls these but never implements real delivery. Email, chat or
//! Slack adapters live outside the crate and implement `NotificationPort`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::PortError;

use super::catalog::{self, StageId};
use super::model::{ApprovalStatus, DocumentStatus};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Something the reviewing teams may need to hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OnboardingEvent {
    SessionStarted {
        partner_id: String,
        organization: String,
    },
    SessionResumed {
        partner_id: String,
        stage: StageId,
    },
    DocumentSubmitted {
        partner_id: String,
        stage: StageId,
        document_id: String,
        status: DocumentStatus,
    },
    ApprovalRecorded {
        partner_id: String,
        stage: StageId,
        team: String,
        status: ApprovalStatus,
    },
    StageAdvanced {
        partner_id: String,
        from: StageId,
        to: StageId,
    },
    StageSkipped {
        partner_id: String,
        stage: StageId,
        reason: String,
    },
    OnboardingCompleted {
        partner_id: String,
        activation_date: DateTime<Utc>,
    },
    SessionReset {
        partner_id: String,
        reason: String,
    },
}

impl OnboardingEvent {
    pub fn partner_id(&self) -> &str {
        match self {
            Self::SessionStarted { partner_id, .. }
            | Self::SessionResumed { partner_id, .. }
            | Self::DocumentSubmitted { partner_id, .. }
            | Self::ApprovalRecorded { partner_id, .. }
            | Self::StageAdvanced { partner_id, .. }
            | Self::StageSkipped { partner_id, .. }
            | Self::OnboardingCompleted { partner_id, .. }
            | Self::SessionReset { partner_id, .. } => partner_id,
        }
    }

    /// Teams that should hear about this event.
    pub fn teams(&self) -> &'static [&'static str] {
        match self {
            Self::SessionStarted { .. } => catalog::definition(catalog::first()).approvers,
            Self::DocumentSubmitted { stage, .. }
            | Self::ApprovalRecorded { stage, .. }
            | Self::StageSkipped { stage, .. } => catalog::definition(*stage).approvers,
            Self::StageAdvanced { to, .. } => catalog::definition(*to).approvers,
            Self::OnboardingCompleted { .. } => catalog::definition(StageId::GoLive).approvers,
            Self::SessionResumed { .. } | Self::SessionReset { .. } => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionResumed { .. } => "session_resumed",
            Self::DocumentSubmitted { .. } => "document_submitted",
            Self::ApprovalRecorded { .. } => "approval_recorded",
            Self::StageAdvanced { .. } => "stage_advanced",
            Self::StageSkipped { .. } => "stage_skipped",
            Self::OnboardingCompleted { .. } => "onboarding_completed",
            Self::SessionReset { .. } => "session_reset",
        }
    }
}

/// Sink for human-facing notifications.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, event: &OnboardingEvent) -> Result<(), PortError>;
}

/// Where an uploaded file belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub partner_id: String,
    pub stage: StageId,
    pub document_id: String,
    pub file_name: String,
    pub content_length: usize,
}

/// File storage for uploaded documents.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Store the file and return a reference to it.
    async fn persist(&self, file: &[u8], metadata: &DocumentMetadata) -> Result<String, PortError>;
}

/// Maps approving teams to notification channels.
#[derive(Debug, Clone)]
pub struct TeamRouting {
    routes: HashMap<String, String>,
    fallback: String,
}

impl Default for TeamRouting {
    fn default() -> Self {
        let routes = [
            ("Legal", "#legal-approvals"),
            ("Business", "#partnerships"),
            ("Finance", "#finance-ops"),
            ("Compliance", "#compliance-kyc"),
            ("Risk", "#risk-review"),
            ("Technology", "#partner-integrations"),
            ("Operations", "#partner-ops"),
        ]
        .into_iter()
        .map(|(team, channel)| (team.to_string(), channel.to_string()))
        .collect();

        Self {
            routes,
            fallback: "#partner-onboarding".to_string(),
        }
    }
}

impl TeamRouting {
    pub fn with_route(mut self, team: impl Into<String>, channel: impl Into<String>) -> Self {
        self.routes.insert(team.into(), channel.into());
        self
    }

    pub fn channel_for(&self, team: &str) -> &str {
        self.routes.get(team).map(String::as_str).unwrap_or(&self.fallback)
    }

    /// Distinct channels for an event's teams; the fallback when no team is involved.
    pub fn channels_for(&self, event: &OnboardingEvent) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for team in event.teams() {
            let channel = self.channel_for(team);
            if !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
        }
        if channels.is_empty() {
            channels.push(self.fallback.clone());
        }
        channels
    }
}

/// Writes each notification to the log, once per routed channel.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    routing: TeamRouting,
}

impl TracingNotifier {
    pub fn new(routing: TeamRouting) -> Self {
        Self { routing }
    }
}

#[async_trait]
impl NotificationPort for TracingNotifier {
    async fn notify(&self, event: &OnboardingEvent) -> Result<(), PortError> {
        for channel in self.routing.channels_for(event) {
            info!(
                partner_id = %event.partner_id(),
                event = event.name(),
                channel = %channel,
                "Onboarding notification"
            );
        }
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<OnboardingEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OnboardingEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPort for BroadcastNotifier {
    async fn notify(&self, event: &OnboardingEvent) -> Result<(), PortError> {
        // Ok if nobody is listening
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advanced() -> OnboardingEvent {
        OnboardingEvent::StageAdvanced {
            partner_id: "p-1".into(),
            from: StageId::Commercials,
            to: StageId::Kyc,
        }
    }

    #[test]
    fn routing_follows_stage_approvers() {
        let routing = TeamRouting::default();
        assert_eq!(
            routing.channels_for(&advanced()),
            vec!["#compliance-kyc".to_string(), "#risk-review".to_string()]
        );

        let reset = OnboardingEvent::SessionReset {
            partner_id: "p-1".into(),
            reason: "test".into(),
        };
        assert_eq!(routing.channels_for(&reset), vec!["#partner-onboarding".to_string()]);
    }

    #[test]
    fn routing_overrides_and_dedupes() {
        let routing = TeamRouting::default()
            .with_route("Operations", "#ops")
            .with_route("Compliance", "#ops");
        let event = OnboardingEvent::OnboardingCompleted {
            partner_id: "p-1".into(),
            activation_date: Utc::now(),
        };
        // Operations, Compliance, Business
        assert_eq!(
            routing.channels_for(&event),
            vec!["#ops".to_string(), "#partnerships".to_string()]
        );
        assert_eq!(routing.channel_for("Unknown"), "#partner-onboarding");
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(advanced()).unwrap();
        assert_eq!(json["event"], "stage_advanced");
        assert_eq!(json["to"], "kyc");
        assert_eq!(advanced().partner_id(), "p-1");
        assert_eq!(advanced().name(), "stage_advanced");
    }

    #[tokio::test]
    async fn broadcast_notifier_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify(&advanced()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), advanced());
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::default();
        assert!(notifier.notify(&advanced()).await.is_ok());
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let notifier = TracingNotifier::default();
        assert!(notifier.notify(&advanced()).await.is_ok());
    }
}
