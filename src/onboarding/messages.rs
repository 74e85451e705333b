//! Chat log entries and the declarative message template table.
//!
//! Every message the engine emits comes from `TEMPLATES`: a row keyed by
//! `(stage, event)` carrying the sender, message type and text. Adding a stage
//! prompt means adding a row, not touching engine logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::{self, StageId};

/// Who a chat message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Agent,
    Partner,
    System,
}

/// Kind of chat message, used by the renderer to pick a bubble style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Message,
    DocumentRequest,
    DocumentUpdate,
    ApprovalUpdate,
    StageCompletion,
    StageSkipped,
    OnboardingComplete,
}

/// Workflow events that produce a templated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEvent {
    Welcome,
    WelcomeBack,
    Entered,
    Completed,
    Skipped,
    DocumentSubmitted,
    DocumentReceived,
    DocumentSkipped,
    DocumentRejected,
    ApprovalGranted,
    ApprovalRejected,
    OnboardingCompleted,
}

/// Tags attached to an engine-generated message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<StageEvent>,
}

/// An append-only chat log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    pub fn new(sender: Sender, kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
            metadata: None,
        }
    }

    /// A free-form line typed by the partner.
    pub fn partner(content: impl Into<String>) -> Self {
        Self::new(Sender::Partner, MessageType::Message, content)
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn stage_id(&self) -> Option<StageId> {
        self.metadata.as_ref().and_then(|m| m.stage_id)
    }

    pub fn event(&self) -> Option<StageEvent> {
        self.metadata.as_ref().and_then(|m| m.event)
    }
}

/// One row of the template table.
#[derive(Debug)]
pub struct MessageTemplate {
    /// `None` matches any stage.
    pub stage: Option<StageId>,
    pub event: StageEvent,
    pub sender: Sender,
    pub kind: MessageType,
    pub text: &'static str,
}

const fn row(
    stage: Option<StageId>,
    event: StageEvent,
    sender: Sender,
    kind: MessageType,
    text: &'static str,
) -> MessageTemplate {
    MessageTemplate {
        stage,
        event,
        sender,
        kind,
        text,
    }
}

use MessageType as K;
use Sender as S;
use StageEvent as E;

static TEMPLATES: &[MessageTemplate] = &[
    row(None, E::Welcome, S::Agent, K::Message,
        "Welcome to the partner programme, {partner}! I'll guide {organization} through onboarding: \
         NDA, commercial terms, KYC, partnership agreement, technical integration, UAT and go-live."),
    row(None, E::WelcomeBack, S::Agent, K::Message,
        "Welcome back, {partner}. You're on {stage} and onboarding is {progress}% complete."),
    row(Some(StageId::Nda), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nPlease download the NDA template, have an authorized signatory sign it, and upload \
         the signed copy here. Legal reviews signed NDAs within one business day.\nRequired: {checklist}"),
    row(Some(StageId::Commercials), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nLet's agree on pricing and corridor volumes. Upload the countersigned pricing proposal \
         and your twelve-month volume forecast.\nRequired: {checklist}"),
    row(Some(StageId::Kyc), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nCompliance needs your corporate documentation for due diligence. Optional documents can \
         be skipped when their condition does not apply.\nRequired: {checklist}"),
    row(Some(StageId::Agreement), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nThe master services agreement is ready for signature. Upload the executed MSA and your \
         settlement instructions.\nRequired: {checklist}"),
    row(Some(StageId::Integration), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nSandbox credentials are on their way. Send us your technical contacts and the IP \
         addresses that will call the API.\nRequired: {checklist}"),
    row(Some(StageId::Uat), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nRun every certification test case in the sandbox, then upload the test report and \
         your sign-off.\nRequired: {checklist}"),
    row(Some(StageId::GoLive), E::Entered, S::System, K::DocumentRequest,
        "{marker}\nAlmost there. Complete the production readiness checklist so Operations can switch \
         you to live credentials.\nRequired: {checklist}"),
    row(None, E::Completed, S::System, K::StageCompletion,
        "{stage} completed. Next up: {next_stage}. {next_description}"),
    row(None, E::Skipped, S::System, K::StageSkipped,
        "{stage} was skipped: {reason}"),
    row(None, E::DocumentSubmitted, S::Agent, K::DocumentUpdate,
        "Thanks! {document} ({file_name}) is uploaded and with the review team."),
    row(None, E::DocumentReceived, S::System, K::DocumentUpdate,
        "{document} was received by the onboarding team ({file_name})."),
    row(None, E::DocumentSkipped, S::System, K::DocumentUpdate,
        "{document} is optional and was skipped."),
    row(None, E::DocumentRejected, S::Agent, K::DocumentUpdate,
        "{document} needs another look: {reason}. Please upload a corrected copy."),
    row(None, E::ApprovalGranted, S::System, K::ApprovalUpdate,
        "{team} approved {stage}."),
    row(None, E::ApprovalRejected, S::System, K::ApprovalUpdate,
        "{team} rejected {stage}: {reason}"),
    row(None, E::OnboardingCompleted, S::Agent, K::OnboardingComplete,
        "Onboarding complete! {organization} is live as of {activation_date}."),
];

/// Find the template for an event, preferring a stage-specific row.
pub fn template_for(stage: StageId, event: StageEvent) -> Option<&'static MessageTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.event == event && t.stage == Some(stage))
        .or_else(|| TEMPLATES.iter().find(|t| t.event == event && t.stage.is_none()))
}

/// Substitute `{key}` placeholders in one pass over `text`.
///
/// Substituted values are copied verbatim and never scanned again. Unknown
/// placeholders are left as they are; the first matching key wins.
pub fn render(text: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = after.find('}').and_then(|end| {
            let key = &after[..end];
            vars.iter().find(|(k, _)| *k == key).map(|(_, value)| (end, value))
        });
        match hit {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Heading line that opens every stage-entry prompt.
pub fn entry_marker(stage: StageId) -> String {
    format!(
        "Stage {}/{}: {}",
        stage.position() + 1,
        catalog::len(),
        catalog::definition(stage).title
    )
}

/// Build the message for `(stage, event)`, tagged with both.
pub fn compose(stage: StageId, event: StageEvent, vars: &[(&str, String)]) -> Option<ChatMessage> {
    let template = template_for(stage, event)?;
    let def = catalog::definition(stage);

    let mut all_vars: Vec<(&str, String)> = vec![
        ("stage", def.title.to_string()),
        ("marker", entry_marker(stage)),
        ("checklist", required_checklist(stage)),
    ];
    all_vars.extend(vars.iter().cloned());

    let content = render(template.text, &all_vars);
    Some(
        ChatMessage::new(template.sender, template.kind, content).with_metadata(MessageMetadata {
            stage_id: Some(stage),
            event: Some(event),
        }),
    )
}

fn required_checklist(stage: StageId) -> String {
    let labels: Vec<&str> = catalog::definition(stage)
        .documents
        .iter()
        .filter(|d| d.required)
        .map(|d| d.label)
        .collect();
    if labels.is_empty() {
        "none".to_string()
    } else {
        labels.join(", ")
    }
}

/// Whether the log already holds the entry prompt for `stage`.
///
/// Matches on the metadata tag, on the message type, or on the prompt heading,
/// so logs written without metadata are still recognized. Partner lines never
/// count as a prompt.
pub fn has_entry_prompt(messages: &[ChatMessage], stage: StageId) -> bool {
    let marker = entry_marker(stage);
    messages.iter().any(|m| {
        let tagged = m.stage_id() == Some(stage) && m.event() == Some(StageEvent::Entered);
        let typed = m.kind == MessageType::DocumentRequest && m.stage_id() == Some(stage);
        let worded = m.sender != Sender::Partner && m.content.contains(&marker);
        tagged || typed || worded
    })
}
