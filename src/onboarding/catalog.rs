//! Stage catalog: the fixed, ordered definition of onboarding stages.
//!
//! Progresses linearly: Nda → Commercials → Kyc → Agreement → Integration →
//! Uat → GoLive. Each stage lists its document checklist and the teams whose
//! sign-off gates it. The catalog is compiled in and never mutated.

use serde::{Deserialize, Serialize};

/// Identifier of an onboarding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    Nda,
    Commercials,
    Kyc,
    Agreement,
    Integration,
    Uat,
    GoLive,
}

impl StageId {
    /// All stages in catalog order.
    pub const ALL: [StageId; 7] = [
        StageId::Nda,
        StageId::Commercials,
        StageId::Kyc,
        StageId::Agreement,
        StageId::Integration,
        StageId::Uat,
        StageId::GoLive,
    ];

    /// Zero-based position in the catalog.
    pub fn position(&self) -> usize {
        match self {
            Self::Nda => 0,
            Self::Commercials => 1,
            Self::Kyc => 2,
            Self::Agreement => 3,
            Self::Integration => 4,
            Self::Uat => 5,
            Self::GoLive => 6,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<StageId> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Whether this is the final catalog stage.
    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nda => "nda",
            Self::Commercials => "commercials",
            Self::Kyc => "kyc",
            Self::Agreement => "agreement",
            Self::Integration => "integration",
            Self::Uat => "uat",
            Self::GoLive => "go-live",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

/// Template for a compliance document on a stage checklist.
#[derive(Debug, Clone, Copy)]
pub struct DocumentTemplate {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub required: bool,
    /// Human-readable condition under which an optional document becomes relevant.
    pub condition: Option<&'static str>,
}

/// Static definition of one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageDefinition {
    pub id: StageId,
    pub title: &'static str,
    pub description: &'static str,
    pub documents: &'static [DocumentTemplate],
    pub approvers: &'static [&'static str],
    pub can_skip: bool,
    pub skip_condition: Option<&'static str>,
}

impl StageDefinition {
    pub fn position(&self) -> usize {
        self.id.position()
    }

    pub fn document(&self, id: &str) -> Option<&'static DocumentTemplate> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn has_approver(&self, team: &str) -> bool {
        self.approvers.iter().any(|t| *t == team)
    }
}

const fn required(id: &'static str, label: &'static str, description: &'static str) -> DocumentTemplate {
    DocumentTemplate {
        id,
        label,
        description,
        required: true,
        condition: None,
    }
}

const fn optional(
    id: &'static str,
    label: &'static str,
    description: &'static str,
    condition: Option<&'static str>,
) -> DocumentTemplate {
    DocumentTemplate {
        id,
        label,
        description,
        required: false,
        condition,
    }
}

static CATALOG: [StageDefinition; 7] = [
    StageDefinition {
        id: StageId::Nda,
        title: "Non-Disclosure Agreement",
        description: "Sign the mutual NDA so we can share commercial and technical details.",
        documents: &[required(
            "signed_nda",
            "Signed NDA",
            "Mutual non-disclosure agreement signed by an authorized signatory",
        )],
        approvers: &["Legal"],
        can_skip: false,
        skip_condition: None,
    },
    StageDefinition {
        id: StageId::Commercials,
        title: "Commercial Terms",
        description: "Agree on pricing, FX margins and expected corridor volumes.",
        documents: &[
            required("pricing_proposal", "Pricing Proposal", "Countersigned pricing proposal"),
            required("volume_forecast", "Volume Forecast", "Twelve-month transaction volume forecast per corridor"),
            optional("fx_rate_sheet", "FX Rate Sheet", "Preferred FX margin schedule", None),
        ],
        approvers: &["Business", "Finance"],
        can_skip: true,
        skip_condition: Some("Partner accepts the standard pricing tier"),
    },
    StageDefinition {
        id: StageId::Kyc,
        title: "KYC & Compliance",
        description: "Provide corporate and compliance documentation for due diligence.",
        documents: &[
            required("certificate_of_incorporation", "Certificate of Incorporation", "Company registration certificate"),
            required("business_license", "Business License", "Valid license to operate"),
            required("directors_id", "Directors' Identification", "Government-issued ID for every director"),
            required("ubo_declaration", "UBO Declaration", "Ultimate beneficial ownership declaration"),
            required("aml_policy", "AML/CFT Policy", "Anti-money-laundering and counter-terrorist-financing policy"),
            optional(
                "audited_financials",
                "Audited Financial Statements",
                "Latest audited financial statements",
                Some("Required if annual volume exceeds USD 10M"),
            ),
            optional(
                "regulatory_license",
                "Regulatory License",
                "Money transmitter or payment institution license",
                Some("Required for licensed money transmitters"),
            ),
        ],
        approvers: &["Compliance", "Risk"],
        can_skip: false,
        skip_condition: None,
    },
    StageDefinition {
        id: StageId::Agreement,
        title: "Partnership Agreement",
        description: "Execute the master services agreement and settlement terms.",
        documents: &[
            required("master_services_agreement", "Master Services Agreement", "Executed MSA"),
            required("settlement_instructions", "Settlement Instructions", "Bank details for prefunding and settlement"),
        ],
        approvers: &["Legal", "Finance", "Business"],
        can_skip: false,
        skip_condition: None,
    },
    StageDefinition {
        id: StageId::Integration,
        title: "Technical Integration",
        description: "Connect to the sandbox API and configure credentials and callbacks.",
        documents: &[
            required("technical_contact_form", "Technical Contact Form", "Engineering contacts and escalation path"),
            required("ip_whitelist", "IP Whitelist", "Source IP addresses for API access"),
            optional("webhook_config", "Webhook Configuration", "Callback URLs for transaction status updates", None),
        ],
        approvers: &["Technology"],
        can_skip: false,
        skip_condition: None,
    },
    StageDefinition {
        id: StageId::Uat,
        title: "User Acceptance Testing",
        description: "Run the certification test cases end to end in the sandbox.",
        documents: &[
            required("uat_test_report", "UAT Test Report", "Results for every certification test case"),
            required("uat_signoff", "UAT Sign-off", "Partner sign-off on test results"),
        ],
        approvers: &["Technology", "Operations"],
        can_skip: true,
        skip_condition: Some("Partner integrates through a pre-certified platform"),
    },
    StageDefinition {
        id: StageId::GoLive,
        title: "Go-Live",
        description: "Switch to production credentials and start live transactions.",
        documents: &[required("go_live_checklist", "Go-Live Checklist", "Completed production readiness checklist")],
        approvers: &["Operations", "Compliance", "Business"],
        can_skip: false,
        skip_condition: None,
    },
];

/// All stage definitions in catalog order.
pub fn stages() -> &'static [StageDefinition] {
    &CATALOG
}

/// Number of stages in the catalog.
pub fn len() -> usize {
    CATALOG.len()
}

/// Look up a stage definition by id.
pub fn definition(id: StageId) -> &'static StageDefinition {
    &CATALOG[id.position()]
}

/// Look up a stage definition by catalog position.
pub fn by_position(position: usize) -> Option<&'static StageDefinition> {
    CATALOG.get(position)
}

/// The first stage a new session starts in.
pub fn first() -> StageId {
    CATALOG[0].id
}
