//! Audit events: every state change the engine makes.
//!
//! RULE: Every mutation of rules, customers, alerts or investigations is
//! followed by exactly one AmlEvent appended to the audit journal.
//! Variants are only ever appended, never removed or reordered.

use crate::{
    risk_model::{AlertStatus, Framework, Resolution, RiskLevel, RuleType},
    types::{AlertId, CustomerId, RuleId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmlEvent {
    // ── Rule registry ──────────────────────────────
    FrameworkRulesInstalled {
        framework: Framework,
        rule_ids: Vec<RuleId>,
    },
    RuleActivationChanged {
        rule_id: RuleId,
        active: bool,
    },

    // ── Customer profiles ──────────────────────────
    CustomerRegistered {
        customer_id: CustomerId,
        risk_level: RiskLevel,
    },
    RiskLevelChanged {
        customer_id: CustomerId,
        prior: RiskLevel,
        new: RiskLevel,
    },
    SanctionsMatchRecorded {
        customer_id: CustomerId,
        source: String,
    },
    CustomerDeactivated {
        customer_id: CustomerId,
    },
    KycPerformed {
        customer_id: CustomerId,
        officer: String,
        prior_level: RiskLevel,
        new_level: RiskLevel,
    },

    // ── Monitoring ─────────────────────────────────
    AlertRaised {
        alert_id: AlertId,
        transaction_id: TransactionId,
        customer_id: Option<CustomerId>,
        rule_ids: Vec<RuleId>,
        rule_type: RuleType,
        risk_level: RiskLevel,
    },
    EvaluationGap {
        transaction_id: TransactionId,
        rule_id: Option<RuleId>,
        reason: String,
    },

    // ── Investigation workflow ─────────────────────
    InvestigationOpened {
        alert_id: AlertId,
        investigation_id: String,
        analyst: String,
    },
    InvestigationNoteAdded {
        alert_id: AlertId,
        author: String,
        at: Timestamp,
    },
    AlertStatusChanged {
        alert_id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        resolution: Option<Resolution>,
        reason: Option<String>,
    },
}

impl AmlEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FrameworkRulesInstalled { .. } => "framework_rules_installed",
            Self::RuleActivationChanged { .. } => "rule_activation_changed",
            Self::CustomerRegistered { .. } => "customer_registered",
            Self::RiskLevelChanged { .. } => "risk_level_changed",
            Self::SanctionsMatchRecorded { .. } => "sanctions_match_recorded",
            Self::CustomerDeactivated { .. } => "customer_deactivated",
            Self::KycPerformed { .. } => "kyc_performed",
            Self::AlertRaised { .. } => "alert_raised",
            Self::EvaluationGap { .. } => "evaluation_gap",
            Self::InvestigationOpened { .. } => "investigation_opened",
            Self::InvestigationNoteAdded { .. } => "investigation_note_added",
            Self::AlertStatusChanged { .. } => "alert_status_changed",
        }
    }

    /// The entity the event is filed under in the journal.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::FrameworkRulesInstalled { framework, .. } => framework.as_str(),
            Self::RuleActivationChanged { rule_id, .. } => rule_id,
            Self::CustomerRegistered { customer_id, .. }
            | Self::RiskLevelChanged { customer_id, .. }
            | Self::SanctionsMatchRecorded { customer_id, .. }
            | Self::CustomerDeactivated { customer_id }
            | Self::KycPerformed { customer_id, .. } => customer_id,
            Self::AlertRaised { alert_id, .. }
            | Self::InvestigationOpened { alert_id, .. }
            | Self::InvestigationNoteAdded { alert_id, .. }
            | Self::AlertStatusChanged { alert_id, .. } => alert_id,
            Self::EvaluationGap { transaction_id, .. } => transaction_id,
        }
    }
}

/// The audit entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<i64>,
    pub recorded_at: Timestamp,
    pub entity_id: String,
    pub event_type: String,
    pub actor: Option<String>,
    pub payload: String, // JSON-serialized AmlEvent
}

impl AuditEntry {
    pub fn event(&self) -> serde_json::Result<AmlEvent> {
        serde_json::from_str(&self.payload)
    }
}
