//! Alert case store: alerts, their investigations, and the workflow.
//!
//! STATE MACHINE (per alert, nothing else is allowed):
//!   OPEN         --create_investigation--> UNDER_REVIEW
//!   UNDER_REVIEW --escalate-------------> ESCALATED
//!   UNDER_REVIEW --close----------------> CLOSED
//!   ESCALATED    --close----------------> CLOSED
//!   CLOSED       --reopen---------------> UNDER_REVIEW   (audited)
//!
//! RULES:
//!   - Alerts are never deleted.
//!   - Ids come from one atomic counter and are never reused.
//!   - Every transition runs under the store's write lock, so two
//!     analysts closing the same alert serialise and the second one
//!     sees CLOSED and fails with InvalidState.

use crate::{
    error::{AmlError, AmlResult},
    risk_model::{Amount, AlertStatus, Framework, InvestigationStatus, Resolution, RiskLevel, RuleType},
    types::{AlertId, CustomerId, RuleId, Timestamp, TransactionId},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// ── Data ─────────────────────────────────────────────────────────────────────

/// An alert as produced by the monitor, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    pub transaction_id: TransactionId,
    pub customer_id: Option<CustomerId>,
    pub rule_ids: Vec<RuleId>,
    pub rule_type: RuleType,
    pub framework: Framework,
    pub risk_level: RiskLevel,
    pub title: String,
    pub description: String,
    pub amount: Amount,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub transaction_id: TransactionId,
    pub customer_id: Option<CustomerId>,
    pub rule_ids: Vec<RuleId>,
    pub rule_type: RuleType,
    pub framework: Framework,
    pub risk_level: RiskLevel,
    pub title: String,
    pub description: String,
    pub amount: Amount,
    pub evidence: Vec<String>,
    pub status: AlertStatus,
    pub resolution: Option<Resolution>,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub at: Timestamp,
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub alert_id: AlertId,
    pub analyst: String,
    pub notes: Vec<Note>,
    pub status: InvestigationStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One audited status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub at: Timestamp,
    pub from: AlertStatus,
    pub to: AlertStatus,
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
struct AlertCase {
    seq: u64,
    alert: Alert,
    investigation: Option<Investigation>,
    history: Vec<StatusChange>,
}

impl AlertCase {
    fn require(&self, action: &'static str, allowed: &[AlertStatus]) -> AmlResult<()> {
        if allowed.contains(&self.alert.status) {
            Ok(())
        } else {
            Err(AmlError::InvalidState {
                alert_id: self.alert.id.clone(),
                status: self.alert.status,
                action,
            })
        }
    }

    fn move_to(&mut self, to: AlertStatus, actor: &str, reason: Option<String>, at: Timestamp) -> StatusChange {
        let change = StatusChange {
            at,
            from: self.alert.status,
            to,
            actor: actor.to_string(),
            reason,
        };
        self.alert.status = to;
        if let Some(inv) = self.investigation.as_mut() {
            inv.status = to;
            inv.updated_at = at;
        }
        self.history.push(change.clone());
        change
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct AlertCaseStore {
    next_seq: AtomicU64,
    cases: RwLock<HashMap<AlertId, AlertCase>>,
}

impl AlertCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id and store the alert as OPEN.
    pub fn append(&self, draft: AlertDraft, at: Timestamp) -> Alert {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let alert = Alert {
            id: format!("ALERT-{seq:08}"),
            transaction_id: draft.transaction_id,
            customer_id: draft.customer_id,
            rule_ids: draft.rule_ids,
            rule_type: draft.rule_type,
            framework: draft.framework,
            risk_level: draft.risk_level,
            title: draft.title,
            description: draft.description,
            amount: draft.amount,
            evidence: draft.evidence,
            status: AlertStatus::Open,
            resolution: None,
            created_at: at,
            closed_at: None,
        };
        self.cases.write().insert(
            alert.id.clone(),
            AlertCase {
                seq,
                alert: alert.clone(),
                investigation: None,
                history: Vec::new(),
            },
        );
        alert
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<Alert> {
        self.cases.read().get(alert_id).map(|c| c.alert.clone())
    }

    /// Newest first. `limit == 0` returns every match.
    pub fn get_alerts(
        &self,
        rule_type: Option<RuleType>,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> Vec<Alert> {
        let cases = self.cases.read();
        let mut matching: Vec<&AlertCase> = cases
            .values()
            .filter(|c| rule_type.map_or(true, |t| c.alert.rule_type == t))
            .filter(|c| status.map_or(true, |s| c.alert.status == s))
            .collect();
        matching.sort_by(|a, b| {
            b.alert
                .created_at
                .cmp(&a.alert.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        let take = if limit == 0 { matching.len() } else { limit };
        matching
            .into_iter()
            .take(take)
            .map(|c| c.alert.clone())
            .collect()
    }

    pub fn investigation(&self, alert_id: &str) -> AmlResult<Option<Investigation>> {
        self.read_case(alert_id, |case| case.investigation.clone())
    }

    pub fn status_history(&self, alert_id: &str) -> AmlResult<Vec<StatusChange>> {
        self.read_case(alert_id, |case| case.history.clone())
    }

    /// Every alert, oldest first, cloned under one read lock.
    pub fn snapshot(&self) -> Vec<Alert> {
        let cases = self.cases.read();
        let mut all: Vec<(u64, Alert)> = cases.values().map(|c| (c.seq, c.alert.clone())).collect();
        drop(cases);
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, alert)| alert).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.read().is_empty()
    }

    // ── Workflow ───────────────────────────────────────────────

    pub fn create_investigation(
        &self,
        alert_id: &str,
        analyst: &str,
        at: Timestamp,
    ) -> AmlResult<Investigation> {
        self.write_case(alert_id, |case| {
            if case
                .investigation
                .as_ref()
                .is_some_and(|inv| inv.status.is_unresolved())
            {
                return Err(AmlError::InvestigationAlreadyExists(alert_id.to_string()));
            }
            case.require("open an investigation on", &[AlertStatus::Open])?;

            case.investigation = Some(Investigation {
                id: uuid::Uuid::new_v4().to_string(),
                alert_id: alert_id.to_string(),
                analyst: analyst.to_string(),
                notes: Vec::new(),
                status: AlertStatus::Open,
                created_at: at,
                updated_at: at,
            });
            case.move_to(
                AlertStatus::UnderReview,
                analyst,
                Some("investigation opened".into()),
                at,
            );
            case.investigation
                .clone()
                .ok_or_else(|| AmlError::AlertNotFound(alert_id.to_string()))
        })
    }

    pub fn add_note(&self, alert_id: &str, text: &str, author: &str, at: Timestamp) -> AmlResult<Note> {
        if text.trim().is_empty() {
            return Err(AmlError::Validation("investigation note must not be empty".into()));
        }
        self.write_case(alert_id, |case| {
            case.require(
                "add a note to",
                &[AlertStatus::UnderReview, AlertStatus::Escalated],
            )?;
            let note = Note {
                at,
                author: author.to_string(),
                text: text.to_string(),
            };
            match case.investigation.as_mut() {
                Some(inv) => {
                    inv.notes.push(note.clone());
                    inv.updated_at = at;
                    Ok(note)
                }
                None => Err(AmlError::InvalidState {
                    alert_id: alert_id.to_string(),
                    status: case.alert.status,
                    action: "add a note to",
                }),
            }
        })
    }

    pub fn escalate(
        &self,
        alert_id: &str,
        actor: &str,
        reason: &str,
        at: Timestamp,
    ) -> AmlResult<StatusChange> {
        self.write_case(alert_id, |case| {
            case.require("escalate", &[AlertStatus::UnderReview])?;
            Ok(case.move_to(AlertStatus::Escalated, actor, Some(reason.to_string()), at))
        })
    }

    pub fn close(
        &self,
        alert_id: &str,
        resolution: Resolution,
        actor: &str,
        at: Timestamp,
    ) -> AmlResult<StatusChange> {
        self.write_case(alert_id, |case| {
            case.require("close", &[AlertStatus::UnderReview, AlertStatus::Escalated])?;
            case.alert.resolution = Some(resolution);
            case.alert.closed_at = Some(at);
            Ok(case.move_to(
                AlertStatus::Closed,
                actor,
                Some(format!("{resolution:?}")),
                at,
            ))
        })
    }

    /// Explicitly reopen a closed alert. The existing investigation resumes.
    pub fn reopen(
        &self,
        alert_id: &str,
        actor: &str,
        reason: &str,
        at: Timestamp,
    ) -> AmlResult<StatusChange> {
        self.write_case(alert_id, |case| {
            case.require("reopen", &[AlertStatus::Closed])?;
            case.alert.resolution = None;
            case.alert.closed_at = None;
            if case.investigation.is_none() {
                case.investigation = Some(Investigation {
                    id: uuid::Uuid::new_v4().to_string(),
                    alert_id: alert_id.to_string(),
                    analyst: actor.to_string(),
                    notes: Vec::new(),
                    status: AlertStatus::Closed,
                    created_at: at,
                    updated_at: at,
                });
            }
            Ok(case.move_to(AlertStatus::UnderReview, actor, Some(reason.to_string()), at))
        })
    }

    fn read_case<T>(&self, alert_id: &str, f: impl FnOnce(&AlertCase) -> T) -> AmlResult<T> {
        self.cases
            .read()
            .get(alert_id)
            .map(f)
            .ok_or_else(|| AmlError::AlertNotFound(alert_id.to_string()))
    }

    fn write_case<T>(
        &self,
        alert_id: &str,
        f: impl FnOnce(&mut AlertCase) -> AmlResult<T>,
    ) -> AmlResult<T> {
        let mut cases = self.cases.write();
        let case = cases
            .get_mut(alert_id)
            .ok_or_else(|| AmlError::AlertNotFound(alert_id.to_string()))?;
        f(case)
    }
}
