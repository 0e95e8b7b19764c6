//! Report engine: regulatory and management reports over a period.
//!
//! Periods are inclusive on both ends and select alerts by `created_at`.
//! Every report is derived from a `ComplianceSnapshot`; nothing here is
//! persisted as authoritative state.

use crate::{
    alert_case_store::Alert,
    error::{AmlError, AmlResult},
    risk_model::{Amount, Resolution, RiskLevel, RuleType},
    snapshot::ComplianceSnapshot,
    types::{AlertId, CustomerId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    AlertsSummary,
    RiskAssessment,
    CtrReport,
    SarCandidates,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        Self::AlertsSummary,
        Self::RiskAssessment,
        Self::CtrReport,
        Self::SarCandidates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertsSummary => "ALERTS_SUMMARY",
            Self::RiskAssessment => "RISK_ASSESSMENT",
            Self::CtrReport => "CTR_REPORT",
            Self::SarCandidates => "SAR_CANDIDATES",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = AmlError;

    fn from_str(s: &str) -> AmlResult<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| AmlError::Validation(format!("unknown report kind '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Period {
    pub fn new(start: Timestamp, end: Timestamp) -> AmlResult<Self> {
        if start > end {
            return Err(AmlError::Validation(format!(
                "report period starts {} after it ends {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start && at <= self.end
    }
}

// ── Report shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsSummary {
    pub period: Period,
    pub total_alerts: usize,
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    pub by_rule_type: BTreeMap<RuleType, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub period: Period,
    pub total_customers: usize,
    pub pep_count: usize,
    pub sanctions_matches: usize,
    pub risk_distribution: BTreeMap<RiskLevel, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrLine {
    pub alert_id: AlertId,
    pub transaction_id: TransactionId,
    pub customer_id: Option<CustomerId>,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarCandidate {
    pub alert_id: AlertId,
    pub rule_type: RuleType,
    pub risk_level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Report {
    AlertsSummary(AlertsSummary),
    RiskAssessment(RiskAssessment),
    CtrReport { period: Period, transactions: Vec<CtrLine> },
    SarCandidates { period: Period, candidates: Vec<SarCandidate> },
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::AlertsSummary(_) => ReportKind::AlertsSummary,
            Self::RiskAssessment(_) => ReportKind::RiskAssessment,
            Self::CtrReport { .. } => ReportKind::CtrReport,
            Self::SarCandidates { .. } => ReportKind::SarCandidates,
        }
    }
}

// ── Generation ───────────────────────────────────────────────────────────────

pub fn generate_report(
    snapshot: &ComplianceSnapshot,
    kind: ReportKind,
    start: Timestamp,
    end: Timestamp,
) -> AmlResult<Report> {
    let period = Period::new(start, end)?;
    let in_period = || snapshot.alerts_in(period.start, period.end);

    let report = match kind {
        ReportKind::AlertsSummary => Report::AlertsSummary(alerts_summary(period, in_period())),
        ReportKind::RiskAssessment => Report::RiskAssessment(risk_assessment(period, snapshot)),
        ReportKind::CtrReport => Report::CtrReport {
            period,
            transactions: in_period()
                .filter(|a| a.rule_type == RuleType::Threshold)
                .map(|a| CtrLine {
                    alert_id: a.id.clone(),
                    transaction_id: a.transaction_id.clone(),
                    customer_id: a.customer_id.clone(),
                    amount: a.amount,
                })
                .collect(),
        },
        ReportKind::SarCandidates => Report::SarCandidates {
            period,
            candidates: in_period()
                .filter(|a| is_sar_candidate(a))
                .map(|a| SarCandidate {
                    alert_id: a.id.clone(),
                    rule_type: a.rule_type,
                    risk_level: a.risk_level,
                    description: a.description.clone(),
                })
                .collect(),
        },
    };
    log::debug!(
        "report={} generated for {} .. {}",
        kind,
        period.start.to_rfc3339(),
        period.end.to_rfc3339()
    );
    Ok(report)
}

/// High or Critical, and not closed as a false positive.
pub fn is_sar_candidate(alert: &Alert) -> bool {
    alert.risk_level >= RiskLevel::High && alert.resolution != Some(Resolution::FalsePositive)
}

pub(crate) fn alerts_summary<'a>(
    period: Period,
    alerts: impl Iterator<Item = &'a Alert>,
) -> AlertsSummary {
    let mut by_risk_level: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.into_iter().map(|l| (l, 0)).collect();
    let mut by_rule_type: BTreeMap<RuleType, usize> = BTreeMap::new();
    let mut total_alerts = 0;
    for alert in alerts {
        total_alerts += 1;
        *by_risk_level.entry(alert.risk_level).or_default() += 1;
        *by_rule_type.entry(alert.rule_type).or_default() += 1;
    }
    AlertsSummary {
        period,
        total_alerts,
        by_risk_level,
        by_rule_type,
    }
}

fn risk_assessment(period: Period, snapshot: &ComplianceSnapshot) -> RiskAssessment {
    let mut risk_distribution: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.into_iter().map(|l| (l, 0)).collect();
    let (mut total_customers, mut pep_count, mut sanctions_matches) = (0, 0, 0);

    for customer in snapshot.customers.iter().filter(|c| c.onboarded_at <= period.end) {
        total_customers += 1;
        if customer.is_pep() {
            pep_count += 1;
        }
        if customer.flags.sanctions_match {
            sanctions_matches += 1;
        }
        *risk_distribution.entry(customer.risk_level).or_default() += 1;
    }
    RiskAssessment {
        period,
        total_customers,
        pep_count,
        sanctions_matches,
        risk_distribution,
    }
}
