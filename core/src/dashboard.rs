//! Compliance dashboard: period metrics, score, and recommended actions.
//!
//! SCORE (0..=100, higher is better):
//!   100
//!   - min(40, 10 × open critical alerts)
//!   - min(20,  4 × open high alerts)
//!   - min(15,  3 × (avg resolution hours − target) / 24)   when above target
//!   - 25 × (1 − closed alerts / total alerts)              when any alerts
//!
//! CUSTOMER RISK SCORE (capped at 100):
//!   level weight (Low 10, Medium 25, High 50, Critical 80)
//!   + 5 per alert in the period + 10 if PEP + 20 if sanctions-flagged

use crate::{
    alert_case_store::Alert,
    config::AmlConfig,
    error::{AmlError, AmlResult},
    kyc_scheduler::{review_queue, ReviewReason},
    report_engine::{alerts_summary, is_sar_candidate, Period},
    risk_model::{AlertStatus, Customer, Resolution, RiskLevel, RuleType},
    snapshot::ComplianceSnapshot,
    types::{CustomerId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    pub compliance_score: f64,
    pub false_positive_rate: f64,
    pub avg_resolution_hours: f64,
    pub open_alerts: usize,
    pub closed_alerts: usize,
    pub escalated_alerts: usize,
    pub sar_candidates: usize,
    pub overdue_kyc_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRisk {
    pub customer_id: CustomerId,
    pub risk_score: u32,
    pub alert_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub priority: Priority,
    pub title: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub period: Period,
    pub generated_at: Timestamp,
    pub total_alerts: usize,
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    pub by_rule_type: BTreeMap<RuleType, usize>,
    pub metrics: ComplianceMetrics,
    pub top_risk_customers: Vec<CustomerRisk>,
    pub recommended_actions: Vec<RecommendedAction>,
}

pub fn generate_dashboard(
    snapshot: &ComplianceSnapshot,
    config: &AmlConfig,
    start: Timestamp,
    end: Timestamp,
) -> AmlResult<Dashboard> {
    let period = Period::new(start, end)?;
    let alerts: Vec<&Alert> = snapshot.alerts_in(period.start, period.end).collect();
    let summary = alerts_summary(period, alerts.iter().copied());

    let open = |level: RiskLevel| {
        alerts
            .iter()
            .filter(|a| a.status.is_unresolved() && a.risk_level == level)
            .count()
    };
    let open_critical = open(RiskLevel::Critical);
    let open_high = open(RiskLevel::High);

    let closed: Vec<&&Alert> = alerts.iter().filter(|a| a.status == AlertStatus::Closed).collect();
    let false_positives = closed
        .iter()
        .filter(|a| a.resolution == Some(Resolution::FalsePositive))
        .count();
    let false_positive_rate = ratio(false_positives, closed.len());

    let resolution_hours: Vec<f64> = closed
        .iter()
        .filter_map(|a| a.closed_at.map(|at| (at - a.created_at).num_seconds() as f64 / 3600.0))
        .collect();
    let avg_resolution_hours = if resolution_hours.is_empty() {
        0.0
    } else {
        resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64
    };

    let overdue_kyc_reviews = review_queue(
        &config.kyc,
        &snapshot.customers,
        &snapshot.alerts,
        snapshot.taken_at,
    )
    .iter()
    .filter(|due| {
        due.reasons
            .iter()
            .any(|r| matches!(r, ReviewReason::Overdue { .. }))
    })
    .count();

    let target = config.dashboard.resolution_target_hours;
    let mut score: f64 = 100.0;
    score -= (10.0 * open_critical as f64).min(40.0);
    score -= (4.0 * open_high as f64).min(20.0);
    if avg_resolution_hours > target {
        score -= (3.0 * (avg_resolution_hours - target) / 24.0).min(15.0);
    }
    if !alerts.is_empty() {
        score -= 25.0 * (1.0 - ratio(closed.len(), alerts.len()));
    }

    let metrics = ComplianceMetrics {
        compliance_score: score.clamp(0.0, 100.0),
        false_positive_rate,
        avg_resolution_hours,
        open_alerts: alerts.iter().filter(|a| a.status.is_unresolved()).count(),
        closed_alerts: closed.len(),
        escalated_alerts: alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Escalated)
            .count(),
        sar_candidates: alerts.iter().filter(|a| is_sar_candidate(a)).count(),
        overdue_kyc_reviews,
    };

    let top_risk_customers = top_customers(snapshot, &alerts, period, config.dashboard.top_customers);
    let recommended_actions = recommend(&metrics, open_critical, open_high, config);

    log::info!(
        "dashboard: {} alerts, score {:.1}, {} actions",
        summary.total_alerts,
        metrics.compliance_score,
        recommended_actions.len()
    );

    Ok(Dashboard {
        period,
        generated_at: snapshot.taken_at,
        total_alerts: summary.total_alerts,
        by_risk_level: summary.by_risk_level,
        by_rule_type: summary.by_rule_type,
        metrics,
        top_risk_customers,
        recommended_actions,
    })
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn customer_risk_score(customer: &Customer, alerts_in_period: usize) -> u32 {
    let weight = match customer.risk_level {
        RiskLevel::Low => 10,
        RiskLevel::Medium => 25,
        RiskLevel::High => 50,
        RiskLevel::Critical => 80,
    };
    let per_alert = u32::try_from(alerts_in_period).unwrap_or(u32::MAX).saturating_mul(5);
    let mut score = weight + per_alert.min(100);
    if customer.is_pep() {
        score += 10;
    }
    if customer.flags.sanctions_match {
        score += 20;
    }
    score.min(100)
}

fn top_customers(
    snapshot: &ComplianceSnapshot,
    alerts: &[&Alert],
    period: Period,
    limit: usize,
) -> Vec<CustomerRisk> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for alert in alerts {
        if let Some(id) = alert.customer_id.as_deref() {
            *counts.entry(id).or_default() += 1;
        }
    }

    let mut ranked: Vec<CustomerRisk> = snapshot
        .customers
        .iter()
        .filter(|c| c.onboarded_at <= period.end)
        .map(|c| {
            let alert_count = counts.get(c.id.as_str()).copied().unwrap_or(0);
            CustomerRisk {
                customer_id: c.id.clone(),
                risk_score: customer_risk_score(c, alert_count),
                alert_count,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| b.alert_count.cmp(&a.alert_count))
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    ranked.truncate(limit);
    ranked
}

fn recommend(
    metrics: &ComplianceMetrics,
    open_critical: usize,
    open_high: usize,
    config: &AmlConfig,
) -> Vec<RecommendedAction> {
    let mut actions = Vec::new();
    let mut push = |priority, title: &str, rationale: String| {
        actions.push(RecommendedAction {
            priority,
            title: title.to_string(),
            rationale,
        })
    };

    if open_critical > 0 {
        push(
            Priority::Critical,
            "Investigate open critical alerts",
            format!("{open_critical} critical alerts are unresolved"),
        );
    }
    if metrics.overdue_kyc_reviews > 0 {
        push(
            Priority::High,
            "Complete overdue KYC reviews",
            format!("{} customers are past their review interval", metrics.overdue_kyc_reviews),
        );
    }
    if open_high > 0 {
        push(
            Priority::High,
            "Review open high-risk alerts",
            format!("{open_high} high-risk alerts are unresolved"),
        );
    }
    if metrics.sar_candidates > 0 {
        push(
            Priority::High,
            "Assess SAR filings",
            format!("{} alerts qualify as SAR candidates", metrics.sar_candidates),
        );
    }
    if metrics.escalated_alerts > 0 {
        push(
            Priority::Medium,
            "Decide escalated cases",
            format!("{} alerts are awaiting an escalation decision", metrics.escalated_alerts),
        );
    }
    if metrics.closed_alerts > 0
        && metrics.false_positive_rate > config.dashboard.false_positive_tolerance
    {
        push(
            Priority::Medium,
            "Tune monitoring rules",
            format!(
                "{:.0}% of closed alerts were false positives",
                metrics.false_positive_rate * 100.0
            ),
        );
    }
    if metrics.avg_resolution_hours > config.dashboard.resolution_target_hours {
        push(
            Priority::Medium,
            "Reduce alert resolution time",
            format!(
                "average resolution {:.1}h exceeds the {:.0}h target",
                metrics.avg_resolution_hours, config.dashboard.resolution_target_hours
            ),
        );
    }

    actions.sort_by(|a, b| b.priority.cmp(&a.priority));
    actions
}

// ── Export ───────────────────────────────────────────────────────────────────

pub fn export_report(dashboard: &Dashboard, format: &str) -> AmlResult<String> {
    match format.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(serde_json::to_string_pretty(dashboard)?),
        "text" => Ok(render_text(dashboard)),
        other => Err(AmlError::UnsupportedFormat(other.to_string())),
    }
}

fn render_text(d: &Dashboard) -> String {
    d.to_string()
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(
            f,
            "AML compliance dashboard {} .. {}",
            self.period.start.to_rfc3339(),
            self.period.end.to_rfc3339()
        )?;
        writeln!(f, "Compliance score:      {:.1}", m.compliance_score)?;
        writeln!(f, "Total alerts:          {}", self.total_alerts)?;
        writeln!(f, "Open / closed:         {} / {}", m.open_alerts, m.closed_alerts)?;
        writeln!(f, "Escalated:             {}", m.escalated_alerts)?;
        writeln!(f, "SAR candidates:        {}", m.sar_candidates)?;
        writeln!(f, "False-positive rate:   {:.1}%", m.false_positive_rate * 100.0)?;
        writeln!(f, "Avg resolution:        {:.1}h", m.avg_resolution_hours)?;
        writeln!(f, "Overdue KYC reviews:   {}", m.overdue_kyc_reviews)?;

        writeln!(f, "\nBy risk level:")?;
        for (level, n) in &self.by_risk_level {
            writeln!(f, "  {:<10} {n}", level.as_str())?;
        }
        writeln!(f, "\nBy rule type:")?;
        for (rule_type, n) in &self.by_rule_type {
            writeln!(f, "  {:<18} {n}", rule_type.as_str())?;
        }
        if !self.top_risk_customers.is_empty() {
            writeln!(f, "\nTop risk customers:")?;
            for c in &self.top_risk_customers {
                writeln!(
                    f,
                    "  {:<16} score {:>3}  alerts {}",
                    c.customer_id, c.risk_score, c.alert_count
                )?;
            }
        }
        if !self.recommended_actions.is_empty() {
            writeln!(f, "\nRecommended actions:")?;
            for a in &self.recommended_actions {
                writeln!(f, "  [{:?}] {}: {}", a.priority, a.title, a.rationale)?;
            }
        }
        Ok(())
    }
}
