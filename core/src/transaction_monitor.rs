//! Transaction monitor: evaluates a posted transaction against the
//! active rule set.
//!
//! Pipeline per transaction:
//!   1. Validate the entries and derive the monitored amounts
//!      (gross = sum of debits, cash = net movement on cash accounts).
//!   2. Pick the active rules for the currency and customer.
//!   3. Evaluate each rule through `evaluate_rule`, one match over
//!      `RuleCheck`. A rule that errors becomes an evaluation gap; the
//!      remaining rules still run.
//!   4. Turn every finding into an alert draft with the escalated risk level.
//!
//! Evaluation is pure given the rule set, the customer and the history.
//! The engine owns the side effects (history recording, alert storage).

use crate::{
    alert_case_store::{Alert, AlertDraft},
    config::AmlConfig,
    error::{AmlError, AmlResult},
    risk_model::{Amount, Currency, Customer, Direction, RiskLevel, RuleType, Transaction},
    rule_registry::{Rule, RuleCheck, RuleRegistry},
    sanctions::SanctionsList,
    store::AmlStore,
    types::{RuleId, Timestamp, TransactionId},
};
use chrono::{Datelike, Duration, Timelike};
use serde::{Deserialize, Serialize};

// ── History seam ─────────────────────────────────────────────────────────────

/// Recent activity for the windowed rules. Both windows are inclusive and
/// include the transaction under evaluation once it has been recorded.
pub trait ActivityHistory: Send + Sync {
    fn count_cash_transactions(
        &self,
        customer_id: &str,
        since: Timestamp,
        until: Timestamp,
        min_cash_minor: u64,
    ) -> AmlResult<u64>;

    fn sum_gross(
        &self,
        customer_id: &str,
        currency: Currency,
        since: Timestamp,
        until: Timestamp,
    ) -> AmlResult<u64>;
}

impl ActivityHistory for AmlStore {
    fn count_cash_transactions(
        &self,
        customer_id: &str,
        since: Timestamp,
        until: Timestamp,
        min_cash_minor: u64,
    ) -> AmlResult<u64> {
        self.count_cash_activity(customer_id, since, until, min_cash_minor)
    }

    fn sum_gross(
        &self,
        customer_id: &str,
        currency: Currency,
        since: Timestamp,
        until: Timestamp,
    ) -> AmlResult<u64> {
        self.sum_gross_activity(customer_id, currency, since, until)
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredAmounts {
    /// Sum of debit entries.
    pub gross: Amount,
    /// Absolute net movement on cash accounts.
    pub cash: Amount,
    /// Whether any entry touched a cash account.
    pub is_cash: bool,
}

/// Reject malformed transactions and derive the amounts the rules use.
pub fn monitored_amounts(txn: &Transaction, config: &AmlConfig) -> AmlResult<MonitoredAmounts> {
    let invalid = |reason: String| AmlError::InvalidTransaction {
        transaction_id: txn.id.clone(),
        reason,
    };

    if txn.id.trim().is_empty() {
        return Err(invalid("transaction id is empty".into()));
    }
    let first = txn
        .entries
        .first()
        .ok_or_else(|| invalid("transaction has no entries".into()))?;
    let currency = first.amount.currency;

    let (mut debits, mut credits) = (0u64, 0u64);
    let (mut cash_in, mut cash_out) = (0u64, 0u64);
    let mut is_cash = false;

    for (i, entry) in txn.entries.iter().enumerate() {
        if entry.account_id.trim().is_empty() {
            return Err(invalid(format!("entry {i} has no account")));
        }
        if entry.amount.currency != currency {
            return Err(invalid(format!(
                "entry {i} is in {} but the transaction is in {currency}",
                entry.amount.currency
            )));
        }
        if entry.amount.is_zero() {
            return Err(invalid(format!("entry {i} has a zero amount")));
        }
        let cash_account = config.is_cash_account(&entry.account_id);
        is_cash |= cash_account;

        let overflow = || invalid("entry totals overflow".into());
        match entry.direction {
            Direction::Debit => {
                debits = debits.checked_add(entry.amount.minor).ok_or_else(overflow)?;
                if cash_account {
                    cash_in = cash_in.checked_add(entry.amount.minor).ok_or_else(overflow)?;
                }
            }
            Direction::Credit => {
                credits = credits.checked_add(entry.amount.minor).ok_or_else(overflow)?;
                if cash_account {
                    cash_out = cash_out.checked_add(entry.amount.minor).ok_or_else(overflow)?;
                }
            }
        }
    }

    if debits == 0 || credits == 0 {
        return Err(invalid("needs at least one debit and one credit".into()));
    }
    if debits != credits {
        return Err(invalid(format!(
            "unbalanced: debits {} != credits {}",
            Amount::new(debits, currency),
            Amount::new(credits, currency)
        )));
    }

    Ok(MonitoredAmounts {
        gross: Amount::new(debits, currency),
        cash: Amount::new(cash_in.abs_diff(cash_out), currency),
        is_cash,
    })
}

// ── Rule evaluation ──────────────────────────────────────────────────────────

/// What a firing rule found.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub amount: Amount,
    pub evidence: Vec<String>,
}

pub struct RuleContext<'a> {
    pub transaction: &'a Transaction,
    pub customer: Option<&'a Customer>,
    pub amounts: MonitoredAmounts,
    pub sanctions: &'a SanctionsList,
    pub history: &'a dyn ActivityHistory,
}

/// Evaluate one rule. `Ok(None)` means the rule did not fire.
pub fn evaluate_rule(rule: &Rule, ctx: &RuleContext<'_>) -> AmlResult<Option<Finding>> {
    let txn = ctx.transaction;
    let amounts = &ctx.amounts;
    let currency = amounts.gross.currency;
    let minor = |major: u64| -> AmlResult<Amount> {
        Amount::major(major, currency).ok_or_else(|| AmlError::RuleEvaluation {
            rule_id: rule.id.clone(),
            reason: format!("{major} {currency} overflows minor units"),
        })
    };

    let finding = match &rule.check {
        RuleCheck::Threshold { threshold } => {
            let threshold = minor(*threshold)?;
            (amounts.is_cash && amounts.cash.minor >= threshold.minor).then(|| Finding {
                title: "Cash transaction at or above reporting threshold".into(),
                description: format!(
                    "Cash movement of {} on {} meets the {} reporting threshold",
                    amounts.cash, txn.id, threshold
                ),
                amount: amounts.cash,
                evidence: vec![
                    format!("cash movement: {}", amounts.cash),
                    format!("threshold (inclusive): {threshold}"),
                ],
            })
        }

        RuleCheck::Structuring {
            threshold,
            floor_bps,
        } => {
            let threshold = minor(*threshold)?;
            let floor = (threshold.minor as u128 * *floor_bps as u128 / 10_000) as u64;
            let cash = amounts.cash.minor;
            (amounts.is_cash && cash >= floor && cash < threshold.minor).then(|| {
                let pct = cash as f64 * 100.0 / threshold.minor as f64;
                Finding {
                    title: "Possible structuring below reporting threshold".into(),
                    description: format!(
                        "Cash movement of {} is {pct:.2}% of the {} threshold",
                        amounts.cash, threshold
                    ),
                    amount: amounts.cash,
                    evidence: vec![
                        format!("cash movement: {}", amounts.cash),
                        format!("band: {} to {threshold} (exclusive)", Amount::new(floor, currency)),
                        format!("share of threshold: {pct:.2}%"),
                    ],
                }
            })
        }

        RuleCheck::RoundAmount { unit, minimum } => {
            let per = currency.minor_per_major();
            let whole = amounts.gross.minor % per == 0;
            let major = amounts.gross.minor / per;
            (whole && major % unit == 0 && major >= *minimum).then(|| Finding {
                title: "Round-amount transaction".into(),
                description: format!(
                    "{} is an exact multiple of {unit} {currency}",
                    amounts.gross
                ),
                amount: amounts.gross,
                evidence: vec![
                    format!("gross amount: {}", amounts.gross),
                    format!("round unit: {unit} {currency}"),
                    format!("minimum: {minimum} {currency}"),
                ],
            })
        }

        RuleCheck::GeographicRisk { jurisdictions } => ctx
            .customer
            .filter(|c| jurisdictions.contains(&c.country))
            .map(|c| Finding {
                title: "Customer in high-risk jurisdiction".into(),
                description: format!(
                    "Customer {} is domiciled in high-risk jurisdiction {}",
                    c.id, c.country
                ),
                amount: amounts.gross,
                evidence: vec![format!("matched jurisdiction: {}", c.country)],
            }),

        RuleCheck::SanctionsMatch => ctx
            .sanctions
            .screen(ctx.customer, &txn.source_reference)
            .map(|hit| Finding {
                title: "Sanctions match".into(),
                description: format!(
                    "Transaction {} involves a sanctioned party: {}",
                    txn.id,
                    hit.describe()
                ),
                amount: amounts.gross,
                evidence: vec![
                    hit.describe(),
                    format!("counterparty reference: {}", txn.source_reference),
                ],
            }),

        RuleCheck::PepActivity { threshold } => {
            let threshold = minor(*threshold)?;
            ctx.customer
                .filter(|c| c.is_pep() && amounts.gross.minor > threshold.minor)
                .map(|c| Finding {
                    title: "Politically exposed person activity".into(),
                    description: format!(
                        "PEP customer {} moved {} (threshold {})",
                        c.id, amounts.gross, threshold
                    ),
                    amount: amounts.gross,
                    evidence: vec![
                        "customer is a politically exposed person".into(),
                        format!("gross amount: {}", amounts.gross),
                        format!("PEP threshold: {threshold}"),
                    ],
                })
        }

        RuleCheck::UnusualTiming {
            weekdays,
            off_hours_start,
            off_hours_end,
            minimum,
        } => {
            let minimum = minor(*minimum)?;
            let weekday = txn.posted_at.weekday();
            let hour = txn.posted_at.hour();
            let on_day = weekdays.contains(&weekday);
            let off_hours = in_window(hour, *off_hours_start, *off_hours_end);
            ((on_day || off_hours) && amounts.gross.minor >= minimum.minor).then(|| {
                let mut evidence = vec![format!("posted at: {}", txn.posted_at.to_rfc3339())];
                if on_day {
                    evidence.push(format!("non-business day: {weekday}"));
                }
                if off_hours {
                    evidence.push(format!(
                        "off-hours window: {off_hours_start:02}:00-{off_hours_end:02}:00 UTC"
                    ));
                }
                Finding {
                    title: "Transaction outside business hours".into(),
                    description: format!(
                        "{} posted {} {:02}:00 UTC",
                        amounts.gross, weekday, hour
                    ),
                    amount: amounts.gross,
                    evidence,
                }
            })
        }

        RuleCheck::CashIntensive {
            max_count,
            lookback_days,
            min_amount,
        } => {
            let min_cash = minor(*min_amount)?;
            match ctx.customer {
                Some(c) if amounts.is_cash && amounts.cash.minor >= min_cash.minor => {
                    let since = window_start(rule, txn.posted_at, *lookback_days)?;
                    let count = ctx
                        .history
                        .count_cash_transactions(&c.id, since, txn.posted_at, min_cash.minor)?;
                    (count > *max_count as u64).then(|| Finding {
                        title: "Cash-intensive activity".into(),
                        description: format!(
                            "Customer {} made {count} cash transactions in {lookback_days} days (limit {max_count})",
                            c.id
                        ),
                        amount: amounts.cash,
                        evidence: vec![
                            format!("cash transactions in window: {count}"),
                            format!("window: {lookback_days} days"),
                            format!("qualifying minimum: {min_cash}"),
                        ],
                    })
                }
                _ => None,
            }
        }

        RuleCheck::Velocity {
            threshold,
            lookback_days,
        } => {
            let threshold = minor(*threshold)?;
            match ctx.customer {
                Some(c) => {
                    let since = window_start(rule, txn.posted_at, *lookback_days)?;
                    let total = ctx.history.sum_gross(&c.id, currency, since, txn.posted_at)?;
                    let total = Amount::new(total, currency);
                    (total.minor > threshold.minor).then(|| Finding {
                        title: "High transaction velocity".into(),
                        description: format!(
                            "Customer {} moved {total} in {lookback_days} days (threshold {threshold})",
                            c.id
                        ),
                        amount: total,
                        evidence: vec![
                            format!("cumulative amount: {total}"),
                            format!("window: {lookback_days} days"),
                            format!("threshold: {threshold}"),
                        ],
                    })
                }
                None => None,
            }
        }
    };

    Ok(finding)
}

/// Start of a lookback window ending at `posted_at`.
fn window_start(rule: &Rule, posted_at: Timestamp, lookback_days: u32) -> AmlResult<Timestamp> {
    Duration::try_days(i64::from(lookback_days))
        .and_then(|span| posted_at.checked_sub_signed(span))
        .ok_or_else(|| AmlError::RuleEvaluation {
            rule_id: rule.id.clone(),
            reason: format!("lookback of {lookback_days} days is out of range"),
        })
}

/// Hour-of-day window; wraps midnight when `start > end`, empty when equal.
fn in_window(hour: u32, start: u32, end: u32) -> bool {
    match start.cmp(&end) {
        std::cmp::Ordering::Equal => false,
        std::cmp::Ordering::Less => hour >= start && hour < end,
        std::cmp::Ordering::Greater => hour >= start || hour < end,
    }
}

/// The rule's severity, raised to the floor the customer implies.
/// Sanctions matches are always critical.
pub fn alert_risk_level(rule: &Rule, customer: Option<&Customer>) -> RiskLevel {
    if rule.rule_type() == RuleType::SanctionsMatch {
        return RiskLevel::Critical;
    }
    match customer.and_then(Customer::alert_risk_floor) {
        Some(floor) => rule.severity.max(floor),
        None => rule.severity,
    }
}

// ── Monitor ──────────────────────────────────────────────────────────────────

/// A rule that could not be evaluated. Other rules were unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationGap {
    pub rule_id: Option<RuleId>,
    pub reason: String,
}

/// Drafts produced by one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub drafts: Vec<AlertDraft>,
    pub gaps: Vec<EvaluationGap>,
    pub skipped_rules: Vec<RuleId>,
}

pub struct TransactionMonitor<'a> {
    rules: &'a RuleRegistry,
    sanctions: &'a SanctionsList,
    history: &'a dyn ActivityHistory,
}

impl<'a> TransactionMonitor<'a> {
    pub fn new(
        rules: &'a RuleRegistry,
        sanctions: &'a SanctionsList,
        history: &'a dyn ActivityHistory,
    ) -> Self {
        Self {
            rules,
            sanctions,
            history,
        }
    }

    /// Evaluate every applicable active rule. Rules that need a customer
    /// are skipped when none was resolved.
    pub fn evaluate(
        &self,
        txn: &Transaction,
        amounts: MonitoredAmounts,
        customer: Option<&Customer>,
    ) -> Evaluation {
        let ctx = RuleContext {
            transaction: txn,
            customer,
            amounts,
            sanctions: self.sanctions,
            history: self.history,
        };
        let mut out = Evaluation::default();

        for rule in self.rules.active_rules_for(amounts.gross.currency, customer) {
            if customer.is_none() && rule.check.needs_customer() {
                out.skipped_rules.push(rule.id.clone());
                continue;
            }

            match evaluate_rule(&rule, &ctx) {
                Ok(Some(finding)) => {
                    // One sanctions alert per transaction; further sanctions
                    // rules attach to it.
                    if rule.rule_type() == RuleType::SanctionsMatch {
                        if let Some(existing) = out
                            .drafts
                            .iter_mut()
                            .find(|d| d.rule_type == RuleType::SanctionsMatch)
                        {
                            existing.rule_ids.push(rule.id.clone());
                            continue;
                        }
                    }
                    log::info!("txn={} rule={} fired: {}", txn.id, rule.id, finding.title);
                    out.drafts.push(draft_from(&rule, finding, txn, customer));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("txn={} rule={} evaluation gap: {e}", txn.id, rule.id);
                    out.gaps.push(EvaluationGap {
                        rule_id: Some(rule.id.clone()),
                        reason: e.to_string(),
                    });
                }
            }
        }
        out
    }
}

fn draft_from(
    rule: &Rule,
    finding: Finding,
    txn: &Transaction,
    customer: Option<&Customer>,
) -> AlertDraft {
    let mut evidence = finding.evidence;
    evidence.push(format!("rule: {} ({})", rule.id, rule.name));
    AlertDraft {
        transaction_id: txn.id.clone(),
        customer_id: customer.map(|c| c.id.clone()),
        rule_ids: vec![rule.id.clone()],
        rule_type: rule.rule_type(),
        framework: rule.framework,
        risk_level: alert_risk_level(rule, customer),
        title: finding.title,
        description: finding.description,
        amount: finding.amount,
        evidence,
    }
}

/// Result of monitoring one transaction.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub transaction_id: TransactionId,
    pub alerts: Vec<Alert>,
    pub gaps: Vec<EvaluationGap>,
    pub skipped_rules: Vec<RuleId>,
    /// The counterparty reference that could not be resolved, if any.
    /// Customer-independent rules still ran.
    pub unresolved_counterparty: Option<String>,
}

impl MonitorOutcome {
    /// Alerts, or `UnknownCustomer` when the counterparty was unresolved.
    /// The alerts are already stored either way.
    pub fn into_result(self) -> AmlResult<Vec<Alert>> {
        match self.unresolved_counterparty {
            Some(reference) => Err(AmlError::UnknownCustomer(reference)),
            None => Ok(self.alerts),
        }
    }

    pub fn count_at(&self, level: RiskLevel) -> usize {
        self.alerts.iter().filter(|a| a.risk_level == level).count()
    }

    pub fn fired(&self, rule_type: RuleType) -> bool {
        self.alerts.iter().any(|a| a.rule_type == rule_type)
    }
}
