//! Transaction monitoring: every rule family, boundaries, sanctions,
//! unresolved counterparties, evaluation gaps, and the end-to-end scenarios.

use aml_core::{
    clock::ManualClock,
    config::AmlConfig,
    engine::AmlEngine,
    error::{AmlError, AmlResult, ErrorKind},
    risk_model::{
        Amount, Currency, Customer, CustomerType, Entry, Framework, RiskLevel, RuleType,
        Transaction,
    },
    rule_registry::{Rule, RuleCheck, RuleRegistry},
    sanctions::{SanctionsHit, SanctionsList},
    store::{ActivityRecord, AmlStore},
    transaction_monitor::{
        evaluate_rule, monitored_amounts, ActivityHistory, RuleContext, TransactionMonitor,
    },
    types::Timestamp,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Wednesday afternoon: a business day, inside business hours.
fn weekday() -> Timestamp {
    at(2026, 1, 7, 14, 0)
}

fn engine() -> AmlEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(at(2026, 1, 7, 15, 0)));
    AmlEngine::build_test(clock).unwrap()
}

fn customer(id: &str, kind: CustomerType, country: &str, risk: RiskLevel) -> Customer {
    Customer::new(id, format!("Customer {id}"), kind, country, risk, at(2025, 3, 1, 0, 0))
}

fn usd(minor: u64) -> Amount {
    Amount::new(minor, Currency::USD)
}

fn cash_deposit(id: &str, customer_id: &str, amount: Amount, posted_at: Timestamp) -> Transaction {
    Transaction {
        id: id.into(),
        description: "Cash deposit".into(),
        source_reference: customer_id.into(),
        posted_at,
        entries: vec![
            Entry::debit("cash-drawer-01", amount),
            Entry::credit(format!("deposit-{customer_id}"), amount),
        ],
    }
}

fn wire(id: &str, customer_id: &str, amount: Amount, posted_at: Timestamp) -> Transaction {
    Transaction {
        id: id.into(),
        description: "Outgoing wire".into(),
        source_reference: customer_id.into(),
        posted_at,
        entries: vec![
            Entry::debit(format!("deposit-{customer_id}"), amount),
            Entry::credit("wire-clearing", amount),
        ],
    }
}

fn salary(id: &str, customer_id: &str, amount: Amount, posted_at: Timestamp) -> Transaction {
    Transaction {
        id: id.into(),
        description: "Salary".into(),
        source_reference: customer_id.into(),
        posted_at,
        entries: vec![
            Entry::debit("payroll-clearing", amount),
            Entry::credit(format!("deposit-{customer_id}"), amount),
        ],
    }
}

// ── Threshold / structuring ──────────────────────────────────────────────────

#[test]
fn ctr_threshold_is_inclusive() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let at_threshold = engine
        .monitor_transaction(&cash_deposit("T-1", "C-1", usd(1_000_000), weekday()))
        .unwrap();
    assert!(at_threshold.fired(RuleType::Threshold), "$10,000.00 must file a CTR");

    let below = engine
        .monitor_transaction(&cash_deposit("T-2", "C-1", usd(999_999), weekday()))
        .unwrap();
    assert!(!below.fired(RuleType::Threshold), "$9,999.99 must not file a CTR");
    assert!(below.fired(RuleType::Structuring), "$9,999.99 sits in the structuring band");
}

#[test]
fn structuring_band_lower_edge() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let floor = engine
        .monitor_transaction(&cash_deposit("T-1", "C-1", usd(950_000), weekday()))
        .unwrap();
    assert!(floor.fired(RuleType::Structuring), "95% of the threshold is in the band");

    let under = engine
        .monitor_transaction(&cash_deposit("T-2", "C-1", usd(949_999), weekday()))
        .unwrap();
    assert!(under.alerts.is_empty(), "got {:?}", under.alerts);
}

#[test]
fn non_cash_transfers_never_file_ctrs() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-1", usd(1_250_000), weekday()))
        .unwrap();
    assert!(!outcome.fired(RuleType::Threshold));
    assert!(!outcome.fired(RuleType::Structuring));
}

// ── Sanctions ────────────────────────────────────────────────────────────────

#[test]
fn sanctioned_customer_gets_exactly_one_critical_alert() {
    let engine = engine();
    engine
        .register_customer(customer("C-SDN", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    engine
        .record_sanctions_match("C-SDN", "OFAC SDN list", "screening")
        .unwrap();

    let txns = [
        wire("T-1", "C-SDN", usd(1_234), weekday()),
        wire("T-2", "C-SDN", usd(750_000), weekday()),
        cash_deposit("T-3", "C-SDN", usd(1_000_000), weekday()),
    ];
    for txn in &txns {
        let outcome = engine.monitor_transaction(txn).unwrap();
        assert_eq!(
            outcome.count_at(RiskLevel::Critical),
            1,
            "txn {} should raise exactly one CRITICAL alert, got {:?}",
            txn.id,
            outcome.alerts
        );
        assert!(outcome.fired(RuleType::SanctionsMatch));
    }
}

#[test]
fn customer_context_raises_other_alerts_to_high_only() {
    let engine = engine();
    engine
        .register_customer(customer("C-SDN", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    engine.record_sanctions_match("C-SDN", "list", "screening").unwrap();

    let outcome = engine
        .monitor_transaction(&cash_deposit("T-1", "C-SDN", usd(1_000_000), weekday()))
        .unwrap();
    let ctr = outcome
        .alerts
        .iter()
        .find(|a| a.rule_type == RuleType::Threshold)
        .expect("CTR alert");
    assert_eq!(ctr.risk_level, RiskLevel::High);
}

#[test]
fn listed_name_matches_without_profile_flag() {
    let engine = engine();
    engine
        .register_customer(Customer::new(
            "C-9",
            "Ivan Petrov",
            CustomerType::Individual,
            "US",
            RiskLevel::Low,
            at(2025, 3, 1, 0, 0),
        ))
        .unwrap();
    engine.add_sanctioned_party("IVAN PETROV");

    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-9", usd(50_000), weekday()))
        .unwrap();
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].risk_level, RiskLevel::Critical);
    assert!(outcome.alerts[0]
        .evidence
        .iter()
        .any(|e| e.contains("customer name")));
}

#[test]
fn screening_follows_list_changes() {
    let engine = engine();
    engine
        .register_customer(Customer::new(
            "C-9",
            "Ivan Petrov",
            CustomerType::Individual,
            "US",
            RiskLevel::Low,
            at(2025, 3, 1, 0, 0),
        ))
        .unwrap();
    assert_eq!(engine.screen_customer("C-9").unwrap(), None);

    assert!(engine.add_sanctioned_party("ivan  petrov"));
    assert!(matches!(
        engine.screen_customer("C-9").unwrap(),
        Some(SanctionsHit::ListedParty { matched_on: "customer name", .. })
    ));

    assert!(engine.remove_sanctioned_party("IVAN PETROV"));
    assert!(!engine.remove_sanctioned_party("IVAN PETROV"), "already delisted");
    assert_eq!(engine.screen_customer("C-9").unwrap(), None);
    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-9", usd(50_000), weekday()))
        .unwrap();
    assert!(!outcome.fired(RuleType::SanctionsMatch));

    engine.record_sanctions_match("C-9", "OFAC SDN list", "screening").unwrap();
    assert_eq!(engine.screen_customer("C-9").unwrap(), Some(SanctionsHit::ProfileFlag));

    let err = engine.screen_customer("C-404").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn listed_counterparty_matches_when_unresolved() {
    let engine = engine();
    engine.add_sanctioned_party("Northwind Shell Trading");

    let outcome = engine
        .monitor_transaction(&wire("T-1", "Northwind Shell Trading", usd(12_000), weekday()))
        .unwrap();
    assert_eq!(outcome.count_at(RiskLevel::Critical), 1);
    assert_eq!(
        outcome.unresolved_counterparty.as_deref(),
        Some("Northwind Shell Trading")
    );
    assert!(outcome.alerts[0].customer_id.is_none());
}

#[test]
fn multiple_sanctions_rules_merge_into_one_alert() {
    let engine = engine();
    engine
        .register_rule(Rule::new(
            "CUSTOM-SDN-002",
            "Internal watch list",
            Framework::Ofac,
            RiskLevel::Critical,
            RuleCheck::SanctionsMatch,
        ))
        .unwrap();
    engine
        .register_customer(customer("C-SDN", CustomerType::Business, "US", RiskLevel::Medium))
        .unwrap();
    engine.record_sanctions_match("C-SDN", "list", "screening").unwrap();

    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-SDN", usd(1_234), weekday()))
        .unwrap();
    assert_eq!(outcome.alerts.len(), 1, "got {:?}", outcome.alerts);
    assert_eq!(
        outcome.alerts[0].rule_ids,
        vec!["CUSTOM-SDN-002".to_string(), "OFAC-001-SDN".to_string()]
    );
}

#[test]
fn lower_severity_sanctions_rule_cannot_demote_the_alert() {
    let engine = engine();
    engine
        .register_rule(Rule::new(
            "AMLD-009-SANCT",
            "Regional watch list",
            Framework::Amld,
            RiskLevel::Medium,
            RuleCheck::SanctionsMatch,
        ))
        .unwrap();
    engine
        .register_customer(customer("C-SDN", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    engine.record_sanctions_match("C-SDN", "OFAC SDN list", "screening").unwrap();

    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-SDN", usd(750_000), weekday()))
        .unwrap();
    assert_eq!(outcome.count_at(RiskLevel::Critical), 1, "got {:?}", outcome.alerts);
    let sanctions: Vec<_> = outcome
        .alerts
        .iter()
        .filter(|a| a.rule_type == RuleType::SanctionsMatch)
        .collect();
    assert_eq!(sanctions.len(), 1);
    assert_eq!(sanctions[0].risk_level, RiskLevel::Critical);
    assert_eq!(
        sanctions[0].rule_ids,
        vec!["AMLD-009-SANCT".to_string(), "OFAC-001-SDN".to_string()]
    );
}

#[test]
fn lone_custom_sanctions_rule_still_raises_critical() {
    let engine = engine();
    engine
        .set_rule_active("OFAC-001-SDN", false, "tuning-committee")
        .unwrap();
    engine
        .register_rule(Rule::new(
            "CUSTOM-SDN-LOW",
            "Low-severity watch list",
            Framework::Common,
            RiskLevel::Low,
            RuleCheck::SanctionsMatch,
        ))
        .unwrap();
    engine.add_sanctioned_party("Northwind Shell Trading");

    let outcome = engine
        .monitor_transaction(&wire("T-1", "Northwind Shell Trading", usd(12_000), weekday()))
        .unwrap();
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].rule_ids, vec!["CUSTOM-SDN-LOW".to_string()]);
    assert_eq!(outcome.alerts[0].risk_level, RiskLevel::Critical);
}

// ── End to end ───────────────────────────────────────────────────────────────

#[test]
fn end_to_end_scenarios() {
    let engine = engine();
    engine
        .register_customer(customer("C-SDN", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    engine.record_sanctions_match("C-SDN", "OFAC SDN list", "screening").unwrap();
    engine
        .register_customer(customer("C-LOW", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    engine
        .register_customer(customer("C-BIZ", CustomerType::Business, "US", RiskLevel::Medium))
        .unwrap();

    let sanctioned = engine
        .monitor_transaction(&wire("T-1", "C-SDN", usd(750_000), weekday()))
        .unwrap();
    assert!(sanctioned.count_at(RiskLevel::Critical) >= 1);

    let pay = engine
        .monitor_transaction(&salary("T-2", "C-LOW", usd(500_000), weekday()))
        .unwrap();
    assert!(pay.alerts.is_empty(), "salary raised {:?}", pay.alerts);

    let deposit = engine
        .monitor_transaction(&cash_deposit("T-3", "C-BIZ", usd(995_000), weekday()))
        .unwrap();
    assert!(deposit.fired(RuleType::Structuring));
    assert!(!deposit.fired(RuleType::Threshold));
}

// ── Customer-dependent rules ─────────────────────────────────────────────────

#[test]
fn pep_threshold_is_strict() {
    let engine = engine();
    engine
        .register_customer(customer("C-PEP", CustomerType::Pep, "US", RiskLevel::Medium))
        .unwrap();

    let at_threshold = engine
        .monitor_transaction(&wire("T-1", "C-PEP", usd(500_000), weekday()))
        .unwrap();
    assert!(at_threshold.alerts.is_empty(), "got {:?}", at_threshold.alerts);

    let above = engine
        .monitor_transaction(&wire("T-2", "C-PEP", usd(500_001), weekday()))
        .unwrap();
    assert!(above.fired(RuleType::PepActivity));
    assert!(above.alerts.iter().all(|a| a.risk_level >= RiskLevel::High));
}

#[test]
fn geographic_risk_fires_regardless_of_amount() {
    let engine = engine();
    engine
        .register_customer(customer("C-IR", CustomerType::Individual, "IR", RiskLevel::Low))
        .unwrap();

    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-IR", usd(10_000), weekday()))
        .unwrap();
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].rule_type, RuleType::GeographicRisk);
    assert_eq!(outcome.alerts[0].risk_level, RiskLevel::High);
}

#[test]
fn eu_threshold_applies_only_to_eu_customers() {
    let engine = engine();
    engine
        .register_customer(customer("C-DE", CustomerType::Individual, "DE", RiskLevel::Low))
        .unwrap();
    engine
        .register_customer(customer("C-US", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    let eur = Amount::new(1_000_000, Currency::EUR);

    let de = engine
        .monitor_transaction(&cash_deposit("T-1", "C-DE", eur, weekday()))
        .unwrap();
    let eu_alert = de
        .alerts
        .iter()
        .find(|a| a.rule_type == RuleType::Threshold)
        .expect("EU threshold alert");
    assert_eq!(eu_alert.rule_ids, vec!["AMLD-001-THR".to_string()]);

    let us = engine
        .monitor_transaction(&cash_deposit("T-2", "C-US", eur, weekday()))
        .unwrap();
    assert!(!us.fired(RuleType::Threshold));
}

#[test]
fn unusual_timing_weekends_and_off_hours() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let saturday = engine
        .monitor_transaction(&wire("T-1", "C-1", usd(300_000), at(2026, 1, 10, 12, 0)))
        .unwrap();
    assert!(saturday.fired(RuleType::UnusualTiming));

    let small = engine
        .monitor_transaction(&wire("T-2", "C-1", usd(299_999), at(2026, 1, 10, 12, 0)))
        .unwrap();
    assert!(small.alerts.is_empty(), "below the timing minimum");

    let late = engine
        .monitor_transaction(&wire("T-3", "C-1", usd(300_000), at(2026, 1, 7, 23, 30)))
        .unwrap();
    assert!(late.fired(RuleType::UnusualTiming), "23:30 is inside the wrapped window");

    let early = engine
        .monitor_transaction(&wire("T-4", "C-1", usd(300_000), at(2026, 1, 7, 5, 59)))
        .unwrap();
    assert!(early.fired(RuleType::UnusualTiming));

    let opening = engine
        .monitor_transaction(&wire("T-5", "C-1", usd(300_000), at(2026, 1, 7, 6, 0)))
        .unwrap();
    assert!(!opening.fired(RuleType::UnusualTiming), "06:00 ends the window");
}

#[test]
fn round_amounts_need_whole_multiples() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let round = engine
        .monitor_transaction(&wire("T-1", "C-1", usd(2_000_000), weekday()))
        .unwrap();
    assert_eq!(round.alerts.len(), 1);
    assert_eq!(round.alerts[0].rule_type, RuleType::RoundAmount);
    assert_eq!(round.alerts[0].risk_level, RiskLevel::Low);

    let cents = engine
        .monitor_transaction(&wire("T-2", "C-1", usd(2_000_050), weekday()))
        .unwrap();
    assert!(!cents.fired(RuleType::RoundAmount));
}

#[test]
fn cash_intensive_counts_history_including_current() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Business, "US", RiskLevel::Low))
        .unwrap();

    for hour in 8..13 {
        let id = format!("T-{hour}");
        let outcome = engine
            .monitor_transaction(&cash_deposit(&id, "C-1", usd(150_000), at(2026, 1, 7, hour, 0)))
            .unwrap();
        assert!(!outcome.fired(RuleType::CashIntensive), "{id} is within the limit");
    }
    let sixth = engine
        .monitor_transaction(&cash_deposit("T-13", "C-1", usd(150_000), at(2026, 1, 7, 13, 0)))
        .unwrap();
    assert!(sixth.fired(RuleType::CashIntensive), "six cash deposits exceed five");
}

#[test]
fn velocity_sums_the_lookback_window() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Business, "US", RiskLevel::Low))
        .unwrap();

    for hour in 8..13 {
        let id = format!("T-{hour}");
        let outcome = engine
            .monitor_transaction(&wire(&id, "C-1", usd(900_000), at(2026, 1, 7, hour, 0)))
            .unwrap();
        assert!(!outcome.fired(RuleType::Velocity), "{id}: total still under $50,000");
    }
    let sixth = engine
        .monitor_transaction(&wire("T-13", "C-1", usd(900_000), at(2026, 1, 7, 13, 0)))
        .unwrap();
    assert!(sixth.fired(RuleType::Velocity));
}

#[test]
fn alerts_keep_the_risk_level_they_were_raised_with() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::High))
        .unwrap();

    let outcome = engine
        .monitor_transaction(&cash_deposit("T-1", "C-1", usd(1_000_000), weekday()))
        .unwrap();
    let ctr = outcome
        .alerts
        .iter()
        .find(|a| a.rule_type == RuleType::Threshold)
        .unwrap()
        .clone();
    assert_eq!(ctr.risk_level, RiskLevel::High, "high-risk customers raise the floor");

    engine.update_risk_level("C-1", RiskLevel::Low, "mlro").unwrap();
    assert_eq!(engine.get_alert(&ctr.id).unwrap().risk_level, RiskLevel::High);
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[test]
fn unresolved_counterparty_runs_customer_free_rules() {
    let engine = engine();

    let outcome = engine
        .monitor_transaction(&cash_deposit("T-1", "EXT-404", usd(1_000_000), weekday()))
        .unwrap();
    assert!(outcome.fired(RuleType::Threshold));
    assert_eq!(
        outcome.skipped_rules,
        vec![
            "BSA-003-CASH".to_string(),
            "FATF-001-GEO".to_string(),
            "FINCEN-001-VEL".to_string(),
            "FINCEN-002-PEP".to_string(),
        ]
    );
    assert!(outcome.alerts.iter().all(|a| a.customer_id.is_none()));
    let stored = outcome.alerts.len();

    match outcome.into_result() {
        Err(AmlError::UnknownCustomer(reference)) => assert_eq!(reference, "EXT-404"),
        other => panic!("expected UnknownCustomer, got {other:?}"),
    }
    assert_eq!(engine.get_alerts(None, None, 0).len(), stored, "alerts are still stored");
}

#[test]
fn malformed_transactions_are_rejected_before_side_effects() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let mut unbalanced = cash_deposit("T-1", "C-1", usd(1_000_000), weekday());
    unbalanced.entries[1].amount = usd(999_999);

    let mut one_sided = cash_deposit("T-2", "C-1", usd(1_000_000), weekday());
    one_sided.entries.truncate(1);

    let mut mixed = cash_deposit("T-3", "C-1", usd(1_000_000), weekday());
    mixed.entries[1].amount = Amount::new(1_000_000, Currency::EUR);

    let mut zero = cash_deposit("T-4", "C-1", usd(1_000_000), weekday());
    zero.entries.push(Entry::debit("fees", usd(0)));

    let no_id = cash_deposit("", "C-1", usd(1_000_000), weekday());

    for txn in [unbalanced, one_sided, mixed, zero, no_id] {
        let err = engine.monitor_transaction(&txn).unwrap_err();
        assert!(
            matches!(err, AmlError::InvalidTransaction { .. }),
            "txn '{}' gave {err}",
            txn.id
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert!(engine.get_alerts(None, None, 0).is_empty());
    assert!(engine.store().activity_for_customer("C-1").unwrap().is_empty());
}

#[test]
fn remonitoring_duplicates_alerts_but_not_history() {
    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    let txn = cash_deposit("T-1", "C-1", usd(1_000_000), weekday());

    let first = engine.monitor_transaction(&txn).unwrap();
    let second = engine.monitor_transaction(&txn).unwrap();
    assert_eq!(first.alerts.len(), second.alerts.len());
    assert_eq!(engine.get_alerts(None, None, 0).len(), first.alerts.len() * 2);
    assert!(first
        .alerts
        .iter()
        .all(|a| second.alerts.iter().all(|b| a.id != b.id)));
    assert_eq!(engine.store().activity_for_customer("C-1").unwrap().len(), 1);
}

#[test]
fn rule_that_cannot_evaluate_becomes_a_gap() {
    let engine = engine();
    engine
        .register_rule(Rule::new(
            "CUSTOM-OVERFLOW",
            "Misconfigured threshold",
            Framework::Common,
            RiskLevel::Medium,
            RuleCheck::Threshold { threshold: u64::MAX },
        ))
        .unwrap();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();

    let outcome = engine
        .monitor_transaction(&cash_deposit("T-1", "C-1", usd(1_000_000), weekday()))
        .unwrap();
    assert_eq!(outcome.gaps.len(), 1);
    assert_eq!(outcome.gaps[0].rule_id.as_deref(), Some("CUSTOM-OVERFLOW"));
    assert!(outcome.fired(RuleType::Threshold), "other rules still run");

    let journal = engine.audit_trail("T-1").unwrap();
    assert!(journal.iter().any(|e| e.event_type == "evaluation_gap"));
}

#[test]
fn oversized_lookback_is_rejected_at_registration() {
    let engine = engine();
    for check in [
        RuleCheck::Velocity {
            threshold: 50_000,
            lookback_days: u32::MAX,
        },
        RuleCheck::CashIntensive {
            max_count: 3,
            lookback_days: 3651,
            min_amount: 1_000,
        },
    ] {
        let err = engine
            .register_rule(Rule::new(
                "CUSTOM-WINDOW",
                "Oversized window",
                Framework::Common,
                RiskLevel::Medium,
                check,
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config, "{err}");
    }

    engine
        .register_rule(Rule::new(
            "CUSTOM-WINDOW",
            "Ten-year window",
            Framework::Common,
            RiskLevel::Medium,
            RuleCheck::Velocity {
                threshold: 50_000,
                lookback_days: 3650,
            },
        ))
        .unwrap();
    engine
        .register_customer(customer("C-1", CustomerType::Individual, "US", RiskLevel::Low))
        .unwrap();
    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-1", usd(100), weekday()))
        .unwrap();
    assert!(outcome.gaps.is_empty(), "{:?}", outcome.gaps);
}

#[test]
fn lookback_beyond_the_calendar_is_an_evaluation_error() {
    let config = AmlConfig::default_test();
    let sanctions = SanctionsList::new();
    let c = customer("C-1", CustomerType::Individual, "US", RiskLevel::Low);
    let txn = cash_deposit("T-1", "C-1", usd(500_000), weekday());
    let ctx = RuleContext {
        transaction: &txn,
        customer: Some(&c),
        amounts: monitored_amounts(&txn, &config).unwrap(),
        sanctions: &sanctions,
        history: &OfflineHistory,
    };

    for check in [
        RuleCheck::Velocity {
            threshold: 50_000,
            lookback_days: u32::MAX,
        },
        RuleCheck::CashIntensive {
            max_count: 3,
            lookback_days: u32::MAX,
            min_amount: 1,
        },
    ] {
        let rule = Rule::new(
            "CUSTOM-WINDOW",
            "Unbounded window",
            Framework::Common,
            RiskLevel::Medium,
            check,
        );
        let err = evaluate_rule(&rule, &ctx).unwrap_err();
        assert!(
            matches!(&err, AmlError::RuleEvaluation { rule_id, .. } if rule_id == "CUSTOM-WINDOW"),
            "{err}"
        );
        assert_eq!(err.kind(), ErrorKind::Evaluation);
    }
}

struct OfflineHistory;

impl ActivityHistory for OfflineHistory {
    fn count_cash_transactions(&self, _: &str, _: Timestamp, _: Timestamp, _: u64) -> AmlResult<u64> {
        Err(AmlError::Validation("history offline".into()))
    }

    fn sum_gross(&self, _: &str, _: Currency, _: Timestamp, _: Timestamp) -> AmlResult<u64> {
        Err(AmlError::Validation("history offline".into()))
    }
}

#[test]
fn history_failures_are_isolated_per_rule() {
    let config = AmlConfig::default_test();
    let rules = RuleRegistry::new(config.clone());
    rules.setup_framework_rules(Framework::Bsa).unwrap();
    rules.setup_framework_rules(Framework::Fincen).unwrap();
    let sanctions = SanctionsList::new();
    let monitor = TransactionMonitor::new(&rules, &sanctions, &OfflineHistory);

    let c = customer("C-1", CustomerType::Individual, "US", RiskLevel::Low);
    let txn = cash_deposit("T-1", "C-1", usd(1_000_000), weekday());
    let amounts = monitored_amounts(&txn, &config).unwrap();
    assert!(amounts.is_cash);
    assert_eq!(amounts.cash, usd(1_000_000));

    let evaluation = monitor.evaluate(&txn, amounts, Some(&c));
    let gap_rules: Vec<Option<String>> = evaluation.gaps.iter().map(|g| g.rule_id.clone()).collect();
    assert_eq!(
        gap_rules,
        vec![Some("BSA-003-CASH".to_string()), Some("FINCEN-001-VEL".to_string())]
    );
    assert!(evaluation
        .drafts
        .iter()
        .any(|d| d.rule_type == RuleType::Threshold));
}

#[test]
fn history_rejects_amounts_it_cannot_store_exactly() {
    let store = AmlStore::in_memory().unwrap();
    store.migrate().unwrap();
    let record = ActivityRecord {
        transaction_id: "T-1".into(),
        customer_id: "C-1".into(),
        posted_at: weekday(),
        gross: usd(u64::MAX),
        cash: usd(0),
        is_cash: false,
    };
    let err = store.record_activity(&record, weekday()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    assert!(store.activity_for_customer("C-1").unwrap().is_empty());

    let engine = engine();
    engine
        .register_customer(customer("C-1", CustomerType::Business, "US", RiskLevel::Low))
        .unwrap();
    let outcome = engine
        .monitor_transaction(&wire("T-1", "C-1", usd(i64::MAX as u64 + 1), weekday()))
        .unwrap();
    assert!(outcome
        .gaps
        .iter()
        .any(|g| g.rule_id.is_none() && g.reason.contains("activity history not recorded")));
    assert!(engine.store().activity_for_customer("C-1").unwrap().is_empty());
}

#[test]
fn cash_movement_nets_debits_and_credits() {
    let config = AmlConfig::default_test();
    let txn = Transaction {
        id: "T-1".into(),
        description: "Cash exchange".into(),
        source_reference: "C-1".into(),
        posted_at: weekday(),
        entries: vec![
            Entry::debit("cash-drawer-01", usd(500_000)),
            Entry::credit("cash-drawer-02", usd(200_000)),
            Entry::credit("deposit-C-1", usd(300_000)),
        ],
    };
    let amounts = monitored_amounts(&txn, &config).unwrap();
    assert_eq!(amounts.gross, usd(500_000));
    assert_eq!(amounts.cash, usd(300_000));
}
