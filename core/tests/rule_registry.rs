//! Rule registry: framework installation, idempotency, validation, lookup.

use aml_core::{
    config::AmlConfig,
    error::{AmlError, ErrorKind},
    risk_model::{Currency, Customer, CustomerType, Framework, RiskLevel, RuleType},
    rule_registry::{Rule, RuleCheck, RuleRegistry},
};
use chrono::{TimeZone, Utc};

fn registry() -> RuleRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    RuleRegistry::new(AmlConfig::default_test())
}

fn customer(country: &str) -> Customer {
    let onboarded = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    Customer::new("C-1", "Test Customer", CustomerType::Individual, country, RiskLevel::Low, onboarded)
}

#[test]
fn all_frameworks_install_in_order() {
    let reg = registry();
    let installed = reg.setup_all_standard_rules().unwrap();

    let order: Vec<Framework> = installed.iter().map(|(f, _)| *f).collect();
    assert_eq!(
        order,
        vec![
            Framework::Bsa,
            Framework::Fatf,
            Framework::Amld,
            Framework::Fincen,
            Framework::Ofac,
            Framework::Common
        ]
    );
    assert_eq!(reg.len(), 11, "expected the 11 canonical rules");
    assert!(reg.rule("BSA-001-CTR").is_some());
    assert!(reg.rule("OFAC-001-SDN").is_some());
    assert_eq!(
        reg.rule("OFAC-001-SDN").unwrap().severity,
        RiskLevel::Critical
    );
}

#[test]
fn framework_setup_is_idempotent() {
    let reg = registry();
    let first = reg.setup_framework_rules(Framework::Bsa).unwrap();
    let second = reg.setup_framework_rules(Framework::Bsa).unwrap();

    assert_eq!(first, second);
    assert_eq!(reg.rules_for_framework(Framework::Bsa).len(), 3);
    assert_eq!(reg.len(), 3, "re-installing must not duplicate rules");
}

#[test]
fn reinstall_restores_deactivated_rule() {
    let reg = registry();
    reg.setup_framework_rules(Framework::Bsa).unwrap();
    reg.set_active("BSA-001-CTR", false).unwrap();
    assert!(!reg.rule("BSA-001-CTR").unwrap().active);

    reg.setup_framework_rules(Framework::Bsa).unwrap();
    assert!(reg.rule("BSA-001-CTR").unwrap().active);
}

#[test]
fn framework_names_parse() {
    let reg = registry();
    let (framework, ids) = reg.setup_framework_rules_named("ofac").unwrap();
    assert_eq!(framework, Framework::Ofac);
    assert_eq!(ids, vec!["OFAC-001-SDN".to_string()]);

    let (framework, _) = reg.setup_framework_rules_named("EU_AMLD").unwrap();
    assert_eq!(framework, Framework::Amld);
}

#[test]
fn unknown_framework_is_config_error() {
    let reg = registry();
    let err = reg.setup_framework_rules_named("MADE_UP").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config, "got {err}");
    assert!(reg.is_empty());
}

#[test]
fn invalid_config_fails_setup_and_leaves_rules_untouched() {
    let mut config = AmlConfig::default_test();
    config.thresholds.structuring_floor_bps = 10_000;
    let reg = RuleRegistry::new(config);

    let err = reg.setup_framework_rules(Framework::Bsa).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    match err {
        AmlError::FrameworkSetup { framework, .. } => assert_eq!(framework, Framework::Bsa),
        other => panic!("expected FrameworkSetup, got {other}"),
    }
    assert!(reg.rules_for_framework(Framework::Bsa).is_empty());
}

#[test]
fn setup_all_stops_at_first_failing_framework() {
    let mut config = AmlConfig::default_test();
    config.jurisdictions.fatf_high_risk.clear();
    let reg = RuleRegistry::new(config);

    let err = reg.setup_all_standard_rules().unwrap_err();
    match err {
        AmlError::FrameworkSetup { framework, .. } => assert_eq!(framework, Framework::Fatf),
        other => panic!("expected FATF to fail, got {other}"),
    }
    assert_eq!(reg.rules_for_framework(Framework::Bsa).len(), 3, "BSA stays installed");
    assert!(reg.rules_for_framework(Framework::Ofac).is_empty(), "OFAC never ran");
}

#[test]
fn install_callback_sees_each_framework_and_can_stop_the_run() {
    let reg = registry();
    let mut seen = Vec::new();
    let err = reg
        .setup_all_standard_rules_with(|framework, ids| {
            seen.push((framework, ids.len()));
            if framework == Framework::Amld {
                return Err(AmlError::Validation("journal unavailable".into()));
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, AmlError::Validation(_)), "{err}");
    assert_eq!(
        seen,
        vec![(Framework::Bsa, 3), (Framework::Fatf, 1), (Framework::Amld, 2)]
    );
    assert_eq!(reg.rules_for_framework(Framework::Amld).len(), 2, "installed before the callback");
    assert!(reg.rules_for_framework(Framework::Fincen).is_empty());
}

#[test]
fn active_rules_filter_by_currency_and_jurisdiction() {
    let reg = registry();
    reg.setup_all_standard_rules().unwrap();

    let us = customer("US");
    let usd: Vec<String> = reg
        .active_rules_for(Currency::USD, Some(&us))
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(usd.contains(&"BSA-001-CTR".to_string()));
    assert!(!usd.iter().any(|id| id.starts_with("AMLD")));
    let mut sorted = usd.clone();
    sorted.sort();
    assert_eq!(usd, sorted, "rules come back in ascending id order");

    let de = customer("DE");
    let eur: Vec<String> = reg
        .active_rules_for(Currency::EUR, Some(&de))
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(eur.contains(&"AMLD-001-THR".to_string()));
    assert!(!eur.contains(&"BSA-001-CTR".to_string()));

    let unresolved: Vec<String> = reg
        .active_rules_for(Currency::EUR, None)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(
        !unresolved.contains(&"AMLD-001-THR".to_string()),
        "jurisdiction-scoped rules need a customer"
    );
}

#[test]
fn deactivated_rules_are_not_active() {
    let reg = registry();
    reg.setup_framework_rules(Framework::Common).unwrap();
    reg.set_active("COMMON-001-ROUND", false).unwrap();

    let active = reg.active_rules_for(Currency::USD, None);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].rule_type(), RuleType::UnusualTiming);

    let err = reg.set_active("NOPE-001", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn custom_rules_are_validated_and_unique() {
    let reg = registry();
    let rule = Rule::new(
        "CUSTOM-001",
        "Large wires",
        Framework::Common,
        RiskLevel::Medium,
        RuleCheck::Threshold { threshold: 25_000 },
    );
    reg.register_rule(rule.clone()).unwrap();

    let err = reg.register_rule(rule).unwrap_err();
    assert!(matches!(err, AmlError::DuplicateRule(ref id) if id == "CUSTOM-001"));

    let bad = Rule::new(
        "CUSTOM-002",
        "Zero threshold",
        Framework::Common,
        RiskLevel::Low,
        RuleCheck::Threshold { threshold: 0 },
    );
    assert_eq!(reg.register_rule(bad).unwrap_err().kind(), ErrorKind::Config);
    assert_eq!(reg.rules_of_type(RuleType::Threshold).len(), 1);
}

#[test]
fn thresholds_come_from_config() {
    let mut config = AmlConfig::default_test();
    config.thresholds.ctr_usd = 3_000;
    let reg = RuleRegistry::new(config);
    reg.setup_framework_rules(Framework::Bsa).unwrap();

    let ctr = reg.rule("BSA-001-CTR").unwrap();
    assert_eq!(ctr.check, RuleCheck::Threshold { threshold: 3_000 });
}
