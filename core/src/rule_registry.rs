//! Rule registry: the active AML rule set, per regulatory framework.
//!
//! Each framework has a canonical rule set built from `AmlConfig`.
//! Installing a framework replaces every rule of that framework, so
//! repeated setup never duplicates. Reads vastly outnumber writes:
//! monitoring takes the read lock, setup and activation take the write lock.

use crate::{
    config::AmlConfig,
    error::{AmlError, AmlResult},
    risk_model::{Currency, Customer, Framework, RiskLevel, RuleType},
    types::RuleId,
};
use chrono::Weekday;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Rule definitions ─────────────────────────────────────────────────────────

/// The predicate a rule evaluates, with its parameters.
///
/// Amount parameters are whole major units of the transaction currency;
/// the monitor converts them to minor units before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Cash movement at or above `threshold`.
    Threshold { threshold: u64 },
    /// Cash movement in `[threshold * floor_bps / 10_000, threshold)`.
    Structuring { threshold: u64, floor_bps: u32 },
    /// Whole-unit gross amount, a multiple of `unit`, at least `minimum`.
    RoundAmount { unit: u64, minimum: u64 },
    /// Customer domiciled in one of `jurisdictions`.
    GeographicRisk { jurisdictions: BTreeSet<String> },
    /// Customer flagged or listed as sanctioned.
    SanctionsMatch,
    /// PEP customer moving more than `threshold`.
    PepActivity { threshold: u64 },
    /// Posted on one of `weekdays` or inside the off-hours window.
    UnusualTiming {
        weekdays: Vec<Weekday>,
        off_hours_start: u32,
        off_hours_end: u32,
        minimum: u64,
    },
    /// More than `max_count` cash transactions of at least `min_amount`
    /// in the trailing `lookback_days`.
    CashIntensive {
        max_count: u32,
        lookback_days: u32,
        min_amount: u64,
    },
    /// More than `threshold` moved in the trailing `lookback_days`.
    Velocity { threshold: u64, lookback_days: u32 },
}

impl RuleCheck {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Threshold { .. } => RuleType::Threshold,
            Self::Structuring { .. } => RuleType::Structuring,
            Self::RoundAmount { .. } => RuleType::RoundAmount,
            Self::GeographicRisk { .. } => RuleType::GeographicRisk,
            Self::SanctionsMatch => RuleType::SanctionsMatch,
            Self::PepActivity { .. } => RuleType::PepActivity,
            Self::UnusualTiming { .. } => RuleType::UnusualTiming,
            Self::CashIntensive { .. } => RuleType::CashIntensive,
            Self::Velocity { .. } => RuleType::Velocity,
        }
    }

    /// Whether the check cannot be evaluated without a resolved customer.
    /// Sanctions can still match the counterparty reference against the list.
    pub fn needs_customer(&self) -> bool {
        matches!(
            self,
            Self::GeographicRisk { .. }
                | Self::PepActivity { .. }
                | Self::CashIntensive { .. }
                | Self::Velocity { .. }
        )
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Threshold { threshold } | Self::PepActivity { threshold } => {
                if *threshold == 0 {
                    return Err("threshold must be positive".into());
                }
            }
            Self::Structuring { threshold, floor_bps } => {
                if *threshold == 0 {
                    return Err("structuring threshold must be positive".into());
                }
                if *floor_bps == 0 || *floor_bps >= 10_000 {
                    return Err(format!("structuring floor {floor_bps} bps outside 1..10000"));
                }
            }
            Self::RoundAmount { unit, .. } => {
                if *unit == 0 {
                    return Err("round unit must be positive".into());
                }
            }
            Self::GeographicRisk { jurisdictions } => {
                if jurisdictions.is_empty() {
                    return Err("geographic rule needs at least one jurisdiction".into());
                }
                validate_country_codes(jurisdictions)?;
            }
            Self::SanctionsMatch => {}
            Self::UnusualTiming {
                weekdays,
                off_hours_start,
                off_hours_end,
                ..
            } => {
                if *off_hours_start >= 24 || *off_hours_end >= 24 {
                    return Err("off-hours window must use hours 0..24".into());
                }
                if weekdays.is_empty() && off_hours_start == off_hours_end {
                    return Err("timing rule has neither weekdays nor an off-hours window".into());
                }
            }
            Self::CashIntensive { lookback_days, .. } => {
                validate_lookback(*lookback_days)?;
            }
            Self::Velocity {
                threshold,
                lookback_days,
            } => {
                if *threshold == 0 {
                    return Err("velocity needs a positive threshold".into());
                }
                validate_lookback(*lookback_days)?;
            }
        }
        Ok(())
    }
}

/// Longest lookback a windowed rule may use.
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

fn validate_lookback(days: u32) -> Result<(), String> {
    if days == 0 || days > MAX_LOOKBACK_DAYS {
        return Err(format!(
            "lookback must be 1..={MAX_LOOKBACK_DAYS} days, got {days}"
        ));
    }
    Ok(())
}

fn validate_country_codes(codes: &BTreeSet<String>) -> Result<(), String> {
    match codes
        .iter()
        .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_uppercase()))
    {
        Some(bad) => Err(format!("'{bad}' is not an ISO-3166 alpha-2 code")),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub framework: Framework,
    pub check: RuleCheck,
    pub severity: RiskLevel,
    /// Currencies the rule supports. Empty means any.
    pub currencies: BTreeSet<Currency>,
    /// Customer countries the rule applies to. Empty means any.
    pub jurisdictions: BTreeSet<String>,
    pub active: bool,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        framework: Framework,
        severity: RiskLevel,
        check: RuleCheck,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            framework,
            check,
            severity,
            currencies: BTreeSet::new(),
            jurisdictions: BTreeSet::new(),
            active: true,
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currencies.insert(currency);
        self
    }

    pub fn with_jurisdictions<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jurisdictions
            .extend(codes.into_iter().map(|c| c.into().to_ascii_uppercase()));
        self
    }

    pub fn rule_type(&self) -> RuleType {
        self.check.rule_type()
    }

    /// Currency support and jurisdiction applicability. A rule scoped to
    /// jurisdictions never applies when the customer is unresolved.
    pub fn applies_to(&self, currency: Currency, customer: Option<&Customer>) -> bool {
        if !self.currencies.is_empty() && !self.currencies.contains(&currency) {
            return false;
        }
        if self.jurisdictions.is_empty() {
            return true;
        }
        customer.is_some_and(|c| self.jurisdictions.contains(&c.country))
    }

    pub fn validate(&self) -> AmlResult<()> {
        if self.id.trim().is_empty() {
            return Err(AmlError::Config("rule id must not be empty".into()));
        }
        self.check
            .validate()
            .and_then(|_| validate_country_codes(&self.jurisdictions))
            .map_err(|reason| AmlError::Config(format!("rule {}: {reason}", self.id)))
    }
}

// ── Canonical rule sets ──────────────────────────────────────────────────────

/// Build the canonical rule set of one framework from configuration.
pub fn standard_rules(framework: Framework, config: &AmlConfig) -> Vec<Rule> {
    let t = &config.thresholds;
    let p = &config.patterns;
    let eu = config.jurisdictions.eu_eea.iter().cloned();

    match framework {
        Framework::Bsa => vec![
            Rule::new(
                "BSA-001-CTR",
                "Currency transaction report threshold",
                framework,
                RiskLevel::Medium,
                RuleCheck::Threshold { threshold: t.ctr_usd },
            )
            .with_currency(Currency::USD),
            Rule::new(
                "BSA-002-STRUCT",
                "Structuring below the CTR threshold",
                framework,
                RiskLevel::High,
                RuleCheck::Structuring {
                    threshold: t.ctr_usd,
                    floor_bps: t.structuring_floor_bps,
                },
            )
            .with_currency(Currency::USD),
            Rule::new(
                "BSA-003-CASH",
                "Cash-intensive activity",
                framework,
                RiskLevel::Medium,
                RuleCheck::CashIntensive {
                    max_count: p.cash_intensive_max_count,
                    lookback_days: p.cash_intensive_lookback_days,
                    min_amount: p.cash_intensive_min_amount,
                },
            )
            .with_currency(Currency::USD),
        ],
        Framework::Fatf => vec![Rule::new(
            "FATF-001-GEO",
            "High-risk jurisdiction",
            framework,
            RiskLevel::High,
            RuleCheck::GeographicRisk {
                jurisdictions: config.jurisdictions.fatf_high_risk.iter().cloned().collect(),
            },
        )],
        Framework::Amld => vec![
            Rule::new(
                "AMLD-001-THR",
                "EU cash threshold",
                framework,
                RiskLevel::Medium,
                RuleCheck::Threshold { threshold: t.ctr_eur },
            )
            .with_currency(Currency::EUR)
            .with_jurisdictions(eu.clone()),
            Rule::new(
                "AMLD-002-PEP",
                "EU politically exposed person activity",
                framework,
                RiskLevel::High,
                RuleCheck::PepActivity { threshold: t.pep_eur },
            )
            .with_currency(Currency::EUR)
            .with_jurisdictions(eu),
        ],
        Framework::Fincen => vec![
            Rule::new(
                "FINCEN-001-VEL",
                "Aggregate velocity",
                framework,
                RiskLevel::Medium,
                RuleCheck::Velocity {
                    threshold: p.velocity_usd,
                    lookback_days: p.velocity_lookback_days,
                },
            )
            .with_currency(Currency::USD),
            Rule::new(
                "FINCEN-002-PEP",
                "Politically exposed person activity",
                framework,
                RiskLevel::High,
                RuleCheck::PepActivity { threshold: t.pep_usd },
            )
            .with_currency(Currency::USD),
        ],
        Framework::Ofac => vec![Rule::new(
            "OFAC-001-SDN",
            "Sanctions list match",
            framework,
            RiskLevel::Critical,
            RuleCheck::SanctionsMatch,
        )],
        Framework::Common => vec![
            Rule::new(
                "COMMON-001-ROUND",
                "Round-amount transaction",
                framework,
                RiskLevel::Low,
                RuleCheck::RoundAmount {
                    unit: t.round_unit,
                    minimum: t.round_minimum,
                },
            ),
            Rule::new(
                "COMMON-002-TIMING",
                "Activity outside business hours",
                framework,
                RiskLevel::Low,
                RuleCheck::UnusualTiming {
                    weekdays: config.timing.weekdays.clone(),
                    off_hours_start: config.timing.off_hours_start,
                    off_hours_end: config.timing.off_hours_end,
                    minimum: t.timing_minimum,
                },
            ),
        ],
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub struct RuleRegistry {
    config: AmlConfig,
    rules: RwLock<BTreeMap<RuleId, Rule>>,
}

impl RuleRegistry {
    pub fn new(config: AmlConfig) -> Self {
        Self {
            config,
            rules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Install the canonical rules of `framework`, replacing whatever that
    /// framework had installed. On a validation failure nothing changes.
    pub fn setup_framework_rules(&self, framework: Framework) -> AmlResult<Vec<RuleId>> {
        let rules = standard_rules(framework, &self.config);
        for rule in &rules {
            rule.validate().map_err(|e| AmlError::FrameworkSetup {
                framework,
                reason: e.to_string(),
            })?;
        }

        let ids: Vec<RuleId> = rules.iter().map(|r| r.id.clone()).collect();
        let mut installed = self.rules.write();
        let clash = ids
            .iter()
            .find(|id| installed.get(*id).is_some_and(|r| r.framework != framework));
        if let Some(clash) = clash {
            return Err(AmlError::FrameworkSetup {
                framework,
                reason: format!("rule id {clash} is owned by another framework"),
            });
        }
        installed.retain(|_, r| r.framework != framework);
        installed.extend(rules.into_iter().map(|r| (r.id.clone(), r)));
        drop(installed);

        log::info!("framework={framework} installed {} rules", ids.len());
        Ok(ids)
    }

    /// Parse a framework name, then install it. Unknown names are a
    /// configuration error.
    pub fn setup_framework_rules_named(&self, name: &str) -> AmlResult<(Framework, Vec<RuleId>)> {
        let framework: Framework = name.parse()?;
        let ids = self.setup_framework_rules(framework)?;
        Ok((framework, ids))
    }

    /// Install every framework in order. Stops at the first failure and
    /// names the failing framework; earlier frameworks stay installed.
    pub fn setup_all_standard_rules(&self) -> AmlResult<Vec<(Framework, Vec<RuleId>)>> {
        self.setup_all_standard_rules_with(|_, _| Ok(()))
    }

    /// As [`setup_all_standard_rules`](Self::setup_all_standard_rules),
    /// calling `on_installed` after each framework. Its error stops the run.
    pub fn setup_all_standard_rules_with<F>(
        &self,
        mut on_installed: F,
    ) -> AmlResult<Vec<(Framework, Vec<RuleId>)>>
    where
        F: FnMut(Framework, &[RuleId]) -> AmlResult<()>,
    {
        let mut installed = Vec::with_capacity(Framework::ALL.len());
        for framework in Framework::ALL {
            let ids = self
                .setup_framework_rules(framework)
                .and_then(|ids| on_installed(framework, &ids).map(|_| ids))
                .map_err(|e| {
                    log::warn!("framework={framework} setup aborted: {e}");
                    e
                })?;
            installed.push((framework, ids));
        }
        Ok(installed)
    }

    /// Add a single custom rule.
    pub fn register_rule(&self, rule: Rule) -> AmlResult<()> {
        rule.validate()?;
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(AmlError::DuplicateRule(rule.id));
        }
        log::debug!("rule={} registered ({})", rule.id, rule.rule_type());
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// The only mutation an installed rule allows.
    pub fn set_active(&self, rule_id: &str, active: bool) -> AmlResult<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| AmlError::RuleNotFound(rule_id.to_string()))?;
        rule.active = active;
        Ok(())
    }

    /// Active rules applicable to a transaction currency and customer,
    /// in ascending rule-id order.
    pub fn active_rules_for(&self, currency: Currency, customer: Option<&Customer>) -> Vec<Rule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.active && r.applies_to(currency, customer))
            .cloned()
            .collect()
    }

    pub fn rule(&self, rule_id: &str) -> Option<Rule> {
        self.rules.read().get(rule_id).cloned()
    }

    pub fn rules_for_framework(&self, framework: Framework) -> Vec<Rule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.framework == framework)
            .cloned()
            .collect()
    }

    pub fn rules_of_type(&self, rule_type: RuleType) -> Vec<Rule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.rule_type() == rule_type)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Rule> {
        self.rules.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}
