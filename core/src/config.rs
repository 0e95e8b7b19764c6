use chrono::{Duration, Weekday};
use serde::{Deserialize, Serialize};

use crate::risk_model::RiskLevel;

/// Reporting thresholds, all in whole major units of the rule currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub ctr_usd: u64,
    pub ctr_eur: u64,
    /// Lower edge of the structuring band, in basis points of the CTR threshold.
    pub structuring_floor_bps: u32,
    pub pep_usd: u64,
    pub pep_eur: u64,
    pub round_unit: u64,
    pub round_minimum: u64,
    pub timing_minimum: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ctr_usd: 10_000,
            ctr_eur: 10_000,
            structuring_floor_bps: 9_500,
            pep_usd: 5_000,
            pep_eur: 5_000,
            round_unit: 1_000,
            round_minimum: 10_000,
            timing_minimum: 3_000,
        }
    }
}

/// Windowed, history-dependent rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub cash_intensive_max_count: u32,
    pub cash_intensive_lookback_days: u32,
    /// Cash movements below this (major units) do not count toward the total.
    pub cash_intensive_min_amount: u64,
    pub velocity_usd: u64,
    pub velocity_lookback_days: u32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cash_intensive_max_count: 5,
            cash_intensive_lookback_days: 7,
            cash_intensive_min_amount: 1_000,
            velocity_usd: 50_000,
            velocity_lookback_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub weekdays: Vec<Weekday>,
    /// Off-hours window in UTC hours. Wraps midnight when start > end.
    pub off_hours_start: u32,
    pub off_hours_end: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            weekdays: vec![Weekday::Sat, Weekday::Sun],
            off_hours_start: 22,
            off_hours_end: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JurisdictionConfig {
    /// FATF call-for-action and increased-monitoring lists.
    pub fatf_high_risk: Vec<String>,
    /// Countries whose customers fall under EU AMLD rules.
    pub eu_eea: Vec<String>,
}

impl Default for JurisdictionConfig {
    fn default() -> Self {
        let codes = |list: &[&str]| list.iter().map(|c| c.to_string()).collect();
        Self {
            fatf_high_risk: codes(&[
                "KP", "IR", "MM", "SY", "YE", "SS", "HT", "VE", "NG", "ML", "BF", "MZ", "CD",
                "VN", "KE", "LB", "MC", "BG",
            ]),
            eu_eea: codes(&[
                "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU",
                "IE", "IT", "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES",
                "SE", "IS", "LI", "NO",
            ]),
        }
    }
}

/// Periodic KYC review intervals by customer risk tier, in days.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KycConfig {
    pub critical_days: i64,
    pub high_days: i64,
    pub medium_days: i64,
    pub low_days: i64,
}

impl Default for KycConfig {
    fn default() -> Self {
        Self {
            critical_days: 90,
            high_days: 180,
            medium_days: 365,
            low_days: 730,
        }
    }
}

impl KycConfig {
    pub fn interval_for(&self, level: RiskLevel) -> Duration {
        let days = match level {
            RiskLevel::Critical => self.critical_days,
            RiskLevel::High => self.high_days,
            RiskLevel::Medium => self.medium_days,
            RiskLevel::Low => self.low_days,
        };
        Duration::days(days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub resolution_target_hours: f64,
    pub top_customers: usize,
    /// False-positive rate above which rule tuning is recommended.
    pub false_positive_tolerance: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            resolution_target_hours: 72.0,
            top_customers: 10,
            false_positive_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AmlConfig {
    /// Ledger accounts whose id starts with one of these are cash accounts.
    pub cash_account_prefixes: Vec<String>,
    pub thresholds: ThresholdConfig,
    pub patterns: PatternConfig,
    pub timing: TimingConfig,
    pub jurisdictions: JurisdictionConfig,
    pub kyc: KycConfig,
    pub dashboard: DashboardConfig,
}

impl AmlConfig {
    /// Load from the data/ directory.
    /// In tests, use AmlConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/aml/aml_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config: AmlConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.normalize();
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        let mut config = Self::default();
        config.normalize();
        config
    }

    pub fn is_cash_account(&self, account_id: &str) -> bool {
        let account = account_id.to_ascii_lowercase();
        self.cash_account_prefixes
            .iter()
            .any(|prefix| account.starts_with(prefix.as_str()))
    }

    fn normalize(&mut self) {
        if self.cash_account_prefixes.is_empty() {
            self.cash_account_prefixes = vec!["cash".into()];
        }
        for prefix in &mut self.cash_account_prefixes {
            *prefix = prefix.to_ascii_lowercase();
        }
        for code in self
            .jurisdictions
            .fatf_high_risk
            .iter_mut()
            .chain(self.jurisdictions.eu_eea.iter_mut())
        {
            *code = code.to_ascii_uppercase();
        }
    }
}
