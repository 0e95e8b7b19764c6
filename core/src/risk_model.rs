//! Risk model: value types shared by every component.
//!
//! Nothing in here talks to a store or a lock. Amounts are integer
//! minor units so threshold comparisons are exact.

use crate::{
    error::{AmlError, AmlResult},
    types::{CustomerId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Enumerations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = AmlError;

    fn from_str(s: &str) -> AmlResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(AmlError::Validation(format!("unknown risk level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    Individual,
    Business,
    Pep,
}

/// Regulatory framework a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Bsa,
    Fatf,
    Amld,
    Fincen,
    Ofac,
    Common,
}

impl Framework {
    /// Installation order used by `setup_all_standard_rules`.
    pub const ALL: [Framework; 6] = [
        Self::Bsa,
        Self::Fatf,
        Self::Amld,
        Self::Fincen,
        Self::Ofac,
        Self::Common,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bsa => "BSA",
            Self::Fatf => "FATF",
            Self::Amld => "AMLD",
            Self::Fincen => "FINCEN",
            Self::Ofac => "OFAC",
            Self::Common => "COMMON",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = AmlError;

    fn from_str(s: &str) -> AmlResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BSA" => Ok(Self::Bsa),
            "FATF" => Ok(Self::Fatf),
            "AMLD" | "EU_AMLD" | "EU-AMLD" => Ok(Self::Amld),
            "FINCEN" => Ok(Self::Fincen),
            "OFAC" => Ok(Self::Ofac),
            "COMMON" => Ok(Self::Common),
            other => Err(AmlError::Config(format!("unrecognized framework '{other}'"))),
        }
    }
}

/// The predicate family a rule evaluates. The parameters live on
/// `rule_registry::RuleCheck`; this is the payload-free tag used for
/// filtering and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Threshold,
    Structuring,
    RoundAmount,
    GeographicRisk,
    SanctionsMatch,
    PepActivity,
    UnusualTiming,
    CashIntensive,
    Velocity,
}

impl RuleType {
    pub const ALL: [RuleType; 9] = [
        Self::Threshold,
        Self::Structuring,
        Self::RoundAmount,
        Self::GeographicRisk,
        Self::SanctionsMatch,
        Self::PepActivity,
        Self::UnusualTiming,
        Self::CashIntensive,
        Self::Velocity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Structuring => "structuring",
            Self::RoundAmount => "round_amount",
            Self::GeographicRisk => "geographic_risk",
            Self::SanctionsMatch => "sanctions_match",
            Self::PepActivity => "pep_activity",
            Self::UnusualTiming => "unusual_timing",
            Self::CashIntensive => "cash_intensive",
            Self::Velocity => "velocity",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    UnderReview,
    Escalated,
    Closed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Escalated => "ESCALATED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Investigations move in lockstep with their alert.
pub type InvestigationStatus = AlertStatus;

/// How an alert was disposed of when it was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    FalsePositive,
    NoAction,
    SarFiled,
}

// ── Money ────────────────────────────────────────────────────────────────────

/// ISO-4217 codes the engine accepts.
const RECOGNISED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "CNY", "HKD", "SGD", "SEK", "NOK",
    "DKK", "PLN", "CZK", "HUF", "MXN", "BRL", "INR", "ZAR", "AED", "SAR", "KRW", "TRY", "ILS",
    "BHD", "KWD", "OMR", "JOD", "TND",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    pub fn parse(code: &str) -> AmlResult<Self> {
        let upper = code.trim().to_ascii_uppercase();
        if !RECOGNISED_CURRENCIES.contains(&upper.as_str()) {
            return Err(AmlError::Validation(format!("unrecognized currency '{code}'")));
        }
        let bytes = upper.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of minor-unit digits (cents = 2).
    pub fn minor_digits(&self) -> u32 {
        match self.as_str() {
            "JPY" | "KRW" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        }
    }

    pub fn minor_per_major(&self) -> u64 {
        10u64.pow(self.minor_digits())
    }

    /// Convert a whole major-unit value into minor units.
    pub fn to_minor(&self, major: u64) -> Option<u64> {
        major.checked_mul(self.minor_per_major())
    }
}

impl TryFrom<String> for Currency {
    type Error = AmlError;

    fn try_from(value: String) -> AmlResult<Self> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> String {
        c.as_str().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub minor: u64,
    pub currency: Currency,
}

impl Amount {
    pub fn new(minor: u64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Whole major units, e.g. `Amount::major(10_000, USD)` is $10,000.00.
    pub fn major(major: u64, currency: Currency) -> Option<Self> {
        currency.to_minor(major).map(|minor| Self { minor, currency })
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.currency.minor_digits();
        if digits == 0 {
            return write!(f, "{} {}", self.minor, self.currency);
        }
        let per = self.currency.minor_per_major();
        write!(
            f,
            "{}.{:0width$} {}",
            self.minor / per,
            self.minor % per,
            self.currency,
            width = digits as usize
        )
    }
}

// ── Ledger input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub account_id: String,
    pub direction: Direction,
    pub amount: Amount,
}

impl Entry {
    pub fn debit(account_id: impl Into<String>, amount: Amount) -> Self {
        Self {
            account_id: account_id.into(),
            direction: Direction::Debit,
            amount,
        }
    }

    pub fn credit(account_id: impl Into<String>, amount: Amount) -> Self {
        Self {
            account_id: account_id.into(),
            direction: Direction::Credit,
            amount,
        }
    }
}

/// A posted ledger transaction as delivered by the ledger engine.
///
/// `source_reference` is the counterparty reference the monitor resolves
/// to a customer through a `CustomerLookup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub description: String,
    pub source_reference: String,
    pub posted_at: Timestamp,
    pub entries: Vec<Entry>,
}

// ── Customer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFlags {
    pub is_pep: bool,
    pub is_high_risk: bool,
    pub sanctions_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub customer_type: CustomerType,
    /// ISO-3166 alpha-2.
    pub country: String,
    pub risk_level: RiskLevel,
    pub flags: CustomerFlags,
    pub onboarded_at: Timestamp,
    pub expected_activity: String,
    pub business_purpose: String,
    pub last_kyc_at: Option<Timestamp>,
    pub active: bool,
}

impl Customer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        customer_type: CustomerType,
        country: impl Into<String>,
        risk_level: RiskLevel,
        onboarded_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            customer_type,
            country: country.into().to_ascii_uppercase(),
            risk_level,
            flags: CustomerFlags {
                is_pep: customer_type == CustomerType::Pep,
                ..CustomerFlags::default()
            },
            onboarded_at,
            expected_activity: String::new(),
            business_purpose: String::new(),
            last_kyc_at: None,
            active: true,
        }
    }

    pub fn with_flags(mut self, flags: CustomerFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_activity(
        mut self,
        expected_activity: impl Into<String>,
        business_purpose: impl Into<String>,
    ) -> Self {
        self.expected_activity = expected_activity.into();
        self.business_purpose = business_purpose.into();
        self
    }

    pub fn with_last_kyc(mut self, at: Timestamp) -> Self {
        self.last_kyc_at = Some(at);
        self
    }

    pub fn is_pep(&self) -> bool {
        self.flags.is_pep || self.customer_type == CustomerType::Pep
    }

    /// The floor a customer imposes on the risk level of any alert raised
    /// against them. `None` means the rule severity stands as configured.
    ///
    /// Customer context escalates to HIGH at most; CRITICAL is reserved for
    /// rules configured as critical (sanctions).
    pub fn alert_risk_floor(&self) -> Option<RiskLevel> {
        let elevated = self.risk_level >= RiskLevel::High
            || self.is_pep()
            || self.flags.is_high_risk
            || self.flags.sanctions_match;
        elevated.then_some(RiskLevel::High)
    }

    /// The clock for periodic review starts at onboarding.
    pub fn kyc_reference_time(&self) -> Timestamp {
        self.last_kyc_at.unwrap_or(self.onboarded_at)
    }
}
