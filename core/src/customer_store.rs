//! Customer profile store: risk and KYC attributes keyed by customer id.
//!
//! Profiles are never deleted. Every mutation appends a profile audit
//! note carrying the prior value, so a reviewer can reconstruct what the
//! profile looked like when an alert was raised.

use crate::{
    error::{AmlError, AmlResult},
    risk_model::{Customer, RiskLevel},
    types::{CustomerId, Timestamp},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolves a transaction's counterparty reference to a customer.
/// Supplied by the ledger side; the profile store is one implementation.
pub trait CustomerLookup {
    fn lookup(&self, counterparty_ref: &str) -> Option<Customer>;
}

impl<F> CustomerLookup for F
where
    F: Fn(&str) -> Option<Customer>,
{
    fn lookup(&self, counterparty_ref: &str) -> Option<Customer> {
        self(counterparty_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAuditNote {
    pub at: Timestamp,
    pub actor: String,
    pub field: String,
    pub prior: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycReview {
    pub customer_id: CustomerId,
    pub officer: String,
    pub performed_at: Timestamp,
    pub prior_level: RiskLevel,
    pub new_level: RiskLevel,
}

#[derive(Debug, Clone)]
struct ProfileRecord {
    customer: Customer,
    audit: Vec<ProfileAuditNote>,
    kyc_reviews: Vec<KycReview>,
}

impl ProfileRecord {
    fn note(&mut self, at: Timestamp, actor: &str, field: &str, prior: String, new: String) {
        self.audit.push(ProfileAuditNote {
            at,
            actor: actor.to_string(),
            field: field.to_string(),
            prior,
            new,
        });
    }
}

#[derive(Default)]
pub struct CustomerProfileStore {
    profiles: RwLock<BTreeMap<CustomerId, ProfileRecord>>,
}

impl CustomerProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, customer: Customer) -> AmlResult<()> {
        if customer.id.trim().is_empty() {
            return Err(AmlError::Validation("customer id must not be empty".into()));
        }
        if customer.country.len() != 2 || !customer.country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(AmlError::Validation(format!(
                "customer {}: '{}' is not an ISO-3166 alpha-2 country",
                customer.id, customer.country
            )));
        }

        let mut profiles = self.profiles.write();
        if profiles.contains_key(&customer.id) {
            return Err(AmlError::DuplicateCustomer(customer.id));
        }
        log::info!(
            "customer={} registered ({:?}, {}, risk {})",
            customer.id,
            customer.customer_type,
            customer.country,
            customer.risk_level
        );
        profiles.insert(
            customer.id.clone(),
            ProfileRecord {
                customer,
                audit: Vec::new(),
                kyc_reviews: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, customer_id: &str) -> Option<Customer> {
        self.profiles.read().get(customer_id).map(|p| p.customer.clone())
    }

    pub fn contains(&self, customer_id: &str) -> bool {
        self.profiles.read().contains_key(customer_id)
    }

    /// Re-assess the risk level. Returns the prior level.
    pub fn update_risk_level(
        &self,
        customer_id: &str,
        level: RiskLevel,
        actor: &str,
        at: Timestamp,
    ) -> AmlResult<RiskLevel> {
        self.with_profile(customer_id, |profile| {
            let prior = profile.customer.risk_level;
            profile.customer.risk_level = level;
            profile.note(at, actor, "risk_level", prior.to_string(), level.to_string());
            prior
        })
    }

    /// Flag a sanctions hit. The customer is raised to CRITICAL risk.
    pub fn record_sanctions_match(
        &self,
        customer_id: &str,
        source: &str,
        actor: &str,
        at: Timestamp,
    ) -> AmlResult<()> {
        self.with_profile(customer_id, |profile| {
            let prior_flag = profile.customer.flags.sanctions_match;
            profile.customer.flags.sanctions_match = true;
            profile.customer.flags.is_high_risk = true;
            profile.note(
                at,
                actor,
                "sanctions_match",
                prior_flag.to_string(),
                format!("true ({source})"),
            );

            let prior_level = profile.customer.risk_level;
            if prior_level != RiskLevel::Critical {
                profile.customer.risk_level = RiskLevel::Critical;
                profile.note(
                    at,
                    actor,
                    "risk_level",
                    prior_level.to_string(),
                    RiskLevel::Critical.to_string(),
                );
            }
        })?;
        log::warn!("customer={customer_id} sanctions match recorded ({source})");
        Ok(())
    }

    pub fn deactivate(&self, customer_id: &str, actor: &str, at: Timestamp) -> AmlResult<()> {
        self.with_profile(customer_id, |profile| {
            if profile.customer.active {
                profile.customer.active = false;
                profile.note(at, actor, "active", "true".into(), "false".into());
            }
        })
    }

    /// Record a completed KYC review and restart the review clock.
    /// `new_level` of `None` confirms the current level.
    pub fn record_kyc(
        &self,
        customer_id: &str,
        officer: &str,
        new_level: Option<RiskLevel>,
        at: Timestamp,
    ) -> AmlResult<KycReview> {
        self.with_profile(customer_id, |profile| {
            let prior_level = profile.customer.risk_level;
            let new_level = new_level.unwrap_or(prior_level);
            let prior_kyc = profile
                .customer
                .last_kyc_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".into());

            profile.customer.last_kyc_at = Some(at);
            profile.note(at, officer, "last_kyc_at", prior_kyc, at.to_rfc3339());
            if new_level != prior_level {
                profile.customer.risk_level = new_level;
                profile.note(
                    at,
                    officer,
                    "risk_level",
                    prior_level.to_string(),
                    new_level.to_string(),
                );
            }

            let review = KycReview {
                customer_id: profile.customer.id.clone(),
                officer: officer.to_string(),
                performed_at: at,
                prior_level,
                new_level,
            };
            profile.kyc_reviews.push(review.clone());
            review
        })
    }

    pub fn audit_notes(&self, customer_id: &str) -> AmlResult<Vec<ProfileAuditNote>> {
        self.profiles
            .read()
            .get(customer_id)
            .map(|p| p.audit.clone())
            .ok_or_else(|| AmlError::UnknownCustomer(customer_id.to_string()))
    }

    pub fn kyc_reviews(&self, customer_id: &str) -> AmlResult<Vec<KycReview>> {
        self.profiles
            .read()
            .get(customer_id)
            .map(|p| p.kyc_reviews.clone())
            .ok_or_else(|| AmlError::UnknownCustomer(customer_id.to_string()))
    }

    /// Every profile, active or not, in id order.
    pub fn all(&self) -> Vec<Customer> {
        self.profiles
            .read()
            .values()
            .map(|p| p.customer.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    fn with_profile<T>(
        &self,
        customer_id: &str,
        f: impl FnOnce(&mut ProfileRecord) -> T,
    ) -> AmlResult<T> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(customer_id)
            .ok_or_else(|| AmlError::UnknownCustomer(customer_id.to_string()))?;
        Ok(f(profile))
    }
}

impl CustomerLookup for CustomerProfileStore {
    fn lookup(&self, counterparty_ref: &str) -> Option<Customer> {
        self.get(counterparty_ref)
    }
}
