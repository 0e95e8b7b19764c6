//! KYC scheduler: periodic customer due-diligence reviews.
//!
//! A customer is due for review when the time since their last KYC (or
//! onboarding, if never reviewed) strictly exceeds the interval for their
//! risk tier, or when they hold an unresolved CRITICAL alert.
//! Deactivated customers are never queued.

use crate::{
    alert_case_store::Alert,
    config::KycConfig,
    customer_store::{CustomerProfileStore, KycReview},
    error::AmlResult,
    risk_model::{Customer, RiskLevel},
    types::{AlertId, CustomerId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KycOutcome {
    /// The current risk level stands.
    Confirmed,
    Reassessed(RiskLevel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReviewReason {
    Overdue { days_overdue: i64 },
    UnresolvedCriticalAlert { alert_id: AlertId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDue {
    pub customer_id: CustomerId,
    pub risk_level: RiskLevel,
    pub last_reviewed_at: Timestamp,
    pub reasons: Vec<ReviewReason>,
}

pub struct KycScheduler<'a> {
    config: &'a KycConfig,
    customers: &'a CustomerProfileStore,
}

impl<'a> KycScheduler<'a> {
    pub fn new(config: &'a KycConfig, customers: &'a CustomerProfileStore) -> Self {
        Self { config, customers }
    }

    pub fn perform_kyc(
        &self,
        customer_id: &str,
        officer: &str,
        outcome: KycOutcome,
        at: Timestamp,
    ) -> AmlResult<KycReview> {
        let new_level = match outcome {
            KycOutcome::Confirmed => None,
            KycOutcome::Reassessed(level) => Some(level),
        };
        let review = self.customers.record_kyc(customer_id, officer, new_level, at)?;
        log::info!(
            "customer={customer_id} KYC performed by {officer} ({} -> {})",
            review.prior_level,
            review.new_level
        );
        Ok(review)
    }

    /// Customers due for review at `now`, in customer id order.
    pub fn review_queue(&self, now: Timestamp, alerts: &[Alert]) -> Vec<ReviewDue> {
        review_queue(self.config, &self.customers.all(), alerts, now)
    }

    pub fn customers_for_review(&self, now: Timestamp, alerts: &[Alert]) -> Vec<CustomerId> {
        self.review_queue(now, alerts)
            .into_iter()
            .map(|due| due.customer_id)
            .collect()
    }
}

/// Pure form of the review rule, shared with the dashboard.
pub fn review_queue(
    config: &KycConfig,
    customers: &[Customer],
    alerts: &[Alert],
    now: Timestamp,
) -> Vec<ReviewDue> {
    let mut critical: BTreeMap<&str, Vec<&AlertId>> = BTreeMap::new();
    for alert in alerts {
        if alert.risk_level == RiskLevel::Critical && alert.status.is_unresolved() {
            if let Some(customer_id) = alert.customer_id.as_deref() {
                critical.entry(customer_id).or_default().push(&alert.id);
            }
        }
    }

    let mut queue = Vec::new();
    for customer in customers.iter().filter(|c| c.active) {
        let mut reasons = Vec::new();

        let reference = customer.kyc_reference_time();
        let interval = config.interval_for(customer.risk_level);
        let elapsed = now - reference;
        if elapsed > interval {
            reasons.push(ReviewReason::Overdue {
                days_overdue: (elapsed - interval).num_days(),
            });
        }
        if let Some(ids) = critical.get(customer.id.as_str()) {
            reasons.extend(ids.iter().map(|id| ReviewReason::UnresolvedCriticalAlert {
                alert_id: (*id).clone(),
            }));
        }

        if !reasons.is_empty() {
            queue.push(ReviewDue {
                customer_id: customer.id.clone(),
                risk_level: customer.risk_level,
                last_reviewed_at: reference,
                reasons,
            });
        }
    }
    queue.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
    queue
}
