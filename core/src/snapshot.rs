//! Compliance snapshot: a point-in-time copy of alerts and customers.
//!
//! Reports and the dashboard are computed from a snapshot so they never
//! hold a store lock while aggregating.

use crate::{alert_case_store::Alert, risk_model::Customer, types::Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub taken_at: Timestamp,
    /// Oldest first.
    pub alerts: Vec<Alert>,
    /// Customer id order.
    pub customers: Vec<Customer>,
}

impl ComplianceSnapshot {
    /// Alerts created inside the inclusive period.
    pub fn alerts_in(&self, start: Timestamp, end: Timestamp) -> impl Iterator<Item = &Alert> {
        self.alerts
            .iter()
            .filter(move |a| a.created_at >= start && a.created_at <= end)
    }
}
