//! Shared primitive types used across the entire engine.

use chrono::{DateTime, Utc};

/// Every timestamp in the engine is UTC.
pub type Timestamp = DateTime<Utc>;

/// A stable, unique identifier for a customer.
pub type CustomerId = String;

/// A stable identifier for a rule, e.g. `BSA-001-CTR`.
pub type RuleId = String;

/// Alert identifiers are assigned by the case store, e.g. `ALERT-00000042`.
pub type AlertId = String;

pub type TransactionId = String;
