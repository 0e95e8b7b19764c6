//! aml-core: anti-money-laundering compliance core.
//!
//! Monitors posted ledger transactions against regulatory rule sets,
//! raises alerts, runs the investigation workflow, schedules KYC reviews
//! and aggregates compliance reports. `engine::AmlEngine` is the entry
//! point; everything else is reachable from it.

pub mod alert_case_store;
pub mod clock;
pub mod config;
pub mod customer_store;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod event;
pub mod kyc_scheduler;
pub mod report_engine;
pub mod risk_model;
pub mod rule_registry;
pub mod sanctions;
pub mod snapshot;
pub mod store;
pub mod transaction_monitor;
pub mod types;

pub use engine::AmlEngine;
pub use error::{AmlError, AmlResult, ErrorKind};
