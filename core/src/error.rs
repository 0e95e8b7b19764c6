use thiserror::Error;

use crate::risk_model::{AlertStatus, Framework};

#[derive(Error, Debug)]
pub enum AmlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Framework {framework} failed to install: {reason}")]
    FrameworkSetup { framework: Framework, reason: String },

    #[error("Invalid transaction '{transaction_id}': {reason}")]
    InvalidTransaction { transaction_id: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown customer '{0}'")]
    UnknownCustomer(String),

    #[error("Alert '{0}' not found")]
    AlertNotFound(String),

    #[error("Rule '{0}' not found")]
    RuleNotFound(String),

    #[error("Customer '{0}' is already registered")]
    DuplicateCustomer(String),

    #[error("Rule '{0}' is already registered")]
    DuplicateRule(String),

    #[error("Alert '{0}' already has an open investigation")]
    InvestigationAlreadyExists(String),

    #[error("Cannot {action} alert '{alert_id}' while it is {status}")]
    InvalidState {
        alert_id: String,
        status: AlertStatus,
        action: &'static str,
    },

    #[error("Unsupported export format '{0}'")]
    UnsupportedFormat(String),

    #[error("Rule '{rule_id}' could not be evaluated: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error families callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Validation,
    NotFound,
    State,
    UnsupportedFormat,
    Evaluation,
    Storage,
}

impl AmlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::FrameworkSetup { .. } => ErrorKind::Config,
            Self::InvalidTransaction { .. }
            | Self::Validation(_)
            | Self::DuplicateCustomer(_)
            | Self::DuplicateRule(_) => ErrorKind::Validation,
            Self::UnknownCustomer(_) | Self::AlertNotFound(_) | Self::RuleNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvestigationAlreadyExists(_) | Self::InvalidState { .. } => ErrorKind::State,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::RuleEvaluation { .. } => ErrorKind::Evaluation,
            Self::Database(_) | Self::Serialization(_) | Self::Other(_) => ErrorKind::Storage,
        }
    }
}

pub type AmlResult<T> = Result<T, AmlError>;
