//! Sanctions list: the matching contract against a supplied list.
//!
//! The engine does not fetch sanctions data. Callers load designated
//! party names or references; the monitor matches customers and
//! counterparty references against them after normalisation
//! (case-folded, punctuation dropped, whitespace collapsed).

use crate::risk_model::Customer;
use parking_lot::RwLock;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanctionsHit {
    /// The customer profile carries the sanctions flag.
    ProfileFlag,
    /// A listed entry matched the customer id, name, or the counterparty.
    ListedParty { entry: String, matched_on: &'static str },
}

impl SanctionsHit {
    pub fn describe(&self) -> String {
        match self {
            Self::ProfileFlag => "customer profile carries a sanctions match".to_string(),
            Self::ListedParty { entry, matched_on } => {
                format!("sanctions list entry '{entry}' matched {matched_on}")
            }
        }
    }
}

#[derive(Default)]
pub struct SanctionsList {
    entries: RwLock<BTreeSet<String>>,
}

impl SanctionsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, party: &str) -> bool {
        let key = normalize(party);
        if key.is_empty() {
            return false;
        }
        self.entries.write().insert(key)
    }

    pub fn remove(&self, party: &str) -> bool {
        self.entries.write().remove(&normalize(party))
    }

    pub fn contains(&self, party: &str) -> bool {
        let key = normalize(party);
        !key.is_empty() && self.entries.read().contains(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check a transaction's parties. The profile flag wins over list hits.
    pub fn screen(&self, customer: Option<&Customer>, counterparty_ref: &str) -> Option<SanctionsHit> {
        if customer.is_some_and(|c| c.flags.sanctions_match) {
            return Some(SanctionsHit::ProfileFlag);
        }

        let entries = self.entries.read();
        if entries.is_empty() {
            return None;
        }
        let mut candidates: Vec<(&'static str, &str)> = Vec::with_capacity(3);
        if let Some(c) = customer {
            candidates.push(("customer id", c.id.as_str()));
            candidates.push(("customer name", c.name.as_str()));
        }
        candidates.push(("counterparty reference", counterparty_ref));

        candidates.into_iter().find_map(|(matched_on, value)| {
            let key = normalize(value);
            entries.get(&key).map(|entry| SanctionsHit::ListedParty {
                entry: entry.clone(),
                matched_on,
            })
        })
    }
}

fn normalize(party: &str) -> String {
    party
        .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '-'))
        .filter(|part| !part.is_empty())
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_ignores_case_and_spacing() {
        let list = SanctionsList::new();
        list.add("Ivan  Petrov, Jr.");
        assert!(list.contains("ivan petrov jr"));
        assert!(!list.contains("ivan petrova"));
    }
}
