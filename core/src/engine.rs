//! The AML engine: the one context object that owns every component.
//!
//! MONITORING ORDER (per transaction, fixed):
//!   1. Validate entries and derive monitored amounts (no side effects on failure)
//!   2. Resolve the counterparty through the CustomerLookup
//!   3. Record the activity history (resolved customers only)
//!   4. Evaluate the active rules
//!   5. Store the alerts
//!   6. Journal AlertRaised / EvaluationGap events
//!
//! RULES:
//!   - Every operation takes &self; share the engine through Arc.
//!   - Time comes only from the injected Clock.
//!   - Every state change is followed by one AmlEvent in the audit journal.

use crate::{
    alert_case_store::{Alert, AlertCaseStore, Investigation, Note, StatusChange},
    clock::{Clock, SystemClock},
    config::AmlConfig,
    customer_store::{CustomerLookup, CustomerProfileStore, KycReview, ProfileAuditNote},
    dashboard::{self, Dashboard},
    error::{AmlError, AmlResult},
    event::{AmlEvent, AuditEntry},
    kyc_scheduler::{KycOutcome, KycScheduler, ReviewDue},
    report_engine::{self, Report, ReportKind},
    risk_model::{AlertStatus, Customer, Framework, Resolution, RiskLevel, RuleType, Transaction},
    rule_registry::{Rule, RuleRegistry},
    sanctions::{SanctionsHit, SanctionsList},
    snapshot::ComplianceSnapshot,
    store::{ActivityRecord, AmlStore},
    transaction_monitor::{monitored_amounts, EvaluationGap, MonitorOutcome, TransactionMonitor},
    types::{CustomerId, RuleId, Timestamp},
};
use std::sync::Arc;

pub struct AmlEngine {
    config: AmlConfig,
    clock: Arc<dyn Clock>,
    rules: RuleRegistry,
    customers: CustomerProfileStore,
    alerts: AlertCaseStore,
    sanctions: SanctionsList,
    store: AmlStore,
}

impl AmlEngine {
    /// Wire an engine over an existing store. Applies migrations.
    pub fn new(config: AmlConfig, store: AmlStore, clock: Arc<dyn Clock>) -> AmlResult<Self> {
        store.migrate()?;
        Ok(Self {
            rules: RuleRegistry::new(config.clone()),
            customers: CustomerProfileStore::new(),
            alerts: AlertCaseStore::new(),
            sanctions: SanctionsList::new(),
            config,
            clock,
            store,
        })
    }

    /// In-memory store, wall clock, no rules installed.
    pub fn in_memory(config: AmlConfig) -> AmlResult<Self> {
        Self::new(config, AmlStore::in_memory()?, Arc::new(SystemClock))
    }

    /// Test defaults with every standard framework installed.
    pub fn build_test(clock: Arc<dyn Clock>) -> AmlResult<Self> {
        let engine = Self::new(AmlConfig::default_test(), AmlStore::in_memory()?, clock)?;
        engine.setup_all_standard_rules()?;
        Ok(engine)
    }

    pub fn config(&self) -> &AmlConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn customers(&self) -> &CustomerProfileStore {
        &self.customers
    }

    pub fn store(&self) -> &AmlStore {
        &self.store
    }

    // ── Rules ──────────────────────────────────────────────────

    pub fn setup_framework(&self, framework: Framework) -> AmlResult<Vec<RuleId>> {
        let rule_ids = self.rules.setup_framework_rules(framework)?;
        self.audit(
            None,
            AmlEvent::FrameworkRulesInstalled {
                framework,
                rule_ids: rule_ids.clone(),
            },
        )?;
        Ok(rule_ids)
    }

    /// Install a framework by name ("BSA", "FATF", "EU_AMLD", ...).
    pub fn setup_standard_rules(&self, framework: &str) -> AmlResult<Vec<RuleId>> {
        let framework: Framework = framework.parse()?;
        self.setup_framework(framework)
    }

    /// Every framework in order; stops at the first failure.
    /// Frameworks installed before it stay installed.
    pub fn setup_all_standard_rules(&self) -> AmlResult<Vec<(Framework, Vec<RuleId>)>> {
        self.rules.setup_all_standard_rules_with(|framework, rule_ids| {
            self.audit(
                None,
                AmlEvent::FrameworkRulesInstalled {
                    framework,
                    rule_ids: rule_ids.to_vec(),
                },
            )
        })
    }

    pub fn register_rule(&self, rule: Rule) -> AmlResult<()> {
        let rule_id = rule.id.clone();
        self.rules.register_rule(rule)?;
        self.audit(
            None,
            AmlEvent::RuleActivationChanged {
                rule_id,
                active: true,
            },
        )
    }

    pub fn set_rule_active(&self, rule_id: &str, active: bool, actor: &str) -> AmlResult<()> {
        self.rules.set_active(rule_id, active)?;
        self.audit(
            Some(actor),
            AmlEvent::RuleActivationChanged {
                rule_id: rule_id.to_string(),
                active,
            },
        )
    }

    // ── Customers ──────────────────────────────────────────────

    pub fn register_customer(&self, customer: Customer) -> AmlResult<()> {
        let customer_id = customer.id.clone();
        let risk_level = customer.risk_level;
        self.customers.register(customer)?;
        self.audit(
            None,
            AmlEvent::CustomerRegistered {
                customer_id,
                risk_level,
            },
        )
    }

    pub fn customer(&self, customer_id: &str) -> Option<Customer> {
        self.customers.get(customer_id)
    }

    pub fn update_risk_level(&self, customer_id: &str, level: RiskLevel, actor: &str) -> AmlResult<()> {
        let prior = self
            .customers
            .update_risk_level(customer_id, level, actor, self.now())?;
        self.audit(
            Some(actor),
            AmlEvent::RiskLevelChanged {
                customer_id: customer_id.to_string(),
                prior,
                new: level,
            },
        )
    }

    pub fn record_sanctions_match(&self, customer_id: &str, source: &str, actor: &str) -> AmlResult<()> {
        self.customers
            .record_sanctions_match(customer_id, source, actor, self.now())?;
        self.audit(
            Some(actor),
            AmlEvent::SanctionsMatchRecorded {
                customer_id: customer_id.to_string(),
                source: source.to_string(),
            },
        )
    }

    pub fn deactivate_customer(&self, customer_id: &str, actor: &str) -> AmlResult<()> {
        self.customers.deactivate(customer_id, actor, self.now())?;
        self.audit(
            Some(actor),
            AmlEvent::CustomerDeactivated {
                customer_id: customer_id.to_string(),
            },
        )
    }

    pub fn profile_audit(&self, customer_id: &str) -> AmlResult<Vec<ProfileAuditNote>> {
        self.customers.audit_notes(customer_id)
    }

    // ── Sanctions ──────────────────────────────────────────────

    pub fn add_sanctioned_party(&self, party: &str) -> bool {
        self.sanctions.add(party)
    }

    pub fn remove_sanctioned_party(&self, party: &str) -> bool {
        self.sanctions.remove(party)
    }

    /// Screen a registered customer against the profile flag and the list.
    pub fn screen_customer(&self, customer_id: &str) -> AmlResult<Option<SanctionsHit>> {
        let customer = self
            .customers
            .get(customer_id)
            .ok_or_else(|| AmlError::UnknownCustomer(customer_id.to_string()))?;
        Ok(self.sanctions.screen(Some(&customer), ""))
    }

    // ── Monitoring ─────────────────────────────────────────────

    /// Monitor against the engine's own profile store.
    pub fn monitor_transaction(&self, txn: &Transaction) -> AmlResult<MonitorOutcome> {
        self.monitor_transaction_with(txn, &self.customers)
    }

    pub fn monitor_transaction_with(
        &self,
        txn: &Transaction,
        lookup: &dyn CustomerLookup,
    ) -> AmlResult<MonitorOutcome> {
        let amounts = monitored_amounts(txn, &self.config)?;
        let customer = lookup.lookup(&txn.source_reference);
        let now = self.now();

        let mut history_gap = None;
        if let Some(c) = &customer {
            let record = ActivityRecord {
                transaction_id: txn.id.clone(),
                customer_id: c.id.clone(),
                posted_at: txn.posted_at,
                gross: amounts.gross,
                cash: amounts.cash,
                is_cash: amounts.is_cash,
            };
            match self.store.record_activity(&record, now) {
                Ok(false) => log::debug!("txn={} already in activity history", txn.id),
                Ok(true) => {}
                Err(e) => {
                    log::warn!("txn={} activity history not recorded: {e}", txn.id);
                    history_gap = Some(EvaluationGap {
                        rule_id: None,
                        reason: format!("activity history not recorded: {e}"),
                    });
                }
            }
        } else {
            log::warn!(
                "txn={} counterparty '{}' not resolved; customer rules skipped",
                txn.id,
                txn.source_reference
            );
        }

        let monitor = TransactionMonitor::new(&self.rules, &self.sanctions, &self.store);
        let evaluation = monitor.evaluate(txn, amounts, customer.as_ref());

        let alerts: Vec<Alert> = evaluation
            .drafts
            .into_iter()
            .map(|draft| self.alerts.append(draft, now))
            .collect();
        let mut gaps = evaluation.gaps;
        gaps.extend(history_gap);

        // Alerts are already stored. Journal every event even if one write fails.
        let events = alerts
            .iter()
            .map(|alert| AmlEvent::AlertRaised {
                alert_id: alert.id.clone(),
                transaction_id: alert.transaction_id.clone(),
                customer_id: alert.customer_id.clone(),
                rule_ids: alert.rule_ids.clone(),
                rule_type: alert.rule_type,
                risk_level: alert.risk_level,
            })
            .chain(gaps.iter().map(|gap| AmlEvent::EvaluationGap {
                transaction_id: txn.id.clone(),
                rule_id: gap.rule_id.clone(),
                reason: gap.reason.clone(),
            }))
            .collect::<Vec<_>>();
        let mut journal_gaps = Vec::new();
        for event in events {
            let event_type = event.type_name();
            if let Err(e) = self.audit(None, event) {
                log::warn!("txn={} {event_type} not journaled: {e}", txn.id);
                journal_gaps.push(EvaluationGap {
                    rule_id: None,
                    reason: format!("audit journal write failed for {event_type}: {e}"),
                });
            }
        }
        gaps.extend(journal_gaps);

        log::info!(
            "txn={} monitored: {} alerts, {} gaps, {} skipped",
            txn.id,
            alerts.len(),
            gaps.len(),
            evaluation.skipped_rules.len()
        );

        Ok(MonitorOutcome {
            transaction_id: txn.id.clone(),
            alerts,
            gaps,
            skipped_rules: evaluation.skipped_rules,
            unresolved_counterparty: customer.is_none().then(|| txn.source_reference.clone()),
        })
    }

    // ── Alerts & investigations ────────────────────────────────

    pub fn get_alerts(
        &self,
        rule_type: Option<RuleType>,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> Vec<Alert> {
        self.alerts.get_alerts(rule_type, status, limit)
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.get_alert(alert_id)
    }

    pub fn investigation(&self, alert_id: &str) -> AmlResult<Option<Investigation>> {
        self.alerts.investigation(alert_id)
    }

    pub fn status_history(&self, alert_id: &str) -> AmlResult<Vec<StatusChange>> {
        self.alerts.status_history(alert_id)
    }

    pub fn create_investigation(&self, alert_id: &str, analyst: &str) -> AmlResult<Investigation> {
        let investigation = self.alerts.create_investigation(alert_id, analyst, self.now())?;
        log::info!("alert={alert_id} investigation {} opened by {analyst}", investigation.id);
        self.audit(
            Some(analyst),
            AmlEvent::InvestigationOpened {
                alert_id: alert_id.to_string(),
                investigation_id: investigation.id.clone(),
                analyst: analyst.to_string(),
            },
        )?;
        self.audit_transition(
            alert_id,
            analyst,
            AlertStatus::Open,
            AlertStatus::UnderReview,
            None,
            None,
        )?;
        Ok(investigation)
    }

    pub fn add_investigation_note(&self, alert_id: &str, text: &str, author: &str) -> AmlResult<Note> {
        let note = self.alerts.add_note(alert_id, text, author, self.now())?;
        self.audit(
            Some(author),
            AmlEvent::InvestigationNoteAdded {
                alert_id: alert_id.to_string(),
                author: author.to_string(),
                at: note.at,
            },
        )?;
        Ok(note)
    }

    pub fn escalate_alert(&self, alert_id: &str, actor: &str, reason: &str) -> AmlResult<StatusChange> {
        let change = self.alerts.escalate(alert_id, actor, reason, self.now())?;
        log::info!("alert={alert_id} escalated by {actor}");
        self.audit_transition(
            alert_id,
            actor,
            change.from,
            change.to,
            None,
            change.reason.clone(),
        )?;
        Ok(change)
    }

    pub fn close_alert(
        &self,
        alert_id: &str,
        resolution: Resolution,
        actor: &str,
    ) -> AmlResult<StatusChange> {
        let change = self.alerts.close(alert_id, resolution, actor, self.now())?;
        log::info!("alert={alert_id} closed by {actor} ({resolution:?})");
        self.audit_transition(alert_id, actor, change.from, change.to, Some(resolution), None)?;
        Ok(change)
    }

    pub fn reopen_alert(&self, alert_id: &str, actor: &str, reason: &str) -> AmlResult<StatusChange> {
        let change = self.alerts.reopen(alert_id, actor, reason, self.now())?;
        log::warn!("alert={alert_id} reopened by {actor}: {reason}");
        self.audit_transition(
            alert_id,
            actor,
            change.from,
            change.to,
            None,
            change.reason.clone(),
        )?;
        Ok(change)
    }

    // ── KYC ────────────────────────────────────────────────────

    fn kyc(&self) -> KycScheduler<'_> {
        KycScheduler::new(&self.config.kyc, &self.customers)
    }

    pub fn perform_kyc(&self, customer_id: &str, officer: &str, outcome: KycOutcome) -> AmlResult<KycReview> {
        let review = self.kyc().perform_kyc(customer_id, officer, outcome, self.now())?;
        self.audit(
            Some(officer),
            AmlEvent::KycPerformed {
                customer_id: review.customer_id.clone(),
                officer: officer.to_string(),
                prior_level: review.prior_level,
                new_level: review.new_level,
            },
        )?;
        Ok(review)
    }

    pub fn customers_for_review(&self, now: Timestamp) -> Vec<CustomerId> {
        self.kyc().customers_for_review(now, &self.alerts.snapshot())
    }

    pub fn review_queue(&self, now: Timestamp) -> Vec<ReviewDue> {
        self.kyc().review_queue(now, &self.alerts.snapshot())
    }

    // ── Reporting ──────────────────────────────────────────────

    pub fn snapshot(&self) -> ComplianceSnapshot {
        ComplianceSnapshot {
            taken_at: self.now(),
            alerts: self.alerts.snapshot(),
            customers: self.customers.all(),
        }
    }

    pub fn generate_report(&self, kind: ReportKind, start: Timestamp, end: Timestamp) -> AmlResult<Report> {
        report_engine::generate_report(&self.snapshot(), kind, start, end)
    }

    /// Report by name ("ALERTS_SUMMARY", "CTR_REPORT", ...).
    pub fn generate_report_named(&self, kind: &str, start: Timestamp, end: Timestamp) -> AmlResult<Report> {
        self.generate_report(kind.parse()?, start, end)
    }

    pub fn generate_dashboard(&self, start: Timestamp, end: Timestamp) -> AmlResult<Dashboard> {
        dashboard::generate_dashboard(&self.snapshot(), &self.config, start, end)
    }

    pub fn export_report(&self, dashboard: &Dashboard, format: &str) -> AmlResult<String> {
        dashboard::export_report(dashboard, format)
    }

    // ── Audit journal ──────────────────────────────────────────

    pub fn audit_trail(&self, entity_id: &str) -> AmlResult<Vec<AuditEntry>> {
        self.store.audit_for_entity(entity_id)
    }

    fn audit(&self, actor: Option<&str>, event: AmlEvent) -> AmlResult<()> {
        let entry = AuditEntry {
            id: None,
            recorded_at: self.now(),
            entity_id: event.entity_id().to_string(),
            event_type: event.type_name().to_string(),
            actor: actor.map(str::to_string),
            payload: serde_json::to_string(&event)?,
        };
        self.store.append_audit(&entry)?;
        Ok(())
    }

    fn audit_transition(
        &self,
        alert_id: &str,
        actor: &str,
        from: AlertStatus,
        to: AlertStatus,
        resolution: Option<Resolution>,
        reason: Option<String>,
    ) -> AmlResult<()> {
        self.audit(
            Some(actor),
            AmlEvent::AlertStatusChanged {
                alert_id: alert_id.to_string(),
                from,
                to,
                resolution,
                reason,
            },
        )
    }
}
