//! aml-runner: headless AML monitoring run over a synthetic ledger feed.
//!
//! Usage:
//!   aml-runner --seed 12345 --days 30 --db run.db
//!   aml-runner --seed 12345 --days 90 --data-dir ./data --format json

mod rng;

use aml_core::{
    clock::{Clock, ManualClock},
    config::AmlConfig,
    engine::AmlEngine,
    risk_model::{
        AlertStatus, Amount, Currency, Customer, CustomerType, Entry, Resolution, RiskLevel,
        Transaction,
    },
    store::AmlStore,
    types::Timestamp,
};
use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use rng::{FeedRng, FeedStream};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

const CUSTOMER_COUNT: usize = 40;
const SANCTIONED_PARTY: &str = "Northwind Shell Trading";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let days = parse_arg(&args, "--days", 30i64);
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let format = arg_value(&args, "--format").unwrap_or("text");

    println!("AML compliance core: aml-runner");
    println!("  seed:      {seed}");
    println!("  days:      {days}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let config = AmlConfig::load(data_dir)
        .with_context(|| format!("loading AML config from {data_dir}"))?;
    let store = if db == ":memory:" {
        AmlStore::in_memory()?
    } else {
        AmlStore::open(db)?
    };

    let start = Utc
        .with_ymd_and_hms(2026, 1, 5, 0, 0, 0)
        .single()
        .context("invalid run start date")?;
    let clock = Arc::new(ManualClock::new(start));
    let engine = AmlEngine::new(config, store, clock.clone())?;

    for (framework, ids) in engine.setup_all_standard_rules()? {
        log::info!("framework={framework} rules: {}", ids.join(", "));
    }
    engine.add_sanctioned_party(SANCTIONED_PARTY);

    let customers = seed_customers(&engine, seed, start)?;
    let mut feed = FeedRng::new(seed, FeedStream::Transactions);
    let mut analysts = FeedRng::new(seed, FeedStream::Analysts);

    let mut monitored = 0usize;
    let mut raised = 0usize;
    for day in 0..days {
        let day_start = start + Duration::days(day);
        let count = feed.range(20, 60);
        for n in 0..count {
            let txn = synthetic_transaction(&mut feed, &customers, day_start, day, n);
            clock.set(txn.posted_at);
            match engine.monitor_transaction(&txn) {
                Ok(outcome) => {
                    monitored += 1;
                    raised += outcome.alerts.len();
                }
                Err(e) => log::warn!("txn={} rejected: {e}", txn.id),
            }
        }
        clock.set(day_start + Duration::hours(23));
        work_alert_queue(&engine, &mut analysts)?;
    }

    let end = clock.now();
    let dashboard = engine.generate_dashboard(start, end)?;
    println!("Monitored {monitored} transactions, raised {raised} alerts");
    println!(
        "Customers due for KYC review: {}",
        engine.customers_for_review(end).len()
    );
    println!();
    println!("{}", engine.export_report(&dashboard, format)?);
    Ok(())
}

fn seed_customers(engine: &AmlEngine, seed: u64, start: Timestamp) -> Result<Vec<Customer>> {
    const FIRST: &[&str] = &["Ada", "Bruno", "Chen", "Dara", "Elif", "Femi", "Greta", "Hugo"];
    const LAST: &[&str] = &["Okafor", "Lindqvist", "Moreau", "Tanaka", "Vargas", "Keller"];
    const COUNTRIES: &[&str] = &["US", "US", "US", "US", "GB", "DE", "FR", "NL", "IR", "MM"];

    let mut rng = FeedRng::new(seed, FeedStream::Customers);
    let mut customers = Vec::with_capacity(CUSTOMER_COUNT);
    for i in 0..CUSTOMER_COUNT {
        let roll = rng.next_f64();
        let customer_type = if roll < 0.05 {
            CustomerType::Pep
        } else if roll < 0.30 {
            CustomerType::Business
        } else {
            CustomerType::Individual
        };
        let name = match customer_type {
            CustomerType::Business => format!("{} Holdings", pick(&mut rng, LAST)),
            _ => format!("{} {}", pick(&mut rng, FIRST), pick(&mut rng, LAST)),
        };
        let risk = match rng.range(0, 10) {
            0..=5 => RiskLevel::Low,
            6..=8 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        let onboarded = start - Duration::days(rng.range(30, 900) as i64);
        let customer = Customer::new(
            format!("CUST-{i:04}"),
            name,
            customer_type,
            pick(&mut rng, COUNTRIES),
            risk,
            onboarded,
        )
        .with_activity("retail banking", "personal and business accounts");
        engine.register_customer(customer.clone())?;
        customers.push(customer);
    }

    // One customer carries a prior sanctions hit.
    if let Some(flagged) = customers.get(CUSTOMER_COUNT / 2) {
        engine.record_sanctions_match(&flagged.id, "OFAC SDN list", "screening-batch")?;
    }
    Ok(customers)
}

fn pick(rng: &mut FeedRng, items: &[&'static str]) -> &'static str {
    rng.pick(items).copied().unwrap_or("Unknown")
}

fn synthetic_transaction(
    rng: &mut FeedRng,
    customers: &[Customer],
    day_start: Timestamp,
    day: i64,
    n: u64,
) -> Transaction {
    let posted_at = day_start + Duration::minutes(rng.range(0, 24 * 60) as i64);
    let id = format!("TXN-{day:04}-{n:03}");

    // A few transactions come from unknown or listed counterparties.
    let reference = if rng.chance(0.02) {
        SANCTIONED_PARTY.to_string()
    } else if rng.chance(0.03) {
        format!("EXT-{}", rng.range(1000, 9999))
    } else {
        customers
            .get(rng.range(0, customers.len() as u64) as usize)
            .map(|c| c.id.clone())
            .unwrap_or_default()
    };
    let currency = if rng.chance(0.15) { Currency::EUR } else { Currency::USD };

    let (description, debit, credit, minor) = match rng.range(0, 10) {
        0..=3 => (
            "Salary credit",
            "payroll-clearing".to_string(),
            format!("deposit-{reference}"),
            rng.range(2_000, 6_000) * 100,
        ),
        4..=6 => (
            "Cash deposit",
            "cash-vault-01".to_string(),
            format!("deposit-{reference}"),
            // Clustered around the reporting threshold.
            if rng.chance(0.3) {
                rng.range(9_500, 10_200) * 100
            } else {
                rng.range(200, 4_000) * 100
            },
        ),
        7..=8 => (
            "Outgoing wire",
            format!("deposit-{reference}"),
            "wire-clearing".to_string(),
            rng.range(1_000, 40_000) * 100 + rng.range(0, 100),
        ),
        _ => (
            "Cash withdrawal",
            format!("deposit-{reference}"),
            "cash-vault-01".to_string(),
            rng.range(100, 12_000) * 100,
        ),
    };
    let amount = Amount::new(minor, currency);

    Transaction {
        id,
        description: description.to_string(),
        source_reference: reference,
        posted_at,
        entries: vec![Entry::debit(debit, amount), Entry::credit(credit, amount)],
    }
}

/// Simulated analysts: pick up open alerts and work some of them to closure.
fn work_alert_queue(engine: &AmlEngine, rng: &mut FeedRng) -> Result<()> {
    for alert in engine.get_alerts(None, Some(AlertStatus::Open), 0) {
        if !rng.chance(0.7) {
            continue;
        }
        engine.create_investigation(&alert.id, "analyst-1")?;
        engine.add_investigation_note(&alert.id, "Reviewed account activity and KYC file", "analyst-1")?;

        let roll = rng.next_f64();
        if alert.risk_level >= RiskLevel::High && roll < 0.3 {
            engine.escalate_alert(&alert.id, "analyst-1", "needs MLRO decision")?;
            engine.close_alert(&alert.id, Resolution::SarFiled, "mlro")?;
        } else if roll < 0.75 {
            engine.close_alert(&alert.id, Resolution::FalsePositive, "analyst-1")?;
        } else if roll < 0.9 {
            engine.close_alert(&alert.id, Resolution::NoAction, "analyst-1")?;
        }
    }
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    arg_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
