//! Activity history for the windowed rules (cash-intensive, velocity).

use super::{from_millis, to_millis, AmlStore};
use crate::{
    error::{AmlError, AmlResult},
    risk_model::{Amount, Currency},
    types::{CustomerId, Timestamp, TransactionId},
};
use rusqlite::params;

/// One monitored transaction, reduced to what the windowed rules need.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub posted_at: Timestamp,
    pub gross: Amount,
    pub cash: Amount,
    pub is_cash: bool,
}

fn stored_minor(record: &ActivityRecord, amount: Amount) -> AmlResult<i64> {
    i64::try_from(amount.minor).map_err(|_| {
        AmlError::Validation(format!(
            "transaction {}: {amount} exceeds the activity history range",
            record.transaction_id
        ))
    })
}

impl AmlStore {
    /// Record a monitored transaction. Returns false when the transaction
    /// id was already recorded, so re-monitoring never double counts.
    pub fn record_activity(&self, record: &ActivityRecord, recorded_at: Timestamp) -> AmlResult<bool> {
        let gross = stored_minor(record, record.gross)?;
        let cash = stored_minor(record, record.cash)?;
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO monitored_transaction
             (transaction_id, customer_id, posted_at_ms, currency,
              gross_minor, cash_minor, is_cash, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.transaction_id,
                record.customer_id,
                to_millis(record.posted_at),
                record.gross.currency.as_str(),
                gross,
                cash,
                record.is_cash as i64,
                to_millis(recorded_at),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Cash transactions for a customer in `[since, until]` whose cash
    /// movement is at least `min_cash_minor`.
    pub fn count_cash_activity(
        &self,
        customer_id: &str,
        since: Timestamp,
        until: Timestamp,
        min_cash_minor: u64,
    ) -> AmlResult<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM monitored_transaction
             WHERE customer_id = ?1 AND is_cash = 1
               AND posted_at_ms >= ?2 AND posted_at_ms <= ?3
               AND cash_minor >= ?4",
            params![
                customer_id,
                to_millis(since),
                to_millis(until),
                i64::try_from(min_cash_minor).unwrap_or(i64::MAX),
            ],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Total gross amount (minor units) a customer moved in `currency`
    /// during `[since, until]`.
    pub fn sum_gross_activity(
        &self,
        customer_id: &str,
        currency: Currency,
        since: Timestamp,
        until: Timestamp,
    ) -> AmlResult<u64> {
        let sum: i64 = self.conn.lock().query_row(
            "SELECT COALESCE(SUM(gross_minor), 0) FROM monitored_transaction
             WHERE customer_id = ?1 AND currency = ?2
               AND posted_at_ms >= ?3 AND posted_at_ms <= ?4",
            params![customer_id, currency.as_str(), to_millis(since), to_millis(until)],
            |row| row.get(0),
        )?;
        Ok(sum.max(0) as u64)
    }

    pub fn activity_for_customer(&self, customer_id: &str) -> AmlResult<Vec<ActivityRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT transaction_id, customer_id, posted_at_ms, currency,
                    gross_minor, cash_minor, is_cash
             FROM monitored_transaction
             WHERE customer_id = ?1
             ORDER BY posted_at_ms ASC, transaction_id ASC",
        )?;
        let rows = stmt.query_map(params![customer_id], |row| {
            let code: String = row.get(3)?;
            let currency = Currency::parse(&code).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(ActivityRecord {
                transaction_id: row.get(0)?,
                customer_id: row.get(1)?,
                posted_at: from_millis(2, row.get(2)?)?,
                gross: Amount::new(row.get::<_, i64>(4)?.max(0) as u64, currency),
                cash: Amount::new(row.get::<_, i64>(5)?.max(0) as u64, currency),
                is_cash: row.get::<_, i64>(6)? != 0,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
