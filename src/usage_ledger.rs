//! # Usage Ledger Module
//!
//! Persistent quota accounting for the primary OCR provider. Two independent
//! counters are tracked: a global monthly counter shared by all users and a
//! per-user daily counter. Counters live in SQLite so they survive process
//! restarts within the same calendar period, and stale period keys are
//! reconciled (zeroed and re-keyed) before every comparison.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use log::{debug, error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::config::QuotaConfig;
use crate::errors::QuotaScope;

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    /// Both counters are below their caps
    Allowed,
    /// The counter for the given scope has reached its cap
    Exhausted(QuotaScope),
}

impl QuotaCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaCheck::Allowed)
    }
}

/// Outcome of an admission attempt
pub enum ReserveOutcome<'a> {
    /// Both counters were below their caps and have been incremented
    Reserved(QuotaReservation<'a>),
    /// The counter for the given scope has reached its cap
    Exhausted(QuotaScope),
}

/// A provisionally counted primary-provider call
///
/// Produced by [`UsageLedger::reserve`], which increments both counters in
/// the same transaction as the cap comparison. Dropping the reservation
/// without committing gives the counted call back, so a failed or cancelled
/// attempt consumes no quota while concurrent admissions can never push a
/// counter past its cap.
pub struct QuotaReservation<'a> {
    ledger: &'a UsageLedger,
    user_id: String,
    month_key: String,
    day_key: String,
    committed: bool,
}

impl QuotaReservation<'_> {
    /// Keep the reserved call counted after a confirmed success
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for QuotaReservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self
            .ledger
            .release(&self.user_id, &self.month_key, &self.day_key)
        {
            error!(
                "Failed to release quota reservation for {}: {e:#}",
                self.user_id
            );
        }
    }
}

/// Remaining quota for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRemaining {
    /// Calls left today for this user
    pub daily_remaining: u32,
    /// Calls left this month across all users
    pub monthly_remaining: u32,
}

/// Persistent, thread-safe quota counter store
///
/// The ledger is the sole authority on primary-provider usage; no other
/// component duplicates this bookkeeping. All reads and writes go through
/// an internal mutex so concurrent extraction requests cannot interleave
/// a check with another request's increment.
pub struct UsageLedger {
    conn: Mutex<Connection>,
    config: QuotaConfig,
}

/// Key identifying the current calendar month, e.g. `"2026-8"`
fn month_key(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.year(), now.month())
}

/// Key identifying the current calendar day, e.g. `"2026-08-24"`
fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

impl UsageLedger {
    /// Open (or create) the ledger database at the given path
    pub fn open<P: AsRef<Path>>(path: P, config: QuotaConfig) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open usage ledger database")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open an in-memory ledger (counters do not survive the process)
    pub fn in_memory(config: QuotaConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory ledger")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        info!("Initializing usage ledger schema...");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS monthly_usage (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                period_key TEXT NOT NULL,
                count INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create monthly_usage table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_usage (
                user_id TEXT PRIMARY KEY,
                date_key TEXT NOT NULL,
                count INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create daily_usage table")?;

        // Single global row; created here so later updates can assume it exists
        conn.execute(
            "INSERT OR IGNORE INTO monthly_usage (id, period_key, count) VALUES (0, '', 0)",
            [],
        )
        .context("Failed to seed monthly_usage row")?;

        Ok(())
    }

    /// Check whether a call to the primary provider may be served for this user
    ///
    /// Reconciles stale period keys before any comparison, then applies the
    /// monthly cap first (it is global) and the user's daily cap second.
    pub fn can_serve(&self, user_id: &str, is_paid_user: bool) -> Result<QuotaCheck> {
        self.can_serve_at(user_id, is_paid_user, Utc::now())
    }

    /// `can_serve` against an explicit clock, used for period-reset tests
    pub fn can_serve_at(
        &self,
        user_id: &str,
        is_paid_user: bool,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");

        let monthly = reconcile_monthly(&conn, &month_key(now))?;
        if monthly >= self.config.monthly_cap {
            debug!("Monthly quota exhausted: {monthly}/{}", self.config.monthly_cap);
            return Ok(QuotaCheck::Exhausted(QuotaScope::Monthly));
        }

        let daily = reconcile_daily(&conn, user_id, &day_key(now))?;
        let cap = self.config.daily_cap(is_paid_user);
        if daily >= cap {
            debug!("Daily quota exhausted for user {user_id}: {daily}/{cap}");
            return Ok(QuotaCheck::Exhausted(QuotaScope::Daily));
        }

        Ok(QuotaCheck::Allowed)
    }

    /// Reserve a call to the primary provider for this user
    ///
    /// Compares both counters against their caps and increments them inside
    /// one transaction, so two concurrent requests can never both pass a
    /// near-cap check. The monthly cap is applied first (it is global), the
    /// user's daily cap second. The returned reservation must be committed
    /// after a confirmed provider success; dropping it releases the count.
    pub fn reserve(&self, user_id: &str, is_paid_user: bool) -> Result<ReserveOutcome<'_>> {
        self.reserve_at(user_id, is_paid_user, Utc::now())
    }

    /// `reserve` against an explicit clock, used for period-reset tests
    pub fn reserve_at(
        &self,
        user_id: &str,
        is_paid_user: bool,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome<'_>> {
        let mkey = month_key(now);
        let dkey = day_key(now);

        {
            let mut conn = self.conn.lock().expect("ledger mutex poisoned");
            let tx = conn
                .transaction()
                .context("Failed to start ledger transaction")?;

            let monthly = reconcile_monthly(&tx, &mkey)?;
            if monthly >= self.config.monthly_cap {
                debug!("Monthly quota exhausted: {monthly}/{}", self.config.monthly_cap);
                // Keep any period-key reset the reconciliation made
                tx.commit().context("Failed to commit ledger transaction")?;
                return Ok(ReserveOutcome::Exhausted(QuotaScope::Monthly));
            }

            let daily = reconcile_daily(&tx, user_id, &dkey)?;
            let cap = self.config.daily_cap(is_paid_user);
            if daily >= cap {
                debug!("Daily quota exhausted for user {user_id}: {daily}/{cap}");
                tx.commit().context("Failed to commit ledger transaction")?;
                return Ok(ReserveOutcome::Exhausted(QuotaScope::Daily));
            }

            tx.execute("UPDATE monthly_usage SET count = count + 1 WHERE id = 0", [])
                .context("Failed to increment monthly counter")?;
            tx.execute(
                "INSERT INTO daily_usage (user_id, date_key, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(user_id) DO UPDATE SET count = count + 1",
                params![user_id, dkey],
            )
            .context("Failed to increment daily counter")?;

            tx.commit().context("Failed to commit ledger transaction")?;
        }

        debug!("Reserved primary-provider call for user {user_id}");
        Ok(ReserveOutcome::Reserved(QuotaReservation {
            ledger: self,
            user_id: user_id.to_string(),
            month_key: mkey,
            day_key: dkey,
            committed: false,
        }))
    }

    /// Give back a reserved call that was never committed
    ///
    /// The decrements are guarded by the period keys captured at reservation
    /// time, so a calendar rollover between reserve and release cannot push
    /// a freshly reset counter negative.
    fn release(&self, user_id: &str, month_key: &str, day_key: &str) -> Result<()> {
        let mut conn = self.conn.lock().expect("ledger mutex poisoned");
        let tx = conn
            .transaction()
            .context("Failed to start ledger transaction")?;

        tx.execute(
            "UPDATE monthly_usage SET count = count - 1
             WHERE id = 0 AND period_key = ?1 AND count > 0",
            params![month_key],
        )
        .context("Failed to decrement monthly counter")?;
        tx.execute(
            "UPDATE daily_usage SET count = count - 1
             WHERE user_id = ?1 AND date_key = ?2 AND count > 0",
            params![user_id, day_key],
        )
        .context("Failed to decrement daily counter")?;

        tx.commit().context("Failed to commit ledger transaction")?;

        debug!("Released uncommitted quota reservation for user {user_id}");
        Ok(())
    }

    /// Record one successful primary-provider call for this user
    ///
    /// Increments the global monthly counter and the user's daily counter
    /// inside a single transaction: either both are counted or neither is.
    pub fn record_success(&self, user_id: &str) -> Result<()> {
        self.record_success_at(user_id, Utc::now())
    }

    /// `record_success` against an explicit clock, used for period-reset tests
    pub fn record_success_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn.lock().expect("ledger mutex poisoned");
        let tx = conn
            .transaction()
            .context("Failed to start ledger transaction")?;

        let mkey = month_key(now);
        reconcile_monthly(&tx, &mkey)?;
        tx.execute("UPDATE monthly_usage SET count = count + 1 WHERE id = 0", [])
            .context("Failed to increment monthly counter")?;

        let dkey = day_key(now);
        reconcile_daily(&tx, user_id, &dkey)?;
        tx.execute(
            "INSERT INTO daily_usage (user_id, date_key, count) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id) DO UPDATE SET count = count + 1",
            params![user_id, dkey],
        )
        .context("Failed to increment daily counter")?;

        tx.commit().context("Failed to commit ledger transaction")?;

        info!("Recorded primary-provider usage for user {user_id}");
        Ok(())
    }

    /// Remaining daily and monthly quota for a user
    pub fn remaining(&self, user_id: &str, is_paid_user: bool) -> Result<QuotaRemaining> {
        self.remaining_at(user_id, is_paid_user, Utc::now())
    }

    /// `remaining` against an explicit clock, used for period-reset tests
    pub fn remaining_at(
        &self,
        user_id: &str,
        is_paid_user: bool,
        now: DateTime<Utc>,
    ) -> Result<QuotaRemaining> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");

        let monthly = reconcile_monthly(&conn, &month_key(now))?;
        let daily = reconcile_daily(&conn, user_id, &day_key(now))?;
        let cap = self.config.daily_cap(is_paid_user);

        Ok(QuotaRemaining {
            daily_remaining: cap.saturating_sub(daily),
            monthly_remaining: self.config.monthly_cap.saturating_sub(monthly),
        })
    }
}

/// Zero the monthly counter when its period key is stale, then return it
fn reconcile_monthly(conn: &Connection, current_key: &str) -> Result<u32> {
    let (stored_key, count): (String, u32) = conn
        .query_row(
            "SELECT period_key, count FROM monthly_usage WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("Failed to read monthly counter")?;

    if stored_key != current_key {
        debug!("Monthly period rolled over ({stored_key} -> {current_key}), resetting counter");
        conn.execute(
            "UPDATE monthly_usage SET period_key = ?1, count = 0 WHERE id = 0",
            params![current_key],
        )
        .context("Failed to reset monthly counter")?;
        return Ok(0);
    }

    Ok(count)
}

/// Zero a user's daily counter when its date key is stale, then return it
///
/// Entries are created lazily: a user with no row has a count of zero.
fn reconcile_daily(conn: &Connection, user_id: &str, current_key: &str) -> Result<u32> {
    let row: Option<(String, u32)> = conn
        .query_row(
            "SELECT date_key, count FROM daily_usage WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("Failed to read daily counter")?;

    match row {
        Some((stored_key, count)) if stored_key == current_key => Ok(count),
        Some(_) => {
            debug!("Daily period rolled over for user {user_id}, resetting counter");
            conn.execute(
                "UPDATE daily_usage SET date_key = ?1, count = 0 WHERE user_id = ?2",
                params![current_key, user_id],
            )
            .context("Failed to reset daily counter")?;
            Ok(0)
        }
        None => Ok(0),
    }
}
