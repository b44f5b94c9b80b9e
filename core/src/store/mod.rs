//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components take a `&Ledger` and call its methods; they never execute SQL
//! directly. Every write that belongs to one settlement runs inside a single
//! `LedgerStore::atomically` call.

mod balance;
mod event;
mod product;
mod referral;
mod transaction;
mod venue;

pub use transaction::TransactionFilter;

use crate::{
    error::{LedgerError, LedgerResult},
    types::round_cents,
};
use rusqlite::{types::Type, Connection, Row, TransactionBehavior};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::{str::FromStr, time::Duration};

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// How long a writer waits for another connection's lock before failing.
    pub fn set_busy_timeout(&self, millis: u64) -> LedgerResult<()> {
        self.conn.busy_timeout(Duration::from_millis(millis))?;
        Ok(())
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_audit.sql"))?;
        Ok(())
    }

    /// Run `work` as one unit: committed if it returns `Ok`, rolled back
    /// otherwise (including on panic, when the transaction is dropped).
    ///
    /// The write lock is taken up front, so two settlements against the same
    /// database never interleave their balance reads and writes.
    pub fn atomically<T, F>(&mut self, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&Ledger<'_>) -> LedgerResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = work(&Ledger { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    /// Non-transactional handle for reads and one-off writes.
    pub fn reader(&self) -> Ledger<'_> {
        Ledger { conn: &self.conn }
    }
}

/// Borrowed view of the database. Inside `atomically` it is bound to the
/// open transaction.
pub struct Ledger<'c> {
    conn: &'c Connection,
}

// ── Column codecs ──────────────────────────────────────────────

/// Points or money → INTEGER hundredths.
pub(crate) fn to_hundredths(value: Decimal) -> LedgerResult<i64> {
    (round_cents(value) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| anyhow::anyhow!("amount {value} does not fit in a column").into())
}

pub(crate) fn from_hundredths(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

pub(crate) fn hundredths_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    row.get::<_, i64>(idx).map(from_hundredths)
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn opt_decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

/// Map a "row not found" into the domain error a caller asked for.
pub(crate) fn not_found_as<T>(
    result: rusqlite::Result<T>,
    err: impl FnOnce() -> LedgerError,
) -> LedgerResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(err()),
        Err(e) => Err(e.into()),
    }
}
