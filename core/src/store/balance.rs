//! The only code that mutates balance rows.
//!
//! Each mutation is a single UPDATE whose WHERE clause carries the guard, so
//! the check and the write cannot be separated by another writer. The table
//! CHECK constraints back the same invariants.

use super::{hundredths_at, to_hundredths, Ledger};
use crate::{
    balance::UserVenueBalance,
    error::{LedgerError, LedgerResult},
    types::Points,
};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

const BALANCE_COLUMNS: &str = "user_id, venue_id, points_earned, points_spent, points_available,
     current_streak, longest_streak, last_visit_date, total_visits";

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<UserVenueBalance> {
    Ok(UserVenueBalance {
        user_id:          row.get(0)?,
        venue_id:         row.get(1)?,
        points_earned:    hundredths_at(row, 2)?,
        points_spent:     hundredths_at(row, 3)?,
        points_available: hundredths_at(row, 4)?,
        current_streak:   row.get::<_, i64>(5)? as u32,
        longest_streak:   row.get::<_, i64>(6)? as u32,
        last_visit_date:  row.get(7)?,
        total_visits:     row.get::<_, i64>(8)? as u32,
    })
}

fn non_negative(points: Points) -> LedgerResult<()> {
    if points < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount { field: "points", value: points });
    }
    Ok(())
}

impl Ledger<'_> {
    pub fn balance(&self, user_id: &str, venue_id: &str) -> LedgerResult<Option<UserVenueBalance>> {
        let balance = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BALANCE_COLUMNS} FROM user_venue_balance
                     WHERE user_id = ?1 AND venue_id = ?2"
                ),
                params![user_id, venue_id],
                balance_from_row,
            )
            .optional()?;
        Ok(balance)
    }

    /// Fetch the row, creating a zeroed one first if absent.
    pub fn ensure_balance(&self, user_id: &str, venue_id: &str) -> LedgerResult<UserVenueBalance> {
        self.conn.execute(
            "INSERT INTO user_venue_balance (user_id, venue_id) VALUES (?1, ?2)
             ON CONFLICT (user_id, venue_id) DO NOTHING",
            params![user_id, venue_id],
        )?;
        self.balance(user_id, venue_id)?
            .ok_or_else(|| anyhow::anyhow!("balance row for {user_id}@{venue_id} vanished").into())
    }

    pub fn earn(
        &self,
        user_id: &str,
        venue_id: &str,
        points: Points,
    ) -> LedgerResult<UserVenueBalance> {
        non_negative(points)?;
        self.ensure_balance(user_id, venue_id)?;
        let p = to_hundredths(points)?;
        self.conn.execute(
            "UPDATE user_venue_balance
             SET points_earned = points_earned + ?1,
                 points_available = points_available + ?1
             WHERE user_id = ?2 AND venue_id = ?3",
            params![p, user_id, venue_id],
        )?;
        self.ensure_balance(user_id, venue_id)
    }

    /// Deduct `points` if and only if at least that many are available.
    pub fn spend(
        &self,
        user_id: &str,
        venue_id: &str,
        points: Points,
    ) -> LedgerResult<UserVenueBalance> {
        non_negative(points)?;
        let p = to_hundredths(points)?;
        let updated = self.conn.execute(
            "UPDATE user_venue_balance
             SET points_spent = points_spent + ?1,
                 points_available = points_available - ?1
             WHERE user_id = ?2 AND venue_id = ?3 AND points_available >= ?1",
            params![p, user_id, venue_id],
        )?;
        if updated == 0 {
            let available = self
                .balance(user_id, venue_id)?
                .map_or(Decimal::ZERO, |b| b.points_available);
            return Err(LedgerError::InsufficientPoints { available, required: points });
        }
        self.ensure_balance(user_id, venue_id)
    }

    /// Take back points that were earned. Fails rather than overdraw when
    /// some of them have already been spent.
    pub fn reverse_earn(
        &self,
        user_id: &str,
        venue_id: &str,
        points: Points,
    ) -> LedgerResult<UserVenueBalance> {
        non_negative(points)?;
        let p = to_hundredths(points)?;
        let updated = self.conn.execute(
            "UPDATE user_venue_balance
             SET points_earned = points_earned - ?1,
                 points_available = points_available - ?1
             WHERE user_id = ?2 AND venue_id = ?3
               AND points_available >= ?1 AND points_earned >= ?1",
            params![p, user_id, venue_id],
        )?;
        if updated == 0 {
            let available = self
                .balance(user_id, venue_id)?
                .map_or(Decimal::ZERO, |b| b.points_available);
            return Err(LedgerError::ReversalExceedsBalance {
                user_id: user_id.to_string(),
                venue_id: venue_id.to_string(),
                available,
                required: points,
            });
        }
        self.ensure_balance(user_id, venue_id)
    }

    /// Give back points that were spent.
    pub fn reverse_spend(
        &self,
        user_id: &str,
        venue_id: &str,
        points: Points,
    ) -> LedgerResult<UserVenueBalance> {
        non_negative(points)?;
        let p = to_hundredths(points)?;
        let updated = self.conn.execute(
            "UPDATE user_venue_balance
             SET points_spent = points_spent - ?1,
                 points_available = points_available + ?1
             WHERE user_id = ?2 AND venue_id = ?3 AND points_spent >= ?1",
            params![p, user_id, venue_id],
        )?;
        if updated == 0 {
            return Err(anyhow::anyhow!(
                "cannot restore {points} spent points for {user_id} at {venue_id}"
            )
            .into());
        }
        self.ensure_balance(user_id, venue_id)
    }

    pub fn save_streak(&self, balance: &UserVenueBalance) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE user_venue_balance
             SET current_streak = ?1, longest_streak = ?2, last_visit_date = ?3, total_visits = ?4
             WHERE user_id = ?5 AND venue_id = ?6",
            params![
                balance.current_streak as i64,
                balance.longest_streak as i64,
                balance.last_visit_date,
                balance.total_visits as i64,
                balance.user_id,
                balance.venue_id,
            ],
        )?;
        Ok(())
    }

    /// Every venue balance a user holds, ordered by venue.
    pub fn balances_for_user(&self, user_id: &str) -> LedgerResult<Vec<UserVenueBalance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS} FROM user_venue_balance
             WHERE user_id = ?1 ORDER BY venue_id"
        ))?;
        let rows = stmt
            .query_map(params![user_id], balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn all_balances(&self) -> LedgerResult<Vec<UserVenueBalance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS} FROM user_venue_balance ORDER BY user_id, venue_id"
        ))?;
        let rows = stmt
            .query_map([], balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
