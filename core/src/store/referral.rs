use super::{hundredths_at, to_hundredths, Ledger};
use crate::{
    error::{LedgerError, LedgerResult},
    referral::ReferralChain,
    types::Points,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn chain_from_row(row: &Row<'_>) -> rusqlite::Result<ReferralChain> {
    Ok(ReferralChain {
        user_id: row.get(0)?,
        referrers: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
        level_earnings: [
            hundredths_at(row, 6)?,
            hundredths_at(row, 7)?,
            hundredths_at(row, 8)?,
            hundredths_at(row, 9)?,
            hundredths_at(row, 10)?,
        ],
        created_at: row.get(11)?,
    })
}

impl Ledger<'_> {
    pub fn referral_chain(&self, user_id: &str) -> LedgerResult<Option<ReferralChain>> {
        let chain = self
            .conn
            .query_row(
                "SELECT user_id,
                        level1_referrer, level2_referrer, level3_referrer, level4_referrer, level5_referrer,
                        level1_earnings, level2_earnings, level3_earnings, level4_earnings, level5_earnings,
                        created_at
                 FROM referral_chain WHERE user_id = ?1",
                params![user_id],
                chain_from_row,
            )
            .optional()?;
        Ok(chain)
    }

    pub fn insert_referral_chain(&self, chain: &ReferralChain) -> LedgerResult<()> {
        let [l1, l2, l3, l4, l5] = &chain.referrers;
        self.conn.execute(
            "INSERT INTO referral_chain (
                user_id, level1_referrer, level2_referrer, level3_referrer,
                level4_referrer, level5_referrer, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![chain.user_id, l1, l2, l3, l4, l5, chain.created_at],
        )?;
        Ok(())
    }

    /// Freeze `user_id`'s chain under `referrer_id`. Chains are written once.
    pub fn register_referral(
        &self,
        user_id: &str,
        referrer_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<ReferralChain> {
        if self.referral_chain(user_id)?.is_some() {
            return Err(LedgerError::ReferralChainExists { user_id: user_id.to_string() });
        }
        let upstream = self.referral_chain(referrer_id)?;
        let chain = ReferralChain::extend(user_id, referrer_id, upstream.as_ref(), now)?;
        self.insert_referral_chain(&chain)?;
        Ok(chain)
    }

    /// Add to the running total paid out at `level` of `user_id`'s chain.
    pub fn add_referral_earnings(
        &self,
        user_id: &str,
        level: u8,
        points: Points,
    ) -> LedgerResult<()> {
        let sql = match level {
            1 => "UPDATE referral_chain SET level1_earnings = level1_earnings + ?1 WHERE user_id = ?2",
            2 => "UPDATE referral_chain SET level2_earnings = level2_earnings + ?1 WHERE user_id = ?2",
            3 => "UPDATE referral_chain SET level3_earnings = level3_earnings + ?1 WHERE user_id = ?2",
            4 => "UPDATE referral_chain SET level4_earnings = level4_earnings + ?1 WHERE user_id = ?2",
            5 => "UPDATE referral_chain SET level5_earnings = level5_earnings + ?1 WHERE user_id = ?2",
            other => return Err(anyhow::anyhow!("referral level {other} out of range").into()),
        };
        self.conn.execute(sql, params![to_hundredths(points)?, user_id])?;
        Ok(())
    }
}
