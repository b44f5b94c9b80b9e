//! Referral network: five-level chains frozen at sign-up, and the payout
//! of a flat share of every purchase to each upstream referrer.

use crate::{
    error::{LedgerError, LedgerResult},
    points::PointsCalculator,
    store::Ledger,
    transaction::{Transaction, TransactionKind},
    types::{Points, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MAX_REFERRAL_LEVELS: usize = 5;

/// Upstream referrers of one user. Index 0 is level 1 (direct referrer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralChain {
    pub user_id:        UserId,
    pub referrers:      [Option<UserId>; MAX_REFERRAL_LEVELS],
    pub level_earnings: [Points; MAX_REFERRAL_LEVELS],
    pub created_at:     DateTime<Utc>,
}

impl ReferralChain {
    /// Chain for a user who signed up with `referrer_id`'s code: the
    /// referrer becomes level 1 and the referrer's own chain shifts down
    /// one level, dropping its fifth.
    pub fn extend(
        user_id: &str,
        referrer_id: &str,
        referrer_chain: Option<&ReferralChain>,
        now: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        if user_id == referrer_id {
            return Err(LedgerError::SelfReferral { user_id: user_id.to_string() });
        }
        let mut referrers: [Option<UserId>; MAX_REFERRAL_LEVELS] = Default::default();
        referrers[0] = Some(referrer_id.to_string());
        if let Some(upstream) = referrer_chain {
            for level in 1..MAX_REFERRAL_LEVELS {
                referrers[level] = upstream.referrers[level - 1].clone();
            }
        }
        Ok(Self {
            user_id: user_id.to_string(),
            referrers,
            level_earnings: [Decimal::ZERO; MAX_REFERRAL_LEVELS],
            created_at: now,
        })
    }

    /// (level, referrer) from level 1 up to the first gap.
    pub fn levels(&self) -> impl Iterator<Item = (u8, &UserId)> {
        self.referrers
            .iter()
            .map_while(|r| r.as_ref())
            .zip(1u8..)
            .map(|(referrer, level)| (level, referrer))
    }

    pub fn depth(&self) -> usize {
        self.levels().count()
    }

    pub fn referrer_at(&self, level: u8) -> Option<&UserId> {
        let idx = usize::from(level).checked_sub(1)?;
        self.referrers.get(idx)?.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ReferralRewarder {
    calculator: PointsCalculator,
    max_levels: usize,
}

impl ReferralRewarder {
    pub fn new(calculator: PointsCalculator, max_levels: usize) -> Self {
        Self {
            calculator,
            max_levels: max_levels.min(MAX_REFERRAL_LEVELS),
        }
    }

    /// Credit every referrer in `purchaser`'s chain with the referral share
    /// of `points_earned` at the purchase venue.
    ///
    /// Must run once per completed purchase: every call credits again.
    /// Any failure propagates so the enclosing unit of work rolls back the
    /// whole payout.
    pub fn distribute(
        &self,
        ledger: &Ledger<'_>,
        purchaser: &str,
        venue_id: &str,
        points_earned: Points,
        origin: &Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>> {
        let Some(chain) = ledger.referral_chain(purchaser)? else {
            return Ok(Vec::new());
        };

        let reward = self.calculator.referral_reward(points_earned);
        if reward <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        // earn() creates a referrer's balance row at this venue if needed.
        let mut bonuses = Vec::new();
        for (level, referrer) in chain.levels().take(self.max_levels) {
            ledger.earn(referrer, venue_id, reward)?;
            ledger.add_referral_earnings(purchaser, level, reward)?;

            let mut txn = Transaction::bonus(
                TransactionKind::ReferralBonus,
                referrer,
                venue_id,
                reward,
                &origin.transaction_id,
                format!("Referral bonus (Level {level}) - {reward:.2} points"),
                now,
            );
            txn.referral_level = Some(level);
            ledger.insert_transaction(&txn)?;

            log::debug!(
                "venue={venue_id} referral: level {level} {referrer} +{reward} from {purchaser}"
            );
            bonuses.push(txn);
        }
        Ok(bonuses)
    }
}
