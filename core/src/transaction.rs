//! Append-only transaction records and their status machine.

use crate::{
    error::{LedgerError, LedgerResult},
    request::LineItem,
    types::{Money, Points, TransactionId, UserId, VenueId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    PointsRedemption,
    ReferralBonus,
    StreakBonus,
    AdminAdjustment,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase         => "purchase",
            Self::PointsRedemption => "points_redemption",
            Self::ReferralBonus    => "referral_bonus",
            Self::StreakBonus      => "streak_bonus",
            Self::AdminAdjustment  => "admin_adjustment",
            Self::Refund           => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "purchase"          => Self::Purchase,
            "points_redemption" => Self::PointsRedemption,
            "referral_bonus"    => Self::ReferralBonus,
            "streak_bonus"      => Self::StreakBonus,
            "admin_adjustment"  => Self::AdminAdjustment,
            "refund"            => Self::Refund,
            _ => return None,
        })
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///   pending → completed → refunded
///   pending → failed | cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Completed => "completed",
            Self::Failed    => "failed",
            Self::Refunded  => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending"   => Self::Pending,
            "completed" => Self::Completed,
            "failed"    => Self::Failed,
            "refunded"  => Self::Refunded,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Refunded)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id:          TransactionId,
    pub user_id:                 UserId,
    pub venue_id:                VenueId,
    pub kind:                    TransactionKind,
    pub status:                  TransactionStatus,
    pub amount_total:            Money,
    pub amount_cash:             Money,
    pub amount_points:           Money,
    pub points_earned:           Points,
    pub points_spent:            Points,
    pub payment_method:          Option<String>,
    pub line_items:              Vec<LineItem>,
    /// 1..=5 on referral bonuses.
    pub referral_level:          Option<u8>,
    /// The purchase that triggered a bonus, or the purchase a refund reverses.
    pub original_transaction_id: Option<TransactionId>,
    pub idempotency_key:         Option<String>,
    pub description:             String,
    pub created_at:              DateTime<Utc>,
    pub completed_at:            Option<DateTime<Utc>>,
    pub refunded_at:             Option<DateTime<Utc>>,
}

impl Transaction {
    /// A pending record with zero amounts. Callers fill in the rest.
    pub fn pending(
        kind: TransactionKind,
        user_id: &str,
        venue_id: &str,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id:          Uuid::new_v4().to_string(),
            user_id:                 user_id.to_string(),
            venue_id:                venue_id.to_string(),
            kind,
            status:                  TransactionStatus::Pending,
            amount_total:            Decimal::ZERO,
            amount_cash:             Decimal::ZERO,
            amount_points:           Decimal::ZERO,
            points_earned:           Decimal::ZERO,
            points_spent:            Decimal::ZERO,
            payment_method:          None,
            line_items:              Vec::new(),
            referral_level:          None,
            original_transaction_id: None,
            idempotency_key:         None,
            description:             description.into(),
            created_at:              now,
            completed_at:            None,
            refunded_at:             None,
        }
    }

    /// A completed points-only credit (streak or referral bonus).
    pub fn bonus(
        kind: TransactionKind,
        user_id: &str,
        venue_id: &str,
        points: Points,
        origin: &str,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut txn = Self::pending(kind, user_id, venue_id, description, now);
        txn.points_earned = points;
        txn.original_transaction_id = Some(origin.to_string());
        txn.status = TransactionStatus::Completed;
        txn.completed_at = Some(now);
        txn
    }

    /// Move along the status machine, stamping the matching timestamp.
    pub fn transition(&mut self, next: TransactionStatus, now: DateTime<Utc>) -> LedgerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                transaction_id: self.transaction_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            TransactionStatus::Completed => self.completed_at = Some(now),
            TransactionStatus::Refunded  => self.refunded_at = Some(now),
            _ => {}
        }
        Ok(())
    }
}
