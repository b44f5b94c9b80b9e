//! Audit events.
//!
//! Every committed settlement, refund, adjustment and registration appends
//! its events to `event_log` inside the same SQLite transaction, so the log
//! never describes work that was rolled back.

use crate::types::{Points, TransactionId, UserId, VenueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Purchases ──────────────────────────────────
    PointsSpent {
        transaction_id: TransactionId,
        user_id: UserId,
        venue_id: VenueId,
        points: Points,
    },
    PurchaseSettled {
        transaction_id: TransactionId,
        user_id: UserId,
        venue_id: VenueId,
        amount_total: Points,
        amount_cash: Points,
        points_earned: Points,
        points_spent: Points,
    },
    StreakMilestoneReached {
        transaction_id: TransactionId,
        user_id: UserId,
        venue_id: VenueId,
        streak_days: u32,
        bonus: Points,
    },
    ReferralRewardPaid {
        transaction_id: TransactionId,
        referrer_id: UserId,
        purchaser_id: UserId,
        venue_id: VenueId,
        level: u8,
        points: Points,
    },

    // ── Corrections ────────────────────────────────
    PurchaseRefunded {
        transaction_id: TransactionId,
        original_transaction_id: TransactionId,
        user_id: UserId,
        venue_id: VenueId,
        points_reversed: Points,
        points_restored: Points,
        bonuses_reversed: usize,
    },
    PointsAdjusted {
        transaction_id: TransactionId,
        user_id: UserId,
        venue_id: VenueId,
        delta: Points,
        reason: String,
    },

    // ── Network ────────────────────────────────────
    ReferralRegistered {
        user_id: UserId,
        referrer_id: UserId,
        depth: usize,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PointsSpent { .. }            => "points_spent",
            Self::PurchaseSettled { .. }        => "purchase_settled",
            Self::StreakMilestoneReached { .. } => "streak_milestone_reached",
            Self::ReferralRewardPaid { .. }     => "referral_reward_paid",
            Self::PurchaseRefunded { .. }       => "purchase_refunded",
            Self::PointsAdjusted { .. }         => "points_adjusted",
            Self::ReferralRegistered { .. }     => "referral_registered",
        }
    }

    /// The transaction this event is about, if any.
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::PointsSpent { transaction_id, .. }
            | Self::PurchaseSettled { transaction_id, .. }
            | Self::StreakMilestoneReached { transaction_id, .. }
            | Self::ReferralRewardPaid { transaction_id, .. }
            | Self::PurchaseRefunded { transaction_id, .. }
            | Self::PointsAdjusted { transaction_id, .. } => Some(transaction_id),
            Self::ReferralRegistered { .. } => None,
        }
    }
}

/// A persisted row of `event_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:             Option<i64>,
    pub transaction_id: Option<TransactionId>,
    pub event_type:     String,
    pub payload:        String, // JSON-serialized LedgerEvent
    pub created_at:     DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(event: &LedgerEvent, now: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            id:             None,
            transaction_id: event.transaction_id().map(str::to_string),
            event_type:     event.event_type().to_string(),
            payload:        serde_json::to_string(event)?,
            created_at:     now,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn payload_is_tagged_with_event_type() {
        let event = LedgerEvent::PointsSpent {
            transaction_id: "t1".into(),
            user_id: "u1".into(),
            venue_id: "v1".into(),
            points: Decimal::new(500, 2),
        };
        let entry = EventLogEntry::new(&event, chrono::Utc::now()).unwrap();
        assert_eq!(entry.event_type, "points_spent");
        assert_eq!(entry.transaction_id.as_deref(), Some("t1"));
        assert!(entry.payload.contains("\"type\":\"points_spent\""));
        assert_eq!(entry.decode().unwrap(), event);
    }
}
