//! Per-user, per-venue point balance and visit-streak state.
//!
//! Points earned at a venue can only ever be spent at that venue, so there
//! is exactly one row per (user, venue) and no cross-venue total.

use crate::types::{Points, UserId, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVenueBalance {
    pub user_id:          UserId,
    pub venue_id:         VenueId,
    pub points_earned:    Points,
    pub points_spent:     Points,
    pub points_available: Points,
    pub current_streak:   u32,
    pub longest_streak:   u32,
    pub last_visit_date:  Option<DateTime<Utc>>,
    pub total_visits:     u32,
}

impl UserVenueBalance {
    pub fn empty(user_id: impl Into<UserId>, venue_id: impl Into<VenueId>) -> Self {
        Self {
            user_id:          user_id.into(),
            venue_id:         venue_id.into(),
            points_earned:    Decimal::ZERO,
            points_spent:     Decimal::ZERO,
            points_available: Decimal::ZERO,
            current_streak:   0,
            longest_streak:   0,
            last_visit_date:  None,
            total_visits:     0,
        }
    }

    /// available == earned - spent, nothing negative.
    pub fn is_consistent(&self) -> bool {
        self.points_earned >= Decimal::ZERO
            && self.points_spent >= Decimal::ZERO
            && self.points_available >= Decimal::ZERO
            && self.points_available == self.points_earned - self.points_spent
    }
}
