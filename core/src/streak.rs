//! Visit streaks: consecutive calendar days (UTC) with at least one visit.
//!
//!   no prior visit      → streak 1, visits 1
//!   same day            → unchanged
//!   earlier day         → unchanged (clock behind the last visit)
//!   next day            → streak + 1, visits + 1, milestone bonus on an exact hit
//!   any larger gap      → streak 1, visits + 1
//!
//! Milestones fire only on an exact match, so each pays once per run of
//! consecutive days.

use crate::{
    balance::UserVenueBalance,
    config::{LedgerConfig, StreakMilestone},
    error::LedgerResult,
    store::Ledger,
    transaction::{Transaction, TransactionKind},
    types::Points,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    FirstVisit,
    SameDay,
    Continued,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub outcome: VisitOutcome,
    pub streak:  u32,
    pub bonus:   Option<Points>,
}

#[derive(Debug, Clone)]
pub struct StreakTracker {
    milestones: Vec<StreakMilestone>,
}

impl StreakTracker {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            milestones: config.streak_milestones.clone(),
        }
    }

    /// Advance the streak fields on `balance` for a visit at `now`.
    /// Touches nothing else; crediting the bonus is the caller's job.
    pub fn record_visit(&self, balance: &mut UserVenueBalance, now: DateTime<Utc>) -> StreakUpdate {
        let today = now.date_naive();

        let outcome = match balance.last_visit_date {
            None => VisitOutcome::FirstVisit,
            Some(last) => match (today - last.date_naive()).num_days() {
                i64::MIN..=0 => VisitOutcome::SameDay,
                1 => VisitOutcome::Continued,
                _ => VisitOutcome::Reset,
            },
        };

        let mut bonus = None;
        match outcome {
            VisitOutcome::SameDay => {}
            VisitOutcome::FirstVisit => {
                balance.current_streak = 1;
                balance.total_visits = 1;
                balance.last_visit_date = Some(now);
            }
            VisitOutcome::Continued => {
                balance.current_streak += 1;
                balance.total_visits += 1;
                balance.last_visit_date = Some(now);
                bonus = self
                    .milestones
                    .iter()
                    .find(|m| m.days == balance.current_streak)
                    .map(|m| m.bonus);
            }
            VisitOutcome::Reset => {
                balance.current_streak = 1;
                balance.total_visits += 1;
                balance.last_visit_date = Some(now);
            }
        }
        balance.longest_streak = balance.longest_streak.max(balance.current_streak);

        StreakUpdate {
            outcome,
            streak: balance.current_streak,
            bonus,
        }
    }

    /// Record the visit on the stored balance row and pay any milestone
    /// bonus into it. Returns the bonus transaction when one was paid.
    pub fn apply(
        &self,
        ledger: &Ledger<'_>,
        mut balance: UserVenueBalance,
        origin: &Transaction,
        now: DateTime<Utc>,
    ) -> LedgerResult<(StreakUpdate, Option<Transaction>)> {
        let update = self.record_visit(&mut balance, now);
        if update.outcome == VisitOutcome::SameDay {
            return Ok((update, None));
        }
        ledger.save_streak(&balance)?;

        log::debug!(
            "user={} venue={} streak: {:?} → {} days",
            balance.user_id,
            balance.venue_id,
            update.outcome,
            update.streak
        );

        let Some(points) = update.bonus else {
            return Ok((update, None));
        };

        ledger.earn(&balance.user_id, &balance.venue_id, points)?;
        let txn = Transaction::bonus(
            TransactionKind::StreakBonus,
            &balance.user_id,
            &balance.venue_id,
            points,
            &origin.transaction_id,
            format!("Streak milestone bonus - {} day streak!", update.streak),
            now,
        );
        ledger.insert_transaction(&txn)?;
        Ok((update, Some(txn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn tracker() -> StreakTracker {
        StreakTracker::new(&LedgerConfig::default())
    }

    fn evening(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 21, 30, 0).unwrap()
    }

    #[test]
    fn first_visit_starts_streak() {
        let mut b = UserVenueBalance::empty("u", "v");
        let up = tracker().record_visit(&mut b, evening(1));
        assert_eq!(up.outcome, VisitOutcome::FirstVisit);
        assert_eq!((b.current_streak, b.total_visits), (1, 1));
        assert_eq!(up.bonus, None);
    }

    #[test]
    fn same_day_is_idempotent() {
        let t = tracker();
        let mut b = UserVenueBalance::empty("u", "v");
        t.record_visit(&mut b, evening(1));
        let before = b.clone();
        let up = t.record_visit(&mut b, evening(1) + Duration::hours(2));
        assert_eq!(up.outcome, VisitOutcome::SameDay);
        assert_eq!(b, before);
    }

    #[test]
    fn seventh_consecutive_day_pays_once() {
        let t = tracker();
        let mut b = UserVenueBalance::empty("u", "v");
        let bonuses: Vec<_> = (1..=8).map(|day| t.record_visit(&mut b, evening(day)).bonus).collect();
        assert_eq!(bonuses[5], None);
        assert_eq!(bonuses[6], Some(Decimal::new(50, 0)));
        assert_eq!(bonuses[7], None);
        assert_eq!(b.current_streak, 8);
        assert_eq!(b.longest_streak, 8);
    }

    #[test]
    fn gap_resets_but_keeps_longest() {
        let t = tracker();
        let mut b = UserVenueBalance::empty("u", "v");
        for day in 1..=3 {
            t.record_visit(&mut b, evening(day));
        }
        let up = t.record_visit(&mut b, evening(5));
        assert_eq!(up.outcome, VisitOutcome::Reset);
        assert_eq!(b.current_streak, 1);
        assert_eq!(b.longest_streak, 3);
        assert_eq!(b.total_visits, 4);
    }

    #[test]
    fn visit_before_last_visit_leaves_streak_alone() {
        let t = tracker();
        let mut b = UserVenueBalance::empty("u", "v");
        for day in 5..=6 {
            t.record_visit(&mut b, evening(day));
        }
        let before = b.clone();
        let up = t.record_visit(&mut b, evening(3));
        assert_eq!(up.outcome, VisitOutcome::SameDay);
        assert_eq!(b, before);
        assert_eq!(b.last_visit_date, Some(evening(6)));
    }

    #[test]
    fn late_night_and_early_morning_are_consecutive_days() {
        let t = tracker();
        let mut b = UserVenueBalance::empty("u", "v");
        t.record_visit(&mut b, Utc.with_ymd_and_hms(2024, 3, 1, 23, 55, 0).unwrap());
        let up = t.record_visit(&mut b, Utc.with_ymd_and_hms(2024, 3, 2, 0, 10, 0).unwrap());
        assert_eq!(up.outcome, VisitOutcome::Continued);
        assert_eq!(b.current_streak, 2);
    }
}
