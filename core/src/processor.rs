//! TransactionProcessor: the orchestrator.
//!
//! Purchase settlement, in one atomic unit of work:
//!
//!   1. load venue (must exist and be active)
//!   2. validate amounts
//!   3. spend points, if any are used
//!   4. compute points earned on the cash portion
//!   5. record the purchase as completed
//!   6. credit the earned points
//!   7. advance the visit streak (may pay a milestone bonus)
//!   8. pay referral rewards on the points from step 4
//!   9. bump venue aggregates
//!
//! Any error rolls the whole unit back. Refunds, admin adjustments,
//! referral registration and owner configuration changes run as their own
//! units through the same store.

use crate::{
    clock::{Clock, SystemClock},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    points::{OrderLine, PointsCalculator},
    product::{Product, ProductUpdate},
    referral::{ReferralChain, ReferralRewarder},
    request::{AuthenticatedUser, PurchaseRequest},
    store::{Ledger, LedgerStore},
    streak::StreakTracker,
    transaction::{Transaction, TransactionKind, TransactionStatus},
    types::{is_whole_cents, Points},
    venue::{Venue, VenueUpdate},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Everything a settled purchase produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub transaction:      Transaction,
    pub streak_bonus:     Option<Transaction>,
    pub referral_bonuses: Vec<Transaction>,
    pub events:           Vec<LedgerEvent>,
    /// True when an earlier settlement with the same idempotency key was
    /// returned instead of settling again.
    pub replayed:         bool,
}

impl Settlement {
    /// Points credited to the purchaser: the purchase itself plus any streak
    /// bonus. Referral payouts are in `referral_points_paid`.
    pub fn total_points_issued(&self) -> Points {
        self.transaction.points_earned
            + self.streak_bonus.as_ref().map_or(Decimal::ZERO, |t| t.points_earned)
    }

    /// Points credited to referrers across every level.
    pub fn referral_points_paid(&self) -> Points {
        self.referral_bonuses.iter().map(|t| t.points_earned).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Refund {
    pub refund:           Transaction,
    pub original:         Transaction,
    pub reversed_bonuses: Vec<Transaction>,
    pub events:           Vec<LedgerEvent>,
}

pub struct TransactionProcessor {
    config:     LedgerConfig,
    calculator: PointsCalculator,
    streaks:    StreakTracker,
    referrals:  ReferralRewarder,
    clock:      Arc<dyn Clock>,
}

impl TransactionProcessor {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let calculator = PointsCalculator::new(&config);
        Self {
            streaks: StreakTracker::new(&config),
            referrals: ReferralRewarder::new(calculator.clone(), config.max_referral_levels),
            calculator,
            config,
            clock,
        }
    }

    pub fn with_system_clock(config: LedgerConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn calculator(&self) -> &PointsCalculator {
        &self.calculator
    }

    // ── Purchases ──────────────────────────────────────────────

    /// Settle one purchase for `user`. See the module docs for the steps.
    pub fn create_transaction(
        &self,
        store: &mut LedgerStore,
        user: &AuthenticatedUser,
        request: &PurchaseRequest,
    ) -> LedgerResult<Settlement> {
        let now = self.clock.now();
        let result = store.atomically(|ledger| self.settle(ledger, user, request, now));

        match &result {
            Ok(s) if s.replayed => log::info!(
                "venue={} user={} replayed txn={} key={:?}",
                request.venue_id,
                user.user_id,
                s.transaction.transaction_id,
                request.idempotency_key
            ),
            Ok(s) => log::info!(
                "venue={} user={} settled txn={} total={} cash={} earned={} spent={} referrals={}",
                request.venue_id,
                user.user_id,
                s.transaction.transaction_id,
                s.transaction.amount_total,
                s.transaction.amount_cash,
                s.transaction.points_earned,
                s.transaction.points_spent,
                s.referral_bonuses.len()
            ),
            Err(e) => log::warn!(
                "venue={} user={} purchase rejected: {e}",
                request.venue_id,
                user.user_id
            ),
        }
        result
    }

    fn settle(
        &self,
        ledger: &Ledger<'_>,
        user: &AuthenticatedUser,
        request: &PurchaseRequest,
        now: DateTime<Utc>,
    ) -> LedgerResult<Settlement> {
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = ledger.find_by_idempotency_key(&user.user_id, key)? {
                let same_purchase = existing.venue_id == request.venue_id
                    && existing.amount_total == request.amount_total
                    && existing.amount_cash == request.amount_cash
                    && existing.amount_points == request.amount_points;
                if !same_purchase {
                    return Err(LedgerError::IdempotencyKeyReused { key: key.clone() });
                }
                return self.replay(ledger, existing);
            }
        }

        // 1. Venue
        let venue = ledger.require_venue(&request.venue_id)?;
        if !venue.is_active {
            return Err(LedgerError::VenueInactive { venue_id: venue.venue_id });
        }

        // 2. Amounts
        request.validate(self.config.amount_tolerance)?;

        let mut txn = Transaction::pending(
            TransactionKind::Purchase,
            &user.user_id,
            &venue.venue_id,
            format!("Purchase at {}", venue.name),
            now,
        );
        txn.amount_total = request.amount_total;
        txn.amount_cash = request.amount_cash;
        txn.amount_points = request.amount_points;
        txn.payment_method = request.payment_method.clone();
        txn.line_items = request.line_items.clone();
        txn.idempotency_key = request.idempotency_key.clone();

        let mut events = Vec::new();

        // 3. Spend
        if request.amount_points > Decimal::ZERO {
            ledger.spend(&user.user_id, &venue.venue_id, request.amount_points)?;
            txn.points_spent = request.amount_points;
            events.push(LedgerEvent::PointsSpent {
                transaction_id: txn.transaction_id.clone(),
                user_id: user.user_id.clone(),
                venue_id: venue.venue_id.clone(),
                points: request.amount_points,
            });
        }

        // 4. Earn (computed)
        txn.points_earned = self.order_points(ledger, &venue, request, now)?;
        log::debug!(
            "venue={} user={} cash={} lines={} → {} points",
            venue.venue_id,
            user.user_id,
            request.amount_cash,
            request.line_items.len(),
            txn.points_earned
        );

        // 5. Record
        txn.transition(TransactionStatus::Completed, now)?;
        ledger.insert_transaction(&txn)?;

        // 6. Credit
        if txn.points_earned > Decimal::ZERO {
            ledger.earn(&user.user_id, &venue.venue_id, txn.points_earned)?;
        }
        events.push(LedgerEvent::PurchaseSettled {
            transaction_id: txn.transaction_id.clone(),
            user_id: user.user_id.clone(),
            venue_id: venue.venue_id.clone(),
            amount_total: txn.amount_total,
            amount_cash: txn.amount_cash,
            points_earned: txn.points_earned,
            points_spent: txn.points_spent,
        });

        // 7. Streak (only once a balance row exists)
        let mut streak_bonus = None;
        if let Some(balance) = ledger.balance(&user.user_id, &venue.venue_id)? {
            let (update, bonus) = self.streaks.apply(ledger, balance, &txn, now)?;
            if let Some(bonus) = bonus {
                log::info!(
                    "venue={} user={} streak milestone {} days +{}",
                    venue.venue_id,
                    user.user_id,
                    update.streak,
                    bonus.points_earned
                );
                events.push(LedgerEvent::StreakMilestoneReached {
                    transaction_id: bonus.transaction_id.clone(),
                    user_id: user.user_id.clone(),
                    venue_id: venue.venue_id.clone(),
                    streak_days: update.streak,
                    bonus: bonus.points_earned,
                });
                streak_bonus = Some(bonus);
            }
        }

        // 8. Referrals, on the purchase points only
        let referral_bonuses = self.referrals.distribute(
            ledger,
            &user.user_id,
            &venue.venue_id,
            txn.points_earned,
            &txn,
            now,
        )?;
        for bonus in &referral_bonuses {
            events.push(LedgerEvent::ReferralRewardPaid {
                transaction_id: bonus.transaction_id.clone(),
                referrer_id: bonus.user_id.clone(),
                purchaser_id: user.user_id.clone(),
                venue_id: venue.venue_id.clone(),
                level: bonus.referral_level.unwrap_or_default(),
                points: bonus.points_earned,
            });
        }

        // 9. Venue aggregates
        ledger.add_venue_stats(&venue.venue_id, txn.amount_cash, txn.points_earned)?;

        ledger.append_events(&events, now)?;
        Ok(Settlement {
            transaction: txn,
            streak_bonus,
            referral_bonuses,
            events,
            replayed: false,
        })
    }

    /// Resolve line items against stored products, then score the order.
    fn order_points(
        &self,
        ledger: &Ledger<'_>,
        venue: &Venue,
        request: &PurchaseRequest,
        now: DateTime<Utc>,
    ) -> LedgerResult<Points> {
        let products = request
            .line_items
            .iter()
            .map(|item| {
                item.product_id
                    .as_deref()
                    .map(|id| ledger.product_at_venue(&venue.venue_id, id))
                    .transpose()
            })
            .collect::<LedgerResult<Vec<Option<Product>>>>()?;

        let lines = request
            .line_items
            .iter()
            .zip(&products)
            .map(|(item, product)| {
                item.total().map(|amount| OrderLine {
                    amount,
                    category: item.category.as_deref(),
                    product: product.as_ref(),
                })
            })
            .collect::<LedgerResult<Vec<OrderLine<'_>>>>()?;

        Ok(self
            .calculator
            .order_points(request.amount_cash, venue, &lines, now))
    }

    /// Rebuild the settlement of an already-recorded purchase.
    fn replay(&self, ledger: &Ledger<'_>, txn: Transaction) -> LedgerResult<Settlement> {
        let streak_bonus = ledger
            .transactions_referencing(&txn.transaction_id, TransactionKind::StreakBonus)?
            .into_iter()
            .next();
        let referral_bonuses =
            ledger.transactions_referencing(&txn.transaction_id, TransactionKind::ReferralBonus)?;

        let mut events = Vec::new();
        let ids = std::iter::once(&txn)
            .chain(streak_bonus.iter())
            .chain(referral_bonuses.iter())
            .map(|t| t.transaction_id.as_str());
        for id in ids {
            for entry in ledger.events_for_transaction(id)? {
                events.push(entry.decode()?);
            }
        }

        Ok(Settlement {
            transaction: txn,
            streak_bonus,
            referral_bonuses,
            events,
            replayed: true,
        })
    }

    // ── Corrections ────────────────────────────────────────────

    /// Undo a completed purchase: the purchaser's earned and spent points,
    /// every referral bonus it paid, and the venue aggregates. Streak state
    /// and streak bonuses stand.
    ///
    /// Fails without touching anything if any of those points have since
    /// been spent.
    pub fn refund_transaction(
        &self,
        store: &mut LedgerStore,
        transaction_id: &str,
        reason: &str,
    ) -> LedgerResult<Refund> {
        let now = self.clock.now();
        let result = store.atomically(|ledger| self.refund(ledger, transaction_id, reason, now));
        match &result {
            Ok(r) => log::info!(
                "venue={} user={} refunded txn={} reversed={} restored={} bonuses={}",
                r.original.venue_id,
                r.original.user_id,
                r.original.transaction_id,
                r.original.points_earned,
                r.original.points_spent,
                r.reversed_bonuses.len()
            ),
            Err(e) => log::warn!("txn={transaction_id} refund rejected: {e}"),
        }
        result
    }

    fn refund(
        &self,
        ledger: &Ledger<'_>,
        transaction_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<Refund> {
        let mut original = ledger.require_transaction(transaction_id)?;
        if original.kind != TransactionKind::Purchase {
            return Err(LedgerError::NotRefundable {
                transaction_id: original.transaction_id,
                kind: original.kind,
            });
        }
        original.transition(TransactionStatus::Refunded, now)?;

        let user_id = original.user_id.clone();
        let venue_id = original.venue_id.clone();

        // Restore first so a purchaser who paid with points can always
        // absorb the reversal of what the same purchase earned them.
        if original.points_spent > Decimal::ZERO {
            ledger.reverse_spend(&user_id, &venue_id, original.points_spent)?;
        }
        if original.points_earned > Decimal::ZERO {
            ledger.reverse_earn(&user_id, &venue_id, original.points_earned)?;
        }

        let mut reversed_bonuses = Vec::new();
        for mut bonus in
            ledger.transactions_referencing(transaction_id, TransactionKind::ReferralBonus)?
        {
            if bonus.status != TransactionStatus::Completed {
                continue;
            }
            ledger.reverse_earn(&bonus.user_id, &bonus.venue_id, bonus.points_earned)?;
            if let Some(level) = bonus.referral_level {
                ledger.add_referral_earnings(&user_id, level, -bonus.points_earned)?;
            }
            bonus.transition(TransactionStatus::Refunded, now)?;
            ledger.update_transaction_status(&bonus)?;
            reversed_bonuses.push(bonus);
        }

        ledger.add_venue_stats(&venue_id, -original.amount_cash, -original.points_earned)?;
        ledger.update_transaction_status(&original)?;

        let mut refund = Transaction::pending(TransactionKind::Refund, &user_id, &venue_id, reason, now);
        refund.amount_total = original.amount_total;
        refund.amount_cash = original.amount_cash;
        refund.amount_points = original.amount_points;
        refund.points_earned = original.points_spent;
        refund.points_spent = original.points_earned;
        refund.original_transaction_id = Some(original.transaction_id.clone());
        refund.transition(TransactionStatus::Completed, now)?;
        ledger.insert_transaction(&refund)?;

        let events = vec![LedgerEvent::PurchaseRefunded {
            transaction_id: refund.transaction_id.clone(),
            original_transaction_id: original.transaction_id.clone(),
            user_id,
            venue_id,
            points_reversed: original.points_earned,
            points_restored: original.points_spent,
            bonuses_reversed: reversed_bonuses.len(),
        }];
        ledger.append_events(&events, now)?;

        Ok(Refund {
            refund,
            original,
            reversed_bonuses,
            events,
        })
    }

    /// Manual credit (positive `delta`) or debit (negative) at one venue.
    pub fn adjust_points(
        &self,
        store: &mut LedgerStore,
        user_id: &str,
        venue_id: &str,
        delta: Points,
        reason: &str,
    ) -> LedgerResult<Transaction> {
        let now = self.clock.now();
        let result = store.atomically(|ledger| {
            if delta.is_zero() {
                return Err(LedgerError::ZeroAdjustment);
            }
            if !is_whole_cents(delta) {
                return Err(LedgerError::SubCentAmount { field: "delta", value: delta });
            }
            ledger.require_venue(venue_id)?;

            let mut txn = Transaction::pending(
                TransactionKind::AdminAdjustment,
                user_id,
                venue_id,
                reason,
                now,
            );
            if delta > Decimal::ZERO {
                ledger.earn(user_id, venue_id, delta)?;
                txn.points_earned = delta;
            } else {
                ledger.spend(user_id, venue_id, -delta)?;
                txn.points_spent = -delta;
            }
            txn.transition(TransactionStatus::Completed, now)?;
            ledger.insert_transaction(&txn)?;
            ledger.append_events(
                &[LedgerEvent::PointsAdjusted {
                    transaction_id: txn.transaction_id.clone(),
                    user_id: user_id.to_string(),
                    venue_id: venue_id.to_string(),
                    delta,
                    reason: reason.to_string(),
                }],
                now,
            )?;
            Ok(txn)
        });
        match &result {
            Ok(txn) => log::info!(
                "venue={venue_id} user={user_id} adjusted {delta} txn={}",
                txn.transaction_id
            ),
            Err(e) => log::warn!("venue={venue_id} user={user_id} adjustment rejected: {e}"),
        }
        result
    }

    // ── Network ────────────────────────────────────────────────

    /// Attach a newly signed-up user under `referrer_id`.
    pub fn register_referral(
        &self,
        store: &mut LedgerStore,
        user_id: &str,
        referrer_id: &str,
    ) -> LedgerResult<ReferralChain> {
        let now = self.clock.now();
        store.atomically(|ledger| {
            let chain = ledger.register_referral(user_id, referrer_id, now)?;
            ledger.append_events(
                &[LedgerEvent::ReferralRegistered {
                    user_id: user_id.to_string(),
                    referrer_id: referrer_id.to_string(),
                    depth: chain.depth(),
                }],
                now,
            )?;
            log::debug!("user={user_id} referred by {referrer_id}, depth {}", chain.depth());
            Ok(chain)
        })
    }

    // ── Owner configuration ────────────────────────────────────

    pub fn update_venue(
        &self,
        store: &mut LedgerStore,
        venue_id: &str,
        update: &VenueUpdate,
    ) -> LedgerResult<Venue> {
        store.atomically(|ledger| {
            let mut venue = ledger.require_venue(venue_id)?;
            update.apply_to(&mut venue)?;
            ledger.save_venue(&venue)?;
            Ok(venue)
        })
    }

    pub fn update_product(
        &self,
        store: &mut LedgerStore,
        venue_id: &str,
        product_id: &str,
        update: &ProductUpdate,
    ) -> LedgerResult<Product> {
        store.atomically(|ledger| {
            let mut product = ledger.product_at_venue(venue_id, product_id)?;
            update.apply_to(&mut product)?;
            ledger.save_product(&product)?;
            Ok(product)
        })
    }

    pub fn activate_product_bonus(
        &self,
        store: &mut LedgerStore,
        venue_id: &str,
        product_id: &str,
        multiplier: Decimal,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> LedgerResult<Product> {
        let now = self.clock.now();
        store.atomically(|ledger| {
            let mut product = ledger.product_at_venue(venue_id, product_id)?;
            product.activate_bonus(multiplier, start, end, reason, now)?;
            ledger.save_product(&product)?;
            log::info!("venue={venue_id} product={product_id} bonus x{multiplier} active");
            Ok(product)
        })
    }

    pub fn deactivate_product_bonus(
        &self,
        store: &mut LedgerStore,
        venue_id: &str,
        product_id: &str,
    ) -> LedgerResult<Product> {
        store.atomically(|ledger| {
            let mut product = ledger.product_at_venue(venue_id, product_id)?;
            product.deactivate_bonus();
            ledger.save_product(&product)?;
            log::info!("venue={venue_id} product={product_id} bonus ended");
            Ok(product)
        })
    }
}
