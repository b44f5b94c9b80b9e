//! Points calculation: pure functions over venue margins and promotions.
//!
//!   points = amount × base_rate × (category_margin / highest_margin)
//!            × product_bonus × venue_multiplier
//!
//! Margins are relative to the venue's own best category, so a bar whose
//! drinks carry an 80% margin pays full rate on drinks and 30/80 of it on
//! food, regardless of how other venues set their margins.
//!
//! Only the cash part of a bill ever earns points.

use crate::{
    config::LedgerConfig,
    margin::MarginResolver,
    product::Product,
    types::{round_cents, Money, Points},
    venue::Venue,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Category used when a line item carries none.
pub const DEFAULT_CATEGORY: &str = "other";

/// One priced line of an order, with its product already resolved.
#[derive(Debug, Clone, Copy)]
pub struct OrderLine<'a> {
    pub amount:   Money,
    pub category: Option<&'a str>,
    pub product:  Option<&'a Product>,
}

#[derive(Debug, Clone)]
pub struct PointsCalculator {
    base_rate:           Decimal,
    referral_percentage: Decimal,
    margins:             MarginResolver,
}

impl PointsCalculator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            base_rate:           config.base_rate,
            referral_percentage: config.referral_percentage,
            margins:             MarginResolver::new(config.margins),
        }
    }

    /// Points for `amount` spent on `category` at `venue`, before bonuses.
    pub fn base_points(&self, amount: Money, venue: &Venue, category: Option<&str>) -> Points {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let category_margin = self
            .margins
            .margin_for(venue, category.unwrap_or(DEFAULT_CATEGORY));
        let mut highest = self.margins.highest_margin(venue);
        if highest.is_zero() {
            highest = Decimal::ONE_HUNDRED;
        }
        let ratio = category_margin / highest;
        round_cents(amount * self.base_rate * ratio)
    }

    /// Base points for the product's category, times any live promotion.
    pub fn product_points(
        &self,
        amount: Money,
        product: &Product,
        venue: &Venue,
        now: DateTime<Utc>,
    ) -> Points {
        let base = self.base_points(amount, venue, Some(&product.category));
        let multiplier = product.effective_multiplier(now);
        if multiplier == Decimal::ONE {
            return base;
        }
        round_cents(base * multiplier)
    }

    /// Points for a whole order paid with `cash`.
    ///
    /// Without lines the cash amount is scored at the default margin. With
    /// lines each is scored on its own category and promotion; when the
    /// lines add up to more than the cash (part paid in points) every line
    /// is scaled down to its cash share first. The venue multiplier applies
    /// last.
    pub fn order_points(
        &self,
        cash: Money,
        venue: &Venue,
        lines: &[OrderLine<'_>],
        now: DateTime<Utc>,
    ) -> Points {
        if cash <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let lines_total: Money = lines.iter().map(|l| l.amount).sum();
        let total = if lines.is_empty() || lines_total <= Decimal::ZERO {
            self.base_points(cash, venue, None)
        } else {
            let cash_share = if lines_total > cash {
                cash / lines_total
            } else {
                Decimal::ONE
            };
            lines
                .iter()
                .map(|line| {
                    let amount = line.amount * cash_share;
                    match line.product {
                        Some(product) => self.product_points(amount, product, venue, now),
                        None => self.base_points(amount, venue, line.category),
                    }
                })
                .sum()
        };

        round_cents(total * venue.points_multiplier)
    }

    /// What each referral level receives: a flat share of the purchaser's
    /// points, the same at every level.
    pub fn referral_reward(&self, points_earned: Points) -> Points {
        round_cents(points_earned * self.referral_percentage)
    }
}
