use crate::{
    error::{LedgerError, LedgerResult},
    types::{is_whole_cents, Money, ProductId, UserId, VenueId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest amount, line total or sum of line totals a request may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

fn max_amount() -> Decimal {
    Decimal::from(MAX_AMOUNT)
}

/// The caller, as vouched for by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub name:       String,
    pub quantity:   u32,
    pub price:      Money,
    /// Ignored when `product_id` is set; the product's own category wins.
    #[serde(default)]
    pub category:   Option<String>,
}

impl LineItem {
    pub fn total(&self) -> LedgerResult<Money> {
        self.price
            .checked_mul(Decimal::from(self.quantity))
            .filter(|total| *total <= max_amount())
            .ok_or_else(|| LedgerError::AmountTooLarge {
                field: "line_items",
                limit: max_amount(),
            })
    }
}

/// One purchase at one venue, split between cash and points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub venue_id:        VenueId,
    pub amount_total:    Money,
    pub amount_cash:     Money,
    pub amount_points:   Money,
    #[serde(default)]
    pub line_items:      Vec<LineItem>,
    #[serde(default)]
    pub payment_method:  Option<String>,
    /// Retries carrying the same key replay the first settlement.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl PurchaseRequest {
    /// A cash-only purchase with no line items.
    pub fn cash(venue_id: impl Into<VenueId>, amount: Money) -> Self {
        Self {
            venue_id:        venue_id.into(),
            amount_total:    amount,
            amount_cash:     amount,
            amount_points:   Decimal::ZERO,
            line_items:      Vec::new(),
            payment_method:  Some("card".into()),
            idempotency_key: None,
        }
    }

    /// Cash plus points making up `cash + points`.
    pub fn split(venue_id: impl Into<VenueId>, cash: Money, points: Money) -> Self {
        Self {
            amount_total: cash + points,
            amount_points: points,
            ..Self::cash(venue_id, cash)
        }
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.line_items = items;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Amount checks that run before anything is touched.
    pub fn validate(&self, tolerance: Decimal) -> LedgerResult<()> {
        for (field, value) in [
            ("amount_total", self.amount_total),
            ("amount_cash", self.amount_cash),
            ("amount_points", self.amount_points),
        ] {
            if value < Decimal::ZERO {
                return Err(LedgerError::NegativeAmount { field, value });
            }
            if !is_whole_cents(value) {
                return Err(LedgerError::SubCentAmount { field, value });
            }
            if value > max_amount() {
                return Err(LedgerError::AmountTooLarge { field, limit: max_amount() });
            }
        }

        let mut lines_total = Decimal::ZERO;
        for item in &self.line_items {
            lines_total = lines_total
                .checked_add(item.total()?)
                .filter(|sum| *sum <= max_amount())
                .ok_or_else(|| LedgerError::AmountTooLarge {
                    field: "line_items",
                    limit: max_amount(),
                })?;
        }

        let difference = self
            .amount_cash
            .checked_add(self.amount_points)
            .and_then(|paid| paid.checked_sub(self.amount_total))
            .map(|d| d.abs());
        if difference.map_or(true, |d| d > tolerance) {
            return Err(LedgerError::AmountMismatch {
                cash: self.amount_cash,
                points: self.amount_points,
                total: self.amount_total,
            });
        }

        if self.amount_total <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveTotal { total: self.amount_total });
        }
        Ok(())
    }
}
