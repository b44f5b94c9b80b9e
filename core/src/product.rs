//! Products and their time-boxed bonus-points promotions.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{Money, ProductId, VenueId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound for a promotion multiplier.
pub const MAX_BONUS_MULTIPLIER: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBonus {
    pub active:     bool,
    /// Always > 0. 1.0 when no promotion was ever set.
    pub multiplier: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date:   Option<DateTime<Utc>>,
    pub reason:     Option<String>,
}

impl Default for ProductBonus {
    fn default() -> Self {
        Self {
            active:     false,
            multiplier: Decimal::ONE,
            start_date: None,
            end_date:   None,
            reason:     None,
        }
    }
}

impl ProductBonus {
    /// Active, and `now` inside whichever bounds are set.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if self.start_date.is_some_and(|start| now < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| now > end) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id:   ProductId,
    pub venue_id:     VenueId,
    pub name:         String,
    pub category:     String,
    pub price:        Money,
    pub is_available: bool,
    pub bonus:        ProductBonus,
}

impl Product {
    pub fn new(
        product_id: impl Into<ProductId>,
        venue_id: impl Into<VenueId>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            product_id:   product_id.into(),
            venue_id:     venue_id.into(),
            name:         name.into(),
            category:     category.into(),
            price,
            is_available: true,
            bonus:        ProductBonus::default(),
        }
    }

    /// Multiplier to apply to this product's points right now.
    pub fn effective_multiplier(&self, now: DateTime<Utc>) -> Decimal {
        if self.bonus.is_effective(now) {
            self.bonus.multiplier
        } else {
            Decimal::ONE
        }
    }

    /// Start a promotion. `start` defaults to `now`; `end` open-ended if unset.
    pub fn activate_bonus(
        &mut self,
        multiplier: Decimal,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        if multiplier <= Decimal::ONE || multiplier > MAX_BONUS_MULTIPLIER {
            return Err(LedgerError::InvalidBonus {
                reason: format!("multiplier must be within (1, 10], got {multiplier}"),
            });
        }
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(LedgerError::InvalidBonus {
                    reason: "end date must be after start date".into(),
                });
            }
        }
        self.bonus = ProductBonus {
            active: true,
            multiplier,
            start_date: Some(start.unwrap_or(now)),
            end_date: end,
            reason,
        };
        Ok(())
    }

    /// Stop the promotion. Dates and multiplier are kept for history.
    pub fn deactivate_bonus(&mut self) {
        self.bonus.active = false;
    }
}

/// Partial update of product fields. Bonus changes go through
/// `activate_bonus` / `deactivate_bonus`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name:         Option<String>,
    pub category:     Option<String>,
    pub price:        Option<Money>,
    pub is_available: Option<bool>,
}

impl ProductUpdate {
    pub fn apply_to(&self, product: &mut Product) -> LedgerResult<()> {
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(LedgerError::InvalidUpdate {
                    reason: format!("price must be positive, got {price}"),
                });
            }
        }
        if self.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(LedgerError::InvalidUpdate {
                reason: "category must not be empty".into(),
            });
        }

        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(available) = self.is_available {
            product.is_available = available;
        }
        Ok(())
    }
}
