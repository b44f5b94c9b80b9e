//! Margin resolution: which of a venue's margins applies to a category.
//!
//! Category names are free text from the till, so matching is by
//! case-insensitive substring: "Food", "street_food" and "FOOD & snacks"
//! all resolve to the food margin.

use crate::{config::MarginDefaults, venue::Venue};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct MarginResolver {
    defaults: MarginDefaults,
}

impl MarginResolver {
    pub fn new(defaults: MarginDefaults) -> Self {
        Self { defaults }
    }

    /// Margin percentage in [0, 100] for `category` at `venue`.
    pub fn margin_for(&self, venue: &Venue, category: &str) -> Decimal {
        let category = category.to_lowercase();
        let specific = if category.contains("food") {
            venue.food_margin
        } else if category.contains("beverage") || category.contains("drink") {
            venue.beverage_margin
        } else {
            None
        };
        specific.unwrap_or_else(|| self.default_margin(venue))
    }

    pub fn default_margin(&self, venue: &Venue) -> Decimal {
        venue.default_margin.unwrap_or(self.defaults.fallback_margin)
    }

    /// Largest configured margin; unset food/beverage count as 0.
    pub fn highest_margin(&self, venue: &Venue) -> Decimal {
        venue
            .food_margin
            .unwrap_or(Decimal::ZERO)
            .max(venue.beverage_margin.unwrap_or(Decimal::ZERO))
            .max(self.default_margin(venue))
    }
}
