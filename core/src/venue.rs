//! Venue configuration and aggregate statistics.
//!
//! Margins and the points multiplier are owner-managed configuration; the
//! ledger only reads them. Aggregates are bumped by every settlement.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{Money, Points, VenueId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id:            VenueId,
    pub name:                String,
    pub is_active:           bool,
    /// Margin percentages in [0, 100]. `None` means "use the default".
    pub food_margin:         Option<Decimal>,
    pub beverage_margin:     Option<Decimal>,
    pub default_margin:      Option<Decimal>,
    pub points_multiplier:   Decimal,
    pub total_revenue:       Money,
    pub total_points_issued: Points,
}

impl Venue {
    /// A new active venue with the stock margins (food 30, beverage 60, other 40).
    pub fn new(venue_id: impl Into<VenueId>, name: impl Into<String>) -> Self {
        Self {
            venue_id:            venue_id.into(),
            name:                name.into(),
            is_active:           true,
            food_margin:         Some(Decimal::new(30, 0)),
            beverage_margin:     Some(Decimal::new(60, 0)),
            default_margin:      Some(Decimal::new(40, 0)),
            points_multiplier:   Decimal::ONE,
            total_revenue:       Decimal::ZERO,
            total_points_issued: Decimal::ZERO,
        }
    }

    pub fn with_margins(
        mut self,
        food: Option<Decimal>,
        beverage: Option<Decimal>,
        default: Option<Decimal>,
    ) -> Self {
        self.food_margin = food;
        self.beverage_margin = beverage;
        self.default_margin = default;
        self
    }

    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.points_multiplier = multiplier;
        self
    }
}

/// Partial update of venue configuration. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueUpdate {
    pub name:              Option<String>,
    pub is_active:         Option<bool>,
    pub food_margin:       Option<Decimal>,
    pub beverage_margin:   Option<Decimal>,
    pub default_margin:    Option<Decimal>,
    pub points_multiplier: Option<Decimal>,
}

impl VenueUpdate {
    /// Validate every field, then merge. On error the venue is untouched.
    pub fn apply_to(&self, venue: &mut Venue) -> LedgerResult<()> {
        for (field, margin) in [
            ("food_margin", self.food_margin),
            ("beverage_margin", self.beverage_margin),
            ("default_margin", self.default_margin),
        ] {
            if let Some(m) = margin {
                check_margin(field, m)?;
            }
        }
        if let Some(multiplier) = self.points_multiplier {
            if multiplier <= Decimal::ZERO {
                return Err(LedgerError::InvalidUpdate {
                    reason: format!("points_multiplier must be positive, got {multiplier}"),
                });
            }
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(LedgerError::InvalidUpdate {
                    reason: "name must not be empty".into(),
                });
            }
        }

        if let Some(name) = &self.name {
            venue.name = name.clone();
        }
        if let Some(active) = self.is_active {
            venue.is_active = active;
        }
        if let Some(m) = self.food_margin {
            venue.food_margin = Some(m);
        }
        if let Some(m) = self.beverage_margin {
            venue.beverage_margin = Some(m);
        }
        if let Some(m) = self.default_margin {
            venue.default_margin = Some(m);
        }
        if let Some(multiplier) = self.points_multiplier {
            venue.points_multiplier = multiplier;
        }
        Ok(())
    }
}

fn check_margin(field: &str, value: Decimal) -> LedgerResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(LedgerError::InvalidUpdate {
            reason: format!("{field} must be within [0, 100], got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_merges_only_set_fields() {
        let mut venue = Venue::new("v1", "Kulturpalast");
        let update = VenueUpdate {
            beverage_margin: Some(Decimal::new(80, 0)),
            ..VenueUpdate::default()
        };
        update.apply_to(&mut venue).unwrap();
        assert_eq!(venue.beverage_margin, Some(Decimal::new(80, 0)));
        assert_eq!(venue.food_margin, Some(Decimal::new(30, 0)));
        assert_eq!(venue.name, "Kulturpalast");
    }

    #[test]
    fn invalid_update_leaves_venue_untouched() {
        let mut venue = Venue::new("v1", "Kulturpalast");
        let update = VenueUpdate {
            name: Some("Renamed".into()),
            food_margin: Some(Decimal::new(101, 0)),
            ..VenueUpdate::default()
        };
        assert!(update.apply_to(&mut venue).is_err());
        assert_eq!(venue.name, "Kulturpalast");
        assert_eq!(venue.food_margin, Some(Decimal::new(30, 0)));
    }
}
