//! Shared primitive types used across the entire ledger.

use rust_decimal::{Decimal, RoundingStrategy};

/// A stable, unique identifier for any entity in the ledger.
pub type EntityId = String;

pub type UserId = EntityId;
pub type VenueId = EntityId;
pub type ProductId = EntityId;
pub type TransactionId = EntityId;

/// Loyalty points. Always settled to two decimal places.
pub type Points = Decimal;

/// Money in the venue's single currency.
pub type Money = Decimal;

/// Decimal places kept for points and money.
pub const CENT_DP: u32 = 2;

/// Round half-up to two decimal places.
///
/// Every value this ledger rounds is non-negative, so away-from-zero on the
/// midpoint is the same as half-up.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `value` carries no precision beyond whole cents.
pub fn is_whole_cents(value: Decimal) -> bool {
    value.normalize().scale() <= CENT_DP
}
