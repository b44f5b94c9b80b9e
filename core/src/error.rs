use crate::transaction::{TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse error classes exposed to callers (HTTP mapping, retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidArgument,
    Internal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── NotFound ───────────────────────────────────────────────
    #[error("Venue '{venue_id}' not found")]
    VenueNotFound { venue_id: String },

    #[error("Product '{product_id}' not found at venue '{venue_id}'")]
    ProductNotFound { venue_id: String, product_id: String },

    #[error("Transaction '{transaction_id}' not found")]
    TransactionNotFound { transaction_id: String },

    // ── InvalidState ───────────────────────────────────────────
    #[error("Venue '{venue_id}' is not currently active")]
    VenueInactive { venue_id: String },

    #[error("Transaction '{transaction_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        transaction_id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Transaction '{transaction_id}' of type {kind} cannot be refunded")]
    NotRefundable {
        transaction_id: String,
        kind: TransactionKind,
    },

    #[error(
        "Cannot reverse {required:.2} points for user '{user_id}' at venue '{venue_id}': \
         only {available:.2} available"
    )]
    ReversalExceedsBalance {
        user_id: String,
        venue_id: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("User '{user_id}' already has a referral chain")]
    ReferralChainExists { user_id: String },

    // ── InvalidArgument ────────────────────────────────────────
    #[error("Amount mismatch: cash ({cash}) + points ({points}) must equal total ({total})")]
    AmountMismatch {
        cash: Decimal,
        points: Decimal,
        total: Decimal,
    },

    #[error("Transaction amount must be greater than 0, got {total}")]
    NonPositiveTotal { total: Decimal },

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: Decimal },

    #[error("{field} has sub-cent precision: {value}")]
    SubCentAmount { field: &'static str, value: Decimal },

    #[error("{field} exceeds the maximum of {limit}")]
    AmountTooLarge { field: &'static str, limit: Decimal },

    #[error("Idempotency key '{key}' was already used for a different purchase")]
    IdempotencyKeyReused { key: String },

    #[error("Insufficient points at this venue. Available: {available:.2}, Required: {required:.2}")]
    InsufficientPoints { available: Decimal, required: Decimal },

    #[error("Invalid bonus: {reason}")]
    InvalidBonus { reason: String },

    #[error("Invalid update: {reason}")]
    InvalidUpdate { reason: String },

    #[error("Point adjustment must be non-zero")]
    ZeroAdjustment,

    #[error("User '{user_id}' cannot refer themselves")]
    SelfReferral { user_id: String },

    // ── Internal ───────────────────────────────────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VenueNotFound { .. }
            | Self::ProductNotFound { .. }
            | Self::TransactionNotFound { .. } => ErrorKind::NotFound,

            Self::VenueInactive { .. }
            | Self::InvalidTransition { .. }
            | Self::NotRefundable { .. }
            | Self::ReversalExceedsBalance { .. }
            | Self::ReferralChainExists { .. } => ErrorKind::InvalidState,

            Self::AmountMismatch { .. }
            | Self::NonPositiveTotal { .. }
            | Self::NegativeAmount { .. }
            | Self::SubCentAmount { .. }
            | Self::AmountTooLarge { .. }
            | Self::IdempotencyKeyReused { .. }
            | Self::InsufficientPoints { .. }
            | Self::InvalidBonus { .. }
            | Self::InvalidUpdate { .. }
            | Self::ZeroAdjustment
            | Self::SelfReferral { .. } => ErrorKind::InvalidArgument,

            Self::Database(_) | Self::Serialization(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
