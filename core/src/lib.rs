//! Venue loyalty ledger.
//!
//! Points are earned per venue on the cash part of a purchase, weighted by
//! the venue's category margins, and can only be spent at the venue that
//! issued them. Purchases also drive visit streaks and a five-level
//! referral payout. All point movement goes through `TransactionProcessor`,
//! which settles each operation as one SQLite transaction.

pub mod balance;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod margin;
pub mod points;
pub mod processor;
pub mod product;
pub mod referral;
pub mod request;
pub mod store;
pub mod streak;
pub mod transaction;
pub mod types;
pub mod venue;

pub use balance::UserVenueBalance;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use event::LedgerEvent;
pub use processor::{Refund, Settlement, TransactionProcessor};
pub use product::Product;
pub use request::{AuthenticatedUser, LineItem, PurchaseRequest};
pub use store::{Ledger, LedgerStore, TransactionFilter};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
pub use venue::Venue;
