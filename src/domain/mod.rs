//! Domain types for the position ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: ids, MarketType, PositionStatus, TransactionKind, Side
//! - Position and Transaction records
//! - Normalization of form and broker-file tokens into canonical values

pub mod decimal;
pub mod normalize;
pub mod position;
pub mod primitives;
pub mod transaction;

pub use decimal::Decimal;
pub use normalize::NormalizeError;
pub use position::{NewPosition, Position};
pub use primitives::{
    ExchangeId, MarketType, PositionId, PositionStatus, Side, TransactionId, TransactionKind,
    UnknownVariant, UserId,
};
pub use transaction::{NewTransaction, Transaction};
