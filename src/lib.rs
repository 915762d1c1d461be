pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod import;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, ExchangeId, MarketType, Position, PositionId, PositionStatus, Transaction,
    TransactionId, TransactionKind, UserId,
};
pub use engine::{fold, fold_steps, LedgerSnapshot, LedgerState};
pub use error::{AppError, LedgerError};
pub use import::{CsvImporter, ImportError, ImportFailure, ImportRequest, ImporterRegistry};
pub use orchestration::PositionManager;
