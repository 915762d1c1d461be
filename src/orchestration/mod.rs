//! Ledger operations exposed to callers.

pub mod forms;
pub mod lifecycle;

pub use forms::TransactionForm;
pub use lifecycle::{
    clamp_paging, ImportForm, ImportOutcome, Page, PositionForm, PositionLedger, PositionManager,
};
