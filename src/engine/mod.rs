//! Pure computation engine for deterministic ledger logic.

pub mod ledger;

pub use ledger::{fold, fold_steps, LedgerSnapshot, LedgerState, LedgerTracker};
