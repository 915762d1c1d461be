//! Ledger events belonging to a position.

use crate::domain::{Decimal, PositionId, TransactionId, TransactionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored ledger event.
///
/// Events never carry derived state; the fold engine recomputes everything
/// from the full list on each read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub position_id: PositionId,
    pub kind: TransactionKind,
    /// Execution price (TRADE only).
    pub price: Decimal,
    /// Signed size: positive adds long exposure (spot buy), negative removes it.
    pub volume: Decimal,
    /// Fee in quote currency.
    pub fee: Decimal,
    /// Fee in base currency, spot buys only.
    pub fee_base: Decimal,
    /// Funding cash flow (FUNDING only).
    pub funding_amount: Decimal,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_trade_id: Option<String>,
}

/// A ledger event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub price: Decimal,
    pub volume: Decimal,
    pub fee: Decimal,
    pub fee_base: Decimal,
    pub funding_amount: Decimal,
    pub executed_at: DateTime<Utc>,
    pub source_order_id: Option<String>,
    pub source_trade_id: Option<String>,
}

impl NewTransaction {
    pub fn trade(
        price: Decimal,
        volume: Decimal,
        fee: Decimal,
        fee_base: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TransactionKind::Trade,
            price,
            volume,
            fee,
            fee_base,
            funding_amount: Decimal::zero(),
            executed_at,
            source_order_id: None,
            source_trade_id: None,
        }
    }

    pub fn funding(amount: Decimal, executed_at: DateTime<Utc>) -> Self {
        Self {
            kind: TransactionKind::Funding,
            price: Decimal::zero(),
            volume: Decimal::zero(),
            fee: Decimal::zero(),
            fee_base: Decimal::zero(),
            funding_amount: amount,
            executed_at,
            source_order_id: None,
            source_trade_id: None,
        }
    }

    /// Attach broker identifiers. Blank ids are dropped so they never take
    /// part in deduplication.
    pub fn with_source(mut self, order_id: Option<String>, trade_id: Option<String>) -> Self {
        fn clean(id: Option<String>) -> Option<String> {
            id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        self.source_order_id = clean(order_id);
        self.source_trade_id = clean(trade_id);
        self
    }

    /// True when the event carries the full broker dedup key.
    pub fn has_source_key(&self) -> bool {
        self.source_order_id.is_some() && self.source_trade_id.is_some()
    }
}
