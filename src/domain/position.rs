//! Tracked position: one contract on one exchange for one user.

use crate::domain::{ExchangeId, MarketType, PositionId, PositionStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub exchange_id: ExchangeId,
    pub contract_name: String,
    pub market_type: MarketType,
    pub status: PositionStatus,
    /// Start of the position in UTC (user supplied, not insertion time).
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Fields required to persist a new OPEN position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosition {
    pub user_id: UserId,
    pub exchange_id: ExchangeId,
    pub contract_name: String,
    pub market_type: MarketType,
    pub created_at: DateTime<Utc>,
}
