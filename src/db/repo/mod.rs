//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by record:
//! - `positions.rs` - Position rows, always scoped by owner
//! - `transactions.rs` - Ledger events, always scoped by position

mod positions;
mod transactions;

use crate::domain::{
    Decimal, ExchangeId, MarketType, Position, PositionId, PositionStatus, Transaction,
    TransactionId, TransactionKind, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Liveness probe for the readiness endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const POSITION_COLUMNS: &str =
    "id, user_id, exchange_id, contract_name, market_type, status, created_ms, closed_ms";

const TRANSACTION_COLUMNS: &str = "id, position_id, kind, price, volume, fee, fee_base, \
     funding_amount, executed_ms, source_order_id, source_trade_id";

fn decode_enum<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn decode_decimal(row: &SqliteRow, column: &str, id: i64) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(
            transaction_id = id,
            column = column,
            value = %raw,
            error = %e,
            "Failed to parse stored decimal, using default"
        );
        Decimal::default()
    })
}

fn decode_time(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!(time_ms = ms, "Stored timestamp out of range, using epoch");
        DateTime::<Utc>::default()
    })
}

fn position_from_row(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: PositionId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        exchange_id: ExchangeId::new(row.try_get("exchange_id")?),
        contract_name: row.try_get("contract_name")?,
        market_type: decode_enum::<MarketType>(row, "market_type")?,
        status: decode_enum::<PositionStatus>(row, "status")?,
        created_at: decode_time(row.try_get("created_ms")?),
        closed_at: row
            .try_get::<Option<i64>, _>("closed_ms")?
            .map(decode_time),
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    Ok(Transaction {
        id: TransactionId::new(id),
        position_id: PositionId::new(row.try_get("position_id")?),
        kind: decode_enum::<TransactionKind>(row, "kind")?,
        price: decode_decimal(row, "price", id),
        volume: decode_decimal(row, "volume", id),
        fee: decode_decimal(row, "fee", id),
        fee_base: decode_decimal(row, "fee_base", id),
        funding_amount: decode_decimal(row, "funding_amount", id),
        executed_at: decode_time(row.try_get("executed_ms")?),
        source_order_id: row.try_get("source_order_id")?,
        source_trade_id: row.try_get("source_trade_id")?,
    })
}
