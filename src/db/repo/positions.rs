//! Position operations for the repository. Every statement is scoped by owner.

use crate::domain::{ExchangeId, NewPosition, Position, PositionId, PositionStatus, UserId};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{position_from_row, Repository, POSITION_COLUMNS};

impl Repository {
    /// Persist a new OPEN position and return it with its assigned id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn create_position(&self, new: &NewPosition) -> Result<Position, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (user_id, exchange_id, contract_name, market_type, status, created_ms)
            VALUES (?, ?, ?, ?, 'OPEN', ?)
            "#,
        )
        .bind(new.user_id.as_i64())
        .bind(new.exchange_id.as_i64())
        .bind(&new.contract_name)
        .bind(new.market_type.as_str())
        .bind(new.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(Position {
            id: PositionId::new(result.last_insert_rowid()),
            user_id: new.user_id,
            exchange_id: new.exchange_id,
            contract_name: new.contract_name.clone(),
            market_type: new.market_type,
            status: PositionStatus::Open,
            created_at: new.created_at,
            closed_at: None,
        })
    }

    /// Update the editable metadata of a position. Market type is fixed.
    ///
    /// Returns false when no `(position, owner)` row exists.
    pub async fn update_position(
        &self,
        id: PositionId,
        user: UserId,
        contract_name: &str,
        exchange_id: ExchangeId,
        created_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET contract_name = ?, exchange_id = ?, created_ms = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(contract_name)
        .bind(exchange_id.as_i64())
        .bind(created_at.timestamp_millis())
        .bind(id.as_i64())
        .bind(user.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_position(
        &self,
        id: PositionId,
        user: UserId,
    ) -> Result<Option<Position>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE id = ? AND user_id = ?",
            POSITION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(user.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(position_from_row).transpose()
    }

    pub async fn count_positions(&self, user: UserId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM positions WHERE user_id = ?")
            .bind(user.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total"))
    }

    /// Page of a user's positions: open ones first, then newest first.
    pub async fn list_positions(
        &self,
        user: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions
            WHERE user_id = ?
            ORDER BY CASE status WHEN 'OPEN' THEN 0 ELSE 1 END ASC, created_ms DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_i64())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// Mark an OPEN position CLOSED. Returns false if the row is missing or
    /// already closed; the flatness check is the caller's job.
    pub async fn close_position(
        &self,
        id: PositionId,
        user: UserId,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = 'CLOSED', closed_ms = ?
            WHERE id = ? AND user_id = ? AND status = 'OPEN'
            "#,
        )
        .bind(closed_at.timestamp_millis())
        .bind(id.as_i64())
        .bind(user.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a position. Its transactions go with it through the cascade.
    pub async fn delete_position(&self, id: PositionId, user: UserId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM positions WHERE id = ? AND user_id = ?")
            .bind(id.as_i64())
            .bind(user.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
