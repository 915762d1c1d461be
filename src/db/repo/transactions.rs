//! Ledger event operations for the repository.

use crate::domain::{
    Decimal, NewTransaction, PositionId, Transaction, TransactionId, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{transaction_from_row, Repository, TRANSACTION_COLUMNS};

impl Repository {
    /// All events of a position in fold order (ascending id).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_transactions(
        &self,
        position: PositionId,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE position_id = ? ORDER BY id ASC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(position.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    pub async fn count_transactions(&self, position: PositionId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM transactions WHERE position_id = ?")
            .bind(position.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total"))
    }

    /// Display page: newest execution first, ties broken by id.
    pub async fn list_transactions_page(
        &self,
        position: PositionId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE position_id = ?
            ORDER BY executed_ms DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(position.as_i64())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    pub async fn get_transaction(
        &self,
        position: PositionId,
        id: TransactionId,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE id = ? AND position_id = ?",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(position.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    /// Append an event unconditionally.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including a duplicate broker key.
    pub async fn insert_transaction(
        &self,
        position: PositionId,
        tx: &NewTransaction,
    ) -> Result<TransactionId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
            (position_id, kind, price, volume, fee, fee_base, funding_amount, executed_ms, source_order_id, source_trade_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.as_i64())
        .bind(tx.kind.as_str())
        .bind(tx.price.to_canonical_string())
        .bind(tx.volume.to_canonical_string())
        .bind(tx.fee.to_canonical_string())
        .bind(tx.fee_base.to_canonical_string())
        .bind(tx.funding_amount.to_canonical_string())
        .bind(tx.executed_at.timestamp_millis())
        .bind(tx.source_order_id.as_deref())
        .bind(tx.source_trade_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(TransactionId::new(result.last_insert_rowid()))
    }

    pub async fn insert_trade(
        &self,
        position: PositionId,
        price: Decimal,
        volume: Decimal,
        fee: Decimal,
        fee_base: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<TransactionId, sqlx::Error> {
        let tx = NewTransaction::trade(price, volume, fee, fee_base, executed_at);
        self.insert_transaction(position, &tx).await
    }

    pub async fn insert_funding(
        &self,
        position: PositionId,
        amount: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<TransactionId, sqlx::Error> {
        let tx = NewTransaction::funding(amount, executed_at);
        self.insert_transaction(position, &tx).await
    }

    /// Insert an imported event idempotently.
    ///
    /// Events carrying both broker ids are deduplicated per position; events
    /// without them always insert (NULLs never collide in the unique key).
    /// Returns true if a row was written.
    pub async fn insert_if_absent(
        &self,
        position: PositionId,
        tx: &NewTransaction,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
            (position_id, kind, price, volume, fee, fee_base, funding_amount, executed_ms, source_order_id, source_trade_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(position_id, source_order_id, source_trade_id) DO NOTHING
            "#,
        )
        .bind(position.as_i64())
        .bind(tx.kind.as_str())
        .bind(tx.price.to_canonical_string())
        .bind(tx.volume.to_canonical_string())
        .bind(tx.fee.to_canonical_string())
        .bind(tx.fee_base.to_canonical_string())
        .bind(tx.funding_amount.to_canonical_string())
        .bind(tx.executed_at.timestamp_millis())
        .bind(tx.source_order_id.as_deref())
        .bind(tx.source_trade_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the values of one event. Broker ids are left untouched.
    ///
    /// Returns false unless the `(owner, position, transaction)` triple matches.
    pub async fn update_transaction(
        &self,
        user: UserId,
        position: PositionId,
        id: TransactionId,
        tx: &NewTransaction,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET kind = ?, price = ?, volume = ?, fee = ?, fee_base = ?, funding_amount = ?, executed_ms = ?
            WHERE id = ? AND position_id = ?
              AND position_id IN (SELECT id FROM positions WHERE user_id = ?)
            "#,
        )
        .bind(tx.kind.as_str())
        .bind(tx.price.to_canonical_string())
        .bind(tx.volume.to_canonical_string())
        .bind(tx.fee.to_canonical_string())
        .bind(tx.fee_base.to_canonical_string())
        .bind(tx.funding_amount.to_canonical_string())
        .bind(tx.executed_at.timestamp_millis())
        .bind(id.as_i64())
        .bind(position.as_i64())
        .bind(user.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the listed events of an owned position in one statement.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_transactions(
        &self,
        user: UserId,
        position: PositionId,
        ids: &[TransactionId],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            r#"
            DELETE FROM transactions
            WHERE position_id = ?
              AND position_id IN (SELECT id FROM positions WHERE user_id = ?)
              AND id IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(position.as_i64()).bind(user.as_i64());
        for id in ids {
            query = query.bind(id.as_i64());
        }
        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
