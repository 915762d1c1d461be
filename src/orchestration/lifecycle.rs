//! Position lifecycle: the rules every create/edit/close/delete must pass,
//! checked against a freshly folded ledger.

use crate::db::Repository;
use crate::domain::normalize::{parse_local_datetime, parse_window_stop};
use crate::domain::{
    ExchangeId, MarketType, NewPosition, Position, PositionId, Transaction, TransactionId,
    TransactionKind, UserId,
};
use crate::engine::{fold, LedgerSnapshot};
use crate::error::LedgerError;
use crate::import::{ImportRequest, ImporterRegistry};
use crate::orchestration::forms::TransactionForm;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_PAGE_LIMIT: i64 = 25;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Body of a create/edit position request. `market_type` is ignored on edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionForm {
    #[serde(default)]
    pub contract_name: String,
    #[serde(default)]
    pub exchange_id: i64,
    #[serde(default)]
    pub market_type: Option<String>,
    /// Local wall-clock start, `YYYY-MM-DD HH:MM:SS[.fff]`.
    #[serde(default)]
    pub start: String,
}

/// Parameters of a CSV upload, besides the file itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportForm {
    /// Broker format; defaults to the position's exchange.
    #[serde(default)]
    pub exchange_id: Option<i64>,
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
}

/// A position together with its recomputed ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionLedger {
    #[serde(flatten)]
    pub position: Position,
    pub ledger: LedgerSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub inserted: u64,
    /// sha256 of the uploaded file.
    pub fingerprint: String,
}

/// Clamp caller paging to `offset >= 0` and `1 <= limit <= MAX_PAGE_LIMIT`.
pub fn clamp_paging(offset: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let offset = offset.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (offset, limit)
}

fn not_found_position() -> LedgerError {
    LedgerError::NotFound("Position not found".to_string())
}

fn not_found_transaction() -> LedgerError {
    LedgerError::NotFound("Transaction not found".to_string())
}

pub struct PositionManager {
    repo: Arc<Repository>,
    importers: ImporterRegistry,
    max_import_bytes: usize,
}

impl PositionManager {
    pub fn new(repo: Arc<Repository>, importers: ImporterRegistry, max_import_bytes: usize) -> Self {
        Self {
            repo,
            importers,
            max_import_bytes,
        }
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    async fn require_position(
        &self,
        id: PositionId,
        owner: UserId,
    ) -> Result<Position, LedgerError> {
        self.repo
            .find_position(id, owner)
            .await?
            .ok_or_else(not_found_position)
    }

    async fn snapshot_of(&self, position: &Position) -> Result<LedgerSnapshot, LedgerError> {
        let transactions = self.repo.list_transactions(position.id).await?;
        Ok(fold(position.market_type, &transactions))
    }

    fn validate_metadata(
        form: &PositionForm,
        timezone: &str,
    ) -> Result<(String, ExchangeId, chrono::DateTime<Utc>), LedgerError> {
        let contract = form.contract_name.trim();
        if contract.is_empty() {
            return Err(LedgerError::validation("Contract name is required"));
        }
        if form.exchange_id <= 0 {
            return Err(LedgerError::validation("Exchange is required"));
        }
        if form.start.trim().is_empty() {
            return Err(LedgerError::validation("Start date is required"));
        }
        let created_at = parse_local_datetime(&form.start, timezone)?;
        Ok((contract.to_string(), ExchangeId::new(form.exchange_id), created_at))
    }

    pub async fn create_position(
        &self,
        owner: UserId,
        form: &PositionForm,
        timezone: &str,
    ) -> Result<Position, LedgerError> {
        let (contract_name, exchange_id, created_at) = Self::validate_metadata(form, timezone)?;
        let market_type = match form.market_type.as_deref().map(str::trim) {
            None | Some("") => return Err(LedgerError::validation("Market type is required")),
            Some(raw) => MarketType::from_str(raw)
                .map_err(|_| LedgerError::validation(format!("Unknown market type {}", raw)))?,
        };

        let position = self
            .repo
            .create_position(&NewPosition {
                user_id: owner,
                exchange_id,
                contract_name,
                market_type,
                created_at,
            })
            .await?;

        info!(
            user_id = %owner,
            position_id = %position.id,
            contract = %position.contract_name,
            market = %position.market_type,
            "Position opened"
        );
        Ok(position)
    }

    pub async fn edit_position(
        &self,
        id: PositionId,
        owner: UserId,
        form: &PositionForm,
        timezone: &str,
    ) -> Result<Position, LedgerError> {
        let (contract_name, exchange_id, created_at) = Self::validate_metadata(form, timezone)?;
        let updated = self
            .repo
            .update_position(id, owner, &contract_name, exchange_id, created_at)
            .await?;
        if !updated {
            return Err(not_found_position());
        }
        self.require_position(id, owner).await
    }

    /// Close a flat OPEN position.
    pub async fn close_position(
        &self,
        id: PositionId,
        owner: UserId,
    ) -> Result<Position, LedgerError> {
        let position = self.require_position(id, owner).await?;
        if !position.is_open() {
            return Err(LedgerError::Conflict("Position not opened".to_string()));
        }

        let snapshot = self.snapshot_of(&position).await?;
        if !snapshot.is_flat() {
            return Err(LedgerError::Conflict("Position not flat".to_string()));
        }

        // The status guard in the UPDATE catches a concurrent close.
        if !self.repo.close_position(id, owner, Utc::now()).await? {
            return Err(LedgerError::Conflict("Position not opened".to_string()));
        }

        info!(
            user_id = %owner,
            position_id = %id,
            realized_pnl = %snapshot.realized_pnl,
            "Position closed"
        );
        self.require_position(id, owner).await
    }

    pub async fn delete_position(&self, id: PositionId, owner: UserId) -> Result<(), LedgerError> {
        if !self.repo.delete_position(id, owner).await? {
            return Err(not_found_position());
        }
        info!(user_id = %owner, position_id = %id, "Position deleted");
        Ok(())
    }

    pub async fn get_ledger_snapshot(
        &self,
        id: PositionId,
        owner: UserId,
    ) -> Result<PositionLedger, LedgerError> {
        let position = self.require_position(id, owner).await?;
        let ledger = self.snapshot_of(&position).await?;
        Ok(PositionLedger { position, ledger })
    }

    /// Owned positions, open first then newest, each with its ledger.
    pub async fn list_positions(
        &self,
        owner: UserId,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<PositionLedger>, LedgerError> {
        let (offset, limit) = clamp_paging(offset, limit);
        let total = self.repo.count_positions(owner).await?;
        let positions = self.repo.list_positions(owner, offset, limit).await?;

        let mut items = Vec::with_capacity(positions.len());
        for position in positions {
            let ledger = self.snapshot_of(&position).await?;
            items.push(PositionLedger { position, ledger });
        }

        Ok(Page {
            total,
            offset,
            limit,
            items,
        })
    }

    /// Events for display, newest execution first.
    pub async fn list_transactions_page(
        &self,
        id: PositionId,
        owner: UserId,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<Transaction>, LedgerError> {
        let position = self.require_position(id, owner).await?;
        let (offset, limit) = clamp_paging(offset, limit);
        let total = self.repo.count_transactions(position.id).await?;
        let items = self
            .repo
            .list_transactions_page(position.id, offset, limit)
            .await?;

        Ok(Page {
            total,
            offset,
            limit,
            items,
        })
    }

    pub async fn get_transaction(
        &self,
        id: PositionId,
        owner: UserId,
        transaction: TransactionId,
    ) -> Result<Transaction, LedgerError> {
        let position = self.require_position(id, owner).await?;
        self.repo
            .get_transaction(position.id, transaction)
            .await?
            .ok_or_else(not_found_transaction)
    }

    pub async fn create_transaction(
        &self,
        id: PositionId,
        owner: UserId,
        form: &TransactionForm,
        timezone: &str,
    ) -> Result<Transaction, LedgerError> {
        let position = self.require_position(id, owner).await?;
        let tx = form.to_new_transaction(position.market_type, timezone)?;

        let tx_id = match tx.kind {
            TransactionKind::Trade => {
                self.repo
                    .insert_trade(
                        position.id,
                        tx.price,
                        tx.volume,
                        tx.fee,
                        tx.fee_base,
                        tx.executed_at,
                    )
                    .await?
            }
            TransactionKind::Funding => {
                self.repo
                    .insert_funding(position.id, tx.funding_amount, tx.executed_at)
                    .await?
            }
        };

        self.repo
            .get_transaction(position.id, tx_id)
            .await?
            .ok_or_else(not_found_transaction)
    }

    pub async fn edit_transaction(
        &self,
        id: PositionId,
        owner: UserId,
        transaction: TransactionId,
        form: &TransactionForm,
        timezone: &str,
    ) -> Result<Transaction, LedgerError> {
        let position = self.require_position(id, owner).await?;
        let tx = form.to_new_transaction(position.market_type, timezone)?;

        if !self
            .repo
            .update_transaction(owner, position.id, transaction, &tx)
            .await?
        {
            return Err(not_found_transaction());
        }

        self.repo
            .get_transaction(position.id, transaction)
            .await?
            .ok_or_else(not_found_transaction)
    }

    /// Delete the selected events; non-positive ids are ignored.
    pub async fn delete_transactions(
        &self,
        id: PositionId,
        owner: UserId,
        ids: &[i64],
    ) -> Result<u64, LedgerError> {
        let ids: Vec<TransactionId> = ids
            .iter()
            .copied()
            .filter(|tx_id| *tx_id > 0)
            .map(TransactionId::new)
            .collect();
        if ids.is_empty() {
            return Err(LedgerError::validation("No transactions selected"));
        }

        let removed = self.repo.delete_transactions(owner, id, &ids).await?;
        if removed == 0 {
            return Err(LedgerError::Conflict("No transactions deleted".to_string()));
        }
        info!(user_id = %owner, position_id = %id, removed, "Transactions deleted");
        Ok(removed)
    }

    /// Import a broker export into a position.
    ///
    /// Window bounds are read in the caller's timezone. A stop given to the
    /// whole second covers that full second.
    pub async fn import_csv(
        &self,
        id: PositionId,
        owner: UserId,
        form: &ImportForm,
        timezone: &str,
        data: &[u8],
    ) -> Result<ImportOutcome, LedgerError> {
        let position = self.require_position(id, owner).await?;

        let contract = form.contract.trim();
        if contract.is_empty() {
            return Err(LedgerError::validation("Contract is required"));
        }
        if data.is_empty() {
            return Err(LedgerError::validation("CSV file is required"));
        }
        if data.len() > self.max_import_bytes {
            return Err(LedgerError::validation(format!(
                "CSV file exceeds {} bytes",
                self.max_import_bytes
            )));
        }

        let exchange = form
            .exchange_id
            .map(ExchangeId::new)
            .unwrap_or(position.exchange_id);
        let importer = self.importers.get(exchange).ok_or_else(|| {
            LedgerError::validation("CSV import is not configured for selected exchange")
        })?;

        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let start = non_blank(&form.start)
            .map(|s| parse_local_datetime(&s, timezone))
            .transpose()?;
        let stop = non_blank(&form.stop)
            .map(|s| parse_window_stop(&s, timezone))
            .transpose()?;

        let request = ImportRequest {
            position: position.id,
            contract: contract.to_string(),
            start,
            stop,
        };
        let fingerprint = hex::encode(Sha256::digest(data));

        match importer.import(&request, data).await {
            Ok(inserted) => {
                info!(
                    user_id = %owner,
                    position_id = %position.id,
                    importer = importer.name(),
                    fingerprint = %fingerprint,
                    bytes = data.len(),
                    inserted,
                    "CSV import completed"
                );
                Ok(ImportOutcome {
                    inserted,
                    fingerprint,
                })
            }
            Err(failure) => {
                warn!(
                    user_id = %owner,
                    position_id = %position.id,
                    importer = importer.name(),
                    fingerprint = %fingerprint,
                    inserted = failure.inserted,
                    error = %failure.reason,
                    "CSV import failed"
                );
                Err(failure.into())
            }
        }
    }
}
