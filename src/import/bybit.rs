//! Bybit derivatives transaction-log export.
//!
//! The export lists newest rows first. Rows are replayed oldest first so the
//! assigned ids follow execution order.

use super::{CsvImporter, ImportError, ImportFailure, ImportRequest};
use crate::db::Repository;
use crate::domain::normalize::{parse_csv_datetime_utc, parse_csv_decimal};
use crate::domain::{Decimal, NewTransaction};
use async_trait::async_trait;
use csv::StringRecord;
use std::sync::Arc;
use tracing::{debug, info};

const COL_CONTRACT: &str = "Contract";
const COL_TIME: &str = "Time";
const COL_TYPE: &str = "Type";
const COL_DIRECTION: &str = "Direction";
const COL_QUANTITY: &str = "Quantity";
const COL_PRICE: &str = "Filled Price";
const COL_FUNDING: &str = "Funding";
const COL_FEE: &str = "Fee Paid";
const COL_ORDER_ID: &str = "OrderId";
const COL_TRADE_ID: &str = "TradeId";

const SETTLEMENT: &str = "SETTLEMENT";
const BUY: &str = "BUY";

/// Column positions resolved from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Columns {
    contract: usize,
    time: usize,
    kind: usize,
    direction: usize,
    quantity: usize,
    price: usize,
    funding: usize,
    fee: usize,
    order_id: Option<usize>,
    trade_id: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers.iter().position(|header| {
                header
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(name)
            })
        };
        let require =
            |name: &str| find(name).ok_or_else(|| ImportError::MissingColumn(name.to_string()));

        Ok(Columns {
            contract: require(COL_CONTRACT)?,
            time: require(COL_TIME)?,
            kind: require(COL_TYPE)?,
            direction: require(COL_DIRECTION)?,
            quantity: require(COL_QUANTITY)?,
            price: require(COL_PRICE)?,
            funding: require(COL_FUNDING)?,
            fee: require(COL_FEE)?,
            order_id: find(COL_ORDER_ID),
            trade_id: find(COL_TRADE_ID),
        })
    }

    /// Fields a row needs before it can be mapped.
    fn min_len(&self) -> usize {
        [
            self.contract,
            self.time,
            self.kind,
            self.direction,
            self.quantity,
            self.price,
            self.funding,
            self.fee,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Outcome of mapping one export row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowOutcome {
    Skipped,
    Filtered,
    Mapped(NewTransaction),
}

#[derive(Debug)]
pub struct BybitCsvImporter {
    repo: Arc<Repository>,
}

impl BybitCsvImporter {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    fn read_records(data: &[u8]) -> Result<(Columns, Vec<StringRecord>), ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers = reader
            .headers()
            .map_err(|e| ImportError::Malformed(e.to_string()))?
            .clone();
        let columns = Columns::resolve(&headers)?;

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ImportError::Malformed(e.to_string()))?;
        if records.is_empty() {
            return Err(ImportError::Empty);
        }

        Ok((columns, records))
    }

    fn map_row(
        columns: &Columns,
        record: &StringRecord,
        request: &ImportRequest,
    ) -> Result<RowOutcome, ImportError> {
        if record.len() <= 1 || record.len() < columns.min_len() {
            return Ok(RowOutcome::Skipped);
        }
        let line = record.position().map_or(0, |p| p.line());
        let field = |index: usize| record.get(index).unwrap_or("").trim();
        let number = |index: usize, column: &str| {
            parse_csv_decimal(field(index)).map_err(|_| ImportError::InvalidNumber {
                line,
                column: column.to_string(),
                value: field(index).to_string(),
            })
        };

        let executed_at =
            parse_csv_datetime_utc(field(columns.time)).map_err(|_| ImportError::InvalidDate {
                line,
                value: field(columns.time).to_string(),
            })?;

        if field(columns.contract) != request.contract.trim() || !request.contains(executed_at) {
            return Ok(RowOutcome::Filtered);
        }

        let tx = if field(columns.kind).eq_ignore_ascii_case(SETTLEMENT) {
            NewTransaction::funding(number(columns.funding, COL_FUNDING)?, executed_at)
        } else {
            let quantity = number(columns.quantity, COL_QUANTITY)?.abs();
            let buy = field(columns.direction).eq_ignore_ascii_case(BUY);
            let volume = if buy || quantity.is_zero() {
                quantity
            } else {
                -quantity
            };
            NewTransaction::trade(
                number(columns.price, COL_PRICE)?.abs(),
                volume,
                number(columns.fee, COL_FEE)?.abs(),
                Decimal::zero(),
                executed_at,
            )
        };

        let source = |index: Option<usize>| index.map(|i| field(i).to_string());
        Ok(RowOutcome::Mapped(
            tx.with_source(source(columns.order_id), source(columns.trade_id)),
        ))
    }
}

#[async_trait]
impl CsvImporter for BybitCsvImporter {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn import(&self, request: &ImportRequest, data: &[u8]) -> Result<u64, ImportFailure> {
        let (columns, records) = Self::read_records(data)?;

        let mut inserted = 0u64;
        let mut matched = 0u64;
        let mut skipped = 0u64;

        for record in records.iter().rev() {
            let tx = match Self::map_row(&columns, record, request)
                .map_err(|reason| ImportFailure::new(inserted, reason))?
            {
                RowOutcome::Mapped(tx) => tx,
                RowOutcome::Skipped => {
                    skipped += 1;
                    continue;
                }
                RowOutcome::Filtered => continue,
            };
            matched += 1;

            let written = self
                .repo
                .insert_if_absent(request.position, &tx)
                .await
                .map_err(|e| ImportFailure::new(inserted, ImportError::Store(e.to_string())))?;
            if written {
                inserted += 1;
            } else {
                debug!(
                    position_id = %request.position,
                    order_id = ?tx.source_order_id,
                    trade_id = ?tx.source_trade_id,
                    "Duplicate row skipped"
                );
            }
        }

        if matched == 0 {
            return Err(ImportFailure::new(0, ImportError::NoData));
        }

        info!(
            position_id = %request.position,
            contract = %request.contract,
            rows = records.len(),
            matched,
            inserted,
            skipped,
            "Bybit import finished"
        );
        Ok(inserted)
    }
}
