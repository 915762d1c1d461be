//! Manual ledger entry forms.
//!
//! Amounts arrive as strings and are validated against the market convention
//! of the target position before anything is stored.

use crate::domain::normalize::{parse_form_decimal, parse_local_datetime};
use crate::domain::{Decimal, MarketType, NewTransaction, Side, TransactionKind};
use crate::error::LedgerError;
use serde::Deserialize;
use std::str::FromStr;

/// Body of a create/edit transaction request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionForm {
    /// `trade` (default) or `funding`.
    #[serde(default)]
    pub kind: Option<String>,
    /// `buy` or `sell`; trades only.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub fee_base: Option<String>,
    #[serde(default)]
    pub funding: Option<String>,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS[.fff]`.
    #[serde(default)]
    pub date: String,
}

fn required(value: Option<&str>, field: &str) -> Result<Decimal, LedgerError> {
    parse_form_decimal(value)?.ok_or_else(|| LedgerError::validation(format!("{} is required", field)))
}

impl TransactionForm {
    /// Validate the form for a position of `market` and build the event.
    ///
    /// Volume is signed by the action; price and fees are stored as absolute
    /// values.
    pub fn to_new_transaction(
        &self,
        market: MarketType,
        timezone: &str,
    ) -> Result<NewTransaction, LedgerError> {
        if self.date.trim().is_empty() {
            return Err(LedgerError::validation("Date is required"));
        }
        let executed_at = parse_local_datetime(&self.date, timezone)?;

        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => TransactionKind::Trade,
            Some(raw) => TransactionKind::from_str(raw)
                .map_err(|_| LedgerError::validation(format!("Unknown transaction type {}", raw)))?,
        };

        if kind == TransactionKind::Funding {
            if market == MarketType::Spot {
                return Err(LedgerError::validation(
                    "Funding entries are only allowed for futures positions",
                ));
            }
            let amount = required(self.funding.as_deref(), "Funding")?;
            return Ok(NewTransaction::funding(amount, executed_at));
        }

        let side = match self.action.as_deref().map(str::trim) {
            None | Some("") => return Err(LedgerError::validation("Action is required")),
            Some(raw) => Side::from_str(raw)
                .map_err(|_| LedgerError::validation(format!("Unknown action {}", raw)))?,
        };
        let price = required(self.price.as_deref(), "Price")?.abs();
        let quantity = required(self.volume.as_deref(), "Volume")?.abs();
        if quantity.is_zero() {
            return Err(LedgerError::validation("Volume must be greater than zero"));
        }
        let volume = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };

        let (fee, fee_base) = match (market, side) {
            (MarketType::Spot, Side::Buy) => (
                Decimal::zero(),
                required(self.fee_base.as_deref(), "Fee base")?.abs(),
            ),
            _ => (required(self.fee.as_deref(), "Fee")?.abs(), Decimal::zero()),
        };

        Ok(NewTransaction::trade(price, volume, fee, fee_base, executed_at))
    }
}
