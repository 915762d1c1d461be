use crate::domain::normalize::flat_tolerance;
use crate::domain::{Decimal, MarketType, Transaction, TransactionKind};
use serde::Serialize;
use tracing::warn;

/// Running ledger state after an event has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerState {
    /// Net size: positive = long, negative = short, zero = flat.
    pub position: Decimal,

    /// Blended cost basis. `None` when flat or when a blend hit a zero divisor.
    pub avg_price: Option<Decimal>,

    pub fee_total: Decimal,
    pub fee_base_total: Decimal,
    pub funding_total: Decimal,

    /// Cumulative realized PnL.
    pub realized_pnl: Decimal,

    /// PnL realized by the most recent event only. It is credited against the
    /// cost of the next event and then dropped.
    pub last_realized: Decimal,

    pub transaction_count: usize,
}

/// Final fold result exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub position: Decimal,
    pub avg_price: Option<Decimal>,
    pub fee_total: Decimal,
    pub fee_base_total: Decimal,
    pub funding_total: Decimal,
    pub realized_pnl: Decimal,
    pub transaction_count: usize,
}

impl LedgerSnapshot {
    /// Flat within the close tolerance.
    pub fn is_flat(&self) -> bool {
        self.position.abs() <= flat_tolerance()
    }
}

impl From<&LedgerState> for LedgerSnapshot {
    fn from(state: &LedgerState) -> Self {
        LedgerSnapshot {
            position: state.position,
            avg_price: if state.position.is_zero() {
                None
            } else {
                state.avg_price
            },
            fee_total: state.fee_total,
            fee_base_total: state.fee_base_total,
            funding_total: state.funding_total,
            realized_pnl: state.realized_pnl,
            transaction_count: state.transaction_count,
        }
    }
}

/// Replays one position's events, in id order, into cost-basis state.
pub struct LedgerTracker {
    market: MarketType,
    pub state: LedgerState,
}

impl LedgerTracker {
    pub fn new(market: MarketType) -> Self {
        Self {
            market,
            state: LedgerState::default(),
        }
    }

    /// Apply a single event. Callers must feed events sorted by ascending id.
    ///
    /// Never panics: a blend that overflows leaves the average null and a
    /// close whose PnL overflows realizes zero.
    pub fn process(&mut self, tx: &Transaction) -> &LedgerState {
        let prev = &self.state;
        let spot_buy = self.market == MarketType::Spot && tx.volume.is_positive();

        // Spot buys pay the fee out of the acquired quantity.
        let delta = if spot_buy {
            accumulate(tx.volume, -tx.fee_base, "volume")
        } else {
            tx.volume
        };
        let position = accumulate(prev.position, delta, "position");

        let avg_price = if position.is_zero() {
            None
        } else {
            self.blend_avg_price(tx, spot_buy)
        };
        let realized = self.realized_delta(tx, spot_buy, position);

        self.state = LedgerState {
            position,
            avg_price,
            fee_total: accumulate(prev.fee_total, tx.fee, "fee_total"),
            fee_base_total: accumulate(prev.fee_base_total, tx.fee_base, "fee_base_total"),
            funding_total: accumulate(prev.funding_total, tx.funding_amount, "funding_total"),
            realized_pnl: accumulate(prev.realized_pnl, realized, "realized_pnl"),
            last_realized: realized,
            transaction_count: prev.transaction_count + 1,
        };
        &self.state
    }

    fn blend_avg_price(&self, tx: &Transaction, spot_buy: bool) -> Option<Decimal> {
        let prev = &self.state;
        let prev_cost = || prev.position.checked_mul(prev.avg_price.unwrap_or_default());
        let carry = prev.last_realized;

        if spot_buy {
            let net_qty = tx.volume.checked_sub(tx.fee_base)?;
            let unit_cost = tx.price.checked_mul(tx.volume)?.checked_div(net_qty)?;
            let cost = prev_cost()?
                .checked_add(net_qty.checked_mul(unit_cost)?)?
                .checked_sub(carry)?;
            return cost.checked_div(prev.position.checked_add(net_qty)?);
        }

        if !tx.volume.is_zero() {
            let cost = prev_cost()?
                .checked_add(tx.volume.checked_mul(tx.price)?)?
                .checked_add(tx.fee)?
                .checked_sub(carry)?;
            return cost.checked_div(prev.position.checked_add(tx.volume)?);
        }

        if self.market == MarketType::Futures && !tx.funding_amount.is_zero() {
            let avg = prev.avg_price?;
            return prev
                .position
                .checked_mul(avg)?
                .checked_sub(tx.funding_amount)?
                .checked_div(prev.position);
        }

        // Zero-volume trades and spot funding keep the basis.
        prev.avg_price
    }

    /// PnL is recognized only when the event takes the position exactly to
    /// zero. A trade that crosses zero realizes nothing; its remainder is
    /// blended into the average instead.
    fn realized_delta(&self, tx: &Transaction, spot_buy: bool, position: Decimal) -> Decimal {
        let prev = &self.state;
        if tx.kind == TransactionKind::Funding || tx.volume.is_zero() || !position.is_zero() {
            return Decimal::zero();
        }
        let Some(prev_avg) = prev.avg_price else {
            return Decimal::zero();
        };

        let closed_qty = tx.volume.abs().min(prev.position.abs());
        let gross = tx
            .price
            .checked_sub(prev_avg)
            .and_then(|diff| diff.checked_mul(closed_qty))
            .and_then(|pnl| pnl.checked_mul(prev.position.signum()));
        // The base fee of a spot buy already shrank the quantity received.
        let net = if spot_buy {
            gross
        } else {
            gross.and_then(|pnl| pnl.checked_sub(tx.fee))
        };

        net.unwrap_or_else(|| {
            warn!(transaction_id = %tx.id, "Realized PnL overflowed, recognizing zero");
            Decimal::zero()
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::from(&self.state)
    }
}

/// `total + amount`, keeping `total` when the sum overflows.
fn accumulate(total: Decimal, amount: Decimal, field: &'static str) -> Decimal {
    total.checked_add(amount).unwrap_or_else(|| {
        warn!(field, "Ledger total overflowed, keeping previous value");
        total
    })
}

/// Fold an id-ordered event list into its final snapshot.
pub fn fold(market: MarketType, transactions: &[Transaction]) -> LedgerSnapshot {
    let mut tracker = LedgerTracker::new(market);
    for tx in transactions {
        tracker.process(tx);
    }
    tracker.snapshot()
}

/// Running state after every event, in input order.
pub fn fold_steps(market: MarketType, transactions: &[Transaction]) -> Vec<LedgerState> {
    let mut tracker = LedgerTracker::new(market);
    transactions
        .iter()
        .map(|tx| tracker.process(tx).clone())
        .collect()
}
