use chrono::{TimeZone, Utc};
use position_ledger::engine::{fold, fold_steps, LedgerTracker};
use position_ledger::{
    Decimal, MarketType, PositionId, Transaction, TransactionId, TransactionKind,
};

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn event(
    id: i64,
    kind: TransactionKind,
    price: &str,
    volume: &str,
    fee: &str,
    fee_base: &str,
    funding: &str,
) -> Transaction {
    Transaction {
        id: TransactionId::new(id),
        position_id: PositionId::new(1),
        kind,
        price: d(price),
        volume: d(volume),
        fee: d(fee),
        fee_base: d(fee_base),
        funding_amount: d(funding),
        executed_at: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
        source_order_id: None,
        source_trade_id: None,
    }
}

fn trade(id: i64, price: &str, volume: &str) -> Transaction {
    event(id, TransactionKind::Trade, price, volume, "0", "0", "0")
}

fn within(actual: Decimal, expected: Decimal, tolerance: Decimal) -> bool {
    (actual - expected).abs() <= tolerance
}

#[test]
fn test_empty_ledger() {
    for market in [MarketType::Spot, MarketType::Futures] {
        let snapshot = fold(market, &[]);
        assert!(snapshot.position.is_zero());
        assert_eq!(snapshot.avg_price, None);
        assert!(snapshot.realized_pnl.is_zero());
        assert!(snapshot.fee_total.is_zero());
        assert!(snapshot.fee_base_total.is_zero());
        assert!(snapshot.funding_total.is_zero());
        assert_eq!(snapshot.transaction_count, 0);
        assert!(snapshot.is_flat());
    }
}

#[test]
fn test_single_futures_buy() {
    let snapshot = fold(MarketType::Futures, &[trade(1, "100", "2")]);
    assert_eq!(snapshot.position, d("2"));
    assert_eq!(snapshot.avg_price, Some(d("100")));
    assert!(snapshot.realized_pnl.is_zero());
    assert_eq!(snapshot.transaction_count, 1);
}

#[test]
fn test_full_close_recognizes_pnl() {
    let snapshot = fold(
        MarketType::Futures,
        &[trade(1, "100", "2"), trade(2, "110", "-2")],
    );
    assert!(snapshot.position.is_zero());
    assert_eq!(snapshot.avg_price, None);
    assert_eq!(snapshot.realized_pnl, d("20"));
    assert!(snapshot.is_flat());
}

#[test]
fn test_spot_buy_fee_reduces_quantity() {
    let snapshot = fold(
        MarketType::Spot,
        &[event(1, TransactionKind::Trade, "100", "10", "0", "0.1", "0")],
    );
    assert_eq!(snapshot.position, d("9.9"));
    assert_eq!(snapshot.fee_base_total, d("0.1"));

    let expected = d("1000").checked_div(d("9.9")).unwrap();
    let avg = snapshot.avg_price.expect("spot buy should have a basis");
    assert!(
        within(avg, expected, Decimal::from_parts(1, 20)),
        "avg {} expected {}",
        avg,
        expected
    );
}

#[test]
fn test_spot_round_trip_realizes_without_buy_fee_term() {
    let snapshot = fold(
        MarketType::Spot,
        &[
            event(1, TransactionKind::Trade, "100", "10", "0", "0.1", "0"),
            event(2, TransactionKind::Trade, "110", "-9.9", "2", "0", "0"),
        ],
    );
    assert!(snapshot.position.is_zero());
    assert_eq!(snapshot.avg_price, None);
    // (110 - 1000/9.9) * 9.9 - 2 = 1089 - 1000 - 2
    assert!(within(snapshot.realized_pnl, d("87"), Decimal::from_parts(1, 18)));
    assert_eq!(snapshot.fee_total, d("2"));
}

#[test]
fn test_determinism() {
    let events = vec![
        event(1, TransactionKind::Trade, "101.25", "3", "0.4", "0", "0"),
        event(2, TransactionKind::Funding, "0", "0", "0", "0", "-0.37"),
        event(3, TransactionKind::Trade, "99.5", "-1.5", "0.2", "0", "0"),
        event(4, TransactionKind::Funding, "0", "0", "0", "0", "0.11"),
        event(5, TransactionKind::Trade, "104", "-1.5", "0.2", "0", "0"),
        event(6, TransactionKind::Trade, "98", "-0.7", "0.05", "0", "0"),
    ];

    for market in [MarketType::Spot, MarketType::Futures] {
        let first = fold(market, &events);
        let second = fold(market, &events);
        assert_eq!(first, second);
        assert_eq!(
            fold_steps(market, &events),
            fold_steps(market, &events)
        );
    }
}

#[test]
fn test_fold_matches_last_step() {
    let events = vec![
        trade(1, "100", "1"),
        event(2, TransactionKind::Funding, "0", "0", "0", "0", "2"),
        trade(3, "120", "-1"),
        trade(4, "90", "-2"),
    ];

    let steps = fold_steps(MarketType::Futures, &events);
    let snapshot = fold(MarketType::Futures, &events);
    let last = steps.last().unwrap();

    assert_eq!(steps.len(), events.len());
    assert_eq!(snapshot.position, last.position);
    assert_eq!(snapshot.realized_pnl, last.realized_pnl);
    assert_eq!(snapshot.funding_total, d("2"));
    assert_eq!(snapshot.transaction_count, 4);
}

#[test]
fn test_funding_moves_basis_and_flows_into_close() {
    let mut tracker = LedgerTracker::new(MarketType::Futures);
    tracker.process(&trade(1, "100", "2"));
    tracker.process(&event(2, TransactionKind::Funding, "0", "0", "0", "0", "4"));
    assert_eq!(tracker.state.avg_price, Some(d("98")));

    tracker.process(&trade(3, "100", "-2"));
    let snapshot = tracker.snapshot();
    assert!(snapshot.position.is_zero());
    // Funding received lowered the basis, so it shows up in realized PnL.
    assert_eq!(snapshot.realized_pnl, d("4"));
    assert_eq!(snapshot.funding_total, d("4"));
}

#[test]
fn test_sub_tolerance_residue_counts_as_flat() {
    let snapshot = fold(
        MarketType::Futures,
        &[
            trade(1, "100", "1.0000000000000001"),
            trade(2, "100", "-1"),
        ],
    );
    assert_eq!(snapshot.position, d("0.0000000000000001"));
    assert!(snapshot.is_flat());
    assert!(snapshot.avg_price.is_some());
}

#[test]
fn test_flip_realizes_nothing_and_blends_average() {
    let snapshot = fold(
        MarketType::Futures,
        &[trade(1, "100", "2"), trade(2, "90", "-5")],
    );
    assert_eq!(snapshot.position, d("-3"));
    assert!(snapshot.realized_pnl.is_zero());
    // (2*100 - 5*90) / -3
    assert_eq!(
        snapshot.avg_price.map(|p| p.to_canonical_string()),
        Some(d("250").checked_div(d("3")).unwrap().to_canonical_string())
    );
}
