use position_ledger::orchestration::{ImportForm, PositionForm};
use position_ledger::{
    init_db, Config, Decimal, ExchangeId, ImportError, ImporterRegistry, LedgerError, Position,
    PositionManager, Repository, TransactionKind, UserId,
};
use std::sync::Arc;
use tempfile::TempDir;

const OWNER: UserId = UserId(1);

// Bybit lists the newest rows first.
const EXPORT: &str = "\u{feff}Contract,Type,Direction,Quantity,Position,Filled Price,Funding,Fee Paid,Cash Flow,Change,Wallet Balance,Action,OrderId,TradeId,Time
BTCUSDT,TRADE,SELL,0.010,0,43100.5,0,0.2370,0,4.1,1000,CLOSE,o-3,t-3,2024-01-01 12:00:00.500
BTCUSDT,SETTLEMENT,--,0,0.010,0,-0.0421,0,0,0,1000,--,,,2024-01-01 08:00:00
ETHUSDT,TRADE,BUY,1.5,1.5,2250,0,1.1,0,0,1000,OPEN,o-9,t-9,2024-01-01 07:00:00
BTCUSDT,TRADE,BUY,0.010,0.010,\"42,700\",0,0.2348,0,0,1000,OPEN,o-1,t-1,2024-01-01 06:30:00.250
";

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

async fn setup(max_import_bytes: usize) -> (PositionManager, Position, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        bybit_exchange_id: ExchangeId::new(7),
        default_timezone: "UTC".to_string(),
        max_import_bytes,
    };
    let importers = ImporterRegistry::with_defaults(&config, repo.clone());
    let manager = PositionManager::new(repo, importers, max_import_bytes);

    let position = manager
        .create_position(
            OWNER,
            &PositionForm {
                contract_name: "BTCUSDT".to_string(),
                exchange_id: 7,
                market_type: Some("futures".to_string()),
                start: "2024-01-01 00:00:00".to_string(),
            },
            "UTC",
        )
        .await
        .unwrap();

    (manager, position, temp_dir)
}

fn form(start: Option<&str>, stop: Option<&str>) -> ImportForm {
    ImportForm {
        exchange_id: None,
        contract: "BTCUSDT".to_string(),
        start: start.map(str::to_string),
        stop: stop.map(str::to_string),
    }
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    let first = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", EXPORT.as_bytes())
        .await
        .unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.fingerprint.len(), 64);

    let second = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", EXPORT.as_bytes())
        .await
        .unwrap();
    // The settlement row carries no broker ids, so only it is written again.
    assert_eq!(second.inserted, 1);
    assert_eq!(second.fingerprint, first.fingerprint);

    let events = manager.repo().list_transactions(position.id).await.unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(
        events
            .iter()
            .filter(|tx| tx.kind == TransactionKind::Trade)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_trades_only_export_is_idempotent() {
    let (manager, position, _temp) = setup(1024 * 1024).await;
    let export = "Contract,Type,Direction,Quantity,Filled Price,Funding,Fee Paid,Time,OrderId,TradeId
BTCUSDT,TRADE,SELL,1,110,0,0.1,2024-01-01 12:00:00,o-2,t-2
BTCUSDT,TRADE,BUY,1,100,0,0.1,2024-01-01 10:00:00,o-1,t-1
";

    let first = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", export.as_bytes())
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);

    let second = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", export.as_bytes())
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);

    let view = manager.get_ledger_snapshot(position.id, OWNER).await.unwrap();
    assert_eq!(view.ledger.transaction_count, 2);
    // 110 - 100 on one unit, less 0.2 of fees.
    assert_eq!(view.ledger.realized_pnl, d("9.8"));
}

#[tokio::test]
async fn test_bad_row_keeps_partial_count() {
    let (manager, position, _temp) = setup(1024 * 1024).await;
    let export = "Contract,Type,Direction,Quantity,Filled Price,Funding,Fee Paid,Time,OrderId,TradeId
BTCUSDT,TRADE,SELL,1,not-a-price,0,0.1,2024-01-01 12:00:00,o-2,t-2
BTCUSDT,TRADE,BUY,1,100,0,0.1,2024-01-01 10:00:00,o-1,t-1
";

    let err = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", export.as_bytes())
        .await
        .unwrap_err();
    match err {
        LedgerError::Import { inserted, reason } => {
            assert_eq!(inserted, 1);
            assert!(matches!(reason, ImportError::InvalidNumber { .. }));
        }
        other => panic!("expected a row failure, got {:?}", other),
    }
    assert_eq!(
        manager.repo().count_transactions(position.id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_import_maps_rows_oldest_first() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", EXPORT.as_bytes())
        .await
        .unwrap();

    let events = manager.repo().list_transactions(position.id).await.unwrap();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].kind, TransactionKind::Trade);
    assert_eq!(events[0].volume, d("0.01"));
    assert_eq!(events[0].price, d("42700"));
    assert_eq!(events[0].source_trade_id.as_deref(), Some("t-1"));

    assert_eq!(events[1].kind, TransactionKind::Funding);
    assert_eq!(events[1].funding_amount, d("-0.0421"));

    assert_eq!(events[2].volume, d("-0.01"));
    assert_eq!(events[2].fee, d("0.237"));

    let view = manager.get_ledger_snapshot(position.id, OWNER).await.unwrap();
    assert!(view.ledger.is_flat());
    assert_eq!(view.ledger.transaction_count, 3);
}

#[tokio::test]
async fn test_stop_without_fraction_covers_whole_second() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    let outcome = manager
        .import_csv(
            position.id,
            OWNER,
            &form(Some("2024-01-01 08:00:00"), Some("2024-01-01 12:00:00")),
            "UTC",
            EXPORT.as_bytes(),
        )
        .await
        .unwrap();
    // Settlement at 08:00:00 and the close at 12:00:00.500.
    assert_eq!(outcome.inserted, 2);
}

#[tokio::test]
async fn test_explicit_stop_fraction_is_exact() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    let outcome = manager
        .import_csv(
            position.id,
            OWNER,
            &form(Some("2024-01-01 08:00:00"), Some("2024-01-01 12:00:00.000")),
            "UTC",
            EXPORT.as_bytes(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 1);
}

#[tokio::test]
async fn test_window_is_read_in_caller_timezone() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    // 13:00 in Berlin is 12:00 UTC in winter.
    let outcome = manager
        .import_csv(
            position.id,
            OWNER,
            &form(Some("2024-01-01 13:00:00"), None),
            "Europe/Berlin",
            EXPORT.as_bytes(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 1);
}

#[tokio::test]
async fn test_no_matching_rows_is_no_data() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    let mut other = form(None, None);
    other.contract = "SOLUSDT".to_string();
    let err = manager
        .import_csv(position.id, OWNER, &other, "UTC", EXPORT.as_bytes())
        .await
        .unwrap_err();

    match err {
        LedgerError::Import { inserted, reason } => {
            assert_eq!(inserted, 0);
            assert_eq!(reason, ImportError::NoData);
            assert_eq!(
                reason.to_string(),
                "There is no data with the specified parameters"
            );
        }
        other => panic!("expected NoData import error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_column_and_empty_file() {
    let (manager, position, _temp) = setup(1024 * 1024).await;

    let no_fee = "Contract,Type,Direction,Quantity,Filled Price,Funding,Time\nBTCUSDT,TRADE,BUY,1,100,0,2024-01-01 00:00:00\n";
    let err = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", no_fee.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Import { inserted: 0, reason: ImportError::MissingColumn(ref c) } if c == "Fee Paid"
    ));

    let header_only = "Contract,Type,Direction,Quantity,Filled Price,Funding,Fee Paid,Time\n";
    let err = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", header_only.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Import { reason: ImportError::Empty, .. }
    ));
}

#[tokio::test]
async fn test_request_validation() {
    let (manager, position, _temp) = setup(64).await;

    let err = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", b"")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = manager
        .import_csv(position.id, OWNER, &form(None, None), "UTC", EXPORT.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(ref msg) if msg.contains("exceeds")));

    let mut unknown = form(None, None);
    unknown.exchange_id = Some(99);
    let err = manager
        .import_csv(position.id, OWNER, &unknown, "UTC", b"x")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "CSV import is not configured for selected exchange"
    );

    let err = manager
        .import_csv(position.id, UserId(2), &form(None, None), "UTC", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}
