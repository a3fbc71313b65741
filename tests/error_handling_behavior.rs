//! Error handling behavior tests
//!
//! Every failure surfaced by the facade must carry a stable kind, an HTTP
//! status class and a subject naming the offending identity.

mod support;

use mdm_core::{AssetClass, AssetId, AssetKey, AssetMetadata, FutureMeta, Interval, TimeRange};
use mdm_warehouse::{DuckDbConnectionManager, ErrorKind, MarketData, WarehouseConfig};
use rust_decimal_macros::dec;
use support::{apple_meta, ohlcv, open_market, symbol, ts};

fn file_config(temp: &tempfile::TempDir, max_pool_size: usize, acquire_timeout_ms: u64) -> WarehouseConfig {
    WarehouseConfig {
        max_pool_size,
        acquire_timeout_ms,
        ..WarehouseConfig::default().with_db_path(temp.path().join("marketdata.duckdb"))
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

#[test]
fn when_bar_table_exists_with_foreign_layout_then_open_fails_with_schema_error() {
    // Given: A database where equity_bars was created by something else
    let temp = tempfile::tempdir().expect("tempdir");
    let config = file_config(&temp, 2, 500);
    let manager = DuckDbConnectionManager::open(&config).expect("open");
    manager
        .acquire()
        .expect("connection")
        .execute_batch("CREATE TABLE equity_bars (id INTEGER, price DOUBLE);")
        .expect("seed foreign table");

    // When: The facade ensures its schema
    let err = MarketData::open(manager.clone()).expect_err("incompatible layout");

    // Then: A schema error names the table and nothing was altered
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.subject, "equity_bars");
    assert!(!err.retryable());
    let columns: i64 = manager
        .acquire()
        .expect("connection")
        .query_row(
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = 'equity_bars'",
            [],
            |row| row.get(0),
        )
        .expect("inspect");
    assert_eq!(columns, 2);
}

#[test]
fn when_schema_is_ensured_twice_then_second_run_is_a_no_op() {
    let (_temp, _manager, market) = open_market(2);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    market.ensure_schema().expect("second ensure");

    assert!(market.get_asset(&AssetKey::Id(asset.id)).is_ok());
}

// =============================================================================
// Referential Errors
// =============================================================================

#[test]
fn when_bar_is_written_to_wrong_class_table_then_referential() {
    // Given: AAPL is an equity
    let (_temp, _manager, market) = open_market(2);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    // When: A crypto bar is written against it
    let err = market
        .upsert_bar(
            AssetClass::Crypto,
            asset.id,
            Interval::OneDay,
            ts("2024-01-02"),
            ohlcv(dec!(1), dec!(2), dec!(1), dec!(2), dec!(3)),
        )
        .expect_err("class mismatch");

    // Then: The reference is rejected without a write
    assert_eq!(err.kind(), ErrorKind::Referential);
    assert_eq!(err.http_status(), 409);
    assert!(err.message.contains("equity"));
    assert_eq!(market.count_bars(AssetClass::Equity, asset.id).expect("count"), 0);
}

#[test]
fn when_bars_are_queried_for_unknown_asset_then_referential() {
    let (_temp, _manager, market) = open_market(2);

    let err = market
        .query_bars(AssetClass::Equity, AssetId(404), Interval::OneDay, TimeRange::all())
        .expect_err("unknown asset");

    assert_eq!(err.kind(), ErrorKind::Referential);
    assert_eq!(err.subject, "asset_id=404");
}

// =============================================================================
// Not Found and Validation
// =============================================================================

#[test]
fn when_asset_id_is_unknown_then_not_found_with_404() {
    let (_temp, _manager, market) = open_market(2);

    let err = market
        .get_asset(&AssetKey::Id(AssetId(9_999)))
        .expect_err("missing");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.http_status(), 404);
    assert_eq!(err.subject, "asset_id=9999");
    assert!(!err.retryable());
}

#[test]
fn when_future_lacks_expiration_then_validation_and_no_asset_is_stored() {
    // Given: Future metadata without an expiration date
    let (_temp, _manager, market) = open_market(2);
    let metadata = AssetMetadata::CommodityFuture(FutureMeta {
        commodity_name: "Crude Oil".to_string(),
        base_future_code: "CL".to_string(),
        ..FutureMeta::default()
    });

    // When: It is registered
    let err = market
        .create_asset(&symbol("CLZ24"), AssetClass::CommodityFuture, "Crude", metadata)
        .expect_err("missing expiration");

    // Then: Validation fails and the registry is empty
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.http_status(), 400);
    assert!(err.message.contains("expiration_date"));
    assert!(market.list_assets(None).expect("list").is_empty());
}

#[test]
fn when_metadata_class_differs_from_asset_class_then_validation() {
    let (_temp, _manager, market) = open_market(2);

    let err = market
        .create_asset(&symbol("AAPL"), AssetClass::Crypto, "Apple", apple_meta())
        .expect_err("mismatched metadata");

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn when_adjusted_close_is_sent_for_crypto_then_validation() {
    let (_temp, _manager, market) = open_market(2);
    let asset = market
        .create_asset(
            &symbol("BTC-USD"),
            AssetClass::Crypto,
            "Bitcoin",
            support::bitcoin_meta(),
        )
        .expect("create");

    let values = ohlcv(dec!(1), dec!(2), dec!(1), dec!(2), dec!(3)).with_adjusted_close(dec!(2));
    let err = market
        .upsert_bar(AssetClass::Crypto, asset.id, Interval::OneDay, ts("2024-01-02"), values)
        .expect_err("equity-only field");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message.contains("adjusted_close"));
}

#[test]
fn when_range_is_inverted_then_validation_before_touching_storage() {
    let inverted = TimeRange::new(Some(ts("2024-02-01")), Some(ts("2024-01-01")));

    let err = inverted.expect_err("from after to");

    assert!(err.to_string().contains("after"));
}

// =============================================================================
// Transient Errors
// =============================================================================

#[test]
fn when_pool_is_exhausted_then_operation_fails_transient_and_retry_succeeds() {
    // Given: A pool of one connection that is already checked out
    let temp = tempfile::tempdir().expect("tempdir");
    let config = file_config(&temp, 1, 100);
    let manager = DuckDbConnectionManager::open(&config).expect("open");
    let market = MarketData::open(manager.clone()).expect("facade");
    let held = manager.acquire().expect("hold the only connection");

    // When: The facade needs a connection
    let err = market.list_assets(None).expect_err("pool exhausted");

    // Then: The failure is transient and retryable
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.http_status(), 503);
    assert!(err.retryable());

    // And: Once released, the same call succeeds
    drop(held);
    assert!(market.list_assets(None).expect("retry").is_empty());
}

#[test]
fn when_pool_is_exhausted_during_upsert_then_error_names_the_bar_slot() {
    // Given: A stored equity and a pool whose only connection is held
    let temp = tempfile::tempdir().expect("tempdir");
    let config = file_config(&temp, 1, 100);
    let manager = DuckDbConnectionManager::open(&config).expect("open");
    let market = MarketData::open(manager.clone()).expect("facade");
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");
    let held = manager.acquire().expect("hold the only connection");

    // When: A bar is upserted
    let err = market
        .upsert_bar(
            AssetClass::Equity,
            asset.id,
            Interval::OneDay,
            ts("2024-01-02"),
            ohlcv(dec!(100), dec!(105), dec!(99), dec!(104), dec!(1000)),
        )
        .expect_err("pool exhausted");

    // Then: The transient failure names the slot, not the table
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(
        err.subject,
        format!("asset_id={} interval=1d ts=2024-01-02T00:00:00Z", asset.id)
    );

    // And: Asset lookups name the asset
    let err = market
        .get_asset(&AssetKey::Id(asset.id))
        .expect_err("pool exhausted");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.subject, format!("asset_id={}", asset.id));
    drop(held);
}

#[test]
fn when_error_is_displayed_then_code_subject_and_message_are_present() {
    let (_temp, _manager, market) = open_market(2);

    let err = market
        .get_asset(&AssetKey::Symbol {
            symbol: symbol("MSFT"),
            class: AssetClass::Equity,
        })
        .expect_err("missing");

    let rendered = err.to_string();
    assert!(rendered.starts_with(&format!("[{}]", err.code())));
    assert!(rendered.contains("MSFT/equity"));
}
