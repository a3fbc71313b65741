//! Behavior-driven tests for the market data warehouse
//!
//! These tests verify what callers observe through the facade: asset
//! round-trips, idempotent bar upserts, batch outcomes and cascade deletes.

mod support;

use mdm_core::{
    AssetClass, AssetKey, AssetMetadata, AssetPatch, BarRow, EquityPatch, Interval,
    MetadataPatch, TimeRange,
};
use mdm_warehouse::{DeletePolicy, ErrorKind, MarketData};
use rust_decimal_macros::dec;
use support::{apple_meta, bitcoin_meta, crude_meta, ohlcv, open_market, symbol, ts};

// =============================================================================
// Assets: Registration and Lookup
// =============================================================================

#[test]
fn when_asset_is_created_then_lookup_by_id_and_symbol_returns_same_metadata() {
    // Given: A fresh warehouse
    let (_temp, _manager, market) = open_market(4);

    // When: Each class of asset is registered
    let cases = [
        ("AAPL", AssetClass::Equity, "Apple", apple_meta()),
        ("BTC-USD", AssetClass::Crypto, "Bitcoin", bitcoin_meta()),
        ("CLZ24", AssetClass::CommodityFuture, "Crude Dec 24", crude_meta()),
    ];
    for (ticker, class, name, metadata) in cases {
        let created = market
            .create_asset(&symbol(ticker), class, name, metadata.clone())
            .expect("create should succeed");

        // Then: Both lookup forms return the stored asset unchanged
        let by_id = market
            .get_asset(&AssetKey::Id(created.id))
            .expect("lookup by id");
        let by_symbol = market
            .get_asset(&AssetKey::Symbol {
                symbol: symbol(&ticker.to_lowercase()),
                class,
            })
            .expect("lookup by symbol is case-insensitive");

        assert_eq!(by_id, created);
        assert_eq!(by_symbol, created);
        assert_eq!(by_id.metadata, metadata);
        assert_eq!(by_id.display_name, name);
    }
}

#[test]
fn when_duplicate_symbol_and_class_is_created_then_conflict_regardless_of_metadata() {
    // Given: AAPL is registered as an equity
    let (_temp, _manager, market) = open_market(4);
    market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("first create");

    // When: The same pair is registered again with different metadata
    let other_meta = AssetMetadata::Equity(mdm_core::EquityMeta {
        company_name: "Another Apple".to_string(),
        exchange: "NYSE".to_string(),
        ..mdm_core::EquityMeta::default()
    });
    let err = market
        .create_asset(&symbol(" aapl "), AssetClass::Equity, "Apple 2", other_meta)
        .expect_err("duplicate must fail");

    // Then: A conflict naming the pair is reported
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.subject, "AAPL/equity");
    assert_eq!(market.list_assets(None).expect("list").len(), 1);
}

#[test]
fn when_patch_changes_class_then_it_is_rejected_and_asset_unchanged() {
    // Given: A registered equity
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    // When: A patch tries to move it to another class
    let patch = AssetPatch {
        asset_class: Some(AssetClass::Crypto),
        display_name: Some("Apple Coin".to_string()),
        ..AssetPatch::default()
    };
    let err = market.update_asset(asset.id, &patch).expect_err("class is immutable");

    // Then: Validation fails and nothing was written
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        market.get_asset(&AssetKey::Id(asset.id)).expect("get"),
        asset
    );
}

#[test]
fn when_metadata_patch_is_applied_then_only_named_fields_change() {
    // Given: A registered equity
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    // When: Only the exchange is patched
    let patch = AssetPatch {
        metadata: Some(MetadataPatch::Equity(EquityPatch {
            exchange: Some("NYSE".to_string()),
            ..EquityPatch::default()
        })),
        ..AssetPatch::default()
    };
    market.update_asset(asset.id, &patch).expect("update");

    // Then: Other metadata survives
    let stored = market.get_asset(&AssetKey::Id(asset.id)).expect("get");
    let AssetMetadata::Equity(meta) = stored.metadata else {
        panic!("class must not change");
    };
    assert_eq!(meta.exchange, "NYSE");
    assert_eq!(meta.company_name, "Apple Inc.");
    assert_eq!(meta.currency.as_deref(), Some("USD"));
}

#[test]
fn when_missing_asset_is_updated_then_not_found() {
    let (_temp, _manager, market) = open_market(4);
    let patch = AssetPatch {
        display_name: Some("Ghost".to_string()),
        ..AssetPatch::default()
    };

    let err = market
        .update_asset(mdm_core::AssetId(12_345), &patch)
        .expect_err("missing asset");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.http_status(), 404);
}

// =============================================================================
// Bars: Upsert and Query
// =============================================================================

#[test]
fn when_daily_bar_is_upserted_then_query_for_that_day_returns_exactly_it() {
    // Given: AAPL registered as an equity
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    // When: One daily bar is upserted for 2024-01-02
    let day = ts("2024-01-02");
    let values = ohlcv(dec!(100), dec!(105), dec!(99), dec!(104), dec!(1000));
    market
        .upsert_bar(AssetClass::Equity, asset.id, Interval::OneDay, day, values)
        .expect("upsert");

    // Then: Querying that day returns exactly that bar
    let bars = market
        .fetch_bars(AssetClass::Equity, asset.id, Interval::OneDay, TimeRange::at(day))
        .expect("query");
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].asset_id, asset.id);
    assert_eq!(bars[0].ts, day);
    assert_eq!(bars[0].values, values);
}

#[test]
fn when_same_slot_is_upserted_twice_then_one_row_holds_latest_close() {
    // Given: A crypto asset
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("BTC-USD"), AssetClass::Crypto, "Bitcoin", bitcoin_meta())
        .expect("create");
    let slot = ts("2024-03-01T14:00:00Z");

    // When: The same slot is written twice with different closes
    for close in [dec!(61000.5), dec!(62000.25)] {
        market
            .upsert_bar(
                AssetClass::Crypto,
                asset.id,
                Interval::OneHour,
                slot,
                ohlcv(dec!(61000), dec!(63000), dec!(60000), close, dec!(12.5)),
            )
            .expect("upsert");
    }

    // Then: Exactly one row exists and it reflects the latest write
    let bars = market
        .fetch_bars(AssetClass::Crypto, asset.id, Interval::OneHour, TimeRange::all())
        .expect("query");
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].values.close, dec!(62000.25));
    assert_eq!(market.count_bars(AssetClass::Crypto, asset.id).expect("count"), 1);
}

#[test]
fn when_ohlc_ordering_is_violated_then_validation_error_and_nothing_written() {
    // Given: An equity
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");
    let day = ts("2024-01-02");

    // When: Bars violate high >= max(open, close) or low <= min(open, close)
    let broken = [
        ohlcv(dec!(100), dec!(103), dec!(99), dec!(104), dec!(10)),
        ohlcv(dec!(100), dec!(105), dec!(101), dec!(104), dec!(10)),
        ohlcv(dec!(104), dec!(100), dec!(99), dec!(100), dec!(10)),
    ];
    for values in broken {
        let err = market
            .upsert_bar(AssetClass::Equity, asset.id, Interval::OneDay, day, values)
            .expect_err("invalid bar");

        // Then: Each fails validation with the slot named
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.subject.contains("ts=2024-01-02T00:00:00Z"));
    }
    assert_eq!(market.count_bars(AssetClass::Equity, asset.id).expect("count"), 0);
}

#[test]
fn when_timestamp_is_off_the_interval_grid_then_validation_error() {
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    let err = market
        .upsert_bar(
            AssetClass::Equity,
            asset.id,
            Interval::FiveMinutes,
            ts("2024-01-02T14:31:00Z"),
            ohlcv(dec!(1), dec!(1), dec!(1), dec!(1), dec!(0)),
        )
        .expect_err("misaligned");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message.contains("5m"));
}

#[test]
fn when_intervals_differ_then_slots_do_not_collide() {
    // Given: A commodity future with a daily and an hourly bar at midnight
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("CLZ24"), AssetClass::CommodityFuture, "Crude", crude_meta())
        .expect("create");
    let midnight = ts("2024-01-02");
    let values = ohlcv(dec!(71.2), dec!(72.8), dec!(70.9), dec!(72.1), dec!(350000));
    for interval in [Interval::OneDay, Interval::OneHour] {
        market
            .upsert_bar(AssetClass::CommodityFuture, asset.id, interval, midnight, values)
            .expect("upsert");
    }

    // Then: Each interval sees only its own bar
    for interval in [Interval::OneDay, Interval::OneHour] {
        let bars = market
            .fetch_bars(AssetClass::CommodityFuture, asset.id, interval, TimeRange::all())
            .expect("query");
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].interval, interval);
    }
}

#[test]
fn when_query_is_iterated_twice_then_sequences_match() {
    // Given: Ten minute bars
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("ETH-USD"), AssetClass::Crypto, "Ether", bitcoin_meta())
        .expect("create");
    for minute in 0..10 {
        let slot = ts(&format!("2024-05-01T10:{minute:02}:00Z"));
        market
            .upsert_bar(
                AssetClass::Crypto,
                asset.id,
                Interval::OneMinute,
                slot,
                ohlcv(dec!(3000), dec!(3010), dec!(2990), dec!(3005), dec!(1.5)),
            )
            .expect("upsert");
    }

    // When: A bounded range is iterated twice in small pages
    let range = TimeRange::new(Some(ts("2024-05-01T10:02:00Z")), Some(ts("2024-05-01T10:07:00Z")))
        .expect("range");
    let query = market
        .query_bars(AssetClass::Crypto, asset.id, Interval::OneMinute, range)
        .expect("query")
        .with_page_size(4);
    let first: Vec<_> = query.iter().collect::<Result<_, _>>().expect("first pass");
    let second: Vec<_> = query.iter().collect::<Result<_, _>>().expect("second pass");

    // Then: Both passes return the same ascending, inclusive window
    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
    assert!(first.windows(2).all(|pair| pair[0].ts < pair[1].ts));
    assert_eq!(first[0].ts, ts("2024-05-01T10:02:00Z"));
    assert_eq!(first[5].ts, ts("2024-05-01T10:07:00Z"));
}

// =============================================================================
// Bars: Batch Ingestion
// =============================================================================

#[test]
fn when_batch_has_negative_volume_in_row_two_then_only_rows_one_and_three_land() {
    // Given: An equity
    let (_temp, _manager, market) = open_market(4);
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");

    // When: A batch of three bars is upserted where row 2 has negative volume
    let rows = [
        BarRow::new(ts("2024-01-02"), ohlcv(dec!(100), dec!(105), dec!(99), dec!(104), dec!(1000))),
        BarRow::new(ts("2024-01-03"), ohlcv(dec!(104), dec!(106), dec!(102), dec!(103), dec!(-5))),
        BarRow::new(ts("2024-01-04"), ohlcv(dec!(103), dec!(108), dec!(101), dec!(107), dec!(1500))),
    ];
    let report = market
        .upsert_bars_batch(AssetClass::Equity, asset.id, Interval::OneDay, &rows)
        .expect("batch runs");

    // Then: Rows 1 and 3 succeed, row 2 fails validation
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 1);
    assert_eq!(failures[0].1.kind(), ErrorKind::Validation);

    // And: A query shows only rows 1 and 3
    let stored: Vec<_> = market
        .fetch_bars(AssetClass::Equity, asset.id, Interval::OneDay, TimeRange::all())
        .expect("query")
        .into_iter()
        .map(|bar| bar.ts)
        .collect();
    assert_eq!(stored, vec![ts("2024-01-02"), ts("2024-01-04")]);
}

#[test]
fn when_batch_targets_unknown_asset_then_whole_call_is_referential() {
    let (_temp, _manager, market) = open_market(4);
    let rows = [BarRow::new(
        ts("2024-01-02"),
        ohlcv(dec!(1), dec!(2), dec!(1), dec!(2), dec!(3)),
    )];

    let err = market
        .upsert_bars_batch(AssetClass::Equity, mdm_core::AssetId(77), Interval::OneDay, &rows)
        .expect_err("unknown asset");

    assert_eq!(err.kind(), ErrorKind::Referential);
}

// =============================================================================
// Deletes
// =============================================================================

fn asset_with_bars(market: &MarketData, count: u32) -> mdm_core::AssetId {
    let asset = market
        .create_asset(&symbol("AAPL"), AssetClass::Equity, "Apple", apple_meta())
        .expect("create");
    for day in 2..2 + count {
        market
            .upsert_bar(
                AssetClass::Equity,
                asset.id,
                Interval::OneDay,
                ts(&format!("2024-01-{day:02}")),
                ohlcv(dec!(100), dec!(105), dec!(99), dec!(104), dec!(1000)),
            )
            .expect("upsert");
    }
    asset.id
}

#[test]
fn when_asset_with_bars_is_deleted_without_cascade_then_referential_and_nothing_removed() {
    // Given: An asset with three bars
    let (_temp, _manager, market) = open_market(4);
    let asset_id = asset_with_bars(&market, 3);

    // When: It is deleted under the default policy
    let err = market
        .delete_asset(asset_id, DeletePolicy::default())
        .expect_err("dependent bars");

    // Then: The delete is refused and asset plus bars remain
    assert_eq!(err.kind(), ErrorKind::Referential);
    assert_eq!(err.subject, format!("asset_id={asset_id}"));
    assert!(market.get_asset(&AssetKey::Id(asset_id)).is_ok());
    assert_eq!(market.count_bars(AssetClass::Equity, asset_id).expect("count"), 3);
}

#[test]
fn when_asset_is_deleted_with_cascade_then_asset_and_bars_are_gone() {
    // Given: An asset with three bars
    let (_temp, manager, market) = open_market(4);
    let asset_id = asset_with_bars(&market, 3);

    // When: It is deleted with cascade
    let outcome = market
        .delete_asset(asset_id, DeletePolicy::Cascade)
        .expect("cascade delete");

    // Then: Asset and all of its bars are gone
    assert_eq!(outcome.bars_removed, 3);
    let err = market
        .get_asset(&AssetKey::Id(asset_id))
        .expect_err("asset removed");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let remaining: i64 = manager
        .acquire()
        .expect("connection")
        .query_row(
            "SELECT COUNT(*) FROM equity_bars WHERE asset_id = ?",
            [asset_id.get()],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(remaining, 0);
}

#[test]
fn when_bar_range_is_deleted_then_count_is_returned_and_others_survive() {
    let (_temp, _manager, market) = open_market(4);
    let asset_id = asset_with_bars(&market, 5);

    let range = TimeRange::new(Some(ts("2024-01-03")), Some(ts("2024-01-04"))).expect("range");
    let removed = market
        .delete_bars(AssetClass::Equity, asset_id, Interval::OneDay, range)
        .expect("delete");

    assert_eq!(removed, 2);
    assert_eq!(market.count_bars(AssetClass::Equity, asset_id).expect("count"), 3);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn when_database_is_reopened_then_assets_and_bars_persist() {
    // Given: Data written through one handle
    let (temp, manager, market) = open_market(2);
    let asset_id = asset_with_bars(&market, 2);
    let config = mdm_warehouse::WarehouseConfig::default()
        .with_db_path(temp.path().join("data").join("marketdata.duckdb"));
    drop(market);
    drop(manager);

    // When: The file is reopened
    let manager = mdm_warehouse::DuckDbConnectionManager::open(&config).expect("reopen");
    let market = MarketData::open(manager).expect("facade");

    // Then: Everything is still there
    let asset = market.get_asset(&AssetKey::Id(asset_id)).expect("asset");
    assert_eq!(asset.symbol.as_str(), "AAPL");
    assert_eq!(market.count_bars(AssetClass::Equity, asset_id).expect("count"), 2);
}
