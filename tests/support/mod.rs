//! Shared fixtures for the warehouse behaviour tests.

#![allow(dead_code)]

use mdm_core::{
    AssetMetadata, CryptoMeta, EquityMeta, FutureMeta, Ohlcv, Symbol, UtcDateTime,
};
use mdm_warehouse::{DuckDbConnectionManager, MarketData, WarehouseConfig};
use rust_decimal::Decimal;
use tempfile::TempDir;
use time::macros::date;

/// A facade over a fresh database file; keep the `TempDir` alive.
pub fn open_market(max_pool_size: usize) -> (TempDir, DuckDbConnectionManager, MarketData) {
    let (temp, manager) = fresh_database(max_pool_size);
    let market = MarketData::open(manager.clone()).expect("open facade");
    (temp, manager, market)
}

/// A database file with no tables yet.
pub fn fresh_database(max_pool_size: usize) -> (TempDir, DuckDbConnectionManager) {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = WarehouseConfig {
        mdm_home: temp.path().to_path_buf(),
        db_path: temp.path().join("data").join("marketdata.duckdb"),
        max_pool_size,
        acquire_timeout_ms: 2_000,
        statement_timeout_ms: 10_000,
        query_page_size: 100,
    };
    let manager = DuckDbConnectionManager::open(&config).expect("open database");
    (temp, manager)
}

pub fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

pub fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("valid timestamp")
}

pub fn ohlcv(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Ohlcv {
    Ohlcv::new(open, high, low, close, volume)
}

pub fn apple_meta() -> AssetMetadata {
    AssetMetadata::Equity(EquityMeta {
        company_name: "Apple Inc.".to_string(),
        exchange: "NASDAQ".to_string(),
        currency: Some("USD".to_string()),
        industry: Some("Consumer Electronics".to_string()),
        ..EquityMeta::default()
    })
}

pub fn bitcoin_meta() -> AssetMetadata {
    AssetMetadata::Crypto(CryptoMeta {
        name: "Bitcoin".to_string(),
        circulating_supply: Some(19_600_000),
        max_supply: Some(21_000_000),
        ..CryptoMeta::default()
    })
}

pub fn crude_meta() -> AssetMetadata {
    AssetMetadata::CommodityFuture(FutureMeta {
        commodity_name: "Crude Oil".to_string(),
        base_future_code: "CL".to_string(),
        expiration_date: Some(date!(2024 - 12 - 19)),
        exchange: Some("NYMEX".to_string()),
        ..FutureMeta::default()
    })
}
