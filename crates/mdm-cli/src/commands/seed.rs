//! Random but valid daily bars for demos and manual testing.

use mdm_core::{
    Asset, AssetClass, AssetKey, AssetMetadata, BarRow, CryptoMeta, EquityMeta, FutureMeta,
    Interval, Ohlcv, Symbol, UtcDateTime,
};
use mdm_warehouse::{ErrorKind, MarketData};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use time::{Date, Duration};
use tracing::info;

use crate::cli::SeedArgs;
use crate::error::CliError;

use super::parse_class;

pub fn run(args: &SeedArgs, market: &MarketData) -> Result<Value, CliError> {
    if args.count == 0 {
        return Err(CliError::Command(String::from(
            "--count must be greater than zero",
        )));
    }
    let symbol = Symbol::parse(&args.symbol)?;
    let class = parse_class(&args.class)?;
    let start = UtcDateTime::parse(&args.start)?.into_inner().date();

    let asset = find_or_create(market, &symbol, class, start)?;
    let mut rng = match args.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };
    let rows = random_walk(&mut rng, start, args.count, class);
    let report = market.upsert_bars_batch(class, asset.id, Interval::OneDay, &rows)?;
    info!(asset_id = %asset.id, %symbol, rows = report.succeeded(), "seeded bars");

    Ok(json!({
        "asset": asset,
        "succeeded": report.succeeded(),
        "failed": report.failed(),
    }))
}

fn find_or_create(
    market: &MarketData,
    symbol: &Symbol,
    class: AssetClass,
    start: Date,
) -> Result<Asset, CliError> {
    let key = AssetKey::Symbol {
        symbol: symbol.clone(),
        class,
    };
    match market.get_asset(&key) {
        Ok(asset) => Ok(asset),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            let metadata = seed_metadata(symbol, class, start);
            Ok(market.create_asset(symbol, class, symbol.as_str(), metadata)?)
        }
        Err(error) => Err(error.into()),
    }
}

fn seed_metadata(symbol: &Symbol, class: AssetClass, start: Date) -> AssetMetadata {
    let name = format!("{symbol} (seeded)");
    match class {
        AssetClass::Equity => AssetMetadata::Equity(EquityMeta {
            company_name: name,
            exchange: String::from("SEED"),
            currency: Some(String::from("USD")),
            ..EquityMeta::default()
        }),
        AssetClass::Crypto => AssetMetadata::Crypto(CryptoMeta {
            name,
            ..CryptoMeta::default()
        }),
        AssetClass::CommodityFuture => AssetMetadata::CommodityFuture(FutureMeta {
            commodity_name: name,
            base_future_code: symbol
                .as_str()
                .chars()
                .filter(char::is_ascii_alphabetic)
                .take(2)
                .collect(),
            expiration_date: start.checked_add(Duration::days(90)),
            ..FutureMeta::default()
        }),
    }
}

/// Daily bars whose open follows the previous close, moving at most 2% a day.
fn random_walk(rng: &mut fastrand::Rng, start: Date, count: usize, class: AssetClass) -> Vec<BarRow> {
    let cent = Decimal::new(1, 2);
    let mut close = Decimal::from(rng.u32(20..500));
    let mut rows = Vec::with_capacity(count);
    let mut day = start;

    for _ in 0..count {
        let open = close;
        let basis_points = Decimal::from(rng.i32(-200..=200));
        close = (open * (Decimal::from(10_000) + basis_points) / Decimal::from(10_000)).round_dp(2);
        let high = open.max(close) + cent * Decimal::from(rng.u32(0..150));
        let low = (open.min(close) - cent * Decimal::from(rng.u32(0..150))).max(Decimal::ZERO);
        let volume = Decimal::from(rng.u64(1_000..1_000_000));

        let mut values = Ohlcv::new(open, high, low, close, volume);
        if class == AssetClass::Equity {
            values = values.with_adjusted_close(close);
        }
        rows.push(BarRow::new(UtcDateTime::from_date(day), values));

        match day.next_day() {
            Some(next) => day = next,
            None => break,
        }
    }
    rows
}
