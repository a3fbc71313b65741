use std::fs;
use std::io::{self, Read};

use mdm_core::{AssetClass, AssetId, BarRow, Interval};
use mdm_warehouse::MarketData;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cli::{BarsArgs, BarsCommand, BarsUpsertArgs, SeriesArgs};
use crate::error::CliError;

use super::{parse_class, parse_interval, parse_range};

pub fn run(args: &BarsArgs, market: &MarketData) -> Result<Value, CliError> {
    match &args.command {
        BarsCommand::Upsert(upsert) => {
            let (class, asset_id, interval) = series(&upsert.series)?;
            let rows = read_rows(upsert)?;
            let report = market.upsert_bars_batch(class, asset_id, interval, &rows)?;
            if report.failed() > 0 {
                warn!(%asset_id, failed = report.failed(), "some bars were rejected");
            }
            info!(%asset_id, %interval, rows = report.succeeded(), "bars upserted");

            let failures = report
                .outcomes
                .iter()
                .filter_map(|outcome| {
                    outcome.result.as_ref().err().map(|error| {
                        json!({
                            "index": outcome.index,
                            "ts": outcome.ts,
                            "code": error.code(),
                            "subject": error.subject,
                            "message": error.message,
                        })
                    })
                })
                .collect::<Vec<_>>();
            Ok(json!({
                "succeeded": report.succeeded(),
                "failed": report.failed(),
                "failures": failures,
            }))
        }
        BarsCommand::Query(query) => {
            let (class, asset_id, interval) = series(&query.range.series)?;
            let range = parse_range(query.range.from.as_deref(), query.range.to.as_deref())?;
            let bars = market.query_bars(class, asset_id, interval, range)?;
            let limit = query.limit.unwrap_or(usize::MAX);
            let bars = bars
                .iter()
                .take(limit)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| {
                    error.into_market_error(format!("asset_id={asset_id} interval={interval}"))
                })?;
            Ok(json!({ "range": range.to_string(), "count": bars.len(), "bars": bars }))
        }
        BarsCommand::Delete(delete) => {
            let (class, asset_id, interval) = series(&delete.series)?;
            let range = parse_range(delete.from.as_deref(), delete.to.as_deref())?;
            let deleted = market.delete_bars(class, asset_id, interval, range)?;
            info!(%asset_id, %interval, rows = deleted, "bars deleted");
            Ok(json!({ "deleted": deleted }))
        }
    }
}

fn series(args: &SeriesArgs) -> Result<(AssetClass, AssetId, Interval), CliError> {
    Ok((
        parse_class(&args.class)?,
        AssetId(args.asset_id),
        parse_interval(&args.interval)?,
    ))
}

fn read_rows(args: &BarsUpsertArgs) -> Result<Vec<BarRow>, CliError> {
    let raw = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    parse_rows(&raw)
}

fn parse_rows(raw: &str) -> Result<Vec<BarRow>, CliError> {
    serde_json::from_str(raw)
        .map_err(|error| CliError::Command(format!("bars must be a JSON array of rows: {error}")))
}
