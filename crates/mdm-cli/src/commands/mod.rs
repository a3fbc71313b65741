mod asset;
mod bars;
mod init;
mod schema;
mod seed;

use std::str::FromStr;

use mdm_core::{AssetClass, Interval, TimeRange, UtcDateTime};
use mdm_warehouse::{DuckDbConnectionManager, MarketData, WarehouseConfig};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub fn run(cli: &Cli) -> Result<Value, CliError> {
    let manager = connect(cli)?;

    match &cli.command {
        // Schema commands must work on databases the facade refuses to open.
        Command::Init => init::run(&MarketData::new(manager)),
        Command::Schema(args) => schema::run(args, &MarketData::new(manager)),
        Command::Asset(args) => asset::run(args, &MarketData::open(manager)?),
        Command::Bars(args) => bars::run(args, &MarketData::open(manager)?),
        Command::Seed(args) => seed::run(args, &MarketData::open(manager)?),
    }
}

fn connect(cli: &Cli) -> Result<DuckDbConnectionManager, CliError> {
    let mut config = WarehouseConfig::from_env()?;
    if let Some(path) = &cli.db {
        config = config.with_db_path(path);
    }

    if cli.in_memory {
        debug!("using in-memory database");
        return Ok(DuckDbConnectionManager::in_memory(&config)?);
    }
    debug!(db_path = %config.db_path.display(), "opening database");
    Ok(DuckDbConnectionManager::open(&config)?)
}

pub(crate) fn parse_class(value: &str) -> Result<AssetClass, CliError> {
    Ok(AssetClass::from_str(value)?)
}

pub(crate) fn parse_interval(value: &str) -> Result<Interval, CliError> {
    Ok(Interval::from_str(value)?)
}

pub(crate) fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<TimeRange, CliError> {
    let from = from.map(UtcDateTime::parse).transpose()?;
    let to = to.map(UtcDateTime::parse).transpose()?;
    Ok(TimeRange::new(from, to)?)
}
