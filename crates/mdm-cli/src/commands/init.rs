use mdm_warehouse::MarketData;
use serde_json::{json, Value};
use tracing::info;

use crate::error::CliError;

pub fn run(market: &MarketData) -> Result<Value, CliError> {
    let report = market.ensure_schema()?;
    info!(tables = report.tables.len(), "schema initialised");
    let tables = report
        .tables
        .iter()
        .map(|(table, status)| json!({ "table": table, "status": status }))
        .collect::<Vec<_>>();
    Ok(json!({ "tables": tables }))
}
