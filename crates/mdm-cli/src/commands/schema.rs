use mdm_warehouse::MarketData;
use serde_json::{json, Value};

use crate::cli::{SchemaArgs, SchemaCommand};
use crate::error::CliError;

use super::parse_class;

pub fn run(args: &SchemaArgs, market: &MarketData) -> Result<Value, CliError> {
    match &args.command {
        SchemaCommand::Show(show) => {
            let class = parse_class(&show.class)?;
            let descriptor = market.schema().describe(class);
            let columns = descriptor
                .columns
                .iter()
                .map(|column| {
                    json!({
                        "name": column.name,
                        "type": column.ty.sql_name(),
                        "nullable": column.nullable,
                    })
                })
                .collect::<Vec<_>>();
            Ok(json!({
                "class": class,
                "table": descriptor.name,
                "columns": columns,
                "primary_key": descriptor.primary_key,
                "create_sql": descriptor.create_sql(),
            }))
        }
        SchemaCommand::Drop(drop) => {
            if !drop.yes {
                return Err(CliError::Command(String::from(
                    "schema drop destroys all data; pass --yes to confirm",
                )));
            }
            market.schema().drop_all().map_err(mdm_warehouse::MarketDataError::from)?;
            Ok(json!({ "dropped": true }))
        }
    }
}
