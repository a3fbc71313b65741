use mdm_core::{AssetClass, AssetId, AssetKey, AssetMetadata, AssetPatch, MetadataPatch, Symbol};
use mdm_warehouse::{DeletePolicy, MarketData};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use crate::cli::{AssetArgs, AssetCommand};
use crate::error::CliError;

use super::parse_class;

pub fn run(args: &AssetArgs, market: &MarketData) -> Result<Value, CliError> {
    match &args.command {
        AssetCommand::Create(create) => {
            let symbol = Symbol::parse(&create.symbol)?;
            let class = parse_class(&create.class)?;
            let metadata: AssetMetadata = tagged(&create.metadata, class)?;
            let asset = market.create_asset(&symbol, class, &create.name, metadata)?;
            info!(asset_id = %asset.id, symbol = %asset.symbol, %class, "asset created");
            Ok(serde_json::to_value(asset)?)
        }
        AssetCommand::Get(get) => {
            let key = match (get.asset.parse::<i64>(), &get.class) {
                (_, Some(class)) => AssetKey::Symbol {
                    symbol: Symbol::parse(&get.asset)?,
                    class: parse_class(class)?,
                },
                (Ok(id), None) => AssetKey::Id(AssetId(id)),
                (Err(_), None) => {
                    return Err(CliError::Command(String::from(
                        "symbol lookups need --class",
                    )));
                }
            };
            Ok(serde_json::to_value(market.get_asset(&key)?)?)
        }
        AssetCommand::List(list) => {
            let class = list.class.as_deref().map(parse_class).transpose()?;
            let assets = market.list_assets(class)?;
            Ok(json!({ "count": assets.len(), "assets": assets }))
        }
        AssetCommand::Update(update) => {
            let asset_id = AssetId(update.asset_id);
            let metadata = match &update.metadata {
                Some(raw) => {
                    let current = market.get_asset(&AssetKey::Id(asset_id))?;
                    Some(tagged::<MetadataPatch>(raw, current.class)?)
                }
                None => None,
            };
            let patch = AssetPatch {
                symbol: update.symbol.as_deref().map(Symbol::parse).transpose()?,
                asset_class: update.class.as_deref().map(parse_class).transpose()?,
                display_name: update.name.clone(),
                metadata,
            };
            let asset = market.update_asset(asset_id, &patch)?;
            Ok(serde_json::to_value(asset)?)
        }
        AssetCommand::Delete(delete) => {
            let policy = if delete.cascade {
                DeletePolicy::Cascade
            } else {
                DeletePolicy::Reject
            };
            let outcome = market.delete_asset(AssetId(delete.asset_id), policy)?;
            info!(asset_id = delete.asset_id, bars = outcome.bars_removed, "asset deleted");
            Ok(serde_json::to_value(outcome)?)
        }
    }
}

/// Parse a metadata JSON object, filling in the `class` tag when absent.
fn tagged<T: DeserializeOwned>(raw: &str, class: AssetClass) -> Result<T, CliError> {
    let invalid = |error: serde_json::Error| CliError::Command(format!("invalid metadata: {error}"));
    let mut value: Value = serde_json::from_str(raw).map_err(invalid)?;
    let Some(object) = value.as_object_mut() else {
        return Err(CliError::Command(String::from(
            "metadata must be a JSON object",
        )));
    };
    object
        .entry("class")
        .or_insert_with(|| Value::String(class.as_str().to_owned()));
    serde_json::from_value(value).map_err(invalid)
}
