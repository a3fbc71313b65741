//! Asset identity and class-specific metadata.

use ::duckdb::{Connection, OptionalExt, ToSql};
use mdm_core::{
    validate_display_name, Asset, AssetClass, AssetId, AssetKey, AssetMetadata, AssetPatch,
    Symbol, UtcDateTime, ValidationError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bars::{count_for_asset, delete_for_asset};
use crate::codec::{parse_ts, ts_param};
use crate::duckdb::DuckDbConnectionManager;
use crate::error::{RegistryError, StoreFault};

const SELECT_ASSET: &str = "SELECT asset_id, symbol, asset_class, display_name, metadata, \
     CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) FROM assets";

/// What to do with an asset's bars when the asset is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse while any bar references the asset.
    #[default]
    Reject,
    /// Remove the bars and the asset in one transaction.
    Cascade,
}

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub asset: Asset,
    pub bars_removed: u64,
}

/// Owner of asset identity and metadata.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    manager: DuckDbConnectionManager,
}

impl AssetRegistry {
    pub fn new(manager: DuckDbConnectionManager) -> Self {
        Self { manager }
    }

    /// Register a new asset.
    ///
    /// # Errors
    /// [`RegistryError::InvalidMetadata`] when the display name or metadata
    /// fail validation or the metadata describes another class, and
    /// [`RegistryError::DuplicateAsset`] when `symbol`/`class` is taken.
    pub fn create_asset(
        &self,
        symbol: &Symbol,
        class: AssetClass,
        display_name: &str,
        metadata: AssetMetadata,
    ) -> Result<Asset, RegistryError> {
        let invalid = |source: ValidationError| RegistryError::InvalidMetadata {
            subject: format!("{symbol}/{class}"),
            source,
        };
        let display_name = validate_display_name(display_name).map_err(invalid)?;
        if metadata.class() != class {
            return Err(invalid(ValidationError::MetadataClassMismatch {
                class: metadata.class().as_str().to_owned(),
                expected: class.as_str().to_owned(),
            }));
        }
        let metadata = metadata.validated().map_err(invalid)?;
        let metadata_json = serde_json::to_string(&metadata).map_err(StoreFault::from)?;
        let now = UtcDateTime::now();

        let connection = self.manager.acquire()?;
        let result = connection.transaction(|tx| -> Result<AssetId, RegistryError> {
            if symbol_taken(tx, symbol, class)? {
                return Err(RegistryError::DuplicateAsset {
                    symbol: symbol.clone(),
                    class,
                });
            }
            let symbol_text = symbol.as_str();
            let class_text = class.as_str();
            let created_at = ts_param(now);
            let params: [&dyn ToSql; 6] = [
                &symbol_text,
                &class_text,
                &display_name,
                &metadata_json,
                &created_at,
                &created_at,
            ];
            let asset_id: i64 = tx.query_row(
                "INSERT INTO assets (symbol, asset_class, display_name, metadata, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)) \
                 RETURNING asset_id",
                params.as_slice(),
                |row| row.get(0),
            )?;
            Ok(AssetId(asset_id))
        });

        let id = match result {
            Ok(id) => id,
            Err(RegistryError::Store(fault))
                if fault.is_constraint_violation() || fault.is_transient() =>
            {
                // A concurrent writer may have registered the same key first.
                if connection.read(|conn| symbol_taken(conn, symbol, class))? {
                    return Err(RegistryError::DuplicateAsset {
                        symbol: symbol.clone(),
                        class,
                    });
                }
                return Err(RegistryError::Store(fault));
            }
            Err(error) => return Err(error),
        };

        info!(asset_id = id.get(), symbol = %symbol, class = %class, "created asset");
        Ok(Asset {
            id,
            symbol: symbol.clone(),
            class,
            display_name,
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_asset(&self, key: &AssetKey) -> Result<Asset, RegistryError> {
        let connection = self.manager.acquire()?;
        connection
            .read(|conn| find_asset(conn, key))?
            .ok_or_else(|| RegistryError::NotFound { key: key.clone() })
    }

    /// All assets, optionally of one class, ordered by symbol.
    pub fn list_assets(&self, class: Option<AssetClass>) -> Result<Vec<Asset>, RegistryError> {
        let connection = self.manager.acquire()?;
        connection.read(|conn| -> Result<Vec<Asset>, RegistryError> {
            let records = match class {
                Some(class) => {
                    let sql = format!("{SELECT_ASSET} WHERE asset_class = ? ORDER BY symbol");
                    let mut statement = conn.prepare(&sql)?;
                    let rows = statement.query_map([class.as_str()], AssetRecord::from_row)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("{SELECT_ASSET} ORDER BY symbol, asset_class");
                    let mut statement = conn.prepare(&sql)?;
                    let rows = statement.query_map([], AssetRecord::from_row)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            records
                .into_iter()
                .map(|record| record.into_asset().map_err(RegistryError::from))
                .collect()
        })
    }

    /// Apply a partial update and return the stored result.
    ///
    /// The class can never change. A new symbol must still be free within
    /// the asset's class.
    pub fn update_asset(&self, asset_id: AssetId, patch: &AssetPatch) -> Result<Asset, RegistryError> {
        patch.validate().map_err(|source| match source {
            ValidationError::ImmutableClass => RegistryError::ImmutableClass { asset_id, source },
            source => RegistryError::InvalidMetadata {
                subject: format!("asset_id={asset_id}"),
                source,
            },
        })?;

        let connection = self.manager.acquire()?;
        let updated = connection.transaction(|tx| -> Result<Asset, RegistryError> {
            let key = AssetKey::Id(asset_id);
            let current = find_asset(tx, &key)?.ok_or(RegistryError::NotFound { key })?;
            let invalid = |source| RegistryError::InvalidMetadata {
                subject: format!("asset_id={asset_id}"),
                source,
            };

            let mut next = current.clone();
            if let Some(name) = &patch.display_name {
                next.display_name = validate_display_name(name).map_err(invalid)?;
            }
            if let Some(metadata_patch) = &patch.metadata {
                next.metadata = current.metadata.apply(metadata_patch).map_err(invalid)?;
            }
            let rename = patch
                .symbol
                .as_ref()
                .filter(|symbol| **symbol != current.symbol)
                .cloned();
            if let Some(symbol) = &rename {
                if symbol_taken(tx, symbol, current.class)? {
                    return Err(RegistryError::DuplicateAsset {
                        symbol: symbol.clone(),
                        class: current.class,
                    });
                }
                next.symbol = symbol.clone();
            }
            next.updated_at = UtcDateTime::now();

            let metadata_json = serde_json::to_string(&next.metadata).map_err(StoreFault::from)?;
            let updated_at = ts_param(next.updated_at);
            let id = asset_id.get();
            // Key columns are only rewritten on an actual rename.
            match &rename {
                Some(symbol) => {
                    let symbol_text = symbol.as_str();
                    let params: [&dyn ToSql; 5] =
                        [&symbol_text, &next.display_name, &metadata_json, &updated_at, &id];
                    tx.execute(
                        "UPDATE assets SET symbol = ?, display_name = ?, metadata = ?, \
                         updated_at = CAST(? AS TIMESTAMP) WHERE asset_id = ?",
                        params.as_slice(),
                    )?;
                }
                None => {
                    let params: [&dyn ToSql; 4] =
                        [&next.display_name, &metadata_json, &updated_at, &id];
                    tx.execute(
                        "UPDATE assets SET display_name = ?, metadata = ?, \
                         updated_at = CAST(? AS TIMESTAMP) WHERE asset_id = ?",
                        params.as_slice(),
                    )?;
                }
            }
            Ok(next)
        })?;

        info!(asset_id = asset_id.get(), symbol = %updated.symbol, "updated asset");
        Ok(updated)
    }

    /// Delete an asset under `policy`.
    ///
    /// With [`DeletePolicy::Cascade`] the bars and the asset are removed in
    /// one transaction; either both are gone or neither is.
    pub fn delete_asset(
        &self,
        asset_id: AssetId,
        policy: DeletePolicy,
    ) -> Result<DeleteOutcome, RegistryError> {
        let connection = self.manager.acquire()?;
        let outcome = connection.transaction(|tx| -> Result<DeleteOutcome, RegistryError> {
            let key = AssetKey::Id(asset_id);
            let asset = find_asset(tx, &key)?.ok_or(RegistryError::NotFound { key })?;
            let bar_count = count_for_asset(tx, asset.class, asset_id)?;

            let bars_removed = match policy {
                DeletePolicy::Reject if bar_count > 0 => {
                    return Err(RegistryError::HasDependentBars {
                        asset_id,
                        bar_count,
                    });
                }
                DeletePolicy::Reject => 0,
                DeletePolicy::Cascade => delete_for_asset(tx, asset.class, asset_id)?,
            };
            tx.execute("DELETE FROM assets WHERE asset_id = ?", [asset_id.get()])?;
            Ok(DeleteOutcome {
                asset,
                bars_removed,
            })
        });

        match &outcome {
            Ok(outcome) => info!(
                asset_id = asset_id.get(),
                bars_removed = outcome.bars_removed,
                "deleted asset"
            ),
            Err(RegistryError::HasDependentBars { bar_count, .. }) => {
                debug!(asset_id = asset_id.get(), bar_count, "delete rejected");
            }
            Err(error) => warn!(asset_id = asset_id.get(), %error, "delete failed"),
        }
        outcome
    }
}

fn symbol_taken(conn: &Connection, symbol: &Symbol, class: AssetClass) -> Result<bool, RegistryError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assets WHERE symbol = ? AND asset_class = ?",
        [symbol.as_str(), class.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn find_asset(conn: &Connection, key: &AssetKey) -> Result<Option<Asset>, RegistryError> {
    let record = match key {
        AssetKey::Id(id) => conn
            .query_row(
                &format!("{SELECT_ASSET} WHERE asset_id = ?"),
                [id.get()],
                AssetRecord::from_row,
            )
            .optional()?,
        AssetKey::Symbol { symbol, class } => conn
            .query_row(
                &format!("{SELECT_ASSET} WHERE symbol = ? AND asset_class = ?"),
                [symbol.as_str(), class.as_str()],
                AssetRecord::from_row,
            )
            .optional()?,
    };
    record
        .map(|record| record.into_asset().map_err(RegistryError::from))
        .transpose()
}

/// Raw `assets` row.
struct AssetRecord {
    asset_id: i64,
    symbol: String,
    asset_class: String,
    display_name: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl AssetRecord {
    fn from_row(row: &::duckdb::Row<'_>) -> Result<Self, ::duckdb::Error> {
        Ok(Self {
            asset_id: row.get(0)?,
            symbol: row.get(1)?,
            asset_class: row.get(2)?,
            display_name: row.get(3)?,
            metadata: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_asset(self) -> Result<Asset, StoreFault> {
        let corrupt = |detail: String| StoreFault::Corrupt {
            table: "assets",
            detail: format!("asset_id={}: {detail}", self.asset_id),
        };
        let symbol = Symbol::parse(&self.symbol).map_err(|error| corrupt(error.to_string()))?;
        let class: AssetClass = self
            .asset_class
            .parse()
            .map_err(|error: ValidationError| corrupt(error.to_string()))?;
        let metadata: AssetMetadata = serde_json::from_str(&self.metadata)
            .map_err(|error| corrupt(format!("metadata: {error}")))?;
        if metadata.class() != class {
            return Err(corrupt(format!(
                "{} metadata stored for a {class} asset",
                metadata.class()
            )));
        }

        Ok(Asset {
            id: AssetId(self.asset_id),
            symbol,
            class,
            display_name: self.display_name,
            metadata,
            created_at: parse_ts("assets", &self.created_at)?,
            updated_at: parse_ts("assets", &self.updated_at)?,
        })
    }
}
