//! Single entry point over the registry and the bar store.

use mdm_core::{
    Asset, AssetClass, AssetId, AssetKey, AssetMetadata, AssetPatch, Bar, BarRow, Interval, Ohlcv,
    Symbol, TimeRange, UtcDateTime,
};
use std::fmt::Display;

use tracing::debug;

use crate::bars::{BarQuery, BarStore, BatchReport};
use crate::duckdb::DuckDbConnectionManager;
use crate::error::{BarError, BarSlot, MarketDataError, RegistryError};
use crate::registry::{AssetRegistry, DeleteOutcome, DeletePolicy};
use crate::schema::{SchemaManager, SchemaReport};

/// Asset CRUD plus bar upsert, query and delete behind one error taxonomy.
///
/// Holds no state besides the shared connection handle.
#[derive(Debug, Clone)]
pub struct MarketData {
    schema: SchemaManager,
    registry: AssetRegistry,
    bars: BarStore,
}

impl MarketData {
    /// Wrap `manager` after ensuring every managed table exists and matches
    /// its descriptor.
    pub fn open(manager: DuckDbConnectionManager) -> Result<Self, MarketDataError> {
        let facade = Self::new(manager);
        let report = facade.schema.ensure_all()?;
        debug!(tables = report.tables.len(), "schema ready");
        Ok(facade)
    }

    /// Wrap `manager` without touching the schema.
    pub fn new(manager: DuckDbConnectionManager) -> Self {
        Self {
            schema: SchemaManager::new(manager.clone()),
            registry: AssetRegistry::new(manager.clone()),
            bars: BarStore::new(manager),
        }
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn ensure_schema(&self) -> Result<SchemaReport, MarketDataError> {
        Ok(self.schema.ensure_all()?)
    }

    pub fn create_asset(
        &self,
        symbol: &Symbol,
        class: AssetClass,
        display_name: &str,
        metadata: AssetMetadata,
    ) -> Result<Asset, MarketDataError> {
        self.registry
            .create_asset(symbol, class, display_name, metadata)
            .map_err(|error| error.into_market_error(format!("{symbol}/{class}")))
    }

    pub fn get_asset(&self, key: &AssetKey) -> Result<Asset, MarketDataError> {
        self.registry
            .get_asset(key)
            .map_err(|error| error.into_market_error(key))
    }

    pub fn list_assets(&self, class: Option<AssetClass>) -> Result<Vec<Asset>, MarketDataError> {
        self.registry.list_assets(class).map_err(|error| match class {
            Some(class) => error.into_market_error(format!("class={class}")),
            None => error.into_market_error("assets"),
        })
    }

    pub fn update_asset(
        &self,
        asset_id: AssetId,
        patch: &AssetPatch,
    ) -> Result<Asset, MarketDataError> {
        self.registry
            .update_asset(asset_id, patch)
            .map_err(|error| error.into_market_error(AssetKey::Id(asset_id)))
    }

    pub fn delete_asset(
        &self,
        asset_id: AssetId,
        policy: DeletePolicy,
    ) -> Result<DeleteOutcome, MarketDataError> {
        self.registry
            .delete_asset(asset_id, policy)
            .map_err(|error| error.into_market_error(AssetKey::Id(asset_id)))
    }

    pub fn upsert_bar(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        ts: UtcDateTime,
        values: Ohlcv,
    ) -> Result<(), MarketDataError> {
        let slot = BarSlot {
            asset_id,
            interval,
            ts,
        };
        self.expect_asset(class, asset_id, slot)?;
        self.bars
            .upsert_bar(class, asset_id, interval, ts, values)
            .map_err(|error| error.into_market_error(slot))
    }

    /// Per-row outcomes; only a bad asset reference fails the whole call.
    pub fn upsert_bars_batch(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        rows: &[BarRow],
    ) -> Result<BatchReport<MarketDataError>, MarketDataError> {
        let series = series(asset_id, interval);
        self.expect_asset(class, asset_id, &series)?;
        let report = self
            .bars
            .upsert_bars_batch(class, asset_id, interval, rows)
            .map_err(|error| error.into_market_error(&series))?;
        Ok(report.map_err(|ts, error| {
            error.into_market_error(BarSlot {
                asset_id,
                interval,
                ts,
            })
        }))
    }

    /// Lazy, restartable query; iterate it to fetch bars page by page.
    pub fn query_bars(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
    ) -> Result<BarQuery, MarketDataError> {
        let series = series(asset_id, interval);
        self.expect_asset(class, asset_id, &series)?;
        self.bars
            .query_bars(class, asset_id, interval, range)
            .map_err(|error| error.into_market_error(&series))
    }

    /// [`Self::query_bars`] drained into memory.
    pub fn fetch_bars(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let query = self.query_bars(class, asset_id, interval, range)?;
        query
            .collect_all()
            .map_err(|error| error.into_market_error(series(asset_id, interval)))
    }

    pub fn delete_bars(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
    ) -> Result<u64, MarketDataError> {
        let series = series(asset_id, interval);
        self.expect_asset(class, asset_id, &series)?;
        self.bars
            .delete_bars(class, asset_id, interval, range)
            .map_err(|error| error.into_market_error(&series))
    }

    pub fn count_bars(&self, class: AssetClass, asset_id: AssetId) -> Result<u64, MarketDataError> {
        let key = AssetKey::Id(asset_id);
        self.expect_asset(class, asset_id, &key)?;
        self.bars
            .count_bars(class, asset_id)
            .map_err(|error| error.into_market_error(&key))
    }

    /// Reject references to a missing or wrong-class asset up front.
    fn expect_asset(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        subject: impl Display,
    ) -> Result<Asset, MarketDataError> {
        let asset = match self.registry.get_asset(&AssetKey::Id(asset_id)) {
            Ok(asset) => asset,
            Err(RegistryError::NotFound { .. }) => {
                return Err(BarError::UnknownAsset { asset_id }.into());
            }
            Err(error) => return Err(error.into_market_error(subject)),
        };
        if asset.class != class {
            return Err(BarError::ClassMismatch {
                asset_id,
                expected: class,
                actual: asset.class,
            }
            .into());
        }
        Ok(asset)
    }
}

/// Subject for errors about a whole series.
fn series(asset_id: AssetId, interval: Interval) -> String {
    format!("asset_id={asset_id} interval={interval}")
}
