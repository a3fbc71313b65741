//! # MDM Warehouse
//!
//! DuckDB-backed storage for the market data manager.
//!
//! ## Overview
//!
//! - **Schema manager**: creates or verifies one bar table per asset class plus
//!   the shared `assets` table
//! - **Asset registry**: asset identity, class-tagged metadata, cascade-or-reject
//!   deletes
//! - **Bar store**: validated upserts keyed by `(asset, interval, timestamp)`,
//!   per-row batch outcomes, lazy paginated range queries
//! - **Facade**: [`MarketData`], the single entry point, folding every failure
//!   into [`MarketDataError`]
//!
//! All SQL is parameterized. Every operation acquires its own pooled
//! connection and runs multi-statement work inside a transaction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdm_core::{AssetClass, AssetMetadata, CryptoMeta, Symbol};
//! use mdm_warehouse::{DuckDbConnectionManager, MarketData, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WarehouseConfig::from_env()?;
//!     let market = MarketData::open(DuckDbConnectionManager::open(&config)?)?;
//!
//!     let metadata = AssetMetadata::Crypto(CryptoMeta {
//!         name: "Bitcoin".to_string(),
//!         ..CryptoMeta::default()
//!     });
//!     let asset = market.create_asset(&Symbol::parse("BTC-USD")?, AssetClass::Crypto, "Bitcoin", metadata)?;
//!     println!("registered asset {}", asset.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `assets` | Asset identity and JSON metadata, unique per symbol and class |
//! | `equity_bars` | Equity bars, with optional adjusted close |
//! | `crypto_bars` | Cryptocurrency bars |
//! | `commodity_future_bars` | Commodity future bars |
//! | `schema_registry` | Descriptor version that created each table |

pub mod bars;
mod codec;
pub mod config;
pub mod duckdb;
pub mod error;
pub mod facade;
pub mod registry;
pub mod schema;

pub use bars::{BarIter, BarQuery, BarStore, BatchReport, RowOutcome};
pub use config::{ConfigError, WarehouseConfig};
pub use duckdb::{DuckDbConnectionManager, PooledConnection};
pub use error::{
    BarError, BarSlot, ErrorKind, MarketDataError, RegistryError, SchemaError, StoreFault,
};
pub use facade::MarketData;
pub use registry::{AssetRegistry, DeleteOutcome, DeletePolicy};
pub use schema::{
    bar_table, ColumnSpec, ColumnType, SchemaManager, SchemaReport, SchemaStatus,
    TableDescriptor, ASSETS_TABLE,
};
