//! CLI argument definitions for `mdm`.
//!
//! The binary is a thin collaborator over [`mdm_warehouse::MarketData`]:
//! every command opens the warehouse, performs one facade operation and
//! prints a JSON envelope.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create or verify every managed table |
//! | `schema` | Show a bar table layout or drop all managed tables |
//! | `asset` | Create, read, list, update and delete assets |
//! | `bars` | Upsert, query and delete bars |
//! | `seed` | Register an asset and fill it with random daily bars |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--db` | `$MDM_HOME/data/marketdata.duckdb` | Database file |
//! | `--in-memory` | `false` | Use a throwaway in-memory database |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! mdm asset create AAPL --class equity --name "Apple" \
//!     --metadata '{"company_name":"Apple Inc.","exchange":"NASDAQ"}'
//! mdm bars upsert 1 --class equity --interval 1d --file bars.json
//! mdm bars query 1 --class equity --from 2024-01-01 --to 2024-01-31 --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Market data manager: asset registry and bar store on DuckDB.
#[derive(Debug, Parser)]
#[command(
    name = "mdm",
    author,
    version,
    about = "Market data asset registry and bar store",
    long_about = "mdm manages equities, cryptocurrencies and commodity futures together with \
their OHLCV bars in a local DuckDB database.\n\
\n\
Every command prints a JSON envelope on stdout; logs go to stderr (MDM_LOG or RUST_LOG).\n\
\n\
Use 'mdm <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Database file; overrides MDM_DB_PATH.
    #[arg(long, global = true, conflicts_with = "in_memory")]
    pub db: Option<PathBuf>,

    /// Use a private in-memory database that vanishes on exit.
    #[arg(long, global = true, default_value_t = false)]
    pub in_memory: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or verify the assets table and every bar table.
    Init,

    /// Inspect or drop managed tables.
    Schema(SchemaArgs),

    /// Asset registry commands.
    Asset(AssetArgs),

    /// Bar store commands.
    Bars(BarsArgs),

    /// Register an asset (if missing) and generate random daily bars.
    ///
    /// # Examples
    ///
    ///   mdm seed AAPL --class equity --count 30
    ///   mdm seed BTC-USD --class crypto --count 365 --seed 7
    Seed(SeedArgs),
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Show the bar table descriptor for an asset class.
    Show(SchemaShowArgs),

    /// Drop every managed table. Destroys all data.
    Drop(SchemaDropArgs),
}

#[derive(Debug, Args)]
pub struct SchemaShowArgs {
    /// Asset class: equity, crypto or commodity_future.
    pub class: String,
}

#[derive(Debug, Args)]
pub struct SchemaDropArgs {
    /// Confirm the drop.
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct AssetArgs {
    #[command(subcommand)]
    pub command: AssetCommand,
}

#[derive(Debug, Subcommand)]
pub enum AssetCommand {
    /// Register a new asset.
    Create(AssetCreateArgs),

    /// Look an asset up by id, or by symbol with --class.
    Get(AssetGetArgs),

    /// List assets, optionally of one class.
    List(AssetListArgs),

    /// Apply a partial update to an asset.
    Update(AssetUpdateArgs),

    /// Delete an asset; refused while bars exist unless --cascade.
    Delete(AssetDeleteArgs),
}

#[derive(Debug, Args)]
pub struct AssetCreateArgs {
    /// Ticker symbol, e.g. AAPL or BTC-USD.
    pub symbol: String,

    /// Asset class.
    #[arg(long)]
    pub class: String,

    /// Human readable name.
    #[arg(long)]
    pub name: String,

    /// Class-specific metadata as a JSON object.
    #[arg(long, default_value = "{}")]
    pub metadata: String,
}

#[derive(Debug, Args)]
pub struct AssetGetArgs {
    /// Numeric asset id, or a symbol when --class is given.
    pub asset: String,

    /// Asset class for symbol lookups.
    #[arg(long)]
    pub class: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssetListArgs {
    /// Only list assets of this class.
    #[arg(long)]
    pub class: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssetUpdateArgs {
    pub asset_id: i64,

    /// Rename the asset.
    #[arg(long)]
    pub symbol: Option<String>,

    /// New display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Requested class; the class of an asset never changes, so any value
    /// is rejected.
    #[arg(long)]
    pub class: Option<String>,

    /// Metadata patch as a JSON object; absent fields are left unchanged.
    #[arg(long)]
    pub metadata: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssetDeleteArgs {
    pub asset_id: i64,

    /// Also delete every bar of the asset.
    #[arg(long, default_value_t = false)]
    pub cascade: bool,
}

#[derive(Debug, Args)]
pub struct BarsArgs {
    #[command(subcommand)]
    pub command: BarsCommand,
}

#[derive(Debug, Subcommand)]
pub enum BarsCommand {
    /// Upsert a JSON array of bars; each row succeeds or fails on its own.
    ///
    /// Rows look like {"ts":"2024-01-02","open":"100","high":"105",
    /// "low":"99","close":"104","volume":"1000"}.
    Upsert(BarsUpsertArgs),

    /// Query bars in ascending time order.
    Query(BarsQueryArgs),

    /// Delete bars in a time range.
    Delete(BarsRangeArgs),
}

/// Selects one bar series: asset, class and interval.
#[derive(Debug, Args)]
pub struct SeriesArgs {
    pub asset_id: i64,

    /// Asset class of the series.
    #[arg(long)]
    pub class: String,

    /// Bar interval: 1m, 5m, 15m, 1h or 1d.
    #[arg(long, default_value = "1d")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct BarsUpsertArgs {
    #[command(flatten)]
    pub series: SeriesArgs,

    /// Read rows from a JSON file.
    #[arg(long, conflicts_with = "stdin", required_unless_present = "stdin")]
    pub file: Option<PathBuf>,

    /// Read rows from standard input.
    #[arg(long, default_value_t = false)]
    pub stdin: bool,
}

#[derive(Debug, Args)]
pub struct BarsRangeArgs {
    #[command(flatten)]
    pub series: SeriesArgs,

    /// Inclusive start: YYYY-MM-DD or RFC3339 UTC.
    #[arg(long)]
    pub from: Option<String>,

    /// Inclusive end: YYYY-MM-DD or RFC3339 UTC.
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Debug, Args)]
pub struct BarsQueryArgs {
    #[command(flatten)]
    pub range: BarsRangeArgs,

    /// Stop after this many bars.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SeedArgs {
    pub symbol: String,

    #[arg(long)]
    pub class: String,

    /// Number of daily bars to generate.
    #[arg(long, default_value_t = 30)]
    pub count: usize,

    /// First bar date (YYYY-MM-DD).
    #[arg(long, default_value = "2024-01-01")]
    pub start: String,

    /// Random seed for reproducible data.
    #[arg(long)]
    pub seed: Option<u64>,
}
