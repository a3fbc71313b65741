//! Table descriptors and the schema manager that creates or verifies them.
//!
//! Every asset class maps to exactly one bar table through [`bar_table`], an
//! exhaustive `match`; adding a class without a descriptor does not compile.
//! Existing tables are compared column by column against their descriptor and
//! never migrated in place.

use std::fmt::{Display, Formatter};

use ::duckdb::{Connection, ToSql};
use mdm_core::AssetClass;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::duckdb::DuckDbConnectionManager;
use crate::error::SchemaError;

/// Bumped whenever a descriptor changes shape.
pub const DESCRIPTOR_VERSION: i32 = 1;

pub(crate) const ASSET_ID_SEQUENCE: &str = "assets_asset_id_seq";

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    BigInt,
    Integer,
    Varchar,
    Timestamp,
    Decimal { precision: u8, scale: u8 },
}

impl ColumnType {
    pub fn sql_name(self) -> String {
        match self {
            Self::BigInt => String::from("BIGINT"),
            Self::Integer => String::from("INTEGER"),
            Self::Varchar => String::from("VARCHAR"),
            Self::Timestamp => String::from("TIMESTAMP"),
            Self::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        }
    }

    fn matches(self, reported: &str) -> bool {
        let normalize = |value: &str| {
            value
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase()
        };
        normalize(&self.sql_name()) == normalize(reported)
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

const fn column(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        nullable: false,
        default: None,
    }
}

const fn nullable(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        nullable: true,
        default: None,
    }
}

const PRICE: ColumnType = ColumnType::Decimal {
    precision: 18,
    scale: 6,
};
const VOLUME: ColumnType = ColumnType::Decimal {
    precision: 38,
    scale: 8,
};

/// Authoritative layout of one managed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static [&'static str],
    pub unique: &'static [&'static [&'static str]],
}

impl TableDescriptor {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    /// `CREATE TABLE` statement for this descriptor.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut part = format!("{} {}", column.name, column.ty.sql_name());
                if !column.nullable {
                    part.push_str(" NOT NULL");
                }
                if let Some(default) = column.default {
                    part.push_str(" DEFAULT ");
                    part.push_str(default);
                }
                part
            })
            .collect();
        parts.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));
        for unique in self.unique {
            parts.push(format!("UNIQUE ({})", unique.join(", ")));
        }
        format!("CREATE TABLE {} (\n    {}\n)", self.name, parts.join(",\n    "))
    }
}

/// Shared asset identity table with the `asset_class` discriminator.
pub const ASSETS_TABLE: TableDescriptor = TableDescriptor {
    name: "assets",
    columns: &[
        ColumnSpec {
            name: "asset_id",
            ty: ColumnType::BigInt,
            nullable: false,
            default: Some("nextval('assets_asset_id_seq')"),
        },
        column("symbol", ColumnType::Varchar),
        column("asset_class", ColumnType::Varchar),
        column("display_name", ColumnType::Varchar),
        column("metadata", ColumnType::Varchar),
        column("created_at", ColumnType::Timestamp),
        column("updated_at", ColumnType::Timestamp),
    ],
    primary_key: &["asset_id"],
    unique: &[&["symbol", "asset_class"]],
};

const BAR_KEY: &[&str] = &["asset_id", "bar_interval", "ts"];

pub const EQUITY_BARS_TABLE: TableDescriptor = TableDescriptor {
    name: "equity_bars",
    columns: &[
        column("asset_id", ColumnType::BigInt),
        column("bar_interval", ColumnType::Varchar),
        column("ts", ColumnType::Timestamp),
        column("open", PRICE),
        column("high", PRICE),
        column("low", PRICE),
        column("close", PRICE),
        column("volume", VOLUME),
        nullable("adjusted_close", PRICE),
        column("updated_at", ColumnType::Timestamp),
    ],
    primary_key: BAR_KEY,
    unique: &[],
};

pub const CRYPTO_BARS_TABLE: TableDescriptor = TableDescriptor {
    name: "crypto_bars",
    columns: &[
        column("asset_id", ColumnType::BigInt),
        column("bar_interval", ColumnType::Varchar),
        column("ts", ColumnType::Timestamp),
        column("open", PRICE),
        column("high", PRICE),
        column("low", PRICE),
        column("close", PRICE),
        column("volume", VOLUME),
        column("updated_at", ColumnType::Timestamp),
    ],
    primary_key: BAR_KEY,
    unique: &[],
};

pub const COMMODITY_FUTURE_BARS_TABLE: TableDescriptor = TableDescriptor {
    name: "commodity_future_bars",
    columns: CRYPTO_BARS_TABLE.columns,
    primary_key: BAR_KEY,
    unique: &[],
};

const SCHEMA_REGISTRY_TABLE: TableDescriptor = TableDescriptor {
    name: "schema_registry",
    columns: &[
        column("table_name", ColumnType::Varchar),
        column("descriptor_version", ColumnType::Integer),
        column("created_at", ColumnType::Timestamp),
    ],
    primary_key: &["table_name"],
    unique: &[],
};

/// Bar table descriptor for `class`.
pub const fn bar_table(class: AssetClass) -> &'static TableDescriptor {
    match class {
        AssetClass::Equity => &EQUITY_BARS_TABLE,
        AssetClass::Crypto => &CRYPTO_BARS_TABLE,
        AssetClass::CommodityFuture => &COMMODITY_FUTURE_BARS_TABLE,
    }
}

/// Outcome of an ensure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    Created,
    Compatible,
}

/// Result of [`SchemaManager::ensure_all`], one entry per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<(&'static str, SchemaStatus)>,
}

/// Creates and verifies the managed tables.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    manager: DuckDbConnectionManager,
}

impl SchemaManager {
    pub fn new(manager: DuckDbConnectionManager) -> Self {
        Self { manager }
    }

    /// Ensure the shared `assets` table and its id sequence.
    pub fn ensure_registry(&self) -> Result<SchemaStatus, SchemaError> {
        let _ddl = self.manager.ddl_guard();
        let connection = self.manager.acquire()?;
        ensure_bookkeeping(&connection)?;
        connection.execute_batch(&format!("CREATE SEQUENCE IF NOT EXISTS {ASSET_ID_SEQUENCE}"))?;
        ensure_table(&connection, &ASSETS_TABLE)
    }

    /// Ensure the bar table of `class`.
    pub fn ensure_schema(&self, class: AssetClass) -> Result<SchemaStatus, SchemaError> {
        let _ddl = self.manager.ddl_guard();
        let connection = self.manager.acquire()?;
        ensure_bookkeeping(&connection)?;
        ensure_table(&connection, bar_table(class))
    }

    /// Ensure the registry and every bar table.
    pub fn ensure_all(&self) -> Result<SchemaReport, SchemaError> {
        let mut tables = vec![(ASSETS_TABLE.name, self.ensure_registry()?)];
        for class in AssetClass::ALL {
            tables.push((bar_table(class).name, self.ensure_schema(class)?));
        }
        Ok(SchemaReport { tables })
    }

    pub fn describe(&self, class: AssetClass) -> &'static TableDescriptor {
        bar_table(class)
    }

    /// Drop every managed table. Administrative reset only.
    pub fn drop_all(&self) -> Result<(), SchemaError> {
        let _ddl = self.manager.ddl_guard();
        let connection = self.manager.acquire()?;
        for class in AssetClass::ALL {
            connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", bar_table(class).name))?;
        }
        connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", ASSETS_TABLE.name))?;
        connection.execute_batch(&format!("DROP SEQUENCE IF EXISTS {ASSET_ID_SEQUENCE}"))?;
        connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", SCHEMA_REGISTRY_TABLE.name))?;
        warn!("dropped all managed tables");
        Ok(())
    }
}

fn ensure_bookkeeping(connection: &Connection) -> Result<(), SchemaError> {
    let sql = SCHEMA_REGISTRY_TABLE
        .create_sql()
        .replacen("CREATE TABLE", "CREATE TABLE IF NOT EXISTS", 1);
    connection.execute_batch(&sql)?;
    Ok(())
}

fn ensure_table(
    connection: &Connection,
    descriptor: &'static TableDescriptor,
) -> Result<SchemaStatus, SchemaError> {
    if let Some(columns) = inspect(connection, descriptor.name)? {
        compare(descriptor, &columns)?;
        compare_keys(descriptor, &inspect_keys(connection, descriptor.name)?)?;
        debug!(table = descriptor.name, "table layout is compatible");
        return Ok(SchemaStatus::Compatible);
    }

    if let Err(error) = connection.execute_batch(&descriptor.create_sql()) {
        // Another initializer may have won the race; its table must still match.
        let Some(columns) = inspect(connection, descriptor.name)? else {
            return Err(error.into());
        };
        compare(descriptor, &columns)?;
        compare_keys(descriptor, &inspect_keys(connection, descriptor.name)?)?;
        debug!(table = descriptor.name, "table created concurrently; layout is compatible");
        return Ok(SchemaStatus::Compatible);
    }

    let table_name = descriptor.name.to_owned();
    let params: [&dyn ToSql; 2] = [&table_name, &DESCRIPTOR_VERSION];
    connection.execute(
        "INSERT OR IGNORE INTO schema_registry (table_name, descriptor_version, created_at) \
         VALUES (?, ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    info!(table = descriptor.name, version = DESCRIPTOR_VERSION, "created table");
    Ok(SchemaStatus::Created)
}

/// Column as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExistingColumn {
    name: String,
    data_type: String,
    nullable: bool,
}

fn inspect(connection: &Connection, table: &str) -> Result<Option<Vec<ExistingColumn>>, SchemaError> {
    let mut statement = connection.prepare(
        "SELECT column_name, data_type, is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = 'main' AND table_name = ? \
         ORDER BY ordinal_position",
    )?;
    let rows = statement.query_map([table], |row| {
        let is_nullable: String = row.get(2)?;
        Ok(ExistingColumn {
            name: row.get(0)?,
            data_type: row.get(1)?,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
        })
    })?;
    let columns = rows.collect::<Result<Vec<_>, _>>()?;
    Ok((!columns.is_empty()).then_some(columns))
}

/// Primary and unique keys as `(kind, comma-joined lowercase columns)`, sorted.
type KeySet = Vec<(String, String)>;

fn inspect_keys(connection: &Connection, table: &str) -> Result<KeySet, SchemaError> {
    let mut statement = connection.prepare(
        "SELECT constraint_type, array_to_string(constraint_column_names, ',') \
         FROM duckdb_constraints() \
         WHERE schema_name = 'main' AND table_name = ? \
           AND constraint_type IN ('PRIMARY KEY', 'UNIQUE')",
    )?;
    let rows = statement.query_map([table], |row| {
        let kind: String = row.get(0)?;
        let columns: String = row.get(1)?;
        Ok((kind.to_ascii_uppercase(), columns.to_ascii_lowercase()))
    })?;
    let mut keys = rows.collect::<Result<KeySet, _>>()?;
    keys.sort();
    keys.dedup();
    Ok(keys)
}

fn declared_keys(descriptor: &TableDescriptor) -> KeySet {
    let mut keys: KeySet = std::iter::once(("PRIMARY KEY", descriptor.primary_key))
        .chain(descriptor.unique.iter().map(|columns| ("UNIQUE", *columns)))
        .map(|(kind, columns)| (kind.to_owned(), columns.join(",")))
        .collect();
    keys.sort();
    keys
}

fn compare_keys(descriptor: &'static TableDescriptor, existing: &KeySet) -> Result<(), SchemaError> {
    let expected = declared_keys(descriptor);
    if expected == *existing {
        return Ok(());
    }
    let render = |keys: &KeySet| {
        let rendered: Vec<String> = keys
            .iter()
            .map(|(kind, columns)| format!("{kind} ({columns})"))
            .collect();
        if rendered.is_empty() {
            String::from("none")
        } else {
            rendered.join(", ")
        }
    };
    let detail = format!("expected keys {}, found {}", render(&expected), render(existing));
    warn!(table = descriptor.name, %detail, "incompatible table keys");
    Err(SchemaError::Incompatible {
        table: descriptor.name,
        detail,
    })
}

fn compare(descriptor: &'static TableDescriptor, existing: &[ExistingColumn]) -> Result<(), SchemaError> {
    let incompatible = |detail: String| {
        warn!(table = descriptor.name, %detail, "incompatible table layout");
        SchemaError::Incompatible {
            table: descriptor.name,
            detail,
        }
    };

    if existing.len() != descriptor.columns.len() {
        let found: Vec<&str> = existing.iter().map(|column| column.name.as_str()).collect();
        return Err(incompatible(format!(
            "expected {} columns, found {} ({})",
            descriptor.columns.len(),
            existing.len(),
            found.join(", ")
        )));
    }

    for (index, (expected, actual)) in descriptor.columns.iter().zip(existing).enumerate() {
        if !expected.name.eq_ignore_ascii_case(&actual.name) {
            return Err(incompatible(format!(
                "column {index} is '{}', expected '{}'",
                actual.name, expected.name
            )));
        }
        if !expected.ty.matches(&actual.data_type) {
            return Err(incompatible(format!(
                "column '{}' has type {}, expected {}",
                expected.name, actual.data_type, expected.ty
            )));
        }
        if expected.nullable != actual.nullable {
            return Err(incompatible(format!(
                "column '{}' nullability is {}, expected {}",
                expected.name,
                if actual.nullable { "NULL" } else { "NOT NULL" },
                if expected.nullable { "NULL" } else { "NOT NULL" },
            )));
        }
    }

    Ok(())
}
