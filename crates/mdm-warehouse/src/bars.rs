//! Per-class bar tables: validated upserts, batch ingestion, lazy range
//! queries and range deletes.

use std::collections::VecDeque;

use ::duckdb::{Connection, OptionalExt, ToSql};
use mdm_core::{AssetClass, AssetId, Bar, BarRow, Interval, Ohlcv, TimeRange, UtcDateTime};
use tracing::{debug, info};

use crate::codec::{decimal_param, parse_decimal, parse_ts, ts_param};
use crate::duckdb::DuckDbConnectionManager;
use crate::error::{BarError, BarSlot, StoreFault};
use crate::schema::{bar_table, TableDescriptor};

/// Outcome of one row of a batch.
#[derive(Debug)]
pub struct RowOutcome<E = BarError> {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    pub ts: UtcDateTime,
    pub result: Result<(), E>,
}

/// Per-row results of a batch upsert, in submission order.
#[derive(Debug)]
pub struct BatchReport<E = BarError> {
    pub outcomes: Vec<RowOutcome<E>>,
}

impl<E> BatchReport<E> {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|row| row.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failed rows with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &E)> {
        self.outcomes
            .iter()
            .filter_map(|row| row.result.as_ref().err().map(|error| (row.index, error)))
    }

    /// Convert each row error; `map` also receives the row's timestamp.
    pub fn map_err<F>(self, mut map: impl FnMut(UtcDateTime, E) -> F) -> BatchReport<F> {
        BatchReport {
            outcomes: self
                .outcomes
                .into_iter()
                .map(|row| {
                    let ts = row.ts;
                    RowOutcome {
                        index: row.index,
                        ts,
                        result: row.result.map_err(|error| map(ts, error)),
                    }
                })
                .collect(),
        }
    }
}

/// Bar tables, one per asset class.
#[derive(Debug, Clone)]
pub struct BarStore {
    manager: DuckDbConnectionManager,
}

impl BarStore {
    pub fn new(manager: DuckDbConnectionManager) -> Self {
        Self { manager }
    }

    /// Insert or replace the bar in slot `(asset_id, interval, ts)`.
    ///
    /// Nothing is written when validation fails or the asset does not exist
    /// as `class`.
    pub fn upsert_bar(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        ts: UtcDateTime,
        values: Ohlcv,
    ) -> Result<(), BarError> {
        let bar = Bar::new(class, asset_id, interval, ts, values).map_err(|source| {
            BarError::InvalidBar {
                slot: BarSlot {
                    asset_id,
                    interval,
                    ts,
                },
                source,
            }
        })?;

        let connection = self.manager.acquire()?;
        connection.transaction(|tx| {
            claim_owner(tx, class, asset_id)?;
            write_bar(tx, bar_table(class), &bar)
        })?;
        debug!(
            asset_id = asset_id.get(),
            class = %class,
            interval = %interval,
            ts = %ts,
            "upserted bar"
        );
        Ok(())
    }

    /// Upsert each row in its own transaction.
    ///
    /// Rows succeed or fail independently; only an unknown or wrong-class
    /// asset fails the whole call.
    pub fn upsert_bars_batch(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        rows: &[BarRow],
    ) -> Result<BatchReport, BarError> {
        {
            let connection = self.manager.acquire()?;
            connection.read(|conn| ensure_owner(conn, class, asset_id))?;
        }

        let outcomes: Vec<RowOutcome> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| RowOutcome {
                index,
                ts: row.ts,
                result: self.upsert_bar(class, asset_id, interval, row.ts, row.values),
            })
            .collect();
        let report = BatchReport { outcomes };

        info!(
            asset_id = asset_id.get(),
            class = %class,
            interval = %interval,
            rows = rows.len(),
            failed = report.failed(),
            "batch upsert finished"
        );
        Ok(report)
    }

    /// Bars of one asset and interval within `range`, ascending by timestamp.
    ///
    /// The returned query fetches nothing until iterated and can be iterated
    /// any number of times.
    pub fn query_bars(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
    ) -> Result<BarQuery, BarError> {
        let range = TimeRange::new(range.from, range.to)
            .map_err(|source| BarError::InvalidRange { asset_id, source })?;
        Ok(BarQuery {
            manager: self.manager.clone(),
            class,
            asset_id,
            interval,
            range,
            page_size: self.manager.query_page_size(),
        })
    }

    /// Delete bars of one asset and interval within `range`; returns the count.
    pub fn delete_bars(
        &self,
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
    ) -> Result<u64, BarError> {
        let range = TimeRange::new(range.from, range.to)
            .map_err(|source| BarError::InvalidRange { asset_id, source })?;
        let table = bar_table(class);

        let connection = self.manager.acquire()?;
        let removed = connection.transaction(|tx| {
            claim_owner(tx, class, asset_id)?;
            let filter = RangeFilter::new(asset_id, interval, range, None);
            let sql = format!("DELETE FROM {} WHERE {}", table.name, filter.clause());
            let removed = tx.execute(&sql, filter.params().as_slice())?;
            Ok::<_, BarError>(removed as u64)
        })?;
        info!(
            asset_id = asset_id.get(),
            class = %class,
            interval = %interval,
            rows = removed,
            "deleted bars"
        );
        Ok(removed)
    }

    /// Bars of any interval stored for the asset.
    pub fn count_bars(&self, class: AssetClass, asset_id: AssetId) -> Result<u64, BarError> {
        let connection = self.manager.acquire()?;
        connection.read(|conn| Ok::<_, BarError>(count_for_asset(conn, class, asset_id)?))
    }
}

/// Restartable description of a bar range query.
#[derive(Debug, Clone)]
pub struct BarQuery {
    manager: DuckDbConnectionManager,
    class: AssetClass,
    asset_id: AssetId,
    interval: Interval,
    range: TimeRange,
    page_size: usize,
}

impl BarQuery {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Start a fresh pass over the range.
    pub fn iter(&self) -> BarIter {
        BarIter {
            query: self.clone(),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Drain the whole range into memory.
    pub fn collect_all(&self) -> Result<Vec<Bar>, BarError> {
        self.iter().collect()
    }

    fn fetch_page(&self, cursor: Option<UtcDateTime>) -> Result<Vec<Bar>, BarError> {
        let table = bar_table(self.class);
        let filter = RangeFilter::new(self.asset_id, self.interval, self.range, cursor);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY ts LIMIT {}",
            select_columns(table),
            table.name,
            filter.clause(),
            self.page_size
        );

        let connection = self.manager.acquire()?;
        let records = connection.read(|conn| {
            let mut statement = conn.prepare(&sql)?;
            let adjusted = table.has_column("adjusted_close");
            let rows = statement.query_map(filter.params().as_slice(), |row| {
                BarRecord::from_row(row, adjusted)
            })?;
            Ok::<_, BarError>(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        records
            .into_iter()
            .map(|record| {
                record
                    .into_bar(table, self.asset_id, self.interval)
                    .map_err(BarError::from)
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a BarQuery {
    type Item = Result<Bar, BarError>;
    type IntoIter = BarIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy pass over a [`BarQuery`], fetching one page at a time.
#[derive(Debug)]
pub struct BarIter {
    query: BarQuery,
    buffer: VecDeque<Bar>,
    cursor: Option<UtcDateTime>,
    exhausted: bool,
}

impl Iterator for BarIter {
    type Item = Result<Bar, BarError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.query.fetch_page(self.cursor) {
                Ok(page) => {
                    self.exhausted = page.len() < self.query.page_size;
                    self.buffer.extend(page);
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }

        let bar = self.buffer.pop_front()?;
        self.cursor = Some(bar.ts);
        Some(Ok(bar))
    }
}

/// `WHERE` clause and parameters for one asset, interval and range.
struct RangeFilter {
    asset_id: i64,
    interval: String,
    bounds: Vec<(&'static str, String)>,
}

impl RangeFilter {
    fn new(
        asset_id: AssetId,
        interval: Interval,
        range: TimeRange,
        after: Option<UtcDateTime>,
    ) -> Self {
        let mut bounds = Vec::new();
        if let Some(from) = range.from {
            bounds.push(("ts >= CAST(? AS TIMESTAMP)", ts_param(from)));
        }
        if let Some(to) = range.to {
            bounds.push(("ts <= CAST(? AS TIMESTAMP)", ts_param(to)));
        }
        if let Some(after) = after {
            bounds.push(("ts > CAST(? AS TIMESTAMP)", ts_param(after)));
        }
        Self {
            asset_id: asset_id.get(),
            interval: interval.as_str().to_owned(),
            bounds,
        }
    }

    fn clause(&self) -> String {
        let mut clause = String::from("asset_id = ? AND bar_interval = ?");
        for (condition, _) in &self.bounds {
            clause.push_str(" AND ");
            clause.push_str(condition);
        }
        clause
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        let mut params: Vec<&dyn ToSql> = vec![&self.asset_id, &self.interval];
        params.extend(self.bounds.iter().map(|(_, value)| value as &dyn ToSql));
        params
    }
}

/// Raw bar columns as text, decoded outside the row callback.
struct BarRecord {
    ts: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    adjusted_close: Option<String>,
}

impl BarRecord {
    /// `adjusted` says whether the seventh column was selected.
    fn from_row(row: &::duckdb::Row<'_>, adjusted: bool) -> Result<Self, ::duckdb::Error> {
        Ok(Self {
            ts: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            adjusted_close: if adjusted { row.get(6)? } else { None },
        })
    }

    fn into_bar(
        self,
        table: &'static TableDescriptor,
        asset_id: AssetId,
        interval: Interval,
    ) -> Result<Bar, StoreFault> {
        let name = table.name;
        let values = Ohlcv {
            open: parse_decimal(name, "open", &self.open)?,
            high: parse_decimal(name, "high", &self.high)?,
            low: parse_decimal(name, "low", &self.low)?,
            close: parse_decimal(name, "close", &self.close)?,
            volume: parse_decimal(name, "volume", &self.volume)?,
            adjusted_close: self
                .adjusted_close
                .as_deref()
                .map(|raw| parse_decimal(name, "adjusted_close", raw))
                .transpose()?,
        };
        Ok(Bar {
            asset_id,
            interval,
            ts: parse_ts(name, &self.ts)?,
            values,
        })
    }
}

fn select_columns(table: &TableDescriptor) -> &'static str {
    if table.has_column("adjusted_close") {
        "CAST(ts AS VARCHAR), CAST(open AS VARCHAR), CAST(high AS VARCHAR), \
         CAST(low AS VARCHAR), CAST(close AS VARCHAR), CAST(volume AS VARCHAR), \
         CAST(adjusted_close AS VARCHAR)"
    } else {
        "CAST(ts AS VARCHAR), CAST(open AS VARCHAR), CAST(high AS VARCHAR), \
         CAST(low AS VARCHAR), CAST(close AS VARCHAR), CAST(volume AS VARCHAR)"
    }
}

fn write_bar(tx: &Connection, table: &TableDescriptor, bar: &Bar) -> Result<(), BarError> {
    let asset_id = bar.asset_id.get();
    let interval = bar.interval.as_str();
    let ts = ts_param(bar.ts);
    let open = decimal_param(bar.values.open);
    let high = decimal_param(bar.values.high);
    let low = decimal_param(bar.values.low);
    let close = decimal_param(bar.values.close);
    let volume = decimal_param(bar.values.volume);
    let updated_at = ts_param(UtcDateTime::now());

    if table.has_column("adjusted_close") {
        let adjusted_close = bar.values.adjusted_close.map(decimal_param);
        let params: [&dyn ToSql; 10] = [
            &asset_id,
            &interval,
            &ts,
            &open,
            &high,
            &low,
            &close,
            &volume,
            &adjusted_close,
            &updated_at,
        ];
        let sql = format!(
            "INSERT OR REPLACE INTO {} \
             (asset_id, bar_interval, ts, open, high, low, close, volume, adjusted_close, updated_at) \
             VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(18,6)), \
             CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(38,8)), \
             CAST(? AS DECIMAL(18,6)), CAST(? AS TIMESTAMP))",
            table.name
        );
        tx.execute(&sql, params.as_slice())?;
    } else {
        let params: [&dyn ToSql; 9] = [
            &asset_id,
            &interval,
            &ts,
            &open,
            &high,
            &low,
            &close,
            &volume,
            &updated_at,
        ];
        let sql = format!(
            "INSERT OR REPLACE INTO {} \
             (asset_id, bar_interval, ts, open, high, low, close, volume, updated_at) \
             VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(18,6)), \
             CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(18,6)), CAST(? AS DECIMAL(38,8)), \
             CAST(? AS TIMESTAMP))",
            table.name
        );
        tx.execute(&sql, params.as_slice())?;
    }
    Ok(())
}

/// Fail unless `asset_id` exists and belongs to `class`.
pub(crate) fn ensure_owner(
    conn: &Connection,
    class: AssetClass,
    asset_id: AssetId,
) -> Result<(), BarError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT asset_class FROM assets WHERE asset_id = ?",
            [asset_id.get()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Err(BarError::UnknownAsset { asset_id });
    };
    let actual: AssetClass = stored.parse().map_err(|_| StoreFault::Corrupt {
        table: "assets",
        detail: format!("asset_id={asset_id} has unknown class '{stored}'"),
    })?;
    if actual != class {
        return Err(BarError::ClassMismatch {
            asset_id,
            expected: class,
            actual,
        });
    }
    Ok(())
}

/// Owner check for write transactions.
///
/// Rewrites the asset row so that a concurrent delete or update of the asset
/// and this transaction cannot both commit; the loser fails with a
/// write-write conflict. `asset_class` is an indexed column, so DuckDB
/// applies the update as a delete plus insert of the row.
fn claim_owner(tx: &Connection, class: AssetClass, asset_id: AssetId) -> Result<(), BarError> {
    ensure_owner(tx, class, asset_id)?;
    let touched = tx.execute(
        "UPDATE assets SET asset_class = asset_class WHERE asset_id = ?",
        [asset_id.get()],
    )?;
    if touched == 0 {
        return Err(BarError::UnknownAsset { asset_id });
    }
    Ok(())
}

pub(crate) fn count_for_asset(
    conn: &Connection,
    class: AssetClass,
    asset_id: AssetId,
) -> Result<u64, ::duckdb::Error> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE asset_id = ?", bar_table(class).name);
    let count: i64 = conn.query_row(&sql, [asset_id.get()], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

pub(crate) fn delete_for_asset(
    conn: &Connection,
    class: AssetClass,
    asset_id: AssetId,
) -> Result<u64, ::duckdb::Error> {
    let sql = format!("DELETE FROM {} WHERE asset_id = ?", bar_table(class).name);
    Ok(conn.execute(&sql, [asset_id.get()])? as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use crate::error::RegistryError;
    use crate::registry::{AssetRegistry, DeletePolicy};
    use crate::schema::SchemaManager;
    use rust_decimal_macros::dec;

    fn store_with_asset(class: AssetClass) -> (BarStore, AssetId) {
        let (manager, asset_id) = manager_with_asset(class);
        (BarStore::new(manager), asset_id)
    }

    fn manager_with_asset(class: AssetClass) -> (DuckDbConnectionManager, AssetId) {
        let manager =
            DuckDbConnectionManager::in_memory(&WarehouseConfig::default()).expect("database");
        SchemaManager::new(manager.clone()).ensure_all().expect("schema");
        let asset_id: i64 = manager
            .acquire()
            .expect("connection")
            .query_row(
                "INSERT INTO assets (symbol, asset_class, display_name, metadata, created_at, updated_at) \
                 VALUES ('TEST', ?, 'Test', '{}', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP) RETURNING asset_id",
                [class.as_str()],
                |row| row.get(0),
            )
            .expect("insert asset");
        (manager, AssetId(asset_id))
    }

    fn day(n: u32) -> UtcDateTime {
        UtcDateTime::parse(&format!("2024-01-{n:02}")).expect("ts")
    }

    fn values(close: rust_decimal::Decimal) -> Ohlcv {
        Ohlcv::new(dec!(100), dec!(110), dec!(90), close, dec!(1000))
    }

    #[test]
    fn range_filter_adds_only_present_bounds() {
        let range = TimeRange::new(Some(day(2)), None).expect("range");
        let filter = RangeFilter::new(AssetId(1), Interval::OneDay, range, Some(day(3)));
        assert_eq!(
            filter.clause(),
            "asset_id = ? AND bar_interval = ? AND ts >= CAST(? AS TIMESTAMP) AND ts > CAST(? AS TIMESTAMP)"
        );
        assert_eq!(filter.params().len(), 4);
    }

    #[test]
    fn pages_through_range_in_order() {
        let (store, asset_id) = store_with_asset(AssetClass::Crypto);
        for n in [5, 1, 3, 2, 4] {
            store
                .upsert_bar(AssetClass::Crypto, asset_id, Interval::OneDay, day(n), values(dec!(100)))
                .expect("upsert");
        }

        let query = store
            .query_bars(AssetClass::Crypto, asset_id, Interval::OneDay, TimeRange::all())
            .expect("query")
            .with_page_size(2);
        let days: Vec<UtcDateTime> = query.iter().map(|bar| bar.expect("bar").ts).collect();
        assert_eq!(days, vec![day(1), day(2), day(3), day(4), day(5)]);

        // Restartable: a second pass yields the same sequence.
        let again: Vec<UtcDateTime> = query.iter().map(|bar| bar.expect("bar").ts).collect();
        assert_eq!(again, days);
    }

    #[test]
    fn delete_respects_range_bounds() {
        let (store, asset_id) = store_with_asset(AssetClass::Equity);
        for n in 1..=4 {
            store
                .upsert_bar(AssetClass::Equity, asset_id, Interval::OneDay, day(n), values(dec!(101)))
                .expect("upsert");
        }

        let range = TimeRange::new(Some(day(2)), Some(day(3))).expect("range");
        let removed = store
            .delete_bars(AssetClass::Equity, asset_id, Interval::OneDay, range)
            .expect("delete");
        assert_eq!(removed, 2);
        assert_eq!(store.count_bars(AssetClass::Equity, asset_id).expect("count"), 2);
    }

    #[test]
    fn adjusted_close_round_trips_for_equities() {
        let (store, asset_id) = store_with_asset(AssetClass::Equity);
        let bar_values = values(dec!(104.25)).with_adjusted_close(dec!(103.123456));
        store
            .upsert_bar(AssetClass::Equity, asset_id, Interval::OneDay, day(2), bar_values)
            .expect("upsert");

        let bars = store
            .query_bars(AssetClass::Equity, asset_id, Interval::OneDay, TimeRange::at(day(2)))
            .expect("query")
            .collect_all()
            .expect("bars");
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].values, bar_values);
    }

    #[test]
    fn wrong_class_is_rejected_before_writing() {
        let (store, asset_id) = store_with_asset(AssetClass::Crypto);
        let err = store
            .upsert_bar(AssetClass::Equity, asset_id, Interval::OneDay, day(2), values(dec!(100)))
            .expect_err("class mismatch");
        assert!(matches!(
            err,
            BarError::ClassMismatch {
                expected: AssetClass::Equity,
                actual: AssetClass::Crypto,
                ..
            }
        ));
        assert_eq!(store.count_bars(AssetClass::Equity, asset_id).expect("count"), 0);
    }

    #[test]
    fn adjusted_close_decode_errors_are_not_swallowed() {
        let (manager, _) = manager_with_asset(AssetClass::Equity);
        let conn = manager.acquire().expect("connection");

        let err = conn.query_row(
            "SELECT '2024-01-02 00:00:00', '1', '2', '1', '2', '10', 42",
            [],
            |row| BarRecord::from_row(row, true),
        );
        assert!(err.is_err(), "integer adjusted_close must not decode as text");

        let record = conn
            .query_row("SELECT '2024-01-02 00:00:00', '1', '2', '1', '2', '10'", [], |row| {
                BarRecord::from_row(row, false)
            })
            .expect("six columns without adjusted_close");
        assert_eq!(record.adjusted_close, None);
    }

    #[test]
    fn asset_delete_conflicts_with_an_open_bar_write() {
        let (manager, asset_id) = manager_with_asset(AssetClass::Equity);
        let registry = AssetRegistry::new(manager.clone());
        let bar = Bar::new(AssetClass::Equity, asset_id, Interval::OneDay, day(2), values(dec!(100)))
            .expect("bar");

        // The writer has claimed the owner but not yet written its bar.
        let writer = manager.acquire().expect("writer connection");
        writer.execute_batch("BEGIN TRANSACTION").expect("begin");
        claim_owner(&writer, AssetClass::Equity, asset_id).expect("claim owner");

        let err = registry
            .delete_asset(asset_id, DeletePolicy::Reject)
            .expect_err("delete must lose against the open write");
        assert!(
            matches!(&err, RegistryError::Store(fault) if fault.is_transient()),
            "unexpected error: {err}"
        );

        write_bar(&writer, bar_table(AssetClass::Equity), &bar).expect("write bar");
        writer.execute_batch("COMMIT").expect("commit");
        drop(writer);

        // The bar has its owner, and the owner now refuses a plain delete.
        let store = BarStore::new(manager);
        assert_eq!(store.count_bars(AssetClass::Equity, asset_id).expect("count"), 1);
        let err = registry
            .delete_asset(asset_id, DeletePolicy::Reject)
            .expect_err("bar blocks the delete");
        assert!(matches!(err, RegistryError::HasDependentBars { bar_count: 1, .. }));
    }
}
