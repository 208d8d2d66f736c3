//! SQLite-backed timetable store.
//!
//! Intervals and rows live in two tables; each row references its interval
//! with `ON DELETE CASCADE`. A merge runs in one transaction, so readers see
//! either the state before it or after it. SQLite admits a single writer, so
//! merges also take an in-process writer lock rather than racing for the
//! database lock.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{
    Crs, Interval, IntervalId, NewEntry, TimeField, TimetableEntry, Timestamp,
};

use super::merge::{plan_merge, validate_window};
use super::{Lookup, StoreError, TimetableStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS intervals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        station_code TEXT NOT NULL,
        start_timestamp INTEGER NOT NULL,
        stop_timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_intervals_station ON intervals (station_code, start_timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS timetables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        station_code TEXT NOT NULL,
        service TEXT NOT NULL,
        train_uid TEXT NOT NULL,
        aimed_departure_timestamp INTEGER,
        aimed_arrival_timestamp INTEGER,
        interval_id INTEGER NOT NULL REFERENCES intervals (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_timetables_natural_key ON timetables (
        station_code,
        train_uid,
        IFNULL(aimed_departure_timestamp, -1),
        IFNULL(aimed_arrival_timestamp, -1)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_timetables_departure ON timetables (station_code, aimed_departure_timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_timetables_arrival ON timetables (station_code, aimed_arrival_timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_timetables_interval ON timetables (interval_id)",
];

const INTERVAL_COLUMNS: &str = "id, station_code, start_timestamp, stop_timestamp";

#[derive(Debug, FromRow)]
struct IntervalRow {
    id: i64,
    station_code: String,
    start_timestamp: i64,
    stop_timestamp: i64,
}

impl TryFrom<IntervalRow> for Interval {
    type Error = StoreError;

    fn try_from(row: IntervalRow) -> Result<Self, Self::Error> {
        let station = Crs::parse(&row.station_code).map_err(|e| {
            StoreError::Corrupt(format!("interval {}: {e}", row.id))
        })?;
        Ok(Interval {
            id: IntervalId(row.id),
            station,
            start: Timestamp::from_secs(row.start_timestamp),
            stop: Timestamp::from_secs(row.stop_timestamp),
        })
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: i64,
    station_code: String,
    service: String,
    train_uid: String,
    aimed_departure_timestamp: Option<i64>,
    aimed_arrival_timestamp: Option<i64>,
    interval_id: i64,
}

impl TryFrom<EntryRow> for TimetableEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let station = Crs::parse(&row.station_code)
            .map_err(|e| StoreError::Corrupt(format!("timetable row {}: {e}", row.id)))?;
        Ok(TimetableEntry {
            id: row.id,
            station,
            service: row.service,
            train_uid: row.train_uid,
            departure: row.aimed_departure_timestamp.map(Timestamp::from_secs),
            arrival: row.aimed_arrival_timestamp.map(Timestamp::from_secs),
            interval_id: IntervalId(row.interval_id),
        })
    }
}

fn to_intervals(rows: Vec<IntervalRow>) -> Result<Vec<Interval>, StoreError> {
    rows.into_iter().map(Interval::try_from).collect()
}

async fn find_containing(
    conn: &mut SqliteConnection,
    station: Crs,
    t: Timestamp,
) -> Result<Option<Interval>, StoreError> {
    let row: Option<IntervalRow> = sqlx::query_as(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals
         WHERE station_code = ? AND start_timestamp <= ? AND stop_timestamp > ?
         LIMIT 1"
    ))
    .bind(station.as_str())
    .bind(t.secs())
    .bind(t.secs())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Interval::try_from).transpose()
}

/// The interval whose closed range `[start, stop]` contains `t`.
async fn find_touching(
    conn: &mut SqliteConnection,
    station: Crs,
    t: Timestamp,
) -> Result<Option<Interval>, StoreError> {
    let row: Option<IntervalRow> = sqlx::query_as(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals
         WHERE station_code = ? AND start_timestamp <= ? AND stop_timestamp >= ?
         LIMIT 1"
    ))
    .bind(station.as_str())
    .bind(t.secs())
    .bind(t.secs())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Interval::try_from).transpose()
}

async fn find_fully_inside(
    conn: &mut SqliteConnection,
    station: Crs,
    t0: Timestamp,
    t1: Timestamp,
) -> Result<Vec<Interval>, StoreError> {
    let rows: Vec<IntervalRow> = sqlx::query_as(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals
         WHERE station_code = ? AND start_timestamp >= ? AND stop_timestamp <= ?
         ORDER BY start_timestamp"
    ))
    .bind(station.as_str())
    .bind(t0.secs())
    .bind(t1.secs())
    .fetch_all(&mut *conn)
    .await?;
    to_intervals(rows)
}

async fn is_covered(
    conn: &mut SqliteConnection,
    station: Crs,
    t0: Timestamp,
    t1: Timestamp,
) -> Result<bool, StoreError> {
    let found: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM intervals
         WHERE station_code = ? AND start_timestamp <= ? AND stop_timestamp > ?
         LIMIT 1",
    )
    .bind(station.as_str())
    .bind(t0.secs())
    .bind(t1.secs())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Delete the intervals in `old_ids` and insert `[start, stop)` in their
/// place, re-pointing the rows of every deleted interval to it.
async fn replace(
    conn: &mut SqliteConnection,
    station: Crs,
    old_ids: &[IntervalId],
    start: Timestamp,
    stop: Timestamp,
) -> Result<Interval, StoreError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO intervals (station_code, start_timestamp, stop_timestamp)
         VALUES (?, ?, ?)
         RETURNING id",
    )
    .bind(station.as_str())
    .bind(start.secs())
    .bind(stop.secs())
    .fetch_one(&mut *conn)
    .await?;

    for old in old_ids {
        sqlx::query("UPDATE timetables SET interval_id = ? WHERE interval_id = ?")
            .bind(id)
            .bind(old.0)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM intervals WHERE id = ?")
            .bind(old.0)
            .execute(&mut *conn)
            .await?;
    }

    Ok(Interval {
        id: IntervalId(id),
        station,
        start,
        stop,
    })
}

/// Insert rows under `interval_id`, skipping any whose natural key is already
/// stored. Returns how many were inserted.
async fn insert_rows(
    conn: &mut SqliteConnection,
    interval_id: IntervalId,
    rows: &[NewEntry],
) -> Result<u64, StoreError> {
    let mut inserted = 0;
    for row in rows {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO timetables
                (station_code, service, train_uid, aimed_departure_timestamp, aimed_arrival_timestamp, interval_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(row.station.as_str())
        .bind(&row.service)
        .bind(&row.train_uid)
        .bind(row.departure.map(Timestamp::secs))
        .bind(row.arrival.map(Timestamp::secs))
        .bind(interval_id.0)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Timetable store persisted in a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    writer: Mutex<()>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and create the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(url, "Opened timetable database");
        Ok(store)
    }

    /// A private in-memory database, lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection to `:memory:` is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Mutex::new(()),
        }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// All rows stored for a station, ordered by id.
    pub async fn entries(&self, station: Crs) -> Result<Vec<TimetableEntry>, StoreError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT id, station_code, service, train_uid,
                    aimed_departure_timestamp, aimed_arrival_timestamp, interval_id
             FROM timetables WHERE station_code = ? ORDER BY id",
        )
        .bind(station.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TimetableEntry::try_from).collect()
    }
}

impl TimetableStore for SqliteStore {
    async fn find_containing(
        &self,
        station: Crs,
        t: Timestamp,
    ) -> Result<Option<Interval>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        find_containing(&mut conn, station, t).await
    }

    async fn find_fully_inside(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<Vec<Interval>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        find_fully_inside(&mut conn, station, t0, t1).await
    }

    async fn intervals(&self, station: Crs) -> Result<Vec<Interval>, StoreError> {
        let rows: Vec<IntervalRow> = sqlx::query_as(&format!(
            "SELECT {INTERVAL_COLUMNS} FROM intervals
             WHERE station_code = ? ORDER BY start_timestamp"
        ))
        .bind(station.as_str())
        .fetch_all(&self.pool)
        .await?;
        to_intervals(rows)
    }

    async fn read(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        field: TimeField,
    ) -> Result<Lookup, StoreError> {
        let mut tx = self.pool.begin().await?;

        if !is_covered(&mut tx, station, t0, t1).await? {
            tx.commit().await?;
            return Ok(Lookup::Incomplete);
        }

        let column = field.column();
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT id, station_code, service, train_uid,
                    aimed_departure_timestamp, aimed_arrival_timestamp, interval_id
             FROM timetables
             WHERE station_code = ? AND {column} BETWEEN ? AND ?
             ORDER BY {column}, train_uid"
        ))
        .bind(station.as_str())
        .bind(t0.secs())
        .bind(t1.secs())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let entries = rows
            .into_iter()
            .map(TimetableEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Lookup::Complete(entries))
    }

    async fn merge(
        &self,
        station: Crs,
        t0: Timestamp,
        t_max: Timestamp,
        rows: Vec<NewEntry>,
    ) -> Result<Interval, StoreError> {
        validate_window(station, t0, t_max, &rows)?;

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let left = find_touching(&mut tx, station, t0).await?;
        let right = find_touching(&mut tx, station, t_max).await?;
        let middle = find_fully_inside(&mut tx, station, t0, t_max).await?;
        let plan = plan_merge(t0, t_max, left, right, middle);

        let interval = replace(&mut tx, station, &plan.absorbed, plan.start, plan.stop).await?;
        let inserted = insert_rows(&mut tx, interval.id, &rows).await?;

        tx.commit().await?;

        debug!(
            station = %station,
            interval = %interval.id,
            absorbed = plan.absorbed.len(),
            inserted,
            "Merged window"
        );
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn kgx() -> Crs {
        Crs::parse("KGX").unwrap()
    }

    fn t(s: i64) -> Timestamp {
        Timestamp::from_secs(s)
    }

    fn dep(uid: &str, secs: i64) -> NewEntry {
        NewEntry {
            station: kgx(),
            service: "24745000".to_string(),
            train_uid: uid.to_string(),
            departure: Some(t(secs)),
            arrival: None,
        }
    }

    fn arr(uid: &str, secs: i64) -> NewEntry {
        NewEntry {
            station: kgx(),
            service: "24745000".to_string(),
            train_uid: uid.to_string(),
            departure: None,
            arrival: Some(t(secs)),
        }
    }

    fn bounds(intervals: &[Interval]) -> Vec<(i64, i64)> {
        intervals
            .iter()
            .map(|i| (i.start.secs(), i.stop.secs()))
            .collect()
    }

    #[tokio::test]
    async fn merge_and_read_back() {
        let store = SqliteStore::in_memory().await.unwrap();

        let interval = store
            .merge(kgx(), t(0), t(500), vec![dep("B", 200), dep("A", 100), arr("C", 150)])
            .await
            .unwrap();
        assert_eq!((interval.start, interval.stop), (t(0), t(500)));

        let deps = store
            .read(kgx(), t(0), t(499), TimeField::Departure)
            .await
            .unwrap()
            .complete()
            .unwrap();
        let uids: Vec<_> = deps.iter().map(|e| e.train_uid.as_str()).collect();
        assert_eq!(uids, vec!["A", "B"]);
        assert!(deps.iter().all(|e| e.interval_id == interval.id));
        assert_eq!(deps[0].service, "24745000");

        let arrs = store
            .read(kgx(), t(0), t(499), TimeField::Arrival)
            .await
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(arrs.len(), 1);
        assert_eq!(arrs[0].departure, None);
    }

    #[tokio::test]
    async fn partial_coverage_is_incomplete() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.merge(kgx(), t(0), t(500), vec![dep("A", 10)]).await.unwrap();

        let lookup = store.read(kgx(), t(0), t(800), TimeField::Departure).await.unwrap();
        assert_eq!(lookup, Lookup::Incomplete);

        let lookup = store.read(kgx(), t(0), t(500), TimeField::Departure).await.unwrap();
        assert_eq!(lookup, Lookup::Incomplete);
    }

    #[tokio::test]
    async fn touching_and_spanning_windows_coalesce() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.merge(kgx(), t(0), t(100), vec![dep("A", 10)]).await.unwrap();
        store.merge(kgx(), t(100), t(200), vec![dep("B", 110)]).await.unwrap();
        store.merge(kgx(), t(300), t(400), vec![dep("C", 310)]).await.unwrap();
        store.merge(kgx(), t(600), t(700), vec![dep("D", 610)]).await.unwrap();
        assert_eq!(
            bounds(&store.intervals(kgx()).await.unwrap()),
            vec![(0, 200), (300, 400), (600, 700)]
        );

        let merged = store
            .merge(kgx(), t(150), t(650), vec![dep("E", 500)])
            .await
            .unwrap();
        assert_eq!(bounds(&store.intervals(kgx()).await.unwrap()), vec![(0, 700)]);

        let entries = store.entries(kgx()).await.unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.interval_id == merged.id));
    }

    #[tokio::test]
    async fn refetch_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let rows = vec![dep("A", 10), arr("A", 5), dep("B", 20)];

        store.merge(kgx(), t(0), t(500), rows.clone()).await.unwrap();
        store.merge(kgx(), t(0), t(500), rows).await.unwrap();

        assert_eq!(store.intervals(kgx()).await.unwrap().len(), 1);
        assert_eq!(store.entries(kgx()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn find_operations() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.merge(kgx(), t(0), t(100), vec![]).await.unwrap();
        store.merge(kgx(), t(200), t(300), vec![]).await.unwrap();

        let found = store.find_containing(kgx(), t(50)).await.unwrap();
        assert_eq!(found.map(|i| i.start), Some(t(0)));
        assert!(store.find_containing(kgx(), t(100)).await.unwrap().is_none());

        let inside = store.find_fully_inside(kgx(), t(150), t(300)).await.unwrap();
        assert_eq!(bounds(&inside), vec![(200, 300)]);
    }

    #[tokio::test]
    async fn stations_are_independent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let yrk = Crs::parse("YRK").unwrap();

        store.merge(kgx(), t(0), t(100), vec![dep("A", 10)]).await.unwrap();

        let lookup = store.read(yrk, t(0), t(50), TimeField::Departure).await.unwrap();
        assert_eq!(lookup, Lookup::Incomplete);
        assert!(store.intervals(yrk).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_window() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.merge(kgx(), t(100), t(100), vec![]).await;
        assert!(matches!(result, Err(StoreError::InvalidWindow(_))));
    }

    #[tokio::test]
    async fn concurrent_merges_keep_invariant() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let start = i * 100;
                    store
                        .merge(kgx(), t(start), t(start + 100), vec![dep("X", start + 1)])
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(bounds(&store.intervals(kgx()).await.unwrap()), vec![(0, 600)]);
        assert_eq!(store.entries(kgx()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("train.db").display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.merge(kgx(), t(0), t(500), vec![dep("A", 10)]).await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteStore::connect(&url).await.unwrap();
        let entries = store
            .read(kgx(), t(0), t(100), TimeField::Departure)
            .await
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].train_uid, "A");
    }
}
