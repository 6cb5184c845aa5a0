use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::models::{DATE_FORMAT, Entry, PfcDelta, format_date};

pub type DbPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_size: u32,
    /// How long a caller may wait for a free connection.
    pub connection_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the ledger table. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn open(path: &Path, settings: PoolSettings) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        });
        let pool = Pool::builder()
            .max_size(settings.max_size)
            .connection_timeout(settings.connection_timeout)
            .build(manager)?;
        debug!(path = %path.display(), max_size = settings.max_size, "opened ledger pool");
        let db = Database { pool };
        db.migrate()?;
        Ok(db)
    }

    /// Every in-memory connection is its own database, so the pool is capped at one.
    pub fn open_in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;
        let db = Database { pool };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS pfc (
                    date TEXT PRIMARY KEY NOT NULL,
                    proteins REAL NOT NULL DEFAULT 0 CHECK (proteins >= 0),
                    fats REAL NOT NULL DEFAULT 0 CHECK (fats >= 0),
                    carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Bound every total to a finite value. SQLite stores an overflowed
            // sum as Inf, which `>= 0` alone lets through; 9e999 reads as Inf.
            conn.execute_batch(
                "BEGIN;

                CREATE TABLE pfc_new (
                    date TEXT PRIMARY KEY NOT NULL,
                    proteins REAL NOT NULL DEFAULT 0
                        CHECK (proteins >= 0 AND proteins < 9e999),
                    fats REAL NOT NULL DEFAULT 0
                        CHECK (fats >= 0 AND fats < 9e999),
                    carbs REAL NOT NULL DEFAULT 0
                        CHECK (carbs >= 0 AND carbs < 9e999)
                );

                INSERT INTO pfc_new (date, proteins, fats, carbs)
                SELECT date,
                       MIN(proteins, 1.7976931348623157e308),
                       MIN(fats, 1.7976931348623157e308),
                       MIN(carbs, 1.7976931348623157e308)
                FROM pfc;

                DROP TABLE pfc;
                ALTER TABLE pfc_new RENAME TO pfc;

                PRAGMA user_version = 2;
                COMMIT;",
            )?;
        }

        Ok(())
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        let date_str: String = row.get(0)?;
        let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Entry {
            date,
            proteins: row.get(1)?,
            fats: row.get(2)?,
            carbs: row.get(3)?,
        })
    }

    /// Add the delta to the day's totals, creating the row on first use.
    ///
    /// A delta that would take a total below zero or past `f64::MAX` fails with
    /// [`LedgerError::OutOfRange`] and leaves the row untouched.
    pub fn increment(&self, delta: &PfcDelta) -> Result<Entry> {
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO pfc (date, proteins, fats, carbs)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                proteins = pfc.proteins + excluded.proteins,
                fats = pfc.fats + excluded.fats,
                carbs = pfc.carbs + excluded.carbs
             RETURNING date, proteins, fats, carbs",
            params![
                format_date(delta.date),
                delta.proteins,
                delta.fats,
                delta.carbs
            ],
            Self::entry_from_row,
        )
        .map_err(|err| out_of_range(err, delta.date))
    }

    /// Subtract the delta from an existing day, clamping every column at zero.
    pub fn decrement(&self, delta: &PfcDelta) -> Result<Entry> {
        let conn = self.conn()?;
        conn.query_row(
            "UPDATE pfc SET
                proteins = MAX(proteins - ?2, 0.0),
                fats = MAX(fats - ?3, 0.0),
                carbs = MAX(carbs - ?4, 0.0)
             WHERE date = ?1
             RETURNING date, proteins, fats, carbs",
            params![
                format_date(delta.date),
                delta.proteins,
                delta.fats,
                delta.carbs
            ],
            Self::entry_from_row,
        )
        .optional()
        .map_err(|err| out_of_range(err, delta.date))?
        .ok_or(LedgerError::NotFound(delta.date))
    }

    pub fn get(&self, date: NaiveDate) -> Result<Entry> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT date, proteins, fats, carbs FROM pfc WHERE date = ?1",
            params![format_date(date)],
            Self::entry_from_row,
        )
        .optional()?
        .ok_or(LedgerError::NotFound(date))
    }
}

/// The table's CHECK constraints are the range guard; report their violation
/// as a caller error instead of a storage failure.
fn out_of_range(err: rusqlite::Error, date: NaiveDate) -> LedgerError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LedgerError::OutOfRange(date)
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn delta(d: &str, proteins: f64, fats: f64, carbs: f64) -> PfcDelta {
        PfcDelta {
            date: date(d),
            proteins,
            fats,
            carbs,
        }
    }

    fn assert_totals(entry: &Entry, proteins: f64, fats: f64, carbs: f64) {
        assert!((entry.proteins - proteins).abs() < 1e-9, "{entry:?}");
        assert!((entry.fats - fats).abs() < 1e-9, "{entry:?}");
        assert!((entry.carbs - carbs).abs() < 1e-9, "{entry:?}");
    }

    fn row_count(db: &Database) -> i64 {
        db.conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM pfc", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_increment_creates_row() {
        let db = Database::open_in_memory().unwrap();
        let entry = db.increment(&delta("2024-01-01", 10.0, 5.0, 20.0)).unwrap();
        assert_eq!(entry.date, date("2024-01-01"));
        assert_totals(&entry, 10.0, 5.0, 20.0);
        assert_eq!(row_count(&db), 1);
    }

    #[test]
    fn test_increment_accumulates() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 10.0, 5.0, 20.0)).unwrap();
        let entry = db.increment(&delta("2024-01-01", 5.0, 0.0, 0.0)).unwrap();
        assert_totals(&entry, 15.0, 5.0, 20.0);
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 15.0, 5.0, 20.0);
        assert_eq!(row_count(&db), 1);
    }

    #[test]
    fn test_increment_keeps_days_apart() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 1.0, 1.0, 1.0)).unwrap();
        db.increment(&delta("2024-01-02", 2.0, 2.0, 2.0)).unwrap();
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 1.0, 1.0, 1.0);
        assert_totals(&db.get(date("2024-01-02")).unwrap(), 2.0, 2.0, 2.0);
    }

    #[test]
    fn test_increment_below_zero_is_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 1.0, 1.0, 1.0)).unwrap();
        let err = db
            .increment(&delta("2024-01-01", -5.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange(d) if d == date("2024-01-01")), "{err:?}");
        assert!(err.is_invalid_input());
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 1.0, 1.0, 1.0);
    }

    #[test]
    fn test_negative_increment_on_new_day_creates_nothing() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .increment(&delta("2024-01-01", 0.0, -1.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange(_)), "{err:?}");
        assert_eq!(row_count(&db), 0);
    }

    #[test]
    fn test_increment_overflow_is_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 1e308, 0.0, 0.0)).unwrap();
        let err = db
            .increment(&delta("2024-01-01", 1e308, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange(_)), "{err:?}");

        let entry = db.get(date("2024-01-01")).unwrap();
        assert!(entry.proteins.is_finite());
        assert_totals(&entry, 1e308, 0.0, 0.0);
    }

    #[test]
    fn test_decrement_overflow_is_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 1e308, 1.0, 1.0)).unwrap();
        let err = db
            .decrement(&delta("2024-01-01", -1e308, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange(_)), "{err:?}");
        assert!(db.get(date("2024-01-01")).unwrap().proteins.is_finite());
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 5.0, 5.0, 5.0)).unwrap();
        let entry = db
            .decrement(&delta("2024-01-01", 1e12, 2.0, 5.0))
            .unwrap();
        assert_totals(&entry, 0.0, 3.0, 0.0);
        assert!(entry.proteins >= 0.0 && entry.fats >= 0.0 && entry.carbs >= 0.0);
    }

    #[test]
    fn test_decrement_missing_date_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .decrement(&delta("2024-01-01", 1.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(d) if d == date("2024-01-01")));
        assert_eq!(row_count(&db), 0);
    }

    #[test]
    fn test_get_missing_date_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get(date("2024-01-01")).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_accumulate_then_floor_scenario() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-01", 10.0, 5.0, 20.0)).unwrap();
        db.increment(&delta("2024-01-01", 5.0, 0.0, 0.0)).unwrap();
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 15.0, 5.0, 20.0);

        db.decrement(&delta("2024-01-01", 100.0, 1.0, 1.0)).unwrap();
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 0.0, 4.0, 19.0);
    }

    #[test]
    fn test_stored_date_is_zero_padded() {
        let db = Database::open_in_memory().unwrap();
        db.increment(&delta("2024-01-05", 1.0, 0.0, 0.0)).unwrap();
        let stored: String = db
            .conn()
            .unwrap()
            .query_row("SELECT date FROM pfc", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "2024-01-05");
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pfc.db");
        {
            let db = Database::open(&path, PoolSettings::default()).unwrap();
            db.increment(&delta("2024-01-01", 3.0, 2.0, 1.0)).unwrap();
        }
        let db = Database::open(&path, PoolSettings::default()).unwrap();
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 3.0, 2.0, 1.0);
    }

    #[test]
    fn test_migrate_bounds_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pfc.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE pfc (
                    date TEXT PRIMARY KEY NOT NULL,
                    proteins REAL NOT NULL DEFAULT 0 CHECK (proteins >= 0),
                    fats REAL NOT NULL DEFAULT 0 CHECK (fats >= 0),
                    carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0)
                );
                INSERT INTO pfc VALUES ('2024-01-01', 2.0, 3.0, 4.0);
                INSERT INTO pfc VALUES ('2024-01-02', 9e999, 1.0, 1.0);
                PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = Database::open(&path, PoolSettings::default()).unwrap();
        assert_totals(&db.get(date("2024-01-01")).unwrap(), 2.0, 3.0, 4.0);
        let clamped = db.get(date("2024-01-02")).unwrap();
        assert!(clamped.proteins.is_finite() && clamped.proteins > 1e308);

        let err = db
            .increment(&delta("2024-01-01", 1e308, 0.0, 0.0))
            .and_then(|_| db.increment(&delta("2024-01-01", 1e308, 0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRange(_)), "{err:?}");
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(
            &dir.path().join("pfc.db"),
            PoolSettings {
                max_size: 4,
                connection_timeout: Duration::from_secs(10),
            },
        )
        .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        db.increment(&delta("2024-01-01", 1.0, 0.5, 2.0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_totals(&db.get(date("2024-01-01")).unwrap(), 200.0, 100.0, 400.0);
    }
}
