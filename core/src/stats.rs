//! Delivery statistics: SQLite, single connection, one row per display-timezone day.
//! Every successful broadcast send bumps today's row; /stats reads today and the current ISO week.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats db: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct Stats {
    conn: Mutex<Connection>,
    offset: FixedOffset,
}

impl Stats {
    /// Open (or create) the stats database and ensure the table exists.
    pub fn open(path: &Path, offset: FixedOffset) -> Result<Self, StatsError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, offset)
    }

    pub fn open_in_memory(offset: FixedOffset) -> Result<Self, StatsError> {
        Self::with_connection(Connection::open_in_memory()?, offset)
    }

    fn with_connection(conn: Connection, offset: FixedOffset) -> Result<Self, StatsError> {
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            offset,
        })
    }

    /// Count one delivered message. Failures are logged; delivery never depends on stats.
    pub fn increment_message_count(&self) {
        if let Err(e) = self.increment_at(Utc::now()) {
            tracing::warn!("[rss2tg][stats] increment failed error={}", e);
        }
    }

    /// (daily, weekly) delivered counts. Read errors yield zeros.
    pub fn message_counts(&self) -> (u64, u64) {
        self.counts_at(Utc::now()).unwrap_or_else(|e| {
            tracing::warn!("[rss2tg][stats] read failed error={}", e);
            (0, 0)
        })
    }

    pub fn increment_at(&self, now: DateTime<Utc>) -> Result<(), StatsError> {
        let day = day_key(self.local_date(now));
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO message_counts (day, count) VALUES (?1, 1)
             ON CONFLICT(day) DO UPDATE SET count = count + 1",
            rusqlite::params![day],
        )?;
        Ok(())
    }

    pub fn counts_at(&self, now: DateTime<Utc>) -> Result<(u64, u64), StatsError> {
        let today = self.local_date(now);
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let daily: i64 = conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM message_counts WHERE day = ?1",
            rusqlite::params![day_key(today)],
            |row| row.get(0),
        )?;
        let weekly: i64 = conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM message_counts WHERE day >= ?1 AND day <= ?2",
            rusqlite::params![day_key(monday), day_key(today)],
            |row| row.get(0),
        )?;
        Ok((daily.max(0) as u64, weekly.max(0) as u64))
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS message_counts (
            day    TEXT PRIMARY KEY,
            count  INTEGER NOT NULL DEFAULT 0
        );
        ",
    )
}
