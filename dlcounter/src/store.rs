use std::{collections::BTreeMap, path::Path, time::Duration};

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::{
    analytics::Increments,
    error::StoreError,
    invariants::{FileId, Timestamp},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS downloads (
    id            INTEGER PRIMARY KEY,
    filename      TEXT NOT NULL UNIQUE,
    total         INTEGER NOT NULL DEFAULT 0 CHECK (total >= 0),
    last_download INTEGER
);
CREATE TABLE IF NOT EXISTS watermark (
    id        INTEGER PRIMARY KEY CHECK (id = 1),
    timestamp INTEGER NOT NULL
);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub id: i64,
    pub file: FileId,
    pub total: u64,
    pub last_download: Option<Timestamp>,
}

/// The only way into persisted download totals.
pub trait DownloadStore {
    fn watermark(&self) -> Result<Option<Timestamp>, StoreError>;

    fn records(&self) -> Result<Vec<DownloadRecord>, StoreError>;

    fn counts(&self) -> Result<BTreeMap<FileId, u64>, StoreError> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| (r.file, r.total))
            .collect())
    }

    /// Adds the deltas and moves the watermark in one transaction. Fails with
    /// [`StoreError::Conflict`] when the stored watermark is no longer
    /// `expected`, leaving the store untouched.
    fn apply_increments(
        &mut self,
        increments: &Increments,
        expected: Option<Timestamp>,
    ) -> Result<(), StoreError>;

    /// Replaces all totals and the watermark in one transaction.
    fn rebuild_all(&mut self, totals: &Increments) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!(path = %path.display(), "opening store");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Write transactions take the database lock up front so concurrent runs
    /// serialise on it.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn read_watermark(conn: &Connection) -> Result<Option<Timestamp>, StoreError> {
    conn.query_row("SELECT timestamp FROM watermark WHERE id = 1", [], |row| {
        row.get::<_, i64>(0)
    })
    .optional()?
    .map(|secs| {
        Timestamp::from_unix(secs)
            .ok_or_else(|| StoreError::Corrupt(format!("watermark {secs} out of range")))
    })
    .transpose()
}

fn write_watermark(conn: &Connection, watermark: Timestamp) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO watermark (id, timestamp) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET timestamp = excluded.timestamp",
        params![watermark.unix()],
    )?;
    Ok(())
}

fn to_sql_count(count: u64) -> Result<i64, StoreError> {
    i64::try_from(count).map_err(|_| StoreError::Corrupt(format!("count {count} too large")))
}

impl DownloadStore for SqliteStore {
    fn watermark(&self) -> Result<Option<Timestamp>, StoreError> {
        read_watermark(&self.conn)
    }

    fn records(&self) -> Result<Vec<DownloadRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, filename, total, last_download FROM downloads ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, filename, total, last) = row?;
            let file = filename.parse().map_err(StoreError::Corrupt)?;
            let total = u64::try_from(total)
                .map_err(|_| StoreError::Corrupt(format!("negative total for {filename}")))?;
            let last_download = last
                .map(|secs| {
                    Timestamp::from_unix(secs).ok_or_else(|| {
                        StoreError::Corrupt(format!("last download {secs} out of range"))
                    })
                })
                .transpose()?;
            records.push(DownloadRecord {
                id,
                file,
                total,
                last_download,
            });
        }
        Ok(records)
    }

    fn apply_increments(
        &mut self,
        increments: &Increments,
        expected: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        let tx = self.write_tx()?;
        let found = read_watermark(&tx)?;
        if found != expected {
            return Err(StoreError::Conflict { expected, found });
        }
        if let (Some(current), Some(proposed)) = (found, increments.watermark)
            && proposed < current
        {
            return Err(StoreError::Regression { current, proposed });
        }

        {
            let mut upsert = tx.prepare(
                "INSERT INTO downloads (filename, total, last_download) VALUES (?1, ?2, ?3)
                 ON CONFLICT(filename) DO UPDATE SET
                     total = total + excluded.total,
                     last_download = MAX(COALESCE(last_download, excluded.last_download), excluded.last_download)",
            )?;
            for (file, inc) in &increments.deltas {
                upsert.execute(params![
                    file.as_str(),
                    to_sql_count(inc.count)?,
                    inc.latest.unix()
                ])?;
            }
        }
        if let Some(watermark) = increments.watermark {
            write_watermark(&tx, watermark)?;
        }
        tx.commit()?;
        info!(
            files = increments.deltas.len(),
            downloads = increments.total(),
            watermark = ?increments.watermark,
            "committed increments"
        );
        Ok(())
    }

    fn rebuild_all(&mut self, totals: &Increments) -> Result<(), StoreError> {
        let tx = self.write_tx()?;
        tx.execute_batch("DELETE FROM downloads; DELETE FROM watermark;")?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO downloads (filename, total, last_download) VALUES (?1, ?2, ?3)",
            )?;
            for (file, inc) in &totals.deltas {
                insert.execute(params![
                    file.as_str(),
                    to_sql_count(inc.count)?,
                    inc.latest.unix()
                ])?;
            }
        }
        if let Some(watermark) = totals.watermark {
            write_watermark(&tx, watermark)?;
        }
        tx.commit()?;
        info!(
            files = totals.deltas.len(),
            downloads = totals.total(),
            watermark = ?totals.watermark,
            "rebuilt totals"
        );
        Ok(())
    }
}
