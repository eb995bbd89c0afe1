//! Access layer for the shared `songs` catalog and `queue` tables.
//!
//! The front end inserts pending rows concurrently, so every statement runs
//! under the configured busy timeout and a claim happens inside a single
//! `IMMEDIATE` transaction. Errors are returned untouched; deciding that a
//! failure means "nothing this cycle" is the caller's job.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::config::DatabaseConfig;
use crate::protocol::{CatalogEntry, QueuedPlay};

const PLAY_COLUMNS: &str = "id, filename, title, song_id, queued_at, played_at";

pub struct QueueStore {
    conn: Connection,
    songs_table: String,
    queue_table: String,
}

impl QueueStore {
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open(path)?, config)
    }

    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self, rusqlite::Error> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self, rusqlite::Error> {
        conn.busy_timeout(config.busy_timeout())?;
        let store = Self {
            conn,
            songs_table: config.songs_table.clone(),
            queue_table: config.queue_table.clone(),
        };
        if config.create_tables {
            store.initialize_schema()?;
        }
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    filename TEXT,
                    title TEXT,
                    play_count INTEGER DEFAULT 0,
                    last_played_at DATETIME
                )",
                self.songs_table
            ),
            [],
        )?;
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY,
                    filename TEXT,
                    title TEXT,
                    song_id INTEGER,
                    queued_at DATETIME,
                    played_at DATETIME
                )",
                self.queue_table
            ),
            [],
        )?;
        Ok(())
    }

    fn row_to_play(row: &rusqlite::Row<'_>) -> Result<QueuedPlay, rusqlite::Error> {
        Ok(QueuedPlay {
            id: row.get(0)?,
            filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            song_id: row.get(3)?,
            queued_at: row.get(4)?,
            played_at: row.get(5)?,
        })
    }

    fn select_oldest_pending(
        conn: &Connection,
        queue_table: &str,
    ) -> Result<Option<QueuedPlay>, rusqlite::Error> {
        conn.query_row(
            &format!(
                "SELECT {PLAY_COLUMNS} FROM {queue_table}
                 WHERE queued_at IS NOT NULL AND played_at IS NULL
                 ORDER BY queued_at ASC, id ASC
                 LIMIT 1"
            ),
            [],
            Self::row_to_play,
        )
        .optional()
    }

    /// Oldest pending row, without changing anything.
    pub fn peek_pending(&self) -> Result<Option<QueuedPlay>, rusqlite::Error> {
        Self::select_oldest_pending(&self.conn, &self.queue_table)
    }

    /// Moves the oldest pending row to in-progress and returns it as claimed.
    /// Returns `None` when nothing is pending or the row was taken meanwhile.
    pub fn claim_next(&self) -> Result<Option<QueuedPlay>, rusqlite::Error> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let Some(mut play) = Self::select_oldest_pending(&tx, &self.queue_table)? else {
            tx.commit()?;
            return Ok(None);
        };

        let claimed_at: String = tx.query_row("SELECT datetime('now')", [], |row| row.get(0))?;
        let updated = tx.execute(
            &format!(
                "UPDATE {} SET played_at = ?1, queued_at = NULL
                 WHERE id = ?2 AND queued_at IS NOT NULL AND played_at IS NULL",
                self.queue_table
            ),
            params![claimed_at, play.id],
        )?;
        tx.commit()?;

        if updated == 0 {
            return Ok(None);
        }
        play.queued_at = None;
        play.played_at = Some(claimed_at);
        Ok(Some(play))
    }

    /// Bumps `play_count` and stamps `last_played_at`. Returns the number of
    /// catalog rows touched, which is zero when the song no longer exists.
    pub fn record_song_play(&self, song_id: i64, played_at: &str) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            &format!(
                "UPDATE {} SET play_count = COALESCE(play_count, 0) + 1, last_played_at = ?1
                 WHERE id = ?2",
                self.songs_table
            ),
            params![played_at, song_id],
        )
    }

    pub fn catalog_entry(&self, song_id: i64) -> Result<Option<CatalogEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT id, filename, title, play_count, last_played_at FROM {} WHERE id = ?1",
                    self.songs_table
                ),
                params![song_id],
                |row| {
                    Ok(CatalogEntry {
                        id: row.get(0)?,
                        filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        play_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        last_played_at: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    /// Deletes a queue row by id. Deleting an absent row is not an error.
    pub fn delete_play(&self, play_id: i64) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.queue_table),
            params![play_id],
        )
    }

    /// Ids of rows left in-progress, oldest claim first.
    pub fn in_progress_ids(&self) -> Result<Vec<i64>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id FROM {} WHERE played_at IS NOT NULL AND queued_at IS NULL
             ORDER BY played_at ASC, id ASC",
            self.queue_table
        ))?;
        let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut result = Vec::new();
        for id in ids {
            result.push(id?);
        }
        Ok(result)
    }
}

#[cfg(test)]
impl QueueStore {
    /// Inserts a pending row the way the front end does.
    pub fn insert_pending(
        &self,
        filename: &str,
        title: &str,
        song_id: Option<i64>,
        queued_at: &str,
    ) -> i64 {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (filename, title, song_id, queued_at) VALUES (?1, ?2, ?3, ?4)",
                    self.queue_table
                ),
                params![filename, title, song_id, queued_at],
            )
            .expect("pending row should insert");
        self.conn.last_insert_rowid()
    }

    pub fn insert_song(&self, filename: &str, title: &str) -> i64 {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (filename, title) VALUES (?1, ?2)",
                    self.songs_table
                ),
                params![filename, title],
            )
            .expect("song row should insert");
        self.conn.last_insert_rowid()
    }

    pub fn play_row(&self, play_id: i64) -> Option<QueuedPlay> {
        self.conn
            .query_row(
                &format!("SELECT {PLAY_COLUMNS} FROM {} WHERE id = ?1", self.queue_table),
                params![play_id],
                Self::row_to_play,
            )
            .optional()
            .expect("play row query should succeed")
    }

    pub fn drop_songs_table(&self) {
        self.conn
            .execute(&format!("DROP TABLE {}", self.songs_table), [])
            .expect("songs table should drop");
    }
}
