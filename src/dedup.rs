//! Two-tier membership store for already-seen submission ids.
//!
//! Tier A is an in-memory Bloom filter answering "definitely not seen"
//! cheaply; Tier B is a single-file SQLite table that confirms every
//! maybe-hit and survives restarts. The combination yields no false
//! negatives and a bounded false-positive confirmation rate.
//!
//! The store is single-writer: the connection holds an exclusive SQLite
//! lock from open until close, so a concurrent run against the same file
//! fails fast instead of interleaving writes.

use std::path::Path;

use bloomfilter::Bloom;
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, info, warn};

use crate::config::DEDUP_FALSE_POSITIVE_RATE;
use crate::error::{CollectorError, Result};
use crate::models::DedupStats;
use crate::schema::seen_posts;

/// Persistent seen-id store with a probabilistic front filter.
#[derive(Debug)]
pub struct SeenStore {
    conn: Connection,
    filter: Bloom<str>,
    capacity: usize,
}

impl SeenStore {
    /// Open the store, acquire the single-writer lock, and rebuild the
    /// filter from the persistent tier.
    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CollectorError::DedupOpen(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| CollectorError::DedupOpen(format!("{}: {e}", path.display())))?;

        // Exclusive lock held until close; fail immediately when another
        // writer holds it rather than waiting.
        conn.busy_timeout(std::time::Duration::ZERO)
            .map_err(|e| CollectorError::DedupOpen(e.to_string()))?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")
            .map_err(|e| CollectorError::DedupOpen(e.to_string()))?;
        // Every autocommitted insert must reach disk before returning.
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| CollectorError::DedupOpen(e.to_string()))?;

        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;")
            .map_err(|e| classify_open_error(path, &e))?;

        conn.execute_batch(include_str!(
            "../migrations/2025-07-20-000000_create_seen_posts/up.sql"
        ))
        .map_err(|e| classify_open_error(path, &e))?;

        let mut store = Self {
            conn,
            filter: Bloom::new_for_fp_rate(capacity, DEDUP_FALSE_POSITIVE_RATE),
            capacity,
        };
        store.rebuild_filter()?;

        Ok(store)
    }

    /// Seed the filter from every persisted id.
    fn rebuild_filter(&mut self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM {}",
                seen_posts::POST_ID,
                seen_posts::TABLE
            ))
            .map_err(|e| CollectorError::DedupOpen(e.to_string()))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CollectorError::DedupOpen(e.to_string()))?;

        let mut count: usize = 0;
        for id in ids {
            let id = id.map_err(|e| CollectorError::DedupOpen(e.to_string()))?;
            self.filter.set(id.as_str());
            count += 1;
        }

        if count > self.capacity {
            warn!(
                count,
                capacity = self.capacity,
                "seen-id count exceeds filter capacity, false-positive rate degraded"
            );
        }
        info!(count, "rebuilt dedup filter from persistent store");

        Ok(())
    }

    /// Has this id been recorded before? No false negatives; filter hits
    /// are confirmed against the persistent tier.
    pub fn seen(&self, id: &str) -> Result<bool> {
        if !self.filter.check(id) {
            return Ok(false);
        }

        let exists: bool = self
            .conn
            .query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
                    seen_posts::TABLE,
                    seen_posts::POST_ID
                ),
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| CollectorError::DedupRead(e.to_string()))?;

        if !exists {
            debug!(id, "filter false positive");
        }

        Ok(exists)
    }

    /// Durably record an id. The persistent tier is written first; the
    /// filter is only updated once that write succeeded.
    pub fn mark_seen(&mut self, id: &str, first_seen_utc: i64) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
                    seen_posts::TABLE,
                    seen_posts::POST_ID,
                    seen_posts::FIRST_SEEN_UTC
                ),
                params![id, first_seen_utc],
            )
            .map_err(|e| CollectorError::DedupWrite(e.to_string()))?;

        self.filter.set(id);

        Ok(())
    }

    /// Whether the in-memory filter alone claims the id may be present.
    /// Diagnostic surface; `seen` is the authoritative query.
    #[must_use]
    pub fn filter_contains(&self, id: &str) -> bool {
        self.filter.check(id)
    }

    /// Aggregate statistics over the persistent tier.
    pub fn stats(&self) -> Result<DedupStats> {
        let (total_ids, oldest, newest) = self
            .conn
            .query_row(
                &format!(
                    "SELECT COUNT(*), MIN({col}), MAX({col}) FROM {}",
                    seen_posts::TABLE,
                    col = seen_posts::FIRST_SEEN_UTC
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .map_err(|e| CollectorError::DedupRead(e.to_string()))?;

        Ok(DedupStats {
            total_ids,
            oldest_first_seen: oldest,
            newest_first_seen: newest,
            filter_capacity: self.capacity,
        })
    }

    /// Release the exclusive lock.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| CollectorError::DedupWrite(e.to_string()))
    }
}

fn classify_open_error(path: &Path, error: &rusqlite::Error) -> CollectorError {
    if let rusqlite::Error::SqliteFailure(inner, _) = error {
        if inner.code == ErrorCode::DatabaseBusy || inner.code == ErrorCode::DatabaseLocked {
            return CollectorError::DedupLock(format!("{}: {error}", path.display()));
        }
    }
    CollectorError::DedupOpen(format!("{}: {error}", path.display()))
}
