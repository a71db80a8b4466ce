//! SQLite-backed history store

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rusqlite::{Connection, OptionalExtension, params};

use super::origin::OriginKey;
use super::schema::{
    META_ORIGIN_FRECENCY_COUNT, META_ORIGIN_FRECENCY_SUM, META_ORIGIN_FRECENCY_SUM_OF_SQUARES,
    SCHEMA,
};
use super::{Origin, Place, VisitTransition};
use crate::frecency::{FrecencyInputs, FrecencyParams, VisitSample, calculate_frecency};
use crate::utils::{PlacesError, Result, SchedulerError, now_micros};

/// Callback invoked after a write turns a fresh row stale
pub type DirtyListener = Arc<dyn Fn() + Send + Sync>;

/// Result of one recalculation chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Pages whose frecency was rewritten
    pub places_updated: usize,
    /// Origins whose frecency was rewritten
    pub origins_updated: usize,
    /// Whether stale rows remain after this chunk
    pub still_pending: bool,
}

impl ChunkOutcome {
    /// Whether the chunk found nothing to do
    pub fn is_empty(&self) -> bool {
        self.places_updated == 0 && self.origins_updated == 0
    }
}

/// Thread-safe handle to the history database
#[derive(Clone)]
pub struct PlacesStore {
    conn: Arc<Mutex<Connection>>,
    dirty_listener: Arc<RwLock<Option<DirtyListener>>>,
}

impl PlacesStore {
    /// Open or create a history database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Opened history database {} (journal_mode={})", path.display(), mode);
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dirty_listener: Arc::new(RwLock::new(None)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PlacesError::Scheduler(SchedulerError::LockPoisoned))
    }

    /// Install the callback fired when a public write marks a row stale
    pub fn set_dirty_listener(&self, listener: DirtyListener) {
        if let Ok(mut slot) = self.dirty_listener.write() {
            *slot = Some(listener);
        }
    }

    /// Remove the dirty callback
    pub fn clear_dirty_listener(&self) {
        if let Ok(mut slot) = self.dirty_listener.write() {
            *slot = None;
        }
    }

    // Called with the connection lock released so the listener may query us.
    fn notify_dirty(&self) {
        let listener = self
            .dirty_listener
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(Arc::clone));
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Bookmark a page, creating it if needed. Returns the page id.
    pub fn insert_bookmark(&self, url: &str, title: Option<&str>) -> Result<i64> {
        let key = OriginKey::from_url(url)?;
        let (place_id, dirtied) = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let (place_id, created) = ensure_place(&tx, url, &key)?;
            tx.execute(
                "INSERT INTO moz_bookmarks (fk, title, date_added) VALUES (?1, ?2, ?3)",
                params![place_id, title, now_micros()],
            )?;
            let dirtied = mark_place_outdated(&tx, place_id)?;
            tx.commit()?;
            (place_id, created || dirtied)
        };

        log::debug!("Bookmarked {} (place {})", url, place_id);
        if dirtied {
            self.notify_dirty();
        }
        Ok(place_id)
    }

    /// Remove every bookmark of a page. Returns whether any existed.
    pub fn remove_bookmark(&self, url: &str) -> Result<bool> {
        let (removed, dirtied) = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let Some(place_id) = place_id_for_url(&tx, url)? else {
                return Ok(false);
            };
            let removed = tx.execute("DELETE FROM moz_bookmarks WHERE fk = ?1", [place_id])?;
            let dirtied = removed > 0 && mark_place_outdated(&tx, place_id)?;
            tx.commit()?;
            (removed > 0, dirtied)
        };

        if dirtied {
            self.notify_dirty();
        }
        Ok(removed)
    }

    /// Record a visit to a page, creating it if needed. Returns the page id.
    pub fn add_visit(&self, url: &str, visit_date: i64, transition: VisitTransition) -> Result<i64> {
        let key = OriginKey::from_url(url)?;
        let (place_id, dirtied) = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let (place_id, created) = ensure_place(&tx, url, &key)?;
            tx.execute(
                "INSERT INTO moz_historyvisits (place_id, visit_date, visit_type) VALUES (?1, ?2, ?3)",
                params![place_id, visit_date, transition as i64],
            )?;
            tx.execute(
                "UPDATE moz_places SET
                    visit_count = visit_count + ?2,
                    typed = MAX(typed, ?3),
                    last_visit_date = MAX(IFNULL(last_visit_date, 0), ?4)
                 WHERE id = ?1",
                params![
                    place_id,
                    transition.counts_as_visit() as i64,
                    (transition == VisitTransition::Typed) as i64,
                    visit_date,
                ],
            )?;
            let dirtied = mark_place_outdated(&tx, place_id)?;
            tx.commit()?;
            (place_id, created || dirtied)
        };

        if dirtied {
            self.notify_dirty();
        }
        Ok(place_id)
    }

    /// Delete all visits of a page. Returns the number removed.
    pub fn remove_visits(&self, url: &str) -> Result<usize> {
        let (removed, dirtied) = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let Some(place_id) = place_id_for_url(&tx, url)? else {
                return Ok(0);
            };
            let removed = tx.execute("DELETE FROM moz_historyvisits WHERE place_id = ?1", [place_id])?;
            tx.execute(
                "UPDATE moz_places SET visit_count = 0, typed = 0, last_visit_date = NULL WHERE id = ?1",
                [place_id],
            )?;
            let dirtied = mark_place_outdated(&tx, place_id)?;
            tx.commit()?;
            (removed, dirtied)
        };

        if dirtied {
            self.notify_dirty();
        }
        Ok(removed)
    }

    /// Delete a page with its visits and bookmarks. Orphaned origins are
    /// deleted too; otherwise the origin is marked stale.
    pub fn remove_page(&self, url: &str) -> Result<bool> {
        let dirtied = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let row: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, origin_id FROM moz_places WHERE url = ?1",
                    [url],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((place_id, origin_id)) = row else {
                return Ok(false);
            };

            tx.execute("DELETE FROM moz_places WHERE id = ?1", [place_id])?;
            let orphan_removed = tx.execute(
                "DELETE FROM moz_origins WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM moz_places WHERE origin_id = ?1)",
                [origin_id],
            )?;
            let dirtied = orphan_removed == 0
                && tx.execute(
                    "UPDATE moz_origins SET recalc_frecency = 1 WHERE id = ?1 AND recalc_frecency = 0",
                    [origin_id],
                )? > 0;
            tx.commit()?;
            dirtied
        };

        if dirtied {
            self.notify_dirty();
        }
        Ok(true)
    }

    /// Flag a page's frecency as stale. Returns whether the flag changed.
    pub fn mark_outdated(&self, url: &str) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE moz_places SET recalc_frecency = 1 WHERE url = ?1 AND recalc_frecency = 0",
            [url],
        )? > 0;

        if changed {
            self.notify_dirty();
        }
        Ok(changed)
    }

    /// Look up a page by URL
    pub fn place(&self, url: &str) -> Result<Option<Place>> {
        let conn = self.conn()?;
        let place = conn
            .query_row(
                "SELECT id, url, title, origin_id, visit_count, typed, last_visit_date,
                        frecency, recalc_frecency
                 FROM moz_places WHERE url = ?1",
                [url],
                |row| {
                    Ok(Place {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        origin_id: row.get(3)?,
                        visit_count: row.get(4)?,
                        typed: row.get::<_, i64>(5)? != 0,
                        last_visit_date: row.get(6)?,
                        frecency: row.get(7)?,
                        recalc_frecency: row.get::<_, i64>(8)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(place)
    }

    /// Look up an origin by prefix and host
    pub fn origin(&self, prefix: &str, host: &str) -> Result<Option<Origin>> {
        let conn = self.conn()?;
        let origin = conn
            .query_row(
                "SELECT id, prefix, host, frecency, recalc_frecency
                 FROM moz_origins WHERE prefix = ?1 AND host = ?2",
                [prefix, host],
                |row| {
                    Ok(Origin {
                        id: row.get(0)?,
                        prefix: row.get(1)?,
                        host: row.get(2)?,
                        frecency: row.get(3)?,
                        recalc_frecency: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(origin)
    }

    /// Highest frecency among the origins of a host, across prefixes
    pub fn origin_frecency(&self, host: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let frecency: Option<i64> = conn.query_row(
            "SELECT MAX(frecency) FROM moz_origins WHERE host = ?1",
            [host],
            |row| row.get(0),
        )?;
        Ok(frecency)
    }

    /// Mean plus one standard deviation of positive origin frecencies, the
    /// bar an origin must clear to be considered for autofill.
    pub fn origin_frecency_threshold(&self) -> Result<f64> {
        let conn = self.conn()?;
        let count = meta_value(&conn, META_ORIGIN_FRECENCY_COUNT)?.unwrap_or(0.0);
        if count <= 0.0 {
            return Ok(0.0);
        }
        let sum = meta_value(&conn, META_ORIGIN_FRECENCY_SUM)?.unwrap_or(0.0);
        let squares = meta_value(&conn, META_ORIGIN_FRECENCY_SUM_OF_SQUARES)?.unwrap_or(0.0);

        let mean = sum / count;
        let variance = (squares / count - mean * mean).max(0.0);
        Ok(mean + variance.sqrt())
    }

    /// Whether any page or origin is stale or has never been calculated
    pub fn has_outdated(&self) -> Result<bool> {
        let conn = self.conn()?;
        Ok(has_outdated_rows(&conn)?)
    }

    /// Number of stale pages and origins
    pub fn outdated_counts(&self) -> Result<(usize, usize)> {
        let conn = self.conn()?;
        let places: i64 = conn.query_row(
            "SELECT COUNT(*) FROM moz_places WHERE recalc_frecency = 1 OR frecency < 0",
            [],
            |row| row.get(0),
        )?;
        let origins: i64 = conn.query_row(
            "SELECT COUNT(*) FROM moz_origins WHERE recalc_frecency = 1 OR frecency < 0",
            [],
            |row| row.get(0),
        )?;
        Ok((places as usize, origins as usize))
    }

    /// Recompute up to `chunk_size` stale pages, then up to `chunk_size`
    /// stale origins, in a single transaction. Highest cached frecencies go
    /// first. Never fires the dirty listener.
    pub fn recalculate_chunk(
        &self,
        chunk_size: usize,
        frecency_params: &FrecencyParams,
        now: i64,
    ) -> Result<ChunkOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let limit = chunk_size as i64;

        let place_ids: Vec<i64> = {
            let mut stmt = tx.prepare_cached(
                "SELECT id FROM moz_places WHERE recalc_frecency = 1 OR frecency < 0
                 ORDER BY frecency DESC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            ids
        };

        for place_id in &place_ids {
            let inputs = load_frecency_inputs(&tx, *place_id, frecency_params.sampled_visits)?;
            let frecency = calculate_frecency(&inputs, frecency_params, now);
            tx.execute(
                "UPDATE moz_places SET frecency = ?2, recalc_frecency = 0 WHERE id = ?1",
                params![place_id, frecency],
            )?;
            tx.execute(
                "UPDATE moz_origins SET recalc_frecency = 1
                 WHERE id = (SELECT origin_id FROM moz_places WHERE id = ?1)",
                [place_id],
            )?;
        }

        let origin_ids: Vec<i64> = {
            let mut stmt = tx.prepare_cached(
                "SELECT id FROM moz_origins WHERE recalc_frecency = 1 OR frecency < 0
                 ORDER BY frecency DESC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            ids
        };

        for origin_id in &origin_ids {
            tx.execute(
                "UPDATE moz_origins SET
                    frecency = (SELECT IFNULL(SUM(frecency), 0) FROM moz_places
                                WHERE origin_id = ?1 AND frecency > 0),
                    recalc_frecency = 0
                 WHERE id = ?1",
                [origin_id],
            )?;
        }

        if !origin_ids.is_empty() {
            update_origin_stats(&tx)?;
        }

        let still_pending = has_outdated_rows(&tx)?;
        tx.commit()?;

        Ok(ChunkOutcome {
            places_updated: place_ids.len(),
            origins_updated: origin_ids.len(),
            still_pending,
        })
    }

    /// Scale every fresh positive page frecency by `rate` and flag the
    /// affected origins. Returns the number of pages decayed.
    pub fn decay(&self, rate: f64) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let decayed = tx.execute(
            "UPDATE moz_places SET frecency = CAST(frecency * ?1 AS INTEGER)
             WHERE frecency > 0 AND recalc_frecency = 0",
            [rate],
        )?;
        tx.execute(
            "UPDATE moz_origins SET recalc_frecency = 1 WHERE frecency > 0",
            [],
        )?;
        tx.commit()?;

        log::info!("Decayed frecency of {} pages by {}", decayed, rate);
        Ok(decayed)
    }
}

fn place_id_for_url(conn: &Connection, url: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT id FROM moz_places WHERE url = ?1", [url], |row| row.get(0))
        .optional()
}

fn ensure_origin(conn: &Connection, key: &OriginKey) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO moz_origins (prefix, host) VALUES (?1, ?2)
         ON CONFLICT (prefix, host) DO NOTHING",
        [&key.prefix, &key.host],
    )?;
    conn.query_row(
        "SELECT id FROM moz_origins WHERE prefix = ?1 AND host = ?2",
        [&key.prefix, &key.host],
        |row| row.get(0),
    )
}

/// Returns the page id and whether the page was created
fn ensure_place(conn: &Connection, url: &str, key: &OriginKey) -> rusqlite::Result<(i64, bool)> {
    if let Some(id) = place_id_for_url(conn, url)? {
        return Ok((id, false));
    }

    let origin_id = ensure_origin(conn, key)?;
    conn.execute(
        "INSERT INTO moz_places (url, origin_id) VALUES (?1, ?2)",
        params![url, origin_id],
    )?;
    Ok((conn.last_insert_rowid(), true))
}

/// Returns whether the flag went from 0 to 1
fn mark_place_outdated(conn: &Connection, place_id: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE moz_places SET recalc_frecency = 1 WHERE id = ?1 AND recalc_frecency = 0",
        [place_id],
    )?;
    Ok(changed > 0)
}

fn has_outdated_rows(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM moz_places WHERE recalc_frecency = 1 OR frecency < 0)
             OR EXISTS (SELECT 1 FROM moz_origins WHERE recalc_frecency = 1 OR frecency < 0)",
        [],
        |row| row.get(0),
    )
}

fn load_frecency_inputs(
    conn: &Connection,
    place_id: i64,
    sampled_visits: usize,
) -> rusqlite::Result<FrecencyInputs> {
    let (visit_count, typed): (i64, i64) = conn.query_row(
        "SELECT visit_count, typed FROM moz_places WHERE id = ?1",
        [place_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let bookmarked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM moz_bookmarks WHERE fk = ?1)",
        [place_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare_cached(
        "SELECT visit_date, visit_type FROM moz_historyvisits
         WHERE place_id = ?1 ORDER BY visit_date DESC LIMIT ?2",
    )?;
    let visits = stmt
        .query_map(params![place_id, sampled_visits as i64], |row| {
            Ok(VisitSample {
                visit_date: row.get(0)?,
                transition: VisitTransition::from_i64(row.get(1)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(FrecencyInputs {
        visit_count,
        typed: typed != 0,
        bookmarked,
        visits,
    })
}

fn update_origin_stats(conn: &Connection) -> rusqlite::Result<()> {
    let (count, sum, squares): (i64, i64, f64) = conn.query_row(
        "SELECT COUNT(*), IFNULL(SUM(frecency), 0), IFNULL(SUM(CAST(frecency AS REAL) * frecency), 0.0)
         FROM moz_origins WHERE frecency > 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut stmt =
        conn.prepare_cached("INSERT OR REPLACE INTO moz_meta (key, value) VALUES (?1, ?2)")?;
    stmt.execute(params![META_ORIGIN_FRECENCY_COUNT, count])?;
    stmt.execute(params![META_ORIGIN_FRECENCY_SUM, sum])?;
    stmt.execute(params![META_ORIGIN_FRECENCY_SUM_OF_SQUARES, squares])?;
    Ok(())
}

fn meta_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<f64>> {
    conn.query_row("SELECT value FROM moz_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()
}
