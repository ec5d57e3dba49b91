// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Database module for refinements and their rated items
//!
//! [`Database`] owns the shared connection. The free functions below take a
//! plain `&Connection` so that callers can compose several of them inside a
//! single transaction obtained from [`Database::with_tx`].

pub mod models;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub use models::{
    Progress, Rating, Refinement, RefinementItem, RefinementStatus, SourceKind, SourceRef,
};

use crate::{RefineError, Result};

/// Database manager (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RefineError::Config("Database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS refinements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                source_type TEXT NOT NULL CHECK (source_type IN ('collection', 'refinement')),
                source_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'complete')),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS refinement_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                refinement_id INTEGER NOT NULL,
                relpath TEXT NOT NULL,
                rating TEXT CHECK (rating IS NULL OR rating IN ('yes', 'no', 'skip')),
                FOREIGN KEY(refinement_id) REFERENCES refinements(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_items_refinement_rating
                ON refinement_items(refinement_id, rating);
            CREATE INDEX IF NOT EXISTS idx_refinements_status_created
                ON refinements(status, created_at);
        "#,
        )?;
        Ok(())
    }

    /// Run `f` inside one immediate transaction on the shared connection.
    ///
    /// Commits when `f` returns `Ok`; any error (or a panic unwinding through
    /// here) drops the transaction, which rolls it back.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // Store operations, each in its own transaction

    pub fn create_refinement(&self, name: &str, source: &SourceRef, relpaths: &[String]) -> Result<i64> {
        self.with_tx(|tx| create_refinement(tx, name, source, relpaths))
    }

    pub fn get_refinement(&self, id: i64) -> Result<Refinement> {
        self.with_tx(|tx| get_refinement(tx, id))
    }

    pub fn list_active_refinements(&self) -> Result<Vec<Refinement>> {
        self.with_tx(|tx| list_refinements(tx, RefinementStatus::Active))
    }

    pub fn list_completed_refinements(&self) -> Result<Vec<Refinement>> {
        self.with_tx(|tx| list_refinements(tx, RefinementStatus::Complete))
    }

    pub fn mark_complete(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| mark_complete(tx, id))
    }

    pub fn rate_item(&self, item_id: i64, refinement_id: i64, rating: Rating) -> Result<bool> {
        self.with_tx(|tx| rate_item(tx, item_id, refinement_id, rating))
    }

    pub fn yes_items(&self, refinement_id: i64) -> Result<Vec<String>> {
        self.with_tx(|tx| yes_items(tx, refinement_id))
    }

    pub fn items(&self, refinement_id: i64) -> Result<Vec<RefinementItem>> {
        self.with_tx(|tx| items(tx, refinement_id))
    }

    pub fn progress(&self, refinement_id: i64) -> Result<Progress> {
        self.with_tx(|tx| progress(tx, refinement_id))
    }
}

const REFINEMENT_COLUMNS: &str = "id, name, source_type, source_key, status, created_at";

/// Undecoded refinement row; decoding can fail on a corrupt source key
struct RefinementRow {
    id: i64,
    name: String,
    kind: SourceKind,
    key: String,
    status: RefinementStatus,
    created_at: String,
}

impl RefinementRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            key: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Refinement> {
        let source = SourceRef::from_parts(self.kind, &self.key).ok_or_else(|| {
            RefineError::CorruptChain {
                refinement_id: self.id,
                source_key: self.key.clone(),
            }
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                warn!("Refinement {} has unreadable created_at {:?}", self.id, self.created_at);
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
            })?;
        Ok(Refinement {
            id: self.id,
            name: self.name,
            source,
            status: self.status,
            created_at,
        })
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<RefinementItem> {
    Ok(RefinementItem {
        id: row.get(0)?,
        refinement_id: row.get(1)?,
        relpath: row.get(2)?,
        rating: row.get(3)?,
    })
}

/// Fixed-width UTC timestamp so text order matches time order
fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert a refinement and its snapshot. Run inside a transaction.
pub fn create_refinement(conn: &Connection, name: &str, source: &SourceRef, relpaths: &[String]) -> Result<i64> {
    conn.execute(
        r#"INSERT INTO refinements (name, source_type, source_key, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![
            name,
            source.kind(),
            source.key(),
            RefinementStatus::Active,
            timestamp(Utc::now())
        ],
    )?;
    let id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO refinement_items (refinement_id, relpath, rating) VALUES (?1, ?2, NULL)",
    )?;
    for relpath in relpaths {
        stmt.execute(params![id, relpath])?;
    }

    debug!("Created refinement {} with {} items", id, relpaths.len());
    Ok(id)
}

pub fn find_refinement(conn: &Connection, id: i64) -> Result<Option<Refinement>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM refinements WHERE id = ?1", REFINEMENT_COLUMNS),
            params![id],
            RefinementRow::from_row,
        )
        .optional()?;
    row.map(RefinementRow::decode).transpose()
}

pub fn get_refinement(conn: &Connection, id: i64) -> Result<Refinement> {
    find_refinement(conn, id)?.ok_or_else(|| RefineError::NotFound(format!("refinement {}", id)))
}

/// Refinements with the given status, most recently created first.
/// Rows that fail to decode are logged and left out.
pub fn list_refinements(conn: &Connection, status: RefinementStatus) -> Result<Vec<Refinement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM refinements WHERE status = ?1 ORDER BY created_at DESC, id DESC",
        REFINEMENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![status], RefinementRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut refinements = Vec::with_capacity(rows.len());
    for row in rows {
        match row.decode() {
            Ok(r) => refinements.push(r),
            Err(e) => warn!("Skipping unreadable refinement: {}", e),
        }
    }
    Ok(refinements)
}

/// Set status to complete. Returns false when it already was.
pub fn mark_complete(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE refinements SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![RefinementStatus::Complete, id, RefinementStatus::Active],
    )?;
    Ok(changed > 0)
}

/// Rate an item. Only touches the row when it belongs to `refinement_id`.
pub fn rate_item(conn: &Connection, item_id: i64, refinement_id: i64, rating: Rating) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE refinement_items SET rating = ?1 WHERE id = ?2 AND refinement_id = ?3",
        params![rating, item_id, refinement_id],
    )?;
    if changed == 0 {
        debug!("Item {} is not part of refinement {}, rating ignored", item_id, refinement_id);
    }
    Ok(changed > 0)
}

/// Pending item with the smallest id
pub fn first_pending(conn: &Connection, refinement_id: i64) -> Result<Option<RefinementItem>> {
    conn.query_row(
        r#"SELECT id, refinement_id, relpath, rating FROM refinement_items
           WHERE refinement_id = ?1 AND rating IS NULL
           ORDER BY id LIMIT 1"#,
        params![refinement_id],
        item_from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Reset every skipped item back to pending. Returns how many were reset.
pub fn recycle_skips(conn: &Connection, refinement_id: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE refinement_items SET rating = NULL WHERE refinement_id = ?1 AND rating = ?2",
        params![refinement_id, Rating::Skip],
    )?;
    Ok(changed)
}

/// Relpaths rated yes, in snapshot order
pub fn yes_items(conn: &Connection, refinement_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT relpath FROM refinement_items WHERE refinement_id = ?1 AND rating = ?2 ORDER BY id",
    )?;
    let relpaths = stmt
        .query_map(params![refinement_id, Rating::Yes], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(relpaths)
}

/// All items in snapshot order
pub fn items(conn: &Connection, refinement_id: i64) -> Result<Vec<RefinementItem>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT id, refinement_id, relpath, rating FROM refinement_items
           WHERE refinement_id = ?1 ORDER BY id"#,
    )?;
    let items = stmt
        .query_map(params![refinement_id], item_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

pub fn progress(conn: &Connection, refinement_id: i64) -> Result<Progress> {
    conn.query_row(
        r#"SELECT COUNT(*),
                  COALESCE(SUM(rating IS NULL), 0),
                  COALESCE(SUM(rating = 'skip'), 0),
                  COALESCE(SUM(rating = 'yes'), 0),
                  COALESCE(SUM(rating = 'no'), 0)
           FROM refinement_items WHERE refinement_id = ?1"#,
        params![refinement_id],
        |row| {
            Ok(Progress {
                total: row.get(0)?,
                pending: row.get(1)?,
                skipped: row.get(2)?,
                yes: row.get(3)?,
                no: row.get(4)?,
            })
        },
    )
    .map_err(Into::into)
}
