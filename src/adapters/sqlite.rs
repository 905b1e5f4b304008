//! SQLite-backed listing store.
//!
//! All listing kinds share one `listings` table. Slot changes run inside an
//! `IMMEDIATE` transaction, so the write lock is held from the moment the
//! featured rows are read until the updates commit.

use crate::domain::model::{Listing, ListingId, ListingKind, Rank, SlotUpdate};
use crate::domain::ports::{ListingStore, SlotTransaction};
use crate::domain::slots::FeaturedRow;
use crate::utils::error::{Result, SlotError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS listings (
  id INTEGER PRIMARY KEY,
  kind TEXT NOT NULL,
  title TEXT NOT NULL,
  published INTEGER NOT NULL DEFAULT 1,
  featured INTEGER NOT NULL DEFAULT 0,
  featured_order INTEGER,
  attributes TEXT NOT NULL DEFAULT '{}',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS listings_kind_featured
  ON listings (kind, featured, featured_order);
CREATE UNIQUE INDEX IF NOT EXISTS listings_featured_rank
  ON listings (kind, featured_order)
  WHERE featured = 1 AND featured_order IS NOT NULL;
";

const LISTING_COLUMNS: &str =
    "id, kind, title, published, featured, featured_order, attributes, created_at, updated_at";

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct SqliteListingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteListingStore {
    /// Open (or create) the database at `path`. `":memory:"` opens a private
    /// in-memory database.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(IN_MEMORY) {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "Opened listing store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY, Duration::from_millis(1_000))
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SlotError::TaskError {
                message: "listing store connection lock poisoned".to_string(),
            })?;
            work(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl ListingStore for SqliteListingStore {
    async fn transaction<T, F>(&self, kind: ListingKind, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SlotTransaction) -> Result<T> + Send + 'static,
    {
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut handle = SqliteSlotTransaction { tx: &tx };
            match work(&mut handle) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    tracing::debug!(kind = %kind, error = %e, "Rolling back slot transaction");
                    // Dropping the transaction rolls it back.
                    drop(tx);
                    Err(e)
                }
            }
        })
        .await
    }

    async fn list(&self, kind: ListingKind) -> Result<Vec<Listing>> {
        self.with_connection(move |conn| query_collection(conn, kind))
            .await
    }

    async fn insert(&self, listing: Listing) -> Result<Listing> {
        self.with_connection(move |conn| {
            let attributes = serde_json::to_string(&listing.attributes)?;
            let order = listing.featured_order.map(|rank| i64::from(rank.get()));
            if listing.id > 0 {
                conn.execute(
                    "INSERT INTO listings (id, kind, title, published, featured, featured_order, attributes, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        listing.id,
                        listing.kind.as_str(),
                        listing.title,
                        listing.published,
                        listing.featured,
                        order,
                        attributes,
                        listing.created_at,
                        listing.updated_at
                    ],
                )?;
                Ok(listing)
            } else {
                conn.execute(
                    "INSERT INTO listings (kind, title, published, featured, featured_order, attributes, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        listing.kind.as_str(),
                        listing.title,
                        listing.published,
                        listing.featured,
                        order,
                        attributes,
                        listing.created_at,
                        listing.updated_at
                    ],
                )?;
                Ok(Listing {
                    id: conn.last_insert_rowid(),
                    ..listing
                })
            }
        })
        .await
    }
}

struct SqliteSlotTransaction<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl SlotTransaction for SqliteSlotTransaction<'_> {
    fn find_listing(&self, kind: ListingKind, id: ListingId) -> Result<Option<Listing>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE kind = ?1 AND id = ?2"),
                params![kind.as_str(), id],
                ListingRow::read,
            )
            .optional()?;
        row.map(ListingRow::into_listing).transpose()
    }

    fn load_featured(
        &self,
        kind: ListingKind,
        exclude_id: Option<ListingId>,
    ) -> Result<Vec<FeaturedRow>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT id, featured_order FROM listings
             WHERE kind = ?1 AND featured = 1 AND (?2 IS NULL OR id != ?2)
             ORDER BY featured_order ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![kind.as_str(), exclude_id], |row| {
                Ok(FeaturedRow::new(row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find_occupant(
        &self,
        kind: ListingKind,
        rank: Rank,
        exclude_id: Option<ListingId>,
    ) -> Result<Option<ListingId>> {
        let id = self
            .tx
            .query_row(
                "SELECT id FROM listings
                 WHERE kind = ?1 AND featured = 1 AND featured_order = ?2 AND (?3 IS NULL OR id != ?3)
                 ORDER BY id LIMIT 1",
                params![kind.as_str(), i64::from(rank.get()), exclude_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn apply_updates(&mut self, kind: ListingKind, updates: &[SlotUpdate]) -> Result<()> {
        // Clear every touched rank first so that swaps and shifts never trip
        // the unique rank index halfway through.
        {
            let mut clear = self.tx.prepare_cached(
                "UPDATE listings SET featured_order = NULL WHERE kind = ?1 AND id = ?2",
            )?;
            for update in updates {
                if clear.execute(params![kind.as_str(), update.id])? != 1 {
                    return Err(SlotError::InvariantViolation {
                        message: format!("slot update for missing {} {}", kind, update.id),
                    });
                }
            }
        }

        let now = Utc::now();
        let mut write = self.tx.prepare_cached(
            "UPDATE listings SET featured = ?1, featured_order = ?2, updated_at = ?3
             WHERE kind = ?4 AND id = ?5",
        )?;
        for update in updates {
            write.execute(params![
                update.featured,
                update.rank.map(|rank| i64::from(rank.get())),
                now,
                kind.as_str(),
                update.id
            ])?;
        }
        Ok(())
    }

    fn save_listing(&mut self, listing: &Listing) -> Result<()> {
        let attributes = serde_json::to_string(&listing.attributes)?;
        let changed = self.tx.execute(
            "UPDATE listings SET title = ?1, published = ?2, attributes = ?3, updated_at = ?4
             WHERE kind = ?5 AND id = ?6",
            params![
                listing.title,
                listing.published,
                attributes,
                listing.updated_at,
                listing.kind.as_str(),
                listing.id
            ],
        )?;
        if changed == 0 {
            return Err(SlotError::NotFound {
                kind: listing.kind,
                id: listing.id,
            });
        }
        Ok(())
    }

    fn list_all(&self, kind: ListingKind) -> Result<Vec<Listing>> {
        query_collection(self.tx, kind)
    }
}

fn query_collection(conn: &Connection, kind: ListingKind) -> Result<Vec<Listing>> {
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE kind = ?1
         ORDER BY featured DESC,
                  CASE WHEN featured_order IS NULL THEN 1 ELSE 0 END,
                  featured_order ASC,
                  {}",
        kind.default_order_sql()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![kind.as_str()], ListingRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ListingRow::into_listing).collect()
}

/// Raw column values of one `listings` row.
struct ListingRow {
    id: ListingId,
    kind: String,
    title: String,
    published: bool,
    featured: bool,
    featured_order: Option<i64>,
    attributes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ListingRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            published: row.get(3)?,
            featured: row.get(4)?,
            featured_order: row.get(5)?,
            attributes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_listing(self) -> Result<Listing> {
        let kind = ListingKind::from_db(&self.kind).ok_or_else(|| SlotError::InvariantViolation {
            message: format!("listing {} has unknown kind '{}'", self.id, self.kind),
        })?;
        let featured_order = match self.featured_order.map(Rank::new) {
            Some(Ok(rank)) => Some(rank),
            Some(Err(_)) => {
                tracing::warn!(
                    listing_id = self.id,
                    order = ?self.featured_order,
                    "Invariant violation: stored featured order out of range"
                );
                None
            }
            None => None,
        };
        if self.featured && featured_order.is_none() {
            tracing::warn!(
                listing_id = self.id,
                "Invariant violation: featured listing without a rank"
            );
        }

        Ok(Listing {
            id: self.id,
            kind,
            title: self.title,
            published: self.published,
            featured: self.featured,
            featured_order,
            attributes: serde_json::from_str(&self.attributes)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
