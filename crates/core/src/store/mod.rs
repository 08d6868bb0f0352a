pub mod functions;
pub mod schema;

mod media;
mod tags;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, Row, Transaction};

use crate::domain::{MediaRecord, Tag, TagType};
use crate::error::{Error, Result};
use crate::hash::PerceptualHash;

/// SQLite-backed store for media, tags, and tag types.
///
/// One connection, serialized behind a mutex; reads of tag metadata are
/// served from in-process caches behind a read-write lock. Every mutation is
/// one transaction, and the caches are only touched after a successful
/// commit — the write lock is taken before the commit and held until the
/// cache mirrors it, so readers never observe a half-applied write.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    caches: RwLock<Caches>,
}

#[derive(Debug, Default)]
pub(crate) struct Caches {
    pub(crate) tag_types: HashMap<i64, TagType>,
    pub(crate) tags: HashMap<i64, Tag>,
    pub(crate) tag_use_counts: HashMap<i64, i64>,
    pub(crate) tag_type_use_counts: HashMap<i64, i64>,
}

impl Caches {
    fn load(conn: &Connection) -> Result<Self> {
        let mut caches = Caches::default();

        let mut stmt = conn.prepare("SELECT id, label, symbol, color FROM tag_types")?;
        let types = stmt
            .query_map([], tag_type_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for tag_type in types {
            caches.tag_type_use_counts.insert(tag_type.id, 0);
            caches.tag_types.insert(tag_type.id, tag_type);
        }

        let mut stmt = conn.prepare("SELECT id, label, type_id, definition FROM tags")?;
        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for tag in tags {
            caches.tag_use_counts.insert(tag.id, 0);
            caches.tags.insert(tag.id, tag);
        }

        let mut stmt =
            conn.prepare("SELECT tag_id, COUNT(*) FROM image_tag GROUP BY tag_id")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (tag_id, count) in counts {
            caches.tag_use_counts.insert(tag_id, count);
            if let Some(type_id) = caches.tags.get(&tag_id).and_then(|t| t.type_id) {
                *caches.tag_type_use_counts.entry(type_id).or_insert(0) += count;
            }
        }

        Ok(caches)
    }
}

impl Store {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::ensure(&conn)?;
        functions::register(&conn)?;
        let caches = Caches::load(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
            caches: RwLock::new(caches),
        })
    }

    // ── Cached tag metadata reads ────────────────────────────────────

    /// All tag types, sorted by label.
    pub fn tag_types(&self) -> Vec<TagType> {
        let caches = self.caches.read();
        let mut types: Vec<TagType> = caches.tag_types.values().cloned().collect();
        types.sort_by(|a, b| a.label.cmp(&b.label));
        types
    }

    /// All tags, sorted by label.
    pub fn tags(&self) -> Vec<Tag> {
        let caches = self.caches.read();
        let mut tags: Vec<Tag> = caches.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        tags
    }

    pub fn tag_type(&self, id: i64) -> Option<TagType> {
        self.caches.read().tag_types.get(&id).cloned()
    }

    pub fn tag(&self, id: i64) -> Option<Tag> {
        self.caches.read().tags.get(&id).cloned()
    }

    /// Label lookup folding ASCII case only, exactly like the NOCASE
    /// collation on the label column — non-ASCII case variants are distinct
    /// labels.
    pub fn tag_by_label(&self, label: &str) -> Option<Tag> {
        let caches = self.caches.read();
        caches
            .tags
            .values()
            .find(|t| t.label.eq_ignore_ascii_case(label))
            .cloned()
    }

    /// Number of media items the tag is attached to.
    pub fn tag_use_count(&self, id: i64) -> i64 {
        self.caches.read().tag_use_counts.get(&id).copied().unwrap_or(0)
    }

    /// Number of attachments across all tags of this type.
    pub fn tag_type_use_count(&self, id: i64) -> i64 {
        self.caches
            .read()
            .tag_type_use_counts
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    // ── Media reads (straight from the database) ─────────────────────

    pub fn media(&self, id: i64) -> Result<MediaRecord> {
        let conn = self.conn.lock();
        media_by_id_tx(&conn, id)
    }

    pub fn media_by_path(&self, path: &Path) -> Result<Option<MediaRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, path, hash, added_at FROM images WHERE path = ?1",
                params![path.to_string_lossy()],
                media_from_row,
            )
            .ok();
        Ok(record)
    }

    /// All media, sorted by path.
    pub fn all_media(&self) -> Result<Vec<MediaRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, path, hash, added_at FROM images ORDER BY path")?;
        let records = stmt
            .query_map([], media_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// The tags attached to one media item, sorted by label.
    pub fn media_tags(&self, id: i64) -> Result<Vec<Tag>> {
        let ids: Vec<i64> = {
            let conn = self.conn.lock();
            media_by_id_tx(&conn, id)?;
            let mut stmt = conn.prepare("SELECT tag_id FROM image_tag WHERE image_id = ?1")?;
            let ids = stmt
                .query_map(params![id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };
        let caches = self.caches.read();
        let mut tags: Vec<Tag> = ids
            .iter()
            .filter_map(|tag_id| caches.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(tags)
    }

    pub fn media_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?)
    }

    /// Borrow the connection for a read-only statement outside this module.
    pub(crate) fn conn_for_query(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

// ── Row mappers and in-transaction helpers shared across the store ──

pub(crate) fn tag_type_from_row(row: &Row) -> rusqlite::Result<TagType> {
    let symbol: String = row.get(2)?;
    Ok(TagType {
        id: row.get(0)?,
        label: row.get(1)?,
        symbol: symbol.chars().next().unwrap_or('#'),
        color: row.get::<_, i64>(3)? as u32,
    })
}

pub(crate) fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        label: row.get(1)?,
        type_id: row.get(2)?,
        definition: row.get(3)?,
    })
}

pub(crate) fn media_from_row(row: &Row) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        id: row.get(0)?,
        path: std::path::PathBuf::from(row.get::<_, String>(1)?),
        hash: row.get::<_, Option<i64>>(2)?.map(|v| PerceptualHash(v as u64)),
        added_at: row.get(3)?,
    })
}

pub(crate) fn media_by_id_tx(conn: &Connection, id: i64) -> Result<MediaRecord> {
    conn.query_row(
        "SELECT id, path, hash, added_at FROM images WHERE id = ?1",
        params![id],
        media_from_row,
    )
    .map_err(|_| Error::ObjectDoesNotExist(format!("media {id}")))
}

pub(crate) fn tag_by_label_tx(tx: &Transaction, label: &str) -> Result<Option<Tag>> {
    Ok(tx
        .query_row(
            "SELECT id, label, type_id, definition FROM tags WHERE label = ?1",
            params![label],
            tag_from_row,
        )
        .ok())
}

/// Cache mutations computed inside a transaction and applied only after its
/// commit succeeds.
#[derive(Default)]
pub(crate) struct CacheDelta {
    pub(crate) new_tags: Vec<Tag>,
    pub(crate) count_deltas: Vec<(i64, i64)>,
}

impl CacheDelta {
    pub(crate) fn bump(&mut self, tag_id: i64, delta: i64) {
        self.count_deltas.push((tag_id, delta));
    }

    pub(crate) fn apply(self, caches: &mut Caches) {
        for tag in self.new_tags {
            caches.tag_use_counts.entry(tag.id).or_insert(0);
            caches.tags.insert(tag.id, tag);
        }
        for (tag_id, delta) in self.count_deltas {
            *caches.tag_use_counts.entry(tag_id).or_insert(0) += delta;
            if let Some(type_id) = caches.tags.get(&tag_id).and_then(|t| t.type_id) {
                *caches.tag_type_use_counts.entry(type_id).or_insert(0) += delta;
            }
        }
    }
}
