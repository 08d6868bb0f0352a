use rusqlite::Connection;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: i64 = 1;

/// Create tables if needed and check the schema version stamp.
///
/// A fresh database gets the current schema and version. A database stamped
/// with the current version is accepted as-is. Anything else — a future
/// version, or a non-empty database with no stamp at all — is rejected so we
/// never write into a file we do not understand.
pub fn ensure(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    match version {
        0 => {
            let table_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )?;
            if table_count > 0 {
                return Err(Error::InvalidSchemaVersion {
                    found: 0,
                    expected: SCHEMA_VERSION,
                });
            }
            initialize(conn)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => initialize(conn),
        other => Err(Error::InvalidSchemaVersion {
            found: other,
            expected: SCHEMA_VERSION,
        }),
    }
}

fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tag_types (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            label       TEXT NOT NULL UNIQUE,
            symbol      TEXT NOT NULL UNIQUE,
            color       INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            label       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            type_id     INTEGER REFERENCES tag_types(id),
            definition  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tags_type ON tags(type_id);

        CREATE TABLE IF NOT EXISTS images (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            path        TEXT NOT NULL,
            hash        INTEGER,
            added_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_images_path ON images(path);
        CREATE INDEX IF NOT EXISTS idx_images_hash ON images(hash);

        CREATE TABLE IF NOT EXISTS image_tag (
            image_id    INTEGER NOT NULL REFERENCES images(id),
            tag_id      INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (image_id, tag_id)
        );

        CREATE INDEX IF NOT EXISTS idx_image_tag_tag ON image_tag(tag_id);
        ",
    )?;
    Ok(())
}
