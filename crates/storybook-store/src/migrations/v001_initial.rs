//! v001 -- Initial schema creation.
//!
//! Creates the `stories` collection.  Nested parts of a story are stored as
//! JSON text so a row maps one-to-one onto a story document.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id             TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_id       TEXT NOT NULL,               -- identity-provider user id
    title          TEXT NOT NULL,
    description    TEXT,
    chapters       TEXT NOT NULL DEFAULT '[]',  -- JSON array of chapters
    metadata       TEXT NOT NULL DEFAULT '{}',  -- JSON object
    collaborators  TEXT NOT NULL DEFAULT '[]',  -- JSON array of collaborators
    last_edited_by TEXT,                        -- JSON object, nullable
    created_at     TEXT NOT NULL,               -- RFC-3339
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stories_owner_created
    ON stories(owner_id, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
