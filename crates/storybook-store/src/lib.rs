//! # storybook-store
//!
//! Document storage for stories, backed by SQLite.
//!
//! Each story is one row whose nested parts (chapters, metadata,
//! collaborators, last editor) are kept as JSON documents.  The crate exposes
//! a synchronous `Database` handle that wraps a `rusqlite::Connection` and
//! provides typed CRUD helpers, plus the [`access`] rules deciding who may
//! read, edit or manage a story.

pub mod access;
pub mod database;
pub mod migrations;
pub mod models;
pub mod stories;

mod error;

pub use access::Access;
pub use database::Database;
pub use error::StoreError;
pub use models::*;
