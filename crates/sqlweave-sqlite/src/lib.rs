//! SQLite driver for sqlweave.
//!
//! Implements `sqlweave_core::Connection` over hand-written FFI
//! declarations. The C library itself is compiled and linked by
//! `libsqlite3-sys` (bundled amalgamation).
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlweave_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT)")?;
//! ```

// Linked for its bundled sqlite3 static library; the extern declarations
// in `ffi` resolve against it.
use libsqlite3_sys as _;

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection};
