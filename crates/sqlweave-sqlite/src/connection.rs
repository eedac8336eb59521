//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection` trait
//! from sqlweave-core. The underlying handle is guarded by a mutex; the
//! async trait methods run the work eagerly and wrap the result, since
//! SQLite calls never block on the network.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)] // Error type is defined in sqlweave-core

use crate::ffi;
use crate::types;
use sqlweave_core::{
    Connection, Cx, Error, Outcome, Row, Value,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl SqliteConfig {
    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5_000,
        }
    }

    /// Config for a file-backed database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Inner connection state guarded by the mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the raw handle is only touched while holding the mutex, and the
// database is opened in SQLite's default serialized threading mode.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

// SAFETY: all access to the inner handle goes through the mutex.
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl SqliteConnection {
    /// Open a connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Database path contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI;

        // SAFETY: c_path is a valid C string, db is a valid out-pointer
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid (sqlite allocates a handle even on error)
                let msg = unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
                    .to_string_lossy()
                    .into_owned();
                unsafe { ffi::sqlite3_close_v2(db) };
                msg
            };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", message),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "opened sqlite database");

        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL directly without preparing (for DDL, PRAGMAs, BEGIN/COMMIT).
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: all pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is valid and must be freed with sqlite3_free
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            };
            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message,
                source: None,
            }));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: db is valid
        i64::from(unsafe { ffi::sqlite3_changes(inner.db) })
    }

    /// Prepare and execute a query, returning all rows.
    pub fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stmt = prepare_stmt(inner.db, sql)?;

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(bind_error(inner.db, sql, i + 1));
            }
        }

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            let name =
                unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    // SAFETY: stmt is valid
                    unsafe { ffi::sqlite3_finalize(stmt) };
                    return Err(step_error(inner.db, sql));
                }
            }
        }

        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };

        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    pub fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stmt = prepare_stmt(inner.db, sql)?;

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid
            let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(bind_error(inner.db, sql, i + 1));
            }
        }

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };

        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(changes as u64)
            }
            _ => Err(step_error(inner.db, sql)),
        }
    }

    /// Execute an INSERT and return the last inserted rowid.
    pub fn insert_sync(&self, sql: &str, params: &[Value]) -> Result<i64, Error> {
        self.execute_sync(sql, params)?;
        Ok(self.last_insert_rowid())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if !inner.db.is_null() {
                // SAFETY: db is valid, close_v2 is safe on open handles
                unsafe {
                    ffi::sqlite3_close_v2(inner.db);
                }
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self
            .query_sync(sql, params)
            .map(|mut rows| if rows.is_empty() { None } else { Some(rows.remove(0)) });
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.insert_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

/// Prepare a statement, returning the handle.
fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt, Error> {
    let c_sql = CString::new(sql).map_err(|_| syntax_error(sql, "SQL contains null byte"))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: all pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
    };

    if rc != ffi::SQLITE_OK || stmt.is_null() {
        return Err(Error::Query(QueryError {
            kind: error_code_to_kind(rc),
            sql: Some(sql.to_string()),
            message: last_error_message(db, rc),
            source: None,
        }));
    }

    Ok(stmt)
}

fn syntax_error(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: message.to_string(),
        source: None,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        message: format!(
            "Failed to bind parameter {}: {}",
            param_index,
            last_error_message(db, ffi::SQLITE_ERROR)
        ),
        source: None,
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    let message = last_error_message(db, ffi::SQLITE_ERROR);
    Error::Query(QueryError {
        kind: classify_message(&message),
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn last_error_message(db: *mut ffi::sqlite3, fallback: c_int) -> String {
    if db.is_null() {
        return ffi::error_string(fallback).to_string();
    }
    // SAFETY: db is valid; errmsg returns a connection-owned string
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        if ptr.is_null() {
            ffi::error_string(fallback).to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_ERROR | ffi::SQLITE_MISUSE => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

fn classify_message(message: &str) -> QueryErrorKind {
    if message.contains("constraint") || message.contains("UNIQUE") {
        QueryErrorKind::Constraint
    } else if message.contains("no such table") || message.contains("no such column") {
        QueryErrorKind::NotFound
    } else {
        QueryErrorKind::Database
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_and_execute_ddl() {
        let conn = SqliteConnection::open_memory().expect("open in-memory db");
        conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .expect("create table");
        assert_eq!(conn.path(), ":memory:");
    }

    #[test]
    fn sync_roundtrip() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();

        let rowid = conn
            .insert_sync(
                "INSERT INTO t (name) VALUES (?)",
                &[Value::Text("alpha".to_string())],
            )
            .unwrap();
        assert_eq!(rowid, 1);

        let rows = conn
            .query_sync("SELECT id, name FROM t WHERE id = ?", &[Value::Integer(1)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "alpha");

        let affected = conn
            .execute_sync("DELETE FROM t WHERE id = ?", &[Value::Integer(1)])
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn query_error_reports_sql() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.query_sync("SELECT * FROM missing", &[]).unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM missing"));
    }

    #[test]
    fn null_and_blob_round_trip() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE b (id INTEGER PRIMARY KEY, data BLOB, note TEXT)")
            .unwrap();
        conn.insert_sync(
            "INSERT INTO b (data, note) VALUES (?, ?)",
            &[Value::Blob(vec![1, 2, 3]), Value::Null],
        )
        .unwrap();

        let rows = conn.query_sync("SELECT data, note FROM b", &[]).unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Blob(vec![1, 2, 3])));
        assert_eq!(rows[0].get(1), Some(&Value::Null));
    }
}
