//! Value binding and column reading for SQLite statements.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL); the
//! core `Value` enum maps onto them directly. UUIDs are stored as 16-byte
//! blobs.

use crate::ffi;
use sqlweave_core::Value;
use std::ffi::{CStr, c_int};

/// Bind a `Value` to a statement parameter (1-based index).
///
/// # Safety
///
/// `stmt` must be a valid, non-null prepared statement handle and `index`
/// a valid 1-based parameter index.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),

            Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            Value::Text(s) => {
                let bytes = s.as_bytes();
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    bytes.as_ptr().cast(),
                    bytes.len() as c_int,
                    ffi::SQLITE_TRANSIENT,
                )
            }

            Value::Blob(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT,
            ),

            // UUID stored as 16-byte blob
            Value::Uuid(bytes) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                bytes.as_ptr().cast(),
                16,
                ffi::SQLITE_TRANSIENT,
            ),
        }
    }
}

/// Read the value of a result column (0-based index).
///
/// Blobs come back as `Value::Blob` even when 16 bytes long; typed readers
/// that expect UUID keys convert through `FromValue for [u8; 16]`.
///
/// # Safety
///
/// `stmt` must be a valid statement positioned on a row (`SQLITE_ROW`).
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let len = ffi::sqlite3_column_bytes(stmt, index) as usize;
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                if ptr.is_null() {
                    Value::Blob(Vec::new())
                } else {
                    let len = ffi::sqlite3_column_bytes(stmt, index) as usize;
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len);
                    Value::Blob(bytes.to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get a result column's name (0-based index).
///
/// # Safety
///
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}
