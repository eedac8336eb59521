//! Database connection trait.
//!
//! This is the full row-store surface the relationship engines consume:
//! parameterized query and mutation primitives. Connection management,
//! pooling, and transactions beyond single statements are out of scope;
//! callers that need a transaction around a cascade issue BEGIN/COMMIT as
//! plain statements through [`Connection::execute`].
//!
//! All operations take a `Cx` context and return `Outcome` for
//! cancel-correct propagation.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A database connection capable of executing parameterized statements.
///
/// Implementations must be `Send + Sync`; the engines hold a shared
/// reference for the duration of one traversal and never call concurrently.
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute an INSERT and return the last inserted rowid.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send;
}
