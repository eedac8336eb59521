//! Object-safe executor boundary.
//!
//! The `Connection` trait uses `impl Future` methods and is therefore not
//! object-safe, but the engines must cross type-erased relationship
//! boundaries where the connection type cannot appear as a generic
//! parameter. `Executor` is the boxed-future mirror of `Connection`; every
//! connection implements it for free.

use asupersync::{Cx, Outcome};
use sqlweave_core::{Connection, Error, Row, Value};
use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used across erased relationship operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe subset of [`Connection`].
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows.
    fn query<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>>;

    /// Execute a query and return the first row, if any.
    fn query_one<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Option<Row>, Error>>;

    /// Execute a statement and return rows affected.
    fn execute<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<u64, Error>>;

    /// Execute an INSERT and return the last inserted rowid.
    fn insert<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<i64, Error>>;
}

impl<C: Connection> Executor for C {
    fn query<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
        Box::pin(Connection::query(self, cx, sql, params))
    }

    fn query_one<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Option<Row>, Error>> {
        Box::pin(Connection::query_one(self, cx, sql, params))
    }

    fn execute<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(Connection::execute(self, cx, sql, params))
    }

    fn insert<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<i64, Error>> {
        Box::pin(Connection::insert(self, cx, sql, params))
    }
}

