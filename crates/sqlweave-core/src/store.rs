//! Single-table CRUD primitives.
//!
//! Thin, generic row operations over [`Model`] metadata: fetch by primary
//! key, filtered selects, and the insert/update/delete statements the
//! relationship engines compose into cascades. No statement here touches
//! more than one table.

use crate::connection::Connection;
use crate::error::Error;
use crate::model::Model;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// Quote a SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fetch a single row by primary key, `None` when absent.
pub async fn try_get_by_key<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    key: &Value,
) -> Outcome<Option<M>, Error> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ? LIMIT 1",
        quote_ident(M::TABLE_NAME),
        quote_ident(M::PRIMARY_KEY.column)
    );
    let row = match conn.query_one(cx, &sql, &[key.clone()]).await {
        Outcome::Ok(row) => row,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match row {
        Some(row) => match M::from_row(&row) {
            Ok(obj) => Outcome::Ok(Some(obj)),
            Err(e) => Outcome::Err(e),
        },
        None => Outcome::Ok(None),
    }
}

/// Fetch a single row by primary key, failing loudly when absent.
pub async fn get_by_key<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    key: &Value,
) -> Outcome<M, Error> {
    match try_get_by_key::<M, C>(cx, conn, key).await {
        Outcome::Ok(Some(obj)) => Outcome::Ok(obj),
        Outcome::Ok(None) => Outcome::Err(Error::NotFound {
            table: M::TABLE_NAME,
            key: key.clone(),
        }),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Select rows mapped to a model, optionally restricted by a WHERE clause.
///
/// `filter` is a raw clause (without the `WHERE` keyword) with `?`
/// placeholders bound from `params`.
pub async fn query_as<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    filter: Option<&str>,
    params: &[Value],
) -> Outcome<Vec<M>, Error> {
    let mut sql = format!("SELECT * FROM {}", quote_ident(M::TABLE_NAME));
    if let Some(clause) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    tracing::trace!(sql = %sql, "mapped select");
    let rows = match conn.query(cx, &sql, params).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        match M::from_row(row) {
            Ok(obj) => out.push(obj),
            Err(e) => return Outcome::Err(e),
        }
    }
    Outcome::Ok(out)
}

/// Build an INSERT statement for an object. `keep_key` controls whether
/// the primary-key column is written or left for the database to assign.
pub fn build_insert<M: Model>(obj: &M, replace: bool, keep_key: bool) -> (String, Vec<Value>) {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (name, value) in obj.to_row() {
        if name == M::PRIMARY_KEY.column && !keep_key {
            continue;
        }
        columns.push(name);
        values.push(value);
    }

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT {}INTO {} ({}) VALUES ({})",
        if replace { "OR REPLACE " } else { "" },
        quote_ident(M::TABLE_NAME),
        column_list,
        placeholders
    );
    (sql, values)
}

/// Build an UPDATE statement for an object, keyed by its primary key.
pub fn build_update<M: Model>(obj: &M) -> (String, Vec<Value>) {
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for (name, value) in obj.to_row() {
        if name == M::PRIMARY_KEY.column {
            continue;
        }
        assignments.push(format!("{} = ?", quote_ident(name)));
        values.push(value);
    }
    values.push(obj.primary_key());
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_ident(M::TABLE_NAME),
        assignments.join(", "),
        quote_ident(M::PRIMARY_KEY.column)
    );
    (sql, values)
}

/// Insert a row. For auto-increment models with an unset key, the key
/// column is omitted from the statement and the generated rowid is written
/// back into the object.
pub async fn insert_row<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    obj: &mut M,
) -> Outcome<(), Error> {
    let generate_key = M::PRIMARY_KEY.auto_increment && obj.is_new();
    let (sql, values) = build_insert::<M>(obj, false, !generate_key);
    let rowid = match conn.insert(cx, &sql, &values).await {
        Outcome::Ok(id) => id,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    if generate_key {
        obj.set_primary_key(Value::Integer(rowid));
    }
    Outcome::Ok(())
}

/// Insert a row with REPLACE semantics. The primary key is always written
/// as-is; callers must ensure it is set.
pub async fn insert_or_replace_row<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    obj: &M,
) -> Outcome<(), Error> {
    let (sql, values) = build_insert::<M>(obj, true, true);
    match conn.execute(cx, &sql, &values).await {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Update a row in place, keyed by its primary key.
pub async fn update_row<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    obj: &M,
) -> Outcome<u64, Error> {
    let (sql, values) = build_update::<M>(obj);
    conn.execute(cx, &sql, &values).await
}

/// Delete a row by primary key value.
pub async fn delete_by_key<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    key: &Value,
) -> Outcome<u64, Error> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_ident(M::TABLE_NAME),
        quote_ident(M::PRIMARY_KEY.column)
    );
    conn.execute(cx, &sql, &[key.clone()]).await
}

/// Delete the row backing the given object.
pub async fn delete_row<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    obj: &M,
) -> Outcome<u64, Error> {
    delete_by_key::<M, C>(cx, conn, &obj.primary_key()).await
}

/// Count rows, optionally restricted by a WHERE clause.
pub async fn count<M: Model, C: Connection>(
    cx: &Cx,
    conn: &C,
    filter: Option<&str>,
    params: &[Value],
) -> Outcome<i64, Error> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(M::TABLE_NAME));
    if let Some(clause) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    let row = match conn.query_one(cx, &sql, params).await {
        Outcome::Ok(row) => row,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match row.as_ref().and_then(|r| r.get(0)).and_then(Value::as_i64) {
        Some(n) => Outcome::Ok(n),
        None => Outcome::Ok(0),
    }
}
