//! Core types and row-store contract for sqlweave.
//!
//! This crate provides the minimal persistence surface the relationship
//! layer builds on:
//!
//! - `Model` trait for table-mapped struct types
//! - `Connection` trait for parameterized row-store access
//! - `store` single-table CRUD primitives
//! - `Value`/`Row` dynamic data representation
//! - `Cx`/`Outcome` re-exports from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod blob;
pub mod connection;
pub mod error;
pub mod field;
pub mod model;
pub mod row;
pub mod store;
pub mod value;

pub use connection::Connection;
pub use error::{Error, RelationError, Result};
pub use field::{FieldInfo, SqlType};
pub use model::{KeyInfo, Model, ModelMeta};
pub use row::{ColumnInfo, FromValue, Row};
pub use store::quote_ident;
pub use value::Value;
