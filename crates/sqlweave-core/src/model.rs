//! Model trait for table-mapped struct types.
//!
//! The `Model` trait is the row-store mapping contract: table name, primary
//! key, column metadata, and value-level accessors. It carries no
//! relationship knowledge; the relationship layer builds on top of it.

use crate::Result;
use crate::field::FieldInfo;
use crate::row::Row;
use crate::value::Value;

/// Primary key declaration for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    /// Primary key column name
    pub column: &'static str,
    /// Whether the key is assigned by the database on insert
    pub auto_increment: bool,
}

impl KeyInfo {
    /// A caller-assigned primary key.
    pub const fn new(column: &'static str) -> Self {
        Self {
            column,
            auto_increment: false,
        }
    }

    /// A database-assigned (auto-increment) primary key.
    pub const fn auto(column: &'static str) -> Self {
        Self {
            column,
            auto_increment: true,
        }
    }
}

/// Erased model metadata, usable across relationship boundaries where the
/// concrete model type is not statically known.
#[derive(Debug, Clone, Copy)]
pub struct ModelMeta {
    /// Rust type name, used by diagnostics and key naming conventions
    pub type_name: &'static str,
    /// Database table name
    pub table: &'static str,
    /// Primary key declaration
    pub key: KeyInfo,
    /// Column metadata
    pub fields: &'static [FieldInfo],
}

/// Trait for types that can be mapped to database tables.
///
/// Typically written out per type as an explicit mapping block; the
/// accessors (`get_column`/`set_column`) are plain matches over column
/// names, giving the generic engines field access without reflection.
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The Rust-facing type name (for diagnostics and key conventions).
    const TYPE_NAME: &'static str;

    /// The primary key declaration.
    const PRIMARY_KEY: KeyInfo;

    /// Get field metadata for all columns.
    fn fields() -> &'static [FieldInfo];

    /// Convert this model instance to a row of values.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field.
    fn primary_key(&self) -> Value;

    /// Set the primary key field (used after auto-increment inserts).
    fn set_primary_key(&mut self, key: Value);

    /// Read a single mapped column by name.
    fn get_column(&self, column: &str) -> Option<Value>;

    /// Write a single mapped column by name. Returns false when the column
    /// is not mapped on this type.
    fn set_column(&mut self, column: &str, value: Value) -> bool;

    /// Check if this is a new record (primary key unset).
    fn is_new(&self) -> bool {
        self.primary_key().is_unset_key()
    }

    /// Erased metadata for this model.
    fn meta() -> ModelMeta {
        ModelMeta {
            type_name: Self::TYPE_NAME,
            table: Self::TABLE_NAME,
            key: Self::PRIMARY_KEY,
            fields: Self::fields(),
        }
    }
}
