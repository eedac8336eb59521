//! Field and column definitions.

/// SQL storage type for a mapped column (SQLite affinities).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    /// Get the SQL name for DDL.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }
}

/// Metadata about a mapped column.
///
/// Declared as const tables on each model; the metadata resolver scans
/// these to derive foreign keys that were not named explicitly.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Database column name
    pub name: &'static str,
    /// SQL type for this field
    pub sql_type: SqlType,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
    /// Whether this field auto-increments
    pub auto_increment: bool,
    /// Whether this field has a unique constraint
    pub unique: bool,
    /// Table this column is a declared foreign key into
    pub references: Option<&'static str>,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            references: None,
        }
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set unique flag.
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Declare this column a foreign key into the given table.
    pub const fn references(mut self, table: &'static str) -> Self {
        self.references = Some(table);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let field = FieldInfo::new("author_id", SqlType::Integer)
            .nullable(true)
            .references("authors");

        assert_eq!(field.name, "author_id");
        assert_eq!(field.sql_type, SqlType::Integer);
        assert!(field.nullable);
        assert!(!field.primary_key);
        assert_eq!(field.references, Some("authors"));
    }

    #[test]
    fn sql_names() {
        assert_eq!(SqlType::Integer.sql_name(), "INTEGER");
        assert_eq!(SqlType::Text.sql_name(), "TEXT");
    }
}
