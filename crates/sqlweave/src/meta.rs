//! Metadata resolver.
//!
//! Pure functions deriving the wiring of a relationship from declared
//! metadata: which column is the foreign key, which property on the
//! target is the inverse, and how a many-to-many intermediate maps to its
//! two sides. Resolution is a pure function of the type shapes, so
//! results are safely re-derivable at every call site.

use crate::relation::{InverseKind, Related, Relation};
use sqlweave_core::{Error, ModelMeta, Result};

/// Resolved wiring of a many-to-many intermediate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Intermediate table name.
    pub table: &'static str,
    /// Column referencing the origin side's primary key.
    pub origin_key: &'static str,
    /// Column referencing the destination side's primary key.
    pub dest_key: &'static str,
}

/// Normalized column-name comparison: case-insensitive, separator
/// underscores ignored, so `author_id` matches the conventional
/// `{Author}Id`.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn field_named(meta: &ModelMeta, name: &str) -> Option<&'static str> {
    let wanted = normalize(name);
    meta.fields
        .iter()
        .find(|f| normalize(f.name) == wanted)
        .map(|f| f.name)
}

/// Resolve the foreign-key column on `origin` referencing `dest`'s
/// primary key.
///
/// Resolution order: the explicit name declared for the requested
/// direction, the explicit name declared on the inverse relationship, a
/// column declared with `references` to the destination table, then the
/// `{DestinationTypeName}Id` / `Key` / `ForeignKey` naming convention.
/// `None` is a valid result for one-to-one relationships where the other
/// side supplies the key; callers decide whether absence is fatal.
pub fn resolve_foreign_key(
    origin: &ModelMeta,
    explicit: Option<&'static str>,
    inverse_explicit: Option<&'static str>,
    dest: &ModelMeta,
) -> Option<&'static str> {
    if let Some(name) = explicit {
        if let Some(column) = field_named(origin, name) {
            return Some(column);
        }
    }
    if let Some(name) = inverse_explicit {
        if let Some(column) = field_named(origin, name) {
            return Some(column);
        }
    }
    if let Some(field) = origin
        .fields
        .iter()
        .find(|f| f.references == Some(dest.table))
    {
        return Some(field.name);
    }

    let type_name = normalize(dest.type_name);
    for suffix in ["id", "key", "foreignkey"] {
        let candidate = format!("{type_name}{suffix}");
        if let Some(field) = origin
            .fields
            .iter()
            .find(|f| normalize(f.name) == candidate && !f.primary_key)
        {
            return Some(field.name);
        }
    }

    None
}

/// Turn an optional resolution into a hard requirement, naming the
/// offending declaration.
#[allow(clippy::result_large_err)]
pub(crate) fn require_foreign_key(
    model: &'static str,
    relation: &'static str,
    resolved: Option<&'static str>,
    origin: &ModelMeta,
    dest: &ModelMeta,
) -> Result<&'static str> {
    resolved.ok_or_else(|| {
        Error::relation(
            model,
            relation,
            format!(
                "no foreign key on '{}' referencing '{}'",
                origin.type_name, dest.type_name
            ),
        )
    })
}

/// Resolve the inverse relationship on the target type.
///
/// An explicit name that does not exist is a configuration error; an
/// explicitly-empty inverse short-circuits to `None`; otherwise the first
/// relationship on the target whose own target is the origin type wins.
#[allow(clippy::result_large_err)]
pub fn resolve_inverse<T: Related, U: Related>(
    rel: &Relation<T>,
) -> Result<Option<&'static Relation<U>>> {
    match rel.inverse {
        InverseKind::None => Ok(None),
        InverseKind::Named(name) => match U::relation(name) {
            Some(found) => Ok(Some(found)),
            None => Err(Error::relation(
                T::TYPE_NAME,
                rel.name,
                format!("inverse '{}' does not exist on '{}'", name, U::TYPE_NAME),
            )),
        },
        InverseKind::Auto => Ok(U::relations().iter().find(|candidate| {
            candidate.is_edge()
                && candidate
                    .target_meta()
                    .is_some_and(|meta| meta.table == T::TABLE_NAME)
        })),
    }
}

/// Resolve the intermediate wiring of a many-to-many relationship.
///
/// Unlike plain foreign-key resolution this is all-or-nothing: a
/// many-to-many edge without a resolvable key on each side cannot be
/// queried at all, so failure is a fatal configuration error.
#[allow(clippy::result_large_err)]
pub fn resolve_link(
    model: &'static str,
    relation: &'static str,
    intermediate: Option<fn() -> ModelMeta>,
    origin: &ModelMeta,
    dest: &ModelMeta,
    explicit_origin: Option<&'static str>,
    explicit_dest: Option<&'static str>,
) -> Result<LinkInfo> {
    let Some(meta_fn) = intermediate else {
        return Err(Error::relation(
            model,
            relation,
            "many-to-many relationship has no intermediate type",
        ));
    };
    let inter = meta_fn();

    let origin_key = resolve_foreign_key(&inter, explicit_origin, None, origin).ok_or_else(|| {
        Error::relation(
            model,
            relation,
            format!(
                "intermediate '{}' has no foreign key to '{}'",
                inter.type_name, origin.type_name
            ),
        )
    })?;
    let dest_key = resolve_foreign_key(&inter, explicit_dest, None, dest).ok_or_else(|| {
        Error::relation(
            model,
            relation,
            format!(
                "intermediate '{}' has no foreign key to '{}'",
                inter.type_name, dest.type_name
            ),
        )
    })?;

    if origin_key == dest_key {
        return Err(Error::relation(
            model,
            relation,
            format!(
                "intermediate '{}' resolves both sides to column '{}'",
                inter.type_name, origin_key
            ),
        ));
    }

    Ok(LinkInfo {
        table: inter.table,
        origin_key,
        dest_key,
    })
}
