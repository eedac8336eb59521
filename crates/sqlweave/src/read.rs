//! Cascade-load engine.
//!
//! Loads declared relationships for a batch of sibling objects, one
//! relation at a time: to-one edges batch-fetch by key with `IN` lists,
//! to-many edges query per parent, many-to-many edges go through the
//! intermediate table with a nested select. Materialization always runs
//! through the identity cache, so a key that was already seen in this
//! call tree resolves to the same handle and stops further recursion
//! (cycle and shared-reference termination).
//!
//! A top-level call with `recursive = false` loads exactly one level of
//! every declared relation, ignoring cascade flags; descending further
//! requires the relation to be flagged cascade-read.

use crate::chunk::{in_chunks, placeholders};
use crate::exec::Executor;
use crate::ident::IdentityCache;
use crate::meta;
use crate::relation::{
    CollectionSpec, Obj, ReferenceSpec, Related, Relation, RelationKind, RelationOps, read_obj,
    write_obj,
};
use crate::try_outcome;
use crate::weave::EngineConfig;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Model, Value, quote_ident};
use std::any::Any;
use std::sync::Arc;

/// Load every applicable relation of `parents`, recursing into
/// cascade-readable children.
pub(crate) async fn load_relations<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    parents: &[Obj<E>],
    recursive: bool,
    top_level: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    if parents.is_empty() {
        return Outcome::Ok(());
    }

    for rel in E::relations() {
        match &rel.ops {
            // Text blobs always process, at every depth, and never recurse.
            RelationOps::Blob(ops) => {
                for parent in parents {
                    let mut guard = write_obj(parent);
                    if let Err(e) = ops.unpack(&mut guard) {
                        return Outcome::Err(e);
                    }
                }
            }
            RelationOps::Reference(ops) => {
                if !top_level && !rel.cascade.read {
                    continue;
                }
                try_outcome!(
                    ops.load(cx, conn, rel, parents, recursive, cache, cfg)
                        .await
                );
            }
            RelationOps::Collection(ops) => {
                if !top_level && !rel.cascade.read {
                    continue;
                }
                try_outcome!(
                    ops.load(cx, conn, rel, parents, recursive, cache, cfg)
                        .await
                );
            }
        }
    }

    Outcome::Ok(())
}

/// Load a to-one relation (one-to-one or many-to-one) for a batch of
/// parents.
pub(crate) async fn load_reference<S: ReferenceSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let origin = S::Owner::meta();
    let target = S::Target::meta();

    let inverse = match meta::resolve_inverse::<S::Owner, S::Target>(rel) {
        Ok(inverse) => inverse,
        Err(e) => {
            if cfg.enforce_relations {
                return Outcome::Err(e);
            }
            None
        }
    };
    let inverse_explicit = inverse.and_then(|r| r.foreign_key);

    // Prefer the key on this side; many-to-one requires it.
    if let Some(fk_column) =
        meta::resolve_foreign_key(&origin, rel.foreign_key, inverse_explicit, &target)
    {
        return load_reference_local::<S>(
            cx, conn, rel, parents, recursive, cache, cfg, fk_column, inverse,
        )
        .await;
    }

    if rel.kind == RelationKind::ManyToOne {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                format!(
                    "many-to-one requires a foreign key on '{}' referencing '{}'",
                    origin.type_name, target.type_name
                ),
            ));
        }
        return Outcome::Ok(());
    }

    // One-to-one where the other side holds the key.
    let Some(fk_column) =
        meta::resolve_foreign_key(&target, inverse_explicit, rel.foreign_key, &origin)
    else {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                format!(
                    "no foreign key on either side between '{}' and '{}'",
                    origin.type_name, target.type_name
                ),
            ));
        }
        return Outcome::Ok(());
    };
    load_reference_remote::<S>(
        cx, conn, rel, parents, recursive, cache, cfg, fk_column, inverse,
    )
    .await
}

/// To-one load where this side holds the foreign key: batch-fetch the
/// referenced rows by primary key.
#[allow(clippy::too_many_arguments)]
async fn load_reference_local<S: ReferenceSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
    fk_column: &'static str,
    inverse: Option<&'static Relation<S::Target>>,
) -> Outcome<(), Error> {
    let target = S::Target::meta();

    // Distinct set of referenced keys across the sibling batch.
    let mut keys: Vec<Value> = Vec::new();
    for parent in parents {
        let value = read_obj(parent).get_column(fk_column);
        if let Some(value) = value {
            if !value.is_unset_key() && !keys.contains(&value) {
                keys.push(value);
            }
        }
    }

    let mut loaded: Vec<(Value, Obj<S::Target>)> = Vec::new();
    let mut fresh: Vec<Obj<S::Target>> = Vec::new();
    for chunk in in_chunks(&keys, 0, cfg.max_sql_params) {
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            quote_ident(target.table),
            quote_ident(target.key.column),
            placeholders(chunk.len())
        );
        let rows = try_outcome!(conn.query(cx, &sql, chunk).await);
        for row in &rows {
            let instance = match S::Target::from_row(row) {
                Ok(instance) => instance,
                Err(e) => return Outcome::Err(e),
            };
            let key = instance.primary_key();
            let (handle, hit) = cache.fetch_or_insert(instance);
            if !hit {
                fresh.push(Arc::clone(&handle));
            }
            loaded.push((key, handle));
        }
    }

    for parent in parents {
        let fk_value = read_obj(parent).get_column(fk_column);
        let child = fk_value.filter(|v| !v.is_unset_key()).and_then(|value| {
            loaded
                .iter()
                .find(|(key, _)| *key == value)
                .map(|(_, handle)| Arc::clone(handle))
        });

        if rel.kind == RelationKind::OneToOne {
            if let (Some(child), Some(inverse)) = (&child, inverse) {
                if let RelationOps::Reference(inverse_ops) = &inverse.ops {
                    let parent_ref: &dyn Any = parent;
                    let mut child_guard = write_obj(child);
                    if let Err(e) =
                        inverse_ops.set_reference(inverse, &mut child_guard, Some(parent_ref))
                    {
                        return Outcome::Err(e);
                    }
                }
            }
        }

        let mut guard = write_obj(parent);
        S::set(&mut guard, child);
    }

    if recursive && rel.cascade.read && !fresh.is_empty() {
        tracing::debug!(relation = rel.name, children = fresh.len(), "descending");
        try_outcome!(load_relations::<S::Target>(cx, conn, &fresh, true, false, cache, cfg).await);
    }

    Outcome::Ok(())
}

/// One-to-one load where the *other* side holds the foreign key: fetch
/// the referencing rows by that key.
#[allow(clippy::too_many_arguments)]
async fn load_reference_remote<S: ReferenceSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
    fk_column: &'static str,
    inverse: Option<&'static Relation<S::Target>>,
) -> Outcome<(), Error> {
    let target = S::Target::meta();

    let mut parent_keys: Vec<Value> = Vec::new();
    for parent in parents {
        let key = read_obj(parent).primary_key();
        if !key.is_unset_key() && !parent_keys.contains(&key) {
            parent_keys.push(key);
        }
    }

    // fk value on the child -> child handle
    let mut loaded: Vec<(Value, Obj<S::Target>)> = Vec::new();
    let mut fresh: Vec<Obj<S::Target>> = Vec::new();
    for chunk in in_chunks(&parent_keys, 0, cfg.max_sql_params) {
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            quote_ident(target.table),
            quote_ident(fk_column),
            placeholders(chunk.len())
        );
        let rows = try_outcome!(conn.query(cx, &sql, chunk).await);
        for row in &rows {
            let instance = match S::Target::from_row(row) {
                Ok(instance) => instance,
                Err(e) => return Outcome::Err(e),
            };
            let Some(fk_value) = instance.get_column(fk_column) else {
                continue;
            };
            let (handle, hit) = cache.fetch_or_insert(instance);
            if !hit {
                fresh.push(Arc::clone(&handle));
            }
            loaded.push((fk_value, handle));
        }
    }

    for parent in parents {
        let parent_key = read_obj(parent).primary_key();
        let child = if parent_key.is_unset_key() {
            None
        } else {
            loaded
                .iter()
                .find(|(fk, _)| *fk == parent_key)
                .map(|(_, handle)| Arc::clone(handle))
        };

        if let (Some(child), Some(inverse)) = (&child, inverse) {
            if let RelationOps::Reference(inverse_ops) = &inverse.ops {
                let parent_ref: &dyn Any = parent;
                let mut child_guard = write_obj(child);
                if let Err(e) =
                    inverse_ops.set_reference(inverse, &mut child_guard, Some(parent_ref))
                {
                    return Outcome::Err(e);
                }
            }
        }

        let mut guard = write_obj(parent);
        S::set(&mut guard, child);
    }

    if recursive && rel.cascade.read && !fresh.is_empty() {
        try_outcome!(load_relations::<S::Target>(cx, conn, &fresh, true, false, cache, cfg).await);
    }

    Outcome::Ok(())
}

/// Load a to-many relation (one-to-many or many-to-many) for a batch of
/// parents.
pub(crate) async fn load_collection<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    match rel.kind {
        RelationKind::OneToMany => {
            load_one_to_many::<S>(cx, conn, rel, parents, recursive, cache, cfg).await
        }
        RelationKind::ManyToMany => {
            load_many_to_many::<S>(cx, conn, rel, parents, recursive, cache, cfg).await
        }
        // Collections only ever carry the two kinds above.
        _ => Outcome::Ok(()),
    }
}

async fn load_one_to_many<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let origin = S::Owner::meta();
    let target = S::Target::meta();

    let inverse = match meta::resolve_inverse::<S::Owner, S::Target>(rel) {
        Ok(inverse) => inverse,
        Err(e) => {
            if cfg.enforce_relations {
                return Outcome::Err(e);
            }
            None
        }
    };
    let inverse_explicit = inverse.and_then(|r| r.foreign_key);

    let Some(fk_column) =
        meta::resolve_foreign_key(&target, rel.foreign_key, inverse_explicit, &origin)
    else {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                format!(
                    "one-to-many requires a foreign key on '{}' referencing '{}'",
                    target.type_name, origin.type_name
                ),
            ));
        }
        return Outcome::Ok(());
    };

    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?",
        quote_ident(target.table),
        quote_ident(fk_column)
    );

    let mut fresh: Vec<Obj<S::Target>> = Vec::new();
    for parent in parents {
        let parent_key = read_obj(parent).primary_key();
        if parent_key.is_unset_key() {
            // A keyless parent references no rows; the collection is
            // populated-but-empty, never left unset.
            let mut guard = write_obj(parent);
            S::set(&mut guard, Some(Vec::new()));
            continue;
        }

        let rows = try_outcome!(
            conn.query(cx, &sql, std::slice::from_ref(&parent_key))
                .await
        );
        let mut children = Vec::with_capacity(rows.len());
        for row in &rows {
            let instance = match S::Target::from_row(row) {
                Ok(instance) => instance,
                Err(e) => return Outcome::Err(e),
            };
            let (handle, hit) = cache.fetch_or_insert(instance);
            if !hit {
                fresh.push(Arc::clone(&handle));
            }

            if let Some(inverse) = inverse {
                if let RelationOps::Reference(inverse_ops) = &inverse.ops {
                    let parent_ref: &dyn Any = parent;
                    let mut child_guard = write_obj(&handle);
                    if let Err(e) =
                        inverse_ops.set_reference(inverse, &mut child_guard, Some(parent_ref))
                    {
                        return Outcome::Err(e);
                    }
                }
            }

            children.push(handle);
        }

        let mut guard = write_obj(parent);
        S::set(&mut guard, Some(children));
    }

    // Recurse into the whole child set at once, not per child.
    if recursive && rel.cascade.read && !fresh.is_empty() {
        tracing::debug!(relation = rel.name, children = fresh.len(), "descending");
        try_outcome!(load_relations::<S::Target>(cx, conn, &fresh, true, false, cache, cfg).await);
    }

    Outcome::Ok(())
}

async fn load_many_to_many<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    parents: &[Obj<S::Owner>],
    recursive: bool,
    cache: &mut IdentityCache,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let origin = S::Owner::meta();
    let target = S::Target::meta();

    let inverse = match meta::resolve_inverse::<S::Owner, S::Target>(rel) {
        Ok(inverse) => inverse,
        Err(e) => {
            if cfg.enforce_relations {
                return Outcome::Err(e);
            }
            None
        }
    };
    let inverse_explicit = inverse.and_then(|r| r.foreign_key);

    let link = match meta::resolve_link(
        S::Owner::TYPE_NAME,
        rel.name,
        rel.intermediate,
        &origin,
        &target,
        rel.foreign_key,
        inverse_explicit,
    ) {
        Ok(link) => link,
        Err(e) => return Outcome::Err(e),
    };

    let sql = format!(
        "SELECT * FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {} = ?)",
        quote_ident(target.table),
        quote_ident(target.key.column),
        quote_ident(link.dest_key),
        quote_ident(link.table),
        quote_ident(link.origin_key)
    );

    let mut fresh: Vec<Obj<S::Target>> = Vec::new();
    for parent in parents {
        let parent_key = read_obj(parent).primary_key();
        if parent_key.is_unset_key() {
            let mut guard = write_obj(parent);
            S::set(&mut guard, Some(Vec::new()));
            continue;
        }

        let rows = try_outcome!(
            conn.query(cx, &sql, std::slice::from_ref(&parent_key))
                .await
        );
        let mut children = Vec::with_capacity(rows.len());
        for row in &rows {
            let instance = match S::Target::from_row(row) {
                Ok(instance) => instance,
                Err(e) => return Outcome::Err(e),
            };
            let (handle, hit) = cache.fetch_or_insert(instance);
            if !hit {
                fresh.push(Arc::clone(&handle));
            }
            // The intermediate table is invisible to the object model:
            // no inverse scalar is stitched here.
            children.push(handle);
        }

        let mut guard = write_obj(parent);
        S::set(&mut guard, Some(children));
    }

    if recursive && rel.cascade.read && !fresh.is_empty() {
        try_outcome!(load_relations::<S::Target>(cx, conn, &fresh, true, false, cache, cfg).await);
    }

    Outcome::Ok(())
}
