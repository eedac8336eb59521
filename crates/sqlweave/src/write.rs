//! Cascade-save engine.
//!
//! Two composable halves:
//!
//! - **Insert cascade**: children-first walk over cascade-insertable,
//!   non-read-only edges, guarded by a per-call visited set (bidirectional
//!   references terminate instead of double-inserting).
//! - **Foreign-key refresh + inverse reconciliation**: per object, always
//!   in this order: copy in-memory to-one references into foreign-key
//!   columns (and re-serialize text blobs), persist the row, then bring
//!   the database in line for every relation whose *other* side owns the
//!   key: one-to-many NULL-then-SET updates, inverse-held one-to-one key
//!   updates, and many-to-many link-table diffs that only touch changed
//!   rows.
//!
//! None of this is transactional by itself; callers wanting atomicity
//! wrap the top-level call in BEGIN/COMMIT at the connection.

use crate::chunk::{in_chunks, placeholders};
use crate::exec::Executor;
use crate::ident::VisitedSet;
use crate::meta;
use crate::relation::{
    CollectionSpec, Obj, ReferenceSpec, Related, Relation, RelationKind, RelationOps, read_obj,
    write_obj,
};
use crate::try_outcome;
use crate::weave::EngineConfig;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Model, Result, Value, quote_ident, store};
use std::any::Any;

/// Insert a batch of roots with their cascade-insertable children.
///
/// The visited set is shared across roots, so overlapping graphs insert
/// each object once.
pub(crate) async fn insert_graph<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    roots: &[Obj<E>],
    replace: bool,
    recursive: bool,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let mut visited = VisitedSet::new();
    for root in roots {
        try_outcome!(insert_element::<E>(cx, conn, root, replace, recursive, &mut visited, cfg).await);
    }
    Outcome::Ok(())
}

/// Insert one element: cascade children first, refresh foreign keys,
/// persist the row, then reconcile inverse relationships.
pub(crate) async fn insert_element<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    element: &Obj<E>,
    replace: bool,
    recursive: bool,
    visited: &mut VisitedSet,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    if !visited.insert(element) {
        return Outcome::Ok(());
    }

    for rel in E::relations() {
        if !rel.cascade.insert || rel.read_only {
            continue;
        }
        match &rel.ops {
            RelationOps::Reference(ops) => {
                try_outcome!(
                    ops.insert_subtree(cx, conn, rel, element, replace, recursive, visited, cfg)
                        .await
                );
            }
            RelationOps::Collection(ops) => {
                try_outcome!(
                    ops.insert_subtree(cx, conn, rel, element, replace, recursive, visited, cfg)
                        .await
                );
            }
            // Text blobs are not edges; they ride along in the refresh.
            RelationOps::Blob(_) => {}
        }
    }

    if let Err(e) = refresh_foreign_keys::<E>(element, cfg) {
        return Outcome::Err(e);
    }
    try_outcome!(persist_new_row::<E>(cx, conn, element, replace).await);
    reconcile_relations::<E>(cx, conn, element, cfg).await
}

/// Insert one element without descending further (the non-recursive,
/// one-level cascade) and without reconciliation.
async fn insert_single<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    element: &Obj<E>,
    replace: bool,
    visited: &mut VisitedSet,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    if !visited.insert(element) {
        return Outcome::Ok(());
    }
    if let Err(e) = refresh_foreign_keys::<E>(element, cfg) {
        return Outcome::Err(e);
    }
    persist_new_row::<E>(cx, conn, element, replace).await
}

/// Cascade-insert through a to-one edge.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_reference_subtree<S: ReferenceSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    _rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
    replace: bool,
    recursive: bool,
    visited: &mut VisitedSet,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let child = {
        let guard = read_obj(owner);
        S::get(&guard)
    };
    let Some(child) = child else {
        return Outcome::Ok(());
    };
    if recursive {
        insert_element::<S::Target>(cx, conn, &child, replace, true, visited, cfg).await
    } else {
        insert_single::<S::Target>(cx, conn, &child, replace, visited, cfg).await
    }
}

/// Cascade-insert through a to-many edge.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_collection_subtree<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    _rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
    replace: bool,
    recursive: bool,
    visited: &mut VisitedSet,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    let children = {
        let guard = read_obj(owner);
        S::get(&guard)
    };
    let Some(children) = children else {
        return Outcome::Ok(());
    };
    for child in &children {
        if recursive {
            try_outcome!(insert_element::<S::Target>(cx, conn, child, replace, true, visited, cfg).await);
        } else {
            try_outcome!(insert_single::<S::Target>(cx, conn, child, replace, visited, cfg).await);
        }
    }
    Outcome::Ok(())
}

/// Step (a): copy in-memory to-one references into this object's
/// foreign-key columns and re-serialize text blobs.
#[allow(clippy::result_large_err)]
pub(crate) fn refresh_foreign_keys<E: Related>(element: &Obj<E>, cfg: &EngineConfig) -> Result<()> {
    for rel in E::relations() {
        if rel.read_only {
            continue;
        }
        match &rel.ops {
            RelationOps::Reference(ops) => ops.refresh_foreign_key(rel, element, cfg)?,
            RelationOps::Blob(ops) => {
                let mut guard = write_obj(element);
                ops.pack(&mut guard)?;
            }
            RelationOps::Collection(_) => {}
        }
    }
    Ok(())
}

/// Refresh one to-one foreign key from the in-memory reference.
#[allow(clippy::result_large_err)]
pub(crate) fn refresh_reference<S: ReferenceSpec>(
    rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
    cfg: &EngineConfig,
) -> Result<()> {
    let origin = S::Owner::meta();
    let target = S::Target::meta();

    let inverse = match meta::resolve_inverse::<S::Owner, S::Target>(rel) {
        Ok(inverse) => inverse,
        Err(e) => {
            if cfg.enforce_relations {
                return Err(e);
            }
            None
        }
    };
    let inverse_explicit = inverse.and_then(|r| r.foreign_key);

    let Some(fk_column) =
        meta::resolve_foreign_key(&origin, rel.foreign_key, inverse_explicit, &target)
    else {
        if rel.kind == RelationKind::ManyToOne && cfg.enforce_relations {
            return Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                format!(
                    "many-to-one requires a foreign key on '{}' referencing '{}'",
                    origin.type_name, target.type_name
                ),
            ));
        }
        // One-to-one held by the other side: reconciliation's concern.
        return Ok(());
    };

    // Read locks only here, so a self-referencing object does not
    // deadlock against its own write lock.
    let value = {
        let guard = read_obj(owner);
        S::get(&guard)
            .map(|child| read_obj(&child).primary_key())
            .unwrap_or(Value::Null)
    };

    let mut guard = write_obj(owner);
    guard.set_column(fk_column, value);
    Ok(())
}

/// Step (b): persist the row. Replace mode only applies when the key is
/// meaningful: auto-increment rows with unset keys are plain-inserted
/// (a replace without a key would target row zero).
async fn persist_new_row<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    element: &Obj<E>,
    replace: bool,
) -> Outcome<(), Error> {
    let (sql, params, generate_key) = {
        let guard = read_obj(element);
        let use_replace = replace && (!E::PRIMARY_KEY.auto_increment || !guard.is_new());
        let generate_key = E::PRIMARY_KEY.auto_increment && guard.is_new();
        let (sql, params) = store::build_insert::<E>(&guard, use_replace, !generate_key);
        (sql, params, generate_key)
    };

    let rowid = try_outcome!(conn.insert(cx, &sql, &params).await);
    if generate_key {
        write_obj(element).set_primary_key(Value::Integer(rowid));
    }
    Outcome::Ok(())
}

/// Refresh, update the existing row, and reconcile: the save operation
/// for an already-persisted object (no children are inserted).
pub(crate) async fn save_element<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    element: &Obj<E>,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    if let Err(e) = refresh_foreign_keys::<E>(element, cfg) {
        return Outcome::Err(e);
    }

    let (sql, params) = {
        let guard = read_obj(element);
        store::build_update::<E>(&guard)
    };
    try_outcome!(conn.execute(cx, &sql, &params).await);

    reconcile_relations::<E>(cx, conn, element, cfg).await
}

/// Step (c): reconcile every non-read-only relation whose other side
/// owns the foreign key.
pub(crate) async fn reconcile_relations<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    element: &Obj<E>,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    for rel in E::relations() {
        if rel.read_only {
            continue;
        }
        match &rel.ops {
            RelationOps::Reference(ops) if rel.kind == RelationKind::OneToOne => {
                try_outcome!(ops.reconcile(cx, conn, rel, element, cfg).await);
            }
            RelationOps::Collection(ops) => {
                try_outcome!(ops.reconcile(cx, conn, rel, element, cfg).await);
            }
            _ => {}
        }
    }
    Outcome::Ok(())
}

/// Reconcile a one-to-one relation whose key lives on the target side:
/// clear other referencing rows, point the current child at this object,
/// and stitch the in-memory key and inverse reference.
pub(crate) async fn reconcile_reference<S: ReferenceSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
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

    // Key on this side was already refreshed before the row persist.
    if meta::resolve_foreign_key(&origin, rel.foreign_key, inverse_explicit, &target).is_some() {
        return Outcome::Ok(());
    }

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

    let parent_key = read_obj(owner).primary_key();
    if parent_key.is_unset_key() {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                "cannot reconcile a relationship for an object without a primary key",
            ));
        }
        return Outcome::Ok(());
    }

    let clear_sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ?",
        quote_ident(target.table),
        quote_ident(fk_column),
        quote_ident(fk_column)
    );
    try_outcome!(
        conn.execute(cx, &clear_sql, std::slice::from_ref(&parent_key))
            .await
    );

    let child = {
        let guard = read_obj(owner);
        S::get(&guard)
    };
    if let Some(child) = child {
        let child_key = read_obj(&child).primary_key();
        if !child_key.is_unset_key() {
            let set_sql = format!(
                "UPDATE {} SET {} = ? WHERE {} = ?",
                quote_ident(target.table),
                quote_ident(fk_column),
                quote_ident(target.key.column)
            );
            try_outcome!(
                conn.execute(cx, &set_sql, &[parent_key.clone(), child_key])
                    .await
            );
        }

        let mut child_guard = write_obj(&child);
        child_guard.set_column(fk_column, parent_key);
        if let Some(inverse) = inverse {
            if let RelationOps::Reference(inverse_ops) = &inverse.ops {
                let owner_ref: &dyn Any = owner;
                if let Err(e) = inverse_ops.set_reference(inverse, &mut child_guard, Some(owner_ref))
                {
                    return Outcome::Err(e);
                }
            }
        }
    }

    Outcome::Ok(())
}

/// Reconcile a to-many relation against the database.
pub(crate) async fn reconcile_collection<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
    cfg: &EngineConfig,
) -> Outcome<(), Error> {
    match rel.kind {
        RelationKind::OneToMany => {
            reconcile_one_to_many::<S>(cx, conn, rel, owner, cfg).await
        }
        RelationKind::ManyToMany => reconcile_links::<S>(cx, conn, rel, owner, cfg).await,
        _ => Outcome::Ok(()),
    }
}

/// One-to-many: NULL out every currently-referencing child row, then
/// point the in-memory membership back at this object in chunked
/// updates, stitching keys and inverse references in memory.
///
/// A collection that was never populated is left alone; an explicitly
/// empty one clears membership.
async fn reconcile_one_to_many<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
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

    let resolved = meta::resolve_foreign_key(&target, rel.foreign_key, inverse_explicit, &origin);
    let fk_column = if cfg.enforce_relations {
        match meta::require_foreign_key(S::Owner::TYPE_NAME, rel.name, resolved, &target, &origin) {
            Ok(column) => column,
            Err(e) => return Outcome::Err(e),
        }
    } else {
        match resolved {
            Some(column) => column,
            None => return Outcome::Ok(()),
        }
    };

    let children = {
        let guard = read_obj(owner);
        S::get(&guard)
    };
    let Some(children) = children else {
        // Never populated: no database change attempted.
        return Outcome::Ok(());
    };

    let parent_key = read_obj(owner).primary_key();
    if parent_key.is_unset_key() {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                "cannot reconcile a relationship for an object without a primary key",
            ));
        }
        return Outcome::Ok(());
    }

    let clear_sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ?",
        quote_ident(target.table),
        quote_ident(fk_column),
        quote_ident(fk_column)
    );
    try_outcome!(
        conn.execute(cx, &clear_sql, std::slice::from_ref(&parent_key))
            .await
    );

    let child_keys: Vec<Value> = children
        .iter()
        .map(|child| read_obj(child).primary_key())
        .filter(|key| !key.is_unset_key())
        .collect();

    for chunk in in_chunks(&child_keys, 1, cfg.max_sql_params) {
        let set_sql = format!(
            "UPDATE {} SET {} = ? WHERE {} IN ({})",
            quote_ident(target.table),
            quote_ident(fk_column),
            quote_ident(target.key.column),
            placeholders(chunk.len())
        );
        let mut params = Vec::with_capacity(chunk.len() + 1);
        params.push(parent_key.clone());
        params.extend_from_slice(chunk);
        try_outcome!(conn.execute(cx, &set_sql, &params).await);
    }

    for child in &children {
        let mut child_guard = write_obj(child);
        child_guard.set_column(fk_column, parent_key.clone());
        if let Some(inverse) = inverse {
            if let RelationOps::Reference(inverse_ops) = &inverse.ops {
                let owner_ref: &dyn Any = owner;
                if let Err(e) = inverse_ops.set_reference(inverse, &mut child_guard, Some(owner_ref))
                {
                    return Outcome::Err(e);
                }
            }
        }
    }

    Outcome::Ok(())
}

/// Many-to-many: diff desired membership against the existing link rows,
/// inserting additions and deleting removals. Links that are already
/// correct are left untouched.
async fn reconcile_links<S: CollectionSpec>(
    cx: &Cx,
    conn: &dyn Executor,
    rel: &Relation<S::Owner>,
    owner: &Obj<S::Owner>,
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

    let children = {
        let guard = read_obj(owner);
        S::get(&guard)
    };
    let Some(children) = children else {
        return Outcome::Ok(());
    };

    let parent_key = read_obj(owner).primary_key();
    if parent_key.is_unset_key() {
        if cfg.enforce_relations {
            return Outcome::Err(Error::relation(
                S::Owner::TYPE_NAME,
                rel.name,
                "cannot reconcile a relationship for an object without a primary key",
            ));
        }
        return Outcome::Ok(());
    }

    let mut desired: Vec<Value> = Vec::new();
    for child in &children {
        let key = read_obj(child).primary_key();
        if !key.is_unset_key() && !desired.contains(&key) {
            desired.push(key);
        }
    }

    let existing_sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        quote_ident(link.dest_key),
        quote_ident(link.table),
        quote_ident(link.origin_key)
    );
    let rows = try_outcome!(
        conn.query(cx, &existing_sql, std::slice::from_ref(&parent_key))
            .await
    );
    let existing: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.get(0).cloned())
        .filter(|value| !value.is_null())
        .collect();

    let additions: Vec<&Value> = desired.iter().filter(|k| !existing.contains(k)).collect();
    let removals: Vec<Value> = existing
        .iter()
        .filter(|k| !desired.contains(k))
        .cloned()
        .collect();

    tracing::debug!(
        relation = rel.name,
        additions = additions.len(),
        removals = removals.len(),
        "link table diff"
    );

    let insert_sql = format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        quote_ident(link.table),
        quote_ident(link.origin_key),
        quote_ident(link.dest_key)
    );
    for addition in additions {
        try_outcome!(
            conn.execute(cx, &insert_sql, &[parent_key.clone(), addition.clone()])
                .await
        );
    }

    for chunk in in_chunks(&removals, 1, cfg.max_sql_params) {
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} IN ({})",
            quote_ident(link.table),
            quote_ident(link.origin_key),
            quote_ident(link.dest_key),
            placeholders(chunk.len())
        );
        let mut params = Vec::with_capacity(chunk.len() + 1);
        params.push(parent_key.clone());
        params.extend_from_slice(chunk);
        try_outcome!(conn.execute(cx, &delete_sql, &params).await);
    }

    Outcome::Ok(())
}
