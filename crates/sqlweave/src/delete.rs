//! Cascade-delete engine.
//!
//! A single in-memory pass gathers every object reachable over
//! cascade-delete, non-read-only edges into a dedup plan (to-one edges
//! are just singleton collections here), then one chunked bulk DELETE
//! runs per distinct table. No per-object statements are ever issued.

use crate::chunk::{in_chunks, placeholders};
use crate::exec::Executor;
use crate::ident::VisitedSet;
use crate::relation::{Obj, Related, RelationOps, read_obj};
use crate::try_outcome;
use crate::weave::EngineConfig;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Model, Value, quote_ident};

/// Pending deletions, grouped by table.
#[derive(Default)]
pub struct DeletePlan {
    groups: Vec<(&'static str, &'static str, Vec<Value>)>,
}

impl DeletePlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    /// Queue one row for deletion. Unset keys identify no row and are
    /// dropped; duplicate keys within a table collapse.
    pub fn add(&mut self, table: &'static str, key_column: &'static str, key: Value) {
        if key.is_unset_key() {
            return;
        }
        if let Some((_, _, keys)) = self.groups.iter_mut().find(|(t, _, _)| *t == table) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        } else {
            self.groups.push((table, key_column, vec![key]));
        }
    }

    /// Total number of queued rows.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, _, keys)| keys.len()).sum()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Gather `element` and everything reachable from it over cascade-delete
/// edges into the plan. Already-visited handles terminate the walk.
pub(crate) fn collect_graph<E: Related>(
    element: &Obj<E>,
    visited: &mut VisitedSet,
    plan: &mut DeletePlan,
) {
    if !visited.insert(element) {
        return;
    }

    let guard = read_obj(element);
    plan.add(E::TABLE_NAME, E::PRIMARY_KEY.column, guard.primary_key());

    for rel in E::relations() {
        if !rel.cascade.delete || rel.read_only {
            continue;
        }
        match &rel.ops {
            RelationOps::Reference(ops) => ops.collect_removals(rel, &guard, visited, plan),
            RelationOps::Collection(ops) => ops.collect_removals(rel, &guard, visited, plan),
            RelationOps::Blob(_) => {}
        }
    }
}

/// Run the plan: one chunked bulk DELETE per table.
pub(crate) async fn execute_plan(
    cx: &Cx,
    conn: &dyn Executor,
    plan: &DeletePlan,
    cfg: &EngineConfig,
) -> Outcome<u64, Error> {
    let mut total = 0_u64;
    for (table, key_column, keys) in &plan.groups {
        tracing::debug!(table, rows = keys.len(), "bulk delete");
        for chunk in in_chunks(keys, 0, cfg.max_sql_params) {
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                quote_ident(table),
                quote_ident(key_column),
                placeholders(chunk.len())
            );
            total += try_outcome!(conn.execute(cx, &sql, chunk).await);
        }
    }
    Outcome::Ok(total)
}

/// Delete the given elements; with `recursive`, also everything
/// reachable over cascade-delete edges.
pub(crate) async fn delete_graph<E: Related>(
    cx: &Cx,
    conn: &dyn Executor,
    elements: &[Obj<E>],
    recursive: bool,
    cfg: &EngineConfig,
) -> Outcome<u64, Error> {
    let mut plan = DeletePlan::new();
    if recursive {
        let mut visited = VisitedSet::new();
        for element in elements {
            collect_graph::<E>(element, &mut visited, &mut plan);
        }
    } else {
        for element in elements {
            plan.add(
                E::TABLE_NAME,
                E::PRIMARY_KEY.column,
                read_obj(element).primary_key(),
            );
        }
    }
    execute_plan(cx, conn, &plan, cfg).await
}

/// Non-cascading bulk delete by primary key values.
pub(crate) async fn delete_keys<E: Model>(
    cx: &Cx,
    conn: &dyn Executor,
    keys: &[Value],
    cfg: &EngineConfig,
) -> Outcome<u64, Error> {
    let mut total = 0_u64;
    for chunk in in_chunks(keys, 0, cfg.max_sql_params) {
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_ident(E::TABLE_NAME),
            quote_ident(E::PRIMARY_KEY.column),
            placeholders(chunk.len())
        );
        total += try_outcome!(conn.execute(cx, &sql, chunk).await);
    }
    Outcome::Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_groups_by_table_and_dedupes() {
        let mut plan = DeletePlan::new();
        plan.add("posts", "id", Value::Integer(1));
        plan.add("posts", "id", Value::Integer(2));
        plan.add("posts", "id", Value::Integer(1));
        plan.add("authors", "id", Value::Integer(1));

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.groups.len(), 2);
    }

    #[test]
    fn plan_drops_unset_keys() {
        let mut plan = DeletePlan::new();
        plan.add("posts", "id", Value::Null);
        plan.add("posts", "id", Value::Integer(0));
        assert!(plan.is_empty());
    }
}
