//! The caller-facing facade.
//!
//! `Weave` borrows a connection and drives the cascade engines over it.
//! Configuration is explicit and engine-scoped; there is no process-wide
//! state, and two `Weave` values over the same connection are independent
//! (each top-level read gets its own identity cache).

use crate::delete;
use crate::exec::Executor;
use crate::ident::IdentityCache;
use crate::read;
use crate::relation::{Obj, Related, obj};
use crate::try_outcome;
use crate::write;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Connection, Error, Model, Value, store};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Raise configuration errors for unresolvable relationship metadata.
    /// Disabling skips the checks (and the misconfigured relationships)
    /// for production deployments that accept undefined behavior there.
    pub enforce_relations: bool,
    /// Ceiling on bound parameters per statement; every `IN (...)` bulk
    /// operation is chunked to stay under it.
    pub max_sql_params: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_relations: true,
            // SQLite's historical SQLITE_MAX_VARIABLE_NUMBER.
            max_sql_params: 999,
        }
    }
}

/// Relationship-aware operations over a borrowed connection.
pub struct Weave<'c, C: Connection> {
    conn: &'c C,
    config: EngineConfig,
}

impl<'c, C: Connection> Weave<'c, C> {
    /// Wrap a connection with the default configuration.
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            config: EngineConfig::default(),
        }
    }

    /// Wrap a connection with an explicit configuration.
    pub fn with_config(conn: &'c C, config: EngineConfig) -> Self {
        Self { conn, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &'c C {
        self.conn
    }

    fn executor(&self) -> &dyn Executor {
        self.conn
    }

    /// Populate the declared relationships of one element.
    ///
    /// With `recursive = false`, exactly one level of every relationship
    /// loads regardless of cascade flags; with `recursive = true`,
    /// cascade-read edges are followed until cycles or already-seen
    /// objects terminate the walk.
    pub async fn load_children<E: Related>(
        &self,
        cx: &Cx,
        element: &Obj<E>,
        recursive: bool,
    ) -> Outcome<(), Error> {
        self.load_children_all(cx, std::slice::from_ref(element), recursive)
            .await
    }

    /// Populate the declared relationships of a batch of siblings,
    /// sharing one identity cache (and therefore one instance per key)
    /// across the whole batch.
    pub async fn load_children_all<E: Related>(
        &self,
        cx: &Cx,
        elements: &[Obj<E>],
        recursive: bool,
    ) -> Outcome<(), Error> {
        let mut cache = IdentityCache::new();
        for element in elements {
            cache.admit(element);
        }
        read::load_relations::<E>(
            cx,
            self.executor(),
            elements,
            recursive,
            true,
            &mut cache,
            &self.config,
        )
        .await
    }

    /// Fetch a row by primary key and populate its relationships, or
    /// `None` when absent.
    pub async fn try_load_by_key_with_children<E: Related>(
        &self,
        cx: &Cx,
        key: Value,
        recursive: bool,
    ) -> Outcome<Option<Obj<E>>, Error> {
        let found = try_outcome!(store::try_get_by_key::<E, C>(cx, self.conn, &key).await);
        match found {
            None => Outcome::Ok(None),
            Some(instance) => {
                let handle = obj(instance);
                try_outcome!(self.load_children::<E>(cx, &handle, recursive).await);
                Outcome::Ok(Some(handle))
            }
        }
    }

    /// Fetch a row by primary key and populate its relationships,
    /// failing with [`Error::NotFound`] when absent.
    pub async fn load_by_key_with_children<E: Related>(
        &self,
        cx: &Cx,
        key: Value,
        recursive: bool,
    ) -> Outcome<Obj<E>, Error> {
        match self
            .try_load_by_key_with_children::<E>(cx, key.clone(), recursive)
            .await
        {
            Outcome::Ok(Some(handle)) => Outcome::Ok(handle),
            Outcome::Ok(None) => Outcome::Err(Error::NotFound {
                table: E::TABLE_NAME,
                key,
            }),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Fetch all rows (optionally restricted by a WHERE clause with `?`
    /// placeholders) and populate their relationships as one batch.
    pub async fn load_all_with_children<E: Related>(
        &self,
        cx: &Cx,
        filter: Option<(&str, &[Value])>,
        recursive: bool,
    ) -> Outcome<Vec<Obj<E>>, Error> {
        let (clause, params) = match filter {
            Some((clause, params)) => (Some(clause), params),
            None => (None, &[][..]),
        };
        let instances: Vec<E> =
            try_outcome!(store::query_as::<E, C>(cx, self.conn, clause, params).await);

        let mut cache = IdentityCache::new();
        let handles: Vec<Obj<E>> = instances
            .into_iter()
            .map(|instance| cache.fetch_or_insert(instance).0)
            .collect();

        try_outcome!(
            read::load_relations::<E>(
                cx,
                self.executor(),
                &handles,
                recursive,
                true,
                &mut cache,
                &self.config,
            )
            .await
        );
        Outcome::Ok(handles)
    }

    /// Refresh this object's foreign keys from its in-memory references,
    /// update its row, and reconcile inverse-owned relationships. No new
    /// children are inserted.
    pub async fn save_with_children<E: Related>(
        &self,
        cx: &Cx,
        element: &Obj<E>,
    ) -> Outcome<(), Error> {
        write::save_element::<E>(cx, self.executor(), element, &self.config).await
    }

    /// Insert an object after cascade-inserting its children (one level,
    /// or the whole reachable graph with `recursive`). `replace` uses
    /// INSERT OR REPLACE semantics for objects that carry a meaningful
    /// key.
    pub async fn insert_with_children<E: Related>(
        &self,
        cx: &Cx,
        element: &Obj<E>,
        replace: bool,
        recursive: bool,
    ) -> Outcome<(), Error> {
        write::insert_graph::<E>(
            cx,
            self.executor(),
            std::slice::from_ref(element),
            replace,
            recursive,
            &self.config,
        )
        .await
    }

    /// Batch variant of [`Weave::insert_with_children`]; overlapping
    /// graphs insert each object once.
    pub async fn insert_all_with_children<E: Related>(
        &self,
        cx: &Cx,
        elements: &[Obj<E>],
        replace: bool,
        recursive: bool,
    ) -> Outcome<(), Error> {
        write::insert_graph::<E>(cx, self.executor(), elements, replace, recursive, &self.config)
            .await
    }

    /// Delete objects; with `recursive`, also everything reachable over
    /// cascade-delete edges. Returns the number of rows deleted.
    pub async fn delete_with_children<E: Related>(
        &self,
        cx: &Cx,
        elements: &[Obj<E>],
        recursive: bool,
    ) -> Outcome<u64, Error> {
        delete::delete_graph::<E>(cx, self.executor(), elements, recursive, &self.config).await
    }

    /// Non-cascading bulk delete by primary key values.
    pub async fn delete_by_keys<E: Model>(&self, cx: &Cx, keys: &[Value]) -> Outcome<u64, Error> {
        delete::delete_keys::<E>(cx, self.executor(), keys, &self.config).await
    }
}
