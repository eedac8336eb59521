//! Call-scoped identity tracking.
//!
//! [`IdentityCache`] guarantees one in-memory instance per
//! (type, primary key) within a single recursive read: cyclic and
//! converging relationships resolve to identical handles, and a cache hit
//! terminates recursion into that subtree. The cache is created at the
//! start of each top-level read and discarded with it; it is not
//! process-wide state, and it owns nothing beyond `Arc` clones.
//!
//! [`VisitedSet`] is the write/delete-side analogue, keyed by handle
//! address so objects whose primary keys do not exist yet still dedupe.

use crate::relation::{Obj, read_obj};
use sqlweave_core::{Model, Value};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Hash a primary key value for use as an identity component.
pub fn hash_key(value: &Value) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    match value {
        Value::Null => 0_u8.hash(&mut hasher),
        Value::Integer(v) => {
            1_u8.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        Value::Real(v) => {
            2_u8.hash(&mut hasher);
            v.to_bits().hash(&mut hasher);
        }
        Value::Text(s) => {
            3_u8.hash(&mut hasher);
            s.hash(&mut hasher);
        }
        Value::Blob(b) => {
            4_u8.hash(&mut hasher);
            b.hash(&mut hasher);
        }
        Value::Uuid(u) => {
            5_u8.hash(&mut hasher);
            u.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// A type-erased entry: actually stores `Obj<M>` for some `M`.
type Entry = Box<dyn Any + Send + Sync>;

/// Identity map from (type, primary key) to the one materialized handle.
#[derive(Default)]
pub struct IdentityCache {
    entries: HashMap<(TypeId, u64), Entry>,
}

impl IdentityCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn slot<M: Model>(key: &Value) -> (TypeId, u64) {
        (TypeId::of::<M>(), hash_key(key))
    }

    /// Look up the cached handle for a primary key.
    pub fn get<M: Model>(&self, key: &Value) -> Option<Obj<M>> {
        let entry = self.entries.get(&Self::slot::<M>(key))?;
        entry.downcast_ref::<Obj<M>>().map(Arc::clone)
    }

    /// Check if a key is cached.
    pub fn contains<M: Model>(&self, key: &Value) -> bool {
        self.entries.contains_key(&Self::slot::<M>(key))
    }

    /// Register an existing handle under its primary key.
    ///
    /// Returns true when an entry for that key was already present (the
    /// existing entry is kept). Handles with unset keys are not
    /// cache-eligible and are never registered.
    pub fn admit<M: Model>(&mut self, handle: &Obj<M>) -> bool {
        let key = read_obj(handle).primary_key();
        if key.is_unset_key() {
            return false;
        }
        let slot = Self::slot::<M>(&key);
        if self.entries.contains_key(&slot) {
            return true;
        }
        self.entries.insert(slot, Box::new(Arc::clone(handle)));
        false
    }

    /// Materialize a freshly-read instance through the cache.
    ///
    /// Returns the canonical handle and whether the key was already
    /// present before this call (a hit short-circuits recursion into the
    /// subtree). Instances with unset keys bypass the cache entirely.
    pub fn fetch_or_insert<M: Model>(&mut self, fresh: M) -> (Obj<M>, bool) {
        let key = fresh.primary_key();
        if key.is_unset_key() {
            return (crate::relation::obj(fresh), false);
        }
        if let Some(existing) = self.get::<M>(&key) {
            return (existing, true);
        }
        let handle = crate::relation::obj(fresh);
        self.entries
            .insert(Self::slot::<M>(&key), Box::new(Arc::clone(&handle)));
        (handle, false)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Set of already-visited handles, keyed by (type, address).
///
/// Used by the insert and delete cascades for cycle safety: address
/// identity works even before an auto-increment key has been assigned.
#[derive(Default)]
pub struct VisitedSet {
    seen: HashSet<(TypeId, usize)>,
}

impl VisitedSet {
    /// Create a new empty set.
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    fn slot<M: 'static>(handle: &Obj<M>) -> (TypeId, usize) {
        (TypeId::of::<M>(), Arc::as_ptr(handle) as usize)
    }

    /// Mark a handle as visited. Returns true when it was not seen before.
    pub fn insert<M: 'static>(&mut self, handle: &Obj<M>) -> bool {
        self.seen.insert(Self::slot(handle))
    }

    /// Check whether a handle was already visited.
    pub fn contains<M: 'static>(&self, handle: &Obj<M>) -> bool {
        self.seen.contains(&Self::slot(handle))
    }

    /// Number of visited handles.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::obj;
    use sqlweave_core::{FieldInfo, KeyInfo, Result, Row, SqlType};

    #[derive(Debug, Clone, PartialEq)]
    struct Track {
        id: Option<i64>,
        title: String,
    }

    impl Model for Track {
        const TABLE_NAME: &'static str = "tracks";
        const TYPE_NAME: &'static str = "Track";
        const PRIMARY_KEY: KeyInfo = KeyInfo::auto("id");

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", SqlType::Integer)
                    .primary_key(true)
                    .auto_increment(true),
                FieldInfo::new("title", SqlType::Text),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", Value::from(self.id)),
                ("title", Value::Text(self.title.clone())),
            ]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                title: row.get_named("title")?,
            })
        }

        fn primary_key(&self) -> Value {
            Value::from(self.id)
        }

        fn set_primary_key(&mut self, key: Value) {
            self.id = key.as_i64();
        }

        fn get_column(&self, column: &str) -> Option<Value> {
            match column {
                "id" => Some(Value::from(self.id)),
                "title" => Some(Value::Text(self.title.clone())),
                _ => None,
            }
        }

        fn set_column(&mut self, column: &str, value: Value) -> bool {
            match column {
                "id" => {
                    self.id = value.as_i64();
                    true
                }
                "title" => {
                    self.title = value.as_str().unwrap_or_default().to_string();
                    true
                }
                _ => false,
            }
        }
    }

    #[test]
    fn fetch_or_insert_dedupes_by_key() {
        let mut cache = IdentityCache::new();

        let (first, hit) = cache.fetch_or_insert(Track {
            id: Some(1),
            title: "one".to_string(),
        });
        assert!(!hit);

        let (second, hit) = cache.fetch_or_insert(Track {
            id: Some(1),
            title: "duplicate read".to_string(),
        });
        assert!(hit);
        assert!(Arc::ptr_eq(&first, &second));
        // The first materialization wins.
        assert_eq!(read_obj(&second).title, "one");
    }

    #[test]
    fn unset_keys_bypass_the_cache() {
        let mut cache = IdentityCache::new();
        let (a, hit_a) = cache.fetch_or_insert(Track {
            id: None,
            title: "x".to_string(),
        });
        let (b, hit_b) = cache.fetch_or_insert(Track {
            id: None,
            title: "x".to_string(),
        });
        assert!(!hit_a);
        assert!(!hit_b);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
    }

    #[test]
    fn admit_registers_roots() {
        let mut cache = IdentityCache::new();
        let root = obj(Track {
            id: Some(7),
            title: "root".to_string(),
        });
        assert!(!cache.admit(&root));
        assert!(cache.admit(&root));

        let (again, hit) = cache.fetch_or_insert(Track {
            id: Some(7),
            title: "reread".to_string(),
        });
        assert!(hit);
        assert!(Arc::ptr_eq(&root, &again));
    }

    #[test]
    fn hash_key_distinguishes_values() {
        assert_eq!(hash_key(&Value::Integer(3)), hash_key(&Value::Integer(3)));
        assert_ne!(hash_key(&Value::Integer(3)), hash_key(&Value::Integer(4)));
        assert_ne!(
            hash_key(&Value::Text("3".to_string())),
            hash_key(&Value::Integer(3))
        );
    }

    #[test]
    fn visited_set_uses_address_identity() {
        let mut visited = VisitedSet::new();
        let a = obj(Track {
            id: None,
            title: "a".to_string(),
        });
        let b = obj(Track {
            id: None,
            title: "a".to_string(),
        });

        assert!(visited.insert(&a));
        assert!(!visited.insert(&a));
        assert!(visited.insert(&b));
        assert_eq!(visited.len(), 2);
    }
}
