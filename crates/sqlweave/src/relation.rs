//! Relationship metadata.
//!
//! Relationships are declared as const metadata tables on each model (via
//! [`Related::relations`]) and represented as a closed set of kinds. Each
//! relation carries a statically-dispatched accessor vtable monomorphized
//! from a per-relationship *spec* type, which gives the generic engines
//! typed get/set access to relationship properties (and a way to recurse
//! into the target type) without any runtime reflection.

use crate::delete::DeletePlan;
use crate::exec::{BoxFuture, Executor};
use crate::ident::{IdentityCache, VisitedSet};
use crate::weave::EngineConfig;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Model, ModelMeta, Result};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a model instance.
///
/// Relationship properties hold these handles, so a cyclic or converging
/// graph resolves to the *same* instance everywhere (`Arc::ptr_eq`) rather
/// than duplicated copies.
pub type Obj<T> = Arc<RwLock<T>>;

/// Wrap a model instance into a shared handle.
pub fn obj<T>(value: T) -> Obj<T> {
    Arc::new(RwLock::new(value))
}

/// Lock a handle for reading, recovering from poisoning.
pub fn read_obj<T>(handle: &Obj<T>) -> RwLockReadGuard<'_, T> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

/// Lock a handle for writing, recovering from poisoning.
pub fn write_obj<T>(handle: &Obj<T>) -> RwLockWriteGuard<'_, T> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cascade flags for a relationship. Read, insert, and delete cascades
/// toggle independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeOps {
    pub read: bool,
    pub insert: bool,
    pub delete: bool,
}

impl CascadeOps {
    /// No cascade operations.
    pub const NONE: Self = Self {
        read: false,
        insert: false,
        delete: false,
    };

    /// Cascade reads only.
    pub const READ: Self = Self {
        read: true,
        insert: false,
        delete: false,
    };

    /// Cascade reads, inserts, and deletes.
    pub const ALL: Self = Self {
        read: true,
        insert: true,
        delete: true,
    };

    /// Toggle cascade read.
    pub const fn read(mut self, value: bool) -> Self {
        self.read = value;
        self
    }

    /// Toggle cascade insert.
    pub const fn insert(mut self, value: bool) -> Self {
        self.insert = value;
        self
    }

    /// Toggle cascade delete.
    pub const fn delete(mut self, value: bool) -> Self {
        self.delete = value;
        self
    }
}

/// The kind of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Scalar reference; either side may hold the foreign key.
    OneToOne,
    /// Scalar reference; this side holds the foreign key.
    ManyToOne,
    /// Collection reference; the other side holds the foreign key.
    OneToMany,
    /// Collection reference through an intermediate table.
    ManyToMany,
    /// Serialized property stored in a sibling text column. Not a
    /// relational edge: no cascade operation ever applies.
    TextBlob,
}

/// How the inverse property on the target type is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InverseKind {
    /// Scan the target's relations for the first one pointing back.
    #[default]
    Auto,
    /// Explicit inverse property name.
    Named(&'static str),
    /// Explicitly no inverse.
    None,
}

/// Declared collection shape of a to-many property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnclosedShape {
    /// Bare reference (to-one).
    Scalar,
    /// Ordered, growable list (`Vec`).
    #[default]
    List,
    /// Fixed-size array (boxed slice).
    Array,
    /// Change-observable collection.
    Observable,
}

/// Accessor spec for a to-one relationship property.
///
/// Implemented by a unit type per relationship; the get/set pair is the
/// compile-time replacement for reflective property access.
pub trait ReferenceSpec: Send + Sync + 'static {
    type Owner: Related;
    type Target: Related;

    /// Read the referenced handle, if any.
    fn get(owner: &Self::Owner) -> Option<Obj<Self::Target>>;

    /// Replace the referenced handle.
    fn set(owner: &mut Self::Owner, value: Option<Obj<Self::Target>>);
}

/// Accessor spec for a to-many relationship property.
///
/// `None` means the collection was never populated; `Some(vec![])` is a
/// populated-but-empty collection. The two are distinct on the write path.
pub trait CollectionSpec: Send + Sync + 'static {
    type Owner: Related;
    type Target: Related;

    /// Read the collection as handles, if populated.
    fn get(owner: &Self::Owner) -> Option<Vec<Obj<Self::Target>>>;

    /// Replace the collection (materializing into the declared shape).
    fn set(owner: &mut Self::Owner, value: Option<Vec<Obj<Self::Target>>>);
}

/// Accessor spec for a text-blob property.
pub trait BlobSpec: Send + Sync + 'static {
    type Owner: Related;

    /// The sibling text column holding the serialized form.
    const COLUMN: &'static str;

    /// Serialize the property into the sibling column field.
    #[allow(clippy::result_large_err)]
    fn pack(owner: &mut Self::Owner) -> Result<()>;

    /// Deserialize the sibling column field into the property.
    #[allow(clippy::result_large_err)]
    fn unpack(owner: &mut Self::Owner) -> Result<()>;
}

/// A model type with declared relationships.
pub trait Related: Model {
    /// Relationship metadata for this model.
    fn relations() -> &'static [Relation<Self>];

    /// Find a relationship by property name.
    fn relation(name: &str) -> Option<&'static Relation<Self>> {
        Self::relations().iter().find(|r| r.name == name)
    }
}

/// Type-erased engine operations for a to-one relationship.
pub trait ReferenceOps<T: Model>: Send + Sync {
    /// Metadata of the target model.
    fn target_meta(&self) -> ModelMeta;

    /// Set the reference from an erased handle (used for inverse
    /// stitching; the handle must be an `Obj` of the target type).
    #[allow(clippy::result_large_err)]
    fn set_reference(
        &self,
        rel: &Relation<T>,
        owner: &mut T,
        reference: Option<&dyn Any>,
    ) -> Result<()>;

    /// Copy the referenced object's key into the owner's foreign-key
    /// column, when this side holds the key. Takes the handle (not a
    /// guard) so self-referencing objects do not deadlock on their own
    /// lock.
    #[allow(clippy::result_large_err)]
    fn refresh_foreign_key(
        &self,
        rel: &Relation<T>,
        owner: &Obj<T>,
        cfg: &EngineConfig,
    ) -> Result<()>;

    /// Cascade-load this relationship for a batch of parents.
    fn load<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        parents: &'a [Obj<T>],
        recursive: bool,
        cache: &'a mut IdentityCache,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Cascade-insert the referenced object (and, recursively, its own
    /// cascade-insertable children).
    fn insert_subtree<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        owner: &'a Obj<T>,
        replace: bool,
        recursive: bool,
        visited: &'a mut VisitedSet,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Reconcile the database when the *other* side owns the foreign key
    /// (one-to-one with inverse key). No-op otherwise.
    fn reconcile<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        owner: &'a Obj<T>,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Gather cascade-deletable objects reachable through this edge.
    fn collect_removals(
        &self,
        rel: &Relation<T>,
        owner: &T,
        visited: &mut VisitedSet,
        plan: &mut DeletePlan,
    );
}

/// Type-erased engine operations for a to-many relationship.
pub trait CollectionOps<T: Model>: Send + Sync {
    /// Metadata of the target model.
    fn target_meta(&self) -> ModelMeta;

    /// Cascade-load this relationship for a batch of parents.
    fn load<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        parents: &'a [Obj<T>],
        recursive: bool,
        cache: &'a mut IdentityCache,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Cascade-insert the collection members.
    fn insert_subtree<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        owner: &'a Obj<T>,
        replace: bool,
        recursive: bool,
        visited: &'a mut VisitedSet,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Reconcile database membership against the in-memory collection.
    fn reconcile<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<T>,
        owner: &'a Obj<T>,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Gather cascade-deletable objects reachable through this edge.
    fn collect_removals(
        &self,
        rel: &Relation<T>,
        owner: &T,
        visited: &mut VisitedSet,
        plan: &mut DeletePlan,
    );
}

/// Type-erased operations for a text-blob property.
pub trait BlobOps<T: Model>: Send + Sync {
    /// The sibling text column name.
    fn column(&self) -> &'static str;

    /// Serialize into the sibling column field.
    #[allow(clippy::result_large_err)]
    fn pack(&self, owner: &mut T) -> Result<()>;

    /// Deserialize from the sibling column field.
    #[allow(clippy::result_large_err)]
    fn unpack(&self, owner: &mut T) -> Result<()>;
}

/// The per-kind operations vtable of a relation.
pub enum RelationOps<T: Model> {
    Reference(&'static dyn ReferenceOps<T>),
    Collection(&'static dyn CollectionOps<T>),
    Blob(&'static dyn BlobOps<T>),
}

/// Metadata about one declared relationship.
pub struct Relation<T: Model> {
    /// Name of the relationship property.
    pub name: &'static str,
    /// Kind of relationship.
    pub kind: RelationKind,
    /// Cascade flags.
    pub cascade: CascadeOps,
    /// Excluded from foreign-key refresh and cascade insert (but not from
    /// cascade read).
    pub read_only: bool,
    /// Explicit foreign-key column for the declared direction.
    pub foreign_key: Option<&'static str>,
    /// Inverse property resolution.
    pub inverse: InverseKind,
    /// Declared collection shape.
    pub shape: EnclosedShape,
    /// Metadata accessor for the intermediate model (many-to-many only).
    pub intermediate: Option<fn() -> ModelMeta>,
    /// Engine operations.
    pub ops: RelationOps<T>,
}

impl<T: Model> Relation<T> {
    /// Declare a one-to-one relationship.
    pub const fn one_to_one<S>(name: &'static str) -> Self
    where
        S: ReferenceSpec<Owner = T>,
    {
        Self::reference::<S>(name, RelationKind::OneToOne)
    }

    /// Declare a many-to-one relationship (this side holds the key).
    pub const fn many_to_one<S>(name: &'static str) -> Self
    where
        S: ReferenceSpec<Owner = T>,
    {
        Self::reference::<S>(name, RelationKind::ManyToOne)
    }

    const fn reference<S>(name: &'static str, kind: RelationKind) -> Self
    where
        S: ReferenceSpec<Owner = T>,
    {
        Self {
            name,
            kind,
            cascade: CascadeOps::NONE,
            read_only: false,
            foreign_key: None,
            inverse: InverseKind::Auto,
            shape: EnclosedShape::Scalar,
            intermediate: None,
            ops: RelationOps::Reference(&ReferenceRelation::<S>::INSTANCE),
        }
    }

    /// Declare a one-to-many relationship (the other side holds the key).
    pub const fn one_to_many<S>(name: &'static str) -> Self
    where
        S: CollectionSpec<Owner = T>,
    {
        Self {
            name,
            kind: RelationKind::OneToMany,
            cascade: CascadeOps::NONE,
            read_only: false,
            foreign_key: None,
            inverse: InverseKind::Auto,
            shape: EnclosedShape::List,
            intermediate: None,
            ops: RelationOps::Collection(&CollectionRelation::<S>::INSTANCE),
        }
    }

    /// Declare a many-to-many relationship through the intermediate model
    /// `I`, which must carry one foreign key to each side.
    pub const fn many_to_many<S, I>(name: &'static str) -> Self
    where
        S: CollectionSpec<Owner = T>,
        I: Model,
    {
        Self {
            name,
            kind: RelationKind::ManyToMany,
            cascade: CascadeOps::NONE,
            read_only: false,
            foreign_key: None,
            inverse: InverseKind::Auto,
            shape: EnclosedShape::List,
            intermediate: Some(I::meta as fn() -> ModelMeta),
            ops: RelationOps::Collection(&CollectionRelation::<S>::INSTANCE),
        }
    }

    /// Declare a text-blob property serialized into a sibling column.
    pub const fn text_blob<S>(name: &'static str) -> Self
    where
        S: BlobSpec<Owner = T>,
    {
        Self {
            name,
            kind: RelationKind::TextBlob,
            cascade: CascadeOps::NONE,
            read_only: false,
            foreign_key: None,
            inverse: InverseKind::None,
            shape: EnclosedShape::Scalar,
            intermediate: None,
            ops: RelationOps::Blob(&BlobRelation::<S>::INSTANCE),
        }
    }

    /// Set the explicit foreign-key column for the declared direction.
    pub const fn foreign_key(mut self, column: &'static str) -> Self {
        self.foreign_key = Some(column);
        self
    }

    /// Set the explicit inverse property name.
    pub const fn inverse(mut self, name: &'static str) -> Self {
        self.inverse = InverseKind::Named(name);
        self
    }

    /// Declare that no inverse property exists.
    pub const fn no_inverse(mut self) -> Self {
        self.inverse = InverseKind::None;
        self
    }

    /// Set the cascade flags.
    pub const fn cascade(mut self, ops: CascadeOps) -> Self {
        self.cascade = ops;
        self
    }

    /// Mark the relationship read-only.
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Set the declared collection shape.
    pub const fn shape(mut self, shape: EnclosedShape) -> Self {
        self.shape = shape;
        self
    }

    /// Metadata of the target model (`None` for text blobs).
    pub fn target_meta(&self) -> Option<ModelMeta> {
        match &self.ops {
            RelationOps::Reference(ops) => Some(ops.target_meta()),
            RelationOps::Collection(ops) => Some(ops.target_meta()),
            RelationOps::Blob(_) => None,
        }
    }

    /// Whether this relation is a relational edge (not a text blob).
    pub fn is_edge(&self) -> bool {
        !matches!(self.kind, RelationKind::TextBlob)
    }
}

impl<T: Model> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cascade", &self.cascade)
            .field("read_only", &self.read_only)
            .field("foreign_key", &self.foreign_key)
            .field("inverse", &self.inverse)
            .finish()
    }
}

// ============================================================================
// Spec adapters
// ============================================================================
//
// Zero-sized adapters binding a user spec type to the engine algorithms.
// The `&'static dyn` vtables in relation declarations are references to
// these promoted instances.

pub(crate) struct ReferenceRelation<S>(PhantomData<S>);

impl<S> ReferenceRelation<S> {
    pub(crate) const INSTANCE: Self = Self(PhantomData);
}

impl<S: ReferenceSpec> ReferenceOps<S::Owner> for ReferenceRelation<S> {
    fn target_meta(&self) -> ModelMeta {
        S::Target::meta()
    }

    fn set_reference(
        &self,
        rel: &Relation<S::Owner>,
        owner: &mut S::Owner,
        reference: Option<&dyn Any>,
    ) -> Result<()> {
        match reference {
            None => {
                S::set(owner, None);
                Ok(())
            }
            Some(any) => match any.downcast_ref::<Obj<S::Target>>() {
                Some(handle) => {
                    S::set(owner, Some(Arc::clone(handle)));
                    Ok(())
                }
                None => Err(Error::relation(
                    S::Owner::TYPE_NAME,
                    rel.name,
                    format!("inverse reference is not a '{}'", S::Target::TYPE_NAME),
                )),
            },
        }
    }

    fn refresh_foreign_key(
        &self,
        rel: &Relation<S::Owner>,
        owner: &Obj<S::Owner>,
        cfg: &EngineConfig,
    ) -> Result<()> {
        crate::write::refresh_reference::<S>(rel, owner, cfg)
    }

    fn load<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        parents: &'a [Obj<S::Owner>],
        recursive: bool,
        cache: &'a mut IdentityCache,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::read::load_reference::<S>(
            cx, conn, rel, parents, recursive, cache, cfg,
        ))
    }

    fn insert_subtree<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        owner: &'a Obj<S::Owner>,
        replace: bool,
        recursive: bool,
        visited: &'a mut VisitedSet,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::write::insert_reference_subtree::<S>(
            cx, conn, rel, owner, replace, recursive, visited, cfg,
        ))
    }

    fn reconcile<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        owner: &'a Obj<S::Owner>,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::write::reconcile_reference::<S>(
            cx, conn, rel, owner, cfg,
        ))
    }

    fn collect_removals(
        &self,
        _rel: &Relation<S::Owner>,
        owner: &S::Owner,
        visited: &mut VisitedSet,
        plan: &mut DeletePlan,
    ) {
        if let Some(child) = S::get(owner) {
            crate::delete::collect_graph::<S::Target>(&child, visited, plan);
        }
    }
}

pub(crate) struct CollectionRelation<S>(PhantomData<S>);

impl<S> CollectionRelation<S> {
    pub(crate) const INSTANCE: Self = Self(PhantomData);
}

impl<S: CollectionSpec> CollectionOps<S::Owner> for CollectionRelation<S> {
    fn target_meta(&self) -> ModelMeta {
        S::Target::meta()
    }

    fn load<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        parents: &'a [Obj<S::Owner>],
        recursive: bool,
        cache: &'a mut IdentityCache,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::read::load_collection::<S>(
            cx, conn, rel, parents, recursive, cache, cfg,
        ))
    }

    fn insert_subtree<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        owner: &'a Obj<S::Owner>,
        replace: bool,
        recursive: bool,
        visited: &'a mut VisitedSet,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::write::insert_collection_subtree::<S>(
            cx, conn, rel, owner, replace, recursive, visited, cfg,
        ))
    }

    fn reconcile<'a>(
        &'a self,
        cx: &'a Cx,
        conn: &'a dyn Executor,
        rel: &'a Relation<S::Owner>,
        owner: &'a Obj<S::Owner>,
        cfg: &'a EngineConfig,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(crate::write::reconcile_collection::<S>(
            cx, conn, rel, owner, cfg,
        ))
    }

    fn collect_removals(
        &self,
        _rel: &Relation<S::Owner>,
        owner: &S::Owner,
        visited: &mut VisitedSet,
        plan: &mut DeletePlan,
    ) {
        if let Some(children) = S::get(owner) {
            for child in &children {
                crate::delete::collect_graph::<S::Target>(child, visited, plan);
            }
        }
    }
}

pub(crate) struct BlobRelation<S>(PhantomData<S>);

impl<S> BlobRelation<S> {
    pub(crate) const INSTANCE: Self = Self(PhantomData);
}

impl<S: BlobSpec> BlobOps<S::Owner> for BlobRelation<S> {
    fn column(&self) -> &'static str {
        S::COLUMN
    }

    fn pack(&self, owner: &mut S::Owner) -> Result<()> {
        S::pack(owner)
    }

    fn unpack(&self, owner: &mut S::Owner) -> Result<()> {
        S::unpack(owner)
    }
}
