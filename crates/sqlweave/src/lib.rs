//! Relationship resolution and cascading read/write engine.
//!
//! sqlweave extends a minimal row-store (`sqlweave-core`) with declared
//! relationships between mapped types: one-to-one, many-to-one,
//! one-to-many, many-to-many (through an intermediate table), and
//! serialized text-blob properties. Given that metadata, the engines load
//! object graphs with cycle-safe identity caching, mirror in-memory
//! relationship changes back into foreign-key columns, and cascade
//! inserts and deletes.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlweave::Weave;
//!
//! let weave = Weave::new(&conn);
//! let author = match weave
//!     .load_by_key_with_children::<Author>(&cx, 1.into(), true)
//!     .await
//! {
//!     Outcome::Ok(author) => author,
//!     other => return other,
//! };
//! ```

/// Propagate the non-`Ok` arms of an `Outcome`.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(v) => v,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}
pub(crate) use try_outcome;

pub mod chunk;
pub mod delete;
pub mod exec;
pub mod ident;
pub mod meta;
pub mod read;
pub mod relation;
pub mod weave;
pub(crate) mod write;

pub use chunk::in_chunks;
pub use exec::{BoxFuture, Executor};
pub use ident::{IdentityCache, VisitedSet};
pub use meta::{LinkInfo, resolve_foreign_key};
pub use relation::{
    BlobSpec, CascadeOps, CollectionSpec, EnclosedShape, InverseKind, Obj, ReferenceSpec,
    Related, Relation, RelationKind, obj,
};
pub use weave::{EngineConfig, Weave};
