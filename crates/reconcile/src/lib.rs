//! # Reconcile
//!
//! Computes the minimal write that brings a remote object's configuration
//! in line with what the user declared.
//!
//! ## Core Concepts
//!
//! - **Declared / Observed**: tri-state declared values (unresolved, absent,
//!   concrete) compared against the last observed remote state
//! - **Origin**: whether the object was created blank or cloned; cloned
//!   objects keep attributes the user never declared
//! - **ObjectSchema**: attribute-descriptor table walked by the engine
//! - **UpdateOperation**: assignments, removals and per-collection slot
//!   changes for a single combined remote write
//!
//! ## Example
//!
//! ```
//! use reconcile::{
//!     AttributeSpec, DeclaredObject, ObjectSchema, ObservedObject, Origin, ScalarKind, plan,
//! };
//!
//! let schema = ObjectSchema::new()
//!     .attribute(AttributeSpec::new("cores", ScalarKind::Int))
//!     .attribute(AttributeSpec::new("sockets", ScalarKind::Int));
//!
//! let declared = DeclaredObject::new().with_scalar("cores", 4_i64);
//! let observed = ObservedObject::new()
//!     .with_scalar("cores", 2_i64)
//!     .with_scalar("sockets", 2_i64);
//!
//! let op = plan(&schema, &declared, &observed, Origin::Created)?;
//! assert_eq!(op.assignments().len(), 1);
//! assert!(op.removals().contains("sockets"));
//! # Ok::<(), reconcile::Error>(())
//! ```
//!
//! Problems found while planning are collected as [`Diagnostic`]s; an object
//! with any diagnostic is rejected whole and nothing should be written.

pub mod aggregate;
pub mod batch;
pub mod collection;
pub mod composite;
pub mod engine;
pub mod error;
pub mod operation;
pub mod scalar;
pub mod schema;
pub mod value;

// Re-export main types at crate root
pub use aggregate::Aggregator;
pub use batch::{BatchObserver, PlanRequest, Silent, plan_batch, plan_batch_with};
pub use composite::CompositeInstruction;
pub use engine::{plan, plan_create};
pub use error::{Diagnostic, Diagnostics, Error, Result, join_path};
pub use operation::{Body, CollectionChanges, FieldValue, SlotUpdate, UpdateOperation};
pub use schema::{AttributeSpec, CollectionSpec, CompositeSpec, Granularity, ObjectSchema};
pub use value::{
    Declared, DeclaredFields, DeclaredObject, Fields, Instruction, Observed, ObservedObject,
    Origin, Scalar, ScalarKind, SlotKey,
};
