#![forbid(unsafe_code)]

//! Runtime: expression trees, active node graphs, and typed handles.
//!
//! # Role in livex
//! `livex-runtime` turns an expression tree over [`livex_core::Value`]s into
//! a graph of interned active nodes that keep their results current as the
//! objects they read from raise change notifications.
//!
//! # Primary responsibilities
//! - **Expr / Lambda**: immutable, structurally hashed operation trees with
//!   parameter binding.
//! - **Descriptors**: members, indexers, methods and constructors, compared
//!   by identity.
//! - **Operators**: unary, binary and short-circuit semantics with faults in
//!   place of panics.
//! - **Active nodes**: one interned node per (kind, operands, descriptor,
//!   options), shared across graphs and reference counted.
//! - **ActiveExpression**: the typed root handle with `"Value"` / `"Fault"`
//!   change notification.
//! - **ActiveOptions**: which computed values the graph owns and disposes.
//!
//! # How it fits in the system
//! Callers build an [`Expr`] (usually wrapped in a [`Lambda`]), then create
//! an [`ActiveExpression`] through an [`Engine`]. The engine builds or reuses
//! nodes bottom-up; each node subscribes to its operands and to the runtime
//! value it reads through. Changes propagate upward synchronously on the
//! thread that raised them.

mod bridge;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod handle;
mod intern;
mod node;
pub mod ops;
pub mod options;

pub use descriptor::{Constructor, DescriptorId, Indexer, Member, Method};
pub use engine::{Engine, NodeHandle};
pub use error::{ConstructionError, OptionsError};
pub use expr::{Expr, ExprKind, Lambda};
pub use handle::ActiveExpression;
pub use node::{NodeChanged, NodeKind};
pub use ops::{
    BinaryOperator, LogicalOperator, UnaryOperator, apply_binary, apply_typed_binary, apply_unary,
};
pub use options::ActiveOptions;
