#![forbid(unsafe_code)]

//! The engine: intern tables plus the entry points that create handles.
//!
//! # Design
//!
//! Every node and root lives in the [`Tables`] of one [`Engine`]. Handles
//! created through the same engine share subgraphs; separate engines never
//! do, which keeps tests isolated. [`Engine::global`] is the process-wide
//! engine used by [`ActiveExpression::create`].
//!
//! # Failure Modes
//!
//! - **Construction errors** (unbound parameters, argument or result type
//!   mismatches) are returned before any node is built.

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, LazyLock};

use livex_core::{Fault, FromValue, Subscription, Value, ValueType};
use tracing::{debug, trace};

use crate::error::ConstructionError;
use crate::expr::{Expr, Lambda};
use crate::handle::{ActiveExpression, ROOT_SHARD, RootInner, RootKey};
use crate::intern::{InternTable, NodeRef};
use crate::node::{ActiveNode, NodeChanged, NodeKey, NodeKind, factory};
use crate::options::{ActiveOptions, OptionsKey};

pub(crate) struct Tables {
    pub(crate) nodes: InternTable<NodeKey, ActiveNode>,
    pub(crate) roots: InternTable<RootKey, RootInner>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            nodes: InternTable::new(NodeKind::COUNT),
            roots: InternTable::new(1),
        }
    }
}

/// A set of intern tables; handles created through one engine share nodes.
#[derive(Clone, Default)]
pub struct Engine {
    tables: Arc<Tables>,
}

static GLOBAL: LazyLock<Engine> = LazyLock::new(Engine::new);

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide engine.
    #[must_use]
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    /// Number of active nodes currently interned.
    #[must_use]
    pub fn live_node_count(&self) -> usize {
        self.tables.nodes.len()
    }

    /// Number of distinct root handles currently alive.
    #[must_use]
    pub fn live_root_count(&self) -> usize {
        self.tables.roots.len()
    }

    /// Create (or share) the handle for `lambda` applied to `args`.
    pub fn create<T: FromValue>(
        &self,
        lambda: &Lambda,
        args: &[Value],
    ) -> Result<ActiveExpression<T>, ConstructionError> {
        self.create_root(lambda, args, None)
    }

    /// Like [`Engine::create`], with disposal options. The options are
    /// frozen by this call.
    pub fn create_with_options<T: FromValue>(
        &self,
        lambda: &Lambda,
        args: &[Value],
        options: Arc<ActiveOptions>,
    ) -> Result<ActiveExpression<T>, ConstructionError> {
        self.create_root(lambda, args, Some(options))
    }

    fn create_root<T: FromValue>(
        &self,
        lambda: &Lambda,
        args: &[Value],
        options: Option<Arc<ActiveOptions>>,
    ) -> Result<ActiveExpression<T>, ConstructionError> {
        let found = lambda.result_type();
        if !T::accepts(found) {
            return Err(ConstructionError::ResultType {
                expected: type_name::<T>(),
                found,
            });
        }
        if let Some(options) = &options {
            options.freeze();
        }

        let key = RootKey {
            lambda: lambda.clone(),
            args: args.into(),
            options: OptionsKey::of(options.as_ref()),
        };
        if let Some(inner) = self.tables.roots.acquire_existing(ROOT_SHARD, &key) {
            trace!(lambda = %lambda.body(), "root reused");
            return Ok(ActiveExpression::from_inner(inner));
        }

        let inner = RootInner::new(Arc::clone(&self.tables), key.clone(), options)?;
        match self.tables.roots.insert_or_acquire(ROOT_SHARD, key, inner) {
            Ok(inner) => {
                debug!(lambda = %lambda.body(), "root created");
                Ok(ActiveExpression::from_inner(inner))
            }
            Err((winner, ours)) => {
                ours.teardown();
                drop(ours);
                Ok(ActiveExpression::from_inner(winner))
            }
        }
    }

    /// Acquire the active node for a parameter-free tree directly.
    ///
    /// With `defer` set, a newly created node stays unevaluated until its
    /// value is first read.
    pub fn node(
        &self,
        expr: &Expr,
        options: Option<Arc<ActiveOptions>>,
        defer: bool,
    ) -> Result<NodeHandle, ConstructionError> {
        if let Some(options) = &options {
            options.freeze();
        }
        let node = factory::build(&self.tables, expr, options.as_ref(), defer)?;
        Ok(NodeHandle { node })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("live_nodes", &self.live_node_count())
            .field("live_roots", &self.live_root_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeHandle
// ---------------------------------------------------------------------------

/// A counted reference to one interned node.
///
/// Cloning adds a reference; the node is torn down when the last reference
/// (from handles or parent nodes) goes away.
#[derive(Clone)]
pub struct NodeHandle {
    node: NodeRef,
}

impl NodeHandle {
    fn node(&self) -> &ActiveNode {
        self.node.node()
    }

    /// Current value, or the result type's default when faulted.
    ///
    /// Reading a deferred node evaluates it.
    #[must_use]
    pub fn value(&self) -> Value {
        self.result()
            .unwrap_or_else(|_| self.node().result_type().default_value())
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.result().err()
    }

    pub fn result(&self) -> Result<Value, Fault> {
        self.node().read()
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.node().kind()
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.node().result_type()
    }

    /// Whether the node was created in deferred mode.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.node().is_deferred()
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.node().is_evaluated()
    }

    /// References held on this node by handles and parent nodes.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.node().ref_count()
    }

    /// Called after each re-evaluation that changed the value or fault.
    pub fn subscribe(
        &self,
        handler: impl Fn(&NodeChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.node().subscribe(handler)
    }

    /// Whether both handles refer to the same interned node.
    #[must_use]
    pub fn same_node(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(self.node.node(), other.node.node())
    }

    /// Source form of the tree annotated with each node's state.
    #[must_use]
    pub fn render(&self) -> String {
        self.node().render()
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
