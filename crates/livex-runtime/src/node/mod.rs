#![forbid(unsafe_code)]

//! Active nodes: interned, self-updating evaluations of one tree node.
//!
//! # Design
//!
//! An [`ActiveNode`] is created by the factory ([`factory::build`]) for one
//! (kind, operand identities, descriptor, options) key and shared by every
//! graph that needs it. It holds its current value or fault, subscribes to
//! the `changed` events of its operand nodes, and watches the runtime value
//! it reads from (see [`crate::bridge`]). When anything it depends on
//! changes it recomputes and raises its own `changed` event, so updates
//! bubble up through the graph synchronously on the notifying thread.
//!
//! # Invariants
//!
//! 1. After every evaluation exactly one of these holds: a fault is set and
//!    the value is the result type's default; no fault and the value is the
//!    computed result.
//! 2. A node evaluates at most once concurrently. A change arriving while an
//!    evaluation runs marks the node dirty and the running evaluation loops
//!    once more.
//! 3. The first evaluation never raises `changed`; nobody can have observed
//!    the prior default.
//! 4. A deferred node ignores notifications until its value is first read;
//!    that read evaluates exactly once under the node's init lock.
//! 5. Teardown runs at most once and drops subscriptions before releasing
//!    operand references.
//!
//! # Failure Modes
//!
//! - **Evaluation error**: any error from a descriptor or operator is captured
//!   as this node's fault, never returned or panicked.
//! - **Late notification**: a handler may fire after teardown started; it
//!   sees the torn-down flag and does nothing.

pub(crate) mod eval;
pub(crate) mod factory;
mod render;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use livex_core::{EventSource, Fault, Subscription, Value, ValueType};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::bridge::ValueWatch;
use crate::descriptor::{Constructor, DescriptorId, Indexer, Member, Method};
use crate::engine::Tables;
use crate::expr::Expr;
use crate::intern::NodeRef;
use crate::ops::{BinaryOperator, LogicalOperator, UnaryOperator};
use crate::options::{ActiveOptions, OptionsKey};

/// Which kind of tree node an active node evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Member,
    Index,
    Call,
    New,
    Unary,
    Binary,
    Conditional,
    Logical,
    Coalesce,
}

impl NodeKind {
    pub(crate) const COUNT: usize = 10;

    pub(crate) fn shard(self) -> usize {
        self as usize
    }
}

/// Payload of a node's change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeChanged {
    pub value_changed: bool,
    pub fault_changed: bool,
}

// ---------------------------------------------------------------------------
// Intern key
// ---------------------------------------------------------------------------

/// Identity of an interned node (its address).
pub(crate) type NodeId = usize;

pub(crate) fn node_id(node: &Arc<ActiveNode>) -> NodeId {
    Arc::as_ptr(node) as usize
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyShape {
    Constant {
        value: Value,
        ty: ValueType,
    },
    Member {
        receiver: Option<NodeId>,
        member: DescriptorId,
    },
    Index {
        receiver: NodeId,
        indexer: DescriptorId,
        args: SmallVec<[NodeId; 2]>,
    },
    Call {
        receiver: Option<NodeId>,
        method: DescriptorId,
        args: SmallVec<[NodeId; 4]>,
    },
    New {
        constructor: DescriptorId,
        args: SmallVec<[NodeId; 4]>,
    },
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Binary {
        op: BinaryOperator,
        left: NodeId,
        right: NodeId,
    },
    /// Branches are not built up front, so they are keyed by tree structure.
    Conditional {
        test: NodeId,
        if_true: Expr,
        if_false: Expr,
    },
    Logical {
        op: LogicalOperator,
        left: NodeId,
        right: Expr,
    },
    Coalesce {
        left: NodeId,
        right: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub(crate) shape: KeyShape,
    pub(crate) options: Option<OptionsKey>,
}

impl NodeKey {
    pub(crate) fn kind(&self) -> NodeKind {
        match self.shape {
            KeyShape::Constant { .. } => NodeKind::Constant,
            KeyShape::Member { .. } => NodeKind::Member,
            KeyShape::Index { .. } => NodeKind::Index,
            KeyShape::Call { .. } => NodeKind::Call,
            KeyShape::New { .. } => NodeKind::New,
            KeyShape::Unary { .. } => NodeKind::Unary,
            KeyShape::Binary { .. } => NodeKind::Binary,
            KeyShape::Conditional { .. } => NodeKind::Conditional,
            KeyShape::Logical { .. } => NodeKind::Logical,
            KeyShape::Coalesce { .. } => NodeKind::Coalesce,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind data
// ---------------------------------------------------------------------------

type Operand = Arc<ActiveNode>;

pub(crate) enum KindData {
    Constant(Value),
    Member {
        receiver: Option<Operand>,
        member: Member,
    },
    Index {
        receiver: Operand,
        indexer: Indexer,
        args: SmallVec<[Operand; 2]>,
    },
    Call {
        receiver: Option<Operand>,
        method: Method,
        args: SmallVec<[Operand; 4]>,
    },
    New {
        constructor: Constructor,
        args: SmallVec<[Operand; 4]>,
    },
    Unary {
        op: UnaryOperator,
        operand: Operand,
    },
    Binary {
        op: BinaryOperator,
        left: Operand,
        right: Operand,
    },
    Conditional {
        test: Operand,
        branches: [Expr; 2],
    },
    Logical {
        op: LogicalOperator,
        left: Operand,
        right: Expr,
    },
    Coalesce {
        left: Operand,
        right: Expr,
    },
}

impl KindData {
    /// Operands built eagerly with the node; short-circuit branches excluded.
    fn wired_operands(&self) -> SmallVec<[&Operand; 4]> {
        let mut out = SmallVec::new();
        match self {
            Self::Constant(_) => {}
            Self::Member { receiver, .. } => out.extend(receiver.iter()),
            Self::Index { receiver, args, .. } => {
                out.push(receiver);
                out.extend(args.iter());
            }
            Self::Call { receiver, args, .. } => {
                out.extend(receiver.iter());
                out.extend(args.iter());
            }
            Self::New { args, .. } => out.extend(args.iter()),
            Self::Unary { operand, .. } => out.push(operand),
            Self::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Self::Conditional { test, .. } => out.push(test),
            Self::Logical { left, .. } | Self::Coalesce { left, .. } => out.push(left),
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Node state
// ---------------------------------------------------------------------------

struct NodeState {
    value: Value,
    fault: Option<Fault>,
}

#[derive(Default)]
struct Gate {
    running: bool,
    pending: bool,
}

/// A lazily built short-circuit operand.
pub(crate) struct Branch {
    _subscription: Subscription,
    guard: NodeRef,
}

/// Everything a node releases on teardown. Fields drop in declaration
/// order: subscriptions first, then owning references.
#[derive(Default)]
pub(crate) struct Links {
    operand_subs: SmallVec<[Subscription; 4]>,
    watch: ValueWatch,
    branches: [Option<Branch>; 2],
    operands: Vec<NodeRef>,
}

pub(crate) struct ActiveNode {
    tables: Arc<Tables>,
    this: Weak<ActiveNode>,
    key: NodeKey,
    kind: NodeKind,
    expr: Expr,
    data: KindData,
    result_type: ValueType,
    options: Option<Arc<ActiveOptions>>,
    deferred: bool,
    owns_value: bool,
    state: RwLock<NodeState>,
    changed: EventSource<NodeChanged>,
    gate: Mutex<Gate>,
    wired: Mutex<bool>,
    evaluated: AtomicBool,
    torn_down: AtomicBool,
    links: Mutex<Links>,
}

pub(crate) struct NodeInit {
    pub(crate) tables: Arc<Tables>,
    pub(crate) key: NodeKey,
    pub(crate) expr: Expr,
    pub(crate) data: KindData,
    pub(crate) operands: Vec<NodeRef>,
    pub(crate) options: Option<Arc<ActiveOptions>>,
    pub(crate) deferred: bool,
    pub(crate) owns_value: bool,
}

impl ActiveNode {
    pub(crate) fn new(init: NodeInit) -> Arc<Self> {
        let result_type = init.expr.ty();
        Arc::new_cyclic(|this| Self {
            tables: init.tables,
            this: this.clone(),
            kind: init.key.kind(),
            key: init.key,
            expr: init.expr,
            data: init.data,
            result_type,
            options: init.options,
            deferred: init.deferred,
            owns_value: init.owns_value,
            state: RwLock::new(NodeState {
                value: result_type.default_value(),
                fault: None,
            }),
            changed: EventSource::new(),
            gate: Mutex::new(Gate::default()),
            wired: Mutex::new(false),
            evaluated: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            links: Mutex::new(Links {
                operands: init.operands,
                ..Links::default()
            }),
        })
    }

    // ---- accessors ----

    pub(crate) fn tables(&self) -> &Arc<Tables> {
        &self.tables
    }

    pub(crate) fn key(&self) -> &NodeKey {
        &self.key
    }

    pub(crate) fn shard(&self) -> usize {
        self.kind.shard()
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn expr(&self) -> &Expr {
        &self.expr
    }

    pub(crate) fn data(&self) -> &KindData {
        &self.data
    }

    pub(crate) fn weak(&self) -> Weak<ActiveNode> {
        self.this.clone()
    }

    pub(crate) fn result_type(&self) -> ValueType {
        self.result_type
    }

    pub(crate) fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub(crate) fn is_evaluated(&self) -> bool {
        self.evaluated.load(Ordering::Acquire)
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.tables.nodes.ref_count(self.shard(), &self.key)
    }

    // ---- reading ----

    /// Current result, evaluating first if this node has never evaluated.
    pub(crate) fn read(&self) -> Result<Value, Fault> {
        self.ensure_evaluated();
        let state = self.state.read();
        match &state.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(state.value.clone()),
        }
    }

    /// Current value without forcing evaluation.
    pub(crate) fn peek_value(&self) -> Value {
        self.state.read().value.clone()
    }

    pub(crate) fn peek_fault(&self) -> Option<Fault> {
        self.state.read().fault.clone()
    }

    pub(crate) fn subscribe(
        &self,
        handler: impl Fn(&NodeChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.changed.subscribe(handler)
    }

    /// Subscription that re-evaluates `dependent` whenever this node changes.
    fn subscribe_dependent(&self, dependent: Weak<ActiveNode>) -> Subscription {
        self.changed.subscribe(move |_| {
            if let Some(node) = dependent.upgrade() {
                node.on_dependency_changed();
            }
        })
    }

    // ---- lifecycle ----

    /// Wire operand subscriptions and evaluate unless `defer` is set.
    ///
    /// Every acquirer calls this; only the first call wires.
    pub(crate) fn activate(&self, defer: bool) {
        self.wire_once();
        if !defer {
            self.ensure_evaluated();
        }
    }

    fn wire_once(&self) {
        let mut wired = self.wired.lock();
        if !*wired {
            self.wire();
            *wired = true;
        }
    }

    fn wire(&self) {
        let subs: SmallVec<[Subscription; 4]> = self
            .data
            .wired_operands()
            .into_iter()
            .map(|operand| operand.subscribe_dependent(self.weak()))
            .collect();
        let mut links = self.links.lock();
        if !self.is_torn_down() {
            links.operand_subs.extend(subs);
        }
    }

    pub(crate) fn ensure_evaluated(&self) {
        if self.is_evaluated() {
            return;
        }
        let mut wired = self.wired.lock();
        if !*wired {
            self.wire();
            *wired = true;
        }
        if self.is_evaluated() {
            return;
        }
        if self.try_begin(false) {
            self.drive(None, false);
        }
    }

    /// Claim the evaluation gate. Fails (and marks the node dirty) if an
    /// evaluation is already running.
    fn try_begin(&self, require_evaluated: bool) -> bool {
        let mut gate = self.gate.lock();
        if gate.running {
            gate.pending = true;
            return false;
        }
        if require_evaluated && !self.is_evaluated() {
            return false;
        }
        gate.running = true;
        true
    }

    fn drive(&self, mut first: Option<Result<Value, Fault>>, mut notify: bool) {
        loop {
            let result = match first.take() {
                Some(result) => result,
                None => eval::compute(self),
            };
            self.apply(result, notify);

            let mut gate = self.gate.lock();
            self.evaluated.store(true, Ordering::Release);
            if gate.pending && !self.is_torn_down() {
                gate.pending = false;
                notify = true;
                continue;
            }
            gate.pending = false;
            gate.running = false;
            return;
        }
    }

    /// React to an operand or watched value change.
    pub(crate) fn on_dependency_changed(&self) {
        if self.is_torn_down() || !self.try_begin(true) {
            return;
        }
        trace!(kind = ?self.kind, "re-evaluating");
        self.drive(None, true);
    }

    /// The dictionary this index node reads dropped the observed key.
    pub(crate) fn on_key_removed(&self, key: &Value) {
        if self.is_torn_down() || !self.try_begin(true) {
            return;
        }
        trace!(kind = ?self.kind, %key, "observed key removed");
        self.drive(Some(Err(Fault::key_removed(key))), true);
    }

    fn apply(&self, result: Result<Value, Fault>, notify: bool) {
        let (new_value, new_fault) = match result {
            Ok(value) => (value, None),
            Err(fault) => (self.result_type.default_value(), Some(fault)),
        };
        let (value_changed, fault_changed, superseded) = {
            let mut state = self.state.write();
            if self.is_torn_down() {
                return;
            }
            let value_changed = state.value != new_value;
            let fault_changed = state.fault != new_fault;
            state.fault = new_fault;
            let old = std::mem::replace(&mut state.value, new_value);
            (value_changed, fault_changed, old)
        };
        // Dispose only after the swap, never before computing: the stored
        // value must never be one that has been disposed.
        if self.owns_value && value_changed {
            superseded.dispose();
        }
        trace!(kind = ?self.kind, value_changed, fault_changed, notify, "applied");
        if notify && (value_changed || fault_changed) {
            self.changed.raise(&NodeChanged {
                value_changed,
                fault_changed,
            });
        }
    }

    /// Release everything this node holds. Idempotent.
    pub(crate) fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let links = std::mem::take(&mut *self.links.lock());
        drop(links);
        let held = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.value, self.result_type.default_value())
        };
        if self.owns_value {
            held.dispose();
        }
        debug!(kind = ?self.kind, "node torn down");
    }

    // ---- runtime value watch ----

    /// Point the runtime-value subscriptions at `value`.
    pub(crate) fn watch(&self, value: &Value) {
        let mut links = self.links.lock();
        if self.is_torn_down() || links.watch.is_watching(value) {
            return;
        }
        let subs = crate::bridge::receiver_subscriptions(self, value);
        trace!(kind = ?self.kind, subscriptions = subs.len(), "rewired receiver");
        let previous = std::mem::replace(&mut links.watch, ValueWatch::new(value.clone(), subs));
        drop(links);
        drop(previous);
    }

    pub(crate) fn unwatch(&self) {
        self.watch(&Value::Null);
    }

    // ---- short-circuit branches ----

    /// The node for branch `slot`, building it from `expr` on first use.
    pub(crate) fn branch(&self, slot: usize, expr: &Expr) -> Result<Arc<ActiveNode>, Fault> {
        if let Some(branch) = &self.links.lock().branches[slot] {
            return Ok(Arc::clone(branch.guard.node()));
        }
        let guard = factory::build(&self.tables, expr, self.options.as_ref(), false)
            .map_err(|err| Fault::argument(err.to_string()))?;
        let node = Arc::clone(guard.node());
        let built = Branch {
            _subscription: node.subscribe_dependent(self.weak()),
            guard,
        };

        let (node, leftover) = {
            let mut links = self.links.lock();
            if self.is_torn_down() {
                (node, Some(built))
            } else if let Some(existing) = &links.branches[slot] {
                (Arc::clone(existing.guard.node()), Some(built))
            } else {
                links.branches[slot] = Some(built);
                (node, None)
            }
        };
        drop(leftover);
        trace!(kind = ?self.kind, slot, "branch built");
        Ok(node)
    }

    /// Release branch `slot` if it was built.
    pub(crate) fn release_branch(&self, slot: usize) {
        let released = self.links.lock().branches[slot].take();
        if released.is_some() {
            trace!(kind = ?self.kind, slot, "branch released");
        }
        drop(released);
    }

    pub(crate) fn branch_node(&self, slot: usize) -> Option<Arc<ActiveNode>> {
        self.links.lock().branches[slot]
            .as_ref()
            .map(|branch| Arc::clone(branch.guard.node()))
    }
}

impl fmt::Debug for ActiveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ActiveNode")
            .field("kind", &self.kind)
            .field("expr", &self.expr.to_string())
            .field("value", &state.value)
            .field("fault", &state.fault)
            .field("deferred", &self.deferred)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}
