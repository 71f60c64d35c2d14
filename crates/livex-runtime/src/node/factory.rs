#![forbid(unsafe_code)]

//! Builds (or reuses) the active node for a tree node.
//!
//! Operands are built first, bottom-up, so a node's key can name its
//! operands by identity. The shard lock is held only while the key is looked
//! up; a loser's operand references are released after it returns.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::{ActiveNode, KeyShape, KindData, NodeInit, NodeKey, node_id};
use crate::engine::Tables;
use crate::error::ConstructionError;
use crate::expr::{Expr, ExprKind};
use crate::intern::NodeRef;
use crate::options::{ActiveOptions, OptionsKey};

/// Acquire the node for `expr`, building missing operands on the way.
///
/// `defer` only matters to the creator: a node that already exists keeps
/// whatever mode it was created with, but a non-deferred acquirer forces
/// its first evaluation.
pub(crate) fn build(
    tables: &Arc<Tables>,
    expr: &Expr,
    options: Option<&Arc<ActiveOptions>>,
    defer: bool,
) -> Result<NodeRef, ConstructionError> {
    if let Some(index) = expr.first_parameter() {
        return Err(ConstructionError::UnboundParameter { index });
    }
    build_node(tables, expr, options, defer)
}

struct Operands<'a> {
    tables: &'a Arc<Tables>,
    options: Option<&'a Arc<ActiveOptions>>,
    defer: bool,
    guards: Vec<NodeRef>,
}

impl Operands<'_> {
    fn take(&mut self, expr: &Expr) -> Result<Arc<ActiveNode>, ConstructionError> {
        let guard = build_node(self.tables, expr, self.options, self.defer)?;
        let node = Arc::clone(guard.node());
        self.guards.push(guard);
        Ok(node)
    }

    fn take_all<const N: usize>(
        &mut self,
        exprs: &[Expr],
    ) -> Result<SmallVec<[Arc<ActiveNode>; N]>, ConstructionError> {
        exprs.iter().map(|expr| self.take(expr)).collect()
    }

    fn owns(&self, check: impl FnOnce(&ActiveOptions) -> bool) -> bool {
        self.options.is_some_and(|options| check(options))
    }
}

fn ids<const N: usize>(nodes: &[Arc<ActiveNode>]) -> SmallVec<[usize; N]> {
    nodes.iter().map(node_id).collect()
}

fn build_node(
    tables: &Arc<Tables>,
    expr: &Expr,
    options: Option<&Arc<ActiveOptions>>,
    defer: bool,
) -> Result<NodeRef, ConstructionError> {
    let mut ops = Operands {
        tables,
        options,
        defer,
        guards: Vec::new(),
    };

    let (shape, data, owns_value) = match expr.kind() {
        ExprKind::Parameter(index) => {
            return Err(ConstructionError::UnboundParameter { index: *index });
        }
        ExprKind::Constant(value) => (
            KeyShape::Constant {
                value: value.clone(),
                ty: expr.ty(),
            },
            KindData::Constant(value.clone()),
            false,
        ),
        ExprKind::Member { receiver, member } => {
            let receiver = receiver.as_ref().map(|r| ops.take(r)).transpose()?;
            (
                KeyShape::Member {
                    receiver: receiver.as_ref().map(node_id),
                    member: member.id(),
                },
                KindData::Member {
                    receiver,
                    member: member.clone(),
                },
                ops.owns(|o| o.is_member_disposal(member)),
            )
        }
        ExprKind::Index {
            receiver,
            indexer,
            args,
        } => {
            let receiver = ops.take(receiver)?;
            let args = ops.take_all::<2>(args)?;
            (
                KeyShape::Index {
                    receiver: node_id(&receiver),
                    indexer: indexer.id(),
                    args: ids(&args),
                },
                KindData::Index {
                    receiver,
                    indexer: indexer.clone(),
                    args,
                },
                ops.owns(|o| o.is_indexer_disposal(indexer)),
            )
        }
        ExprKind::Call {
            receiver,
            method,
            args,
        } => {
            let receiver = receiver.as_ref().map(|r| ops.take(r)).transpose()?;
            let args = ops.take_all::<4>(args)?;
            (
                KeyShape::Call {
                    receiver: receiver.as_ref().map(node_id),
                    method: method.id(),
                    args: ids(&args),
                },
                KindData::Call {
                    receiver,
                    method: method.clone(),
                    args,
                },
                ops.owns(|o| o.is_method_disposal(method)),
            )
        }
        ExprKind::New { constructor, args } => {
            let args = ops.take_all::<4>(args)?;
            (
                KeyShape::New {
                    constructor: constructor.id(),
                    args: ids(&args),
                },
                KindData::New {
                    constructor: constructor.clone(),
                    args,
                },
                ops.owns(|o| o.is_constructor_disposal(constructor)),
            )
        }
        ExprKind::Unary { op, operand } => {
            let operand = ops.take(operand)?;
            (
                KeyShape::Unary {
                    op: *op,
                    operand: node_id(&operand),
                },
                KindData::Unary { op: *op, operand },
                false,
            )
        }
        ExprKind::Binary { op, left, right } => {
            let left = ops.take(left)?;
            let right = ops.take(right)?;
            (
                KeyShape::Binary {
                    op: *op,
                    left: node_id(&left),
                    right: node_id(&right),
                },
                KindData::Binary { op: *op, left, right },
                false,
            )
        }
        ExprKind::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let test = ops.take(test)?;
            (
                KeyShape::Conditional {
                    test: node_id(&test),
                    if_true: if_true.clone(),
                    if_false: if_false.clone(),
                },
                KindData::Conditional {
                    test,
                    branches: [if_true.clone(), if_false.clone()],
                },
                false,
            )
        }
        ExprKind::Logical { op, left, right } => {
            let left = ops.take(left)?;
            (
                KeyShape::Logical {
                    op: *op,
                    left: node_id(&left),
                    right: right.clone(),
                },
                KindData::Logical {
                    op: *op,
                    left,
                    right: right.clone(),
                },
                false,
            )
        }
        ExprKind::Coalesce { left, right } => {
            let left = ops.take(left)?;
            (
                KeyShape::Coalesce {
                    left: node_id(&left),
                    right: right.clone(),
                },
                KindData::Coalesce {
                    left,
                    right: right.clone(),
                },
                false,
            )
        }
    };

    let key = NodeKey {
        shape,
        options: OptionsKey::of(options),
    };
    let kind = key.kind();
    let init = NodeInit {
        tables: Arc::clone(tables),
        key: key.clone(),
        expr: expr.clone(),
        data,
        operands: ops.guards,
        options: options.cloned(),
        deferred: defer,
        owns_value,
    };
    let (node, created, leftover) =
        tables
            .nodes
            .acquire_with(kind.shard(), &key, init, ActiveNode::new);
    // A reused node already holds its operands; release ours.
    drop(leftover);

    if created {
        debug!(?kind, deferred = defer, owns_value, "node created");
    } else {
        trace!(?kind, "node reused");
    }
    node.activate(defer);
    Ok(NodeRef::adopt(node))
}

