#![forbid(unsafe_code)]

//! Per-kind evaluation.
//!
//! Operands are read in evaluation order (receiver, then arguments left to
//! right) and the first fault wins. Short-circuit kinds build their branch
//! operands on demand and release the branch that was not selected.

use std::sync::Arc;

use livex_core::{Fault, Value};

use super::{ActiveNode, KindData};
use crate::ops::{self, LogicalOperator};

pub(crate) fn compute(node: &ActiveNode) -> Result<Value, Fault> {
    match node.data() {
        KindData::Constant(value) => Ok(value.clone()),
        KindData::Member { receiver, member } => match receiver {
            None => member.get(&Value::Null),
            Some(receiver) => {
                let target = read_receiver(node, receiver, member.name())?;
                member.get(&target)
            }
        },
        KindData::Index {
            receiver,
            indexer,
            args,
        } => {
            let target = read_receiver(node, receiver, indexer.name())?;
            let args = read_all(args)?;
            indexer.get(&target, &args)
        }
        KindData::Call {
            receiver,
            method,
            args,
        } => match receiver {
            None => method.invoke(None, &read_all(args)?),
            Some(receiver) => {
                let target = read_receiver(node, receiver, method.name())?;
                let args = read_all(args)?;
                method.invoke(Some(&target), &args)
            }
        },
        KindData::New { constructor, args } => constructor.construct(&read_all(args)?),
        KindData::Unary { op, operand } => ops::apply_unary(*op, &operand.read()?),
        KindData::Binary { op, left, right } => {
            let left = left.read()?;
            let right = right.read()?;
            ops::apply_typed_binary(*op, node.result_type(), &left, &right)
        }
        KindData::Conditional { test, branches } => {
            let selected = match test.read()? {
                Value::Bool(true) => 0,
                Value::Bool(false) => 1,
                Value::Null => return Err(Fault::null_reference("?:")),
                other => {
                    return Err(Fault::invalid_operand(
                        "?:",
                        format!("a {} test", other.type_label()),
                    ));
                }
            };
            node.release_branch(1 - selected);
            node.branch(selected, &branches[selected])?.read()
        }
        KindData::Logical { op, left, right } => {
            let left = expect_bool(*op, left.read()?)?;
            if left == op.short_circuits_on() {
                node.release_branch(0);
                return Ok(Value::Bool(left));
            }
            let right = node.branch(0, right)?.read()?;
            expect_bool(*op, right).map(Value::Bool)
        }
        KindData::Coalesce { left, right } => {
            let left = left.read()?;
            if !left.is_null() {
                node.release_branch(0);
                return Ok(left);
            }
            node.branch(0, right)?.read()
        }
    }
}

/// Read a receiver operand and point the node's watch at its value.
fn read_receiver(
    node: &ActiveNode,
    receiver: &Arc<ActiveNode>,
    member: &str,
) -> Result<Value, Fault> {
    match receiver.read() {
        Ok(Value::Null) => {
            node.unwatch();
            Err(Fault::null_reference(member))
        }
        Ok(value) => {
            node.watch(&value);
            Ok(value)
        }
        Err(fault) => {
            node.unwatch();
            Err(fault)
        }
    }
}

fn read_all(operands: &[Arc<ActiveNode>]) -> Result<Vec<Value>, Fault> {
    operands.iter().map(|operand| operand.read()).collect()
}

fn expect_bool(op: LogicalOperator, value: Value) -> Result<bool, Fault> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Err(Fault::null_reference(op.symbol())),
        other => Err(Fault::invalid_operand(
            op.symbol(),
            format!("a {} operand", other.type_label()),
        )),
    }
}
