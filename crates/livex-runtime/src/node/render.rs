#![forbid(unsafe_code)]

//! Annotated rendering: the tree's source form with each node's current
//! state, e.g. `Person.Name /* null */ ?? "fallback" /* "fallback" */`.
//! Constants carry no annotation.

use std::fmt::Write as _;
use std::sync::Arc;

use super::{ActiveNode, KindData};
use crate::expr::{Expr, needs_parens, write_constant};

impl ActiveNode {
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        self.write_annotated(&mut out);
        out
    }

    fn write_annotated(&self, out: &mut String) {
        match self.data() {
            KindData::Constant(value) => {
                let _ = write_constant(out, value);
                return;
            }
            KindData::Member { receiver, member } => {
                if let Some(receiver) = receiver {
                    receiver.write_operand(out);
                    out.push('.');
                }
                out.push_str(member.name());
            }
            KindData::Index { receiver, args, .. } => {
                receiver.write_operand(out);
                out.push('[');
                write_args(out, args);
                out.push(']');
            }
            KindData::Call {
                receiver,
                method,
                args,
            } => {
                if let Some(receiver) = receiver {
                    receiver.write_operand(out);
                    out.push('.');
                }
                out.push_str(method.name());
                out.push('(');
                write_args(out, args);
                out.push(')');
            }
            KindData::New { constructor, args } => {
                let _ = write!(out, "new {}(", constructor.type_name());
                write_args(out, args);
                out.push(')');
            }
            KindData::Unary { op, operand } => {
                let _ = write!(out, "{op}");
                operand.write_operand(out);
            }
            KindData::Binary { op, left, right } => {
                left.write_operand(out);
                let _ = write!(out, " {op} ");
                right.write_operand(out);
            }
            KindData::Conditional { test, branches } => {
                test.write_operand(out);
                out.push_str(" ? ");
                self.write_branch(out, 0, &branches[0]);
                out.push_str(" : ");
                self.write_branch(out, 1, &branches[1]);
            }
            KindData::Logical { op, left, right } => {
                left.write_operand(out);
                let _ = write!(out, " {op} ");
                self.write_branch(out, 0, right);
            }
            KindData::Coalesce { left, right } => {
                left.write_operand(out);
                out.push_str(" ?? ");
                self.write_branch(out, 0, right);
            }
        }
        self.write_state(out);
    }

    fn write_operand(&self, out: &mut String) {
        if needs_parens(self.expr()) {
            out.push('(');
            self.write_annotated(out);
            out.push(')');
        } else {
            self.write_annotated(out);
        }
    }

    /// Built branches render with state; unbuilt ones as plain source.
    fn write_branch(&self, out: &mut String, slot: usize, expr: &Expr) {
        match self.branch_node(slot) {
            Some(node) => node.write_operand(out),
            None if needs_parens(expr) => {
                let _ = write!(out, "({expr})");
            }
            None => {
                let _ = write!(out, "{expr}");
            }
        }
    }

    fn write_state(&self, out: &mut String) {
        out.push_str(" /* ");
        if !self.is_evaluated() {
            out.push('?');
        } else if let Some(fault) = self.peek_fault() {
            let _ = write!(out, "[{fault}]");
        } else {
            let _ = write_constant(out, &self.peek_value());
        }
        out.push_str(" */");
    }
}

fn write_args(out: &mut String, args: &[Arc<ActiveNode>]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        arg.write_annotated(out);
    }
}
