#![forbid(unsafe_code)]

//! Immutable, structurally hashed operation trees.
//!
//! # Design
//!
//! An [`Expr`] is an `Arc` node with its structural hash computed once at
//! construction, so hashing a tree of any size is O(1) and equality checks
//! short-circuit on pointer identity and on hash mismatch before walking the
//! structure.
//!
//! A [`Lambda`] pairs a body with ordered parameter types. [`Lambda::bind`]
//! replaces every [`ExprKind::Parameter`] with a typed constant; subtrees
//! without parameters are shared with the lambda body rather than copied.
//!
//! # Invariants
//!
//! 1. Structurally equal trees hash equally, regardless of how they were
//!    built.
//! 2. Descriptors participate by identity ([`DescriptorId`]), constants by
//!    value (objects by reference).
//! 3. A tree returned by [`Lambda::bind`] contains no parameters.
//!
//! [`DescriptorId`]: crate::descriptor::DescriptorId

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use livex_core::{Value, ValueType};
use rustc_hash::FxHasher;

use crate::descriptor::{Constructor, Indexer, Member, Method};
use crate::error::ConstructionError;
use crate::ops::{BinaryOperator, LogicalOperator, UnaryOperator};

/// The shape of one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant(Value),
    /// Placeholder for the lambda argument at this position.
    Parameter(usize),
    Member {
        receiver: Option<Expr>,
        member: Member,
    },
    Index {
        receiver: Expr,
        indexer: Indexer,
        args: Vec<Expr>,
    },
    Call {
        receiver: Option<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
    New {
        constructor: Constructor,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Expr,
    },
    Binary {
        op: BinaryOperator,
        left: Expr,
        right: Expr,
    },
    Conditional {
        test: Expr,
        if_true: Expr,
        if_false: Expr,
    },
    Logical {
        op: LogicalOperator,
        left: Expr,
        right: Expr,
    },
    Coalesce {
        left: Expr,
        right: Expr,
    },
}

impl ExprKind {
    fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Constant(_) | Self::Parameter(_) => Vec::new(),
            Self::Member { receiver, .. } => receiver.iter().collect(),
            Self::Index { receiver, args, .. } => std::iter::once(receiver).chain(args).collect(),
            Self::Call { receiver, args, .. } => receiver.iter().chain(args).collect(),
            Self::New { args, .. } => args.iter().collect(),
            Self::Unary { operand, .. } => vec![operand],
            Self::Binary { left, right, .. }
            | Self::Logical { left, right, .. }
            | Self::Coalesce { left, right } => vec![left, right],
            Self::Conditional {
                test,
                if_true,
                if_false,
            } => vec![test, if_true, if_false],
        }
    }
}

struct ExprNode {
    kind: ExprKind,
    ty: ValueType,
    hash: u64,
    has_parameters: bool,
}

/// A shared, immutable operation tree node.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    fn from_kind(kind: ExprKind, ty: ValueType) -> Self {
        let mut hasher = FxHasher::default();
        kind.hash(&mut hasher);
        ty.hash(&mut hasher);
        let has_parameters = matches!(kind, ExprKind::Parameter(_))
            || kind.children().into_iter().any(Expr::has_parameters);
        Self(Arc::new(ExprNode {
            kind,
            ty,
            hash: hasher.finish(),
            has_parameters,
        }))
    }

    // ---- leaves ----

    /// A constant typed after its runtime value (`null` is `Any`).
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = ValueType::of(&value);
        Self::from_kind(ExprKind::Constant(value), ty)
    }

    #[must_use]
    pub fn typed_constant(value: impl Into<Value>, ty: ValueType) -> Self {
        Self::from_kind(ExprKind::Constant(value.into()), ty)
    }

    #[must_use]
    pub fn parameter(index: usize, ty: ValueType) -> Self {
        Self::from_kind(ExprKind::Parameter(index), ty)
    }

    // ---- accessors ----

    #[must_use]
    pub fn member(&self, member: &Member) -> Self {
        Self::from_kind(
            ExprKind::Member {
                receiver: Some(self.clone()),
                member: member.clone(),
            },
            member.result_type(),
        )
    }

    /// Shorthand for `self.member(&Member::property(name, ty))`.
    #[must_use]
    pub fn property(&self, name: &str, ty: ValueType) -> Self {
        self.member(&Member::property(name, ty))
    }

    #[must_use]
    pub fn static_member(member: &Member) -> Self {
        Self::from_kind(
            ExprKind::Member {
                receiver: None,
                member: member.clone(),
            },
            member.result_type(),
        )
    }

    #[must_use]
    pub fn index(&self, indexer: &Indexer, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::from_kind(
            ExprKind::Index {
                receiver: self.clone(),
                indexer: indexer.clone(),
                args: args.into_iter().collect(),
            },
            indexer.result_type(),
        )
    }

    /// Shorthand for `self.index(&Indexer::item(ty), [key])`.
    #[must_use]
    pub fn item(&self, key: Expr, ty: ValueType) -> Self {
        self.index(&Indexer::item(ty), [key])
    }

    #[must_use]
    pub fn call(&self, method: &Method, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::from_kind(
            ExprKind::Call {
                receiver: Some(self.clone()),
                method: method.clone(),
                args: args.into_iter().collect(),
            },
            method.result_type(),
        )
    }

    #[must_use]
    pub fn static_call(method: &Method, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::from_kind(
            ExprKind::Call {
                receiver: None,
                method: method.clone(),
                args: args.into_iter().collect(),
            },
            method.result_type(),
        )
    }

    #[must_use]
    pub fn construct(constructor: &Constructor, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::from_kind(
            ExprKind::New {
                constructor: constructor.clone(),
                args: args.into_iter().collect(),
            },
            constructor.result_type(),
        )
    }

    // ---- operators ----

    #[must_use]
    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        let ty = op.result_type(operand.ty());
        Self::from_kind(ExprKind::Unary { op, operand }, ty)
    }

    #[must_use]
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        let ty = op.result_type(left.ty(), right.ty());
        Self::from_kind(ExprKind::Binary { op, left, right }, ty)
    }

    #[must_use]
    pub fn negate(operand: Expr) -> Self {
        Self::unary(UnaryOperator::Negate, operand)
    }

    #[must_use]
    pub fn not(operand: Expr) -> Self {
        Self::unary(UnaryOperator::Not, operand)
    }

    #[must_use]
    pub fn convert(operand: Expr, ty: ValueType) -> Self {
        Self::unary(UnaryOperator::Convert(ty), operand)
    }

    #[must_use]
    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Add, left, right)
    }

    #[must_use]
    pub fn subtract(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Subtract, left, right)
    }

    #[must_use]
    pub fn multiply(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Multiply, left, right)
    }

    #[must_use]
    pub fn divide(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Divide, left, right)
    }

    #[must_use]
    pub fn equal(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::Equal, left, right)
    }

    #[must_use]
    pub fn not_equal(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::NotEqual, left, right)
    }

    #[must_use]
    pub fn less_than(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::LessThan, left, right)
    }

    #[must_use]
    pub fn greater_than(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOperator::GreaterThan, left, right)
    }

    // ---- short-circuiting ----

    /// `test ? if_true : if_false`. The type is the branches' common type, or
    /// `Any` when they differ.
    #[must_use]
    pub fn condition(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let ty = common_type(if_true.ty(), if_false.ty());
        Self::from_kind(
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            },
            ty,
        )
    }

    #[must_use]
    pub fn and_also(left: Expr, right: Expr) -> Self {
        Self::logical(LogicalOperator::And, left, right)
    }

    #[must_use]
    pub fn or_else(left: Expr, right: Expr) -> Self {
        Self::logical(LogicalOperator::Or, left, right)
    }

    #[must_use]
    pub fn logical(op: LogicalOperator, left: Expr, right: Expr) -> Self {
        Self::from_kind(ExprKind::Logical { op, left, right }, ValueType::Bool)
    }

    /// `left ?? right`.
    #[must_use]
    pub fn coalesce(left: Expr, right: Expr) -> Self {
        let ty = common_type(left.ty(), right.ty());
        Self::from_kind(ExprKind::Coalesce { left, right }, ty)
    }

    // ---- inspection ----

    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Static result type.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        self.0.ty
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        self.0.has_parameters
    }

    /// Index of the first parameter placeholder in evaluation order.
    #[must_use]
    pub fn first_parameter(&self) -> Option<usize> {
        if !self.has_parameters() {
            return None;
        }
        match self.kind() {
            ExprKind::Parameter(index) => Some(*index),
            kind => kind.children().into_iter().find_map(Expr::first_parameter),
        }
    }

    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn substitute(&self, params: &[ValueType], values: &[Value]) -> Result<Expr, ConstructionError> {
        if !self.has_parameters() {
            return Ok(self.clone());
        }
        let sub = |e: &Expr| e.substitute(params, values);
        let kind = match self.kind() {
            ExprKind::Parameter(index) => {
                let (Some(ty), Some(value)) = (params.get(*index), values.get(*index)) else {
                    return Err(ConstructionError::UnboundParameter { index: *index });
                };
                return Ok(Expr::typed_constant(value.clone(), *ty));
            }
            ExprKind::Constant(_) => return Ok(self.clone()),
            ExprKind::Member { receiver, member } => ExprKind::Member {
                receiver: receiver.as_ref().map(sub).transpose()?,
                member: member.clone(),
            },
            ExprKind::Index {
                receiver,
                indexer,
                args,
            } => ExprKind::Index {
                receiver: sub(receiver)?,
                indexer: indexer.clone(),
                args: substitute_all(args, params, values)?,
            },
            ExprKind::Call {
                receiver,
                method,
                args,
            } => ExprKind::Call {
                receiver: receiver.as_ref().map(sub).transpose()?,
                method: method.clone(),
                args: substitute_all(args, params, values)?,
            },
            ExprKind::New { constructor, args } => ExprKind::New {
                constructor: constructor.clone(),
                args: substitute_all(args, params, values)?,
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: sub(operand)?,
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op: *op,
                left: sub(left)?,
                right: sub(right)?,
            },
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => ExprKind::Conditional {
                test: sub(test)?,
                if_true: sub(if_true)?,
                if_false: sub(if_false)?,
            },
            ExprKind::Logical { op, left, right } => ExprKind::Logical {
                op: *op,
                left: sub(left)?,
                right: sub(right)?,
            },
            ExprKind::Coalesce { left, right } => ExprKind::Coalesce {
                left: sub(left)?,
                right: sub(right)?,
            },
        };
        Ok(Expr::from_kind(kind, self.ty()))
    }
}

fn substitute_all(
    exprs: &[Expr],
    params: &[ValueType],
    values: &[Value],
) -> Result<Vec<Expr>, ConstructionError> {
    exprs.iter().map(|e| e.substitute(params, values)).collect()
}

fn common_type(a: ValueType, b: ValueType) -> ValueType {
    if a == b { a } else { ValueType::Any }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.ty == other.0.ty
                && self.0.kind == other.0.kind)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self}: {})", self.ty())
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Operands that need parentheses when nested inside another operator.
pub(crate) fn needs_parens(expr: &Expr) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Binary { .. }
            | ExprKind::Logical { .. }
            | ExprKind::Coalesce { .. }
            | ExprKind::Conditional { .. }
    )
}

pub(crate) fn write_constant(f: &mut impl fmt::Write, value: &Value) -> fmt::Result {
    match value {
        Value::Object(o) => write!(f, "{}", o.type_name()),
        other => write!(f, "{other:?}"),
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    if needs_parens(expr) {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant(value) => write_constant(f, value),
            ExprKind::Parameter(index) => write!(f, "${index}"),
            ExprKind::Member { receiver, member } => {
                if let Some(receiver) = receiver {
                    write_operand(f, receiver)?;
                    f.write_str(".")?;
                }
                f.write_str(member.name())
            }
            ExprKind::Index { receiver, args, .. } => {
                write_operand(f, receiver)?;
                f.write_str("[")?;
                write_args(f, args)?;
                f.write_str("]")
            }
            ExprKind::Call {
                receiver,
                method,
                args,
            } => {
                if let Some(receiver) = receiver {
                    write_operand(f, receiver)?;
                    f.write_str(".")?;
                }
                write!(f, "{}(", method.name())?;
                write_args(f, args)?;
                f.write_str(")")
            }
            ExprKind::New { constructor, args } => {
                write!(f, "new {}(", constructor.type_name())?;
                write_args(f, args)?;
                f.write_str(")")
            }
            ExprKind::Unary { op, operand } => {
                write!(f, "{op}")?;
                write_operand(f, operand)
            }
            ExprKind::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                write_operand(f, test)?;
                f.write_str(" ? ")?;
                write_operand(f, if_true)?;
                f.write_str(" : ")?;
                write_operand(f, if_false)
            }
            ExprKind::Logical { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            ExprKind::Coalesce { left, right } => {
                write_operand(f, left)?;
                f.write_str(" ?? ")?;
                write_operand(f, right)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Lambda
// ---------------------------------------------------------------------------

/// An operation tree with ordered, typed parameters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Lambda {
    parameters: Arc<[ValueType]>,
    body: Expr,
}

impl Lambda {
    #[must_use]
    pub fn new(parameters: impl IntoIterator<Item = ValueType>, body: Expr) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
            body,
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &[ValueType] {
        &self.parameters
    }

    #[must_use]
    pub fn body(&self) -> &Expr {
        &self.body
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.body.ty()
    }

    /// Substitute `args` for the parameters, yielding a parameter-free tree.
    pub fn bind(&self, args: &[Value]) -> Result<Expr, ConstructionError> {
        if args.len() != self.parameters.len() {
            return Err(ConstructionError::ArgumentCount {
                expected: self.parameters.len(),
                found: args.len(),
            });
        }
        for (index, (ty, arg)) in self.parameters.iter().zip(args).enumerate() {
            if !ty.accepts(arg) {
                return Err(ConstructionError::ArgumentType {
                    index,
                    expected: *ty,
                    found: arg.type_label(),
                });
            }
        }
        self.body.substitute(&self.parameters, args)
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${i}: {ty}")?;
        }
        write!(f, ") => {}", self.body)
    }
}
