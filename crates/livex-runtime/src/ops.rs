#![forbid(unsafe_code)]

//! Unary and binary operator semantics.
//!
//! # Promotion rules
//!
//! - `Int op Int` stays `Int` and wraps on overflow. Integer division and
//!   remainder by zero fault with `DivideByZero`.
//! - Mixing `Int` and `Float` promotes to `Float`. `Power` is always `Float`.
//! - `Add` with a string on either side concatenates; null reads as `""`.
//! - Any other arithmetic with a null operand is a `NullReference` fault.
//! - Ordering comparisons with a null operand are `false`.
//! - Every other unsupported combination is an `InvalidOperand` fault.

use std::cmp::Ordering;
use std::fmt;

use livex_core::{Fault, Value, ValueType};

/// Operators taking one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Not,
    Convert(ValueType),
}

impl UnaryOperator {
    #[must_use]
    pub fn result_type(self, operand: ValueType) -> ValueType {
        match (self, operand) {
            (Self::Convert(ty), _) => ty,
            (Self::Negate, ValueType::Int | ValueType::Float) => operand,
            (Self::Not, ValueType::Bool | ValueType::Int) => operand,
            _ => ValueType::Any,
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negate => f.write_str("-"),
            Self::Not => f.write_str("!"),
            Self::Convert(ty) => write!(f, "({ty})"),
        }
    }
}

/// Non-short-circuiting operators taking two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
}

impl BinaryOperator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Power => "**",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::And => "&",
            Self::Or => "|",
            Self::ExclusiveOr => "^",
            Self::LeftShift => "<<",
            Self::RightShift => ">>",
        }
    }

    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }

    /// Static result type under the promotion rules.
    #[must_use]
    pub fn result_type(self, left: ValueType, right: ValueType) -> ValueType {
        use ValueType::{Any, Bool, Float, Int, Str};

        if self.is_comparison() {
            return Bool;
        }
        match self {
            Self::Add if left == Str || right == Str => Str,
            Self::Power => Float,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo => {
                match (left, right) {
                    (Int, Int) => Int,
                    (Int | Float, Int | Float) => Float,
                    _ => Any,
                }
            }
            Self::And | Self::Or | Self::ExclusiveOr => match (left, right) {
                (Bool, Bool) => Bool,
                (Int, Int) => Int,
                _ => Any,
            },
            Self::LeftShift | Self::RightShift => Int,
            _ => Any,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Short-circuiting boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// The left value that decides the result without the right side.
    #[must_use]
    pub fn short_circuits_on(self) -> bool {
        matches!(self, Self::Or)
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn invalid(operator: impl fmt::Display, left: &Value, right: Option<&Value>) -> Fault {
    let operands = match right {
        Some(right) => format!("{} and {}", left.type_label(), right.type_label()),
        None => left.type_label().to_string(),
    };
    Fault::invalid_operand(operator.to_string(), operands)
}

/// Apply a unary operator.
pub fn apply_unary(op: UnaryOperator, operand: &Value) -> Result<Value, Fault> {
    match (op, operand) {
        (UnaryOperator::Convert(ty), value) => convert(value, ty),
        (_, Value::Null) => Err(Fault::null_reference(op.to_string())),
        (UnaryOperator::Negate, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOperator::Negate, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Not, Value::Int(i)) => Ok(Value::Int(!i)),
        (op, value) => Err(invalid(op, value, None)),
    }
}

fn convert(value: &Value, ty: ValueType) -> Result<Value, Fault> {
    let cast_error = || Fault::invalid_cast(value.type_label(), ty.to_string());
    match (value, ty) {
        (_, ValueType::Any) => Ok(value.clone()),
        (Value::Null, ty) if ty.is_nullable() => Ok(Value::Null),
        (Value::Int(i), ValueType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Float(x), ValueType::Int) => Ok(Value::Int(*x as i64)),
        (value, ValueType::Str) => Ok(Value::from(value.to_string())),
        (value, ty) if ty.accepts(value) => Ok(value.clone()),
        _ => Err(cast_error()),
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((left.as_f64()?, right.as_f64()?))
}

/// Equality with numeric promotion; objects compare by identity.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            numeric_pair(left, right).is_some_and(|(a, b)| a == b)
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Bool(false));
    }
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match numeric_pair(left, right) {
            Some((a, b)) => a.partial_cmp(&b),
            None => return Err(invalid(op, left, Some(right))),
        },
    };
    let result = ordering.is_some_and(|ord| match op {
        BinaryOperator::LessThan => ord == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ord != Ordering::Greater,
        BinaryOperator::GreaterThan => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    });
    Ok(Value::Bool(result))
}

fn concat(left: &Value, right: &Value) -> Value {
    let text = |v: &Value| match v {
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Value::from(text(left) + &text(right))
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOperator::Add => Ok(Value::Int(a.wrapping_add(b))),
            BinaryOperator::Subtract => Ok(Value::Int(a.wrapping_sub(b))),
            BinaryOperator::Multiply => Ok(Value::Int(a.wrapping_mul(b))),
            BinaryOperator::Divide if b == 0 => Err(Fault::divide_by_zero()),
            BinaryOperator::Divide => Ok(Value::Int(a.wrapping_div(b))),
            BinaryOperator::Modulo if b == 0 => Err(Fault::divide_by_zero()),
            BinaryOperator::Modulo => Ok(Value::Int(a.wrapping_rem(b))),
            _ => Ok(Value::Float((a as f64).powf(b as f64))),
        };
    }
    let Some((a, b)) = numeric_pair(left, right) else {
        return Err(invalid(op, left, Some(right)));
    };
    let x = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Modulo => a % b,
        _ => a.powf(b),
    };
    Ok(Value::Float(x))
}

fn bitwise(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            BinaryOperator::And => *a & *b,
            BinaryOperator::Or => *a | *b,
            _ => *a ^ *b,
        })),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
            BinaryOperator::And => a & b,
            BinaryOperator::Or => a | b,
            _ => a ^ b,
        })),
        _ => Err(invalid(op, left, Some(right))),
    }
}

fn shift(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let amount = (b & 63) as u32;
            Ok(Value::Int(match op {
                BinaryOperator::LeftShift => a.wrapping_shl(amount),
                _ => a.wrapping_shr(amount),
            }))
        }
        _ => Err(invalid(op, left, Some(right))),
    }
}

/// Apply a non-short-circuiting binary operator.
pub fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
    use BinaryOperator as B;

    match op {
        B::Equal => Ok(Value::Bool(values_equal(left, right))),
        B::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
        B::LessThan | B::LessThanOrEqual | B::GreaterThan | B::GreaterThanOrEqual => {
            compare(op, left, right)
        }
        B::Add if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) => {
            Ok(concat(left, right))
        }
        _ if left.is_null() || right.is_null() => Err(Fault::null_reference(op.symbol())),
        B::Add | B::Subtract | B::Multiply | B::Divide | B::Modulo | B::Power => {
            arithmetic(op, left, right)
        }
        B::And | B::Or | B::ExclusiveOr => bitwise(op, left, right),
        B::LeftShift | B::RightShift => shift(op, left, right),
    }
}

/// Apply a binary operator whose node was typed as `result_type`.
///
/// A string-typed `+` concatenates even when both operands are null at
/// runtime.
pub fn apply_typed_binary(
    op: BinaryOperator,
    result_type: ValueType,
    left: &Value,
    right: &Value,
) -> Result<Value, Fault> {
    if op == BinaryOperator::Add && result_type == ValueType::Str {
        return Ok(concat(left, right));
    }
    apply_binary(op, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOperator, l: impl Into<Value>, r: impl Into<Value>) -> Result<Value, Fault> {
        apply_binary(op, &l.into(), &r.into())
    }

    // ---- arithmetic ----

    #[test]
    fn int_arithmetic_wraps() {
        assert_eq!(bin(BinaryOperator::Add, i64::MAX, 1i64), Ok(Value::Int(i64::MIN)));
        assert_eq!(bin(BinaryOperator::Multiply, 6i64, 7i64), Ok(Value::Int(42)));
        assert_eq!(bin(BinaryOperator::Modulo, 7i64, 3i64), Ok(Value::Int(1)));
    }

    #[test]
    fn int_division_by_zero_faults() {
        let fault = bin(BinaryOperator::Divide, 1i64, 0i64).unwrap_err();
        assert!(matches!(fault.kind(), livex_core::FaultKind::DivideByZero));
        assert!(bin(BinaryOperator::Modulo, 1i64, 0i64).is_err());
    }

    #[test]
    fn float_division_by_zero_is_infinite() {
        assert_eq!(
            bin(BinaryOperator::Divide, 1.0, 0i64),
            Ok(Value::Float(f64::INFINITY))
        );
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(bin(BinaryOperator::Add, 1i64, 0.5), Ok(Value::Float(1.5)));
        assert_eq!(bin(BinaryOperator::Power, 2i64, 3i64), Ok(Value::Float(8.0)));
    }

    #[test]
    fn string_concatenation_treats_null_as_empty() {
        assert_eq!(bin(BinaryOperator::Add, "a", Value::Null), Ok(Value::from("a")));
        assert_eq!(bin(BinaryOperator::Add, "n=", 3i64), Ok(Value::from("n=3")));
    }

    #[test]
    fn null_arithmetic_is_null_reference() {
        let fault = bin(BinaryOperator::Subtract, Value::Null, 1i64).unwrap_err();
        assert!(fault.is_null_reference());
    }

    #[test]
    fn invalid_operands() {
        let fault = bin(BinaryOperator::Subtract, "a", 1i64).unwrap_err();
        assert_eq!(
            fault.to_string(),
            "operator `-` cannot be applied to string and int"
        );
    }

    // ---- comparison ----

    #[test]
    fn equality_promotes_numbers() {
        assert_eq!(bin(BinaryOperator::Equal, 1i64, 1.0), Ok(Value::Bool(true)));
        assert_eq!(bin(BinaryOperator::Equal, Value::Null, Value::Null), Ok(Value::Bool(true)));
        assert_eq!(bin(BinaryOperator::NotEqual, "a", Value::Null), Ok(Value::Bool(true)));
        assert_eq!(
            bin(BinaryOperator::Equal, f64::NAN, f64::NAN),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn ordering_on_numbers_and_strings() {
        assert_eq!(bin(BinaryOperator::LessThan, 1i64, 2.5), Ok(Value::Bool(true)));
        assert_eq!(bin(BinaryOperator::GreaterThanOrEqual, "b", "a"), Ok(Value::Bool(true)));
        assert_eq!(bin(BinaryOperator::LessThan, Value::Null, 1i64), Ok(Value::Bool(false)));
        assert!(bin(BinaryOperator::LessThan, true, false).is_err());
    }

    // ---- bitwise / shift ----

    #[test]
    fn bitwise_on_bool_and_int() {
        assert_eq!(bin(BinaryOperator::ExclusiveOr, true, false), Ok(Value::Bool(true)));
        assert_eq!(bin(BinaryOperator::And, 6i64, 3i64), Ok(Value::Int(2)));
        assert_eq!(bin(BinaryOperator::LeftShift, 1i64, 65i64), Ok(Value::Int(2)));
        assert_eq!(bin(BinaryOperator::RightShift, -8i64, 1i64), Ok(Value::Int(-4)));
    }

    // ---- unary ----

    #[test]
    fn unary_operators() {
        assert_eq!(apply_unary(UnaryOperator::Negate, &Value::Int(3)), Ok(Value::Int(-3)));
        assert_eq!(apply_unary(UnaryOperator::Not, &Value::Bool(true)), Ok(Value::Bool(false)));
        assert!(apply_unary(UnaryOperator::Negate, &Value::Null)
            .unwrap_err()
            .is_null_reference());
        assert!(apply_unary(UnaryOperator::Not, &Value::from("x")).is_err());
    }

    #[test]
    fn conversions() {
        let to = |ty, v: Value| apply_unary(UnaryOperator::Convert(ty), &v);
        assert_eq!(to(ValueType::Float, Value::Int(2)), Ok(Value::Float(2.0)));
        assert_eq!(to(ValueType::Int, Value::Float(2.9)), Ok(Value::Int(2)));
        assert_eq!(to(ValueType::Str, Value::Int(5)), Ok(Value::from("5")));
        assert_eq!(to(ValueType::Str, Value::Null), Ok(Value::Null));
        assert!(to(ValueType::Int, Value::Null).is_err());
        assert!(to(ValueType::Int, Value::from("5")).is_err());
    }

    #[test]
    fn string_typed_add_of_nulls_is_empty() {
        assert_eq!(
            apply_typed_binary(BinaryOperator::Add, ValueType::Str, &Value::Null, &Value::Null),
            Ok(Value::from(""))
        );
        assert!(apply_typed_binary(BinaryOperator::Add, ValueType::Int, &Value::Null, &Value::Null).is_err());
    }

    #[test]
    fn result_types() {
        use ValueType::*;
        assert_eq!(BinaryOperator::Add.result_type(Int, Int), Int);
        assert_eq!(BinaryOperator::Add.result_type(Int, Float), Float);
        assert_eq!(BinaryOperator::Add.result_type(Str, Int), Str);
        assert_eq!(BinaryOperator::Power.result_type(Int, Int), Float);
        assert_eq!(BinaryOperator::LessThan.result_type(Str, Str), Bool);
        assert_eq!(UnaryOperator::Convert(Str).result_type(Int), Str);
    }
}
