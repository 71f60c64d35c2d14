#![forbid(unsafe_code)]

//! Captured evaluation errors.
//!
//! A [`Fault`] is what an active node holds instead of a value when its last
//! evaluation failed. Faults are shared: a node whose operand faulted carries
//! the operand's fault verbatim, so identity (not message text) tells whether
//! two nodes failed for the same reason.
//!
//! # Invariants
//!
//! 1. `Fault::clone` shares the same captured error; `a == b` holds only when
//!    both came from one capture.
//! 2. Two faults built from equal [`FaultKind`]s are distinct faults.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The kinds of error an evaluation can capture.
#[derive(Debug, thiserror::Error)]
pub enum FaultKind {
    /// A member or method was accessed on a null receiver.
    #[error("null reference while accessing `{member}`")]
    NullReference { member: String },

    /// A dictionary lookup found no entry for the key.
    #[error("key '{key}' was not found")]
    KeyNotFound { key: String },

    /// The observed key was removed from the dictionary an index node reads.
    #[error("key '{key}' was removed")]
    KeyRemoved { key: String },

    /// A list index fell outside `0..len`.
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// Integer division or remainder by zero.
    #[error("attempted to divide by zero")]
    DivideByZero,

    /// An operator was applied to operands it does not support.
    #[error("operator `{operator}` cannot be applied to {operands}")]
    InvalidOperand { operator: String, operands: String },

    /// A conversion between two types is not defined.
    #[error("cannot convert {from} to {to}")]
    InvalidCast { from: String, to: String },

    /// The receiver's type has no member with this name.
    #[error("type `{type_name}` has no member `{member}`")]
    MissingMember { type_name: String, member: String },

    /// A callee rejected one of its arguments.
    #[error("invalid argument: {message}")]
    Argument { message: String },

    /// An error raised by user code (accessor, method, or constructor).
    #[error(transparent)]
    Custom(Box<dyn Error + Send + Sync>),
}

/// A shared, captured evaluation error compared by identity.
#[derive(Clone)]
pub struct Fault(Arc<FaultKind>);

impl Fault {
    /// Capture a new fault.
    #[must_use]
    pub fn new(kind: FaultKind) -> Self {
        Self(Arc::new(kind))
    }

    /// Wrap an arbitrary error raised by user code.
    #[must_use]
    pub fn custom(err: impl Error + Send + Sync + 'static) -> Self {
        Self::new(FaultKind::Custom(Box::new(err)))
    }

    #[must_use]
    pub fn null_reference(member: impl Into<String>) -> Self {
        Self::new(FaultKind::NullReference {
            member: member.into(),
        })
    }

    #[must_use]
    pub fn key_not_found(key: impl fmt::Display) -> Self {
        Self::new(FaultKind::KeyNotFound {
            key: key.to_string(),
        })
    }

    #[must_use]
    pub fn key_removed(key: impl fmt::Display) -> Self {
        Self::new(FaultKind::KeyRemoved {
            key: key.to_string(),
        })
    }

    #[must_use]
    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(FaultKind::IndexOutOfRange { index, len })
    }

    #[must_use]
    pub fn divide_by_zero() -> Self {
        Self::new(FaultKind::DivideByZero)
    }

    #[must_use]
    pub fn invalid_operand(operator: impl Into<String>, operands: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidOperand {
            operator: operator.into(),
            operands: operands.into(),
        })
    }

    #[must_use]
    pub fn invalid_cast(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidCast {
            from: from.into(),
            to: to.into(),
        })
    }

    #[must_use]
    pub fn missing_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(FaultKind::MissingMember {
            type_name: type_name.into(),
            member: member.into(),
        })
    }

    #[must_use]
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Argument {
            message: message.into(),
        })
    }

    /// The captured error.
    #[must_use]
    pub fn kind(&self) -> &FaultKind {
        &self.0
    }

    /// Whether `self` and `other` are the same capture.
    #[must_use]
    pub fn same_as(&self, other: &Fault) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn is_null_reference(&self) -> bool {
        matches!(*self.0, FaultKind::NullReference { .. })
    }

    #[must_use]
    pub fn is_key_removed(&self) -> bool {
        matches!(*self.0, FaultKind::KeyRemoved { .. })
    }
}

impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Fault {}

impl From<FaultKind> for Fault {
    fn from(kind: FaultKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &*self.0 {
            FaultKind::Custom(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
