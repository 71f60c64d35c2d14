#![forbid(unsafe_code)]

//! Errors returned to callers (as opposed to faults captured in nodes).

use livex_core::ValueType;

/// Why an active expression could not be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// The tree still contains a parameter placeholder.
    #[error("parameter {index} is not bound to an argument")]
    UnboundParameter { index: usize },

    #[error("lambda takes {expected} argument(s), {found} given")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index} must be {expected}, found {found}")]
    ArgumentType {
        index: usize,
        expected: ValueType,
        found: &'static str,
    },

    /// The handle's value type cannot represent the lambda's result type.
    #[error("a {found} expression cannot be read as `{expected}`")]
    ResultType {
        expected: &'static str,
        found: ValueType,
    },
}

/// Why an options mutation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("options are frozen and can no longer be changed")]
    Frozen,
}
