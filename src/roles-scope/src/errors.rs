use alloy_primitives::{Address, Selector};
use roles_scope_types::{Operator, ParamType, PermissionKey, ValueError};
use thiserror::Error;

/// Structural problems in a condition tree or its flattened form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{operator:?} does not support parameter type {param_type:?}")]
    UnsupportedParamType {
        operator: Operator,
        param_type: ParamType,
    },
    #[error("{operator:?} requires a compValue")]
    MissingCompValue { operator: Operator },
    #[error("{operator:?} must not carry a compValue")]
    UnexpectedCompValue { operator: Operator },
    #[error("{operator:?} requires children")]
    MissingChildren { operator: Operator },
    #[error("{operator:?} must not carry children")]
    UnexpectedChildren { operator: Operator },
    #[error("{operator:?} takes exactly one child, got {count}")]
    ChildCount { operator: Operator, count: usize },
    #[error("{operator:?} combines incompatible parameter types {left:?} and {right:?}")]
    IncompatibleParamTypes {
        operator: Operator,
        left: ParamType,
        right: ParamType,
    },
    #[error("condition list is not in breadth-first order at index {index}")]
    NotBreadthFirst { index: usize },
    #[error("condition list is empty")]
    EmptyConditionList,
    #[error("condition tree has {count} nodes, at most 256 can be packed")]
    TooManyConditions { count: usize },
}

/// Permissions that cannot be folded into one consistent set of targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeConflictError {
    #[error("{address} is granted both target-wide and function-scoped")]
    ClearanceCollision { address: Address },
    #[error("target {address} is granted more than once with different execution options")]
    DuplicateTarget { address: Address },
    #[error(
        "function {address}.{selector} is granted more than once with different execution options"
    )]
    DuplicateFunction { address: Address, selector: Selector },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("{key} is not covered by the combined targets")]
    SubtrahendNotCovered { key: PermissionKey },
    #[error("split remainder does not recombine into the combined targets")]
    InexactSplit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    MergeConflict(#[from] MergeConflictError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<ValueError> for Error {
    fn from(value: ValueError) -> Self {
        Error::Validation(ValidationError::Value(value))
    }
}
