use thiserror::Error;

/// A raw discriminant that does not name any known variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("unknown parameter type {0}")]
    ParamType(u8),
    #[error("unknown operator {0}")]
    Operator(u8),
    #[error("unknown clearance {0}")]
    Clearance(u8),
    #[error("unknown execution options {0}")]
    ExecutionOptions(u8),
}
