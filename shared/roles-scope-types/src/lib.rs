//! Shared types for role-scoped call permissions.
//!
//! Used by the normalizer/aggregation core and by tooling that reads or writes
//! the JSON forms of conditions, permissions and targets.

pub mod condition;
pub mod errors;
pub mod permission;
pub mod target;

pub use condition::{
    Condition, ConditionFlat, ConditionNode, NormalizedCondition, Operator, ParamType,
};
pub use errors::ValueError;
pub use permission::{
    Annotation, FunctionPermission, Permission, PermissionItem, PermissionKey, PermissionSet,
    TargetPermission,
};
pub use target::{Clearance, ExecutionOptions, Function, Target};
