//! Policy core for role-scoped contract calls.
//!
//! - [`condition`]: integrity checks, breadth-first flattening, content addressing
//!   and canonicalization of condition trees
//! - [`merge`]: folding of overlapping author-supplied permissions
//! - [`targets`]: permissions to per-address targets and back
//! - [`diff`]: equality, diff and split of grants
//! - [`presets`]: matching preset bundles against a ground-truth permission list
//!
//! All operations are pure and synchronous. Warnings are returned with results
//! and mirrored as `tracing` events; no subscriber is installed here.

pub mod condition;
pub mod diff;
pub mod errors;
pub mod merge;
pub mod presets;
pub mod targets;

pub use condition::{
    check_breadth_first, check_condition_integrity, condition_address, condition_id,
    creation_bytecode, flatten_condition, normalize_condition, pack_conditions,
    unflatten_condition,
};
pub use diff::{
    diff_permissions, diff_targets, permission_equals, split_targets, PermissionFingerprint,
    TargetsDiff,
};
pub use errors::{Error, IntegrityError, MergeConflictError, ValidationError};
pub use merge::{merge_permissions, MergeOutcome, Warning};
pub use presets::{filter_presets, validate_presets, PresetValidation};
pub use targets::{
    process_permissions, reconstruct_permissions, targets_equal, ProcessedPermissions,
    ReconstructOptions,
};
