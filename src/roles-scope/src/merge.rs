//! Folding of overlapping author-supplied permissions.
//!
//! Entries are grouped by [`PermissionKey`] and execution flags. Entries with the
//! same key but different flags are kept apart and rejected by the post-merge
//! checks.

use core::fmt;
use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use roles_scope_types::{Condition, Permission, PermissionKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::MergeConflictError;

/// Non-fatal events reported alongside a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Warning {
    /// The key was granted both with and without a condition; the result is unconditional.
    UnconditionalMerge { key: PermissionKey },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnconditionalMerge { key } => write!(
                f,
                "{key} is granted both with and without a condition, merged as unconditional"
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged entries in first-appearance order.
    pub permissions: Vec<Permission>,
    pub warnings: Vec<Warning>,
}

/// Collapse entries sharing key and flags, then check the result for conflicts.
///
/// Merged conditions are OR-combined but not normalized.
pub fn merge_permissions(permissions: &[Permission]) -> Result<MergeOutcome, MergeConflictError> {
    let mut merged: Vec<Permission> = Vec::with_capacity(permissions.len());
    let mut warnings = Vec::new();

    for permission in permissions {
        match merged.iter_mut().find(|existing| existing.same_grant(permission)) {
            Some(existing) => {
                if let Some(warning) = merge_into(existing, permission) {
                    warn!(key = %permission.key(), "{warning}");
                    warnings.push(warning);
                }
            }
            None => merged.push(permission.clone()),
        }
    }

    check_merged(&merged)?;
    Ok(MergeOutcome {
        permissions: merged,
        warnings,
    })
}

fn merge_into(existing: &mut Permission, incoming: &Permission) -> Option<Warning> {
    let (Permission::Function(existing), Permission::Function(incoming)) = (existing, incoming)
    else {
        return None;
    };

    match (existing.condition.take(), incoming.condition.as_ref()) {
        (None, None) => None,
        (Some(_), None) | (None, Some(_)) => Some(Warning::UnconditionalMerge {
            key: PermissionKey::Function(existing.target_address, existing.selector),
        }),
        (Some(left), Some(right)) => {
            existing.condition = Some(combine_or(&left, right));
            None
        }
    }
}

/// `Or` over the top-level branches of both sides.
pub fn combine_or(left: &Condition, right: &Condition) -> Condition {
    Condition::or(
        left.branches()
            .iter()
            .chain(right.branches())
            .cloned()
            .collect(),
    )
}

/// Rejects entries that could not be folded into one consistent set of targets.
pub fn check_merged(permissions: &[Permission]) -> Result<(), MergeConflictError> {
    let mut clearance: HashMap<Address, bool> = HashMap::new();
    let mut keys = HashSet::new();

    for permission in permissions {
        let address = permission.target_address();
        let scoped = permission.selector().is_some();
        if *clearance.entry(address).or_insert(scoped) != scoped {
            return Err(MergeConflictError::ClearanceCollision { address });
        }

        let key = permission.key();
        if !keys.insert(key) {
            return Err(match key {
                PermissionKey::Target(address) => MergeConflictError::DuplicateTarget { address },
                PermissionKey::Function(address, selector) => {
                    MergeConflictError::DuplicateFunction { address, selector }
                }
            });
        }
    }
    Ok(())
}
