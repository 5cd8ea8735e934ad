//! Equality, difference and splitting of grants at `Or`-branch granularity.

use std::{collections::HashSet, iter};

use alloy_primitives::Address;
use roles_scope_types::{
    Condition, FunctionPermission, NormalizedCondition, Operator, Permission, PermissionKey,
    Target,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    condition::{condition_id, normalize_condition},
    errors::{Error, IntegrityError, ValidationError},
    targets::{aggregate, reconstruct_permissions, targets_equal, ReconstructOptions},
};

/// Everything that decides whether two permissions grant the same thing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionFingerprint {
    pub key: PermissionKey,
    pub send: bool,
    pub delegatecall: bool,
    /// Identifier of the normalized condition.
    pub condition: Option<Address>,
}

impl PermissionFingerprint {
    pub fn of(permission: &Permission) -> Result<Self, IntegrityError> {
        let condition = permission
            .condition()
            .map(normalize_condition)
            .transpose()?
            .map(|c| c.id);
        Ok(Self {
            key: permission.key(),
            send: permission.send(),
            delegatecall: permission.delegatecall(),
            condition,
        })
    }
}

/// Same target, flags, selector and condition (compared by normalized identifier).
pub fn permission_equals(a: &Permission, b: &Permission) -> Result<bool, IntegrityError> {
    Ok(PermissionFingerprint::of(a)? == PermissionFingerprint::of(b)?)
}

/// A permission restricted to one top-level `Or` branch of its normalized condition.
struct Branch {
    permission: Permission,
    fingerprint: PermissionFingerprint,
}

fn split_branches(permissions: &[Permission]) -> Result<Vec<Branch>, IntegrityError> {
    let mut branches = Vec::new();
    for permission in permissions {
        let Permission::Function(function) = permission else {
            branches.push(Branch {
                permission: permission.clone(),
                fingerprint: PermissionFingerprint::of(permission)?,
            });
            continue;
        };
        let Some(condition) = &function.condition else {
            branches.push(Branch {
                permission: permission.clone(),
                fingerprint: PermissionFingerprint::of(permission)?,
            });
            continue;
        };

        let normalized = normalize_condition(condition)?;
        for branch in normalized.branches() {
            let fingerprint = PermissionFingerprint {
                key: permission.key(),
                send: function.send,
                delegatecall: function.delegatecall,
                condition: Some(branch.id),
            };
            branches.push(Branch {
                permission: FunctionPermission {
                    condition: Some(branch.to_condition()),
                    ..function.clone()
                }
                .into(),
                fingerprint,
            });
        }
    }
    Ok(branches)
}

/// Branches of `a` that `b` does not grant identically.
pub fn diff_permissions(a: &[Permission], b: &[Permission]) -> Result<Vec<Permission>, Error> {
    let granted: HashSet<PermissionFingerprint> = split_branches(b)?
        .into_iter()
        .map(|branch| branch.fingerprint)
        .collect();
    Ok(split_branches(a)?
        .into_iter()
        .filter(|branch| !granted.contains(&branch.fingerprint))
        .map(|branch| branch.permission)
        .collect())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsDiff {
    /// Granted by the previous targets only.
    pub minus: Vec<Target>,
    /// Granted by the next targets only.
    pub plus: Vec<Target>,
}

const BRANCHES: ReconstructOptions = ReconstructOptions {
    split_or_branches: true,
};

/// Grants to revoke and to add when moving from `prev` to `next`.
pub fn diff_targets(prev: &[Target], next: &[Target]) -> Result<TargetsDiff, Error> {
    let prev = reconstruct_permissions(prev, BRANCHES);
    let next = reconstruct_permissions(next, BRANCHES);

    let (minus, _) = aggregate(&diff_permissions(&prev, &next)?)?;
    let (plus, _) = aggregate(&diff_permissions(&next, &prev)?)?;
    debug!(minus = minus.len(), plus = plus.len(), "diffed targets");
    Ok(TargetsDiff { minus, plus })
}

/// Remove from `combined` everything `subtrahend` already grants.
///
/// Combining the returned targets with `subtrahend` reproduces `combined`. An
/// unconditional entry of `combined` is kept whole even when `subtrahend` grants a
/// conditional part of it.
pub fn split_targets(combined: &[Target], subtrahend: &[Target]) -> Result<Vec<Target>, Error> {
    let mut remainder = reconstruct_permissions(combined, ReconstructOptions::default());
    let subtrahend_permissions = reconstruct_permissions(subtrahend, ReconstructOptions::default());

    for part in &subtrahend_permissions {
        let uncovered = || ValidationError::SubtrahendNotCovered { key: part.key() };
        let index = remainder
            .iter()
            .position(|permission| permission.same_grant(part))
            .ok_or_else(uncovered)?;

        let whole = remainder[index]
            .condition()
            .map(normalize_condition)
            .transpose()?;
        let taken = part.condition().map(normalize_condition).transpose()?;
        match (whole, taken) {
            (None, Some(_)) => {}
            (None, None) => {
                remainder.remove(index);
            }
            (Some(_), None) => return Err(uncovered().into()),
            (Some(whole), Some(taken)) => match subtract_all(whole, &taken)? {
                Subtraction::Uncovered => return Err(uncovered().into()),
                Subtraction::Emptied => {
                    remainder.remove(index);
                }
                Subtraction::Rest(rest) => {
                    if let Permission::Function(function) = &mut remainder[index] {
                        function.condition = Some(rest.to_condition());
                    }
                }
            },
        }
    }

    let (targets, _) = aggregate(&remainder)?;

    let recombined: Vec<Permission> = remainder
        .into_iter()
        .chain(subtrahend_permissions)
        .collect();
    let (recombined, _) = aggregate(&recombined)?;
    if !targets_equal(&recombined, combined) {
        return Err(ValidationError::InexactSplit.into());
    }
    debug!(remainder = targets.len(), "split targets");
    Ok(targets)
}

enum Subtraction {
    /// The subtracted condition grants something the whole does not.
    Uncovered,
    Emptied,
    Rest(NormalizedCondition),
}

/// `condition` as a list of alternatives with no `Or` left, inside `Matches`
/// members included. Undoes push-down.
fn alternatives(
    condition: &NormalizedCondition,
) -> Result<Vec<NormalizedCondition>, IntegrityError> {
    match condition.operator {
        Operator::Or => {
            let mut all = Vec::new();
            for branch in &condition.children {
                all.extend(alternatives(branch)?);
            }
            Ok(all)
        }
        Operator::Matches => {
            let mut rows: Vec<Vec<NormalizedCondition>> = vec![Vec::new()];
            for member in &condition.children {
                let choices = alternatives(member)?;
                rows = rows
                    .iter()
                    .flat_map(|row| {
                        choices.iter().map(move |choice| {
                            let mut row = row.clone();
                            row.push(choice.clone());
                            row
                        })
                    })
                    .collect();
            }
            rows.into_iter()
                .map(|children| -> Result<NormalizedCondition, IntegrityError> {
                    let mut node = NormalizedCondition {
                        children,
                        ..condition.clone()
                    };
                    node.id = condition_id(&node)?;
                    Ok(node)
                })
                .collect()
        }
        _ => Ok(vec![condition.clone()]),
    }
}

fn subtract_all(
    whole: NormalizedCondition,
    taken: &NormalizedCondition,
) -> Result<Subtraction, IntegrityError> {
    let mut seen = HashSet::new();
    let mut pending = alternatives(taken)?;
    pending.retain(|alternative| seen.insert(alternative.id));

    let mut rest = whole;
    for (n, alternative) in pending.iter().enumerate() {
        match subtract(&rest, alternative)? {
            Subtraction::Rest(next) => rest = next,
            Subtraction::Emptied if n + 1 == pending.len() => return Ok(Subtraction::Emptied),
            Subtraction::Emptied | Subtraction::Uncovered => return Ok(Subtraction::Uncovered),
        }
    }
    Ok(Subtraction::Rest(rest))
}

/// Take `alternative` (free of `Or`) out of `whole`.
///
/// The first branch of `whole` that contains it loses it; a `Matches` branch
/// is cut per member, leaving one piece per member that differs.
fn subtract(
    whole: &NormalizedCondition,
    alternative: &NormalizedCondition,
) -> Result<Subtraction, IntegrityError> {
    let branches = whole.branches();
    for (index, branch) in branches.iter().enumerate() {
        let rest = match subtract_from_branch(branch, alternative)? {
            Subtraction::Uncovered => continue,
            Subtraction::Emptied => None,
            Subtraction::Rest(rest) => Some(rest.to_condition()),
        };
        let remaining: Vec<Condition> = branches
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(_, branch)| branch.to_condition())
            .chain(rest)
            .collect();
        if remaining.is_empty() {
            return Ok(Subtraction::Emptied);
        }
        return Ok(Subtraction::Rest(normalize_condition(&Condition::or(remaining))?));
    }
    Ok(Subtraction::Uncovered)
}

fn subtract_from_branch(
    branch: &NormalizedCondition,
    alternative: &NormalizedCondition,
) -> Result<Subtraction, IntegrityError> {
    if branch.id == alternative.id {
        return Ok(Subtraction::Emptied);
    }
    if branch.operator != Operator::Matches
        || alternative.operator != Operator::Matches
        || branch.param_type != alternative.param_type
        || branch.children.len() != alternative.children.len()
    {
        return Ok(Subtraction::Uncovered);
    }

    let mut pieces = Vec::new();
    for (position, member) in branch.children.iter().enumerate() {
        match subtract(member, &alternative.children[position])? {
            Subtraction::Uncovered => return Ok(Subtraction::Uncovered),
            Subtraction::Emptied => {}
            Subtraction::Rest(rest) => {
                // members before `position` narrowed to the alternative, the rest as they were
                let members = alternative.children[..position]
                    .iter()
                    .map(NormalizedCondition::to_condition)
                    .chain(iter::once(rest.to_condition()))
                    .chain(
                        branch.children[position + 1..]
                            .iter()
                            .map(NormalizedCondition::to_condition),
                    )
                    .collect();
                pieces.push(Condition::matches(branch.param_type, members));
            }
        }
    }
    if pieces.is_empty() {
        return Ok(Subtraction::Emptied);
    }
    Ok(Subtraction::Rest(normalize_condition(&Condition::or(pieces))?))
}
