//! Canonicalization of condition trees.
//!
//! Works bottom-up: a node is reduced only once all of its children are in
//! normal form, so every reduction can rely on child identifiers being final.
//! Reductions per node:
//! - trailing unconstrained members of a dynamically encoded `Matches` are dropped
//! - nested `And`/`Or` groups are spliced into a parent of the same operator
//! - duplicate branches of `And`/`Or`/`Nor` collapse
//! - children of commutative operators are ordered by identifier
//! - `Or` branches that differ in a single `Matches` position are pushed down into
//!   an `Or` at that position
//! - single-branch `And`/`Or` is replaced by its branch

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes};
use roles_scope_types::{Condition, NormalizedCondition, Operator, ParamType};
use tracing::debug;

use crate::{
    condition::{
        id::condition_id,
        integrity::{check_group, check_node, compatible, is_dynamic},
    },
    errors::IntegrityError,
};

/// Reduce `condition` to its canonical form.
///
/// Idempotent, and never changes which argument values satisfy the tree.
pub fn normalize_condition(condition: &Condition) -> Result<NormalizedCondition, IntegrityError> {
    let normalized = normalize_node(condition)?;
    debug!(id = %normalized.id, operator = ?normalized.operator, "normalized condition");
    Ok(normalized)
}

fn normalize_node(condition: &Condition) -> Result<NormalizedCondition, IntegrityError> {
    check_node(condition)?;
    let children = condition
        .children
        .iter()
        .map(normalize_node)
        .collect::<Result<Vec<_>, _>>()?;
    canonicalize(
        condition.param_type,
        condition.operator,
        condition.comp_value.clone(),
        children,
    )
}

/// Reduce one node whose children are already normalized.
fn canonicalize(
    param_type: ParamType,
    operator: Operator,
    comp_value: Option<Bytes>,
    mut children: Vec<NormalizedCondition>,
) -> Result<NormalizedCondition, IntegrityError> {
    if operator == Operator::Matches {
        prune_trailing_pass(param_type, &mut children);
    }

    if operator.is_logical() {
        children = reduce_group(operator, children);
        if operator == Operator::Or {
            while let Some(rewritten) = push_down_or(&children)? {
                children = reduce_group(operator, rewritten);
            }
        }
        check_group(operator, &children)?;

        if matches!(operator, Operator::And | Operator::Or) && children.len() == 1 {
            if let Some(only) = children.pop() {
                return Ok(only);
            }
        }
    }

    let mut node = NormalizedCondition {
        id: Address::ZERO,
        param_type,
        operator,
        children,
        comp_value,
    };
    node.id = condition_id(&node)?;
    Ok(node)
}

fn flattens(operator: Operator) -> bool {
    matches!(operator, Operator::And | Operator::Or)
}

fn prunes_duplicates(operator: Operator) -> bool {
    matches!(operator, Operator::And | Operator::Or | Operator::Nor)
}

fn reduce_group(
    operator: Operator,
    children: Vec<NormalizedCondition>,
) -> Vec<NormalizedCondition> {
    let mut children: Vec<NormalizedCondition> = if flattens(operator) {
        children
            .into_iter()
            .flat_map(|child| {
                if child.operator == operator {
                    child.children
                } else {
                    vec![child]
                }
            })
            .collect()
    } else {
        children
    };

    if prunes_duplicates(operator) {
        let mut seen = HashSet::new();
        children.retain(|child| seen.insert(child.id));
    }
    if operator.is_commutative() {
        children.sort_by_key(|child| child.id);
    }
    children
}

fn is_unconstrained(node: &NormalizedCondition) -> bool {
    node.operator == Operator::Pass && node.children.iter().all(is_unconstrained)
}

/// Drop trailing members that constrain nothing.
///
/// Only for layouts where each member is located independently of the ones after
/// it: calldata, abi-encoded bytes and tuples encoded behind an offset. A static
/// tuple is inlined into its parent, so its member count is part of the layout.
fn prune_trailing_pass(param_type: ParamType, children: &mut Vec<NormalizedCondition>) {
    let tuple = match param_type {
        ParamType::Calldata | ParamType::AbiEncoded => false,
        ParamType::Tuple if children.iter().any(is_dynamic) => true,
        // array members are element patterns; dropping one changes the required length
        ParamType::Array => return,
        _ => return,
    };

    while children.len() > 1 {
        let Some(last) = children.last() else {
            break;
        };
        if !is_unconstrained(last) {
            break;
        }
        // a tuple must keep at least one dynamic member to stay offset-encoded
        if tuple && !children[..children.len() - 1].iter().any(is_dynamic) {
            break;
        }
        children.pop();
    }
}

/// Position of the only member in which two `Matches` branches differ.
fn single_difference(a: &NormalizedCondition, b: &NormalizedCondition) -> Option<usize> {
    if a.operator != Operator::Matches
        || b.operator != Operator::Matches
        || a.param_type != b.param_type
        || a.children.len() != b.children.len()
    {
        return None;
    }

    let mut differing = a
        .children
        .iter()
        .zip(&b.children)
        .enumerate()
        .filter(|(_, (x, y))| x.id != y.id)
        .map(|(position, _)| position);
    let position = differing.next()?;
    match differing.next() {
        Some(_) => None,
        None => Some(position),
    }
}

/// Merge the first pair of `Or` branches that differ in exactly one `Matches`
/// position. Returns the rewritten branch list, or `None` at the fixpoint.
fn push_down_or(
    branches: &[NormalizedCondition],
) -> Result<Option<Vec<NormalizedCondition>>, IntegrityError> {
    for i in 0..branches.len() {
        for j in (i + 1)..branches.len() {
            let Some(position) = single_difference(&branches[i], &branches[j]) else {
                continue;
            };
            let left = &branches[i].children[position];
            let right = &branches[j].children[position];
            if !compatible(left, right) {
                continue;
            }

            let alternatives = canonicalize(
                ParamType::None,
                Operator::Or,
                None,
                vec![left.clone(), right.clone()],
            )?;
            let mut members = branches[i].children.clone();
            members[position] = alternatives;
            let merged = canonicalize(branches[i].param_type, Operator::Matches, None, members)?;

            let mut rewritten: Vec<NormalizedCondition> = branches
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != i && *k != j)
                .map(|(_, branch)| branch.clone())
                .collect();
            rewritten.push(merged);
            return Ok(Some(rewritten));
        }
    }
    Ok(None)
}
