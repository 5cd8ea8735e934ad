//! Mapping between flat permission lists and per-address [`Target`] records.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_primitives::{Address, Selector};
use roles_scope_types::{
    Annotation, Clearance, Condition, ExecutionOptions, Function, FunctionPermission, Permission,
    PermissionItem, Target, TargetPermission,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    condition::normalize_condition,
    errors::Error,
    merge::{merge_permissions, Warning},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedPermissions {
    pub targets: Vec<Target>,
    /// Unique by `uri`, first occurrence wins.
    pub annotations: Vec<Annotation>,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconstructOptions {
    /// Emit one function permission per top-level `Or` branch.
    pub split_or_branches: bool,
}

/// Aggregate permissions and permission sets into targets.
pub fn process_permissions(items: &[PermissionItem]) -> Result<ProcessedPermissions, Error> {
    let mut permissions = Vec::new();
    let mut annotations: Vec<Annotation> = Vec::new();
    let mut seen_uris = HashSet::new();

    for item in items {
        match item {
            PermissionItem::Single(permission) => permissions.push(permission.clone()),
            PermissionItem::Set(set) => {
                permissions.extend(set.permissions.iter().cloned());
                if let Some(annotation) = &set.annotation {
                    if seen_uris.insert(annotation.uri.clone()) {
                        annotations.push(annotation.clone());
                    }
                }
            }
        }
    }

    let (targets, warnings) = aggregate(&permissions)?;
    debug!(
        permissions = permissions.len(),
        targets = targets.len(),
        annotations = annotations.len(),
        "processed permissions"
    );
    Ok(ProcessedPermissions {
        targets,
        annotations,
        warnings,
    })
}

/// Merge `permissions` and fold them into one target per address.
pub(crate) fn aggregate(permissions: &[Permission]) -> Result<(Vec<Target>, Vec<Warning>), Error> {
    let merged = merge_permissions(permissions)?;

    let mut targets: Vec<Target> = Vec::new();
    let mut index: HashMap<Address, usize> = HashMap::new();

    for permission in &merged.permissions {
        match permission {
            Permission::Target(p) => {
                index.insert(p.target_address, targets.len());
                targets.push(Target {
                    address: p.target_address,
                    clearance: Clearance::Target,
                    execution_options: ExecutionOptions::from_flags(p.send, p.delegatecall),
                    functions: Vec::new(),
                });
            }
            Permission::Function(p) => {
                let condition = p.condition.as_ref().map(normalize_condition).transpose()?;
                let function = Function {
                    selector: p.selector,
                    execution_options: ExecutionOptions::from_flags(p.send, p.delegatecall),
                    wildcarded: condition.is_none(),
                    condition,
                };
                let position = *index.entry(p.target_address).or_insert_with(|| {
                    targets.push(Target {
                        address: p.target_address,
                        clearance: Clearance::Function,
                        execution_options: ExecutionOptions::None,
                        functions: Vec::new(),
                    });
                    targets.len() - 1
                });
                targets[position].functions.push(function);
            }
        }
    }
    Ok((targets, merged.warnings))
}

/// Map targets back to permissions.
///
/// Reprocessing the output yields targets equal to the input, with or without
/// branch splitting.
pub fn reconstruct_permissions(targets: &[Target], options: ReconstructOptions) -> Vec<Permission> {
    let mut permissions = Vec::new();
    for target in targets {
        match target.clearance {
            Clearance::None => {}
            Clearance::Target => permissions.push(
                TargetPermission {
                    target_address: target.address,
                    send: target.execution_options.send(),
                    delegatecall: target.execution_options.delegatecall(),
                }
                .into(),
            ),
            Clearance::Function => {
                for function in &target.functions {
                    let permission = |condition: Option<Condition>| -> Permission {
                        FunctionPermission {
                            target_address: target.address,
                            selector: function.selector,
                            send: function.execution_options.send(),
                            delegatecall: function.execution_options.delegatecall(),
                            condition,
                        }
                        .into()
                    };
                    match &function.condition {
                        Some(condition) if options.split_or_branches => permissions.extend(
                            condition
                                .branches()
                                .iter()
                                .map(|branch| permission(Some(branch.to_condition()))),
                        ),
                        condition => permissions
                            .push(permission(condition.as_ref().map(|c| c.to_condition()))),
                    }
                }
            }
        }
    }
    permissions
}

#[derive(PartialEq, Eq)]
struct TargetShape {
    clearance: Clearance,
    execution_options: ExecutionOptions,
    functions: BTreeMap<Selector, (ExecutionOptions, bool, Option<Address>)>,
}

fn shapes(targets: &[Target]) -> BTreeMap<Address, TargetShape> {
    targets
        .iter()
        .filter(|target| target.clearance != Clearance::None)
        .map(|target| {
            let functions = target
                .functions
                .iter()
                .map(|f| {
                    (
                        f.selector,
                        (
                            f.execution_options,
                            f.wildcarded,
                            f.condition.as_ref().map(|c| c.id),
                        ),
                    )
                })
                .collect();
            (
                target.address,
                TargetShape {
                    clearance: target.clearance,
                    execution_options: target.execution_options,
                    functions,
                },
            )
        })
        .collect()
}

/// Order-insensitive equality; conditions compare by identifier and
/// `Clearance::None` targets are ignored.
pub fn targets_equal(a: &[Target], b: &[Target]) -> bool {
    shapes(a) == shapes(b)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, fixed_bytes, U256};
    use roles_scope_types::{Operator, ParamType, PermissionSet};

    use super::*;
    use crate::errors::MergeConflictError;

    const A: Address = address!("00000000000000000000000000000000000000aa");
    const B: Address = address!("00000000000000000000000000000000000000bb");
    const TRANSFER: Selector = fixed_bytes!("a9059cbb");
    const APPROVE: Selector = fixed_bytes!("095ea7b3");

    fn eq(n: u64) -> Condition {
        Condition::equal_to(ParamType::Static, U256::from(n).to_be_bytes::<32>().to_vec())
    }

    fn function(
        address: Address,
        selector: Selector,
        send: bool,
        condition: Option<Condition>,
    ) -> PermissionItem {
        Permission::from(FunctionPermission {
            target_address: address,
            selector,
            send,
            delegatecall: false,
            condition,
        })
        .into()
    }

    fn target(address: Address, send: bool, delegatecall: bool) -> PermissionItem {
        Permission::from(TargetPermission {
            target_address: address,
            send,
            delegatecall,
        })
        .into()
    }

    fn annotated(uri: &str, permissions: Vec<PermissionItem>) -> PermissionItem {
        PermissionSet {
            permissions: permissions
                .into_iter()
                .filter_map(|item| match item {
                    PermissionItem::Single(p) => Some(p),
                    PermissionItem::Set(_) => None,
                })
                .collect(),
            annotation: Some(Annotation {
                uri: uri.to_string(),
                schema: "https://example.org/openapi.json".to_string(),
            }),
        }
        .into()
    }

    fn calldata(first: u64, second: u64) -> Condition {
        Condition::matches(ParamType::Calldata, vec![eq(first), eq(second)])
    }

    #[test]
    fn targets_follow_first_appearance() {
        let processed = process_permissions(&[
            function(B, TRANSFER, false, None),
            target(A, true, true),
            function(B, APPROVE, true, Some(eq(1))),
        ])
        .unwrap();

        assert_eq!(processed.targets.len(), 2);
        let b = &processed.targets[0];
        assert_eq!(b.address, B);
        assert_eq!(b.clearance, Clearance::Function);
        assert_eq!(b.execution_options, ExecutionOptions::None);
        assert_eq!(b.functions[0].selector, TRANSFER);
        assert!(b.functions[0].wildcarded);
        assert!(b.functions[0].condition.is_none());
        assert_eq!(b.functions[1].execution_options, ExecutionOptions::Send);
        assert!(!b.functions[1].wildcarded);

        let a = &processed.targets[1];
        assert_eq!(a.clearance, Clearance::Target);
        assert_eq!(a.execution_options, ExecutionOptions::Both);
        assert!(a.functions.is_empty());
    }

    #[test]
    fn annotations_are_unique_by_uri() {
        let processed = process_permissions(&[
            annotated("https://example.org/a", vec![target(A, false, false)]),
            annotated("https://example.org/b", vec![function(B, TRANSFER, false, None)]),
            annotated("https://example.org/a", vec![target(A, false, false)]),
        ])
        .unwrap();
        let uris: Vec<&str> = processed
            .annotations
            .iter()
            .map(|a| a.uri.as_str())
            .collect();
        assert_eq!(uris, vec!["https://example.org/a", "https://example.org/b"]);
        assert_eq!(processed.targets.len(), 2);
    }

    #[test]
    fn merged_conditions_are_normalized() {
        let processed = process_permissions(&[
            function(A, TRANSFER, false, Some(calldata(1, 9))),
            function(A, TRANSFER, false, Some(calldata(2, 9))),
        ])
        .unwrap();
        let condition = processed.targets[0].functions[0].condition.as_ref().unwrap();
        assert_eq!(condition.operator, Operator::Matches);
        assert_eq!(condition.children[0].operator, Operator::Or);
        assert_eq!(
            condition,
            &normalize_condition(&Condition::matches(
                ParamType::Calldata,
                vec![Condition::or(vec![eq(1), eq(2)]), eq(9)],
            ))
            .unwrap()
        );
    }

    #[test]
    fn conflicts_surface_as_errors() {
        let result =
            process_permissions(&[target(A, false, false), function(A, TRANSFER, false, None)]);
        assert_eq!(
            result,
            Err(Error::MergeConflict(MergeConflictError::ClearanceCollision { address: A }))
        );
    }

    #[test]
    fn unconditional_merge_is_reported() {
        let processed = process_permissions(&[
            function(A, TRANSFER, false, Some(eq(1))),
            function(A, TRANSFER, false, None),
        ])
        .unwrap();
        assert!(processed.targets[0].functions[0].wildcarded);
        assert_eq!(processed.warnings.len(), 1);
    }

    #[test]
    fn reconstruct_decodes_options_and_skips_unscoped() {
        let targets = vec![
            Target {
                address: A,
                clearance: Clearance::Target,
                execution_options: ExecutionOptions::DelegateCall,
                functions: Vec::new(),
            },
            Target {
                address: B,
                clearance: Clearance::None,
                execution_options: ExecutionOptions::None,
                functions: Vec::new(),
            },
        ];
        let permissions = reconstruct_permissions(&targets, ReconstructOptions::default());
        assert_eq!(
            permissions,
            vec![Permission::Target(TargetPermission {
                target_address: A,
                send: false,
                delegatecall: true,
            })]
        );
    }

    #[test]
    fn both_reconstruction_forms_reprocess_to_the_same_targets() {
        let processed = process_permissions(&[
            function(A, TRANSFER, true, Some(calldata(1, 2))),
            function(A, TRANSFER, true, Some(calldata(3, 4))),
            function(A, APPROVE, false, None),
            target(B, false, false),
        ])
        .unwrap();

        let whole = reconstruct_permissions(&processed.targets, ReconstructOptions::default());
        let split = reconstruct_permissions(
            &processed.targets,
            ReconstructOptions {
                split_or_branches: true,
            },
        );
        assert_eq!(whole.len(), 3);
        assert_eq!(split.len(), 4);

        for permissions in [whole, split] {
            let items: Vec<PermissionItem> = permissions.into_iter().map(Into::into).collect();
            let again = process_permissions(&items).unwrap();
            assert!(targets_equal(&again.targets, &processed.targets));
            assert_eq!(again.targets, processed.targets);
        }
    }

    #[test]
    fn target_equality_ignores_order_and_unscoped_targets() {
        let processed = process_permissions(&[
            function(A, TRANSFER, false, None),
            function(A, APPROVE, false, Some(eq(5))),
            target(B, false, false),
        ])
        .unwrap();
        let mut shuffled = processed.targets.clone();
        shuffled.reverse();
        shuffled[1].functions.reverse();
        shuffled.push(Target {
            address: address!("00000000000000000000000000000000000000cc"),
            clearance: Clearance::None,
            execution_options: ExecutionOptions::None,
            functions: Vec::new(),
        });
        assert!(targets_equal(&processed.targets, &shuffled));

        shuffled[1].functions[0].execution_options = ExecutionOptions::Send;
        assert!(!targets_equal(&processed.targets, &shuffled));
    }
}
