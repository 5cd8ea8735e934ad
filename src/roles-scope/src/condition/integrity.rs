//! Node-level structural checks and type compatibility of logical groups.

use roles_scope_types::{ConditionNode, Operator, ParamType};

use crate::errors::IntegrityError;

/// Type information a subtree pins down: its param type and, for composites,
/// the positional types of its members (`None` where a position is unconstrained
/// by type, eg a None-typed allowance check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeTree {
    pub param_type: ParamType,
    pub children: Vec<Option<TypeTree>>,
}

fn param_type_supported(operator: Operator, param_type: ParamType) -> bool {
    use Operator::*;
    match operator {
        Pass | Custom => true,
        And | Or | Nor | Xor => param_type == ParamType::None,
        Matches => param_type.is_composite(),
        ArraySome | ArrayEvery | ArraySubset => param_type == ParamType::Array,
        EqualTo => matches!(
            param_type,
            ParamType::Static | ParamType::Dynamic | ParamType::Tuple | ParamType::Array
        ),
        Bitmask => matches!(param_type, ParamType::Static | ParamType::Dynamic),
        EqualToAvatar | GreaterThan | LessThan | SignedIntGreaterThan | SignedIntLessThan
        | WithinAllowance => param_type == ParamType::Static,
        EtherWithinAllowance | CallWithinAllowance => param_type == ParamType::None,
    }
}

/// Checks a single node (children are not visited).
pub fn check_node<N: ConditionNode>(node: &N) -> Result<(), IntegrityError> {
    let operator = node.operator();
    let param_type = node.param_type();
    if !param_type_supported(operator, param_type) {
        return Err(IntegrityError::UnsupportedParamType {
            operator,
            param_type,
        });
    }

    let has_children = !node.children().is_empty();
    if operator.is_comparison() {
        if has_children {
            return Err(IntegrityError::UnexpectedChildren { operator });
        }
        match (operator.has_comp_value(), node.comp_value().is_some()) {
            (true, false) => return Err(IntegrityError::MissingCompValue { operator }),
            (false, true) => return Err(IntegrityError::UnexpectedCompValue { operator }),
            _ => {}
        }
        return Ok(());
    }

    if node.comp_value().is_some() {
        return Err(IntegrityError::UnexpectedCompValue { operator });
    }
    if operator != Operator::Pass && !has_children {
        return Err(IntegrityError::MissingChildren { operator });
    }
    if matches!(operator, Operator::ArraySome | Operator::ArrayEvery) && node.children().len() != 1
    {
        return Err(IntegrityError::ChildCount {
            operator,
            count: node.children().len(),
        });
    }
    Ok(())
}

/// Checks every node of a tree plus type compatibility of all logical groups.
pub fn check_condition_integrity<N: ConditionNode>(root: &N) -> Result<(), IntegrityError> {
    fn visit<N: ConditionNode>(node: &N) -> Result<(), IntegrityError> {
        check_node(node)?;
        node.children().iter().try_for_each(visit)
    }
    visit(root)?;
    scoped_type(root).map(|_| ())
}

/// Resolves the type tree of a subtree, failing if a logical group mixes
/// incompatible types.
pub(crate) fn scoped_type<N: ConditionNode>(node: &N) -> Result<Option<TypeTree>, IntegrityError> {
    let operator = node.operator();
    if operator.is_logical() {
        return resolve_group(operator, node.children());
    }

    let param_type = node.param_type();
    if param_type == ParamType::None {
        return Ok(None);
    }
    let children = if param_type.is_composite() {
        node.children()
            .iter()
            .map(scoped_type)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };
    Ok(Some(TypeTree {
        param_type,
        children,
    }))
}

fn resolve_group<N: ConditionNode>(
    operator: Operator,
    children: &[N],
) -> Result<Option<TypeTree>, IntegrityError> {
    let mut resolved: Option<TypeTree> = None;
    for child in children {
        let Some(tree) = scoped_type(child)? else {
            continue;
        };
        resolved = Some(match resolved {
            None => tree,
            Some(existing) => unify(operator, existing, tree)?,
        });
    }
    Ok(resolved)
}

/// Fails if `children` cannot share one logical group.
pub(crate) fn check_group<N: ConditionNode>(
    operator: Operator,
    children: &[N],
) -> Result<(), IntegrityError> {
    resolve_group(operator, children).map(|_| ())
}

fn unify(operator: Operator, left: TypeTree, right: TypeTree) -> Result<TypeTree, IntegrityError> {
    if left.param_type != right.param_type {
        return Err(IntegrityError::IncompatibleParamTypes {
            operator,
            left: left.param_type,
            right: right.param_type,
        });
    }
    let param_type = left.param_type;
    let (mut long, short) = if left.children.len() >= right.children.len() {
        (left.children, right.children)
    } else {
        (right.children, left.children)
    };
    for (slot, other) in long.iter_mut().zip(short) {
        *slot = match (slot.take(), other) {
            (Some(a), Some(b)) => Some(unify(operator, a, b)?),
            (a, b) => a.or(b),
        };
    }
    Ok(TypeTree {
        param_type,
        children: long,
    })
}

/// Whether two subtrees may sit in the same logical group.
pub(crate) fn compatible<N: ConditionNode>(a: &N, b: &N) -> bool {
    match (scoped_type(a), scoped_type(b)) {
        (Ok(Some(a)), Ok(Some(b))) => unify(Operator::Or, a, b).is_ok(),
        (Ok(_), Ok(_)) => true,
        _ => false,
    }
}

/// Whether the subtree's value is ABI-encoded out of line (behind an offset).
pub(crate) fn is_dynamic<N: ConditionNode>(node: &N) -> bool {
    if node.operator().is_logical() {
        return node.children().iter().any(is_dynamic);
    }
    match node.param_type() {
        ParamType::Dynamic | ParamType::Array | ParamType::Calldata | ParamType::AbiEncoded => true,
        ParamType::Tuple => node.children().iter().any(is_dynamic),
        ParamType::Static | ParamType::None => false,
    }
}
