//! Breadth-first flat form of condition trees, as consumed by the roles contract
//! and produced by the indexer.

use std::collections::VecDeque;

use roles_scope_types::{Condition, ConditionFlat, ConditionNode};

use crate::errors::IntegrityError;

/// Flatten a tree breadth-first; each entry records the list index of its parent.
pub fn flatten_condition<N: ConditionNode>(root: &N) -> Vec<ConditionFlat> {
    let mut flat = Vec::new();
    let mut queue: VecDeque<(&N, usize)> = VecDeque::new();
    queue.push_back((root, 0));

    while let Some((node, parent)) = queue.pop_front() {
        let index = flat.len();
        flat.push(ConditionFlat {
            parent,
            param_type: node.param_type(),
            operator: node.operator(),
            comp_value: node.comp_value().cloned(),
        });
        for child in node.children() {
            queue.push_back((child, index));
        }
    }
    flat
}

/// Reject lists that are not parent-before-child breadth-first ordered.
///
/// The root sits at index 0 and refers to itself; every later entry points to an
/// earlier one, and parent indices never decrease.
pub fn check_breadth_first(flat: &[ConditionFlat]) -> Result<(), IntegrityError> {
    let Some(root) = flat.first() else {
        return Err(IntegrityError::EmptyConditionList);
    };
    if root.parent != 0 {
        return Err(IntegrityError::NotBreadthFirst { index: 0 });
    }

    let mut previous = 0usize;
    for (index, condition) in flat.iter().enumerate().skip(1) {
        if condition.parent >= index || condition.parent < previous {
            return Err(IntegrityError::NotBreadthFirst { index });
        }
        previous = condition.parent;
    }
    Ok(())
}

/// Rebuild a tree from its breadth-first list.
pub fn unflatten_condition(flat: &[ConditionFlat]) -> Result<Condition, IntegrityError> {
    check_breadth_first(flat)?;

    let mut nodes: Vec<Condition> = flat
        .iter()
        .map(|c| Condition {
            param_type: c.param_type,
            operator: c.operator,
            children: Vec::new(),
            comp_value: c.comp_value.clone(),
        })
        .collect();

    // Walk backwards so a node is complete before it moves into its parent.
    // Children arrive in reverse and are put back in order on the way up.
    for index in (1..flat.len()).rev() {
        let Some(mut node) = nodes.pop() else {
            break;
        };
        node.children.reverse();
        nodes[flat[index].parent].children.push(node);
    }

    let mut root = nodes.pop().ok_or(IntegrityError::EmptyConditionList)?;
    root.children.reverse();
    Ok(root)
}

#[cfg(test)]
mod tests {
    use roles_scope_types::{Operator, ParamType};

    use super::*;

    fn eq_static(byte: u8) -> Condition {
        Condition::equal_to(ParamType::Static, vec![byte; 32])
    }

    fn sample() -> Condition {
        Condition::matches(
            ParamType::Calldata,
            vec![
                Condition::or(vec![eq_static(1), eq_static(2)]),
                Condition::pass(ParamType::Static),
                Condition::matches(ParamType::Tuple, vec![eq_static(3), eq_static(4)]),
            ],
        )
    }

    #[test]
    fn flattens_breadth_first() {
        let flat = flatten_condition(&sample());
        let parents: Vec<usize> = flat.iter().map(|c| c.parent).collect();
        assert_eq!(parents, vec![0, 0, 0, 0, 1, 1, 3, 3]);
        assert_eq!(flat[1].operator, Operator::Or);
        assert_eq!(flat[3].param_type, ParamType::Tuple);
        assert_eq!(
            flat[6].comp_value.as_ref().map(|v| v.to_vec()),
            Some(vec![3u8; 32])
        );
        assert_eq!(check_breadth_first(&flat), Ok(()));
    }

    #[test]
    fn unflatten_restores_the_tree() {
        let tree = sample();
        assert_eq!(unflatten_condition(&flatten_condition(&tree)), Ok(tree));
        let leaf = eq_static(9);
        assert_eq!(unflatten_condition(&flatten_condition(&leaf)), Ok(leaf));
    }

    #[test]
    fn rejects_out_of_order_lists() {
        let mut flat = flatten_condition(&sample());
        flat.swap(4, 6);
        assert_eq!(
            check_breadth_first(&flat),
            Err(IntegrityError::NotBreadthFirst { index: 5 })
        );

        let mut forward = flatten_condition(&sample());
        forward[2].parent = 5;
        assert_eq!(
            check_breadth_first(&forward),
            Err(IntegrityError::NotBreadthFirst { index: 2 })
        );

        let mut rootless = flatten_condition(&sample());
        rootless[0].parent = 1;
        assert_eq!(
            unflatten_condition(&rootless),
            Err(IntegrityError::NotBreadthFirst { index: 0 })
        );

        assert_eq!(check_breadth_first(&[]), Err(IntegrityError::EmptyConditionList));
    }
}
