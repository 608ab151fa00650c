//! In-memory helpers over items that already carry their relations.

/// Pre-order flattening of `items` and all their descendants.
pub fn flatten<T, F, C>(items: impl IntoIterator<Item = T>, children_of: F) -> Vec<T>
where
    F: Fn(&T) -> C,
    C: IntoIterator<Item = T>,
{
    let mut stack: Vec<T> = items.into_iter().collect();
    stack.reverse();
    let mut out = Vec::new();
    while let Some(item) = stack.pop() {
        let mut children: Vec<T> = children_of(&item).into_iter().collect();
        children.reverse();
        stack.extend(children);
        out.push(item);
    }
    out
}

/// Distance to the top of the parent chain: 1 for an item without a parent.
pub fn ancestor_depth<'a, T, P>(item: &'a T, parent_of: P) -> usize
where
    P: Fn(&'a T) -> Option<&'a T>,
{
    let mut depth = 1;
    let mut current = item;
    while let Some(parent) = parent_of(current) {
        depth += 1;
        current = parent;
    }
    depth
}

/// Whether `item` itself or one of its ancestors has id `target`.
///
/// A missing item or a missing target never matches. The walk stops at the
/// first node without an id, so ancestors above it are not considered.
pub fn is_in_parent<'a, T, I, P, G>(
    item: Option<&'a T>,
    parent_of: P,
    id_of: G,
    target: Option<&I>,
) -> bool
where
    P: Fn(&'a T) -> Option<&'a T>,
    G: Fn(&T) -> Option<I>,
    I: PartialEq,
{
    let Some(target) = target else {
        return false;
    };
    let mut current = item;
    while let Some(node) = current {
        let Some(id) = id_of(node) else {
            return false;
        };
        if id == *target {
            return true;
        }
        current = parent_of(node);
    }
    false
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    struct Node {
        id: Option<i64>,
        parent: Option<Box<Node>>,
    }

    fn chain() -> Node {
        let root = Node {
            id: Some(1),
            parent: None,
        };
        let middle = Node {
            id: Some(2),
            parent: Some(Box::new(root)),
        };
        Node {
            id: Some(3),
            parent: Some(Box::new(middle)),
        }
    }

    fn parent(n: &Node) -> Option<&Node> {
        n.parent.as_deref()
    }

    #[test]
    fn depth_counts_parent_hops() {
        let leaf = chain();
        assert_eq!(ancestor_depth(&leaf, parent), 3);
        assert_eq!(ancestor_depth(leaf.parent.as_deref().unwrap(), parent), 2);
        let lone = Node {
            id: Some(9),
            parent: None,
        };
        assert_eq!(ancestor_depth(&lone, parent), 1);
    }

    #[test]
    fn is_in_parent_walks_up() {
        let leaf = chain();
        let id = |n: &Node| n.id;
        assert!(is_in_parent(Some(&leaf), parent, id, Some(&3)));
        assert!(is_in_parent(Some(&leaf), parent, id, Some(&2)));
        assert!(is_in_parent(Some(&leaf), parent, id, Some(&1)));
        assert!(!is_in_parent(Some(&leaf), parent, id, Some(&4)));
    }

    #[test]
    fn is_in_parent_handles_missing_values() {
        let leaf = chain();
        let id = |n: &Node| n.id;
        assert!(!is_in_parent(None, parent, id, Some(&1)));
        assert!(!is_in_parent(Some(&leaf), parent, id, None));

        let anonymous = Node {
            id: None,
            parent: None,
        };
        assert!(!is_in_parent(Some(&anonymous), parent, id, Some(&0)));
    }

    #[test]
    fn is_in_parent_stops_at_a_node_without_id() {
        let root = Node {
            id: Some(1),
            parent: None,
        };
        let unsaved = Node {
            id: None,
            parent: Some(Box::new(root)),
        };
        let id = |n: &Node| n.id;
        assert!(!is_in_parent(Some(&unsaved), parent, id, Some(&1)));

        let leaf = Node {
            id: Some(5),
            parent: Some(Box::new(unsaved)),
        };
        assert!(is_in_parent(Some(&leaf), parent, id, Some(&5)));
        assert!(!is_in_parent(Some(&leaf), parent, id, Some(&1)));
    }

    #[test]
    fn flatten_is_preorder() {
        // 1 -> (2 -> 4), 3
        let children = |n: &i64| match n {
            1 => vec![2, 3],
            2 => vec![4],
            _ => vec![],
        };
        assert_eq!(flatten(vec![1, 10], children), vec![1, 2, 4, 3, 10]);
    }
}
