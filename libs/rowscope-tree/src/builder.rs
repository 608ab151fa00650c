use crate::forest::{Forest, NodeId};
use crate::source::ChildSource;

type ChildFilter<'a, T> = Box<dyn Fn(&T) -> bool + Send + Sync + 'a>;

/// Entry of a flat tree: a node together with its direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTreeNode<T> {
    pub data: T,
    pub level: usize,
    pub children: Vec<FlatChild<T>>,
}

/// Direct child inside a [`FlatTreeNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatChild<T> {
    pub data: T,
    /// Whether this child has children of its own, so a UI can offer to expand it.
    pub has_children: bool,
}

/// Materializes trees from a [`ChildSource`].
pub struct TreeBuilder<'a, T, S> {
    source: &'a S,
    filter: Option<ChildFilter<'a, T>>,
}

impl<'a, T, S> TreeBuilder<'a, T, S>
where
    T: Send + Sync,
    S: ChildSource<T>,
{
    #[must_use]
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            filter: None,
        }
    }

    /// Keep only children accepted by `keep`. Roots are never filtered.
    #[must_use]
    pub fn filter_children<F>(mut self, keep: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'a,
    {
        self.filter = Some(Box::new(keep));
        self
    }

    async fn children_of(&self, item: &T) -> Result<Vec<T>, S::Error> {
        let children = if let Some(children) = self.source.resident(item) {
            children
        } else {
            tracing::trace!("Children not resident, fetching on demand");
            self.source.fetch(item).await?
        };
        Ok(match &self.filter {
            Some(keep) => children.into_iter().filter(|c| keep(c)).collect(),
            None => children,
        })
    }

    /// Build a forest whose roots are `roots` (level 0).
    ///
    /// # Errors
    /// Propagates the first child-load failure.
    pub async fn forest(&self, roots: Vec<T>) -> Result<Forest<T>, S::Error> {
        let mut forest = Forest::new();
        let mut pending: Vec<NodeId> = roots.into_iter().map(|r| forest.add_root(r)).collect();
        while let Some(id) = pending.pop() {
            let children = self.children_of(forest.data(id)).await?;
            for child in children {
                pending.push(forest.add_child(id, child));
            }
        }
        Ok(forest)
    }

    /// Build a forest rooted at the items selected by `is_root`.
    ///
    /// # Errors
    /// Propagates the first child-load failure.
    pub async fn forest_where<I, P>(&self, items: I, is_root: P) -> Result<Forest<T>, S::Error>
    where
        I: IntoIterator<Item = T>,
        P: Fn(&T) -> bool,
    {
        let roots = items.into_iter().filter(|item| is_root(item)).collect();
        self.forest(roots).await
    }

    /// Depth-first pre-order `(item, level)` pairs, roots at level 0.
    ///
    /// # Errors
    /// Propagates the first child-load failure.
    pub async fn flatten_with_level(&self, roots: Vec<T>) -> Result<Vec<(T, usize)>, S::Error> {
        let mut stack: Vec<(T, usize)> = roots.into_iter().rev().map(|r| (r, 0)).collect();
        let mut out = Vec::new();
        while let Some((item, level)) = stack.pop() {
            let children = self.children_of(&item).await?;
            stack.extend(children.into_iter().rev().map(|c| (c, level + 1)));
            out.push((item, level));
        }
        Ok(out)
    }

    /// Flat tree projection in pre-order.
    ///
    /// Every root gets an entry; every other node gets one only when it has
    /// children. Leaves appear solely inside their parent's `children`.
    ///
    /// # Errors
    /// Propagates the first child-load failure.
    pub async fn flat_tree(&self, roots: Vec<T>) -> Result<Vec<FlatTreeNode<T>>, S::Error>
    where
        T: Clone,
    {
        let mut stack: Vec<(T, usize, Option<Vec<T>>)> =
            roots.into_iter().rev().map(|r| (r, 0, None)).collect();
        let mut out = Vec::new();
        while let Some((item, level, known)) = stack.pop() {
            let children = match known {
                Some(children) => children,
                None => self.children_of(&item).await?,
            };
            let mut annotated = Vec::with_capacity(children.len());
            let mut expand = Vec::new();
            for child in children {
                let grandchildren = self.children_of(&child).await?;
                let has_children = !grandchildren.is_empty();
                annotated.push(FlatChild {
                    data: child.clone(),
                    has_children,
                });
                if has_children {
                    expand.push((child, level + 1, Some(grandchildren)));
                }
            }
            stack.extend(expand.into_iter().rev());
            out.push(FlatTreeNode {
                data: item,
                level,
                children: annotated,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::source::ResidentChildren;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        id: u32,
        parent: Option<u32>,
    }

    fn item(id: u32, parent: Option<u32>) -> Item {
        Item { id, parent }
    }

    /// Nothing is resident; every load goes through `fetch` and is counted.
    struct LazyTable {
        rows: Vec<Item>,
        fetches: Mutex<HashMap<u32, usize>>,
    }

    impl LazyTable {
        fn new(rows: Vec<Item>) -> Self {
            Self {
                rows,
                fetches: Mutex::new(HashMap::new()),
            }
        }

        fn fetch_count(&self, id: u32) -> usize {
            self.fetches.lock().unwrap().get(&id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl ChildSource<Item> for LazyTable {
        type Error = String;

        fn resident(&self, _item: &Item) -> Option<Vec<Item>> {
            None
        }

        async fn fetch(&self, item: &Item) -> Result<Vec<Item>, String> {
            *self.fetches.lock().unwrap().entry(item.id).or_default() += 1;
            Ok(self
                .rows
                .iter()
                .filter(|r| r.parent == Some(item.id))
                .cloned()
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl ChildSource<Item> for Failing {
        type Error = String;

        fn resident(&self, _item: &Item) -> Option<Vec<Item>> {
            None
        }

        async fn fetch(&self, item: &Item) -> Result<Vec<Item>, String> {
            Err(format!("cannot load children of {}", item.id))
        }
    }

    fn chain() -> LazyTable {
        LazyTable::new(vec![
            item(1, None),
            item(2, Some(1)),
            item(3, Some(2)),
        ])
    }

    #[tokio::test]
    async fn childless_roots_stay_at_level_zero() {
        let source = ResidentChildren::new(|_: &Item| Vec::new());
        let roots = vec![item(1, None), item(2, None), item(3, None)];
        let forest = TreeBuilder::new(&source).forest(roots).await.unwrap();

        let roots: Vec<_> = forest.roots().collect();
        assert_eq!(roots.len(), 3);
        for root in roots {
            assert_eq!(root.level(), 0);
            assert!(root.is_leaf());
            assert!(root.parent().is_none());
        }
    }

    #[tokio::test]
    async fn lazy_children_are_fetched_once_per_node() {
        let table = chain();
        let forest = TreeBuilder::new(&table)
            .forest(vec![item(1, None)])
            .await
            .unwrap();

        assert_eq!(forest.len(), 3);
        let deepest = forest.preorder().into_iter().last().unwrap();
        assert_eq!(deepest.data().id, 3);
        assert_eq!(deepest.level(), 2);
        assert_eq!(deepest.parent().unwrap().data().id, 2);
        for id in 1..=3 {
            assert_eq!(table.fetch_count(id), 1);
        }
    }

    #[tokio::test]
    async fn flatten_chain_in_depth_first_order() {
        let table = chain();
        let flat = TreeBuilder::new(&table)
            .flatten_with_level(vec![item(1, None)])
            .await
            .unwrap();
        let pairs: Vec<_> = flat.iter().map(|(i, l)| (i.id, *l)).collect();
        assert_eq!(pairs, vec![(1, 0), (2, 1), (3, 2)]);
    }

    #[tokio::test]
    async fn flatten_keeps_sibling_order() {
        let table = LazyTable::new(vec![
            item(1, None),
            item(2, Some(1)),
            item(3, Some(1)),
            item(4, Some(2)),
        ]);
        let flat = TreeBuilder::new(&table)
            .flatten_with_level(vec![item(1, None)])
            .await
            .unwrap();
        let ids: Vec<_> = flat.iter().map(|(i, _)| i.id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
    }

    #[tokio::test]
    async fn child_filter_prunes_subtrees_but_not_roots() {
        let table = LazyTable::new(vec![
            item(10, None),
            item(11, Some(10)),
            item(12, Some(10)),
            item(13, Some(12)),
        ]);
        let forest = TreeBuilder::new(&table)
            .filter_children(|i: &Item| i.id != 12)
            .forest(vec![item(10, None)])
            .await
            .unwrap();
        let ids: Vec<_> = forest.preorder().iter().map(|n| n.data().id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(table.fetch_count(13), 0);
    }

    #[tokio::test]
    async fn forest_where_selects_roots() {
        let table = LazyTable::new(vec![
            item(1, None),
            item(2, Some(1)),
            item(5, None),
        ]);
        let all = table.rows.clone();
        let forest = TreeBuilder::new(&table)
            .forest_where(all, |i| i.parent.is_none())
            .await
            .unwrap();
        let roots: Vec<_> = forest.roots().map(|n| n.data().id).collect();
        assert_eq!(roots, vec![1, 5]);
        assert_eq!(forest.len(), 3);
    }

    #[tokio::test]
    async fn flat_tree_marks_expandable_children() {
        let table = LazyTable::new(vec![
            item(1, None),
            item(2, Some(1)),
            item(3, Some(1)),
            item(4, Some(2)),
        ]);
        let flat = TreeBuilder::new(&table)
            .flat_tree(vec![item(1, None)])
            .await
            .unwrap();

        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].data.id, 1);
        assert_eq!(flat[0].level, 0);
        let children: Vec<_> = flat[0]
            .children
            .iter()
            .map(|c| (c.data.id, c.has_children))
            .collect();
        assert_eq!(children, vec![(2, true), (3, false)]);

        assert_eq!(flat[1].data.id, 2);
        assert_eq!(flat[1].level, 1);
        assert_eq!(flat[1].children.len(), 1);
        assert!(!flat[1].children[0].has_children);

        for id in 1..=4 {
            assert_eq!(table.fetch_count(id), 1, "node {id} fetched more than once");
        }
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let err = TreeBuilder::new(&Failing)
            .forest(vec![item(7, None)])
            .await
            .unwrap_err();
        assert_eq!(err, "cannot load children of 7");
    }
}
