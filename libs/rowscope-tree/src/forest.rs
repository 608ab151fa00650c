//! Arena-backed forest of tree nodes.
//!
//! Nodes own their children through the arena; the parent link is a plain
//! index and never keeps anything alive.

use std::fmt;

/// Index of a node inside its [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct Slot<T> {
    data: T,
    level: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A set of trees built by one materialization call.
pub struct Forest<T> {
    slots: Vec<Slot<T>>,
    roots: Vec<NodeId>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            roots: Vec::new(),
        }
    }
}

impl<T> Forest<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root at level 0.
    pub fn add_root(&mut self, data: T) -> NodeId {
        let id = self.push(data, 0, None);
        self.roots.push(id);
        id
    }

    /// Append a child of `parent`, one level below it.
    pub fn add_child(&mut self, parent: NodeId, data: T) -> NodeId {
        let level = self.slots[parent.0].level + 1;
        let id = self.push(data, level, Some(parent));
        self.slots[parent.0].children.push(id);
        id
    }

    fn push(&mut self, data: T, level: usize, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            data,
            level,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub(crate) fn data(&self, id: NodeId) -> &T {
        &self.slots[id.0].data
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        (id.0 < self.slots.len()).then_some(NodeRef { forest: self, id })
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_, T>> + '_ {
        self.roots.iter().map(|&id| NodeRef { forest: self, id })
    }

    /// Total number of nodes across all trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Depth-first pre-order walk over every tree, roots in insertion order.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeRef<'_, T>> {
        let mut out = Vec::with_capacity(self.slots.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            stack.extend(self.slots[id.0].children.iter().rev().copied());
            out.push(NodeRef { forest: self, id });
        }
        out
    }
}

impl<T: fmt::Debug> fmt::Debug for Forest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.roots()).finish()
    }
}

/// Borrowed view of one node.
pub struct NodeRef<'a, T> {
    forest: &'a Forest<T>,
    id: NodeId,
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<'a, T> NodeRef<'a, T> {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn data(&self) -> &'a T {
        &self.forest.slots[self.id.0].data
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.forest.slots[self.id.0].level
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeRef<'a, T>> {
        self.forest.slots[self.id.0].parent.map(|id| NodeRef {
            forest: self.forest,
            id,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let forest = self.forest;
        forest.slots[self.id.0]
            .children
            .iter()
            .map(move |&id| NodeRef { forest, id })
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.forest.slots[self.id.0].children.is_empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("data", self.data())
            .field("level", &self.level())
            .field("children", &self.children().collect::<Vec<_>>())
            .finish()
    }
}
