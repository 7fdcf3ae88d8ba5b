//! Nodes of an alternating tree, kept in an arena and addressed by index.
//!
//! A node owns its children; `parent` is a plain back-reference. Nodes merged
//! into a blossom are owned by that blossom and have no parent of their own.

use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};

use crate::blossom::Blossom;
use crate::Vertex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Vertex(Vertex),
    Blossom(Blossom),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) outer: bool,
    /// Distance from the root in tree edges.
    pub(crate) depth: usize,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn vertex(vertex: Vertex, parent: Option<NodeId>, outer: bool, depth: usize) -> Self {
        Node {
            parent,
            children: Vec::new(),
            outer,
            depth,
            kind: NodeKind::Vertex(vertex),
        }
    }

    pub fn is_blossom(&self) -> bool {
        matches!(self.kind, NodeKind::Blossom(_))
    }

    /// The vertex itself, or the base of a blossom: where the edge from the
    /// parent lands.
    pub fn base(&self) -> Vertex {
        match &self.kind {
            NodeKind::Vertex(v) => *v,
            NodeKind::Blossom(b) => b.base(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_outer(&self) -> bool {
        self.outer
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_blossom(&self) -> Option<&Blossom> {
        match &self.kind {
            NodeKind::Blossom(b) => Some(b),
            NodeKind::Vertex(_) => None,
        }
    }

    pub(crate) fn as_blossom_mut(&mut self) -> Option<&mut Blossom> {
        match &mut self.kind {
            NodeKind::Blossom(b) => Some(b),
            NodeKind::Vertex(_) => None,
        }
    }

    pub fn covers(&self, vertex: Vertex) -> bool {
        match &self.kind {
            NodeKind::Vertex(v) => *v == vertex,
            NodeKind::Blossom(b) => b.vertices().contains(&vertex),
        }
    }

    pub fn vertices(&self) -> BTreeSet<Vertex> {
        match &self.kind {
            NodeKind::Vertex(v) => std::iter::once(*v).collect(),
            NodeKind::Blossom(b) => b.vertices().clone(),
        }
    }
}

/// Dense node storage. Released slots stay empty; ids are never reused.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Option<Node>>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn next_id(&self) -> NodeId {
        NodeId(self.slots.len())
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = self.next_id();
        self.slots.push(Some(node));
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Empties the slot; `None` if it was already released.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Node> {
        self.slots.get_mut(id.0).and_then(|slot| slot.take())
    }

    /// Number of slots ever allocated.
    pub(crate) fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Vertex inside `parent` that the tree edge to `child` hangs from.
    pub(crate) fn connection_vertex(&self, parent: NodeId, child: NodeId) -> Option<Vertex> {
        match &self[parent].kind {
            NodeKind::Vertex(v) => Some(*v),
            NodeKind::Blossom(b) => b.inside_vertex_for(child),
        }
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {} used after release", id.0),
        }
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.0).and_then(|slot| slot.as_mut()) {
            Some(node) => node,
            None => panic!("node {} used after release", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_release() {
        let mut arena = NodeArena::new();
        let root = arena.insert(Node::vertex(4, None, true, 0));
        let child = arena.insert(Node::vertex(7, Some(root), false, 1));
        arena[root].children.push(child);
        assert_eq!(arena.allocated(), 2);
        assert_eq!(arena[child].parent(), Some(root));
        assert_eq!(arena.connection_vertex(root, child), Some(4));
        assert!(arena.release(child).is_some());
        assert!(arena.release(child).is_none());
        assert_eq!(arena.live(), 1);
        assert!(arena.get(child).is_none());
        assert_eq!(arena.next_id().index(), 2);
    }

    #[test]
    fn vertex_node_accessors() {
        let node = Node::vertex(3, None, true, 0);
        assert!(!node.is_blossom());
        assert_eq!(node.base(), 3);
        assert!(node.covers(3));
        assert!(!node.covers(4));
        assert!(node.as_blossom().is_none());
        assert_eq!(node.vertices().into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    #[should_panic]
    fn released_node_panics() {
        let mut arena = NodeArena::new();
        let id = arena.insert(Node::vertex(1, None, true, 0));
        arena.release(id);
        let _ = arena[id].base();
    }
}
