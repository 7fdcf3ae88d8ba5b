use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::blossom::{self, AugmentationSplit};
use crate::matching::Matching;
use crate::node::{Node, NodeArena, NodeId, NodeKind};
use crate::{Edge, MatchingError, Result, Vertex};

/// One alternating tree grown from a free root vertex.
///
/// The structure owns its nodes; every vertex it reaches maps to the
/// top-level node covering it, so after a contraction all vertices of the
/// cycle map to the new blossom.
#[derive(Debug, Clone)]
pub struct FreeNodeStructure {
    arena: NodeArena,
    root: NodeId,
    vertex_to_node: HashMap<Vertex, NodeId>,
    working_node: Option<NodeId>,
    pub(crate) on_hold: bool,
    pub(crate) modified: bool,
}

impl FreeNodeStructure {
    pub fn new(root_vertex: Vertex) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.insert(Node::vertex(root_vertex, None, true, 0));
        let mut vertex_to_node = HashMap::new();
        vertex_to_node.insert(root_vertex, root);
        FreeNodeStructure {
            arena,
            root,
            vertex_to_node,
            working_node: Some(root),
            on_hold: false,
            modified: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The free vertex the tree grows from.
    pub fn root_vertex(&self) -> Vertex {
        self.arena[self.root].base()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id]
    }

    pub(crate) fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn node_for_vertex(&self, vertex: Vertex) -> Option<NodeId> {
        self.vertex_to_node.get(&vertex).cloned()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_to_node.len()
    }

    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.vertex_to_node.keys().cloned()
    }

    /// Frontier node; `None` once backtracking went past the root.
    pub fn working_node(&self) -> Option<NodeId> {
        self.working_node
    }

    pub fn is_active(&self) -> bool {
        self.working_node.is_some()
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_outer_vertex(&self, vertex: Vertex) -> bool {
        self.node_for_vertex(vertex)
            .map_or(false, |id| self.arena[id].outer)
    }

    pub fn is_working_vertex(&self, vertex: Vertex) -> bool {
        self.working_node.is_some() && self.node_for_vertex(vertex) == self.working_node
    }

    /// Matched edges between the root and the working node.
    pub fn working_distance(&self) -> Option<u32> {
        self.working_node
            .map(|id| (self.arena[id].depth / 2) as u32)
    }

    /// Hang `inner` below the outer node covering `outer_vertex`, and its
    /// mate `mate` below `inner`. The mate becomes the working node.
    pub fn extend(&mut self, outer_vertex: Vertex, inner: Vertex, mate: Vertex) -> Result<NodeId> {
        let parent = self
            .node_for_vertex(outer_vertex)
            .ok_or(MatchingError::VertexNotInStructure(outer_vertex))?;
        if !self.arena[parent].outer {
            return Err(MatchingError::InvariantViolation("extending from an inner node"));
        }
        if inner == mate
            || self.vertex_to_node.contains_key(&inner)
            || self.vertex_to_node.contains_key(&mate)
        {
            return Err(MatchingError::InvariantViolation(
                "extension reaches a vertex already in the tree",
            ));
        }

        let depth = self.arena[parent].depth;
        let inner_id = self
            .arena
            .insert(Node::vertex(inner, Some(parent), false, depth + 1));
        let mate_id = self
            .arena
            .insert(Node::vertex(mate, Some(inner_id), true, depth + 2));
        self.arena[inner_id].children.push(mate_id);
        self.arena[parent].children.push(inner_id);
        if let Some(b) = self.arena[parent].as_blossom_mut() {
            b.set_inside_vertex(inner_id, outer_vertex);
        }
        self.vertex_to_node.insert(inner, inner_id);
        self.vertex_to_node.insert(mate, mate_id);
        self.working_node = Some(mate_id);
        Ok(mate_id)
    }

    /// Deepest node that is an ancestor of both (a node is its own ancestor).
    pub fn lowest_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut ancestors = HashSet::new();
        let mut current = Some(a);
        while let Some(id) = current {
            ancestors.insert(id);
            current = self.arena[id].parent;
        }
        let mut current = Some(b);
        while let Some(id) = current {
            if ancestors.contains(&id) {
                return Some(id);
            }
            current = self.arena[id].parent;
        }
        None
    }

    /// Nodes from `from` up to, not including, `stop`.
    fn chain_up_to(&self, from: NodeId, stop: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = from;
        while current != stop {
            chain.push(current);
            current = self.arena[current]
                .parent
                .ok_or(MatchingError::InvariantViolation("ancestor chain misses the LCA"))?;
        }
        Ok(chain)
    }

    fn tree_edge(&self, parent: NodeId, child: NodeId) -> Result<(Vertex, Vertex)> {
        let upper = self
            .arena
            .connection_vertex(parent, child)
            .ok_or(MatchingError::InvariantViolation("child without attachment vertex"))?;
        Ok((upper, self.arena[child].base()))
    }

    /// Contract the odd cycle closed by the unmatched edge `u`-`v` between
    /// two outer nodes of this tree. Returns the new blossom.
    pub fn contract(&mut self, u: Vertex, v: Vertex) -> Result<NodeId> {
        let nu = self
            .node_for_vertex(u)
            .ok_or(MatchingError::VertexNotInStructure(u))?;
        let nv = self
            .node_for_vertex(v)
            .ok_or(MatchingError::VertexNotInStructure(v))?;
        if nu == nv {
            return Err(MatchingError::InvariantViolation(
                "contracting an edge inside a single node",
            ));
        }
        if !self.arena[nu].outer || !self.arena[nv].outer {
            return Err(MatchingError::InvariantViolation(
                "contraction needs two outer nodes",
            ));
        }
        let lca = self
            .lowest_common_ancestor(nu, nv)
            .ok_or(MatchingError::InvariantViolation("nodes without a common ancestor"))?;

        let mut down = self.chain_up_to(nu, lca)?;
        down.reverse();
        let up = self.chain_up_to(nv, lca)?;

        let mut cycle = Vec::with_capacity(1 + down.len() + up.len());
        let mut links = Vec::with_capacity(cycle.capacity());
        cycle.push(lca);
        let mut previous = lca;
        for &id in &down {
            links.push(self.tree_edge(previous, id)?);
            cycle.push(id);
            previous = id;
        }
        links.push((u, v));
        for &id in &up {
            let parent = self.arena[id]
                .parent
                .ok_or(MatchingError::InvariantViolation("cycle node without parent"))?;
            let (upper, lower) = self.tree_edge(parent, id)?;
            links.push((lower, upper));
            cycle.push(id);
        }

        let absorbed: HashSet<NodeId> = cycle.iter().cloned().collect();
        let id = blossom::contract_cycle(&mut self.arena, cycle, links)?;
        if lca == self.root {
            self.root = id;
        }
        if self.working_node.map_or(false, |w| absorbed.contains(&w)) {
            self.working_node = Some(id);
        }
        let covered: Vec<Vertex> = self.arena[id].vertices().into_iter().collect();
        for vertex in covered {
            self.vertex_to_node.insert(vertex, id);
        }
        self.refresh_depths(id);
        Ok(id)
    }

    /// Re-derive depths below `id` after the subtree moved up.
    fn refresh_depths(&mut self, id: NodeId) {
        let mut queue = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            let depth = self.arena[current].depth + 1;
            let children = self.arena[current].children.clone();
            for child in children {
                self.arena[child].depth = depth;
                queue.push_back(child);
            }
        }
    }

    /// Move the frontier up one outer layer. Returns whether anything
    /// changed; a structure that was on hold or modified this pass stays put.
    pub fn backtrack(&mut self) -> bool {
        if self.on_hold || self.modified {
            return false;
        }
        let working = match self.working_node {
            Some(working) => working,
            None => return false,
        };
        self.working_node = self.arena[working]
            .parent
            .and_then(|parent| self.arena[parent].parent);
        true
    }

    /// Even alternating path from `vertex` (in an outer node) to the free
    /// root, first edge matched. Empty when `vertex` is the root itself.
    pub fn path_to_root(&self, vertex: Vertex, matching: &Matching) -> Result<Vec<Edge>> {
        let mut node = self
            .node_for_vertex(vertex)
            .ok_or(MatchingError::VertexNotInStructure(vertex))?;
        if !self.arena[node].outer {
            return Err(MatchingError::InvariantViolation(
                "alternating path requested from an inner node",
            ));
        }
        let mut path = Vec::new();
        let mut from = vertex;
        loop {
            match &self.arena[node].kind {
                NodeKind::Vertex(v) if *v == from => {}
                NodeKind::Vertex(_) => return Err(MatchingError::VertexNotInStructure(from)),
                NodeKind::Blossom(_) => {
                    let inner = blossom::path_to_base(&self.arena, node, from, matching)?
                        .ok_or_else(|| {
                            MatchingError::InvalidPath(format!(
                                "no alternating route from {} through its blossom",
                                from
                            ))
                        })?;
                    path.extend(inner);
                }
            }

            let inner = match self.arena[node].parent {
                Some(inner) => inner,
                None => break,
            };
            let p = match self.arena[inner].kind {
                NodeKind::Vertex(p) => p,
                NodeKind::Blossom(_) => {
                    return Err(MatchingError::InvariantViolation("blossom in an inner position"))
                }
            };
            path.push(Edge::new(self.arena[node].base(), p));
            let outer = self.arena[inner]
                .parent
                .ok_or(MatchingError::InvariantViolation("inner node without parent"))?;
            let q = self
                .arena
                .connection_vertex(outer, inner)
                .ok_or(MatchingError::InvariantViolation("child without attachment vertex"))?;
            path.push(Edge::new(p, q));
            node = outer;
            from = q;
        }
        Ok(path)
    }

    /// Matched/unmatched split for an augmenting path crossing blossom
    /// `node`; see [`AugmentationSplit`].
    pub fn blossom_augmentation(
        &self,
        node: NodeId,
        entry: Vertex,
        entry_external: Vertex,
        exit: Vertex,
        exit_external: Option<Vertex>,
        matching: &Matching,
    ) -> Result<AugmentationSplit> {
        blossom::blossom_augmentation(
            &self.arena,
            node,
            entry,
            entry_external,
            exit,
            exit_external,
            matching,
        )
    }

    /// Release every node, blossom contents included. Returns how many
    /// slots were freed; a second call frees nothing.
    pub fn teardown(&mut self) -> usize {
        let mut released = 0;
        let mut queue = VecDeque::new();
        queue.push_back(self.root);
        while let Some(id) = queue.pop_front() {
            let node = match self.arena.release(id) {
                Some(node) => node,
                None => continue,
            };
            released += 1;
            queue.extend(node.children);
            if let NodeKind::Blossom(b) = node.kind {
                queue.extend(b.nodes().iter().cloned());
            }
        }
        self.vertex_to_node.clear();
        self.working_node = None;
        released
    }

    /// Nodes grouped by depth, breadth-first from the root.
    fn levels(&self) -> Vec<Vec<NodeId>> {
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        let mut queue = VecDeque::new();
        if self.arena.get(self.root).is_some() {
            queue.push_back((self.root, 0));
        }
        while let Some((id, level)) = queue.pop_front() {
            if levels.len() <= level {
                levels.push(Vec::new());
            }
            levels[level].push(id);
            for &child in &self.arena[id].children {
                queue.push_back((child, level + 1));
            }
        }
        levels
    }
}

impl fmt::Display for FreeNodeStructure {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "Free node structure")?;
        if self.on_hold {
            write!(formatter, " [on hold]")?;
        }
        if self.modified {
            write!(formatter, " [modified]")?;
        }
        write!(formatter, ":")?;
        for (level, ids) in self.levels().into_iter().enumerate() {
            write!(formatter, "\nLevel {}:", level)?;
            for id in ids {
                writeln!(formatter)?;
                blossom::write_node(&self.arena, id, 1, formatter)?;
                if Some(id) == self.working_node {
                    write!(formatter, " <- working")?;
                }
            }
        }
        Ok(())
    }
}
