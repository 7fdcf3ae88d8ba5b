//! Blossom contraction and expansion.
//!
//! A blossom keeps its sub-nodes in cycle order with the sub-node holding the
//! base first, and `links[i]` is the graph edge from a vertex of `nodes[i]`
//! to a vertex of `nodes[i + 1]` (wrapping around). The two links at the
//! base sub-node are unmatched; around the rest of the cycle they alternate,
//! and a matched link always lands on the base of the sub-node it enters.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::mem;

use crate::matching::Matching;
use crate::node::{Node, NodeArena, NodeId, NodeKind};
use crate::{Edge, MatchingError, Result, Vertex};

#[derive(Debug, Clone)]
pub struct Blossom {
    base: Vertex,
    nodes: Vec<NodeId>,
    links: Vec<(Vertex, Vertex)>,
    vertices: BTreeSet<Vertex>,
    outside_to_inside: HashMap<NodeId, Vertex>,
}

impl Blossom {
    pub fn base(&self) -> Vertex {
        self.base
    }

    /// Sub-nodes in cycle order, base sub-node first.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn links(&self) -> &[(Vertex, Vertex)] {
        &self.links
    }

    /// Every graph vertex inside, nested blossoms flattened.
    pub fn vertices(&self) -> &BTreeSet<Vertex> {
        &self.vertices
    }

    /// Vertex inside this blossom that the adjacent tree node `node` is
    /// connected to.
    pub fn inside_vertex_for(&self, node: NodeId) -> Option<Vertex> {
        self.outside_to_inside.get(&node).cloned()
    }

    pub(crate) fn set_inside_vertex(&mut self, node: NodeId, vertex: Vertex) {
        self.outside_to_inside.insert(node, vertex);
    }

    fn position(&self, arena: &NodeArena, vertex: Vertex) -> Option<usize> {
        self.nodes.iter().position(|&n| arena[n].covers(vertex))
    }
}

/// Edges whose matched state flips when an augmenting path crosses a blossom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentationSplit {
    pub to_match: Vec<Edge>,
    pub to_unmatch: Vec<Edge>,
}

impl AugmentationSplit {
    pub fn is_empty(&self) -> bool {
        self.to_match.is_empty() && self.to_unmatch.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.to_match.iter().chain(self.to_unmatch.iter()).cloned()
    }
}

struct Contraction<'a> {
    arena: &'a mut NodeArena,
    id: NodeId,
    members: HashSet<NodeId>,
    blossom: Blossom,
    children: Vec<NodeId>,
}

impl<'a> Contraction<'a> {
    fn add_node_to_blossom(&mut self, node: NodeId) -> Result<()> {
        self.blossom.nodes.push(node);
        let parent = self.arena[node].parent;
        if let Some(p) = parent {
            self.arena[p].children.retain(|&c| c != node);
        }

        match &self.arena[node].kind {
            NodeKind::Vertex(v) => {
                self.blossom.vertices.insert(*v);
            }
            NodeKind::Blossom(inner) => {
                self.blossom.vertices.extend(inner.vertices.iter().cloned());
            }
        }

        // Children left outside the cycle now hang from the blossom, still
        // attached to the same graph vertex.
        let children = mem::take(&mut self.arena[node].children);
        for child in children {
            if self.members.contains(&child) {
                continue;
            }
            let inside = self
                .arena
                .connection_vertex(node, child)
                .ok_or(MatchingError::InvariantViolation("child without attachment vertex"))?;
            self.arena[child].parent = Some(self.id);
            self.blossom.outside_to_inside.insert(child, inside);
            self.children.push(child);
        }

        // Only the node holding the base has a parent outside the cycle.
        if let Some(p) = parent {
            if !self.members.contains(&p) {
                let base = self.arena[node].base();
                self.blossom.outside_to_inside.insert(p, base);
            }
        }
        self.arena[node].parent = None;
        Ok(())
    }
}

/// Merge an odd cycle of tree nodes into a new blossom node.
///
/// `cycle[0]` is the lowest common ancestor; the blossom takes over its
/// parent, base and depth. `links[i]` joins `cycle[i]` to the next node.
pub(crate) fn contract_cycle(
    arena: &mut NodeArena,
    cycle: Vec<NodeId>,
    links: Vec<(Vertex, Vertex)>,
) -> Result<NodeId> {
    if cycle.len() % 2 == 0 || cycle.len() != links.len() {
        return Err(MatchingError::InvariantViolation(
            "a blossom needs an odd cycle with one link per node",
        ));
    }
    let lca = cycle[0];
    let parent = arena[lca].parent;
    let depth = arena[lca].depth;
    let base = arena[lca].base();
    let id = arena.next_id();

    let mut contraction = Contraction {
        arena,
        id,
        members: cycle.iter().cloned().collect(),
        blossom: Blossom {
            base,
            nodes: Vec::with_capacity(cycle.len()),
            links,
            vertices: BTreeSet::new(),
            outside_to_inside: HashMap::new(),
        },
        children: Vec::new(),
    };
    for &node in &cycle {
        contraction.add_node_to_blossom(node)?;
    }
    let Contraction {
        arena,
        blossom,
        children,
        ..
    } = contraction;

    let outer = parent.map_or(true, |p| !arena[p].outer);
    let new_id = arena.insert(Node {
        parent,
        children,
        outer,
        depth,
        kind: NodeKind::Blossom(blossom),
    });
    debug_assert_eq!(new_id, id);
    if let Some(p) = parent {
        arena[p].children.push(id);
    }
    Ok(id)
}

/// Even alternating path inside `node` from `from` to the node's base.
fn sub_path(
    arena: &NodeArena,
    node: NodeId,
    from: Vertex,
    matching: &Matching,
) -> Result<Option<Vec<Edge>>> {
    match &arena[node].kind {
        NodeKind::Vertex(v) if *v == from => Ok(Some(Vec::new())),
        NodeKind::Vertex(_) => Err(MatchingError::VertexNotInStructure(from)),
        NodeKind::Blossom(_) => path_to_base(arena, node, from, matching),
    }
}

/// Even alternating path from `from` to the base of blossom `id`, starting
/// with the matched edge at `from` (empty when `from` is the base).
///
/// The walk direction is the side of the entry sub-node whose cycle link is
/// currently matched. `None` if neither side is.
pub(crate) fn path_to_base(
    arena: &NodeArena,
    id: NodeId,
    from: Vertex,
    matching: &Matching,
) -> Result<Option<Vec<Edge>>> {
    let blossom = arena[id]
        .as_blossom()
        .ok_or(MatchingError::InvariantViolation("expanding a vertex node"))?;
    let n = blossom.nodes.len();
    let start = blossom
        .position(arena, from)
        .ok_or(MatchingError::VertexNotInStructure(from))?;
    let mut path = match sub_path(arena, blossom.nodes[start], from, matching)? {
        Some(path) => path,
        None => return Ok(None),
    };
    if start == 0 {
        return Ok(Some(path));
    }

    let forward = match (
        matching.is_matched(Edge::from(blossom.links[start])),
        matching.is_matched(Edge::from(blossom.links[start - 1])),
    ) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => return Err(MatchingError::BlossomBorder { vertex: from }),
        (false, false) => return Ok(None),
    };

    let mut pos = start;
    loop {
        let (leave, arrive, next) = if forward {
            let (a, b) = blossom.links[pos];
            (a, b, (pos + 1) % n)
        } else {
            let (a, b) = blossom.links[pos - 1];
            (b, a, pos - 1)
        };
        let edge = Edge::new(leave, arrive);
        let arrived_matched = matching.is_matched(edge);
        path.push(edge);
        pos = next;
        let node = blossom.nodes[pos];

        if pos == 0 {
            match sub_path(arena, node, arrive, matching)? {
                Some(inner) => path.extend(inner),
                None => return Ok(None),
            }
            return Ok(Some(path));
        }

        let exit = if forward {
            blossom.links[pos].0
        } else {
            blossom.links[pos - 1].1
        };
        let base = arena[node].base();
        let inner = if arrived_matched {
            if arrive != base {
                return Err(MatchingError::InvariantViolation(
                    "matched cycle edge does not enter at the sub-blossom base",
                ));
            }
            sub_path(arena, node, exit, matching)?.map(|mut p| {
                p.reverse();
                p
            })
        } else {
            if exit != base {
                return Err(MatchingError::InvariantViolation(
                    "matched cycle edge does not leave from the sub-blossom base",
                ));
            }
            sub_path(arena, node, arrive, matching)?
        };
        match inner {
            Some(inner) => path.extend(inner),
            None => return Ok(None),
        }
    }
}

/// Split the edges an augmenting path flips when it enters blossom `id` at
/// `entry` over an edge from `entry_external` and leaves through the base
/// `exit`, whose matched edge goes to `exit_external` (`None` when the
/// blossom is a tree root and its base is free).
///
/// An empty split means the blossom offers no matched edge at the entry
/// vertex under the current matching; it must not be applied.
pub(crate) fn blossom_augmentation(
    arena: &NodeArena,
    id: NodeId,
    entry: Vertex,
    entry_external: Vertex,
    exit: Vertex,
    exit_external: Option<Vertex>,
    matching: &Matching,
) -> Result<AugmentationSplit> {
    let node = &arena[id];
    if !node.covers(entry) {
        return Err(MatchingError::VertexNotInStructure(entry));
    }
    if exit != node.base() {
        return Err(MatchingError::InvariantViolation(
            "an augmenting path leaves a blossom only through its base",
        ));
    }

    let mut split = AugmentationSplit::default();
    if entry == exit && exit_external == Some(entry_external) {
        split.to_unmatch.push(Edge::new(entry_external, entry));
        return Ok(split);
    }

    let inner = match path_to_base(arena, id, entry, matching)? {
        Some(inner) => inner,
        None => return Ok(split),
    };
    for edge in inner {
        if matching.is_matched(edge) {
            split.to_unmatch.push(edge);
        } else {
            split.to_match.push(edge);
        }
    }
    split.to_match.push(Edge::new(entry_external, entry));
    if let Some(external) = exit_external {
        split.to_unmatch.push(Edge::new(exit, external));
    }
    Ok(split)
}

/// Indented dump of a node and, for blossoms, everything inside it.
pub(crate) fn write_node(
    arena: &NodeArena,
    id: NodeId,
    depth: usize,
    formatter: &mut fmt::Formatter,
) -> fmt::Result {
    let indent = "\t".repeat(depth);
    match &arena[id].kind {
        NodeKind::Vertex(v) => write!(formatter, "{}Vertex: {}", indent, v),
        NodeKind::Blossom(b) => {
            write!(formatter, "{}Blossom (base {}):", indent, b.base)?;
            for &inner in &b.nodes {
                writeln!(formatter)?;
                write_node(arena, inner, depth + 1, formatter)?;
            }
            Ok(())
        }
    }
}
