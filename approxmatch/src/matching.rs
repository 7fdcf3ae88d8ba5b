use std::collections::{HashMap, HashSet};

use crate::{Edge, MatchingError, Result, Vertex};

/// Label of a matched edge that no search has reached yet in this phase.
pub const INFINITE_LABEL: u32 = u32::MAX;

/// Matched edges plus the per-edge distance labels used by the search.
#[derive(Debug, Clone, Default)]
pub struct Matching {
    matched_edges: HashSet<Edge>,
    vertex_to_matched_edge: HashMap<Vertex, Edge>,
    edge_to_label: HashMap<Edge, u32>,
}

impl Matching {
    pub fn new() -> Self {
        Default::default()
    }

    /// Build a matching from edges that must be pairwise vertex-disjoint.
    pub fn from_edges<I: IntoIterator<Item = Edge>>(edges: I) -> Self {
        let mut matching = Matching::new();
        for edge in edges {
            matching.add_edge(edge);
        }
        matching
    }

    pub fn len(&self) -> usize {
        self.matched_edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched_edges.is_empty()
    }

    /// Matched edges in ascending order.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.matched_edges.iter().cloned().collect();
        edges.sort();
        edges
    }

    pub fn is_matched(&self, edge: Edge) -> bool {
        self.matched_edges.contains(&edge)
    }

    pub fn matched_edge_of(&self, vertex: Vertex) -> Option<Edge> {
        self.vertex_to_matched_edge.get(&vertex).cloned()
    }

    pub fn mate(&self, vertex: Vertex) -> Option<Vertex> {
        self.matched_edge_of(vertex).and_then(|e| e.other(vertex))
    }

    pub fn is_free(&self, vertex: Vertex) -> bool {
        !self.vertex_to_matched_edge.contains_key(&vertex)
    }

    /// Panics if either endpoint is already matched.
    pub fn add_edge(&mut self, edge: Edge) {
        let (u, v) = edge.endpoints();
        assert!(
            !edge.is_loop() && self.is_free(u) && self.is_free(v),
            "cannot match {}: endpoint already matched",
            edge
        );
        self.matched_edges.insert(edge);
        self.vertex_to_matched_edge.insert(u, edge);
        self.vertex_to_matched_edge.insert(v, edge);
    }

    /// Returns whether the edge was matched. Its label goes with it.
    pub fn remove_edge(&mut self, edge: Edge) -> bool {
        if !self.matched_edges.remove(&edge) {
            return false;
        }
        let (u, v) = edge.endpoints();
        self.vertex_to_matched_edge.remove(&u);
        self.vertex_to_matched_edge.remove(&v);
        self.edge_to_label.remove(&edge);
        true
    }

    pub fn set_label(&mut self, edge: Edge, label: u32) {
        self.edge_to_label.insert(edge, label);
    }

    pub fn label_of(&self, edge: Edge) -> Option<u32> {
        self.edge_to_label.get(&edge).cloned()
    }

    /// Forget all labels, then label every matched edge as unreached.
    pub fn reset_labels(&mut self) {
        self.edge_to_label.clear();
        for &edge in &self.matched_edges {
            self.edge_to_label.insert(edge, INFINITE_LABEL);
        }
    }

    /// Toggle every edge of every path.
    ///
    /// The paths must be vertex-disjoint; within a path the matched edges are
    /// dropped before the unmatched ones are added, so a valid augmenting
    /// path grows the matching by one.
    pub fn apply_augmenting_paths(&mut self, paths: &[Vec<Edge>]) {
        for path in paths {
            let (to_unmatch, to_match): (Vec<Edge>, Vec<Edge>) =
                path.iter().partition(|&&e| self.is_matched(e));
            for edge in to_unmatch {
                self.remove_edge(edge);
            }
            for edge in to_match {
                self.add_edge(edge);
            }
        }
        debug_assert!(self.is_valid());
    }

    /// Vertex sequence of `path` after checking that it is a simple
    /// augmenting path: odd length, alternating unmatched/matched starting
    /// with an unmatched edge, both ends free.
    pub fn augmenting_path_vertices(&self, path: &[Edge]) -> Result<Vec<Vertex>> {
        let invalid = |msg: String| Err(MatchingError::InvalidPath(msg));
        if path.len() % 2 == 0 {
            return invalid(format!("even length {}", path.len()));
        }
        let (a, b) = path[0].endpoints();
        let start = match path.get(1) {
            Some(next) if next.contains(b) && !next.contains(a) => a,
            Some(next) if next.contains(a) && !next.contains(b) => b,
            Some(_) => return invalid(format!("{} does not continue from {}", path[1], path[0])),
            None => a,
        };
        let mut vertices = vec![start];
        let mut seen = HashSet::new();
        seen.insert(start);
        let mut current = start;
        for (idx, &edge) in path.iter().enumerate() {
            if self.is_matched(edge) != (idx % 2 == 1) {
                return invalid(format!("{} breaks the alternation at position {}", edge, idx));
            }
            let next = match edge.other(current) {
                Some(next) => next,
                None => return invalid(format!("{} does not touch vertex {}", edge, current)),
            };
            if !seen.insert(next) {
                return invalid(format!("vertex {} repeats", next));
            }
            vertices.push(next);
            current = next;
        }
        if !self.is_free(start) || !self.is_free(current) {
            return invalid(format!("endpoints {} and {} are not both free", start, current));
        }
        Ok(vertices)
    }

    /// Every vertex is in at most one matched edge and the index agrees.
    pub fn is_valid(&self) -> bool {
        self.vertex_to_matched_edge.len() == 2 * self.matched_edges.len()
            && self.matched_edges.iter().all(|&e| {
                let (u, v) = e.endpoints();
                u != v
                    && self.vertex_to_matched_edge.get(&u) == Some(&e)
                    && self.vertex_to_matched_edge.get(&v) == Some(&e)
            })
    }
}

impl std::fmt::Display for Matching {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "Matching:\n\t(Matched edge) : Label")?;
        for edge in self.edges() {
            match self.label_of(edge) {
                Some(INFINITE_LABEL) => write!(formatter, "\n\t{} : inf", edge)?,
                Some(label) => write!(formatter, "\n\t{} : {}", edge, label)?,
                None => write!(formatter, "\n\t{} : -", edge)?,
            }
        }
        Ok(())
    }
}
