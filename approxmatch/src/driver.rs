//! Scale, phase and pass loops of the streaming algorithm.
//!
//! Every phase starts one alternating tree per free vertex and streams the
//! edges repeatedly. Each tree changes at most once per pass: it grows by an
//! inner/outer pair, contracts a blossom, or meets another tree, in which
//! case the two root paths form an augmenting path and both trees retire.
//! Trees that did not change climb back one layer; a tree that climbs past
//! its root stops growing but stays in place for others to augment into.
//! The vertex-disjoint paths found in a phase are applied together when the
//! phase ends.

use std::collections::{BTreeSet, HashMap, HashSet};

use edgestream::EdgeStream;
use log::{debug, info, log_enabled, trace, Level};
use serde::Serialize;

use crate::config::Config;
use crate::matching::{Matching, INFINITE_LABEL};
use crate::structure::FreeNodeStructure;
use crate::{greedy_pass, Edge, MatchingError, Result, Vertex};

/// Iteration bounds at one scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleParams {
    pub scale: f64,
    /// A tree with at least this many vertices is put on hold.
    pub path_limit: usize,
    pub pass_bundles_max: usize,
    pub phase_limit: usize,
}

impl ScaleParams {
    /// ```
    /// let p = approxmatch::ScaleParams::for_scale(0.5, 0.5);
    /// assert_eq!((p.path_limit, p.pass_bundles_max, p.phase_limit), (13, 288, 576));
    /// ```
    pub fn for_scale(scale: f64, epsilon: f64) -> Self {
        ScaleParams {
            scale,
            path_limit: (6.0 / scale).floor() as usize + 1,
            pass_bundles_max: (72.0 / (scale * epsilon)).floor() as usize,
            phase_limit: (144.0 / (scale * epsilon)).floor() as usize,
        }
    }
}

/// Scales 1/2, 1/4, ... down to epsilon² / 64.
#[derive(Debug, Clone)]
pub struct ScaleSchedule {
    epsilon: f64,
    scale: f64,
    limit: f64,
}

impl ScaleSchedule {
    pub fn new(epsilon: f64) -> Self {
        ScaleSchedule {
            epsilon,
            scale: 0.5,
            limit: epsilon * epsilon / 64.0,
        }
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }
}

impl Iterator for ScaleSchedule {
    type Item = ScaleParams;

    fn next(&mut self) -> Option<ScaleParams> {
        if self.scale < self.limit {
            return None;
        }
        let params = ScaleParams::for_scale(self.scale, self.epsilon);
        self.scale /= 2.0;
        Some(params)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub greedy_size: usize,
    pub scales: usize,
    pub phases: usize,
    pub passes: usize,
    pub extensions: usize,
    pub contractions: usize,
    pub backtracks: usize,
    pub augmentations: usize,
}

#[derive(Debug, Clone)]
pub struct MatchingOutcome {
    pub matching: Matching,
    pub stats: RunStats,
}

pub struct MatchingDriver {
    config: Config,
}

impl MatchingDriver {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(MatchingDriver { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Greedy pass, then every scale of the schedule. An error leaves the
    /// matching of the failing phase unapplied and ends the run.
    pub fn run<S: EdgeStream + ?Sized>(&self, stream: &mut S) -> Result<MatchingOutcome> {
        let (mut matching, vertices) = greedy_pass(stream)?;
        let mut stats = RunStats {
            greedy_size: matching.len(),
            ..Default::default()
        };
        info!(
            "greedy pass matched {} edges over {} vertices",
            matching.len(),
            vertices.len()
        );

        for params in self.config.schedule()? {
            stats.scales += 1;
            debug!(
                "scale {}: path limit {}, {} passes per phase, {} phases",
                params.scale, params.path_limit, params.pass_bundles_max, params.phase_limit
            );
            for phase in 0..params.phase_limit {
                stats.phases += 1;
                let paths = Phase::new(&params, &mut matching, &mut stats).run(stream, &vertices)?;
                if paths.is_empty() {
                    debug!("scale {} phase {}: no augmenting path", params.scale, phase);
                    break;
                }
                validate_paths(&matching, &paths)?;
                matching.apply_augmenting_paths(&paths);
                stats.augmentations += paths.len();
                debug!(
                    "scale {} phase {}: applied {} augmenting paths, matching size {}",
                    params.scale,
                    phase,
                    paths.len(),
                    matching.len()
                );
            }
        }

        info!(
            "matching size {} (greedy {}) after {} scales, {} phases, {} passes",
            matching.len(),
            stats.greedy_size,
            stats.scales,
            stats.phases,
            stats.passes
        );
        Ok(MatchingOutcome { matching, stats })
    }
}

/// Every path must augment the current matching and no two may share a vertex.
fn validate_paths(matching: &Matching, paths: &[Vec<Edge>]) -> Result<()> {
    let mut used = HashSet::new();
    for path in paths {
        for vertex in matching.augmenting_path_vertices(path)? {
            if !used.insert(vertex) {
                return Err(MatchingError::InvalidPath(format!(
                    "vertex {} is shared by two augmenting paths",
                    vertex
                )));
            }
        }
    }
    Ok(())
}

struct Phase<'a> {
    params: &'a ScaleParams,
    matching: &'a mut Matching,
    stats: &'a mut RunStats,
    structures: Vec<Option<FreeNodeStructure>>,
    owner: HashMap<Vertex, usize>,
    removed: HashSet<Vertex>,
    paths: Vec<Vec<Edge>>,
}

impl<'a> Phase<'a> {
    fn new(params: &'a ScaleParams, matching: &'a mut Matching, stats: &'a mut RunStats) -> Self {
        Phase {
            params,
            matching,
            stats,
            structures: Vec::new(),
            owner: HashMap::new(),
            removed: HashSet::new(),
            paths: Vec::new(),
        }
    }

    fn run<S: EdgeStream + ?Sized>(
        mut self,
        stream: &mut S,
        vertices: &BTreeSet<Vertex>,
    ) -> Result<Vec<Vec<Edge>>> {
        self.plant(vertices);
        for pass in 0..self.params.pass_bundles_max {
            if !self.has_active() {
                break;
            }
            if !self.pass(stream, pass)? {
                trace!("pass {}: nothing left to do", pass);
                break;
            }
        }
        Ok(self.finish())
    }

    /// One tree per free vertex, with fresh labels.
    fn plant(&mut self, vertices: &BTreeSet<Vertex>) {
        self.matching.reset_labels();
        for &vertex in vertices {
            if self.matching.is_free(vertex) {
                self.owner.insert(vertex, self.structures.len());
                self.structures.push(Some(FreeNodeStructure::new(vertex)));
            }
        }
    }

    fn has_active(&self) -> bool {
        self.structures
            .iter()
            .flatten()
            .any(FreeNodeStructure::is_active)
    }

    /// Stream every edge once, then backtrack. Returns whether any tree
    /// changed or moved.
    fn pass<S: EdgeStream + ?Sized>(&mut self, stream: &mut S, pass: usize) -> Result<bool> {
        self.stats.passes += 1;
        for s in self.structures.iter_mut().flatten() {
            s.on_hold = s.vertex_count() >= self.params.path_limit;
            s.modified = false;
        }

        let mut changed = false;
        stream.rewind()?;
        while let Some((a, b)) = stream.next_edge()? {
            if self.process_edge(a, b)? || self.process_edge(b, a)? {
                changed = true;
            }
        }
        if log_enabled!(Level::Trace) {
            for s in self.structures.iter().flatten() {
                trace!("pass {}: {}", pass, s);
            }
        }
        let moved = self.backtrack_all();
        Ok(changed || moved)
    }

    /// Tear down the remaining trees and hand over the paths found.
    fn finish(mut self) -> Vec<Vec<Edge>> {
        for s in self.structures.iter_mut().flatten() {
            s.teardown();
        }
        self.paths
    }

    /// Try the edge from `u` towards `v`. Returns whether a tree changed.
    fn process_edge(&mut self, u: Vertex, v: Vertex) -> Result<bool> {
        if u == v || self.removed.contains(&u) || self.removed.contains(&v) {
            return Ok(false);
        }
        let edge = Edge::new(u, v);
        if self.matching.is_matched(edge) {
            return Ok(false);
        }
        let si = match self.owner.get(&u) {
            Some(&si) => si,
            None => return Ok(false),
        };
        let s = self.structures[si]
            .as_ref()
            .ok_or(MatchingError::InvariantViolation("vertex owned by a retired tree"))?;
        if !s.is_working_vertex(u) || s.on_hold || s.modified {
            return Ok(false);
        }

        match self.owner.get(&v).cloned() {
            Some(ti) if ti == si => {
                if s.node_for_vertex(u) == s.node_for_vertex(v) || !s.is_outer_vertex(v) {
                    return Ok(false);
                }
                self.contract(si, u, v)
            }
            Some(ti) => {
                let t = self.structures[ti]
                    .as_ref()
                    .ok_or(MatchingError::InvariantViolation("vertex owned by a retired tree"))?;
                if !t.is_outer_vertex(v) {
                    return Ok(false);
                }
                self.augment(si, u, ti, v)
            }
            None => self.extend(si, u, v),
        }
    }

    fn contract(&mut self, si: usize, u: Vertex, v: Vertex) -> Result<bool> {
        let s = self.structures[si]
            .as_mut()
            .ok_or(MatchingError::InvariantViolation("contracting a retired tree"))?;
        s.contract(u, v)?;
        s.modified = true;
        self.stats.contractions += 1;
        trace!("contracted at edge ({}, {})", u, v);
        Ok(true)
    }

    fn extend(&mut self, si: usize, u: Vertex, v: Vertex) -> Result<bool> {
        let mate = match self.matching.mate(v) {
            Some(mate) => mate,
            None => return Ok(false),
        };
        if self.removed.contains(&mate) || self.owner.contains_key(&mate) {
            return Ok(false);
        }
        let matched = Edge::new(v, mate);
        let s = self.structures[si]
            .as_mut()
            .ok_or(MatchingError::InvariantViolation("extending a retired tree"))?;
        let distance = s
            .working_distance()
            .ok_or(MatchingError::InvariantViolation("extending an inactive tree"))?
            + 1;
        let label = self.matching.label_of(matched).unwrap_or(INFINITE_LABEL);
        if label <= distance {
            return Ok(false);
        }
        s.extend(u, v, mate)?;
        s.modified = true;
        self.matching.set_label(matched, distance);
        self.owner.insert(v, si);
        self.owner.insert(mate, si);
        self.stats.extensions += 1;
        Ok(true)
    }

    fn augment(&mut self, si: usize, u: Vertex, ti: usize, v: Vertex) -> Result<bool> {
        let mut path = {
            let retired = MatchingError::InvariantViolation("augmenting through a retired tree");
            let s = self.structures[si].as_ref().ok_or(retired)?;
            let mut path = s.path_to_root(u, self.matching)?;
            path.reverse();
            path
        };
        path.push(Edge::new(u, v));
        {
            let t = self.structures[ti]
                .as_ref()
                .ok_or(MatchingError::InvariantViolation("augmenting through a retired tree"))?;
            path.extend(t.path_to_root(v, self.matching)?);
        }
        debug!("augmenting path of {} edges through ({}, {})", path.len(), u, v);

        for &idx in &[si, ti] {
            if let Some(mut s) = self.structures[idx].take() {
                for vertex in s.vertices() {
                    self.owner.remove(&vertex);
                    self.removed.insert(vertex);
                }
                s.teardown();
            }
        }
        self.paths.push(path);
        Ok(true)
    }

    /// Backtrack every tree. A tree that climbs past its root stops
    /// growing but keeps its vertices, so other trees can still reach its
    /// outer nodes and augment through it.
    fn backtrack_all(&mut self) -> bool {
        let mut moved = false;
        for s in self.structures.iter_mut().flatten() {
            if s.backtrack() {
                moved = true;
                self.stats.backtracks += 1;
                if !s.is_active() {
                    trace!("tree of {} stopped growing", s.root_vertex());
                }
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgestream::MemoryStream;
    use proptest::prelude::*;

    fn e(u: Vertex, v: Vertex) -> Edge {
        Edge::new(u, v)
    }

    fn run(edges: Vec<(Vertex, Vertex)>) -> MatchingOutcome {
        let mut s = MemoryStream::new(edges);
        MatchingDriver::new(Config::default())
            .unwrap()
            .run(&mut s)
            .unwrap()
    }

    #[test]
    fn schedule_bounds_for_half() {
        let params: Vec<ScaleParams> = ScaleSchedule::new(0.5).collect();
        assert_eq!(params.len(), 8);
        for pair in params.windows(2) {
            assert!(pair[1].scale < pair[0].scale);
            assert!(pair[1].path_limit > pair[0].path_limit);
        }
        for p in &params {
            assert!(p.scale >= 0.5 * 0.5 / 64.0);
            assert!(p.path_limit > 0 && p.pass_bundles_max > 0 && p.phase_limit > 0);
        }
        let first = params[0];
        assert_eq!(
            (first.path_limit, first.pass_bundles_max, first.phase_limit),
            (13, 288, 576)
        );
        let last = params[7];
        assert_eq!(last.scale, 1.0 / 256.0);
        assert_eq!(
            (last.path_limit, last.pass_bundles_max, last.phase_limit),
            (1537, 36864, 73728)
        );
    }

    #[test]
    fn schedule_length_follows_epsilon() {
        assert_eq!(ScaleSchedule::new(1.0).count(), 6);
        assert_eq!(ScaleSchedule::new(0.25).count(), 10);
        assert_eq!(ScaleSchedule::new(0.5).limit(), 1.0 / 256.0);
    }

    #[test]
    fn driver_rejects_bad_epsilon() {
        assert!(MatchingDriver::new(Config::new(1.5)).is_err());
    }

    #[test]
    fn augments_a_path() {
        let outcome = run(vec![(2, 3), (1, 2), (3, 4)]);
        assert_eq!(outcome.matching.edges(), vec![e(1, 2), e(3, 4)]);
        assert_eq!(outcome.stats.greedy_size, 1);
        assert_eq!(outcome.stats.augmentations, 1);
        assert_eq!(outcome.stats.extensions, 1);
        assert_eq!(outcome.stats.scales, 8);
    }

    #[test]
    fn augments_through_a_blossom() {
        // greedy takes 1-2 and 3-4; 0 and 5 stay free, and the only way
        // between them runs around the triangle 0-1-2.
        let outcome = run(vec![(1, 2), (3, 4), (0, 1), (0, 2), (1, 3), (4, 5)]);
        assert_eq!(outcome.stats.greedy_size, 2);
        assert_eq!(outcome.stats.contractions, 1);
        assert_eq!(outcome.matching.edges(), vec![e(0, 2), e(1, 3), e(4, 5)]);
    }

    #[test]
    fn disjoint_paths_in_one_phase() {
        // two separate 4-paths, each with its middle edge matched greedily
        let outcome = run(vec![(2, 3), (12, 13), (1, 2), (3, 4), (11, 12), (13, 14)]);
        assert_eq!(outcome.matching.len(), 4);
        assert_eq!(outcome.stats.augmentations, 2);
        assert_eq!(outcome.stats.phases, 9);
    }

    #[test]
    fn nothing_to_improve() {
        let outcome = run(vec![(1, 2), (3, 4), (2, 3)]);
        assert_eq!(outcome.matching.len(), 2);
        assert_eq!(outcome.stats.augmentations, 0);
        assert_eq!(outcome.stats.passes, 0);

        let empty = run(vec![]);
        assert!(empty.matching.is_empty());
    }

    #[test]
    fn stalled_root_stays_reachable() {
        // greedy takes 0-3; root 1 finds nothing in the first pass while
        // root 2 grows into the triangle, contracts it and then reaches 1
        let outcome = run(vec![(0, 3), (0, 2), (3, 2), (1, 0)]);
        assert_eq!(outcome.stats.greedy_size, 1);
        assert_eq!(outcome.matching.edges(), vec![e(0, 1), e(2, 3)]);
        assert_eq!(outcome.stats.augmentations, 1);
        assert_eq!(outcome.stats.contractions, 1);
        assert_eq!(outcome.stats.backtracks, 1);
    }

    fn held_graph() -> (MemoryStream, BTreeSet<Vertex>, Matching) {
        // 0-1=2-3=4 grows from 0 over two passes, 5-6=7 from 5 in one;
        // (0, 4) would close a blossom and (4, 8) extend the tree of 0
        let edges = vec![
            (1, 2),
            (3, 4),
            (6, 7),
            (8, 9),
            (5, 6),
            (0, 1),
            (2, 3),
            (0, 4),
            (4, 8),
            (2, 5),
        ];
        let mut s = MemoryStream::new(edges);
        let (m, vertices) = greedy_pass(&mut s).unwrap();
        assert_eq!(m.len(), 4);
        (s, vertices, m)
    }

    fn held_params(path_limit: usize) -> ScaleParams {
        ScaleParams {
            scale: 0.5,
            path_limit,
            pass_bundles_max: 10,
            phase_limit: 1,
        }
    }

    #[test]
    fn tree_on_hold_is_frozen() {
        let (mut s, vertices, mut m) = held_graph();
        let params = held_params(4);
        let mut stats = RunStats::default();
        let mut phase = Phase::new(&params, &mut m, &mut stats);
        phase.plant(&vertices);
        assert_eq!(phase.structures.len(), 2);
        assert!(phase.pass(&mut s, 0).unwrap());
        assert!(phase.pass(&mut s, 1).unwrap());
        let big = phase.structures[0].as_ref().unwrap();
        assert_eq!(big.root_vertex(), 0);
        assert_eq!(big.vertex_count(), 5);
        assert!(big.is_working_vertex(4));

        // the tree of 0 is on hold now: no contraction at (0, 4), no
        // extension at (4, 8), but 5 still augments into it at (2, 5)
        assert!(phase.pass(&mut s, 2).unwrap());
        assert!(!phase.has_active());
        let paths = phase.finish();
        assert_eq!(paths, vec![vec![e(2, 5), e(1, 2), e(0, 1)]]);
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.extensions, 3);
        assert_eq!(stats.contractions, 0);
        assert_eq!(stats.backtracks, 1);
    }

    #[test]
    fn tree_below_limit_keeps_growing() {
        let (mut s, vertices, mut m) = held_graph();
        let params = held_params(13);
        let mut stats = RunStats::default();
        let paths = Phase::new(&params, &mut m, &mut stats)
            .run(&mut s, &vertices)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(stats.contractions, 1);
        assert_eq!(stats.passes, 3);
        validate_paths(&m, &paths).unwrap();
        m.apply_augmenting_paths(&paths);
        assert_eq!(m.len(), 5);
    }

    #[test]
    fn validate_paths_rejects_overlap() {
        let m = Matching::new();
        assert!(validate_paths(&m, &[vec![e(1, 2)], vec![e(3, 4)]]).is_ok());
        assert!(matches!(
            validate_paths(&m, &[vec![e(1, 2)], vec![e(2, 3)]]),
            Err(MatchingError::InvalidPath(_))
        ));
    }

    fn edges_strategy() -> impl Strategy<Value = Vec<(Vertex, Vertex)>> {
        prop::collection::vec((0..12usize, 0..12usize), 0..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn result_is_a_valid_matching(edges in edges_strategy()) {
            let input: HashSet<Edge> = edges.iter().map(|&(u, v)| e(u, v)).collect();
            let mut s = MemoryStream::new(edges.clone());
            let greedy = crate::greedy_matching(&mut s).unwrap();
            let outcome = run(edges);
            let m = &outcome.matching;
            prop_assert!(m.is_valid());
            prop_assert!(m.len() >= greedy.len());
            prop_assert_eq!(outcome.stats.greedy_size, greedy.len());
            for edge in m.edges() {
                prop_assert!(input.contains(&edge));
                prop_assert!(!edge.is_loop());
            }
        }
    }
}
