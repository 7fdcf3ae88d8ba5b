//! Approximate maximum cardinality matching over an edge stream.
//!
//! A single greedy pass gives a 2-approximation. The scaling algorithm then
//! improves on it pass by pass: every free vertex grows an alternating tree,
//! odd cycles are contracted into blossoms as in Edmonds' algorithm, and two
//! trees that touch yield an augmenting path. Trees are capped in size and
//! the number of passes is bounded, so the result approximates a maximum
//! matching rather than computing one.

use std::collections::BTreeSet;

use edgestream::{EdgeStream, StreamError};

mod blossom;
mod config;
mod driver;
mod matching;
mod node;
mod structure;

pub use blossom::{AugmentationSplit, Blossom};
pub use config::Config;
pub use driver::{MatchingDriver, MatchingOutcome, RunStats, ScaleParams, ScaleSchedule};
pub use edgestream::{Edge, Vertex};
pub use matching::{Matching, INFINITE_LABEL};
pub use node::{Node, NodeId, NodeKind};
pub use structure::FreeNodeStructure;

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("vertex {0} is not covered by this structure")]
    VertexNotInStructure(Vertex),
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
    #[error("blossom entered at vertex {vertex} has a matched edge on both sides")]
    BlossomBorder { vertex: Vertex },
    #[error("invalid augmenting path: {0}")]
    InvalidPath(String),
    #[error("epsilon must lie in (0, 1], got {0}")]
    InvalidEpsilon(f64),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type Result<T> = std::result::Result<T, MatchingError>;

/// One pass, keeping every edge whose endpoints are both still free.
///
/// Also returns every vertex seen, self-loops included.
pub(crate) fn greedy_pass<S: EdgeStream + ?Sized>(
    stream: &mut S,
) -> Result<(Matching, BTreeSet<Vertex>)> {
    let mut matching = Matching::new();
    let mut vertices = BTreeSet::new();
    stream.rewind()?;
    while let Some((u, v)) = stream.next_edge()? {
        vertices.insert(u);
        vertices.insert(v);
        if u != v && matching.is_free(u) && matching.is_free(v) {
            matching.add_edge(Edge::new(u, v));
        }
    }
    Ok((matching, vertices))
}

/// Single-pass 2-approximation of a maximum matching.
/// ```
/// use edgestream::MemoryStream;
/// let mut s = MemoryStream::new(vec![(1, 2), (2, 3), (5, 6)]);
/// let m = approxmatch::greedy_matching(&mut s).unwrap();
/// assert_eq!(m.len(), 2);
/// ```
pub fn greedy_matching<S: EdgeStream + ?Sized>(stream: &mut S) -> Result<Matching> {
    greedy_pass(stream).map(|(matching, _)| matching)
}

/// Greedy pass followed by the full scaling algorithm.
pub fn max_matching<S: EdgeStream + ?Sized>(stream: &mut S, config: Config) -> Result<Matching> {
    let driver = MatchingDriver::new(config)?;
    driver.run(stream).map(|outcome| outcome.matching)
}
