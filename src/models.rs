use serde::{Deserialize, Serialize};

use approxmatch::Vertex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Algorithm {
    Baseline,
    Scaling,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Algorithm::Baseline => "Baseline",
            Algorithm::Scaling => "Scaling",
        };
        write!(formatter, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown algorithm {0:?}")]
pub struct ParseAlgorithmError(String);

impl std::str::FromStr for Algorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Baseline" => Ok(Algorithm::Baseline),
            "Scaling" => Ok(Algorithm::Scaling),
            _ => Err(ParseAlgorithmError(s.to_owned())),
        }
    }
}

/// A matching computed earlier and kept in the database.
#[derive(Debug)]
pub struct StoredRun {
    pub id: i64,
    pub algorithm: Algorithm,
    pub epsilon: Option<f64>,
    pub edges: Vec<(Vertex, Vertex)>,
}
