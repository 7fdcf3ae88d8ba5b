use std::collections::HashSet;
use std::fs;
use std::path::Path;

use approxmatch::{Edge, Matching, RunStats, Vertex};
use edgestream::EdgeStream;
use serde::{Deserialize, Serialize};

use crate::models::{Algorithm, StoredRun};
use crate::{Error, Result};

#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct Report {
    #[serde(skip_deserializing)]
    program_version: &'static str,
    pub algorithm: Algorithm,
    pub epsilon: Option<f64>,
    pub size: usize,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
    pub matching: Vec<(Vertex, Vertex)>,
}

impl Report {
    pub(crate) fn new(
        algorithm: Algorithm,
        epsilon: Option<f64>,
        matching: &Matching,
        stats: Option<RunStats>,
    ) -> Self {
        Report {
            program_version: env!("CARGO_PKG_VERSION"),
            algorithm,
            epsilon,
            size: matching.len(),
            stats,
            matching: matching.edges().into_iter().map(Edge::endpoints).collect(),
        }
    }

    pub(crate) fn from_stored(run: StoredRun) -> Self {
        Report {
            program_version: env!("CARGO_PKG_VERSION"),
            algorithm: run.algorithm,
            epsilon: run.epsilon,
            size: run.edges.len(),
            stats: None,
            matching: run.edges,
        }
    }

    /// Rebuild the matching, refusing edges that share a vertex.
    pub(crate) fn to_matching(&self) -> Result<Matching> {
        if self.size != self.matching.len() {
            return Err(Error::Inconsistency("report size does not match its edges"));
        }
        let mut matching = Matching::new();
        for &(u, v) in &self.matching {
            if u == v || !matching.is_free(u) || !matching.is_free(v) {
                return Err(Error::Inconsistency("reported edges do not form a matching"));
            }
            matching.add_edge(Edge::new(u, v));
        }
        Ok(matching)
    }
}

pub(crate) fn export(path: &Path, report: &Report) -> Result<()> {
    let s = export_internal(report)?;
    fs::write(path, s)?;
    Ok(())
}

fn export_internal(report: &Report) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub(crate) fn import(path: &Path) -> Result<Report> {
    let json = fs::read_to_string(path)?;
    import_internal(&json)
}

fn import_internal(json: &str) -> Result<Report> {
    let report: Report = serde_json::from_str(json)?;
    report.to_matching()?;
    Ok(report)
}

/// Check a reported matching against the graph it claims to come from.
pub(crate) fn verify<S: EdgeStream + ?Sized>(report: &Report, stream: &mut S) -> Result<Matching> {
    let matching = report.to_matching()?;
    let mut edges = HashSet::new();
    stream.rewind()?;
    while let Some((u, v)) = stream.next_edge()? {
        edges.insert(Edge::new(u, v));
    }
    if matching.edges().iter().any(|edge| !edges.contains(edge)) {
        return Err(Error::Inconsistency("reported edge is not in the graph"));
    }
    Ok(matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgestream::MemoryStream;

    fn two_edges() -> Matching {
        Matching::from_edges(vec![Edge::new(4, 3), Edge::new(1, 2)])
    }

    #[test]
    fn export_0() {
        let report = Report::new(Algorithm::Baseline, None, &Matching::new(), None);
        let s = export_internal(&report).unwrap();
        assert_eq!(s.chars().next(), Some('{'));
        assert!(!s.contains("stats"));
        let data: Report = serde_json::from_str(&s).unwrap();
        assert_eq!(data.matching.len(), 0);
        assert_eq!(data.size, 0);
    }

    #[test]
    fn export_2() {
        let stats = RunStats {
            greedy_size: 1,
            augmentations: 1,
            ..Default::default()
        };
        let report = Report::new(Algorithm::Scaling, Some(0.5), &two_edges(), Some(stats));
        let s = export_internal(&report).unwrap();
        assert!(s.contains(env!("CARGO_PKG_VERSION")));
        assert!(s.contains("\"augmentations\": 1"));
        let data: Report = serde_json::from_str(&s).unwrap();
        assert_eq!(data.algorithm, Algorithm::Scaling);
        assert_eq!(data.epsilon, Some(0.5));
        assert_eq!(data.size, 2);
        assert_eq!(data.matching, vec![(1, 2), (3, 4)]);
        assert_eq!(data.program_version, "");
        assert!(data.stats.is_none());
    }

    #[test]
    fn import_error_1() {
        assert!(import_internal("{").is_err());
    }

    #[test]
    fn import_error_2() {
        assert!(import_internal("{}").is_err());
    }

    #[test]
    fn import_overlapping_edges() {
        let json = r#"{"algorithm": "Scaling", "size": 2, "matching": [[1, 2], [2, 3]]}"#;
        assert!(matches!(
            import_internal(json),
            Err(Error::Inconsistency(_))
        ));
        let json = r#"{"algorithm": "Scaling", "size": 3, "matching": [[1, 2]]}"#;
        assert!(matches!(
            import_internal(json),
            Err(Error::Inconsistency(_))
        ));
    }

    #[test]
    fn export_import_0() {
        let s = export_internal(&Report::new(Algorithm::Baseline, None, &Matching::new(), None))
            .unwrap();
        let report = import_internal(&s).unwrap();
        assert!(report.to_matching().unwrap().is_empty());
    }

    #[test]
    fn export_import_2() {
        let s = export_internal(&Report::new(Algorithm::Scaling, Some(0.25), &two_edges(), None))
            .unwrap();
        let report = import_internal(&s).unwrap();
        assert_eq!(report.epsilon, Some(0.25));
        assert_eq!(report.to_matching().unwrap().edges(), two_edges().edges());
    }

    #[test]
    fn export_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        export(&path, &Report::new(Algorithm::Scaling, Some(0.5), &two_edges(), None)).unwrap();
        let report = import(&path).unwrap();
        assert_eq!(report.size, 2);
    }

    #[test]
    fn verify_against_graph() {
        let report = Report::new(Algorithm::Scaling, Some(0.5), &two_edges(), None);
        let mut s = MemoryStream::new(vec![(2, 1), (2, 3), (3, 4)]);
        assert_eq!(verify(&report, &mut s).unwrap().len(), 2);
        let mut s = MemoryStream::new(vec![(1, 2), (2, 3)]);
        assert!(matches!(
            verify(&report, &mut s),
            Err(Error::Inconsistency(_))
        ));
    }

    #[test]
    fn report_from_stored_run() {
        let run = StoredRun {
            id: 3,
            algorithm: Algorithm::Baseline,
            epsilon: None,
            edges: vec![(1, 2)],
        };
        let report = Report::from_stored(run);
        assert_eq!(report.size, 1);
        assert_eq!(report.to_matching().unwrap().len(), 1);
    }
}
