use std::fs;
use std::path::PathBuf;

use approxmatch::{Config, Matching, MatchingDriver, MatchingError, RunStats};
use clap::Parser;
use edgestream::{EdgeStream, FileStream, MemoryStream, StreamError};
use log::info;

mod data_exchange;
mod db;
mod models;

use data_exchange::Report;
use models::Algorithm;

static DEMO_GRAPH: &str = include_str!("../data/example.txt");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Matching(#[from] MatchingError),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("inconsistent data: {0}")]
    Inconsistency(&'static str),
    #[error("{0}")]
    Usage(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Approximate maximum matching over a stream of edges
#[derive(Parser, Debug)]
#[command(name = "streammatch", version, about, long_about = None)]
struct Args {
    /// Edge list file, one "u v" pair per line
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,
    /// SQLite database holding the edges table; results are stored there too
    #[arg(long, value_name = "DB")]
    db: Option<PathBuf>,
    /// Run on the built-in demo graph
    #[arg(long, conflicts_with = "file")]
    demo: bool,
    /// Approximation parameter in (0, 1]
    #[arg(short, long)]
    epsilon: Option<f64>,
    /// Only run the single-pass greedy 2-approximation
    #[arg(long)]
    baseline: bool,
    /// JSON file with algorithm settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Write a JSON report of the result
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,
    /// Save the result in the database
    #[arg(long, requires = "db")]
    store: bool,
    /// Append the edges of an edge list file to the database first
    #[arg(long, value_name = "FILE", requires = "db")]
    import_edges: Option<PathBuf>,
    /// Show a stored run instead of computing one
    #[arg(long, value_name = "ID", requires = "db")]
    show_run: Option<i64>,
    /// Check a JSON report against the input graph
    #[arg(long, value_name = "FILE")]
    verify: Option<PathBuf>,
    /// Print every matched edge
    #[arg(long)]
    edges: bool,
}

struct Solution {
    algorithm: Algorithm,
    epsilon: Option<f64>,
    matching: Matching,
    stats: Option<RunStats>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config: Config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Default::default(),
    };
    if let Some(epsilon) = args.epsilon {
        config.epsilon = epsilon;
    }
    config.validate()?;
    Ok(config)
}

fn open_stream<'c>(
    args: &Args,
    conn: Option<&'c rusqlite::Connection>,
) -> Result<Box<dyn EdgeStream + 'c>> {
    if let Some(path) = &args.file {
        return Ok(Box::new(FileStream::open(path)?));
    }
    if args.demo {
        return Ok(Box::new(MemoryStream::parse(DEMO_GRAPH)?));
    }
    match conn {
        Some(conn) => Ok(Box::new(db::SqliteEdgeStream::new(conn))),
        None => Err(Error::Usage("no input: give --file, --db or --demo")),
    }
}

fn solve<S: EdgeStream + ?Sized>(stream: &mut S, baseline: bool, config: Config) -> Result<Solution> {
    if baseline {
        return Ok(Solution {
            algorithm: Algorithm::Baseline,
            epsilon: None,
            matching: approxmatch::greedy_matching(stream)?,
            stats: None,
        });
    }
    let outcome = MatchingDriver::new(config)?.run(stream)?;
    Ok(Solution {
        algorithm: Algorithm::Scaling,
        epsilon: Some(config.epsilon),
        matching: outcome.matching,
        stats: Some(outcome.stats),
    })
}

fn print_report(report: &Report, edges: bool) {
    println!("{} matching size: {}", report.algorithm, report.size);
    if edges {
        for (u, v) in &report.matching {
            println!("{} {}", u, v);
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let mut conn = match &args.db {
        Some(path) => Some(db::open(path)?),
        None => None,
    };

    if let (Some(conn), Some(path)) = (conn.as_mut(), &args.import_edges) {
        let mut source = FileStream::open(path)?;
        let count = db::import_edges(conn, &mut source)?;
        info!("imported {} edges from {}", count, path.display());
    }

    if let Some(id) = args.show_run {
        let conn = conn.as_ref().ok_or(Error::Usage("--show-run needs --db"))?;
        let stored = db::load_run(conn, id)?;
        println!("run {}", stored.id);
        let report = Report::from_stored(stored);
        print_report(&report, args.edges);
        if let Some(path) = &args.export {
            data_exchange::export(path, &report)?;
        }
        return Ok(());
    }

    let mut stream = open_stream(&args, conn.as_ref())?;
    if let Some(path) = &args.verify {
        let report = data_exchange::import(path)?;
        let matching = data_exchange::verify(&report, &mut stream)?;
        println!("report verified: {} matched edges", matching.len());
        return Ok(());
    }
    let solution = solve(&mut stream, args.baseline, config)?;
    drop(stream);

    let report = Report::new(
        solution.algorithm,
        solution.epsilon,
        &solution.matching,
        solution.stats.clone(),
    );
    print_report(&report, args.edges);
    if args.store {
        let conn = conn.as_mut().ok_or(Error::Usage("--store needs --db"))?;
        let id = db::store_run(
            conn,
            solution.algorithm,
            solution.epsilon,
            &solution.matching,
            solution.stats.as_ref(),
        )?;
        println!("stored as run {}", id);
    }
    if let Some(path) = &args.export {
        data_exchange::export(path, &report)?;
        info!("report written to {}", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Args {
        let mut full = vec!["streammatch"];
        full.extend_from_slice(list);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn parse_arguments() {
        let a = args(&["--demo", "-e", "0.25", "--baseline"]);
        assert!(a.demo && a.baseline);
        assert_eq!(a.epsilon, Some(0.25));
        assert!(Args::try_parse_from(["streammatch", "--store"]).is_err());
        assert!(Args::try_parse_from(["streammatch", "--demo", "--file", "g.txt"]).is_err());
    }

    #[test]
    fn config_file_overridden_by_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"epsilon\": 0.25}").unwrap();
        let path = path.to_str().unwrap();
        assert_eq!(load_config(&args(&["--config", path])).unwrap().epsilon, 0.25);
        assert_eq!(
            load_config(&args(&["--config", path, "-e", "0.75"]))
                .unwrap()
                .epsilon,
            0.75
        );
        fs::write(dir.path().join("empty.json"), "{}").unwrap();
        let empty = dir.path().join("empty.json");
        assert_eq!(
            load_config(&args(&["--config", empty.to_str().unwrap()])).unwrap(),
            Config::default()
        );
        assert!(matches!(
            load_config(&args(&["-e", "3"])),
            Err(Error::Matching(MatchingError::InvalidEpsilon(_)))
        ));
    }

    #[test]
    fn demo_graph_results() {
        let mut stream = MemoryStream::parse(DEMO_GRAPH).unwrap();
        let baseline = solve(&mut stream, true, Config::default()).unwrap();
        assert_eq!(baseline.matching.len(), 4);
        assert!(baseline.stats.is_none());
        let scaling = solve(&mut stream, false, Config::default()).unwrap();
        assert_eq!(scaling.matching.len(), 6);
        assert_eq!(scaling.epsilon, Some(0.5));
        assert_eq!(scaling.stats.unwrap().greedy_size, 4);
    }

    #[test]
    fn missing_input() {
        assert!(matches!(
            open_stream(&args(&[]), None),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn run_stores_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("runs.sqlite");
        let report_path = dir.path().join("report.json");
        let db_path = db_path.to_str().unwrap();
        let report_path = report_path.to_str().unwrap();

        run(args(&["--demo", "--db", db_path, "--store", "--export", report_path])).unwrap();
        let report = data_exchange::import(report_path.as_ref()).unwrap();
        assert_eq!(report.size, 6);
        assert_eq!(report.algorithm, Algorithm::Scaling);
        run(args(&["--demo", "--verify", report_path])).unwrap();

        let conn = db::open(db_path).unwrap();
        let stored = db::load_run(&conn, 1).unwrap();
        assert_eq!(stored.edges, report.matching);
        drop(conn);

        let shown = dir.path().join("shown.json");
        run(args(&[
            "--db",
            db_path,
            "--show-run",
            "1",
            "--export",
            shown.to_str().unwrap(),
        ]))
        .unwrap();
        assert_eq!(data_exchange::import(&shown).unwrap().size, 6);
    }

    #[test]
    fn run_on_database_edges() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("graph.txt");
        fs::write(&graph, "2 3\n1 2\n3 4\n").unwrap();
        let db_path = dir.path().join("edges.sqlite");
        let db_path = db_path.to_str().unwrap();
        run(args(&[
            "--db",
            db_path,
            "--import-edges",
            graph.to_str().unwrap(),
            "--store",
        ]))
        .unwrap();
        let conn = db::open(db_path).unwrap();
        let stored = db::load_run(&conn, 1).unwrap();
        assert_eq!(stored.edges, vec![(1, 2), (3, 4)]);
        assert_eq!(stored.algorithm, Algorithm::Scaling);
    }
}
