use std::collections::VecDeque;
use std::convert::TryFrom;
use std::io;
use std::path::Path;
use std::str::FromStr;

use approxmatch::{Matching, RunStats, Vertex};
use edgestream::{EdgeStream, StreamError};
use log::{info, trace};
use rusqlite::params;
use rusqlite::types::{FromSql, FromSqlError, ToSql, ToSqlOutput, Value, ValueRef};

use crate::models::{Algorithm, StoredRun};
use crate::{Error, Result};

pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

static SCHEMA: &str = include_str!("../database/schema.sql");

pub fn ensure_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    match conn.prepare("SELECT u, v FROM edges ORDER BY id") {
        Ok(_) => Ok(()),
        Err(_) => {
            info!("initializing database");
            conn.execute_batch(SCHEMA)
        }
    }
}

impl FromSql for Algorithm {
    fn column_result(val: ValueRef) -> std::result::Result<Self, FromSqlError> {
        Algorithm::from_str(val.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Algorithm {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Text(self.to_string())))
    }
}

fn vertex_from_sql(value: i64) -> Result<Vertex> {
    Vertex::try_from(value).map_err(|_| Error::Inconsistency("negative vertex id in database"))
}

fn vertex_to_sql(vertex: Vertex) -> Result<i64> {
    i64::try_from(vertex).map_err(|_| Error::Inconsistency("vertex id too large for database"))
}

/// Append every edge of `stream` to the edges table, in stream order.
pub fn import_edges<S: EdgeStream + ?Sized>(
    conn: &mut rusqlite::Connection,
    stream: &mut S,
) -> Result<usize> {
    let trans = conn.transaction()?;
    let mut count = 0;
    {
        let mut stmt = trans.prepare("INSERT INTO edges (u, v) VALUES (?1, ?2)")?;
        stream.rewind()?;
        while let Some((u, v)) = stream.next_edge()? {
            stmt.execute(params![vertex_to_sql(u)?, vertex_to_sql(v)?])?;
            count += 1;
        }
    }
    trans.commit()?;
    Ok(count)
}

const BATCH_SIZE: i64 = 1024;

/// Edges of the edges table in rowid order, fetched in batches.
pub struct SqliteEdgeStream<'c> {
    conn: &'c rusqlite::Connection,
    batch: VecDeque<(Vertex, Vertex)>,
    last_id: i64,
    exhausted: bool,
}

impl<'c> SqliteEdgeStream<'c> {
    pub fn new(conn: &'c rusqlite::Connection) -> Self {
        SqliteEdgeStream {
            conn,
            batch: VecDeque::new(),
            last_id: i64::MIN,
            exhausted: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let conn = self.conn;
        let mut stmt =
            conn.prepare_cached("SELECT id, u, v FROM edges WHERE id > ?1 ORDER BY id LIMIT ?2")?;
        let rows: Vec<(i64, i64, i64)> = stmt
            .query_map(params![self.last_id, BATCH_SIZE], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<_>>()?;
        if (rows.len() as i64) < BATCH_SIZE {
            self.exhausted = true;
        }
        for (id, u, v) in rows {
            self.last_id = id;
            self.batch.push_back((vertex_from_sql(u)?, vertex_from_sql(v)?));
        }
        Ok(())
    }
}

fn stream_error(e: Error) -> StreamError {
    match e {
        Error::Stream(e) => e,
        e => StreamError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())),
    }
}

impl EdgeStream for SqliteEdgeStream<'_> {
    fn next_edge(&mut self) -> std::result::Result<Option<(Vertex, Vertex)>, StreamError> {
        if self.batch.is_empty() && !self.exhausted {
            self.fill().map_err(stream_error)?;
        }
        Ok(self.batch.pop_front())
    }

    fn rewind(&mut self) -> std::result::Result<(), StreamError> {
        trace!("rewinding database stream at edge id {}", self.last_id);
        self.batch.clear();
        self.last_id = i64::MIN;
        self.exhausted = false;
        Ok(())
    }
}

/// Save a matching together with how it was computed. Returns the run id.
pub fn store_run(
    conn: &mut rusqlite::Connection,
    algorithm: Algorithm,
    epsilon: Option<f64>,
    matching: &Matching,
    stats: Option<&RunStats>,
) -> Result<i64> {
    let stats = match stats {
        Some(stats) => Some(serde_json::to_string(stats)?),
        None => None,
    };
    let trans = conn.transaction()?;
    trans.execute(
        "INSERT INTO runs (algorithm, epsilon, size, stats) VALUES (?1, ?2, ?3, ?4)",
        params![algorithm, epsilon, matching.len() as i64, stats],
    )?;
    let run = trans.last_insert_rowid();
    {
        let mut stmt = trans.prepare("INSERT INTO matchings (run, u, v) VALUES (?1, ?2, ?3)")?;
        for edge in matching.edges() {
            let (u, v) = edge.endpoints();
            stmt.execute(params![run, vertex_to_sql(u)?, vertex_to_sql(v)?])?;
        }
    }
    trans.commit()?;
    Ok(run)
}

pub fn load_run(conn: &rusqlite::Connection, run: i64) -> Result<StoredRun> {
    let (algorithm, epsilon, size): (Algorithm, Option<f64>, i64) = conn.query_row(
        "SELECT algorithm, epsilon, size FROM runs WHERE id = ?1",
        params![run],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let mut stmt = conn.prepare("SELECT u, v FROM matchings WHERE run = ?1 ORDER BY u")?;
    let rows: Vec<(i64, i64)> = stmt
        .query_map(params![run], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    if rows.len() as i64 != size {
        return Err(Error::Inconsistency("stored matching size does not match its edges"));
    }
    let edges = rows
        .into_iter()
        .map(|(u, v)| -> Result<(Vertex, Vertex)> {
            Ok((vertex_from_sql(u)?, vertex_from_sql(v)?))
        })
        .collect::<Result<_>>()?;
    Ok(StoredRun {
        id: run,
        algorithm,
        epsilon,
        edges,
    })
}
