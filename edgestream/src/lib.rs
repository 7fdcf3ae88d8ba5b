//! Edge streams: the only view the matching algorithms have of the input graph.
//!
//! A stream hands out edges one at a time in a fixed order and can be
//! rewound to start another pass over the same edges.

use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use log::trace;

pub type Vertex = usize;

/// Undirected edge, stored with the smaller endpoint first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge(Vertex, Vertex);

impl Edge {
    /// ```
    /// use edgestream::Edge;
    /// assert_eq!(Edge::new(5, 2), Edge::new(2, 5));
    /// assert_eq!(Edge::new(5, 2).endpoints(), (2, 5));
    /// ```
    pub fn new(u: Vertex, v: Vertex) -> Self {
        if u <= v {
            Edge(u, v)
        } else {
            Edge(v, u)
        }
    }

    #[inline]
    pub fn endpoints(self) -> (Vertex, Vertex) {
        (self.0, self.1)
    }

    #[inline]
    pub fn contains(self, v: Vertex) -> bool {
        self.0 == v || self.1 == v
    }

    /// The endpoint opposite to `v`, if `v` is an endpoint at all.
    /// ```
    /// let e = edgestream::Edge::new(3, 8);
    /// assert_eq!(e.other(3), Some(8));
    /// assert_eq!(e.other(4), None);
    /// ```
    pub fn other(self, v: Vertex) -> Option<Vertex> {
        if self.0 == v {
            Some(self.1)
        } else if self.1 == v {
            Some(self.0)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_loop(self) -> bool {
        self.0 == self.1
    }
}

impl From<(Vertex, Vertex)> for Edge {
    fn from((u, v): (Vertex, Vertex)) -> Self {
        Edge::new(u, v)
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "({}, {})", self.0, self.1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: cannot parse edge from {content:?}")]
    Parse { line: usize, content: String },
    #[error("line {line}: negative vertex id (only \"-1 -1\" may end a stream)")]
    NegativeVertex { line: usize },
}

/// Source of edges for one or more passes.
///
/// `next_edge` returns `Ok(None)` at the end of a pass; the edge is reported
/// in the orientation it was read.
pub trait EdgeStream {
    fn next_edge(&mut self) -> Result<Option<(Vertex, Vertex)>, StreamError>;

    /// Start the next pass from the first edge.
    fn rewind(&mut self) -> Result<(), StreamError>;
}

impl<S: EdgeStream + ?Sized> EdgeStream for Box<S> {
    fn next_edge(&mut self) -> Result<Option<(Vertex, Vertex)>, StreamError> {
        (**self).next_edge()
    }

    fn rewind(&mut self) -> Result<(), StreamError> {
        (**self).rewind()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Edge(Vertex, Vertex),
    Skip,
    End,
}

fn parse_vertex(token: &str, line: usize, content: &str) -> Result<Option<Vertex>, StreamError> {
    let value: i64 = token.parse().map_err(|_| StreamError::Parse {
        line,
        content: content.to_owned(),
    })?;
    if value == -1 {
        Ok(None)
    } else if value < 0 {
        Err(StreamError::NegativeVertex { line })
    } else {
        Vertex::try_from(value)
            .map(Some)
            .map_err(|_| StreamError::Parse {
                line,
                content: content.to_owned(),
            })
    }
}

fn parse_line(line: usize, content: &str) -> Result<Line, StreamError> {
    let trimmed = match content.find('#') {
        Some(idx) => &content[..idx],
        None => content,
    }
    .trim();
    if trimmed.is_empty() {
        return Ok(Line::Skip);
    }
    let mut tokens = trimmed.split_whitespace();
    let (first, second) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(first), Some(second), None) => (first, second),
        _ => {
            return Err(StreamError::Parse {
                line,
                content: content.to_owned(),
            })
        }
    };
    match (
        parse_vertex(first, line, content)?,
        parse_vertex(second, line, content)?,
    ) {
        (Some(u), Some(v)) => Ok(Line::Edge(u, v)),
        (None, None) => Ok(Line::End),
        _ => Err(StreamError::NegativeVertex { line }),
    }
}

/// Edges held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    edges: Vec<(Vertex, Vertex)>,
    pos: usize,
}

impl MemoryStream {
    pub fn new(edges: Vec<(Vertex, Vertex)>) -> Self {
        MemoryStream { edges, pos: 0 }
    }

    /// Parse a text buffer in the edge-list format read by [`FileStream`].
    /// ```
    /// use edgestream::{EdgeStream, MemoryStream};
    /// let mut s = MemoryStream::parse("1 2\n# comment\n2 3\n-1 -1\n4 5\n").unwrap();
    /// assert_eq!(s.len(), 2);
    /// assert_eq!(s.next_edge().unwrap(), Some((1, 2)));
    /// ```
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        let mut edges = Vec::new();
        for (idx, content) in text.lines().enumerate() {
            match parse_line(idx + 1, content)? {
                Line::Edge(u, v) => edges.push((u, v)),
                Line::Skip => {}
                Line::End => break,
            }
        }
        Ok(MemoryStream::new(edges))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl From<Vec<(Vertex, Vertex)>> for MemoryStream {
    fn from(edges: Vec<(Vertex, Vertex)>) -> Self {
        MemoryStream::new(edges)
    }
}

impl EdgeStream for MemoryStream {
    fn next_edge(&mut self) -> Result<Option<(Vertex, Vertex)>, StreamError> {
        let edge = self.edges.get(self.pos).cloned();
        if edge.is_some() {
            self.pos += 1;
        }
        Ok(edge)
    }

    fn rewind(&mut self) -> Result<(), StreamError> {
        self.pos = 0;
        Ok(())
    }
}

/// Edge list read lazily from a text file, one `u v` pair per line.
///
/// Blank lines and `#` comments are ignored; a `-1 -1` line ends the stream.
pub struct FileStream {
    reader: BufReader<File>,
    line: usize,
    buf: String,
    finished: bool,
}

impl FileStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let file = File::open(path)?;
        Ok(FileStream {
            reader: BufReader::new(file),
            line: 0,
            buf: String::new(),
            finished: false,
        })
    }
}

impl EdgeStream for FileStream {
    fn next_edge(&mut self) -> Result<Option<(Vertex, Vertex)>, StreamError> {
        while !self.finished {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                self.finished = true;
                break;
            }
            self.line += 1;
            match parse_line(self.line, &self.buf)? {
                Line::Edge(u, v) => return Ok(Some((u, v))),
                Line::Skip => {}
                Line::End => self.finished = true,
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<(), StreamError> {
        trace!("rewinding file stream after {} lines", self.line);
        self.reader.seek(SeekFrom::Start(0))?;
        self.line = 0;
        self.finished = false;
        Ok(())
    }
}
