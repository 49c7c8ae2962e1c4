//! Graph access collaborators.
//!
//! The traversal reads edges and vertex documents through [`GraphAccess`].
//! Storage engines implement it; [`InMemoryGraph`] is a self-contained
//! implementation for literal graphs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::json;

use aqlflow_core::value::AqlValue;
use aqlflow_core::{Error, Result};

/// Answer of a collaborator that may need to be asked again.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Ready(T),
    /// Not available yet; repeat the same request later.
    Waiting,
}

impl<T> Lookup<T> {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Lookup::Waiting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub document: AqlValue,
}

impl Edge {
    /// An edge whose document holds just its id and endpoints.
    pub fn new(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        let (id, from, to) = (id.into(), from.into(), to.into());
        let document = json!({ "_id": id, "_from": from, "_to": to });
        Self {
            id,
            from,
            to,
            document,
        }
    }

    /// The endpoint that is not `vertex`.
    pub fn other_end(&self, vertex: &str) -> &str {
        if self.from == vertex {
            &self.to
        } else {
            &self.from
        }
    }
}

/// Edge and vertex access used by the traversal executor.
///
/// Implementations are shared between executor instances and must not block;
/// a lookup that cannot be answered yet returns [`Lookup::Waiting`].
pub trait GraphAccess: Send + Sync {
    fn outgoing_edges(&self, vertex: &str) -> Result<Lookup<Vec<Edge>>>;

    fn incoming_edges(&self, vertex: &str) -> Result<Lookup<Vec<Edge>>>;

    /// `None` when the vertex does not exist.
    fn vertex_document(&self, vertex: &str) -> Result<Lookup<Option<AqlValue>>>;
}

/// Adjacency-list graph held in memory.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    vertices: HashMap<String, AqlValue>,
    outgoing: HashMap<String, Vec<Edge>>,
    incoming: HashMap<String, Vec<Edge>>,
    edge_count: usize,
    wait_once: bool,
    waited: Mutex<HashSet<String>>,
    failing: Option<String>,
    lookups: AtomicUsize,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex. Object documents get their `_id` attribute set.
    pub fn add_vertex(&mut self, id: &str, document: AqlValue) -> &mut Self {
        let document = match document {
            AqlValue::Object(mut map) => {
                map.insert("_id".into(), AqlValue::String(id.to_string()));
                AqlValue::Object(map)
            }
            other => other,
        };
        self.vertices.insert(id.to_string(), document);
        self
    }

    /// Add an edge `from -> to` with a generated id.
    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.edge_count += 1;
        let edge = Edge::new(format!("edges/{}", self.edge_count), from, to);
        self.insert_edge(edge)
    }

    pub fn insert_edge(&mut self, edge: Edge) -> &mut Self {
        self.incoming
            .entry(edge.to.clone())
            .or_default()
            .push(edge.clone());
        self.outgoing.entry(edge.from.clone()).or_default().push(edge);
        self
    }

    /// Answer every distinct lookup with `Waiting` once before serving it.
    pub fn waiting_once(mut self) -> Self {
        self.wait_once = true;
        self
    }

    /// Fail every lookup touching `vertex`.
    pub fn failing_on(mut self, vertex: &str) -> Self {
        self.failing = Some(vertex.to_string());
        self
    }

    /// Lookups answered, including `Waiting` answers.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn gate(&self, kind: &str, vertex: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.failing.as_deref() == Some(vertex) {
            return Err(Error::collaborator("graph", format!("cannot read {kind} of {vertex}")));
        }
        if !self.wait_once {
            return Ok(false);
        }
        let mut waited = self
            .waited
            .lock()
            .map_err(|_| Error::contract("graph wait set poisoned"))?;
        Ok(waited.insert(format!("{kind}:{vertex}")))
    }

    fn edges(&self, map: &HashMap<String, Vec<Edge>>, kind: &str, vertex: &str) -> Result<Lookup<Vec<Edge>>> {
        if self.gate(kind, vertex)? {
            return Ok(Lookup::Waiting);
        }
        Ok(Lookup::Ready(map.get(vertex).cloned().unwrap_or_default()))
    }
}

impl GraphAccess for InMemoryGraph {
    fn outgoing_edges(&self, vertex: &str) -> Result<Lookup<Vec<Edge>>> {
        self.edges(&self.outgoing, "outgoing", vertex)
    }

    fn incoming_edges(&self, vertex: &str) -> Result<Lookup<Vec<Edge>>> {
        self.edges(&self.incoming, "incoming", vertex)
    }

    fn vertex_document(&self, vertex: &str) -> Result<Lookup<Option<AqlValue>>> {
        if self.gate("vertex", vertex)? {
            return Ok(Lookup::Waiting);
        }
        Ok(Lookup::Ready(self.vertices.get(vertex).cloned()))
    }
}
