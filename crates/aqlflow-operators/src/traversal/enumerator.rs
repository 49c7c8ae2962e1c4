//! Path enumeration strategies.
//!
//! Enumerators grow a [`PathTree`] from the start vertex and hand out tree
//! nodes one at a time; a node stands for the path from the root to it. An
//! expansion that the graph answers with `Waiting` is kept pending and retried
//! on the next call, so enumeration resumes where it stopped.

use std::collections::{HashSet, VecDeque};
use std::mem::size_of;

use aqlflow_core::query::QueryContext;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value;
use aqlflow_core::Result;

use super::graph::{Edge, GraphAccess, Lookup};
use super::options::{TraversalDirection, TraversalOptions, UniqueEdges, UniqueVertices};

#[derive(Debug, Clone)]
pub struct PathStep {
    pub vertex: String,
    /// Edge leading here; `None` for the start vertex.
    pub edge: Option<Edge>,
    pub parent: Option<usize>,
    pub depth: usize,
}

impl PathStep {
    /// Estimated heap footprint of this step.
    fn memory_bytes(&self) -> usize {
        let edge = self.edge.as_ref().map_or(0, |e| {
            e.id.capacity() + e.from.capacity() + e.to.capacity() + value::memory_usage(&e.document)
        });
        size_of::<PathStep>() + self.vertex.capacity() + edge
    }
}

#[derive(Debug, Default)]
pub struct PathTree {
    steps: Vec<PathStep>,
    bytes: usize,
}

impl PathTree {
    fn clear(&mut self) {
        self.steps.clear();
        self.bytes = 0;
    }

    fn push(&mut self, step: PathStep) -> usize {
        self.bytes += step.memory_bytes();
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Estimated bytes held by every step of the tree.
    pub fn memory_bytes(&self) -> usize {
        self.bytes
    }

    pub fn step(&self, index: usize) -> Option<&PathStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps from the start vertex to `index`, start first.
    pub fn path(&self, index: usize) -> Vec<&PathStep> {
        let mut path = Vec::new();
        let mut cur = Some(index);
        while let Some(i) = cur {
            let Some(step) = self.steps.get(i) else {
                break;
            };
            path.push(step);
            cur = step.parent;
        }
        path.reverse();
        path
    }

    fn ancestors(&self, index: usize) -> impl Iterator<Item = &PathStep> {
        std::iter::successors(self.steps.get(index), move |s| {
            s.parent.and_then(|p| self.steps.get(p))
        })
    }

    fn vertex_on_path(&self, index: usize, vertex: &str) -> bool {
        self.ancestors(index).any(|s| s.vertex == vertex)
    }

    fn edge_on_path(&self, index: usize, edge_id: &str) -> bool {
        self.ancestors(index)
            .any(|s| s.edge.as_ref().is_some_and(|e| e.id == edge_id))
    }
}

/// Yields successive paths from one start vertex.
pub trait PathEnumerator: Send {
    /// Start over from `start`.
    fn reset(&mut self, start: String);

    /// Next path as a node of [`PathEnumerator::tree`], `Ready(None)` when exhausted.
    fn next_path(
        &mut self,
        graph: &dyn GraphAccess,
        query: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> Result<Lookup<Option<usize>>>;

    fn tree(&self) -> &PathTree;
}

/// Tree growth shared by both strategies.
struct Expander {
    options: TraversalOptions,
    max_depth: usize,
    tree: PathTree,
    visited: HashSet<String>,
    /// Node whose expansion is still outstanding.
    pending: Option<usize>,
    /// Outgoing edges already read while the incoming lookup waits.
    partial: Option<Vec<Edge>>,
}

impl Expander {
    fn new(options: TraversalOptions, depth_cap: usize) -> Self {
        let max_depth = options.resolved_max_depth(depth_cap);
        Self {
            options,
            max_depth,
            tree: PathTree::default(),
            visited: HashSet::new(),
            pending: None,
            partial: None,
        }
    }

    fn reset(&mut self, start: String) -> usize {
        self.tree.clear();
        self.visited.clear();
        self.pending = None;
        self.partial = None;
        if self.options.unique_vertices == UniqueVertices::Global {
            self.visited.insert(start.clone());
        }
        self.tree.push(PathStep {
            vertex: start,
            edge: None,
            parent: None,
            depth: 0,
        })
    }

    fn edges(&mut self, graph: &dyn GraphAccess, vertex: &str) -> Result<Lookup<Vec<Edge>>> {
        match self.options.direction {
            TraversalDirection::Outbound => graph.outgoing_edges(vertex),
            TraversalDirection::Inbound => graph.incoming_edges(vertex),
            TraversalDirection::Any => {
                let mut edges = match self.partial.take() {
                    Some(edges) => edges,
                    None => match graph.outgoing_edges(vertex)? {
                        Lookup::Ready(edges) => edges,
                        Lookup::Waiting => return Ok(Lookup::Waiting),
                    },
                };
                match graph.incoming_edges(vertex)? {
                    Lookup::Ready(incoming) => {
                        // A self-loop shows up on both sides; follow it once.
                        let outgoing: HashSet<String> = edges.iter().map(|e| e.id.clone()).collect();
                        edges.extend(incoming.into_iter().filter(|e| !outgoing.contains(&e.id)));
                        Ok(Lookup::Ready(edges))
                    }
                    Lookup::Waiting => {
                        self.partial = Some(edges);
                        Ok(Lookup::Waiting)
                    }
                }
            }
        }
    }

    /// Expand the pending node; returns its admitted children in edge order.
    fn expand_pending(
        &mut self,
        graph: &dyn GraphAccess,
        stats: &mut ExecutionStats,
    ) -> Result<Lookup<Vec<usize>>> {
        let Some(index) = self.pending else {
            return Ok(Lookup::Ready(Vec::new()));
        };
        let Some(step) = self.tree.step(index) else {
            self.pending = None;
            return Ok(Lookup::Ready(Vec::new()));
        };
        let (vertex, depth) = (step.vertex.clone(), step.depth + 1);
        let edges = match self.edges(graph, &vertex)? {
            Lookup::Ready(edges) => edges,
            Lookup::Waiting => return Ok(Lookup::Waiting),
        };
        self.pending = None;
        stats.edges_read += edges.len() as u64;

        let mut children = Vec::with_capacity(edges.len());
        for edge in edges {
            let neighbor = match self.options.direction {
                TraversalDirection::Outbound => edge.to.clone(),
                TraversalDirection::Inbound => edge.from.clone(),
                TraversalDirection::Any => edge.other_end(&vertex).to_string(),
            };
            if self.options.unique_edges == UniqueEdges::Path && self.tree.edge_on_path(index, &edge.id) {
                continue;
            }
            match self.options.unique_vertices {
                UniqueVertices::None => {}
                UniqueVertices::Path => {
                    if self.tree.vertex_on_path(index, &neighbor) {
                        continue;
                    }
                }
                UniqueVertices::Global => {
                    if !self.visited.insert(neighbor.clone()) {
                        continue;
                    }
                }
            }
            children.push(self.tree.push(PathStep {
                vertex: neighbor,
                edge: Some(edge),
                parent: Some(index),
                depth,
            }));
        }
        Ok(Lookup::Ready(children))
    }

    /// Bookkeeping for a node taken off the frontier. Returns whether it is emitted.
    fn visit(&mut self, index: usize, stats: &mut ExecutionStats) -> bool {
        let depth = self.tree.step(index).map(|s| s.depth).unwrap_or(0);
        stats.vertices_visited += 1;
        if depth < self.max_depth {
            self.pending = Some(index);
        }
        depth >= self.options.min_depth
    }
}

/// Emits paths in order of increasing depth.
pub struct BreadthFirstEnumerator {
    expander: Expander,
    queue: VecDeque<usize>,
}

impl BreadthFirstEnumerator {
    pub fn new(options: TraversalOptions, depth_cap: usize) -> Self {
        Self {
            expander: Expander::new(options, depth_cap),
            queue: VecDeque::new(),
        }
    }
}

impl PathEnumerator for BreadthFirstEnumerator {
    fn reset(&mut self, start: String) {
        self.queue.clear();
        let root = self.expander.reset(start);
        self.queue.push_back(root);
    }

    fn next_path(
        &mut self,
        graph: &dyn GraphAccess,
        query: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> Result<Lookup<Option<usize>>> {
        loop {
            match self.expander.expand_pending(graph, stats)? {
                Lookup::Ready(children) => self.queue.extend(children),
                Lookup::Waiting => return Ok(Lookup::Waiting),
            }
            query.check_killed()?;
            let Some(index) = self.queue.pop_front() else {
                return Ok(Lookup::Ready(None));
            };
            if self.expander.visit(index, stats) {
                return Ok(Lookup::Ready(Some(index)));
            }
        }
    }

    fn tree(&self) -> &PathTree {
        &self.expander.tree
    }
}

/// Follows each path to its full depth before backtracking.
pub struct DepthFirstEnumerator {
    expander: Expander,
    stack: Vec<usize>,
}

impl DepthFirstEnumerator {
    pub fn new(options: TraversalOptions, depth_cap: usize) -> Self {
        Self {
            expander: Expander::new(options, depth_cap),
            stack: Vec::new(),
        }
    }
}

impl PathEnumerator for DepthFirstEnumerator {
    fn reset(&mut self, start: String) {
        self.stack.clear();
        let root = self.expander.reset(start);
        self.stack.push(root);
    }

    fn next_path(
        &mut self,
        graph: &dyn GraphAccess,
        query: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> Result<Lookup<Option<usize>>> {
        loop {
            match self.expander.expand_pending(graph, stats)? {
                Lookup::Ready(children) => self.stack.extend(children.into_iter().rev()),
                Lookup::Waiting => return Ok(Lookup::Waiting),
            }
            query.check_killed()?;
            let Some(index) = self.stack.pop() else {
                return Ok(Lookup::Ready(None));
            };
            if self.expander.visit(index, stats) {
                return Ok(Lookup::Ready(Some(index)));
            }
        }
    }

    fn tree(&self) -> &PathTree {
        &self.expander.tree
    }
}
