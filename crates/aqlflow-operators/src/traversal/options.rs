//! Traversal options.

use serde::{Deserialize, Serialize};

use aqlflow_core::{Error, Result};

use super::enumerator::{BreadthFirstEnumerator, DepthFirstEnumerator, PathEnumerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    #[default]
    Outbound,
    Inbound,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    #[default]
    BreadthFirst,
    DepthFirst,
}

/// How often a vertex may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueVertices {
    #[default]
    None,
    /// At most once per path.
    Path,
    /// At most once per start vertex. Breadth-first only.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueEdges {
    None,
    /// At most once per path.
    #[default]
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalOptions {
    pub min_depth: usize,
    /// `None` means the engine's `max_traversal_depth`.
    pub max_depth: Option<usize>,
    pub direction: TraversalDirection,
    pub strategy: TraversalStrategy,
    pub unique_vertices: UniqueVertices,
    pub unique_edges: UniqueEdges,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            min_depth: 1,
            max_depth: Some(1),
            direction: TraversalDirection::Outbound,
            strategy: TraversalStrategy::BreadthFirst,
            unique_vertices: UniqueVertices::None,
            unique_edges: UniqueEdges::Path,
        }
    }
}

impl TraversalOptions {
    pub fn depth(mut self, min: usize, max: usize) -> Self {
        self.min_depth = min;
        self.max_depth = Some(max);
        self
    }

    pub fn direction(mut self, direction: TraversalDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn strategy(mut self, strategy: TraversalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn unique_vertices(mut self, unique: UniqueVertices) -> Self {
        self.unique_vertices = unique;
        self
    }

    pub fn unique_edges(mut self, unique: UniqueEdges) -> Self {
        self.unique_edges = unique;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_depth {
            if self.min_depth > max {
                return Err(Error::BadParameter(format!(
                    "traversal min depth {} exceeds max depth {max}",
                    self.min_depth
                )));
            }
        }
        if self.unique_vertices == UniqueVertices::Global
            && self.strategy != TraversalStrategy::BreadthFirst
        {
            return Err(Error::BadParameter(
                "global vertex uniqueness needs breadth-first traversal".into(),
            ));
        }
        Ok(())
    }

    /// Effective max depth given the engine cap for unbounded traversals.
    pub fn resolved_max_depth(&self, cap: usize) -> usize {
        self.max_depth.unwrap_or(cap)
    }

    /// The path enumerator for these options.
    pub fn enumerator(&self, depth_cap: usize) -> Box<dyn PathEnumerator> {
        match self.strategy {
            TraversalStrategy::BreadthFirst => {
                Box::new(BreadthFirstEnumerator::new(self.clone(), depth_cap))
            }
            TraversalStrategy::DepthFirst => Box::new(DepthFirstEnumerator::new(self.clone(), depth_cap)),
        }
    }
}
