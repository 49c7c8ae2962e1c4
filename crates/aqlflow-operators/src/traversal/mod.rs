//! Graph traversal: collaborators, options, path enumeration and the executor.

mod enumerator;
mod executor;
mod graph;
mod options;

pub use enumerator::{BreadthFirstEnumerator, DepthFirstEnumerator, PathEnumerator, PathStep, PathTree};
pub use executor::{StartVertex, TraversalExecutor, TraversalInfos, TraversalInfosBuilder};
pub use graph::{Edge, GraphAccess, InMemoryGraph, Lookup};
pub use options::{
    TraversalDirection, TraversalOptions, TraversalStrategy, UniqueEdges, UniqueVertices,
};
