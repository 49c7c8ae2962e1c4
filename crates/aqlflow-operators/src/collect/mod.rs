//! Sorted group-by and the aggregate function registry.

pub mod aggregator;
mod infos;
mod sorted;

pub use aggregator::{default_registry, Aggregator, AggregatorFactory, AggregatorRegistry};
pub use infos::{AggregateSpec, CollectInto, SortedCollectInfos, SortedCollectInfosBuilder};
pub use sorted::SortedCollectExecutor;
