#![forbid(unsafe_code)]
//! aqlflow-operators: the stages of the pull-based execution pipeline.
//!
//! Design intent:
//! - Every stage is a (fetcher, executor) pair. The fetcher pulls blocks from
//!   an [`Upstream`] and hands out rows; the executor turns them into output rows.
//! - Calls are synchronous and do bounded work. `ExecutionState::Waiting` stands
//!   in for an upstream that cannot answer yet; the caller retries the same call.
//! - All block memory goes through the arena in `aqlflow-block`, so every byte
//!   held by a stage is accounted on the query's `ResourceMonitor`.

pub mod fetcher;
pub mod traits;
pub mod upstream;

pub mod collect;
pub mod filter;
pub mod id;
pub mod no_results;
pub mod sort;
pub mod subquery;
pub mod traversal;

mod any;

pub use any::AnyExecutor;
pub use fetcher::{
    AllRowsFetcher, ConstFetcher, FetcherKind, RowFetcher, SingleRowFetcher, Upcoming,
};
pub use traits::Executor;
pub use upstream::{BlockQueue, StageSummary, Upstream, WaitingBehavior};
