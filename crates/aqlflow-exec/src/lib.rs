#![forbid(unsafe_code)]
//! aqlflow-exec: the driver that turns (fetcher, executor) pairs into a
//! pipeline of blocks, plus reports, metrics and failpoints.
//!
//! Every stage is an [`ExecutionBlock`]: it pulls rows from its upstream,
//! lets its executor fill an output block, forwards shadow rows and hands the
//! block to the next stage. A [`Pipeline`] owns the last stage and the
//! execution context and drives it until `Done`.

pub mod block;
pub mod failpoints;
pub mod metrics;
pub mod pipeline;
pub mod report;

pub use block::ExecutionBlock;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use report::QueryReport;

#[doc(hidden)]
pub use aqlflow_core as __core;
