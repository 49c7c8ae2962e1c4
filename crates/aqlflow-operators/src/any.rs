//! Closed set of executors behind one type.

use std::sync::Arc;

use aqlflow_block::{ExecContext, OutputRow, RegisterInfos, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

use crate::collect::SortedCollectExecutor;
use crate::fetcher::{FetcherKind, RowFetcher};
use crate::filter::FilterExecutor;
use crate::id::IdExecutor;
use crate::no_results::NoResultsExecutor;
use crate::sort::SortExecutor;
use crate::subquery::{SubqueryEndExecutor, SubqueryStartExecutor};
use crate::traits::Executor;
use crate::traversal::TraversalExecutor;

pub enum AnyExecutor {
    Id(IdExecutor),
    Filter(FilterExecutor),
    NoResults(NoResultsExecutor),
    Sort(SortExecutor),
    SortedCollect(SortedCollectExecutor),
    Traversal(TraversalExecutor),
    SubqueryStart(SubqueryStartExecutor),
    SubqueryEnd(SubqueryEndExecutor),
}

macro_rules! dispatch {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            AnyExecutor::Id($e) => $body,
            AnyExecutor::Filter($e) => $body,
            AnyExecutor::NoResults($e) => $body,
            AnyExecutor::Sort($e) => $body,
            AnyExecutor::SortedCollect($e) => $body,
            AnyExecutor::Traversal($e) => $body,
            AnyExecutor::SubqueryStart($e) => $body,
            AnyExecutor::SubqueryEnd($e) => $body,
        }
    };
}

impl Executor for AnyExecutor {
    fn name(&self) -> &'static str {
        dispatch!(self, e => e.name())
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        dispatch!(self, e => e.register_infos())
    }

    fn fetcher_kind(&self) -> FetcherKind {
        dispatch!(self, e => e.fetcher_kind())
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        dispatch!(self, e => e.produce_rows(ctx, fetcher, output))
    }

    fn forward_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        shadow: &ShadowRow,
        output: &mut OutputRow,
    ) -> Result<()> {
        dispatch!(self, e => e.forward_shadow_row(ctx, shadow, output))
    }

    fn reset(&mut self, ctx: &mut ExecContext) -> Result<()> {
        dispatch!(self, e => e.reset(ctx))
    }

    fn describe(&self) -> Result<AqlValue> {
        dispatch!(self, e => e.describe())
    }
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for AnyExecutor {
            fn from(e: $ty) -> Self {
                AnyExecutor::$variant(e)
            }
        })*
    };
}

impl_from!(
    Id(IdExecutor),
    Filter(FilterExecutor),
    NoResults(NoResultsExecutor),
    Sort(SortExecutor),
    SortedCollect(SortedCollectExecutor),
    Traversal(TraversalExecutor),
    SubqueryStart(SubqueryStartExecutor),
    SubqueryEnd(SubqueryEndExecutor),
);
