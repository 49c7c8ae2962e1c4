//! Fetchers: the consumer side of the fetch protocol.
//!
//! All variants hand out rows in exactly the order upstream produced them and
//! stop at shadow rows. They differ in buffering:
//! - [`SingleRowFetcher`] serves one row at a time from the current block.
//! - [`AllRowsFetcher`] materializes a whole subquery run into an [`ItemMatrix`].
//! - [`ConstFetcher`] serves injected blocks and never calls upstream.
//!
//! [`ItemMatrix`]: aqlflow_block::ItemMatrix

mod all_rows;
mod buffer;
mod constant;
mod single_row;

pub use all_rows::AllRowsFetcher;
pub use constant::ConstFetcher;
pub use single_row::SingleRowFetcher;

use aqlflow_block::{ExecContext, InputRow, ItemMatrix, ShadowRow};
use aqlflow_core::state::ExecutionState;
use aqlflow_core::{Error, Result};

use crate::upstream::{StageSummary, Upstream};
use buffer::{Peek, RowBuffer};

/// Which fetcher an executor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherKind {
    SingleRow,
    AllRows,
}

/// The next row of a fetcher, looked at without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upcoming {
    Waiting,
    Exhausted,
    DataRow,
    ShadowRow { depth: u32 },
}

/// The closed set of fetchers an executor can be driven with.
pub enum RowFetcher {
    SingleRow(SingleRowFetcher),
    AllRows(AllRowsFetcher),
    Const(ConstFetcher),
}

impl RowFetcher {
    /// Fetcher of `kind` pulling from `upstream`.
    pub fn for_kind(kind: FetcherKind, upstream: Box<dyn Upstream>) -> Self {
        match kind {
            FetcherKind::SingleRow => RowFetcher::SingleRow(SingleRowFetcher::new(upstream)),
            FetcherKind::AllRows => RowFetcher::AllRows(AllRowsFetcher::new(upstream)),
        }
    }

    fn buffer(&mut self) -> &mut RowBuffer {
        match self {
            RowFetcher::SingleRow(f) => f.buffer(),
            RowFetcher::AllRows(f) => f.buffer(),
            RowFetcher::Const(f) => f.buffer(),
        }
    }

    fn buffer_ref(&self) -> &RowBuffer {
        match self {
            RowFetcher::SingleRow(f) => f.buffer_ref(),
            RowFetcher::AllRows(f) => f.buffer_ref(),
            RowFetcher::Const(f) => f.buffer_ref(),
        }
    }

    pub fn fetch_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<InputRow>)> {
        self.buffer().fetch_row(ctx, at_most)
    }

    /// Only available on the all-rows variant.
    pub fn fetch_all_rows(
        &mut self,
        ctx: &mut ExecContext,
    ) -> Result<(ExecutionState, Option<ItemMatrix>)> {
        match self {
            RowFetcher::AllRows(f) => f.fetch_all_rows(ctx),
            _ => Err(Error::contract("fetch_all_rows needs an all-rows fetcher")),
        }
    }

    /// Next shadow row. Returns `HasMore` without a row when a data row is next.
    pub fn fetch_shadow_row(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<ShadowRow>)> {
        self.buffer().fetch_shadow_row(ctx, at_most)
    }

    /// Drop the remaining data rows of the current subquery run.
    ///
    /// Returns `HasMore` when a shadow row is next, `Done` at the end of input,
    /// and the number of rows dropped.
    pub fn skip_data_rows(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, usize)> {
        self.buffer().skip_data_rows(ctx, at_most)
    }

    /// Kind of the next row, pulling from upstream only when nothing is buffered.
    pub fn upcoming(&mut self, ctx: &mut ExecContext, at_most: usize) -> Result<Upcoming> {
        Ok(match self.buffer().peek(ctx, at_most)? {
            Peek::Waiting => Upcoming::Waiting,
            Peek::Exhausted => Upcoming::Exhausted,
            Peek::Data(_) => Upcoming::DataRow,
            Peek::Shadow(row) => Upcoming::ShadowRow {
                depth: row.depth(&ctx.blocks)?,
            },
        })
    }

    /// State known without pulling from upstream. Not counted as an upstream call.
    pub fn peek_state(&mut self) -> ExecutionState {
        self.buffer().peek_state()
    }

    pub fn upstream_calls(&self) -> usize {
        self.buffer_ref().upstream_calls()
    }

    pub fn state_checks(&self) -> usize {
        self.buffer_ref().state_checks()
    }

    /// Give back every block the fetcher still holds.
    pub fn release(&mut self, ctx: &mut ExecContext) -> Result<()> {
        match self {
            RowFetcher::AllRows(f) => f.release(ctx),
            other => other.buffer().release(&mut ctx.blocks),
        }
    }

    pub fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        match self {
            RowFetcher::SingleRow(f) => f.collect_stages(out),
            RowFetcher::AllRows(f) => f.collect_stages(out),
            RowFetcher::Const(_) => {}
        }
    }
}

impl From<ConstFetcher> for RowFetcher {
    fn from(f: ConstFetcher) -> Self {
        RowFetcher::Const(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{BlockQueue, WaitingBehavior};
    use aqlflow_block::BlockBuilder;
    use aqlflow_core::register::RegisterId;
    use serde_json::json;

    fn queue(waiting: WaitingBehavior) -> Box<dyn Upstream> {
        Box::new(BlockQueue::new(
            [
                BlockBuilder::new(1).row([json!(1)]).row([json!(2)]).shadow([json!("s")], 0),
                BlockBuilder::new(1).row([json!(3)]),
            ],
            waiting,
        ))
    }

    #[test]
    fn fetch_row_stops_at_shadow_rows() {
        let mut ctx = ExecContext::default();
        let mut fetcher = RowFetcher::for_kind(FetcherKind::SingleRow, queue(WaitingBehavior::Never));

        let (state, row) = fetcher.fetch_row(&mut ctx, 10).unwrap();
        assert_eq!(state, ExecutionState::HasMore);
        assert_eq!(row.unwrap().value(&ctx.blocks, RegisterId::new(0)).unwrap(), &json!(1));

        let (state, row) = fetcher.fetch_row(&mut ctx, 10).unwrap();
        assert_eq!(state, ExecutionState::Done);
        assert!(row.is_some());

        assert_eq!(fetcher.fetch_row(&mut ctx, 10).unwrap(), (ExecutionState::Done, None));

        let (state, shadow) = fetcher.fetch_shadow_row(&mut ctx, 10).unwrap();
        assert_eq!(state, ExecutionState::HasMore);
        assert!(shadow.unwrap().is_relevant(&ctx.blocks).unwrap());

        let (state, row) = fetcher.fetch_row(&mut ctx, 10).unwrap();
        assert_eq!(state, ExecutionState::Done);
        assert_eq!(row.unwrap().value(&ctx.blocks, RegisterId::new(0)).unwrap(), &json!(3));
        assert_eq!(fetcher.upstream_calls(), 2);

        fetcher.release(&mut ctx).unwrap();
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }

    #[test]
    fn waiting_is_retried_without_losing_rows() {
        let mut ctx = ExecContext::default();
        let mut fetcher = RowFetcher::for_kind(FetcherKind::SingleRow, queue(WaitingBehavior::Always));
        let mut seen = Vec::new();
        loop {
            let (state, row) = fetcher.fetch_row(&mut ctx, 10).unwrap();
            if let Some(row) = row {
                seen.push(row.value(&ctx.blocks, RegisterId::new(0)).unwrap().clone());
            }
            match state {
                ExecutionState::Waiting | ExecutionState::HasMore => continue,
                ExecutionState::Done => {
                    let (state, _) = fetcher.fetch_shadow_row(&mut ctx, 10).unwrap();
                    if state.is_done() {
                        break;
                    }
                }
            }
        }
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn all_rows_fetcher_materializes_one_run() {
        let mut ctx = ExecContext::default();
        let mut fetcher = RowFetcher::for_kind(FetcherKind::AllRows, queue(WaitingBehavior::Once));

        assert_eq!(fetcher.fetch_all_rows(&mut ctx).unwrap().0, ExecutionState::Waiting);
        let (state, matrix) = fetcher.fetch_all_rows(&mut ctx).unwrap();
        assert_eq!(state, ExecutionState::Done);
        let matrix = matrix.unwrap();
        assert_eq!(matrix.size(), 2);
        matrix.release(&mut ctx.blocks).unwrap();

        assert!(fetcher.fetch_shadow_row(&mut ctx, 10).unwrap().1.is_some());
        let (_, matrix) = fetcher.fetch_all_rows(&mut ctx).unwrap();
        let matrix = matrix.unwrap();
        assert_eq!(matrix.size(), 1);
        matrix.release(&mut ctx.blocks).unwrap();
        fetcher.release(&mut ctx).unwrap();
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }

    #[test]
    fn upcoming_does_not_consume() {
        let mut ctx = ExecContext::default();
        let mut fetcher = RowFetcher::for_kind(FetcherKind::SingleRow, queue(WaitingBehavior::Once));
        assert_eq!(fetcher.upcoming(&mut ctx, 10).unwrap(), Upcoming::Waiting);
        assert_eq!(fetcher.upcoming(&mut ctx, 10).unwrap(), Upcoming::DataRow);
        assert_eq!(fetcher.upcoming(&mut ctx, 10).unwrap(), Upcoming::DataRow);
        assert_eq!(fetcher.skip_data_rows(&mut ctx, 10).unwrap(), (ExecutionState::HasMore, 2));
        assert_eq!(fetcher.upcoming(&mut ctx, 10).unwrap(), Upcoming::ShadowRow { depth: 0 });
        assert!(fetcher.fetch_shadow_row(&mut ctx, 10).unwrap().1.is_some());
        assert_eq!(fetcher.upcoming(&mut ctx, 10).unwrap(), Upcoming::DataRow);
        assert_eq!(fetcher.upstream_calls(), 3);
        fetcher.release(&mut ctx).unwrap();
    }

    #[test]
    fn const_fetcher_never_calls_upstream() {
        let mut ctx = ExecContext::default();
        let block = BlockBuilder::new(1).row([json!("x")]).build(&mut ctx.blocks).unwrap();
        let mut fetcher = ConstFetcher::new();
        fetcher.inject_block(block);
        let mut fetcher = RowFetcher::from(fetcher);

        let (state, row) = fetcher.fetch_row(&mut ctx, 1).unwrap();
        assert_eq!(state, ExecutionState::Done);
        assert!(row.is_some());
        assert_eq!(fetcher.fetch_row(&mut ctx, 1).unwrap(), (ExecutionState::Done, None));
        assert_eq!(fetcher.upstream_calls(), 0);
        assert_eq!(ctx.blocks.live_blocks(), 0);
    }
}
