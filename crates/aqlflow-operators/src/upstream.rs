//! The producer side of the fetch protocol.

use std::collections::VecDeque;

use serde::Serialize;

use aqlflow_block::{BlockBuilder, BlockHandle, ExecContext};
use aqlflow_core::id::StageId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::AqlValue;
use aqlflow_core::Result;

/// Anything a fetcher can pull blocks from.
///
/// `fetch_block` returns at most `at_most` rows. A returned block carries one
/// reference owned by the caller. `Waiting` never comes with a block and the
/// caller must repeat the call later.
pub trait Upstream: Send {
    fn fetch_block(
        &mut self,
        ctx: &mut ExecContext,
        at_most: usize,
    ) -> Result<(ExecutionState, Option<BlockHandle>)>;

    /// Describe this producer and everything above it, upstream first.
    fn collect_stages(&self, _out: &mut Vec<StageSummary>) {}
}

/// Plan and counters of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub id: StageId,
    pub name: &'static str,
    pub plan: AqlValue,
    pub stats: ExecutionStats,
}

/// When a [`BlockQueue`] answers `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitingBehavior {
    /// Never wait.
    #[default]
    Never,
    /// Wait on the very first call only.
    Once,
    /// Wait once before every block.
    Always,
}

/// Serves literal blocks in order. Stands in for remote or literal inputs.
///
/// Blocks are materialized in the caller's arena when handed out, so the queue
/// can be built before the execution context exists.
#[derive(Debug, Default)]
pub struct BlockQueue {
    pending: VecDeque<BlockBuilder>,
    waiting: WaitingBehavior,
    waited: bool,
    calls: usize,
}

impl BlockQueue {
    pub fn new(blocks: impl IntoIterator<Item = BlockBuilder>, waiting: WaitingBehavior) -> Self {
        Self {
            pending: blocks.into_iter().filter(|b| !b.is_empty()).collect(),
            waiting,
            waited: false,
            calls: 0,
        }
    }

    /// An upstream that is exhausted from the start.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of `fetch_block` calls answered, including `Waiting` answers.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn should_wait(&mut self) -> bool {
        let wait = match self.waiting {
            WaitingBehavior::Never => false,
            WaitingBehavior::Once => !self.waited && self.calls == 1,
            WaitingBehavior::Always => !self.waited && !self.pending.is_empty(),
        };
        self.waited = wait;
        wait
    }
}

impl Upstream for BlockQueue {
    fn fetch_block(
        &mut self,
        ctx: &mut ExecContext,
        _at_most: usize,
    ) -> Result<(ExecutionState, Option<BlockHandle>)> {
        self.calls += 1;
        if self.should_wait() {
            return Ok((ExecutionState::Waiting, None));
        }
        let Some(next) = self.pending.pop_front() else {
            return Ok((ExecutionState::Done, None));
        };
        let handle = next.build(&mut ctx.blocks)?;
        let state = if self.pending.is_empty() {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        };
        Ok((state, Some(handle)))
    }

    fn collect_stages(&self, out: &mut Vec<StageSummary>) {
        out.push(StageSummary {
            id: StageId::new(0),
            name: "block_queue",
            plan: AqlValue::from(self.pending.len()),
            stats: ExecutionStats::default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one_row() -> BlockBuilder {
        BlockBuilder::new(1).row([json!(1)])
    }

    #[test]
    fn always_waits_before_each_block() {
        let mut ctx = ExecContext::default();
        let mut queue = BlockQueue::new([one_row(), one_row()], WaitingBehavior::Always);
        let mut states = Vec::new();
        loop {
            let (state, block) = queue.fetch_block(&mut ctx, 10).unwrap();
            if let Some(b) = block {
                ctx.blocks.release(b).unwrap();
            }
            states.push(state);
            if state.is_done() {
                break;
            }
        }
        use ExecutionState::*;
        assert_eq!(states, vec![Waiting, HasMore, Waiting, Done]);
    }

    #[test]
    fn once_waits_on_first_call_only() {
        let mut ctx = ExecContext::default();
        let mut queue = BlockQueue::new([one_row(), one_row()], WaitingBehavior::Once);
        assert_eq!(queue.fetch_block(&mut ctx, 10).unwrap().0, ExecutionState::Waiting);
        assert_eq!(queue.fetch_block(&mut ctx, 10).unwrap().0, ExecutionState::HasMore);
        assert_eq!(queue.fetch_block(&mut ctx, 10).unwrap().0, ExecutionState::Done);
        assert_eq!(queue.calls(), 3);
    }
}
