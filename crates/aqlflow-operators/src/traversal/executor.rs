//! Graph traversal stage.

use std::collections::HashMap;
use std::mem::size_of;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use aqlflow_block::{ExecContext, InputRow, OutputRow, RegisterInfos};
use aqlflow_core::budget::BudgetGuard;
use aqlflow_core::error::codes;
use aqlflow_core::register::RegisterId;
use aqlflow_core::state::ExecutionState;
use aqlflow_core::stats::ExecutionStats;
use aqlflow_core::value::{self, AqlValue};
use aqlflow_core::{Error, Result};
use aqlflow_mem::Reservation;

use super::enumerator::PathEnumerator;
use super::graph::{GraphAccess, Lookup};
use super::options::TraversalOptions;
use crate::fetcher::RowFetcher;
use crate::traits::Executor;

/// Where the start vertex of each traversal comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartVertex {
    Constant(String),
    Register(RegisterId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalInfos {
    pub registers: Arc<RegisterInfos>,
    pub start: StartVertex,
    pub options: TraversalOptions,
    pub vertex_output: Option<RegisterId>,
    pub edge_output: Option<RegisterId>,
    pub path_output: Option<RegisterId>,
}

impl TraversalInfos {
    pub fn builder(registers: RegisterInfos, start: StartVertex) -> TraversalInfosBuilder {
        TraversalInfosBuilder {
            infos: TraversalInfos {
                registers: Arc::new(registers),
                start,
                options: TraversalOptions::default(),
                vertex_output: None,
                edge_output: None,
                path_output: None,
            },
        }
    }

    fn outputs(&self) -> impl Iterator<Item = RegisterId> {
        [self.vertex_output, self.edge_output, self.path_output]
            .into_iter()
            .flatten()
    }

    fn validate(&self) -> Result<()> {
        self.options.validate()?;
        let outputs: Vec<RegisterId> = self.outputs().collect();
        if outputs.is_empty() {
            return Err(Error::BadParameter("traversal without any output register".into()));
        }
        for out in &outputs {
            if !self.registers.is_writable(*out) {
                return Err(Error::contract(format!(
                    "traversal output register {out} is not writable"
                )));
            }
        }
        if outputs.len() != self.registers.writable().len() {
            return Err(Error::contract("traversal outputs do not match the writable registers"));
        }
        if let StartVertex::Register(reg) = self.start {
            if reg.index() >= self.registers.input_registers() {
                return Err(Error::contract(format!(
                    "start register {reg} outside input width {}",
                    self.registers.input_registers()
                )));
            }
        }
        Ok(())
    }
}

pub struct TraversalInfosBuilder {
    infos: TraversalInfos,
}

impl TraversalInfosBuilder {
    pub fn options(mut self, options: TraversalOptions) -> Self {
        self.infos.options = options;
        self
    }

    pub fn vertex_output(mut self, reg: impl Into<RegisterId>) -> Self {
        self.infos.vertex_output = Some(reg.into());
        self
    }

    pub fn edge_output(mut self, reg: impl Into<RegisterId>) -> Self {
        self.infos.edge_output = Some(reg.into());
        self
    }

    pub fn path_output(mut self, reg: impl Into<RegisterId>) -> Self {
        self.infos.path_output = Some(reg.into());
        self
    }

    pub fn build(self) -> Result<TraversalInfos> {
        self.infos.validate()?;
        Ok(self.infos)
    }
}

/// Vertex id of a start value: `"collection/key"` or an object with such an `_id`.
fn vertex_id(value: &AqlValue) -> Option<String> {
    let id = match value {
        AqlValue::String(s) => s.as_str(),
        AqlValue::Object(doc) => doc.get("_id")?.as_str()?,
        _ => return None,
    };
    let (collection, key) = id.split_once('/')?;
    if collection.is_empty() || key.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Emits one row per path found from the start vertex of each input row.
///
/// The path tree and the vertex documents read during a subquery run are
/// charged to the resource monitor and released when the run ends.
pub struct TraversalExecutor {
    infos: Arc<TraversalInfos>,
    graph: Arc<dyn GraphAccess>,
    enumerator: Option<Box<dyn PathEnumerator>>,
    /// Input row whose paths are being enumerated.
    input: Option<InputRow>,
    fetch_state: ExecutionState,
    /// Path found but not yet written.
    pending: Option<usize>,
    /// Vertex documents read in the current run.
    documents: HashMap<String, AqlValue>,
    document_bytes: usize,
    memory: Option<Reservation>,
}

impl TraversalExecutor {
    pub fn new(infos: Arc<TraversalInfos>, graph: Arc<dyn GraphAccess>) -> Self {
        Self {
            infos,
            graph,
            enumerator: None,
            input: None,
            fetch_state: ExecutionState::HasMore,
            pending: None,
            documents: HashMap::new(),
            document_bytes: 0,
            memory: None,
        }
    }

    /// Bytes currently charged for the path tree and cached documents.
    pub fn memory_bytes(&self) -> usize {
        self.memory.as_ref().map_or(0, |r| r.bytes())
    }

    /// Bring the reservation in line with the documents and the current tree.
    fn account(&mut self, ctx: &ExecContext) -> Result<()> {
        let tree = self.enumerator.as_ref().map_or(0, |e| e.tree().memory_bytes());
        let target = self.document_bytes + tree;
        match self.memory.as_mut() {
            Some(reservation) => reservation.try_resize(target)?,
            None if target > 0 => self.memory = Some(ctx.monitor().reserve(target, "traversal")?),
            None => {}
        }
        Ok(())
    }

    /// Drop everything kept for the current run.
    fn release_run(&mut self) {
        self.enumerator = None;
        self.documents.clear();
        self.document_bytes = 0;
        self.memory = None;
    }

    fn start_vertex(&self, ctx: &ExecContext, row: InputRow) -> Result<Option<String>> {
        let value = match &self.infos.start {
            StartVertex::Constant(id) => AqlValue::String(id.clone()),
            StartVertex::Register(reg) => row.value(&ctx.blocks, *reg)?.clone(),
        };
        if let Some(id) = vertex_id(&value) {
            return Ok(Some(id));
        }
        let message = format!(
            "invalid start vertex {value}: only id strings or objects with _id are allowed"
        );
        #[cfg(feature = "tracing")]
        tracing::warn!(query = %ctx.query.id(), "{message}");
        ctx.query.register_warning(codes::BAD_PARAMETER, message)?;
        Ok(None)
    }

    /// Write the pending path. Returns `false` while a vertex lookup waits;
    /// nothing is written in that case.
    fn write_path(
        &mut self,
        ctx: &mut ExecContext,
        row: InputRow,
        index: usize,
        output: &mut OutputRow,
        stats: &mut ExecutionStats,
    ) -> Result<bool> {
        let enumerator = self
            .enumerator
            .as_ref()
            .ok_or_else(|| Error::contract("traversal path without enumerator"))?;
        let path = enumerator.tree().path(index);
        let Some(last) = path.last() else {
            return Err(Error::contract(format!("unknown path node {index}")));
        };

        let needed: Vec<&str> = if self.infos.path_output.is_some() {
            path.iter().map(|s| s.vertex.as_str()).collect()
        } else if self.infos.vertex_output.is_some() {
            vec![last.vertex.as_str()]
        } else {
            Vec::new()
        };
        for id in needed {
            if self.documents.contains_key(id) {
                continue;
            }
            match self.graph.vertex_document(id)? {
                Lookup::Waiting => return Ok(false),
                Lookup::Ready(doc) => {
                    stats.documents_looked_up += 1;
                    let doc = doc.unwrap_or(AqlValue::Null);
                    let bytes = id.len() + size_of::<AqlValue>() + value::memory_usage(&doc);
                    match self.memory.as_mut() {
                        Some(reservation) => reservation.grow(bytes)?,
                        None => self.memory = Some(ctx.monitor().reserve(bytes, "traversal")?),
                    }
                    self.document_bytes += bytes;
                    self.documents.insert(id.to_string(), doc);
                }
            }
        }

        let document = |id: &str| self.documents.get(id).cloned().unwrap_or(AqlValue::Null);
        if let Some(reg) = self.infos.vertex_output {
            output.set_value(&mut ctx.blocks, reg, &row, document(&last.vertex))?;
        }
        if let Some(reg) = self.infos.edge_output {
            let edge = last
                .edge
                .as_ref()
                .map(|e| e.document.clone())
                .unwrap_or(AqlValue::Null);
            output.set_value(&mut ctx.blocks, reg, &row, edge)?;
        }
        if let Some(reg) = self.infos.path_output {
            let vertices: Vec<AqlValue> = path.iter().map(|s| document(&s.vertex)).collect();
            let edges: Vec<AqlValue> = path
                .iter()
                .filter_map(|s| s.edge.as_ref().map(|e| e.document.clone()))
                .collect();
            output.set_value(
                &mut ctx.blocks,
                reg,
                &row,
                json!({ "vertices": vertices, "edges": edges }),
            )?;
        }
        output.advance_row()?;
        Ok(true)
    }
}

impl Executor for TraversalExecutor {
    fn name(&self) -> &'static str {
        "traversal"
    }

    fn register_infos(&self) -> &Arc<RegisterInfos> {
        &self.infos.registers
    }

    fn produce_rows(
        &mut self,
        ctx: &mut ExecContext,
        fetcher: &mut RowFetcher,
        output: &mut OutputRow,
    ) -> Result<(ExecutionState, ExecutionStats)> {
        let mut stats = ExecutionStats::new();
        loop {
            if output.is_full() {
                return Ok((ExecutionState::HasMore, stats));
            }
            let row = match self.input {
                Some(row) => row,
                None => {
                    if self.fetch_state.is_done() {
                        self.release_run();
                        return Ok((ExecutionState::Done, stats));
                    }
                    let (state, row) = fetcher.fetch_row(ctx, output.rows_left())?;
                    if state.is_waiting() {
                        return Ok((ExecutionState::Waiting, stats));
                    }
                    self.fetch_state = state;
                    let Some(row) = row else {
                        continue;
                    };
                    stats.rows_scanned += 1;
                    let Some(start) = self.start_vertex(ctx, row)? else {
                        stats.rows_filtered += 1;
                        continue;
                    };
                    let depth_cap = ctx.query.config().max_traversal_depth;
                    let options = &self.infos.options;
                    self.enumerator
                        .get_or_insert_with(|| options.enumerator(depth_cap))
                        .reset(start);
                    self.account(ctx)?;
                    self.input = Some(row);
                    row
                }
            };

            let index = match self.pending {
                Some(index) => index,
                None => {
                    let enumerator = self
                        .enumerator
                        .as_mut()
                        .ok_or_else(|| Error::contract("traversal without enumerator"))?;
                    let next = enumerator.next_path(self.graph.as_ref(), &ctx.query, &mut stats)?;
                    self.account(ctx)?;
                    match next {
                        Lookup::Waiting => return Ok((ExecutionState::Waiting, stats)),
                        Lookup::Ready(None) => {
                            self.input = None;
                            continue;
                        }
                        Lookup::Ready(Some(index)) => index,
                    }
                }
            };
            self.pending = Some(index);
            if !self.write_path(ctx, row, index, output, &mut stats)? {
                return Ok((ExecutionState::Waiting, stats));
            }
            self.pending = None;
        }
    }

    fn reset(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.input = None;
        self.pending = None;
        self.fetch_state = ExecutionState::HasMore;
        self.release_run();
        Ok(())
    }

    fn describe(&self) -> Result<AqlValue> {
        Ok(serde_json::to_value(&*self.infos)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::graph::InMemoryGraph;
    use crate::upstream::{BlockQueue, WaitingBehavior};
    use aqlflow_block::{BlockBuilder, ItemBlock};
    use aqlflow_core::query::QueryContext;
    use aqlflow_core::register::RegisterSet;
    use aqlflow_mem::ResourceMonitor;
    use serde_json::json;

    /// `v/a -> v/b -> v/c` with a 1 KiB payload on every vertex.
    fn heavy_chain() -> InMemoryGraph {
        let mut graph = InMemoryGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_vertex(&format!("v/{name}"), json!({ "payload": "x".repeat(1024) }));
        }
        graph.add_edge("v/a", "v/b").add_edge("v/b", "v/c");
        graph
    }

    fn walk_from_a() -> (TraversalExecutor, RowFetcher) {
        let registers =
            RegisterInfos::new(1, 2, RegisterSet::from([1]), vec![RegisterSet::from([0])]).unwrap();
        let infos = TraversalInfos::builder(registers, StartVertex::Constant("v/a".into()))
            .options(TraversalOptions::default().depth(1, 2))
            .vertex_output(RegisterId::new(1))
            .build()
            .unwrap();
        let executor = TraversalExecutor::new(Arc::new(infos), Arc::new(heavy_chain()));
        let upstream = Box::new(BlockQueue::new(
            [BlockBuilder::new(1).row([json!(null)])],
            WaitingBehavior::Never,
        ));
        let fetcher = RowFetcher::for_kind(executor.fetcher_kind(), upstream);
        (executor, fetcher)
    }

    /// One `produce_rows` call into a single-row output that is thrown away.
    fn step(executor: &mut TraversalExecutor, fetcher: &mut RowFetcher, ctx: &mut ExecContext) -> Result<ExecutionState> {
        let infos = Arc::clone(executor.register_infos());
        let mut output = OutputRow::allocate(&mut ctx.blocks, 1, infos)?;
        let result = executor.produce_rows(ctx, fetcher, &mut output);
        output.discard(&mut ctx.blocks)?;
        Ok(result?.0)
    }

    #[test]
    fn run_memory_is_charged_and_released() {
        let mut ctx = ExecContext::default();
        let (mut executor, mut fetcher) = walk_from_a();

        assert_eq!(step(&mut executor, &mut fetcher, &mut ctx).unwrap(), ExecutionState::HasMore);
        let held = executor.memory_bytes();
        assert!(held > 1024, "charged {held} bytes");
        assert!(ctx.monitor().used_bytes() >= held);

        let mut state = ExecutionState::HasMore;
        while !state.is_done() {
            state = step(&mut executor, &mut fetcher, &mut ctx).unwrap();
        }
        assert_eq!(executor.memory_bytes(), 0);
        fetcher.release(&mut ctx).unwrap();
        assert_eq!(ctx.monitor().used_bytes(), 0);
    }

    #[test]
    fn reset_releases_run_memory() {
        let mut ctx = ExecContext::default();
        let (mut executor, mut fetcher) = walk_from_a();
        step(&mut executor, &mut fetcher, &mut ctx).unwrap();
        assert!(executor.memory_bytes() > 0);

        executor.reset(&mut ctx).unwrap();
        assert_eq!(executor.memory_bytes(), 0);
        fetcher.release(&mut ctx).unwrap();
        assert_eq!(ctx.monitor().used_bytes(), 0);
    }

    #[test]
    fn documents_beyond_the_ceiling_fail_the_query() {
        let limit = ItemBlock::footprint(1, 1) + ItemBlock::footprint(1, 2) + 512;
        let mut ctx = ExecContext::with_monitor(Arc::new(QueryContext::default()), ResourceMonitor::new(limit));
        let (mut executor, mut fetcher) = walk_from_a();
        let err = step(&mut executor, &mut fetcher, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { tag: "traversal", .. }), "{err}");
        fetcher.release(&mut ctx).unwrap();
    }

    #[test]
    fn start_values() {
        assert_eq!(vertex_id(&json!("v/1")), Some("v/1".into()));
        assert_eq!(vertex_id(&json!({"_id": "v/2", "x": 1})), Some("v/2".into()));
        assert_eq!(vertex_id(&json!("nokey")), None);
        assert_eq!(vertex_id(&json!("v/")), None);
        assert_eq!(vertex_id(&json!(17)), None);
        assert_eq!(vertex_id(&json!({"_key": "2"})), None);
    }
}
