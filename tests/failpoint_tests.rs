//! Failure injection through the stage failpoints (feature: `failpoints`).
//!
//! Failpoints are process-wide, so every test arms a different executor kind.
#![cfg(feature = "failpoints")]


use std::sync::Arc;

use aqlflow_block::{ExecContext, RegisterInfos};
use aqlflow_core::error::codes;
use aqlflow_core::Error;
use aqlflow_exec::failpoints;
use aqlflow_exec::PipelineBuilder;
use aqlflow_operators::id::IdExecutor;
use aqlflow_operators::no_results::NoResultsExecutor;
use aqlflow_operators::sort::{SortExecutor, SortInfos, SortKey};
use aqlflow_operators::subquery::SubqueryStartExecutor;
use aqlflow_operators::{BlockQueue, WaitingBehavior};
use serde_json::json;
use test_data_gen::*;

fn passthrough() -> Arc<RegisterInfos> {
    Arc::new(RegisterInfos::passthrough(1))
}

fn sort() -> SortExecutor {
    let infos = SortInfos::new(
        RegisterInfos::passthrough(1),
        vec![SortKey {
            register: reg(0),
            ascending: true,
        }],
    )
    .unwrap();
    SortExecutor::new(Arc::new(infos))
}

#[test]
fn armed_stage_fails_with_debug_error() {
    let source = || BlockQueue::new([column([json!(2), json!(1)])], WaitingBehavior::Never);

    failpoints::arm("sort::execute");
    let mut pipeline = PipelineBuilder::new(source())
        .stage(sort())
        .build(ExecContext::default())
        .unwrap();
    let err = pipeline.collect_rows().unwrap_err();
    failpoints::disarm("sort::execute");
    assert!(matches!(err, Error::Debug(_)));
    assert_eq!(err.code(), codes::DEBUG);

    let mut pipeline = PipelineBuilder::new(source())
        .stage(sort())
        .build(ExecContext::default())
        .unwrap();
    assert_eq!(pipeline.collect_rows().unwrap(), vec![vec![json!(1)], vec![json!(2)]]);
}

#[test]
fn upstream_failure_reaches_the_caller() {
    let mut pipeline = PipelineBuilder::new(BlockQueue::new(
        [column([json!(1)])],
        WaitingBehavior::Never,
    ))
    .stage(NoResultsExecutor::new(passthrough()))
    .stage(SubqueryStartExecutor::new(passthrough()))
    .build(ExecContext::default())
    .unwrap();

    failpoints::arm("no_results::execute");
    let err = pipeline.collect_rows().unwrap_err();
    failpoints::disarm("no_results::execute");
    assert_eq!(err.code(), codes::DEBUG);
}

#[test]
fn disarmed_stage_resumes_where_it_stopped() {
    let mut ctx = context();
    let mut stage = stage(
        IdExecutor::new(passthrough()),
        queue(vec![column([json!(1), json!(2), json!(3)])], WaitingBehavior::Never),
    );
    assert_eq!(stage.failpoint(), "id::execute");

    let (_, block) = stage.execute(&mut ctx, 1).unwrap();
    ctx.blocks.release(block.unwrap()).unwrap();

    failpoints::arm(stage.failpoint());
    let err = stage.execute(&mut ctx, 1).unwrap_err();
    failpoints::disarm(stage.failpoint());
    assert_eq!(err.code(), codes::DEBUG);

    let rest = drain(&mut stage, &mut ctx, 1);
    assert_eq!(rest, vec![data(vec![json!(2)]), data(vec![json!(3)])]);
    assert_eq!(ctx.blocks.live_blocks(), 0);
}
