use std::sync::Arc;

use aqlflow_block::{BlockBuilder, ExecContext, RegisterInfos};
use aqlflow_core::register::{RegisterId, RegisterSet};
use aqlflow_exec::PipelineBuilder;
use aqlflow_operators::collect::{SortedCollectExecutor, SortedCollectInfos};
use aqlflow_operators::filter::{FilterExecutor, FilterInfos};
use aqlflow_operators::sort::{SortExecutor, SortInfos, SortKey};
use aqlflow_operators::{BlockQueue, WaitingBehavior};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

/// `rows` rows of (keep flag, group key, value) in blocks of 1000.
fn make_blocks(rows: usize) -> Vec<BlockBuilder> {
    let mut blocks = Vec::new();
    let mut builder = BlockBuilder::new(3);
    for i in 0..rows {
        builder = builder.row([json!(i % 3 != 0), json!(format!("group-{}", i % 16)), json!(i % 10)]);
        if (i + 1) % 1000 == 0 {
            blocks.push(builder);
            builder = BlockBuilder::new(3);
        }
    }
    if rows % 1000 != 0 {
        blocks.push(builder);
    }
    blocks
}

fn bench_filter_sort_collect(c: &mut Criterion) {
    let blocks = make_blocks(10_000);
    let filter = Arc::new(FilterInfos::new(RegisterInfos::passthrough(3), RegisterId::new(0)).unwrap());
    let sort = Arc::new(
        SortInfos::new(
            RegisterInfos::passthrough(3),
            vec![SortKey {
                register: RegisterId::new(1),
                ascending: true,
            }],
        )
        .unwrap(),
    );
    let writable: RegisterSet = [RegisterId::new(3), RegisterId::new(4)].into_iter().collect();
    let collect = Arc::new(
        SortedCollectInfos::builder(RegisterInfos::new(3, 5, writable, vec![]).unwrap())
            .group(RegisterId::new(1), RegisterId::new(3))
            .aggregate("SUM", Some(RegisterId::new(2)), RegisterId::new(4))
            .build()
            .unwrap(),
    );

    c.bench_function("filter_sort_collect_10k", |b| {
        b.iter(|| {
            let mut pipeline = PipelineBuilder::new(BlockQueue::new(blocks.clone(), WaitingBehavior::Never))
                .stage(FilterExecutor::new(Arc::clone(&filter)))
                .stage(SortExecutor::new(Arc::clone(&sort)))
                .stage(SortedCollectExecutor::new(Arc::clone(&collect)).unwrap())
                .build(ExecContext::default())
                .unwrap();
            let report = pipeline.run_to_completion(|_| Ok(())).unwrap();
            assert_eq!(report.rows_returned, 16);
        })
    });
}

fn bench_passthrough_throughput(c: &mut Criterion) {
    let blocks = make_blocks(10_000);
    let filter = Arc::new(FilterInfos::new(RegisterInfos::passthrough(3), RegisterId::new(0)).unwrap());

    c.bench_function("filter_10k", |b| {
        b.iter(|| {
            let mut pipeline = PipelineBuilder::new(BlockQueue::new(blocks.clone(), WaitingBehavior::Never))
                .stage(FilterExecutor::new(Arc::clone(&filter)))
                .build(ExecContext::default())
                .unwrap();
            pipeline.run_to_completion(|_| Ok(())).unwrap();
        })
    });
}

criterion_group!(pipelines, bench_filter_sort_collect, bench_passthrough_throughput);
criterion_main!(pipelines);
