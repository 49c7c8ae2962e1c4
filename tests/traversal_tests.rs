//! Graph traversal stage over an in-memory graph.


use std::sync::Arc;

use aqlflow_core::config::EngineConfig;
use aqlflow_core::error::codes;
use aqlflow_core::Error;
use aqlflow_operators::traversal::{
    GraphAccess, InMemoryGraph, StartVertex, TraversalExecutor, TraversalInfos, TraversalOptions,
    TraversalStrategy, UniqueVertices,
};
use serde_json::{json, Value};
use test_data_gen::*;

/// Register 0 holds the start, register 1 receives the vertex document.
fn vertex_infos(start: StartVertex, options: TraversalOptions) -> Arc<TraversalInfos> {
    Arc::new(
        TraversalInfos::builder(infos(1, 2, regs([1]), vec![regs([0])]), start)
            .options(options)
            .vertex_output(reg(1))
            .build()
            .unwrap(),
    )
}

fn traverse(infos: &Arc<TraversalInfos>, graph: Arc<dyn GraphAccess>, starts: Vec<Value>) -> Vec<Row> {
    run_everywhere(|waiting| {
        stage(
            TraversalExecutor::new(Arc::clone(infos), Arc::clone(&graph)),
            queue(vec![column(starts.clone())], waiting),
        )
    })
}

fn names(rows: &[Row]) -> Vec<Value> {
    rows.iter().map(|(_, v)| name(&v[1])).collect()
}

#[test]
fn constant_start_walks_breadth_first() {
    let infos = vertex_infos(
        StartVertex::Constant("v/a".into()),
        TraversalOptions::default().depth(1, 2),
    );
    let rows = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]);
    assert_eq!(names(&rows), vec![json!("b"), json!("d"), json!("c")]);
}

#[test]
fn depth_first_follows_each_branch_to_the_end() {
    let infos = vertex_infos(
        StartVertex::Constant("v/a".into()),
        TraversalOptions::default()
            .depth(1, 2)
            .strategy(TraversalStrategy::DepthFirst),
    );
    let rows = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]);
    assert_eq!(names(&rows), vec![json!("b"), json!("c"), json!("d")]);
}

#[test]
fn register_start_runs_once_per_input_row() {
    let infos = vertex_infos(StartVertex::Register(reg(0)), TraversalOptions::default());
    let rows = traverse(
        &infos,
        Arc::new(small_graph()),
        vec![json!("v/a"), json!({"_id": "v/b"})],
    );
    let pairs: Vec<(Value, Value)> = rows.iter().map(|(_, v)| (v[0].clone(), name(&v[1]))).collect();
    assert_eq!(
        pairs,
        vec![
            (json!("v/a"), json!("b")),
            (json!("v/a"), json!("d")),
            (json!({"_id": "v/b"}), json!("c")),
        ]
    );
}

#[test]
fn min_depth_zero_emits_the_start_vertex() {
    let infos = vertex_infos(
        StartVertex::Constant("v/c".into()),
        TraversalOptions::default().depth(0, 3),
    );
    let rows = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]);
    assert_eq!(names(&rows), vec![json!("c")]);
}

#[test]
fn raising_max_depth_never_loses_results() {
    let mut previous = 0;
    for max in 0..5 {
        let infos = vertex_infos(
            StartVertex::Constant("v/a".into()),
            TraversalOptions::default().depth(0, max),
        );
        let found = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]).len();
        assert!(found >= previous, "max depth {max} found {found} < {previous}");
        previous = found;
    }
    assert_eq!(previous, 4);
}

#[test]
fn unbounded_traversal_uses_the_configured_cap() {
    let options = TraversalOptions {
        max_depth: None,
        ..TraversalOptions::default()
    };
    let infos = vertex_infos(StartVertex::Constant("v/a".into()), options);
    let mut ctx = context_with(EngineConfig {
        max_traversal_depth: 1,
        ..EngineConfig::default()
    });
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph())),
        queue(vec![column([json!(null)])], Default::default()),
    );
    let rows = drain(&mut stage, &mut ctx, 10);
    assert_eq!(names(&rows), vec![json!("b"), json!("d")]);
}

#[test]
fn missing_vertex_document_becomes_null() {
    let mut graph = small_graph();
    graph.add_edge("v/a", "v/ghost");
    let infos = vertex_infos(StartVertex::Constant("v/a".into()), TraversalOptions::default());
    let rows = traverse(&infos, Arc::new(graph), vec![json!(null)]);
    let docs: Vec<Value> = rows.iter().map(|(_, v)| v[1].clone()).collect();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[2], Value::Null);
}

#[test]
fn invalid_start_is_skipped_with_a_warning() {
    let infos = vertex_infos(StartVertex::Register(reg(0)), TraversalOptions::default());
    let mut ctx = context();
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph())),
        queue(
            vec![column([json!("nokey"), json!(17), json!("v/b")])],
            Default::default(),
        ),
    );
    let rows = drain(&mut stage, &mut ctx, 10);
    assert_eq!(names(&rows), vec![json!("c")]);
    assert_eq!(ctx.query.warnings_seen(), 2);
    assert_eq!(ctx.query.warnings()[0].code, codes::BAD_PARAMETER);
    assert_eq!(stage.stats().rows_scanned, 3);
    assert_eq!(stage.stats().rows_filtered, 2);
}

#[test]
fn invalid_start_fails_the_query_when_warnings_are_fatal() {
    let infos = vertex_infos(StartVertex::Register(reg(0)), TraversalOptions::default());
    let mut ctx = context_with(EngineConfig {
        fail_on_warning: true,
        ..EngineConfig::default()
    });
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph())),
        queue(vec![column([json!(17)])], Default::default()),
    );
    let err = try_drain(&mut stage, &mut ctx, 10).unwrap_err();
    assert_eq!(err.code(), codes::BAD_PARAMETER);
}

#[test]
fn waiting_graph_gives_the_same_paths() {
    let infos = vertex_infos(
        StartVertex::Register(reg(0)),
        TraversalOptions::default().depth(0, 2),
    );
    let starts = vec![json!("v/a"), json!("v/b")];
    let plain = traverse(&infos, Arc::new(small_graph()), starts.clone());
    let waited = traverse(&infos, Arc::new(small_graph().waiting_once()), starts);
    assert_eq!(plain, waited);
}

#[test]
fn graph_failure_is_forwarded() {
    let infos = vertex_infos(
        StartVertex::Constant("v/a".into()),
        TraversalOptions::default().depth(1, 2),
    );
    let mut ctx = context();
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph().failing_on("v/b"))),
        queue(vec![column([json!(null)])], Default::default()),
    );
    let err = try_drain(&mut stage, &mut ctx, 10).unwrap_err();
    assert!(matches!(err, Error::Collaborator { collaborator: "graph", .. }));
    assert_eq!(err.code(), codes::COLLABORATOR);
}

#[test]
fn killed_query_stops_the_traversal() {
    let infos = vertex_infos(
        StartVertex::Constant("v/a".into()),
        TraversalOptions::default().depth(1, 2),
    );
    let mut ctx = context();
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph())),
        queue(vec![column([json!(null)])], Default::default()),
    );
    let (_, block) = stage.execute(&mut ctx, 1).unwrap();
    if let Some(handle) = block {
        ctx.blocks.release(handle).unwrap();
    }
    ctx.query.kill();
    let err = stage.execute(&mut ctx, 1).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.code(), codes::QUERY_KILLED);
}

#[test]
fn path_output_lists_vertices_and_edges() {
    let infos = Arc::new(
        TraversalInfos::builder(
            infos(1, 2, regs([1]), vec![regs([0])]),
            StartVertex::Constant("v/a".into()),
        )
        .options(TraversalOptions::default().depth(2, 2))
        .path_output(reg(1))
        .build()
        .unwrap(),
    );
    let rows = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]);
    assert_eq!(rows.len(), 1);
    let path = &rows[0].1[1];
    let vertices: Vec<Value> = path["vertices"].as_array().unwrap().iter().map(name).collect();
    assert_eq!(vertices, vec![json!("a"), json!("b"), json!("c")]);
    let edges = path["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0]["_from"], json!("v/a"));
    assert_eq!(edges[1]["_to"], json!("v/c"));
}

#[test]
fn edge_output_holds_the_last_edge() {
    let infos = Arc::new(
        TraversalInfos::builder(
            infos(1, 2, regs([1]), vec![regs([0])]),
            StartVertex::Constant("v/a".into()),
        )
        .edge_output(reg(1))
        .build()
        .unwrap(),
    );
    let rows = traverse(&infos, Arc::new(small_graph()), vec![json!(null)]);
    let targets: Vec<Value> = rows.iter().map(|(_, v)| v[1]["_to"].clone()).collect();
    assert_eq!(targets, vec![json!("v/b"), json!("v/d")]);
}

#[test]
fn vertex_documents_are_read_once() {
    let infos = vertex_infos(StartVertex::Constant("v/a".into()), TraversalOptions::default());
    let mut ctx = context();
    let mut stage = stage(
        TraversalExecutor::new(infos, Arc::new(small_graph())),
        queue(vec![column([json!(1), json!(2)])], Default::default()),
    );
    let rows = drain(&mut stage, &mut ctx, 10);
    assert_eq!(rows.len(), 4);
    assert_eq!(stage.stats().documents_looked_up, 2);
}

#[test]
fn global_uniqueness_needs_breadth_first() {
    let err = TraversalInfos::builder(
        infos(1, 2, regs([1]), vec![regs([0])]),
        StartVertex::Constant("v/a".into()),
    )
    .options(
        TraversalOptions::default()
            .strategy(TraversalStrategy::DepthFirst)
            .unique_vertices(UniqueVertices::Global),
    )
    .vertex_output(reg(1))
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::BadParameter(_)));
}

#[test]
fn empty_graph_yields_nothing() {
    let infos = vertex_infos(StartVertex::Constant("v/a".into()), TraversalOptions::default());
    let rows = traverse(&infos, Arc::new(InMemoryGraph::new()), vec![json!(null)]);
    assert!(rows.is_empty());
}
