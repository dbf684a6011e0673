//! Optimiser pass benchmarks: chained filters and join fan-out over a
//! growing plan graph, measuring the cost of the single backward pass
//! itself rather than execution.

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use crateql::optimizer;
use crateql::plan::{AggMethod, AggSpec, PlanNode, Predicate};

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn chained_filters(depth: u32) -> std::sync::Arc<PlanNode> {
    let mut node = PlanNode::table_source("t", cols(&["a", "b", "c"]));
    for i in 0..depth {
        node = PlanNode::filter(node, vec![Predicate::eq("a", i as i64)]).unwrap();
    }
    node
}

fn bench_chained_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_chained_filters");
    for depth in [10u32, 100, 500] {
        let node = chained_filters(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| optimizer::optimize(&node).unwrap());
        });
    }
    group.finish();
}

fn join_fan_out(width: u32) -> std::sync::Arc<PlanNode> {
    let mut node = PlanNode::table_source("base", cols(&["org", "k", "v"]));
    for i in 0..width {
        let side = PlanNode::table_source(format!("side{i}"), cols(&["org", "k", "w"]));
        node = PlanNode::join(node, side, cols(&["org", "k"])).unwrap();
    }
    node
}

fn bench_join_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_join_fan_out");
    for width in [2u32, 8, 20] {
        let node = join_fan_out(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| optimizer::optimize(&node).unwrap());
        });
    }
    group.finish();
}

fn bench_aggregate_with_having(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_aggregate_having");
    for depth in [10u32, 100] {
        let mut node = PlanNode::table_source("t", cols(&["k", "v"]));
        for i in 0..depth {
            node = PlanNode::filter(node, vec![Predicate::eq("k", i as i64)]).unwrap();
        }
        let mut methods = BTreeMap::new();
        methods.insert("s".to_string(), AggSpec { input: "v".to_string(), method: AggMethod::Sum });
        let agg = PlanNode::aggregate(node, cols(&["k"]), methods).unwrap();
        let having = Predicate::new(
            "s",
            crateql::plan::FilterOp::Gt,
            crateql::plan::FilterValue::Scalar(crateql::table::Value::Int64(100)),
        );
        let sink = PlanNode::filter(agg, vec![having]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| optimizer::optimize(&sink).unwrap());
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_chained_filters, bench_join_fan_out, bench_aggregate_with_having
}
criterion_main!(benches);
