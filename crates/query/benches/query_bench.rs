//! Benchmarks for incremental query maintenance.
//!
//! Each benchmark loads a collection once, then measures how long a small
//! change takes to propagate through the compiled pipeline. Setup is kept out
//! of the measurement with `iter_batched`.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rivulet_core::Value;
use rivulet_incremental::{Graph, Input, MultiSet};
use rivulet_index::IndexSet;
use rivulet_query::ast::builder::{agg, ref_, val, Query};
use rivulet_query::ast::{Direction, Expr, JoinKind};
use rivulet_query::{compile_query, optimize_expression_with_indexes, optimize_query, CompileInputs, QueryIR};

// ============================================================================
// Data Generation Utilities
// ============================================================================

fn employee(id: i64) -> Value {
    Value::object([
        ("id", Value::Int64(id)),
        ("dept_id", Value::Int64(id % 50)),
        ("salary", Value::Int64((id * 7919) % 1000)),
    ])
}

fn department(id: i64) -> Value {
    Value::object([("id", Value::Int64(id)), ("region", Value::Int64(id % 5))])
}

fn batch(rows: impl Iterator<Item = Value>, multiplicity: i64) -> MultiSet<(Value, Value)> {
    MultiSet::from_vec(rows.map(|r| ((r.get("id").clone(), r), multiplicity)).collect())
}

struct Pipeline {
    graph: Graph,
    employees: Input<(Value, Value)>,
}

/// Compiles `query`, loads `size` employees and 50 departments.
fn pipeline(query: &QueryIR, size: i64) -> Pipeline {
    let graph = Graph::new();
    let employees = graph.new_input::<(Value, Value)>();
    let departments = graph.new_input::<(Value, Value)>();
    let inputs = CompileInputs::new()
        .with_stream("e", employees.stream().clone())
        .with_stream("d", departments.stream().clone());
    let compiled = compile_query(query, &inputs).unwrap();
    compiled.output.output(|b| {
        black_box(b.len());
    });

    departments.send_data(batch((0..50).map(department), 1));
    employees.send_data(batch((0..size).map(employee), 1));
    graph.run();
    Pipeline { graph, employees }
}

fn join_query() -> QueryIR {
    let query = Query::from_collection("employees", "e")
        .join_collection("departments", "d", JoinKind::Inner, ref_("e.dept_id"), ref_("d.id"))
        .where_(Expr::eq(ref_("d.region"), val(2i64)))
        .where_(Expr::gt(ref_("e.salary"), val(500i64)))
        .select([("id", ref_("e.id")), ("region", ref_("d.region"))])
        .build();
    optimize_query(query).query
}

fn group_query() -> QueryIR {
    Query::from_collection("employees", "e")
        .select([
            ("dept", ref_("e.dept_id")),
            ("total", agg("sum", vec![ref_("e.salary")])),
            ("n", agg("count", vec![])),
        ])
        .group_by(ref_("e.dept_id"))
        .build()
}

fn top_k_query() -> QueryIR {
    Query::from_collection("employees", "e")
        .select([("id", ref_("e.id"))])
        .order_by(ref_("e.salary"), Direction::Desc)
        .limit(10)
        .build()
}

// ============================================================================
// Incremental Update Benchmarks
// ============================================================================

fn bench_incremental_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_update");
    let queries = [("join", join_query()), ("group_by", group_query()), ("top_k", top_k_query())];

    for size in [1_000i64, 10_000] {
        for (name, query) in &queries {
            group.bench_with_input(BenchmarkId::new(*name, size), &size, |b, &size| {
                b.iter_batched(
                    || pipeline(query, size),
                    |p| {
                        // one employee changes salary
                        let old = employee(size / 2);
                        let mut new = old.clone();
                        new.set("salary", Value::Int64(999));
                        p.employees.send_data(batch(core::iter::once(old), -1));
                        p.employees.send_data(batch(core::iter::once(new), 1));
                        p.graph.run();
                        black_box(p)
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_initial_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_load");
    for size in [1_000i64, 10_000] {
        let query = join_query();
        group.bench_with_input(BenchmarkId::new("join", size), &size, |b, &size| {
            b.iter(|| black_box(pipeline(&query, size)));
        });
    }
    group.finish();
}

// ============================================================================
// Index Optimization Benchmarks
// ============================================================================

fn bench_index_lookup(c: &mut Criterion) {
    let rows: Vec<(Value, Value)> = (0..10_000).map(|i| (Value::Int64(i), employee(i))).collect();
    let mut indexes = IndexSet::new();
    indexes.ensure_index(&["salary".to_string()], rows.iter().map(|(k, v)| (k, v)));
    indexes.ensure_index(&["dept_id".to_string()], rows.iter().map(|(k, v)| (k, v)));

    let point = Expr::eq(ref_("dept_id"), val(7i64));
    let range = Expr::and(Expr::gte(ref_("salary"), val(100i64)), Expr::lt(ref_("salary"), val(200i64)));
    let mixed = Expr::and(point.clone(), range.clone());

    let mut group = c.benchmark_group("index_lookup");
    for (name, expr) in [("point", point), ("range", range), ("intersection", mixed)] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(optimize_expression_with_indexes(&expr, &indexes)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_incremental_updates, bench_initial_load, bench_index_lookup);
criterion_main!(benches);
