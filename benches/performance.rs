use criterion::{criterion_group, criterion_main, Criterion};
use shipplan_core::dag::{JoinHint, LogicalPlan};
use shipplan_core::fields::FieldList;
use shipplan_planner::{LogicalPlanBuilder, Optimizer};

/// `width` sources folded into a left-deep union chain, read by `consumers`
/// groupings on different keys.
fn union_chain(width: usize, consumers: usize) -> LogicalPlan {
    let mut b = LogicalPlanBuilder::new();
    let mut cur = b.source("s0");
    for i in 1..width {
        let s = b.source(format!("s{i}"));
        cur = b.union(format!("u{i}"), cur, s);
    }
    for k in 0..consumers {
        let g = b.group_reduce(format!("g{k}"), cur, FieldList::single(k));
        b.sink(format!("k{k}"), g);
    }
    b.build()
}

/// Star of joins against one shared dimension source.
fn join_star(arms: usize) -> LogicalPlan {
    let mut b = LogicalPlanBuilder::new();
    let dim = b.source("dim");
    b.with_estimated_bytes(dim, 1_000);
    for i in 0..arms {
        let fact = b.source(format!("fact{i}"));
        b.with_estimated_bytes(fact, 1_000_000);
        let j = b.join(
            format!("j{i}"),
            fact,
            dim,
            FieldList::single(0),
            FieldList::single(0),
            JoinHint::Optimizer,
        );
        let g = b.group_reduce(format!("g{i}"), j, FieldList::single(0));
        b.sink(format!("k{i}"), g);
    }
    b.build()
}

fn bench_compile(c: &mut Criterion) {
    let optimizer = Optimizer::default();

    let unions = union_chain(256, 4);
    c.bench_function("compile_union_chain", |b| {
        b.iter(|| {
            let _ = optimizer.compile(&unions).unwrap();
        })
    });

    let joins = join_star(64);
    c.bench_function("compile_join_star", |b| {
        b.iter(|| {
            let _ = optimizer.compile(&joins).unwrap();
        })
    });
}

criterion_group!(compile, bench_compile);
criterion_main!(compile);
