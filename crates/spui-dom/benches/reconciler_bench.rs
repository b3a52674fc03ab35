//! Benchmarks for list reconciliation on the in-memory tree.
//!
//! Run with: cargo bench -p spui-dom -- reconciler

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use spui_dom::{ListReconciler, MemoryNode};
use spui_reactive::ObservableVec;

fn row(id: &u64) -> MemoryNode {
    let li = MemoryNode::element("li");
    li.set_text(id.to_string());
    li
}

fn list(len: u64) -> (ObservableVec<u64>, ListReconciler<MemoryNode, u64>) {
    let models: ObservableVec<u64> = (0..len).collect();
    let reconciler = ListReconciler::new(MemoryNode::element("ul"), &models, |_, id, _| row(id));
    (models, reconciler)
}

// ---------------------------------------------------------------------------
// 1. Reordering moves nodes
// ---------------------------------------------------------------------------

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciler/reorder");

    for len in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(len));
        group.bench_with_input(BenchmarkId::new("reverse", len), &len, |b, &len| {
            let (models, reconciler) = list(len);
            b.iter(|| {
                models.reverse();
                black_box(reconciler.len());
            });
        });
        group.bench_with_input(BenchmarkId::new("sort", len), &len, |b, &len| {
            let (models, reconciler) = list(len);
            let mut desc = false;
            b.iter(|| {
                desc = !desc;
                if desc {
                    models.sort_by(|a, b| b.cmp(a));
                } else {
                    models.sort();
                }
                black_box(reconciler.len());
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Batched inserts and removals
// ---------------------------------------------------------------------------

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciler/batch");

    for ops in [10u64, 100, 1_000] {
        group.throughput(Throughput::Elements(ops));
        group.bench_with_input(BenchmarkId::from_parameter(ops), &ops, |b, &ops| {
            let (models, reconciler) = list(1_000);
            let mut next = 1_000u64;
            b.iter(|| {
                models.batch(|| {
                    for _ in 0..ops {
                        models.push([next]);
                        models.shift();
                        next += 1;
                    }
                });
                black_box(reconciler.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reorder, bench_batch);
criterion_main!(benches);
