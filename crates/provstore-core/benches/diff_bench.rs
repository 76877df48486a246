//! # Diff Benchmarks
//!
//! Change-set computation and rendering over graphs of growing size, plus
//! identifier-to-path resolution.
//!
//! Run with: `cargo bench -p provstore-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use provstore_core::{ChangeSet, Iri, ShardConfig, Term, Triple};
use std::collections::BTreeSet;
use std::hint::black_box;

const TITLE: &str = "http://purl.org/dc/terms/title";
const CITES: &str = "http://purl.org/spar/cito/cites";

/// `size` entities, each with a title and one outgoing reference.
fn build_graph(size: usize, label: &str) -> BTreeSet<Triple> {
    let mut graph = BTreeSet::new();
    for i in 0..size {
        let subject = format!("https://w3id.org/oc/meta/br/{}", i + 1);
        graph.insert(Triple::new(
            &subject,
            TITLE,
            Term::literal(format!("{label} {i}")),
        ));
        graph.insert(Triple::new(
            &subject,
            CITES,
            Term::iri(format!("https://w3id.org/oc/meta/br/{}", i + 2)),
        ));
    }
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_unchanged");

    for size in [100, 1000, 10000].iter() {
        let graph = build_graph(*size, "title");
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| black_box(ChangeSet::compute(graph, graph, false)));
        });
    }

    group.finish();
}

fn bench_half_changed(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_half_changed");

    for size in [100, 1000, 10000].iter() {
        let previous = build_graph(*size, "old");
        let current: BTreeSet<Triple> = previous
            .iter()
            .filter(|t| t.predicate.as_str() == CITES)
            .cloned()
            .chain(build_graph(*size, "new").into_iter().filter(|t| t.predicate.as_str() == TITLE))
            .collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &(previous, current),
            |b, (previous, current)| {
                b.iter(|| black_box(ChangeSet::compute(previous, current, false)));
            },
        );
    }

    group.finish();
}

fn bench_update_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_text");
    let graph_iri = Iri::new("https://w3id.org/oc/meta/br/");

    for size in [100, 1000].iter() {
        let change = ChangeSet::compute(
            &build_graph(*size, "old"),
            &build_graph(*size, "new"),
            false,
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), &change, |b, change| {
            b.iter(|| black_box(change.update_text(&graph_iri)));
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let config = ShardConfig::new("/data/rdf");
    let base = "https://w3id.org/oc/meta/";
    let iris: Vec<String> = (1..=1000u64)
        .map(|n| format!("{base}br/060{}", n * 997))
        .collect();

    c.bench_function("resolve_iri_1000", |b| {
        b.iter(|| {
            for iri in &iris {
                let _ = black_box(config.resolve_iri(base, iri));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_unchanged,
    bench_half_changed,
    bench_update_text,
    bench_resolve
);
criterion_main!(benches);
