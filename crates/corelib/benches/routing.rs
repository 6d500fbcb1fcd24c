// Criterion benchmarks for the routing hot paths.
//
// Run with:
//   cargo bench -p corelib

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use corelib::node::{handles_from_ids, Node, NodeHandle};
use corelib::partitioner::{SipPartitioner, Xxh3Partitioner};
use corelib::ring::RingBuilder;
use corelib::Balancer;

fn bench_balancer_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("balancer_get");

    for node_count in [2usize, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(node_count),
            node_count,
            |b, &count| {
                let nodes = (0..count)
                    .map(|i| {
                        Arc::new(NodeHandle::with_weight(
                            Node::new(format!("node{i}")),
                            (),
                            (i + 1) as f64,
                        ))
                    })
                    .collect();
                let balancer = Balancer::new(nodes);
                b.iter(|| black_box(balancer.get()).is_some());
            },
        );
    }

    group.finish();
}

fn bench_ring_get_quorum(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_get_quorum");
    let ids: Vec<String> = (0..20).map(|i| format!("10.0.0.{i}:9000")).collect();

    let md5 = RingBuilder::new()
        .build(handles_from_ids(ids.iter().map(String::as_str)))
        .unwrap();
    group.bench_function("md5_20_nodes", |b| {
        b.iter(|| md5.get_quorum(black_box(b"user:12345")));
    });

    let sip = RingBuilder::new()
        .with_partitioner(Arc::new(SipPartitioner))
        .build(handles_from_ids(ids.iter().map(String::as_str)))
        .unwrap();
    group.bench_function("sip_20_nodes", |b| {
        b.iter(|| sip.get_quorum(black_box(b"user:12345")));
    });

    let xxh3 = RingBuilder::new()
        .with_partitioner(Arc::new(Xxh3Partitioner))
        .build(handles_from_ids(ids.iter().map(String::as_str)))
        .unwrap();
    group.bench_function("xxh3_20_nodes", |b| {
        b.iter(|| xxh3.get_quorum(black_box(b"user:12345")));
    });

    group.finish();
}

fn bench_ring_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_build");

    for node_count in [10usize, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(node_count),
            node_count,
            |b, &count| {
                let ids: Vec<String> = (0..count).map(|i| format!("node{i}")).collect();
                b.iter(|| {
                    RingBuilder::new()
                        .build(handles_from_ids(ids.iter().map(String::as_str)))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_balancer_get,
    bench_ring_get_quorum,
    bench_ring_build
);
criterion_main!(benches);
