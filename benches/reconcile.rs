//! Merge and Reconcile Benchmarks
//!
//! Run with: cargo bench --bench reconcile

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Map, Value};

use hhd_settings::merge;
use hhd_settings::reconcile::diff;
use hhd_settings::schema::{SchemaNode, SchemaRegistry, UnifiedSchema};
use hhd_settings::{PersistedDocument, Settings};

/// A schema with `plugins` namespaces shaped like a controller plugin.
fn schema(plugins: usize) -> UnifiedSchema {
    let mut registry = SchemaRegistry::new();
    for i in 0..plugins {
        let node = SchemaNode::container()
            .with_child(
                "xinput",
                SchemaNode::mode("ds5e")
                    .with_variant(
                        "disabled",
                        SchemaNode::container().with_child("noop", SchemaNode::boolean(false)),
                    )
                    .with_variant(
                        "ds5e",
                        SchemaNode::container()
                            .with_child("led_support", SchemaNode::boolean(true))
                            .with_child("edge_mode", SchemaNode::boolean(false)),
                    )
                    .with_variant(
                        "uinput",
                        SchemaNode::container()
                            .with_child("paddles", SchemaNode::boolean(false))
                            .with_child("deadzone", SchemaNode::integer(Some(0), Some(30), 5)),
                    ),
            )
            .with_child("gyro", SchemaNode::boolean(true))
            .with_child("tdp", SchemaNode::discrete([5, 10, 15, 20, 25, 30], 15))
            .with_child("sensitivity", SchemaNode::number(Some(0.1), Some(4.0), 1.0));
        registry.register(&format!("plugin{}", i), node).unwrap();
    }
    let unified = registry.unified();
    registry.shutdown();
    unified
}

fn overrides(plugins: usize) -> PersistedDocument {
    let mut root = Map::new();
    for i in 0..plugins {
        root.insert(
            format!("plugin{}", i),
            json!({
                "xinput": {"active": "uinput", "variants": {"uinput": {"deadzone": 10}}},
                "gyro": false,
                "tdp": 25,
                "future_knob": {"x": 1}
            }),
        );
    }
    PersistedDocument::new(Value::Object(root))
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for plugins in [1, 10, 50].iter() {
        let schema = schema(*plugins);
        let document = overrides(*plugins);
        group.throughput(Throughput::Elements(*plugins as u64));
        group.bench_with_input(format!("{}_namespaces", plugins), plugins, |b, _| {
            b.iter(|| merge::merge(black_box(&schema), black_box(&document)));
        });
    }

    group.finish();
}

fn benchmark_diff(c: &mut Criterion) {
    let schema = schema(50);
    let defaults = schema.defaults();
    let (changed, _) = merge::merge(&schema, &overrides(50));

    let mut group = c.benchmark_group("diff");
    group.bench_function("50_namespaces_identical", |b| {
        b.iter(|| diff(black_box(&defaults), black_box(&defaults)));
    });
    group.bench_function("50_namespaces_changed", |b| {
        b.iter(|| diff(black_box(&defaults), black_box(&changed)));
    });
    group.finish();
}

fn benchmark_set(c: &mut Criterion) {
    let settings = Settings::in_memory(schema(10));

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));
    let mut flip = false;
    group.bench_function("toggle_leaf", |b| {
        b.iter(|| {
            flip = !flip;
            settings
                .set(black_box("plugin3.gyro"), Value::Bool(flip))
                .unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_merge, benchmark_diff, benchmark_set);
criterion_main!(benches);
