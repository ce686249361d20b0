//! Dispatch benchmarks for bindings over the in-memory layer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oneway::{
    membership_diff, Binding, BindingEngine, DataSerializer, Delivery, GroupConsumer, GroupSet,
    InMemoryChannelLayer, LayerConfig, Model, PrimaryKey, RecordKind, SerdeSerializer, Table,
    Transaction,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Serialize)]
struct Post {
    id: Option<i64>,
    title: String,
    #[serde(skip)]
    tags: Vec<String>,
}

impl Model for Post {
    fn kind() -> RecordKind {
        RecordKind::new("blog", "Post")
    }

    fn pk(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::Int)
    }

    fn set_pk(&mut self, pk: PrimaryKey) {
        if let PrimaryKey::Int(v) = pk {
            self.id = Some(v);
        }
    }
}

struct TagBinding;

impl Binding for TagBinding {
    type Model = Post;

    fn stream(&self) -> &str {
        "posts"
    }

    fn group_names(&self, post: &Post) -> Vec<String> {
        post.tags.clone()
    }

    fn serializer(&self) -> Option<&dyn DataSerializer<Post>> {
        Some(&SerdeSerializer)
    }
}

fn tags(count: usize, offset: usize) -> Vec<String> {
    (offset..offset + count).map(|i| format!("tag-{}", i)).collect()
}

/// Layer with one subscriber per group, large enough that nothing is dropped.
fn setup(groups: usize) -> (Table<Post>, BindingEngine, Vec<GroupConsumer>) {
    let layer = Arc::new(InMemoryChannelLayer::with_config(LayerConfig {
        capacity: 100_000,
    }));
    let engine = BindingEngine::new(Delivery::new(layer.clone()));
    let table = Table::new();
    engine.register(&table, TagBinding).unwrap();

    let consumers = tags(groups * 2, 0)
        .iter()
        .map(|tag| GroupConsumer::connect(Arc::clone(&layer), &[tag.as_str()]))
        .collect();
    (table, engine, consumers)
}

/// Benchmark an update whose membership does not change
fn bench_update_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_fan_out");

    for groups in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, &n| {
            let (table, _engine, consumers) = setup(n);
            let mut post = Post {
                id: None,
                title: "hello".to_string(),
                tags: tags(n, 0),
            };
            table.save(&mut post).unwrap();

            b.iter(|| {
                table.save(black_box(&mut post)).unwrap();
                for consumer in &consumers {
                    consumer.drain_json().unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark a save that moves the record to a disjoint set of groups
fn bench_membership_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("membership_move");

    for groups in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, &n| {
            let (table, _engine, consumers) = setup(n);
            let mut post = Post {
                id: None,
                title: "moving".to_string(),
                tags: tags(n, 0),
            };
            table.save(&mut post).unwrap();
            let mut flip = false;

            b.iter(|| {
                flip = !flip;
                post.tags = tags(n, if flip { n } else { 0 });
                table.save(&mut post).unwrap();
                for consumer in &consumers {
                    consumer.drain_json().unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark commit of a transaction holding many deferred saves
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(20);

    for saves in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("saves", saves), &saves, |b, &n| {
            let (table, _engine, consumers) = setup(1);

            b.iter(|| {
                let tx = Transaction::begin();
                for i in 0..n {
                    let mut post = Post {
                        id: None,
                        title: format!("post {}", i),
                        tags: tags(1, 0),
                    };
                    table.save_in(&tx, &mut post).unwrap();
                }
                tx.commit().unwrap();
                for consumer in &consumers {
                    consumer.drain_json().unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark the pure membership diff
fn bench_membership_diff(c: &mut Criterion) {
    let old: GroupSet = tags(500, 0).into_iter().collect();
    let new: GroupSet = tags(500, 250).into_iter().collect();

    c.bench_function("membership_diff_500", |b| {
        b.iter(|| black_box(membership_diff(black_box(&old), black_box(&new))));
    });
}

criterion_group!(
    benches,
    bench_update_fan_out,
    bench_membership_move,
    bench_commit,
    bench_membership_diff
);
criterion_main!(benches);
