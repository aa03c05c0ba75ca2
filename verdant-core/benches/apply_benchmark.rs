use criterion::{black_box, criterion_group, criterion_main, Criterion};
use verdant_core::layout::assign_positions;
use verdant_core::{apply, apply_mut, Component, Edge, GraphState, HistoryManager, Operation};

/// A project with `n` nodes spread over four levels and a chain of edges.
fn project(n: i64) -> GraphState {
    let mut nodes: Vec<Component> = (0..n)
        .map(|id| Component::new(id).with_level((id % 4) as u32))
        .collect();
    assign_positions(&mut nodes);
    let edges = (1..n).map(|id| Edge::new(id, id - 1, id)).collect();
    GraphState {
        nodes,
        edges,
        materials: Vec::new(),
    }
}

fn bench_apply_create_node(c: &mut Criterion) {
    let state = project(1_000);
    let op = Operation::CreateNode(Component::new(5_000).with_level(2));

    c.bench_function("apply_create_node_1k", |b| {
        b.iter(|| black_box(apply(black_box(&state), black_box(&op))))
    });
}

fn bench_apply_delete_absent(c: &mut Criterion) {
    let state = project(1_000);
    let op = Operation::DeleteNode { id: -1 };

    c.bench_function("apply_delete_absent_1k", |b| {
        b.iter(|| black_box(apply(black_box(&state), black_box(&op))))
    });
}

fn bench_decode_relation(c: &mut Criterion) {
    let text = r#"{"op":"create_relation","id":"42","source":"7","target":8}"#;

    c.bench_function("decode_create_relation", |b| {
        b.iter(|| black_box(Operation::from_json(black_box(text)).unwrap()))
    });
}

fn bench_history_rebase(c: &mut Criterion) {
    c.bench_function("history_rebase_50_frames_200_nodes", |b| {
        b.iter_batched(
            || {
                let mut history = HistoryManager::new(project(200), 50);
                for id in 0..50 {
                    let next = apply(history.present(), &Operation::CreateNode(Component::new(1_000 + id)));
                    history.record(next);
                }
                history
            },
            |mut history| {
                let op = Operation::DeleteNode { id: 3 };
                history.rebase(|frame| apply_mut(frame, &op));
                black_box(history)
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_apply_create_node,
    bench_apply_delete_absent,
    bench_decode_relation,
    bench_history_rebase,
);
criterion_main!(benches);
