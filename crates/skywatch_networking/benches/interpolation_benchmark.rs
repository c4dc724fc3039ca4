//! # Interpolation Benchmark
//!
//! Render-tick cost with many tracked entities, plus the per-snapshot cost
//! of applying and of fragmenting/encoding.
//!
//! Run with: `cargo bench --package skywatch_networking`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skywatch_core::{EntityId, Position};
use skywatch_networking::protocol::{fragment_snapshot, Packet, PacketHeader, PacketSerializer};
use skywatch_networking::{NullSink, Snapshot, SyncSession};

fn snapshot(sequence: u64, count: u32, offset: f32) -> Snapshot {
    Snapshot::from_entries(
        sequence,
        Duration::from_secs(sequence * 3),
        (0..count).map(|i| {
            let f = i as f32;
            (EntityId(i), Position::new(f + offset, f * 0.5, 100.0))
        }),
    )
}

fn primed_session(count: u32) -> SyncSession {
    let mut session = SyncSession::new();
    session.apply_snapshot(&snapshot(1, count, 0.0), Duration::ZERO, &mut NullSink);
    session.apply_snapshot(&snapshot(2, count, 30.0), Duration::from_secs(3), &mut NullSink);
    session
}

/// One render tick over every track.
fn bench_render_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_tick");

    for count in [100u32, 1_000, 10_000] {
        let mut session = primed_session(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let mut ms = 3000u64;
            b.iter(|| {
                ms = if ms >= 6000 { 3000 } else { ms + 16 };
                black_box(session.interpolate(Duration::from_millis(ms), &mut NullSink))
            });
        });
    }

    group.finish();
}

/// Folding one snapshot into a session of the same size.
fn bench_apply_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_snapshot");

    for count in [100u32, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut session = primed_session(count);
            let mut sequence = 3u64;
            b.iter(|| {
                let snap = snapshot(sequence, count, sequence as f32);
                let outcome = session.apply_snapshot(&snap, Duration::from_secs(sequence * 3), &mut NullSink);
                sequence += 1;
                black_box(outcome)
            });
        });
    }

    group.finish();
}

/// Fragmenting and encoding one snapshot for the wire.
fn bench_encode_snapshot(c: &mut Criterion) {
    let snap = snapshot(9, 1_000, 0.0);
    let mut serializer = PacketSerializer::new();

    c.bench_function("encode_snapshot_1000", |b| {
        b.iter(|| {
            let mut bytes = 0usize;
            for fragment in fragment_snapshot(&snap).unwrap_or_default() {
                if let Ok(datagram) = serializer.serialize(&Packet::SnapshotFragment(PacketHeader::new(9), fragment)) {
                    bytes += datagram.len();
                }
            }
            black_box(bytes)
        });
    });
}

criterion_group!(benches, bench_render_tick, bench_apply_snapshot, bench_encode_snapshot);
criterion_main!(benches);
