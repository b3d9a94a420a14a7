//! Serialize/deserialize throughput for a world snapshot with nested
//! players, with and without an acknowledged delta baseline.

use bitstream::{BitReader, BitWriter};
use codec::{ConnectionId, PrimitiveField, Role, SnapshotHandle, SnapshotSystem, SystemConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const CONN: ConnectionId = ConnectionId::new(1);

struct World {
    system: SnapshotSystem,
    root: SnapshotHandle,
    players: Vec<(SnapshotHandle, PrimitiveField<f32>)>,
}

fn build(role: Role, players: u32, delta: bool) -> World {
    let mut system = SnapshotSystem::new(SystemConfig::default());
    let root = system.create_snapshot(CONN, "World", role);
    system
        .snapshot_mut(root)
        .expect("root")
        .add_primitive(0u64)
        .expect("tick");
    let mut handles = Vec::new();
    for i in 0..players {
        let player = system.create_snapshot(CONN, format!("World/player-{i}"), role);
        let snap = system.snapshot_mut(player).expect("player");
        let x = snap.add_primitive(0.0f32).expect("x");
        snap.add_primitive(0.0f32).expect("y");
        snap.add_primitive(100i16).expect("health");
        snap.add_trigger().expect("jumped");
        system.add_dynamic_nested(root, i, player).expect("nest");
        system.setup(player).expect("setup");
        if delta {
            system.enable_delta_compression(player).expect("delta");
        }
        handles.push((player, x));
    }
    if delta {
        system.enable_delta_compression(root).expect("delta");
    }
    system.setup(root).expect("setup");
    World {
        system,
        root,
        players: handles,
    }
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_full");
    for players in [8u32, 64, 256] {
        let mut world = build(Role::Owner, players, false);
        let mut writer = BitWriter::new();
        world.system.serialize(world.root, &mut writer).expect("serialize");
        group.throughput(Throughput::Bytes(writer.byte_len() as u64));

        group.bench_with_input(BenchmarkId::new("players", players), &players, |b, _| {
            b.iter(|| {
                let mut writer = BitWriter::with_capacity(4096);
                world.system.serialize(world.root, &mut writer).expect("serialize");
                black_box(writer.finish())
            });
        });
    }
    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize_full");
    for players in [8u32, 64, 256] {
        let mut sender = build(Role::Owner, players, false);
        let mut writer = BitWriter::new();
        sender.system.serialize(sender.root, &mut writer).expect("serialize");
        let bytes = writer.finish();
        let mut receiver = build(Role::Remote, players, false);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("players", players), &bytes, |b, bytes| {
            b.iter(|| {
                let mut reader = BitReader::new(black_box(bytes));
                receiver
                    .system
                    .deserialize(receiver.root, &mut reader)
                    .expect("deserialize");
            });
        });
    }
    group.finish();
}

/// One player in ten moves per tick; every state is acknowledged.
fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_delta");
    for players in [64u32, 256] {
        let mut world = build(Role::Owner, players, true);
        let events = world.system.take_outgoing_events();
        black_box(events);

        group.bench_with_input(BenchmarkId::new("players", players), &players, |b, _| {
            let mut tick = 0u32;
            b.iter(|| {
                tick = tick.wrapping_add(1);
                for (player, x) in world.players.iter().step_by(10) {
                    let snap = world.system.snapshot_mut(*player).expect("player");
                    snap.set(*x, tick as f32).expect("set");
                }
                let mut writer = BitWriter::with_capacity(4096);
                world.system.serialize(world.root, &mut writer).expect("serialize");
                black_box(writer.finish());

                // ack what was just written for every delta snapshot
                for handle in world.system.handles().collect::<Vec<_>>() {
                    let latest = match world.system.snapshot(handle).expect("live").delta_state() {
                        codec::DeltaState::Outbound(history) => {
                            history.current_delta_id().wrapping_sub(1)
                        }
                        _ => continue,
                    };
                    ack(&mut world.system, handle, latest);
                }
            });
        });
    }
    group.finish();
}

fn ack(system: &mut SnapshotSystem, handle: SnapshotHandle, delta_id: u8) {
    let Some(id) = system.snapshot(handle).expect("live").id() else {
        return;
    };
    let mut writer = BitWriter::new();
    wire::encode_ack_table(
        &[wire::AckEntry {
            snapshot_id: id.raw(),
            delta_ids: vec![delta_id],
        }],
        &mut writer,
        &wire::Limits::default(),
    )
    .expect("ack table");
    let bytes = writer.finish();
    system
        .on_inbound(CONN, &mut BitReader::new(&bytes))
        .expect("inbound");
}

criterion_group!(benches, bench_serialize, bench_deserialize, bench_delta);
criterion_main!(benches);
