use bitstream::{BitReader, BitWriter};
use codec::{
    CodecError, CodecResult, ConnectionId, CustomQueue, DeltaState, QueueItem, Role,
    SnapshotHandle, SnapshotId, SnapshotSystem, SystemConfig,
};
use schema::PrimitiveValue;
use wire::{EncodeError, LimitKind};

const CONN: ConnectionId = ConnectionId::new(3);

#[derive(Debug, Clone, PartialEq)]
struct Hit {
    target: u32,
    damage: u16,
}

impl QueueItem for Hit {
    fn write(&self, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_u32(self.target)?;
        writer.write_u16(self.damage)?;
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            target: reader.read_u32()?,
            damage: reader.read_u16()?,
        })
    }
}

fn pair() -> (SnapshotSystem, SnapshotSystem) {
    (
        SnapshotSystem::new(SystemConfig::default()),
        SnapshotSystem::new(SystemConfig::default()),
    )
}

fn handshake(server: &mut SnapshotSystem, client: &mut SnapshotSystem) {
    for (conn, event) in server.take_outgoing_events() {
        client.on_control_event(conn, event).unwrap();
    }
}

fn transfer(
    server: &mut SnapshotSystem,
    client: &mut SnapshotSystem,
    handles: &[SnapshotHandle],
) -> Vec<SnapshotHandle> {
    let mut writer = BitWriter::new();
    server.write_packet(CONN, handles, &mut writer).unwrap();
    let bytes = writer.finish();
    let mut reader = BitReader::new(&bytes);
    let updated = client.read_packet(CONN, &mut reader).unwrap();
    assert!(reader.is_empty());
    updated
}

#[test]
fn extra_static_fields_are_skipped() {
    let (mut server, mut client) = pair();
    let owner = server.create_snapshot(CONN, "World", Role::Owner);
    let snap = server.snapshot_mut(owner).unwrap();
    let tick = snap.add_primitive(10u32).unwrap();
    let clock = snap.add_primitive(0.5f64).unwrap();
    // newer schema: fields the client does not know
    snap.add_primitive(1i64).unwrap();
    let boom = snap.add_trigger().unwrap();
    let hits = snap.add_custom(CustomQueue::<Hit>::new()).unwrap();
    snap.add_dynamic_primitive(1u8, 99u16).unwrap();
    snap.add_dynamic_trigger(2u8).unwrap();
    server.setup(owner).unwrap();

    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    let seen = client.snapshot_mut(mirror).unwrap();
    let seen_tick = seen.add_primitive(0u32).unwrap();
    let seen_clock = seen.add_primitive(0.0f64).unwrap();
    seen.add_dynamic_primitive(1u8, 0u16).unwrap();
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    let snap = server.snapshot_mut(owner).unwrap();
    snap.set(tick, 11).unwrap();
    snap.set(clock, 0.75).unwrap();
    snap.fire(boom).unwrap();
    snap.fire_dynamic(2u8).unwrap();
    snap.custom_mut(hits).unwrap().push(Hit {
        target: 4,
        damage: 30,
    });
    assert_eq!(transfer(&mut server, &mut client, &[owner]), vec![mirror]);

    let seen = client.snapshot(mirror).unwrap();
    assert_eq!(seen.get(seen_tick).unwrap(), 11);
    assert_eq!(seen.get(seen_clock).unwrap(), 0.75);
    assert_eq!(seen.get_dynamic(1u8).unwrap(), PrimitiveValue::UInt16(99));
    assert!(!seen.has_dynamic(2u8));
}

#[test]
fn updates_for_unknown_snapshots_are_skipped() {
    let (mut server, mut client) = pair();
    let hidden = server.create_snapshot(CONN, "ServerOnly", Role::Owner);
    server
        .snapshot_mut(hidden)
        .unwrap()
        .add_custom(CustomQueue::<Hit>::new())
        .unwrap();
    server.setup(hidden).unwrap();

    let owner = server.create_snapshot(CONN, "World", Role::Owner);
    let tick = server.snapshot_mut(owner).unwrap().add_primitive(5u16).unwrap();
    server.setup(owner).unwrap();

    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    let seen = client.snapshot_mut(mirror).unwrap().add_primitive(0u16).unwrap();
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    assert_eq!(
        transfer(&mut server, &mut client, &[hidden, owner]),
        vec![mirror]
    );
    assert_eq!(client.snapshot(mirror).unwrap().get(seen).unwrap(), 5);
    assert_eq!(tick.id(), seen.id());
}

#[test]
fn nested_and_custom_payloads_cross_the_wire() {
    let (mut server, mut client) = pair();

    let world = server.create_snapshot(CONN, "World", Role::Owner);
    let player = server.create_snapshot(CONN, "World/player-1", Role::Owner);
    let health = server
        .snapshot_mut(player)
        .unwrap()
        .add_primitive(100i16)
        .unwrap();
    let hits = server
        .snapshot_mut(world)
        .unwrap()
        .add_custom(CustomQueue::<Hit>::new())
        .unwrap();
    server.add_dynamic_nested(world, 1u32, player).unwrap();
    server.setup(world).unwrap();

    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    let mirror_player = client.create_snapshot(CONN, "World/player-1", Role::Remote);
    let seen_health = client
        .snapshot_mut(mirror_player)
        .unwrap()
        .add_primitive(0i16)
        .unwrap();
    let seen_hits = client
        .snapshot_mut(mirror)
        .unwrap()
        .add_custom(CustomQueue::<Hit>::new())
        .unwrap();
    client.add_dynamic_nested(mirror, 1u32, mirror_player).unwrap();
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    server.snapshot_mut(player).unwrap().set(health, 64).unwrap();
    let queue = server.snapshot_mut(world).unwrap().custom_mut(hits).unwrap();
    queue.push(Hit {
        target: 1,
        damage: 36,
    });
    queue.push(Hit {
        target: 2,
        damage: 5,
    });
    transfer(&mut server, &mut client, &[world]);

    assert_eq!(
        client
            .snapshot(mirror_player)
            .unwrap()
            .get(seen_health)
            .unwrap(),
        64
    );
    let received = client
        .snapshot_mut(mirror)
        .unwrap()
        .custom_mut(seen_hits)
        .unwrap()
        .drain_received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].damage, 36);

    // the next payload carries an empty queue
    transfer(&mut server, &mut client, &[world]);
    assert!(client
        .snapshot(mirror)
        .unwrap()
        .custom(seen_hits)
        .unwrap()
        .received()
        .is_empty());
}

#[test]
fn unknown_nested_snapshot_is_skipped_whole() {
    let (mut server, mut client) = pair();
    let world = server.create_snapshot(CONN, "World", Role::Owner);
    let tick = server.snapshot_mut(world).unwrap().add_primitive(1u64).unwrap();
    let child = server.create_snapshot(CONN, "World/weather", Role::Owner);
    let rain = server.snapshot_mut(child).unwrap().add_primitive(0.25f32).unwrap();
    server.add_nested(world, child).unwrap();
    server.snapshot_mut(world).unwrap().add_dynamic_primitive('k', true).unwrap();
    server.setup(world).unwrap();

    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    let seen_tick = client.snapshot_mut(mirror).unwrap().add_primitive(0u64).unwrap();
    client.snapshot_mut(mirror).unwrap().accept_remote_dynamic_fields(true);
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    server.snapshot_mut(child).unwrap().set(rain, 0.5).unwrap();
    server.snapshot_mut(world).unwrap().set(tick, 77).unwrap();
    transfer(&mut server, &mut client, &[world]);

    let seen = client.snapshot(mirror).unwrap();
    assert_eq!(seen.get(seen_tick).unwrap(), 77);
    assert_eq!(seen.get_dynamic('k').unwrap(), PrimitiveValue::Bool(true));
}

#[test]
fn bound_id_mismatch_is_fatal_for_that_update() {
    let (mut server, mut client) = pair();
    let decoy = server.create_snapshot(CONN, "Decoy", Role::Owner);
    server.setup(decoy).unwrap();
    let owner = server.create_snapshot(CONN, "World", Role::Owner);
    server.setup(owner).unwrap();

    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    let mut writer = BitWriter::new();
    server.write_update(decoy, &mut writer).unwrap();
    let bytes = writer.finish();
    let err = client
        .read_update_for(mirror, &mut BitReader::new(&bytes))
        .unwrap_err();
    assert_eq!(
        err,
        CodecError::IdentityMismatch {
            unique_id: "World".to_owned(),
            expected: SnapshotId::new(1),
            found: SnapshotId::new(0),
        }
    );

    let mut writer = BitWriter::new();
    server.write_update(owner, &mut writer).unwrap();
    let bytes = writer.finish();
    assert!(client
        .read_update_for(mirror, &mut BitReader::new(&bytes))
        .unwrap());
}

#[test]
fn truncated_payload_is_an_error_not_a_panic() {
    let (mut server, mut client) = pair();
    let owner = server.create_snapshot(CONN, "World", Role::Owner);
    server.snapshot_mut(owner).unwrap().add_primitive(5u64).unwrap();
    server.setup(owner).unwrap();
    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    client.snapshot_mut(mirror).unwrap().add_primitive(0u64).unwrap();
    client.setup(mirror).unwrap();
    handshake(&mut server, &mut client);

    let mut writer = BitWriter::new();
    server.write_packet(CONN, &[owner], &mut writer).unwrap();
    let bytes = writer.finish();
    for cut in 0..bytes.len() {
        let result = client.read_packet(CONN, &mut BitReader::new(&bytes[..cut]));
        if cut > 2 {
            assert!(matches!(result, Err(CodecError::Decode(_) | CodecError::Bitstream(_))));
        }
    }
}

#[test]
fn encoder_enforces_the_field_limits_the_decoder_enforces() {
    let (mut server, mut client) = pair();
    let limit = SystemConfig::default().codec.max_static_fields;

    let owner = server.create_snapshot(CONN, "World", Role::Owner);
    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    for i in 0..limit {
        let value = u32::try_from(i).unwrap();
        server.snapshot_mut(owner).unwrap().add_primitive(value).unwrap();
        client.snapshot_mut(mirror).unwrap().add_primitive(0u32).unwrap();
    }
    let mut writer = BitWriter::new();
    server.serialize(owner, &mut writer).unwrap();
    client
        .deserialize(mirror, &mut BitReader::new(&writer.finish()))
        .unwrap();

    server.snapshot_mut(owner).unwrap().add_primitive(0u32).unwrap();
    let err = server.serialize(owner, &mut BitWriter::new()).unwrap_err();
    assert_eq!(
        err,
        CodecError::Encode(EncodeError::LimitsExceeded {
            kind: LimitKind::StaticFields,
            limit,
            actual: limit + 1,
        })
    );

    let mut config = SystemConfig::default();
    config.codec.max_dynamic_fields = 2;
    let mut system = SnapshotSystem::new(config);
    let dynamic = system.create_snapshot(CONN, "Dynamic", Role::Owner);
    for key in 0..3u8 {
        system
            .snapshot_mut(dynamic)
            .unwrap()
            .add_dynamic_primitive(key, 1.0f32)
            .unwrap();
    }
    assert!(matches!(
        system.serialize(dynamic, &mut BitWriter::new()),
        Err(CodecError::Encode(EncodeError::LimitsExceeded {
            kind: LimitKind::DynamicFields,
            limit: 2,
            actual: 3,
        }))
    ));
}

#[test]
fn failed_serialize_leaves_triggers_and_queues_pending() {
    let mut server = SnapshotSystem::new(SystemConfig::for_testing());
    let world = server.create_snapshot(CONN, "World", Role::Owner);
    let player = server.create_snapshot(CONN, "World/player-1", Role::Owner);
    let jumped = server.snapshot_mut(player).unwrap().add_trigger().unwrap();
    server.add_nested(world, player).unwrap();
    let snap = server.snapshot_mut(world).unwrap();
    let boom = snap.add_trigger().unwrap();
    let hits = snap.add_custom(CustomQueue::<Hit>::new()).unwrap();
    server.enable_delta_compression(world).unwrap();
    server.setup(world).unwrap();

    server.snapshot_mut(player).unwrap().fire(jumped).unwrap();
    let snap = server.snapshot_mut(world).unwrap();
    snap.fire(boom).unwrap();
    // 2 + 200 * 6 bytes, over the 1024 byte custom cap
    let queue = snap.custom_mut(hits).unwrap();
    for target in 0..200 {
        queue.push(Hit { target, damage: 1 });
    }

    let err = server
        .write_packet(CONN, &[world], &mut BitWriter::new())
        .unwrap_err();
    assert!(matches!(
        err,
        CodecError::Encode(EncodeError::LimitsExceeded {
            kind: LimitKind::CustomBytes,
            limit: 1024,
            actual: 1202,
        })
    ));

    let snap = server.snapshot(world).unwrap();
    assert_eq!(snap.trigger_count(boom).unwrap(), 1);
    assert_eq!(snap.custom(hits).unwrap().pending(), 200);
    let DeltaState::Outbound(history) = snap.delta_state() else {
        panic!("owner should keep a delta history");
    };
    assert!(history.is_empty());
    assert_eq!(history.current_delta_id(), 0);
    // the nested child was written before the failure
    assert_eq!(
        server.snapshot(player).unwrap().trigger_count(jumped).unwrap(),
        1
    );
}
