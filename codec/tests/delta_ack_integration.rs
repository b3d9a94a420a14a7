use bitstream::{BitReader, BitWriter};
use codec::{
    ConnectionId, DeltaState, PrimitiveField, Role, SnapshotHandle, SnapshotId, SnapshotSystem,
    SystemConfig, TriggerField, MAX_DELTA_HISTORY,
};
use wire::{decode_ack_table, HEADER_SIZE, SnapshotHeader};

const CONN: ConnectionId = ConnectionId::new(1);

struct Fields {
    health: PrimitiveField<i32>,
    speed: PrimitiveField<f32>,
    status: PrimitiveField<u8>,
    jumped: TriggerField,
}

struct Link {
    server: SnapshotSystem,
    client: SnapshotSystem,
    owner: SnapshotHandle,
    mirror: SnapshotHandle,
    fields: Fields,
}

fn register(system: &mut SnapshotSystem, handle: SnapshotHandle) -> Fields {
    let snapshot = system.snapshot_mut(handle).unwrap();
    Fields {
        health: snapshot.add_primitive(100).unwrap(),
        speed: snapshot.add_primitive(0.0).unwrap(),
        status: snapshot.add_primitive_never_compress(0).unwrap(),
        jumped: snapshot.add_trigger().unwrap(),
    }
}

/// A delta-compressing snapshot bound on both sides; `filler` owned
/// snapshots are set up first to push its id up.
fn link(filler: usize) -> Link {
    let mut server = SnapshotSystem::new(SystemConfig::for_testing());
    let mut client = SnapshotSystem::new(SystemConfig::for_testing());
    for i in 0..filler {
        let handle = server.create_snapshot(CONN, format!("filler-{i}"), Role::Owner);
        server.setup(handle).unwrap();
    }

    let owner = server.create_snapshot(CONN, "Player", Role::Owner);
    let fields = register(&mut server, owner);
    server.enable_delta_compression(owner).unwrap();
    server.setup(owner).unwrap();

    let mirror = client.create_snapshot(CONN, "Player", Role::Remote);
    register(&mut client, mirror);
    client.enable_delta_compression(mirror).unwrap();
    client.setup(mirror).unwrap();

    for (conn, event) in server.take_outgoing_events() {
        client.on_control_event(conn, event).unwrap();
    }
    Link {
        server,
        client,
        owner,
        mirror,
        fields,
    }
}

impl Link {
    /// Server packet to the client. Returns the bytes.
    fn send(&mut self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        self.server
            .write_packet(CONN, &[self.owner], &mut writer)
            .unwrap();
        writer.finish()
    }

    fn deliver(&mut self, bytes: &[u8]) {
        let updated = self
            .client
            .read_packet(CONN, &mut BitReader::new(bytes))
            .unwrap();
        assert_eq!(updated, vec![self.mirror]);
    }

    /// Client ack table back to the server. Returns acknowledged count.
    fn ack(&mut self) -> usize {
        let mut writer = BitWriter::new();
        self.client.on_outbound(CONN, &mut writer).unwrap();
        let bytes = writer.finish();
        self.server
            .on_inbound(CONN, &mut BitReader::new(&bytes))
            .unwrap()
    }

    fn round_trip(&mut self) -> Vec<u8> {
        let bytes = self.send();
        self.deliver(&bytes);
        self.ack();
        bytes
    }

    fn payload_header(bytes: &[u8]) -> SnapshotHeader {
        // empty ack table, then the u16 snapshot id
        let mut reader = BitReader::new(&bytes[4..]);
        SnapshotHeader::decode(&mut reader).unwrap()
    }

    fn client_health(&self) -> i32 {
        self.client
            .snapshot(self.mirror)
            .unwrap()
            .get(self.fields.health)
            .unwrap()
    }
}

#[test]
fn ack_round_trip_for_snapshot_42_delta_5() {
    let mut link = link(42);
    assert_eq!(
        link.server.snapshot(link.owner).unwrap().id(),
        Some(SnapshotId::new(42))
    );

    // delta ids 0..=4 are lost
    for _ in 0..5 {
        link.send();
    }
    let bytes = link.send();
    assert_eq!(Link::payload_header(&bytes).delta_id, 5);
    link.deliver(&bytes);

    let mut writer = BitWriter::new();
    assert_eq!(link.client.on_outbound(CONN, &mut writer).unwrap(), 1);
    let acks = writer.finish();
    assert_eq!(acks, vec![1, 0, 42, 0, 1, 0, 5]);

    // the pending set was cleared
    let mut writer = BitWriter::new();
    assert_eq!(link.client.on_outbound(CONN, &mut writer).unwrap(), 0);

    assert_eq!(
        link.server
            .on_inbound(CONN, &mut BitReader::new(&acks))
            .unwrap(),
        1
    );
    let DeltaState::Outbound(history) = link.server.snapshot(link.owner).unwrap().delta_state() else {
        panic!("owner should keep an outbound history");
    };
    assert!(history.get(5).unwrap().is_acknowledged());
    assert!(!history.get(4).unwrap().is_acknowledged());
    assert_eq!(history.baseline().unwrap().delta_id(), Some(5));

    // the acknowledged state is now the baseline: only the never-compress
    // field is sent
    let bytes = link.send();
    let header = Link::payload_header(&bytes);
    assert_eq!(header.static_count, 1);
    assert_eq!(header.delta_id, 6);
}

#[test]
fn unchanged_fields_are_omitted_and_changes_are_sent() {
    let mut link = link(0);
    let first = link.round_trip();
    assert_eq!(Link::payload_header(&first).static_count, 3);

    let idle = link.round_trip();
    assert_eq!(Link::payload_header(&idle).static_count, 1);

    let health = link.fields.health;
    link.server
        .snapshot_mut(link.owner)
        .unwrap()
        .set(health, 75)
        .unwrap();
    let changed = link.round_trip();
    assert_eq!(Link::payload_header(&changed).static_count, 2);
    assert_eq!(link.client_health(), 75);
    assert_eq!(
        link.client
            .snapshot(link.mirror)
            .unwrap()
            .get(link.fields.speed)
            .unwrap(),
        0.0
    );
}

#[test]
fn never_compress_is_in_every_payload() {
    let mut link = link(0);
    let status = link.fields.status;
    link.round_trip();
    for _ in 0..4 {
        let bytes = link.round_trip();
        assert_eq!(Link::payload_header(&bytes).static_count, 1);
        // status is field 2 and the only entry left
        assert_eq!(&bytes[4 + HEADER_SIZE..4 + HEADER_SIZE + 2], &[2, 0]);
    }

    link.server
        .snapshot_mut(link.owner)
        .unwrap()
        .set(status, 9)
        .unwrap();
    link.round_trip();
    assert_eq!(
        link.client.snapshot(link.mirror).unwrap().get(status).unwrap(),
        9
    );
}

#[test]
fn lost_ack_does_not_hide_a_reverted_value() {
    let mut link = link(0);
    link.round_trip(); // health 100 acknowledged

    let health = link.fields.health;
    link.server
        .snapshot_mut(link.owner)
        .unwrap()
        .set(health, 50)
        .unwrap();
    let bytes = link.send();
    link.deliver(&bytes); // ack for this one is lost
    let mut lost = BitWriter::new();
    link.client.on_outbound(CONN, &mut lost).unwrap();
    assert_eq!(link.client_health(), 50);

    // back to the acknowledged value; the peer still holds 50
    link.server
        .snapshot_mut(link.owner)
        .unwrap()
        .set(health, 100)
        .unwrap();
    let bytes = link.send();
    assert_eq!(Link::payload_header(&bytes).static_count, 2);
    link.deliver(&bytes);
    assert_eq!(link.client_health(), 100);
}

#[test]
fn lost_payloads_only_delay_compression() {
    let mut link = link(0);
    let health = link.fields.health;
    for value in 0..20 {
        link.server
            .snapshot_mut(link.owner)
            .unwrap()
            .set(health, value)
            .unwrap();
        let bytes = link.send();
        if value % 3 != 0 {
            link.deliver(&bytes);
            assert_eq!(link.client_health(), value);
        }
        if value % 4 == 0 {
            link.ack();
        }
    }
}

#[test]
fn triggers_count_activations_between_payloads() {
    let mut link = link(0);
    let jumped = link.fields.jumped;
    for _ in 0..3 {
        link.server
            .snapshot_mut(link.owner)
            .unwrap()
            .fire(jumped)
            .unwrap();
    }
    link.round_trip();
    let mirror = link.client.snapshot_mut(link.mirror).unwrap();
    assert_eq!(mirror.take_trigger(jumped).unwrap(), 3);
    assert_eq!(mirror.trigger_count(jumped).unwrap(), 0);
    assert_eq!(
        link.server
            .snapshot(link.owner)
            .unwrap()
            .trigger_count(jumped)
            .unwrap(),
        0
    );

    // not fired: absent on the wire and read as zero even if the
    // receiver never took the previous count
    link.server
        .snapshot_mut(link.owner)
        .unwrap()
        .fire(jumped)
        .unwrap();
    link.round_trip();
    let bytes = link.round_trip();
    assert_eq!(Link::payload_header(&bytes).static_count, 1);
    assert_eq!(
        link.client
            .snapshot(link.mirror)
            .unwrap()
            .trigger_count(jumped)
            .unwrap(),
        0
    );
}

#[test]
fn acks_for_unknown_snapshots_are_ignored() {
    let mut link = link(0);
    let mut writer = BitWriter::new();
    wire::encode_ack_table(
        &[
            wire::AckEntry {
                snapshot_id: 900,
                delta_ids: vec![1, 2, 3],
            },
            wire::AckEntry {
                snapshot_id: 0,
                delta_ids: vec![0],
            },
        ],
        &mut writer,
        &wire::Limits::default(),
    )
    .unwrap();
    link.send();
    let bytes = writer.finish();
    assert_eq!(
        link.server
            .on_inbound(CONN, &mut BitReader::new(&bytes))
            .unwrap(),
        1
    );
}

#[test]
fn delta_ids_wrap_and_still_acknowledge() {
    let mut link = link(0);
    for _ in 0..300 {
        link.round_trip();
    }
    let bytes = link.round_trip();
    // 300 wraps to 44
    assert_eq!(Link::payload_header(&bytes).delta_id, 44);
    assert_eq!(Link::payload_header(&bytes).static_count, 1);
}

#[test]
fn unsent_acks_older_than_the_history_window_are_dropped() {
    let mut link = link(0);
    // 300 payloads arrive while the client never writes its ack table
    for _ in 0..300 {
        let bytes = link.send();
        link.deliver(&bytes);
    }

    let mut queued = Vec::new();
    loop {
        let mut writer = BitWriter::new();
        if link.client.on_outbound(CONN, &mut writer).unwrap() == 0 {
            break;
        }
        let bytes = writer.finish();
        let entries =
            decode_ack_table(&mut BitReader::new(&bytes), &wire::Limits::for_testing()).unwrap();
        queued.extend(entries.into_iter().flat_map(|entry| entry.delta_ids));
    }
    // payloads 172..=299 are within the window; 171 and older would alias
    // ids the server reuses
    assert_eq!(queued.len(), MAX_DELTA_HISTORY);
    assert!(!queued.contains(&171));
    assert!(queued.contains(&172));
    assert!(queued.contains(&43));
}
