#![no_main]

use bitstream::{BitReader, BitWriter};
use codec::{ConnectionId, Role, SnapshotSystem, SystemConfig};
use libfuzzer_sys::fuzz_target;

const CONN: ConnectionId = ConnectionId::new(1);

/// A bound client world with a nested player, accepting remote dynamic
/// fields, so arbitrary packets reach every decode path.
fn client() -> SnapshotSystem {
    let mut server = SnapshotSystem::new(SystemConfig::for_testing());
    let world = server.create_snapshot(CONN, "World", Role::Owner);
    let player = server.create_snapshot(CONN, "World/player-0", Role::Owner);
    server.add_dynamic_nested(world, 0u32, player).unwrap();
    server.setup(world).unwrap();
    server.setup(player).unwrap();

    let mut client = SnapshotSystem::new(SystemConfig::for_testing());
    let mirror = client.create_snapshot(CONN, "World", Role::Remote);
    let snapshot = client.snapshot_mut(mirror).unwrap();
    snapshot.add_primitive(0u32).unwrap();
    snapshot.add_trigger().unwrap();
    snapshot.accept_remote_dynamic_fields(true);
    let nested = client.create_snapshot(CONN, "World/player-0", Role::Remote);
    client.snapshot_mut(nested).unwrap().add_primitive(0.0f32).unwrap();
    client.add_dynamic_nested(mirror, 0u32, nested).unwrap();
    client.enable_delta_compression(mirror).unwrap();
    client.setup(mirror).unwrap();
    client.setup(nested).unwrap();
    for (conn, event) in server.take_outgoing_events() {
        client.on_control_event(conn, event).unwrap();
    }
    client
}

fuzz_target!(|data: &[u8]| {
    let mut client = client();
    let _ = client.read_packet(CONN, &mut BitReader::new(data));
    for handle in client.handles().collect::<Vec<_>>() {
        let _ = client.deserialize(handle, &mut BitReader::new(data));
    }

    // whatever was applied must still serialize and produce an ack table
    let mut writer = BitWriter::new();
    let _ = client.on_outbound(CONN, &mut writer);
});
