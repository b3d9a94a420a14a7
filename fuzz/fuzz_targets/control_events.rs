#![no_main]

use bitstream::BitReader;
use codec::{ConnectionId, Role, SnapshotSystem, SystemConfig};
use libfuzzer_sys::fuzz_target;

const CONN: ConnectionId = ConnectionId::new(1);

fuzz_target!(|data: &[u8]| {
    let limits = wire::Limits::for_testing();
    let mut system = SnapshotSystem::new(SystemConfig::for_testing());
    let waiting = system.create_snapshot(CONN, "World", Role::Remote);
    let _ = system.setup(waiting);

    let mut reader = BitReader::new(data);
    while let Ok(event) = wire::decode_control_event(&mut reader, &limits) {
        let _ = system.on_control_event(CONN, event);
    }
    let _ = wire::decode_ack_table(&mut BitReader::new(data), &limits);
});
