//! Reference game snapshots for the demo simulation.
//!
//! A `World` snapshot carries the tick, time of day, world flags and a queue
//! of pending hits. Each player is a nested snapshot stored as a dynamic
//! field of the world, keyed by its `u32` player id.

use std::collections::BTreeMap;

use bitstream::{BitReader, BitWriter};
use codec::{
    CodecResult, ConnectionId, CustomField, CustomQueue, PrimitiveField, QueueItem, Role,
    SnapshotHandle, SnapshotSystem, TriggerField,
};
use schema::Flags8;

pub const WORLD_ID: &str = "World";

pub const STATUS_ALIVE: u8 = 0;
pub const STATUS_CROUCHING: u8 = 1;
pub const STATUS_SPRINTING: u8 = 2;

pub const WORLD_FLAG_RAINING: u8 = 0;
pub const WORLD_FLAG_NIGHT: u8 = 1;

/// Unique id of a player's nested snapshot.
pub fn player_unique_id(player: u32) -> String {
    format!("{WORLD_ID}/player-{player}")
}

/// One hit reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub attacker: u32,
    pub target: u32,
    pub damage: u16,
}

impl QueueItem for Hit {
    fn write(&self, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_u32(self.attacker)?;
        writer.write_u32(self.target)?;
        writer.write_u16(self.damage)?;
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            attacker: reader.read_u32()?,
            target: reader.read_u32()?,
            damage: reader.read_u16()?,
        })
    }
}

pub type PendingHits = CustomQueue<Hit>;

/// Plain values of one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub health: i16,
    pub status: Flags8,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            health: 100,
            status: Flags8::default().with(STATUS_ALIVE, true),
        }
    }
}

/// Plain values of the whole world.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldState {
    pub tick: u32,
    pub time_of_day: f32,
    pub flags: Flags8,
    pub players: BTreeMap<u32, PlayerState>,
}

#[derive(Debug, Clone, Copy)]
struct PlayerFields {
    x: PrimitiveField<f32>,
    y: PrimitiveField<f32>,
    health: PrimitiveField<i16>,
    status: PrimitiveField<Flags8>,
    jumped: TriggerField,
}

#[derive(Debug, Clone, Copy)]
struct WorldFields {
    tick: PrimitiveField<u32>,
    time_of_day: PrimitiveField<f32>,
    flags: PrimitiveField<Flags8>,
    hits: CustomField<PendingHits>,
}

/// Handles and field tokens of the demo world on one side of a connection.
///
/// The server builds it with [`Role::Owner`], the client with
/// [`Role::Remote`]; both register fields in the same order.
#[derive(Debug)]
pub struct DemoWorld {
    connection: ConnectionId,
    role: Role,
    root: SnapshotHandle,
    fields: WorldFields,
    players: BTreeMap<u32, (SnapshotHandle, PlayerFields)>,
}

impl DemoWorld {
    /// Creates the world snapshot with delta compression requested.
    pub fn create(system: &mut SnapshotSystem, connection: ConnectionId, role: Role) -> CodecResult<Self> {
        let root = system.create_snapshot(connection, WORLD_ID, role);
        let snapshot = system.snapshot_mut(root)?;
        let fields = WorldFields {
            tick: snapshot.add_primitive(0u32)?,
            time_of_day: snapshot.add_primitive(0.0f32)?,
            flags: snapshot.add_primitive(Flags8::default())?,
            hits: snapshot.add_custom(PendingHits::with_max_per_payload(64))?,
        };
        system.enable_delta_compression(root)?;
        Ok(Self {
            connection,
            role,
            root,
            fields,
            players: BTreeMap::new(),
        })
    }

    pub const fn root(&self) -> SnapshotHandle {
        self.root
    }

    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn player_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.players.keys().copied()
    }

    pub fn player_handle(&self, player: u32) -> Option<SnapshotHandle> {
        self.players.get(&player).map(|(handle, _)| *handle)
    }

    /// Adds a player as a dynamic nested snapshot and starts its handshake
    /// if the world is already set up.
    pub fn add_player(&mut self, system: &mut SnapshotSystem, player: u32) -> CodecResult<SnapshotHandle> {
        let handle = system.create_snapshot(self.connection, player_unique_id(player), self.role);
        let snapshot = system.snapshot_mut(handle)?;
        let defaults = PlayerState::default();
        let fields = PlayerFields {
            x: snapshot.add_primitive(defaults.x)?,
            y: snapshot.add_primitive(defaults.y)?,
            health: snapshot.add_primitive(defaults.health)?,
            status: snapshot.add_primitive_never_compress(defaults.status)?,
            jumped: snapshot.add_trigger()?,
        };
        system.add_dynamic_nested(self.root, player, handle)?;
        system.enable_delta_compression(handle)?;
        if system.snapshot(self.root)?.is_setup() {
            system.setup(handle)?;
        }
        self.players.insert(player, (handle, fields));
        Ok(handle)
    }

    /// Removes a player, disposing its nested snapshot.
    pub fn remove_player(&mut self, system: &mut SnapshotSystem, player: u32) -> CodecResult<bool> {
        if self.players.remove(&player).is_none() {
            return Ok(false);
        }
        system.remove_dynamic_field(self.root, player)
    }

    /// Sets up the world and every player.
    pub fn setup(&self, system: &mut SnapshotSystem) -> CodecResult<()> {
        system.setup(self.root)?;
        for (handle, _) in self.players.values() {
            system.setup(*handle)?;
        }
        Ok(())
    }

    /// `true` once the world and every player are bound.
    pub fn is_ready(&self, system: &SnapshotSystem) -> CodecResult<bool> {
        if !system.snapshot(self.root)?.is_ready() {
            return Ok(false);
        }
        for (handle, _) in self.players.values() {
            if !system.snapshot(*handle)?.is_ready() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reads the current field values.
    pub fn read_state(&self, system: &SnapshotSystem) -> CodecResult<WorldState> {
        let world = system.snapshot(self.root)?;
        let mut state = WorldState {
            tick: world.get(self.fields.tick)?,
            time_of_day: world.get(self.fields.time_of_day)?,
            flags: world.get(self.fields.flags)?,
            players: BTreeMap::new(),
        };
        for (&player, (handle, fields)) in &self.players {
            let snapshot = system.snapshot(*handle)?;
            state.players.insert(
                player,
                PlayerState {
                    x: snapshot.get(fields.x)?,
                    y: snapshot.get(fields.y)?,
                    health: snapshot.get(fields.health)?,
                    status: snapshot.get(fields.status)?,
                },
            );
        }
        Ok(state)
    }

    /// Writes field values. Players missing from `state` are left alone.
    pub fn write_state(&self, system: &mut SnapshotSystem, state: &WorldState) -> CodecResult<()> {
        let world = system.snapshot_mut(self.root)?;
        world.set(self.fields.tick, state.tick)?;
        world.set(self.fields.time_of_day, state.time_of_day)?;
        world.set(self.fields.flags, state.flags)?;
        for (player, values) in &state.players {
            let Some((handle, fields)) = self.players.get(player) else {
                continue;
            };
            let snapshot = system.snapshot_mut(*handle)?;
            snapshot.set(fields.x, values.x)?;
            snapshot.set(fields.y, values.y)?;
            snapshot.set(fields.health, values.health)?;
            snapshot.set(fields.status, values.status)?;
        }
        Ok(())
    }

    /// Fires a player's `jumped` trigger. Unknown players are ignored.
    pub fn jump(&self, system: &mut SnapshotSystem, player: u32) -> CodecResult<()> {
        if let Some((handle, fields)) = self.players.get(&player) {
            system.snapshot_mut(*handle)?.fire(fields.jumped)?;
        }
        Ok(())
    }

    /// Takes the received jump count of every player.
    pub fn take_jumps(&self, system: &mut SnapshotSystem) -> CodecResult<BTreeMap<u32, u8>> {
        let mut jumps = BTreeMap::new();
        for (&player, (handle, fields)) in &self.players {
            let count = system.snapshot_mut(*handle)?.take_trigger(fields.jumped)?;
            if count > 0 {
                jumps.insert(player, count);
            }
        }
        Ok(jumps)
    }

    /// Queues a hit for the next world payload.
    pub fn push_hit(&self, system: &mut SnapshotSystem, hit: Hit) -> CodecResult<()> {
        system
            .snapshot_mut(self.root)?
            .custom_mut(self.fields.hits)?
            .push(hit);
        Ok(())
    }

    /// Drains hits received from the peer.
    pub fn drain_hits(&self, system: &mut SnapshotSystem) -> CodecResult<Vec<Hit>> {
        Ok(system
            .snapshot_mut(self.root)?
            .custom_mut(self.fields.hits)?
            .drain_received())
    }
}
