use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bitstream::BitWriter;
use clap::Parser;
use codec::{inbox, ConnectionId, Role, SnapshotSystem, SystemConfig};
use demo_schema::{
    DemoWorld, Hit, WorldState, STATUS_CROUCHING, STATUS_SPRINTING, WORLD_FLAG_NIGHT,
    WORLD_FLAG_RAINING,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PEER: ConnectionId = ConnectionId::new(1);
const ARENA: f32 = 500.0;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic server/client loopback over the snaprep codec"
)]
struct Cli {
    /// Number of simulated players.
    #[arg(long, default_value_t = 16)]
    players: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Drop every Nth server packet and every Nth client ack.
    #[arg(long)]
    loss_every: Option<u32>,
    /// Output directory for captures and the summary.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
    /// System configuration JSON (delta history length and limits).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Fail if p95 packet size exceeds this value.
    #[arg(long)]
    max_p95_bytes: Option<u64>,
    /// Fail if average packet size exceeds this value.
    #[arg(long)]
    max_avg_bytes: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SystemConfig::default(),
    };

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;

    let mut server = SnapshotSystem::new(config.clone());
    let mut client = SnapshotSystem::new(config.clone());
    let (transport, client_inbox) = inbox();

    let mut owner = DemoWorld::create(&mut server, PEER, Role::Owner).context("create server world")?;
    for player in 0..cli.players {
        owner
            .add_player(&mut server, player)
            .with_context(|| format!("add server player {player}"))?;
    }
    owner.setup(&mut server).context("set up server world")?;

    // the server's ids reach the client before its snapshots exist
    for (connection, event) in server.take_outgoing_events() {
        transport.control(connection, event);
    }
    let stats = client.pump(&client_inbox);
    debug!(messages = stats.messages, "handshake events stashed");

    let mut mirror = DemoWorld::create(&mut client, PEER, Role::Remote).context("create client world")?;
    for player in 0..cli.players {
        mirror
            .add_player(&mut client, player)
            .with_context(|| format!("add client player {player}"))?;
    }
    mirror.setup(&mut client).context("set up client world")?;
    if !mirror.is_ready(&client)? {
        anyhow::bail!("client world is not bound after the handshake");
    }

    let mut rng = Rng::new(cli.seed);
    let mut state = owner.read_state(&server)?;
    let mut summary = Summary::new(&cli, config.delta_history_len);
    let lost = |tick: u32, offset: u32| cli.loss_every.is_some_and(|every| every > 0 && (tick + offset) % every == 0);

    for tick in 1..=cli.ticks {
        step_world(&mut state, &mut rng, tick);
        owner.write_state(&mut server, &state)?;
        for player in owner.player_ids().collect::<Vec<_>>() {
            if rng.next_u32() % 25 == 0 {
                owner.jump(&mut server, player)?;
                summary.jumps_fired += 1;
            }
        }
        if cli.players > 1 && rng.next_u32() % 4 == 0 {
            let attacker = rng.next_u32() % cli.players;
            let target = (attacker + 1 + rng.next_u32() % (cli.players - 1)) % cli.players;
            let damage = u16::try_from(rng.range_i64(1, 30)).unwrap_or(1);
            owner.push_hit(&mut server, Hit { attacker, target, damage })?;
            summary.hits_sent += 1;
        }

        let mut writer = BitWriter::with_capacity(1024);
        server
            .write_packet(PEER, &[owner.root()], &mut writer)
            .with_context(|| format!("write packet for tick {tick}"))?;
        let packet = writer.finish();
        validate_packet(&packet, &config)?;
        if tick == 1 || tick % 100 == 0 {
            write_capture(&cli.out_dir.join(format!("packet_{tick:06}.bin")), &packet)?;
        }
        summary.push_packet(packet.len() as u64);

        if lost(tick, 0) {
            summary.packets_dropped += 1;
            debug!(tick, "server packet dropped");
        } else {
            transport.packet(PEER, packet);
            let stats = client.pump(&client_inbox);
            if stats.failures > 0 {
                anyhow::bail!("client failed to apply tick {tick}");
            }
            let seen = mirror.read_state(&client)?;
            if seen != state {
                warn!(tick, "client diverged from server");
                anyhow::bail!("client state diverged from server at tick {tick}");
            }
            summary.converged_ticks += 1;
            summary.jumps_received += mirror
                .take_jumps(&mut client)?
                .values()
                .map(|count| u64::from(*count))
                .sum::<u64>();
            summary.hits_received += mirror.drain_hits(&mut client)?.len() as u64;
        }

        let mut writer = BitWriter::new();
        let acked = client.on_outbound(PEER, &mut writer)?;
        let acks = writer.finish();
        summary.ack_bytes_total += acks.len() as u64;
        if lost(tick, 1) {
            summary.acks_dropped += 1;
        } else {
            summary.acks_applied += server
                .on_inbound(PEER, &mut bitstream::BitReader::new(&acks))
                .with_context(|| format!("apply {acked} acks at tick {tick}"))? as u64;
        }
    }

    summary.finalize();
    info!(
        avg = summary.avg_packet_bytes,
        p95 = summary.p95_packet_bytes,
        ratio = summary.compression_ratio,
        "simulation complete"
    );
    summary.assert_budgets(cli.max_p95_bytes, cli.max_avg_bytes)?;
    write_summary_json(&cli.out_dir, &summary)?;

    Ok(())
}

fn load_config(path: &Path) -> Result<SystemConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&contents).context("parse config json")
}

fn write_capture(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Every packet must decode without a schema.
fn validate_packet(bytes: &[u8], config: &SystemConfig) -> Result<()> {
    let report = tools::inspect_packet(bytes, &config.wire, &config.codec).context("inspect packet")?;
    if report.updates.len() != 1 {
        anyhow::bail!("expected one world update, found {}", report.updates.len());
    }
    Ok(())
}

fn step_world(state: &mut WorldState, rng: &mut Rng, tick: u32) {
    state.tick = tick;
    state.time_of_day = (tick % 2400) as f32 / 2400.0;
    state.flags.set(WORLD_FLAG_NIGHT, state.time_of_day > 0.75);
    if rng.next_u32() % 200 == 0 {
        let raining = state.flags.get(WORLD_FLAG_RAINING);
        state.flags.set(WORLD_FLAG_RAINING, !raining);
    }
    for player in state.players.values_mut() {
        // most players stand still on a given tick
        if rng.next_u32() % 3 == 0 {
            let dx = rng.range_i64(-20, 20) as f32 / 10.0;
            let dy = rng.range_i64(-20, 20) as f32 / 10.0;
            player.x = (player.x + dx).clamp(-ARENA, ARENA);
            player.y = (player.y + dy).clamp(-ARENA, ARENA);
        }
        if rng.next_u32() % 40 == 0 {
            player.health = (player.health - 5).max(0);
        }
        if rng.next_u32() % 60 == 0 {
            let crouching = player.status.get(STATUS_CROUCHING);
            player.status.set(STATUS_CROUCHING, !crouching);
        }
        player.status.set(STATUS_SPRINTING, rng.next_u32() % 10 == 0);
    }
}

struct Rng {
    state: u64,
}

impl Rng {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn range_i64(&mut self, min: i64, max: i64) -> i64 {
        let span = (max - min).unsigned_abs().max(1) + 1;
        let value = u64::from(self.next_u32()) % span;
        min + value as i64
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    players: u32,
    ticks: u32,
    seed: u64,
    loss_every: Option<u32>,
    delta_history_len: usize,
    packets_sent: u64,
    packets_dropped: u64,
    acks_dropped: u64,
    acks_applied: u64,
    converged_ticks: u64,
    first_packet_bytes: u64,
    bytes_total: u64,
    ack_bytes_total: u64,
    avg_packet_bytes: u64,
    p95_packet_bytes: u64,
    compression_ratio: f64,
    jumps_fired: u64,
    jumps_received: u64,
    hits_sent: u64,
    hits_received: u64,
    #[serde(skip)]
    sizes: Vec<u64>,
}

impl Summary {
    fn new(cli: &Cli, delta_history_len: usize) -> Self {
        Self {
            players: cli.players,
            ticks: cli.ticks,
            seed: cli.seed,
            loss_every: cli.loss_every,
            delta_history_len,
            packets_sent: 0,
            packets_dropped: 0,
            acks_dropped: 0,
            acks_applied: 0,
            converged_ticks: 0,
            first_packet_bytes: 0,
            bytes_total: 0,
            ack_bytes_total: 0,
            avg_packet_bytes: 0,
            p95_packet_bytes: 0,
            compression_ratio: 1.0,
            jumps_fired: 0,
            jumps_received: 0,
            hits_sent: 0,
            hits_received: 0,
            sizes: Vec::new(),
        }
    }

    fn push_packet(&mut self, bytes: u64) {
        if self.packets_sent == 0 {
            self.first_packet_bytes = bytes;
        }
        self.packets_sent += 1;
        self.bytes_total += bytes;
        self.sizes.push(bytes);
    }

    fn finalize(&mut self) {
        if self.packets_sent == 0 {
            return;
        }
        self.avg_packet_bytes = self.bytes_total / self.packets_sent;
        self.sizes.sort_unstable();
        let idx = ((self.sizes.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(self.sizes.len() - 1);
        self.p95_packet_bytes = self.sizes[idx];
        if self.first_packet_bytes > 0 {
            self.compression_ratio = self.avg_packet_bytes as f64 / self.first_packet_bytes as f64;
        }
    }

    fn assert_budgets(&self, max_p95: Option<u64>, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_p95) = max_p95 {
            if self.p95_packet_bytes > max_p95 {
                anyhow::bail!(
                    "p95 packet bytes {} exceeds budget {}",
                    self.p95_packet_bytes,
                    max_p95
                );
            }
        }
        if let Some(max_avg) = max_avg {
            if self.avg_packet_bytes > max_avg {
                anyhow::bail!(
                    "avg packet bytes {} exceeds budget {}",
                    self.avg_packet_bytes,
                    max_avg
                );
            }
        }
        Ok(())
    }
}
