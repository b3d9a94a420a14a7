use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::SystemConfig;
use glob::Pattern;
use serde::Serialize;
use tools::{
    format_packet_pretty, format_payload_pretty, inspect_ack_table, inspect_control_events,
    inspect_packet, inspect_payload, inspect_update,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "snaprep-tools",
    version,
    about = "snaprep payload and packet inspection tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode captured bytes and print their structure.
    Inspect {
        /// Path to a capture file, or a directory of captures.
        path: PathBuf,
        /// What the bytes contain.
        #[arg(long, value_enum, default_value_t = CaptureKind::Packet)]
        kind: CaptureKind,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected captures.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected captures (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
        /// System configuration JSON supplying decode limits.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CaptureKind {
    /// A bare snapshot payload.
    Payload,
    /// One `[u16 id][payload]` update.
    Update,
    /// Ack table followed by updates.
    Packet,
    /// A standalone ack table.
    Acks,
    /// Handshake control events.
    Control,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            path,
            kind,
            glob,
            sort,
            limit,
            format,
            config,
        } => {
            let config = config
                .as_deref()
                .map(load_config)
                .transpose()
                .context("load config")?
                .unwrap_or_default();
            if path.is_dir() {
                let entries = collect_capture_entries(&path, glob.as_deref())?;
                let mut entries = maybe_sort_entries(entries, sort);
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    inspect_file(&entry.path, kind, format, &config)?;
                }
            } else {
                inspect_file(&path, kind, format, &config)?;
            }
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<SystemConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&contents).context("parse config json")
}

fn inspect_file(
    path: &Path,
    kind: CaptureKind,
    format: OutputFormat,
    config: &SystemConfig,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read capture {}", path.display()))?;
    debug!(path = %path.display(), len = bytes.len(), ?kind, "inspecting capture");
    let context = || format!("inspect {}", path.display());
    match kind {
        CaptureKind::Payload => {
            let report = inspect_payload(&bytes, &config.codec).with_context(context)?;
            emit(format, &report, || format_payload_pretty(&report))
        }
        CaptureKind::Update => {
            let update = inspect_update(&bytes, &config.codec).with_context(context)?;
            emit(format, &update, || {
                format!(
                    "update for snapshot {}\n{}",
                    update.snapshot_id,
                    format_payload_pretty(&update.payload)
                )
            })
        }
        CaptureKind::Packet => {
            let report =
                inspect_packet(&bytes, &config.wire, &config.codec).with_context(context)?;
            emit(format, &report, || format_packet_pretty(&report))
        }
        CaptureKind::Acks => {
            let acks = inspect_ack_table(&bytes, &config.wire).with_context(context)?;
            emit(format, &acks, || {
                acks.iter()
                    .map(|entry| format!("snapshot {}: {:?}\n", entry.snapshot_id, entry.delta_ids))
                    .collect()
            })
        }
        CaptureKind::Control => {
            let events = inspect_control_events(&bytes, &config.wire).with_context(context)?;
            emit(format, &events, || {
                events.iter().map(|event| format!("{event:?}\n")).collect()
            })
        }
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, pretty: impl FnOnce() -> String) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("serialize json")?;
            println!("{json}");
        }
        OutputFormat::Pretty => print!("{}", pretty()),
    }
    Ok(())
}

struct CaptureEntry {
    path: PathBuf,
    size: u64,
}

fn collect_capture_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<CaptureEntry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(CaptureEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn maybe_sort_entries(
    mut entries: Vec<CaptureEntry>,
    sort: Option<InspectSort>,
) -> Vec<CaptureEntry> {
    if let Some(InspectSort::Size) = sort {
        entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    }
    entries
}
