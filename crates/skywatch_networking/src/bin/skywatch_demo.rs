//! # Skywatch Demo
//!
//! Runs a sync server over synthetic circling entities and a spectator
//! against it over loopback UDP, printing what the spectator displays.
//!
//! ## Usage
//!
//! ```bash
//! skywatch_demo --config skywatch.toml --duration 30 --entities 8
//! RUST_LOG=skywatch_networking=debug skywatch_demo
//! ```

use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use skywatch_core::{Clock, EntityId, Position, SystemClock};
use skywatch_networking::{
    PositionTable, PresentationSink, SpectatorClient, SyncConfig, SyncResult, SyncServer,
};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

/// Spectator render rate.
const RENDER_HZ: u64 = 30;

/// How often an entity joins or leaves.
const CHURN_EVERY: Duration = Duration::from_secs(7);

struct Args {
    config: Option<PathBuf>,
    duration_secs: u64,
    entities: u32,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config: None,
        duration_secs: 30,
        entities: 8,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    parsed.duration_secs = args[i + 1].parse().unwrap_or(30);
                    i += 1;
                }
            }
            "--entities" | "-e" => {
                if i + 1 < args.len() {
                    parsed.entities = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: skywatch_demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>       TOML config file (default: built-in)");
                println!("  -d, --duration <SECS>     Run for N seconds then exit (default: 30)");
                println!("  -e, --entities <NUM>      Synthetic entities (default: 8)");
                println!("  -h, --help                Show this help");
                return None;
            }
            other => {
                eprintln!("ignoring unknown argument {other}");
            }
        }
        i += 1;
    }
    Some(parsed)
}

/// Where entity `id` is at `elapsed` seconds: a circle per entity.
fn orbit(id: EntityId, elapsed: f32) -> Position {
    let radius = 20.0 + 10.0 * id.0 as f32;
    let speed = 0.05 + 0.01 * id.0 as f32;
    let angle = (elapsed * speed + id.0 as f32 * 0.7) % 1.0 * TAU;
    Position::new(radius * angle.cos(), radius * angle.sin(), 100.0 + 5.0 * id.0 as f32)
}

/// Prints lifecycle events and remembers what is on screen.
#[derive(Default)]
struct ConsoleSink {
    shown: BTreeMap<EntityId, Position>,
    updates: u64,
}

impl PresentationSink for ConsoleSink {
    fn create(&mut self, id: EntityId, position: Position) {
        println!("  + {id} appears at ({:.1}, {:.1}, {:.1})", position.x, position.y, position.z);
        self.shown.insert(id, position);
    }

    fn update(&mut self, id: EntityId, position: Position) {
        self.updates += 1;
        self.shown.insert(id, position);
    }

    fn remove(&mut self, id: EntityId) {
        println!("  - {id} leaves");
        self.shown.remove(&id);
    }
}

#[tokio::main]
async fn main() -> SyncResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(args) = parse_args() else {
        return Ok(());
    };
    let config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SKYWATCH DEMO                                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!("│ Sample Period:      {} ms", config.server.sample_period_ms);
    println!("│ Bind Address:       {}", config.server.bind_address);
    println!("│ Entities:           {}", args.entities);
    println!("│ Duration:           {} seconds", args.duration_secs);
    println!("│ Interpolated Axes:  {:?}", config.spectator.interpolated_axes);
    println!();

    // World: entities circling, moved at 20Hz
    let table = PositionTable::new();
    let world_clock = SystemClock::new();
    for id in 1..=args.entities {
        table.set(EntityId(id), orbit(EntityId(id), 0.0));
    }
    let world = {
        let table = table.clone();
        let entities = args.entities;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(50));
            let mut last_churn = Duration::ZERO;
            let mut extra_present = false;
            let extra = EntityId(entities + 1);
            loop {
                interval.tick().await;
                let now = world_clock.now();
                let elapsed = now.as_secs_f32();
                for id in 1..=entities {
                    table.set(EntityId(id), orbit(EntityId(id), elapsed));
                }
                if now.saturating_sub(last_churn) >= CHURN_EVERY {
                    last_churn = now;
                    if extra_present {
                        table.remove(extra);
                    }
                    extra_present = !extra_present;
                }
                if extra_present {
                    table.set(extra, orbit(extra, elapsed));
                }
            }
        })
    };

    // Server
    let mut server = SyncServer::new(&config.server, table);
    let server_addr = server.listen(config.server.bind_address)?;
    let handle = server.spawn();

    // Spectator, always against our own server over loopback
    let mut spectator_config = config.spectator.clone();
    spectator_config.server_address = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), server_addr.port());
    let mut spectator = SpectatorClient::bind(&spectator_config)?;
    spectator.subscribe()?;

    let mut sink = ConsoleSink::default();
    let mut render = tokio::time::interval(Duration::from_millis(1000 / RENDER_HZ));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut last_status = Instant::now();

    while started.elapsed() < Duration::from_secs(args.duration_secs) {
        render.tick().await;
        if spectator.poll(&mut sink) > 0 {
            let sequence = spectator.session().read(|session| session.last_sequence().unwrap_or(0));
            println!("snapshot #{sequence} applied, {} observer(s)", handle.registry().len());
        }
        let t = spectator.render_tick(&mut sink);

        if last_status.elapsed() >= Duration::from_secs(3) {
            last_status = Instant::now();
            let progress = t.map_or_else(|| "hold".to_string(), |t| format!("{t:.2}"));
            println!(
                "┌─ SPECTATOR ({:.1}s, t = {progress}) ─────────────────────",
                started.elapsed().as_secs_f64()
            );
            for (id, pos) in &sink.shown {
                println!("│ {id:>5}  ({:>8.2}, {:>8.2}, {:>8.2})", pos.x, pos.y, pos.z);
            }
            println!("└──────────────────────────────────────────────────");
        }
    }

    spectator.unsubscribe(&mut sink)?;
    world.abort();
    let report = handle.shutdown().await.unwrap_or_default();

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    DEMO SHUTDOWN                                 ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║ Snapshots Sampled:  {:>10}", report.sampler.snapshots);
    println!("║ Read Failures:      {:>10}", report.sampler.read_failures);
    println!("║ Deliveries:         {:>10}", report.distributor.delivered);
    println!("║ Dropped:            {:>10}", report.distributor.dropped);
    println!("║ Display Updates:    {:>10}", sink.updates);
    println!("║ Fragments Received: {:>10}", spectator.transport_stats().packets_received);
    println!("╚══════════════════════════════════════════════════════════════════╝");
    Ok(())
}
