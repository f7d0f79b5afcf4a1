//! Server implementation.
//!
//! A headless host for the tile world: it owns the entity store, runs the
//! tile-world system at a fixed tick rate and takes operator commands from the
//! console. It supports:
//! - Legacy level loading from the maps directory
//! - Live tile edits (`tile_add`, `tile_remove`)
//! - Status and neighbourhood queries
//!
//! Determinism notes:
//! - Simulation time only advances by whole fixed ticks.
//! - Console lines are applied at the start of a tick, in arrival order.

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use tileworld_shared::{
    clock::SimTime,
    config::WorldConfig,
    console::{Console, CvarFlags, CvarValue, WorldCommand},
    ecs::World,
    event::TileEvent,
    level::LevelFile,
    physics::NullSpace,
    system::{TickReport, TileWorld},
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

/// Server lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Running, no level loaded yet.
    Idle,
    /// A level is loaded (its tiles may still be trickling in).
    Running,
    /// `quit` was received; the loop should stop.
    ShuttingDown,
}

/// Tile world server.
pub struct TileServer {
    pub cfg: WorldConfig,
    pub console: Console,
    world: TileWorld<World, NullSpace>,
    clock: SimTime,
    state: ServerState,
    current_map: Option<String>,
    maps_dir: PathBuf,
    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl TileServer {
    /// Creates and initialises the server, loading `cfg.startup_map` if set.
    pub fn new(cfg: WorldConfig) -> anyhow::Result<Self> {
        let mut console = Console::new();
        Self::register_cvars(&mut console, &cfg);

        let mut world = TileWorld::builder()
            .store(World::default())
            .space(NullSpace)
            .arena_name(cfg.arena_name.clone())
            .build()?;
        let clock = SimTime::default();
        world.initialize(&clock)?;

        let mut server = Self {
            maps_dir: PathBuf::from(&cfg.maps_dir),
            cfg,
            console,
            world,
            clock,
            state: ServerState::Idle,
            current_map: None,
            console_rx: None,
        };

        if let Some(map) = server.cfg.startup_map.clone() {
            server.load_map(&map).context("load startup map")?;
        }
        Ok(server)
    }

    fn register_cvars(console: &mut Console, cfg: &WorldConfig) {
        console.register_cvar(
            "sv_tickrate",
            CvarValue::Int(i64::from(cfg.tick_hz)),
            "Server tick rate",
            CvarFlags::READ_ONLY,
        );
        console.register_cvar(
            "sv_maps_dir",
            CvarValue::String(cfg.maps_dir.clone()),
            "Directory searched by 'map'",
            CvarFlags::READ_ONLY,
        );
        console.register_cvar(
            "sv_transparent_black",
            CvarValue::Bool(cfg.transparent_black),
            "Decode black tile-set pixels as transparent",
            CvarFlags::ARCHIVE,
        );
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn current_map(&self) -> Option<&str> {
        self.current_map.as_deref()
    }

    pub fn clock(&self) -> &SimTime {
        &self.clock
    }

    pub fn world(&self) -> &TileWorld<World, NullSpace> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut TileWorld<World, NullSpace> {
        &mut self.world
    }

    /// Loads `<maps_dir>/<name>.lvl` and queues its tiles for ingestion.
    pub fn load_map(&mut self, map_name: &str) -> anyhow::Result<()> {
        let transparent_black = self
            .console
            .get_cvar("sv_transparent_black")
            .map_or(self.cfg.transparent_black, |v| v.as_bool());

        let path = self.maps_dir.join(format!("{map_name}.lvl"));
        let level = LevelFile::load(&path, transparent_black).with_context(|| format!("load map {map_name}"))?;

        if let Some(tileset) = level.tileset() {
            if !tileset.valid() {
                warn!(map = %map_name, "Level tile-set could not be decoded");
            }
        }

        let summary = self
            .world
            .ingest_legacy_map(level.grid(), level.name(), self.cfg.map_offset());
        info!(
            map = %map_name,
            records = level.records(),
            queued = summary.queued,
            spawned = summary.spawned,
            "Map loaded"
        );

        self.current_map = Some(map_name.to_string());
        self.state = ServerState::Running;
        Ok(())
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt)?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Length of one tick at the configured rate.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.cfg.tick_hz.max(1)))
    }

    /// Executes one fixed simulation step.
    pub fn step(&mut self, dt: Duration) -> anyhow::Result<TickReport> {
        self.process_console_commands();

        self.clock.advance(dt);
        let report = self.world.update(&self.clock)?;

        for event in self.world.drain_events() {
            match event {
                TileEvent::Created { coord, entity, mask } => {
                    debug!(%coord, entity = ?entity, mask, "Tile created");
                }
                TileEvent::Removed { coord, entity } => debug!(%coord, entity = ?entity, "Tile removed"),
                TileEvent::Ingested { .. } => {}
                TileEvent::IngestFailed => warn!(frame = self.clock.frame, "Map tile dropped"),
            }
        }
        if report.ingested > 0 && report.pending_jobs == 0 {
            info!(map = ?self.current_map, tiles = self.world.tile_count(), "Map ingestion complete");
        }
        Ok(report)
    }

    fn process_console_commands(&mut self) {
        let mut lines = Vec::new();
        if let Some(rx) = self.console_rx.as_mut() {
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
        }

        for line in lines {
            match self.exec_console(&line) {
                Ok(output) => {
                    for out in output {
                        println!("{out}");
                    }
                }
                Err(e) => println!("{e:#}"),
            }
        }
    }

    /// Executes a console command line.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let Some(cmd) = WorldCommand::parse(line)? else {
            return self.console.exec(line);
        };

        let out = match cmd {
            WorldCommand::Map(name) => match self.load_map(&name) {
                Ok(()) => vec![format!("Map '{name}' loaded, {} tiles queued", self.world.pending_jobs())],
                Err(e) => vec![format!("Failed to load map: {e:#}")],
            },
            WorldCommand::TileAdd { x, z } => {
                let coord = self.world.request_creation(x, z)?;
                vec![format!("Tile at {coord} queued")]
            }
            WorldCommand::TileRemove { x, z } => {
                let coord = self.world.request_removal(x, z)?;
                vec![format!("Removal at {coord} queued")]
            }
            WorldCommand::Neighbors { x, z } => {
                let neighbors: Vec<String> = self.world.neighbors(x, z).iter().map(ToString::to_string).collect();
                let mask = self
                    .world
                    .variant(x, z)
                    .map_or_else(|| "-".to_string(), |m| m.to_string());
                vec![format!("Neighbors: [{}] mask: {mask}", neighbors.join(", "))]
            }
            WorldCommand::Arena { x, z } => {
                let c = self.world.center_of_arena(x, z);
                vec![format!("Arena centre: ({}, {}, {})", c.x, c.y, c.z)]
            }
            WorldCommand::Status => {
                let (removals, creations) = self.world.pending_requests();
                vec![
                    format!("Server state: {:?}", self.state),
                    format!("Frame: {}", self.clock.frame),
                    format!("Map: {}", self.current_map.as_deref().unwrap_or("-")),
                    format!("Tiles: {}", self.world.tile_count()),
                    format!("Pending jobs: {}", self.world.pending_jobs()),
                    format!("Pending edits: {removals} removals, {creations} creations"),
                ]
            }
            WorldCommand::Quit => {
                info!("Server shutting down");
                self.state = ServerState::ShuttingDown;
                vec!["Shutting down".to_string()]
            }
        };
        Ok(out)
    }
}

/// Helper for tests: a server at `tick_hz` reading levels from `maps_dir`.
pub fn with_maps_dir(tick_hz: u32, maps_dir: impl Into<String>) -> anyhow::Result<TileServer> {
    TileServer::new(WorldConfig {
        tick_hz,
        maps_dir: maps_dir.into(),
        ..Default::default()
    })
}
