//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p tileworld_server -- [--config world.json] [--tick-hz 60] [--maps-dir maps] [--map trench]
//!
//! Flags override values read from `--config`.
//!
//! Console commands:
//!   map <name>             - Load `<maps_dir>/<name>.lvl`
//!   tile_add <x> <z>       - Place a live tile
//!   tile_remove <x> <z>    - Remove a tile
//!   neighbors <x> <z>      - Show occupied neighbours and mask
//!   arena <x> <z>          - Show the arena centre
//!   status                 - Show server status
//!   quit                   - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::{bail, Context};
use tileworld_server::{ServerState, TileServer};
use tileworld_shared::config::WorldConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<WorldConfig> {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let Some(path) = args.get(i + 1) else {
                bail!("--config needs a path");
            };
            let text = std::fs::read_to_string(path).with_context(|| format!("read config {path}"))?;
            WorldConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))?
        }
        None => WorldConfig::default(),
    };

    let mut i = 0;
    while i < args.len() {
        match (args[i].as_str(), args.get(i + 1)) {
            ("--tick-hz", Some(v)) => {
                cfg.tick_hz = v.parse().with_context(|| format!("bad --tick-hz '{v}'"))?;
                i += 2;
            }
            ("--maps-dir", Some(v)) => {
                cfg.maps_dir = v.clone();
                i += 2;
            }
            ("--map", Some(v)) => {
                cfg.startup_map = Some(v.clone());
                i += 2;
            }
            ("--config", Some(_)) => i += 2,
            _ => i += 1,
        }
    }
    if cfg.tick_hz == 0 {
        bail!("tick rate must be positive");
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(tick_hz = cfg.tick_hz, maps_dir = %cfg.maps_dir, map = ?cfg.startup_map, "Starting server");

    let mut server = TileServer::new(cfg).context("create server")?;

    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'help' for commands, 'quit' to exit.");
    println!();

    let tick_interval = server.tick_interval();
    let mut next_tick = tokio::time::Instant::now();

    while server.state() != ServerState::ShuttingDown {
        server.step(tick_interval)?;

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    info!(frames = server.clock().frame, tiles = server.world().tile_count(), "Server stopped");
    Ok(())
}
