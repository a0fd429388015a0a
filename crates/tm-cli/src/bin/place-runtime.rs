// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Starts a single place's `PlaceHost` from a deploy-time config and
//! routing table, and runs it until `SIGINT`/`SIGTERM`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tm_cli::deploy::{load_routing_table, resolver_from_places};
use tm_core::TransitionKind;
use tm_dispatcher::{EchoHandler, TracingSink};
use tm_host::PlaceHost;

#[derive(Parser, Debug)]
#[command(name = "place-runtime", about = "Run one place until SIGINT/SIGTERM")]
struct Args {
    /// Path to a `MeshConfig` TOML file. Defaults to built-in defaults if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path to a routing-table TOML file.
    #[arg(long)]
    routes: PathBuf,
    /// Name of the place (key into `[places]`) this process serves.
    #[arg(long)]
    place: String,
}

#[tokio::main]
async fn main() {
    tm_telemetry::init_tracing();
    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let config = match tm_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("place-runtime: failed to load config: {err}");
            return 1;
        }
    };
    if let Err(err) = tm_config::validate_config(&config) {
        eprintln!("place-runtime: invalid config: {err}");
        return 1;
    }

    let routing_table = match load_routing_table(&args.routes) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("place-runtime: failed to load routing table: {err}");
            return 1;
        }
    };

    let Some(place_config) = config.places.get(&args.place) else {
        eprintln!("place-runtime: no place named '{}' in config", args.place);
        return 1;
    };

    let expected_join_branches = routing_table
        .values()
        .flatten()
        .find(|arc| arc.kind == TransitionKind::Join && arc.target_place == args.place)
        .and_then(|arc| arc.fan);

    let resolver = Arc::new(resolver_from_places(&config));
    let remote_mode = config.reactor.remote_host.is_some();

    let host = match PlaceHost::spawn(
        place_config,
        &config.reactor,
        remote_mode,
        routing_table,
        resolver,
        Arc::new(EchoHandler),
        Arc::new(TracingSink),
        expected_join_branches,
    )
    .await
    {
        Ok(host) => host,
        Err(err) => {
            eprintln!("place-runtime: failed to start: {err}");
            return 1;
        }
    };

    tracing::info!(place = %args.place, addr = %host.local_addr(), "place started");

    wait_for_shutdown_signal().await;
    tracing::info!(place = %args.place, "shutdown signal received");
    host.shutdown().await;
    0
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
