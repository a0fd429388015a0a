// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Fires synthetic tokens at a running place over UDP.

use clap::Parser;
use tm_cli::tokengen::{build_plan, send_plan, Args};

#[tokio::main]
async fn main() {
    tm_telemetry::init_tracing();
    let args = Args::parse();
    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let plan = match build_plan(&args, now_ms) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("token-gen: {err}");
            return 1;
        }
    };

    let target = args.target;
    let noexit = args.noexit;
    if let Err(err) = send_plan(&plan, target).await {
        eprintln!("token-gen: failed to send: {err}");
        return 1;
    }
    tracing::info!(count = plan.envelopes.len(), %target, "sent tokens");

    if noexit {
        let _ = tokio::signal::ctrl_c().await;
    }
    0
}
