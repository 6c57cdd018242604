//! `disk-manager` binary entry point, mirroring the teacher's
//! `agents/core/src/server.rs`: parse CLI options, init tracing, build the
//! long-lived handle, run until interrupted.

use disk_manager::config::{CliArgs, ManagerConfig};
use disk_manager::persistence::InMemoryPersistence;
use disk_manager::scope::SequentialScopeAllocator;
use disk_manager::Manager;
use std::sync::Arc;
use structopt::StructOpt;
use tracing::info;

fn init_tracing() {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli_args = CliArgs::from_args();
    info!("Using options: {:?}", &cli_args);

    let config = ManagerConfig::from(cli_args);
    // The real rocksdb-backed Persistence and raft-backed ScopeAllocator are
    // out of scope here (§1); this binary demonstrates the control plane
    // wired to its in-memory stand-ins.
    let manager = Manager::new(
        config,
        Arc::new(InMemoryPersistence::default()),
        Arc::new(SequentialScopeAllocator::default()),
    );
    manager.spawn_background_tasks().await;

    info!("disk-manager started");
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutting down");
    manager.close().await;
}
