//! vctrl daemon: virtual on-screen controller layout and frame-rate
//! detection for the emulator front-end.
//!
//! The editor UI and the front-end shell talk to it over a Unix socket.

mod config;
mod dpad;
mod element;
mod error;
mod frame_detect;
mod frame_pump;
mod geometry;
mod ipc_server;
mod keys;
mod layout;
mod logging;
mod output_timing;
mod profiles;
mod sample_window;
mod store;
mod vcontroller;

use config::ConfigManager;
use error::{DaemonError, IpcError};
use frame_pump::ChannelFrameHost;
use ipc_server::DaemonState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use store::{JsonFileStore, StoreHandle};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Delay before rebinding the socket after the server fails.
const IPC_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Time the IPC task gets to wind down after a stop request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DaemonError> {
    let _log_guard = logging::init_logging().inspect_err(|e| {
        eprintln!("vctrl: cannot set up logging: {}", e);
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "vctrl daemon starting");

    let result = run_daemon().await;
    if let Err(e) = &result {
        error!("vctrl daemon stopped with error: {}", e);
    } else {
        info!("vctrl daemon stopped");
    }
    result
}

async fn run_daemon() -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let config_manager = Arc::new(ConfigManager::load_or_default(&config_path)?);
    let config = config_manager.get();
    info!(
        "Using {:?} (players: {}, dpi: {})",
        config_path, config.max_players, config.dpi
    );

    let store = JsonFileStore::open(&config.store_path)?;
    info!("Settings store at {:?}", store.path());
    let store = StoreHandle::new(store);
    let state = Arc::new(DaemonState::new(
        Arc::clone(&config_manager),
        store,
        Arc::new(ChannelFrameHost::with_priority_control()),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(serve_until_stopped(
        Arc::clone(&state),
        config.socket_path.clone(),
        stop_rx,
    ));

    wait_for_termination().await;
    info!("Stopping");

    state.cancel_detection();
    let _ = stop_tx.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
        warn!("IPC server did not stop within {:?}", SHUTDOWN_GRACE);
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut term), Ok(mut int)) => {
            tokio::select! {
                _ = term.recv() => info!("SIGTERM received"),
                _ = int.recv() => info!("SIGINT received"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot install signal handlers ({}), waiting for Ctrl+C", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl+C received");
}

/// Serve IPC until `stop` flips, rebinding the socket after failures.
async fn serve_until_stopped(
    state: Arc<DaemonState>,
    socket_path: PathBuf,
    mut stop: watch::Receiver<bool>,
) {
    while !*stop.borrow() {
        tokio::select! {
            _ = stop.changed() => {}
            result = serve_ipc(Arc::clone(&state), &socket_path) => {
                if let Err(e) = result {
                    error!("IPC server failed: {}, rebinding in {:?}", e, IPC_RESTART_DELAY);
                    tokio::select! {
                        _ = stop.changed() => {}
                        _ = tokio::time::sleep(IPC_RESTART_DELAY) => {}
                    }
                }
            }
        }
    }
    info!("IPC server stopped");
}

#[cfg(unix)]
async fn serve_ipc(state: Arc<DaemonState>, socket_path: &Path) -> Result<(), IpcError> {
    let server = ipc_server::IpcServer::new(socket_path).await?;
    info!("Listening on {:?}", server.socket_path());
    server.run(state).await
}

#[cfg(not(unix))]
async fn serve_ipc(_state: Arc<DaemonState>, _socket_path: &Path) -> Result<(), IpcError> {
    warn!("IPC server not available on this platform");
    std::future::pending::<()>().await;
    Ok(())
}
