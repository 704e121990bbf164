//! Shutdown and checkpoint signals.
//!
//! One task owns the signal streams: SIGINT and SIGTERM set the
//! termination flag that stops the dispatcher, SIGUSR1 checkpoints the
//! registry. Workers are never signalled; they observe peer closure.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::{Server, CHECKPOINT_PATH};

pub(crate) async fn run(server: Arc<Server>, shutdown: Arc<watch::Sender<bool>>) {
    if let Err(err) = watch_signals(&server, &shutdown).await {
        log::error!("signal handler failed: {err}");
        shutdown.send_replace(true);
    }
}

async fn watch_signals(server: &Server, shutdown: &watch::Sender<bool>) -> io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut checkpoint = signal(SignalKind::user_defined1())?;
    let mut stopping = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                log::info!("SIGINT: shutting down");
                shutdown.send_replace(true);
                return Ok(());
            }
            _ = terminate.recv() => {
                log::info!("SIGTERM: shutting down");
                shutdown.send_replace(true);
                return Ok(());
            }
            _ = checkpoint.recv() => {
                match write_checkpoint(server, Path::new(CHECKPOINT_PATH)).await {
                    Ok(count) => {
                        log::info!("SIGUSR1: checkpointed {count} users to {CHECKPOINT_PATH}")
                    }
                    Err(err) => log::error!("checkpoint failed: {err}"),
                }
            }
            _ = stopping.changed() => return Ok(()),
        }
    }
}

/// Serialize the registry under a short read lock, then swap the rendered
/// file into place so a reader never sees a partial checkpoint.
pub(crate) async fn write_checkpoint(server: &Server, path: &Path) -> io::Result<usize> {
    let mut rendered = Vec::new();
    let count = server.registry().read().await.store(&mut rendered)?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    tokio::fs::write(&staging, &rendered).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(count)
}
