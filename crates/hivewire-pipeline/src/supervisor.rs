//! Component lifecycle.
//!
//! Each long-running loop (perception, workers, judges) runs as an
//! independent tokio task owned by the supervisor. Shutdown is cooperative:
//! flip the watch signal so loops stop taking leases, give in-flight work a
//! grace period, then abort whatever remains. Leases still held at abort
//! expire on their own and redeliver, so no work is lost.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// The signal components watch between leases.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Track a spawned component loop under a display name.
    pub fn register(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.handles.push((name.into(), handle));
    }

    pub fn component_count(&self) -> usize {
        self.handles.len()
    }

    /// Cooperative shutdown: signal, wait up to `grace` per component, then
    /// abort stragglers.
    pub async fn shutdown(mut self, grace: Duration) {
        info!(components = self.handles.len(), "supervisor shutting down");
        let _ = self.shutdown_tx.send(true);

        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!(component = %name, "stopped cleanly"),
                Ok(Err(err)) => warn!(component = %name, %err, "stopped with panic"),
                Err(_) => {
                    warn!(component = %name, "grace period elapsed, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
