// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Registry, load_registry};
use crate::engine::DaemonEvent;
use crate::engine::dispatcher::Dispatcher;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Async shell around the dispatcher.
///
/// Starts every enabled project from the initial registry snapshot, then
/// reacts to `DaemonEvent`s: a reload replaces the registry snapshot and
/// reconciles; a shutdown (or a closed channel) stops everything gracefully.
pub struct Runtime {
    dispatcher: Dispatcher,
    registry: Registry,
    registry_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    event_rx: mpsc::Receiver<DaemonEvent>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("dispatcher", &self.dispatcher)
            .field("registry_path", &self.registry_path)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        dispatcher: Dispatcher,
        registry: Registry,
        registry_path: PathBuf,
        fs: Arc<dyn FileSystem>,
        event_rx: mpsc::Receiver<DaemonEvent>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            registry_path,
            fs,
            event_rx,
        }
    }

    /// Main event loop. Returns an error only when startup is impossible.
    pub async fn run(mut self) -> Result<()> {
        info!("taskmon runtime started");

        let report = self.dispatcher.start(&self.registry).await?;
        info!(
            started = ?report.started,
            failed = report.failed.len(),
            "projects started"
        );

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            match event {
                DaemonEvent::ReloadRequested => self.reload().await,
                DaemonEvent::ShutdownRequested => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.dispatcher.shutdown().await;
        info!("runtime exiting");
        Ok(())
    }

    async fn reload(&mut self) {
        let registry = match load_registry(self.fs.as_ref(), &self.registry_path) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(
                    path = %self.registry_path.display(),
                    error = %err,
                    "registry reload failed; keeping previous snapshot"
                );
                return;
            }
        };

        let report = self.dispatcher.reconcile(&registry).await;
        self.registry = registry;
        info!(
            started = ?report.started,
            stopped = ?report.stopped,
            failed = report.failed.len(),
            "registry reloaded"
        );
    }
}
