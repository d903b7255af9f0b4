//! Deployment manifest watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::validation::validate_deployment;
use crate::manifest::{load_deployment, Deployment};
use crate::observability::metrics;
use crate::runtime::RuntimeEnv;

/// A watcher that monitors the routes manifest and build output for changes.
///
/// Every successful reload is validated against the function registry before
/// it is sent; a failed reload keeps the current deployment in place.
pub struct ManifestWatcher {
    routes_path: PathBuf,
    output_path: PathBuf,
    env: Arc<RuntimeEnv>,
    update_tx: mpsc::UnboundedSender<Deployment>,
}

impl ManifestWatcher {
    /// Create a new ManifestWatcher.
    ///
    /// Returns the watcher and a receiver for reloaded deployments.
    pub fn new(
        routes_path: &Path,
        output_path: &Path,
        env: Arc<RuntimeEnv>,
    ) -> (Self, mpsc::UnboundedReceiver<Deployment>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                routes_path: routes_path.to_path_buf(),
                output_path: output_path.to_path_buf(),
                env,
                update_tx,
            },
            update_rx,
        )
    }

    /// Load and validate both files once.
    pub fn reload(&self) -> Result<Deployment, String> {
        let deployment =
            load_deployment(&self.routes_path, &self.output_path).map_err(|e| e.to_string())?;
        validate_deployment(&deployment, self.env.functions()).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })?;
        Ok(deployment)
    }

    /// Start watching both files in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let routes_path = self.routes_path.clone();
        let output_path = self.output_path.clone();
        let tx = self.update_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Deployment change detected, reloading...");
                        match self.reload() {
                            Ok(deployment) => {
                                metrics::record_deployment_reload(true);
                                let _ = tx.send(deployment);
                            }
                            Err(e) => {
                                metrics::record_deployment_reload(false);
                                tracing::error!(
                                    "Failed to reload deployment: {}. Keeping current deployment.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&routes_path, RecursiveMode::NonRecursive)?;
        watcher.watch(&output_path, RecursiveMode::NonRecursive)?;

        tracing::info!(routes = ?routes_path, output = ?output_path, "Deployment watcher started");
        Ok(watcher)
    }
}
