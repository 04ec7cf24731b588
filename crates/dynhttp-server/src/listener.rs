//! Entry point for configuration delivery.

use std::sync::Arc;

use dynhttp_config::{ConfigurationSnapshot, LifecycleError};
use dynhttp_transport::FrontDoor;
use tracing::{info, warn};

use crate::lifecycle::ServerLifecycle;

/// A rejected configuration update.
#[derive(Debug, thiserror::Error)]
#[error("configuration {pid} rejected: {source}")]
pub struct UpdateError {
    pub pid: String,
    #[source]
    pub source: LifecycleError,
}

/// Something that accepts configuration updates for one PID.
pub trait ManagedConfiguration: Send + Sync {
    fn pid(&self) -> &str;

    /// Apply an update; `None` means the configuration was removed.
    fn updated(&self, snapshot: Option<&ConfigurationSnapshot>) -> Result<(), UpdateError>;
}

/// Forwards configuration updates for one PID to the lifecycle.
pub struct ConfigurationListener<F: FrontDoor> {
    pid: String,
    lifecycle: Arc<ServerLifecycle<F>>,
}

impl<F: FrontDoor> ConfigurationListener<F> {
    pub fn new(pid: impl Into<String>, lifecycle: Arc<ServerLifecycle<F>>) -> Self {
        Self {
            pid: pid.into(),
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> &Arc<ServerLifecycle<F>> {
        &self.lifecycle
    }

    /// Apply `snapshot` synchronously. Failures are not retried.
    pub fn on_update(&self, snapshot: Option<&ConfigurationSnapshot>) -> Result<(), UpdateError> {
        if let Some(tagged) = snapshot.map(ConfigurationSnapshot::pid).filter(|p| *p != self.pid) {
            warn!("Update tagged {tagged} delivered to listener for {}", self.pid);
        }
        self.lifecycle.reconfigure(snapshot).map_err(|source| UpdateError {
            pid: self.pid.clone(),
            source,
        })
    }

    /// Final teardown: stop the server and release its workspace.
    pub fn shutdown(&self) -> Result<(), UpdateError> {
        info!("Shutting down server for {}", self.pid);
        self.lifecycle.stop().map_err(|source| UpdateError {
            pid: self.pid.clone(),
            source,
        })
    }
}

impl<F: FrontDoor> ManagedConfiguration for ConfigurationListener<F> {
    fn pid(&self) -> &str {
        &self.pid
    }

    fn updated(&self, snapshot: Option<&ConfigurationSnapshot>) -> Result<(), UpdateError> {
        self.on_update(snapshot)
    }
}
