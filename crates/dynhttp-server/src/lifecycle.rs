//! The reconfiguration state machine.
//!
//! At most one server instance is live. Every transition runs under a
//! single lock, so concurrent updates are applied one after another and the
//! last one wins. A reconfigure either leaves a fully started instance
//! behind or leaves the lifecycle stopped with nothing bound and no
//! workspace on disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dynhttp_config::{ConfigurationSnapshot, LifecycleResult, ServerOptions};
use dynhttp_transport::{ConnectorFactory, FrontDoor, InitParams, ListenerInfo, ServerInstance};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::workspace::WorkspaceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Externally visible facts about the running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub pid: String,
    pub listeners: Vec<ListenerInfo>,
    pub workspace: PathBuf,
    pub context_path: String,
    pub params: InitParams,
}

impl InstanceInfo {
    pub fn listener(&self, kind: dynhttp_transport::TransportKind) -> Option<&ListenerInfo> {
        self.listeners.iter().find(|l| l.kind == kind)
    }
}

struct RunningInstance {
    instance: ServerInstance,
    info: InstanceInfo,
}

pub struct ServerLifecycle<F: FrontDoor> {
    workspaces: WorkspaceManager,
    front_door: Arc<F>,
    current: Mutex<Option<RunningInstance>>,
}

impl<F: FrontDoor> ServerLifecycle<F> {
    pub fn new(workspace_root: impl Into<PathBuf>, front_door: Arc<F>) -> Self {
        Self {
            workspaces: WorkspaceManager::new(workspace_root),
            front_door,
            current: Mutex::new(None),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspaces.root()
    }

    pub fn front_door(&self) -> &Arc<F> {
        &self.front_door
    }

    /// Bring the server in line with `snapshot`. `None` means stopped.
    pub fn reconfigure(&self, snapshot: Option<&ConfigurationSnapshot>) -> LifecycleResult<()> {
        let mut current = self.current.lock();

        if let Some(running) = current.take() {
            debug!("Stopping current instance before reconfigure");
            if let Err(e) = self.stop_instance(running) {
                warn!("Workspace cleanup failed, continuing: {e}");
            }
        }

        let Some(snapshot) = snapshot else {
            info!("No configuration, server stays stopped");
            return Ok(());
        };

        let options = ServerOptions::from_snapshot(snapshot)?;
        if !options.has_listeners() {
            info!("No listener enabled for {}, server stays stopped", options.pid);
            return Ok(());
        }

        info!("Starting server for {}", options.pid);
        let connectors = ConnectorFactory::build(&options)?;
        let workspace = self.workspaces.allocate(&options.pid)?;

        let instance = match ServerInstance::start(&options, connectors, &workspace, self.front_door.clone()) {
            Ok(instance) => instance,
            Err(e) => {
                if let Err(cleanup) = self.workspaces.release(&workspace) {
                    warn!("Workspace cleanup after failed start failed: {cleanup}");
                }
                return Err(e);
            }
        };

        let info = InstanceInfo {
            pid: options.pid.clone(),
            listeners: instance.listeners().to_vec(),
            workspace,
            context_path: options.context.path.clone(),
            params: instance.params().clone(),
        };
        info!(
            "Server running for {} ({} listener(s), workspace {})",
            info.pid,
            info.listeners.len(),
            info.workspace.display()
        );
        *current = Some(RunningInstance { instance, info });
        Ok(())
    }

    /// Stop the running instance, if any. The instance is discarded even
    /// when its workspace cannot be deleted; that failure is returned.
    pub fn stop(&self) -> LifecycleResult<()> {
        let mut current = self.current.lock();
        match current.take() {
            Some(running) => self.stop_instance(running),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.current.lock().is_some() {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    pub fn instance_info(&self) -> Option<InstanceInfo> {
        self.current.lock().as_ref().map(|r| r.info.clone())
    }

    fn stop_instance(&self, running: RunningInstance) -> LifecycleResult<()> {
        let RunningInstance { instance, info } = running;
        instance.stop();
        let released = self.workspaces.release(&info.workspace);
        info!("Server stopped for {}", info.pid);
        released
    }
}

impl<F: FrontDoor> Drop for ServerLifecycle<F> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Cleanup on drop failed: {e}");
        }
    }
}
