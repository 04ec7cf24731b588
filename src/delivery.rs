//! File-based configuration delivery.
//!
//! The configuration is a JSON object in a single file. It is delivered
//! once at start and again whenever the file changes. A missing or empty
//! file, or one containing `null`, delivers "no configuration". A file that
//! does not parse is logged and ignored until it changes again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use dynhttp_config::ConfigurationSnapshot;
use dynhttp_server::ManagedConfiguration;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

/// Quiet period before a burst of file events is acted on.
const DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct FileConfigurationSource {
    path: PathBuf,
    pid: String,
}

impl FileConfigurationSource {
    pub fn new(path: impl Into<PathBuf>, pid: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pid: pid.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file as it is now.
    pub fn load(&self) -> anyhow::Result<Option<ConfigurationSnapshot>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("cannot read {}", self.path.display())),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
        ConfigurationSnapshot::from_json(self.pid.clone(), json)
            .with_context(|| format!("{} is not a flat object of options", self.path.display()))
    }

    /// Load the file and hand the result to `target`. Nothing is delivered
    /// when the file cannot be parsed.
    pub fn deliver<M: ManagedConfiguration + ?Sized>(&self, target: &M) {
        let snapshot = match self.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Ignoring configuration: {e:#}");
                return;
            }
        };
        match target.updated(snapshot.as_ref()) {
            Ok(()) if snapshot.is_some() => info!("Configuration {} applied", target.pid()),
            Ok(()) => info!("Configuration {} removed", target.pid()),
            Err(e) => error!("{e}"),
        }
    }

    /// Deliver now, then watch the file and redeliver on every change.
    pub fn spawn<M: ManagedConfiguration + 'static>(self, target: Arc<M>) -> anyhow::Result<SourceHandle> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("cannot create file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("cannot watch {}", dir.display()))?;
        info!("Watching {}", self.path.display());

        let thread = std::thread::Builder::new()
            .name("dynhttp-config".into())
            .spawn(move || {
                self.deliver(target.as_ref());
                self.watch_loop(&rx, target.as_ref());
            })
            .context("cannot start configuration thread")?;

        Ok(SourceHandle {
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }

    fn watch_loop<M: ManagedConfiguration + ?Sized>(&self, rx: &Receiver<notify::Result<Event>>, target: &M) {
        while let Ok(event) = rx.recv() {
            match event {
                Ok(event) if self.concerns(&event) => {
                    // Let the burst settle.
                    loop {
                        match rx.recv_timeout(DEBOUNCE) {
                            Ok(_) => continue,
                            Err(RecvTimeoutError::Timeout) => break,
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    debug!("{} changed", self.path.display());
                    self.deliver(target);
                }
                Ok(_) => {}
                Err(e) => warn!("File watch error: {e}"),
            }
        }
    }

    fn concerns(&self, event: &Event) -> bool {
        let Some(name) = self.path.file_name() else {
            return false;
        };
        event.paths.iter().any(|p| p.file_name() == Some(name))
    }
}

/// Keeps the watcher alive; [`SourceHandle::stop`] ends delivery.
pub struct SourceHandle {
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl SourceHandle {
    /// Stop watching and wait for any in-progress delivery to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher closes the channel, which ends the loop.
        drop(self.watcher.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Configuration thread panicked");
            }
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
