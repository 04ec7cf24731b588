//! Lifecycle error taxonomy.
//!
//! Every failure the lifecycle can report falls into one of four kinds:
//! invalid configuration, socket I/O, filesystem resources, and the
//! transport (thread pool and accept loops). Errors raised while applying a
//! configuration abort the whole transition; none are retried here.

use std::io;
use std::path::PathBuf;

/// Result alias used throughout the lifecycle crates.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// An option value is invalid, contradictory, or names unusable
    /// material (e.g. an unreadable keystore).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A listener could not be resolved or bound.
    #[error("cannot bind {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A workspace directory could not be created or deleted.
    #[error("workspace {}: {message}", path.display())]
    Resource {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The thread pool or an accept loop failed to start.
    #[error("transport error: {0}")]
    Transport(String),
}

impl LifecycleError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            addr: addr.into(),
            source,
        }
    }

    pub fn resource(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn resource_io(path: impl Into<PathBuf>, message: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
