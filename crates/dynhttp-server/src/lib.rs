//! dynhttp server lifecycle.
//!
//! Owns the single live server instance and applies configuration changes
//! to it. [`ConfigurationListener`] is the entry point for configuration
//! delivery; [`ServerLifecycle`] does the work; [`WorkspaceManager`] hands
//! out the per-instance scratch directories.

pub mod lifecycle;
pub mod listener;
pub mod workspace;

pub use lifecycle::{InstanceInfo, LifecycleState, ServerLifecycle};
pub use listener::{ConfigurationListener, ManagedConfiguration, UpdateError};
pub use workspace::WorkspaceManager;
