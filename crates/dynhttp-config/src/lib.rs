//! dynhttp configuration types.
//!
//! A configuration arrives as a [`ConfigurationSnapshot`]: a flat map of
//! option names to loosely typed values, tagged with the PID of the
//! configuration that produced it. [`ServerOptions`] is the validated form
//! the lifecycle works from. This crate is the single source of truth for
//! option names, defaults and the lifecycle error taxonomy.

pub mod error;
pub mod keys;
pub mod options;
pub mod snapshot;

pub use error::{LifecycleError, LifecycleResult};
pub use keys::Keys;
pub use options::{
    ContextOptions, HttpOptions, HttpsOptions, KeystoreType, ServerOptions, ThreadPoolOptions,
    TlsOptions, TlsProtocol,
};
pub use snapshot::{ConfigValue, ConfigurationSnapshot};
