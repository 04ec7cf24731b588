//! dynhttp transport layer
//!
//! Everything that touches sockets and the HTTP library:
//! - Listener construction and binding ([`ConnectorFactory`])
//! - TLS keystore loading
//! - Session storage and the housekeeping sweep
//! - The front door seam between the server and request dispatch
//! - A running server instance with its own thread pool ([`ServerInstance`])
//!
//! The lifecycle crate decides *when* these are built and torn down; this
//! crate only knows *how*.

pub mod connector;
pub mod front_door;
pub mod instance;
pub mod session;
pub mod tls;

pub use connector::{BoundListener, ConnectorFactory, ConnectorSet, ListenerInfo, SecureRedirect, TransportKind};
pub use front_door::{BoxError, DispatchContext, FrontDoor, InitParams, SESSION_COOKIE};
pub use instance::ServerInstance;
pub use session::{NoopSessionEvents, SessionEventSink, SessionStore};
