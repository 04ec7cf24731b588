//! Listener construction.
//!
//! [`ConnectorFactory::build`] turns validated options into bound sockets.
//! TLS material is loaded before anything is bound, and the TLS socket is
//! bound before the plain one so the plain listener can be annotated with
//! the resolved secure port. If any step fails, every socket bound so far
//! is dropped (and therefore closed) before the error is returned.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use dynhttp_config::{LifecycleError, LifecycleResult, ServerOptions};
use rustls::ServerConfig;
use tracing::debug;

use crate::tls;

/// Host bound when none is configured.
const ALL_INTERFACES: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Tls,
}

impl TransportKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

/// Where plain requests should be sent when they need a secure channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureRedirect {
    pub scheme: &'static str,
    pub port: u16,
}

/// Immutable, post-bind description of one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub kind: TransportKind,
    /// The configured host, if any.
    pub host: Option<String>,
    /// The resolved local address; never port 0.
    pub local_addr: SocketAddr,
    pub idle_timeout: Option<Duration>,
    pub secure_redirect: Option<SecureRedirect>,
}

impl ListenerInfo {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Host to advertise: the configured one, else the bound IP (loopback
    /// when bound to all interfaces).
    pub fn advertised_host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        let ip = self.local_addr.ip();
        if ip.is_unspecified() {
            "localhost".to_string()
        } else {
            ip.to_string()
        }
    }

    pub fn base_url(&self) -> String {
        let host = self.advertised_host();
        if host.contains(':') {
            format!("{}://[{host}]:{}", self.kind.scheme(), self.port())
        } else {
            format!("{}://{host}:{}", self.kind.scheme(), self.port())
        }
    }
}

/// A bound socket plus everything needed to serve on it.
pub struct BoundListener {
    info: ListenerInfo,
    listener: TcpListener,
    tls: Option<Arc<ServerConfig>>,
}

impl BoundListener {
    pub fn info(&self) -> &ListenerInfo {
        &self.info
    }

    pub(crate) fn into_parts(self) -> (ListenerInfo, TcpListener, Option<Arc<ServerConfig>>) {
        (self.info, self.listener, self.tls)
    }
}

impl std::fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundListener").field("info", &self.info).finish_non_exhaustive()
    }
}

/// At most one plain and one TLS listener.
#[derive(Debug, Default)]
pub struct ConnectorSet {
    pub plain: Option<BoundListener>,
    pub tls: Option<BoundListener>,
}

impl ConnectorSet {
    pub fn is_empty(&self) -> bool {
        self.plain.is_none() && self.tls.is_none()
    }

    pub fn infos(&self) -> Vec<ListenerInfo> {
        self.iter().map(|l| l.info.clone()).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &BoundListener> {
        self.plain.iter().chain(self.tls.iter())
    }

    pub(crate) fn into_vec(self) -> Vec<BoundListener> {
        self.plain.into_iter().chain(self.tls).collect()
    }
}

/// Builds the listener set for a configuration. Stateless.
pub struct ConnectorFactory;

impl ConnectorFactory {
    pub fn build(options: &ServerOptions) -> LifecycleResult<ConnectorSet> {
        let tls_config = match &options.https {
            Some(https) => Some(tls::server_config(&https.tls)?),
            None => None,
        };

        let tls = match (&options.https, tls_config) {
            (Some(https), Some(config)) => {
                let listener = bind(https.host.as_deref(), https.port)?;
                let local_addr = local_addr(&listener, https.host.as_deref(), https.port)?;
                Some(BoundListener {
                    info: ListenerInfo {
                        kind: TransportKind::Tls,
                        host: https.host.clone(),
                        local_addr,
                        idle_timeout: None,
                        secure_redirect: None,
                    },
                    listener,
                    tls: Some(config),
                })
            }
            _ => None,
        };

        let plain = match &options.http {
            Some(http) => {
                let listener = bind(http.host.as_deref(), http.port)?;
                let local_addr = local_addr(&listener, http.host.as_deref(), http.port)?;
                let secure_port = tls.as_ref().map(|t| t.info.port()).or(http.secure_port);
                Some(BoundListener {
                    info: ListenerInfo {
                        kind: TransportKind::Plain,
                        host: http.host.clone(),
                        local_addr,
                        idle_timeout: Some(http.idle_timeout),
                        secure_redirect: secure_port.map(|port| SecureRedirect {
                            scheme: TransportKind::Tls.scheme(),
                            port,
                        }),
                    },
                    listener,
                    tls: None,
                })
            }
            None => None,
        };

        Ok(ConnectorSet { plain, tls })
    }
}

fn bind(host: Option<&str>, port: u16) -> LifecycleResult<TcpListener> {
    let host = host.unwrap_or(ALL_INTERFACES);
    let label = format!("{host}:{port}");

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| LifecycleError::io(&label, e))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener
                    .set_nonblocking(true)
                    .map_err(|e| LifecycleError::io(&label, e))?;
                debug!("Bound {label} ({addr})");
                return Ok(listener);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(LifecycleError::io(
        label,
        last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no address")),
    ))
}

fn local_addr(listener: &TcpListener, host: Option<&str>, port: u16) -> LifecycleResult<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| LifecycleError::io(format!("{}:{port}", host.unwrap_or(ALL_INTERFACES)), e))
}
