//! Validated server options.
//!
//! [`ServerOptions::from_snapshot`] is a pure function: it never touches the
//! network, and only consults the filesystem to make a relative keystore
//! path absolute. Every contradiction is rejected here, before the
//! lifecycle allocates anything.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{LifecycleError, LifecycleResult};
use crate::keys::Keys;
use crate::snapshot::ConfigurationSnapshot;

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;
pub const DEFAULT_MAX_THREADS: i64 = 200;
pub const DEFAULT_MIN_THREADS: i64 = 8;
pub const DEFAULT_CONTEXT_PATH: &str = "/";
pub const DEFAULT_KEYSTORE_TYPE: &str = "PKCS12";
pub const DEFAULT_TLS_PROTOCOL: &str = "TLS";
pub const DEFAULT_HOUSEKEEPER_INTERVAL_SECS: i64 = 600;

/// Idle timeout applied to the plain listener. Not configurable.
pub const PLAIN_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain HTTP listener options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Host to bind; `None` binds all interfaces.
    pub host: Option<String>,
    pub port: u16,
    pub idle_timeout: Duration,
    /// Port of the HTTPS listener when one is enabled alongside, so plain
    /// requests can be redirected to an absolute `https://` URL.
    pub secure_port: Option<u16>,
}

/// HTTPS listener options.
#[derive(Debug)]
pub struct HttpsOptions {
    pub host: Option<String>,
    pub port: u16,
    pub tls: TlsOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreType {
    Pkcs12,
    Pem,
}

impl KeystoreType {
    pub fn parse(value: &str) -> LifecycleResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PKCS12" | "P12" => Ok(Self::Pkcs12),
            "PEM" => Ok(Self::Pem),
            other => Err(LifecycleError::configuration(format!(
                "unsupported {}: {other}",
                Keys::SSL_KEYSTORE_TYPE
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsProtocol {
    /// TLS 1.2 and 1.3.
    Tls,
    Tls12,
    Tls13,
}

impl TlsProtocol {
    pub fn parse(value: &str) -> LifecycleResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TLS" => Ok(Self::Tls),
            "TLSV1.2" => Ok(Self::Tls12),
            "TLSV1.3" => Ok(Self::Tls13),
            other => Err(LifecycleError::configuration(format!(
                "unsupported {}: {other}",
                Keys::SSL_PROTOCOL
            ))),
        }
    }
}

/// Keystore material reference and handshake flags for the TLS listener.
#[derive(Debug)]
pub struct TlsOptions {
    /// Always absolute.
    pub keystore_path: PathBuf,
    pub keystore_password: Option<SecretString>,
    pub key_password: Option<SecretString>,
    pub keystore_type: KeystoreType,
    pub protocol: TlsProtocol,
    pub want_client_auth: bool,
    pub need_client_auth: bool,
}

/// Bounds of the per-instance request thread pool.
///
/// Tokio starts its workers up front, so an instance runs `max_threads`
/// request workers from the start and caps blocking work at the same
/// bound. `min_threads` is validated against `max_threads` but does not
/// shrink the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPoolOptions {
    pub min_threads: usize,
    pub max_threads: usize,
}

/// Request context: mount point and session policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Normalized: starts with `/`, no trailing `/` unless it is the root.
    pub path: String,
    /// `None` means sessions never expire.
    pub session_max_inactive: Option<Duration>,
    /// `None` disables the housekeeping sweep.
    pub housekeeper_interval: Option<Duration>,
}

/// Everything a server instance is built from.
#[derive(Debug)]
pub struct ServerOptions {
    pub pid: String,
    pub http: Option<HttpOptions>,
    pub https: Option<HttpsOptions>,
    pub threads: ThreadPoolOptions,
    pub context: ContextOptions,
    pub other_info: Option<String>,
}

impl ServerOptions {
    pub fn from_snapshot(snapshot: &ConfigurationSnapshot) -> LifecycleResult<Self> {
        let threads = thread_pool(snapshot)?;
        let context = context(snapshot)?;

        let https = if snapshot.get_bool(Keys::HTTPS_ENABLED, false) {
            Some(HttpsOptions {
                host: host(snapshot, Keys::HTTPS_HOST),
                port: port(snapshot, Keys::HTTPS_PORT, DEFAULT_HTTPS_PORT)?,
                tls: tls(snapshot)?,
            })
        } else {
            None
        };

        let http = if snapshot.get_bool(Keys::HTTP_ENABLED, true) {
            Some(HttpOptions {
                host: host(snapshot, Keys::HTTP_HOST),
                port: port(snapshot, Keys::HTTP_PORT, DEFAULT_HTTP_PORT)?,
                idle_timeout: PLAIN_IDLE_TIMEOUT,
                secure_port: https.as_ref().map(|s| s.port),
            })
        } else {
            None
        };

        Ok(Self {
            pid: snapshot.pid().to_string(),
            http,
            https,
            threads,
            context,
            other_info: snapshot.get_string(Keys::OTHER_INFO),
        })
    }

    /// Whether at least one listener is enabled.
    pub fn has_listeners(&self) -> bool {
        self.http.is_some() || self.https.is_some()
    }
}

fn host(snapshot: &ConfigurationSnapshot, key: &str) -> Option<String> {
    snapshot
        .get_string(key)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn port(snapshot: &ConfigurationSnapshot, key: &str, fallback: u16) -> LifecycleResult<u16> {
    match snapshot.get_int_opt(key) {
        // Negative means unset.
        None => Ok(fallback),
        Some(p) if p < 0 => Ok(fallback),
        Some(p) => u16::try_from(p)
            .map_err(|_| LifecycleError::configuration(format!("{key} out of range: {p}"))),
    }
}

fn thread_pool(snapshot: &ConfigurationSnapshot) -> LifecycleResult<ThreadPoolOptions> {
    let max = snapshot.get_int(Keys::HTTP_MAX_THREADS, DEFAULT_MAX_THREADS);
    let min = snapshot.get_int(Keys::HTTP_MIN_THREADS, DEFAULT_MIN_THREADS);

    if min < 1 {
        return Err(LifecycleError::configuration(format!(
            "{} must be at least 1, got {min}",
            Keys::HTTP_MIN_THREADS
        )));
    }
    if min > max {
        return Err(LifecycleError::configuration(format!(
            "{} ({min}) exceeds {} ({max})",
            Keys::HTTP_MIN_THREADS,
            Keys::HTTP_MAX_THREADS
        )));
    }

    let to_usize = |v: i64, key: &str| {
        usize::try_from(v)
            .map_err(|_| LifecycleError::configuration(format!("{key} out of range: {v}")))
    };
    Ok(ThreadPoolOptions {
        min_threads: to_usize(min, Keys::HTTP_MIN_THREADS)?,
        max_threads: to_usize(max, Keys::HTTP_MAX_THREADS)?,
    })
}

fn context(snapshot: &ConfigurationSnapshot) -> LifecycleResult<ContextOptions> {
    let raw = snapshot
        .get_string(Keys::CONTEXT_PATH)
        .unwrap_or_else(|| DEFAULT_CONTEXT_PATH.to_string());
    let path = normalize_context_path(&raw)?;

    let positive_secs = |v: i64| u64::try_from(v).ok().filter(|s| *s > 0).map(Duration::from_secs);

    Ok(ContextOptions {
        path,
        session_max_inactive: positive_secs(snapshot.get_int(Keys::CONTEXT_SESSION_INACTIVE_INTERVAL, -1)),
        housekeeper_interval: positive_secs(
            snapshot.get_int(Keys::HOUSEKEEPER_INTERVAL, DEFAULT_HOUSEKEEPER_INTERVAL_SECS),
        ),
    })
}

/// `""` and `"/"` are the root; otherwise the path must start with `/` and
/// loses any trailing slashes.
pub fn normalize_context_path(raw: &str) -> LifecycleResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Ok("/".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err(LifecycleError::configuration(format!(
            "{} must start with '/': {trimmed}",
            Keys::CONTEXT_PATH
        )));
    }
    if trimmed.contains(['*', '?', '#']) {
        return Err(LifecycleError::configuration(format!(
            "{} must be a plain path: {trimmed}",
            Keys::CONTEXT_PATH
        )));
    }
    let stripped = trimmed.trim_end_matches('/');
    Ok(if stripped.is_empty() { "/".to_string() } else { stripped.to_string() })
}

fn tls(snapshot: &ConfigurationSnapshot) -> LifecycleResult<TlsOptions> {
    let path = snapshot.get_string(Keys::SSL_KEYSTORE_PATH).ok_or_else(|| {
        LifecycleError::configuration(format!(
            "{} is enabled but {} is not set",
            Keys::HTTPS_ENABLED,
            Keys::SSL_KEYSTORE_PATH
        ))
    })?;

    let keystore_type = KeystoreType::parse(
        &snapshot
            .get_string(Keys::SSL_KEYSTORE_TYPE)
            .unwrap_or_else(|| DEFAULT_KEYSTORE_TYPE.to_string()),
    )?;
    let protocol = TlsProtocol::parse(
        &snapshot
            .get_string(Keys::SSL_PROTOCOL)
            .unwrap_or_else(|| DEFAULT_TLS_PROTOCOL.to_string()),
    )?;

    Ok(TlsOptions {
        keystore_path: absolute(Path::new(&path))?,
        keystore_password: snapshot.get_string(Keys::SSL_KEYSTORE_PASSWORD).map(SecretString::from),
        key_password: snapshot.get_string(Keys::SSL_KEY_PASSWORD).map(SecretString::from),
        keystore_type,
        protocol,
        want_client_auth: snapshot.get_bool(Keys::SSL_WANT_CLIENT_AUTH, false),
        need_client_auth: snapshot.get_bool(Keys::SSL_NEED_CLIENT_AUTH, false),
    })
}

fn absolute(path: &Path) -> LifecycleResult<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        LifecycleError::configuration(format!(
            "cannot resolve {} {}: {e}",
            Keys::SSL_KEYSTORE_PATH,
            path.display()
        ))
    })
}
