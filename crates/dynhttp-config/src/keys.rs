//! Option name constants: every key a configuration snapshot may carry.
//!
//! Each constant is the exact string used as a key in the snapshot map.
//! Unknown keys are ignored by the parser.

/// All recognized option names, grouped by concern.
pub struct Keys;

impl Keys {
    // ── Plain HTTP ──────────────────────────────────────────────────────
    pub const HTTP_ENABLED: &str = "http.enabled";
    pub const HTTP_PORT: &str = "http.port";
    pub const HTTP_HOST: &str = "http.host";

    // ── HTTPS ───────────────────────────────────────────────────────────
    pub const HTTPS_ENABLED: &str = "https.enabled";
    pub const HTTPS_PORT: &str = "https.port";
    pub const HTTPS_HOST: &str = "https.host";

    // ── Thread pool ─────────────────────────────────────────────────────
    pub const HTTP_MAX_THREADS: &str = "http.maxThreads";
    pub const HTTP_MIN_THREADS: &str = "http.minThreads";

    // ── TLS ─────────────────────────────────────────────────────────────
    pub const SSL_KEYSTORE_PATH: &str = "ssl.keystore.path";
    pub const SSL_KEYSTORE_PASSWORD: &str = "ssl.keystore.password";
    pub const SSL_KEY_PASSWORD: &str = "ssl.key.password";
    pub const SSL_KEYSTORE_TYPE: &str = "ssl.keystore.type";
    pub const SSL_PROTOCOL: &str = "ssl.protocol";
    pub const SSL_WANT_CLIENT_AUTH: &str = "ssl.wantclientauth";
    pub const SSL_NEED_CLIENT_AUTH: &str = "ssl.needclientauth";

    // ── Context ─────────────────────────────────────────────────────────
    pub const CONTEXT_PATH: &str = "context.path";
    pub const CONTEXT_SESSION_INACTIVE_INTERVAL: &str = "context.sessioninactiveinterval";
    pub const HOUSEKEEPER_INTERVAL: &str = "housekeeper.interval";

    // ── Passthrough ─────────────────────────────────────────────────────
    pub const OTHER_INFO: &str = "other.info";

    /// Every key above, in declaration order.
    pub const ALL: &[&str] = &[
        Self::HTTP_ENABLED,
        Self::HTTP_PORT,
        Self::HTTP_HOST,
        Self::HTTPS_ENABLED,
        Self::HTTPS_PORT,
        Self::HTTPS_HOST,
        Self::HTTP_MAX_THREADS,
        Self::HTTP_MIN_THREADS,
        Self::SSL_KEYSTORE_PATH,
        Self::SSL_KEYSTORE_PASSWORD,
        Self::SSL_KEY_PASSWORD,
        Self::SSL_KEYSTORE_TYPE,
        Self::SSL_PROTOCOL,
        Self::SSL_WANT_CLIENT_AUTH,
        Self::SSL_NEED_CLIENT_AUTH,
        Self::CONTEXT_PATH,
        Self::CONTEXT_SESSION_INACTIVE_INTERVAL,
        Self::HOUSEKEEPER_INTERVAL,
        Self::OTHER_INFO,
    ];
}

/// Check whether a key is one the parser understands.
pub fn is_known_key(key: &str) -> bool {
    Keys::ALL.contains(&key)
}

/// Keys whose values must never be logged.
pub fn is_secret_key(key: &str) -> bool {
    key == Keys::SSL_KEYSTORE_PASSWORD || key == Keys::SSL_KEY_PASSWORD
}
