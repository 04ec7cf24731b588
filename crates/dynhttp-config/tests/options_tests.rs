//! Option parsing tests: defaults, fallbacks, and rejected configurations.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dynhttp_config::options::{normalize_context_path, PLAIN_IDLE_TIMEOUT};
    use dynhttp_config::*;
    use secrecy::ExposeSecret;

    fn snapshot() -> ConfigurationSnapshot {
        ConfigurationSnapshot::new("test.pid")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Defaults
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn empty_snapshot_uses_defaults() {
        let opts = ServerOptions::from_snapshot(&snapshot()).unwrap();
        let http = opts.http.as_ref().expect("plain listener is enabled by default");
        assert_eq!(http.port, 80);
        assert_eq!(http.host, None);
        assert_eq!(http.idle_timeout, PLAIN_IDLE_TIMEOUT);
        assert_eq!(http.secure_port, None);
        assert!(opts.https.is_none());
        assert_eq!(opts.threads.min_threads, 8);
        assert_eq!(opts.threads.max_threads, 200);
        assert_eq!(opts.context.path, "/");
        assert_eq!(opts.context.session_max_inactive, None);
        assert_eq!(opts.context.housekeeper_interval, Some(Duration::from_secs(600)));
        assert_eq!(opts.pid, "test.pid");
        assert!(opts.has_listeners());
    }

    #[test]
    fn explicit_zero_port_is_kept() {
        let opts = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_PORT, 0)).unwrap();
        assert_eq!(opts.http.unwrap().port, 0);
    }

    #[test]
    fn both_listeners_disabled() {
        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTP_ENABLED, false)
                .with(Keys::HTTPS_ENABLED, false),
        )
        .unwrap();
        assert!(!opts.has_listeners());
    }

    #[test]
    fn blank_host_means_all_interfaces() {
        let opts = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_HOST, "  ")).unwrap();
        assert_eq!(opts.http.unwrap().host, None);
    }

    #[test]
    fn other_info_passes_through() {
        let opts = ServerOptions::from_snapshot(&snapshot().with(Keys::OTHER_INFO, "opaque")).unwrap();
        assert_eq!(opts.other_info.as_deref(), Some("opaque"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // HTTPS
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn https_defaults_and_secure_port_annotation() {
        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTPS_ENABLED, true)
                .with(Keys::SSL_KEYSTORE_PATH, "/ks.p12")
                .with(Keys::SSL_KEYSTORE_PASSWORD, "pw"),
        )
        .unwrap();
        let https = opts.https.unwrap();
        assert_eq!(https.port, 443);
        assert_eq!(https.tls.keystore_type, KeystoreType::Pkcs12);
        assert_eq!(https.tls.protocol, TlsProtocol::Tls);
        assert!(!https.tls.want_client_auth);
        assert!(!https.tls.need_client_auth);
        assert_eq!(
            https.tls.keystore_password.as_ref().map(|p| p.expose_secret().to_string()),
            Some("pw".to_string())
        );
        assert_eq!(opts.http.unwrap().secure_port, Some(443));
    }

    #[test]
    fn https_port_annotates_plain_listener() {
        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTPS_ENABLED, true)
                .with(Keys::HTTPS_PORT, 8443)
                .with(Keys::SSL_KEYSTORE_PATH, "/ks.pem")
                .with(Keys::SSL_KEYSTORE_TYPE, "pem"),
        )
        .unwrap();
        assert_eq!(opts.http.unwrap().secure_port, Some(8443));
        assert_eq!(opts.https.unwrap().tls.keystore_type, KeystoreType::Pem);
    }

    #[test]
    fn relative_keystore_path_is_made_absolute() {
        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTPS_ENABLED, true)
                .with(Keys::SSL_KEYSTORE_PATH, "conf/ks.p12"),
        )
        .unwrap();
        let path = opts.https.unwrap().tls.keystore_path;
        assert!(path.is_absolute());
        assert!(path.ends_with("conf/ks.p12"));
    }

    #[test]
    fn https_without_keystore_is_rejected() {
        let err = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTPS_ENABLED, true)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_keystore_type_is_rejected() {
        let err = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTPS_ENABLED, true)
                .with(Keys::SSL_KEYSTORE_PATH, "/ks")
                .with(Keys::SSL_KEYSTORE_TYPE, "JKS"),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn protocols() {
        assert_eq!(TlsProtocol::parse("TLS").unwrap(), TlsProtocol::Tls);
        assert_eq!(TlsProtocol::parse("TLSv1.2").unwrap(), TlsProtocol::Tls12);
        assert_eq!(TlsProtocol::parse("tlsv1.3").unwrap(), TlsProtocol::Tls13);
        assert!(TlsProtocol::parse("SSLv3").unwrap_err().is_configuration());
    }

    #[test]
    fn tls_options_ignored_when_https_disabled() {
        let opts = ServerOptions::from_snapshot(&snapshot().with(Keys::SSL_KEYSTORE_TYPE, "JKS")).unwrap();
        assert!(opts.https.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rejections
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn min_threads_above_max_is_rejected() {
        let err = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTP_MIN_THREADS, 50)
                .with(Keys::HTTP_MAX_THREADS, 10),
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("http.minThreads"));
    }

    #[test]
    fn min_threads_above_max_is_rejected_without_listeners() {
        let err = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTP_ENABLED, false)
                .with(Keys::HTTP_MIN_THREADS, 5)
                .with(Keys::HTTP_MAX_THREADS, 4),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_min_threads_is_rejected() {
        let err = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_MIN_THREADS, 0)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn port_out_of_range_is_rejected() {
        let err = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_PORT, 70_000)).unwrap_err();
        assert!(err.is_configuration());
        let err = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_PORT, 65_536)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn negative_port_falls_back_to_default() {
        let opts = ServerOptions::from_snapshot(&snapshot().with(Keys::HTTP_PORT, -1)).unwrap();
        assert_eq!(opts.http.unwrap().port, 80);

        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::HTTPS_ENABLED, true)
                .with(Keys::HTTPS_PORT, "-1")
                .with(Keys::SSL_KEYSTORE_PATH, "/ks.p12")
                .with(Keys::SSL_KEYSTORE_PASSWORD, "pw"),
        )
        .unwrap();
        assert_eq!(opts.https.unwrap().port, 443);
        assert_eq!(opts.http.unwrap().secure_port, Some(443));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Context
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn context_path_normalization() {
        assert_eq!(normalize_context_path("").unwrap(), "/");
        assert_eq!(normalize_context_path("/").unwrap(), "/");
        assert_eq!(normalize_context_path("/app/").unwrap(), "/app");
        assert_eq!(normalize_context_path("//").unwrap(), "/");
        assert_eq!(normalize_context_path("/a/b").unwrap(), "/a/b");
        assert!(normalize_context_path("app").is_err());
        assert!(normalize_context_path("/app/*").is_err());
    }

    #[test]
    fn session_and_housekeeper_intervals() {
        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::CONTEXT_SESSION_INACTIVE_INTERVAL, 120)
                .with(Keys::HOUSEKEEPER_INTERVAL, "30"),
        )
        .unwrap();
        assert_eq!(opts.context.session_max_inactive, Some(Duration::from_secs(120)));
        assert_eq!(opts.context.housekeeper_interval, Some(Duration::from_secs(30)));

        let opts = ServerOptions::from_snapshot(
            &snapshot()
                .with(Keys::CONTEXT_SESSION_INACTIVE_INTERVAL, -1)
                .with(Keys::HOUSEKEEPER_INTERVAL, 0),
        )
        .unwrap();
        assert_eq!(opts.context.session_max_inactive, None);
        assert_eq!(opts.context.housekeeper_interval, None);
    }

    #[test]
    fn known_keys() {
        assert!(dynhttp_config::keys::is_known_key("http.port"));
        assert!(!dynhttp_config::keys::is_known_key("http.nio"));
        assert!(dynhttp_config::keys::is_secret_key(Keys::SSL_KEY_PASSWORD));
    }
}
