//! TLS keystore loading and rustls server configuration.
//!
//! Two keystore formats are understood: PKCS#12 (the default) and a single
//! PEM file carrying the certificate chain followed by the private key.
//! Any failure to read or decode the keystore is a configuration error; the
//! caller has not bound any socket yet.

use std::path::Path;
use std::sync::Arc;

use dynhttp_config::{KeystoreType, LifecycleError, LifecycleResult, TlsOptions, TlsProtocol};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, SupportedProtocolVersion};
use secrecy::ExposeSecret;
use tracing::debug;

/// ALPN protocols advertised by the TLS listener.
const ALPN_HTTP_1_1: &[u8] = b"http/1.1";

/// Certificate chain (leaf first) and private key.
pub struct Keystore {
    pub certificates: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("certificates", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl Keystore {
    pub fn load(options: &TlsOptions) -> LifecycleResult<Self> {
        let path = &options.keystore_path;
        let bytes = std::fs::read(path)
            .map_err(|e| keystore_error(path, format!("cannot be read: {e}")))?;

        let store_password = options
            .keystore_password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();
        let key_password = options
            .key_password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_else(|| store_password.clone());

        let keystore = match options.keystore_type {
            KeystoreType::Pkcs12 => Self::from_pkcs12(path, &bytes, &store_password, &key_password)?,
            KeystoreType::Pem => Self::from_pem(path, &bytes)?,
        };
        debug!(
            "Loaded keystore {} ({} certificate(s))",
            path.display(),
            keystore.certificates.len()
        );
        Ok(keystore)
    }

    fn from_pem(path: &Path, bytes: &[u8]) -> LifecycleResult<Self> {
        let certificates = CertificateDer::pem_slice_iter(bytes)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| keystore_error(path, format!("invalid PEM certificate: {e}")))?;
        if certificates.is_empty() {
            return Err(keystore_error(path, "contains no certificate"));
        }
        let key = PrivateKeyDer::from_pem_slice(bytes)
            .map_err(|e| keystore_error(path, format!("contains no usable private key: {e}")))?;
        Ok(Self { certificates, key })
    }

    fn from_pkcs12(
        path: &Path,
        bytes: &[u8],
        store_password: &str,
        key_password: &str,
    ) -> LifecycleResult<Self> {
        let pfx = p12::PFX::parse(bytes)
            .map_err(|e| keystore_error(path, format!("is not a PKCS#12 keystore: {e:?}")))?;
        if !pfx.verify_mac(store_password) {
            return Err(keystore_error(path, "password is incorrect"));
        }

        let certificates: Vec<CertificateDer<'static>> = pfx
            .cert_x509_bags(store_password)
            .map_err(|e| keystore_error(path, format!("certificates cannot be decrypted: {e:?}")))?
            .into_iter()
            .map(CertificateDer::from)
            .collect();
        if certificates.is_empty() {
            return Err(keystore_error(path, "contains no certificate"));
        }

        let key = pfx
            .key_bags(key_password)
            .map_err(|e| keystore_error(path, format!("private key cannot be decrypted: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| keystore_error(path, "contains no private key"))?;

        Ok(Self {
            certificates,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key)),
        })
    }
}

/// Build the rustls configuration for the TLS listener.
pub fn server_config(options: &TlsOptions) -> LifecycleResult<Arc<ServerConfig>> {
    let keystore = Keystore::load(options)?;
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let versions: Vec<&'static SupportedProtocolVersion> = match options.protocol {
        TlsProtocol::Tls => rustls::DEFAULT_VERSIONS.to_vec(),
        TlsProtocol::Tls12 => vec![&rustls::version::TLS12],
        TlsProtocol::Tls13 => vec![&rustls::version::TLS13],
    };

    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(|e| LifecycleError::configuration(format!("TLS protocol setup failed: {e}")))?;

    let builder = if options.need_client_auth || options.want_client_auth {
        // Client certificates are verified against the keystore's own chain.
        let mut roots = RootCertStore::empty();
        for cert in &keystore.certificates {
            roots
                .add(cert.clone())
                .map_err(|e| keystore_error(&options.keystore_path, format!("unusable trust anchor: {e}")))?;
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
        let verifier = if options.need_client_auth {
            verifier
        } else {
            verifier.allow_unauthenticated()
        };
        let verifier = verifier
            .build()
            .map_err(|e| LifecycleError::configuration(format!("client auth setup failed: {e}")))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut config = builder
        .with_single_cert(keystore.certificates, keystore.key)
        .map_err(|e| keystore_error(&options.keystore_path, format!("certificate/key mismatch: {e}")))?;
    config.alpn_protocols = vec![ALPN_HTTP_1_1.to_vec()];

    Ok(Arc::new(config))
}

fn keystore_error(path: &Path, message: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::configuration(format!("keystore {} {message}", path.display()))
}
