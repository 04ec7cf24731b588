//! Development keystore generation.

use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

/// Write a self-signed PEM keystore (certificate followed by private key)
/// to `path` and return the certificate's `sha256:<hex>` fingerprint.
///
/// The certificate covers localhost, the loopback addresses and this
/// machine's hostname.
pub fn generate(path: &Path) -> anyhow::Result<String> {
    let mut sans = vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ];
    if let Ok(hostname) = hostname::get() {
        let hostname = hostname.to_string_lossy().to_string();
        if !hostname.is_empty() && !sans.contains(&hostname) {
            sans.push(hostname);
        }
    }

    let mut subject_alt_names = Vec::with_capacity(sans.len());
    for san in sans {
        subject_alt_names.push(match san.parse::<std::net::IpAddr>() {
            Ok(ip) => rcgen::SanType::IpAddress(ip),
            Err(_) => rcgen::SanType::DnsName(
                san.clone()
                    .try_into()
                    .with_context(|| format!("invalid host name {san}"))?,
            ),
        });
    }

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new())?;
    params.subject_alt_names = subject_alt_names;

    let key_pair = rcgen::KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    let fingerprint = format!("sha256:{}", hex::encode(Sha256::digest(cert.der())));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, format!("{}{}", cert.pem(), key_pair.serialize_pem()))
        .with_context(|| format!("cannot write keystore {}", path.display()))?;

    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynhttp_config::{KeystoreType, TlsOptions, TlsProtocol};
    use dynhttp_transport::tls::Keystore;

    #[test]
    fn generated_keystore_loads_as_pem() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tls/dev.pem");
        let fingerprint = generate(&path).unwrap();
        assert!(fingerprint.starts_with("sha256:"));
        assert_eq!(fingerprint.len(), "sha256:".len() + 64);

        let keystore = Keystore::load(&TlsOptions {
            keystore_path: path,
            keystore_password: None,
            key_password: None,
            keystore_type: KeystoreType::Pem,
            protocol: TlsProtocol::Tls,
            want_client_auth: false,
            need_client_auth: false,
        })
        .unwrap();
        assert_eq!(keystore.certificates.len(), 1);
    }
}
