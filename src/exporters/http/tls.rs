// SPDX-License-Identifier: Apache-2.0

use hyper_rustls::ConfigBuilderExt;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{CertificateDer, pem::PemObject};
use tower::BoxError;
use tracing::warn;

#[derive(Clone, Default)]
pub struct Config {
    ca_certificate: Option<CertificateDer<'static>>, // if absent, it will use native roots
}

#[derive(Clone, Default)]
pub struct ConfigBuilder {
    ca_file: Option<String>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        Default::default()
    }

    pub fn into_client_config(self) -> Result<ClientConfig, BoxError> {
        let client_config = match self.ca_certificate {
            Some(cert) => {
                let mut root_store = RootCertStore::empty();
                root_store.add(cert)?;
                ClientConfig::builder().with_root_certificates(root_store)
            }
            None => match ClientConfig::builder().with_native_roots() {
                Ok(builder) => builder,
                Err(e) => {
                    warn!("Unable to load native root certificates, using bundled roots: {}", e);
                    ClientConfig::builder().with_webpki_roots()
                }
            },
        };

        Ok(client_config.with_no_client_auth())
    }
}

impl ConfigBuilder {
    pub fn with_ca_file(mut self, ca_file: String) -> Self {
        self.ca_file = Some(ca_file);
        self
    }

    pub fn build(self) -> Result<Config, BoxError> {
        let ca_certificate = match self.ca_file {
            None => None,
            Some(f) => Some(CertificateDer::from_pem_file(f)?),
        };

        Ok(Config { ca_certificate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::init_crypto_provider;

    #[test]
    fn test_default_uses_platform_roots() {
        init_crypto_provider().unwrap();

        let config = Config::builder().build().unwrap();
        assert!(config.ca_certificate.is_none());
        assert!(config.into_client_config().is_ok());
    }

    #[test]
    fn test_missing_ca_file() {
        let result = Config::builder()
            .with_ca_file("/nonexistent/ca.pem".to_string())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_ca_file_without_certificate() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate").unwrap();

        let result = Config::builder()
            .with_ca_file(path.display().to_string())
            .build();
        assert!(result.is_err());
    }
}
