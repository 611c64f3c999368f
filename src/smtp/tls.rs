//! TLS parameters and trust material

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use async_native_tls::{Certificate, Identity, TlsConnector};
use log::{debug, warn};

use crate::smtp::response::Response;

/// TLS failures
#[derive(thiserror::Error, Debug)]
pub enum TlsError {
    /// Certificate or key material could not be loaded
    #[error("invalid TLS configuration: {0}")]
    Configuration(String),
    /// The handshake failed
    #[error("handshake failed: {0}")]
    Handshake(#[source] async_native_tls::Error),
    /// The server certificate was not trusted
    #[error("certificate validation failed: {0}")]
    CertificateValidation(#[source] async_native_tls::Error),
    /// TLS is required but the server does not offer STARTTLS
    #[error("STARTTLS is not supported by the server")]
    StartTlsUnsupported,
    /// The server advertised STARTTLS but refused it
    #[error("STARTTLS refused: {0}")]
    StartTlsRefused(Response),
}

impl TlsError {
    /// Tells certificate problems apart from other handshake failures.
    ///
    /// native-tls does not expose the reason, only the backend's message.
    pub(crate) fn from_handshake(error: async_native_tls::Error) -> TlsError {
        let message = error.to_string().to_ascii_lowercase();
        if message.contains("certificate") || message.contains("verify") {
            TlsError::CertificateValidation(error)
        } else {
            TlsError::Handshake(error)
        }
    }
}

/// Where the client certificate and trust anchors come from
#[derive(PartialEq, Eq, Clone)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum TlsConfiguration {
    /// PEM certificate and PKCS #8 key, plus an optional directory of
    /// extra CA certificates (`*.pem`, `*.crt`)
    CertificateFiles {
        ca_directory: Option<PathBuf>,
        certificate_file: PathBuf,
        key_file: PathBuf,
    },
    /// A PKCS #12 bundle
    ChainFile {
        chain_file: PathBuf,
        passphrase: String,
    },
}

impl fmt::Debug for TlsConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TlsConfiguration::CertificateFiles {
                ref ca_directory,
                ref certificate_file,
                ref key_file,
            } => f
                .debug_struct("CertificateFiles")
                .field("ca_directory", ca_directory)
                .field("certificate_file", certificate_file)
                .field("key_file", key_file)
                .finish(),
            TlsConfiguration::ChainFile { ref chain_file, .. } => f
                .debug_struct("ChainFile")
                .field("chain_file", chain_file)
                .field("passphrase", &"<redacted>")
                .finish(),
        }
    }
}

impl TlsConfiguration {
    pub fn with_certificate_files<P: Into<PathBuf>>(
        ca_directory: Option<P>,
        certificate_file: P,
        key_file: P,
    ) -> TlsConfiguration {
        TlsConfiguration::CertificateFiles {
            ca_directory: ca_directory.map(Into::into),
            certificate_file: certificate_file.into(),
            key_file: key_file.into(),
        }
    }

    pub fn with_chain_file<P: Into<PathBuf>, S: Into<String>>(
        chain_file: P,
        passphrase: S,
    ) -> TlsConfiguration {
        TlsConfiguration::ChainFile {
            chain_file: chain_file.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Loads the files and builds a connector trusting the system roots
    /// plus any extra CA certificates.
    pub fn connector(&self) -> Result<TlsConnector, TlsError> {
        let mut connector = TlsConnector::new();

        match *self {
            TlsConfiguration::CertificateFiles {
                ref ca_directory,
                ref certificate_file,
                ref key_file,
            } => {
                if let Some(directory) = ca_directory {
                    for certificate in ca_certificates(directory)? {
                        connector = connector.add_root_certificate(certificate);
                    }
                }
                let certificate = read(certificate_file)?;
                let key = read(key_file)?;
                let identity = Identity::from_pkcs8(&certificate, &key)
                    .map_err(|err| TlsError::Configuration(format!("{}: {}", key_file.display(), err)))?;
                Ok(connector.identity(identity))
            }
            TlsConfiguration::ChainFile {
                ref chain_file,
                ref passphrase,
            } => {
                let der = read(chain_file)?;
                let identity = Identity::from_pkcs12(&der, passphrase).map_err(|err| {
                    TlsError::Configuration(format!("{}: {}", chain_file.display(), err))
                })?;
                Ok(connector.identity(identity))
            }
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|err| TlsError::Configuration(format!("{}: {}", path.display(), err)))
}

/// Every `*.pem` and `*.crt` file in `directory`
fn ca_certificates(directory: &Path) -> Result<Vec<Certificate>, TlsError> {
    let mut certificates = vec![];

    for extension in &["pem", "crt"] {
        let pattern = directory.join(format!("*.{}", extension));
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|err| TlsError::Configuration(format!("{}: {}", pattern, err)))?;

        for path in paths {
            let path = match path {
                Ok(path) => path,
                Err(err) => {
                    warn!("skipping unreadable CA entry: {}", err);
                    continue;
                }
            };
            let pem = read(&path)?;
            let certificate = Certificate::from_pem(&pem).map_err(|err| {
                TlsError::Configuration(format!("{}: {}", path.display(), err))
            })?;
            debug!("trusting CA certificate {}", path.display());
            certificates.push(certificate);
        }
    }

    Ok(certificates)
}

/// Parameters to use for secure clients
#[derive(Clone)]
pub struct ClientTlsParameters {
    /// A connector from `native-tls`
    pub connector: TlsConnector,
    /// The domain to send during the TLS handshake
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ClientTlsParameters")
            .field("connector", &"TlsConnector")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    /// Creates a `ClientTlsParameters`
    pub fn new(domain: String, connector: TlsConnector) -> ClientTlsParameters {
        ClientTlsParameters { connector, domain }
    }

    /// Validates against the system trust store only
    pub fn default_roots(domain: String) -> ClientTlsParameters {
        ClientTlsParameters::new(domain, TlsConnector::new())
    }

    pub fn from_configuration(
        domain: String,
        configuration: &TlsConfiguration,
    ) -> Result<ClientTlsParameters, TlsError> {
        Ok(ClientTlsParameters::new(domain, configuration.connector()?))
    }

    /// Skips the hostname check. Only for test servers.
    pub fn accept_invalid_hostnames(mut self, accept: bool) -> ClientTlsParameters {
        self.connector = self.connector.danger_accept_invalid_hostnames(accept);
        self
    }

    /// Skips certificate validation entirely. Only for test servers.
    pub fn accept_invalid_certs(mut self, accept: bool) -> ClientTlsParameters {
        self.connector = self.connector.danger_accept_invalid_certs(accept);
        self
    }
}
