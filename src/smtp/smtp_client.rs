use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::smtp::authentication::{
    Credentials, Mechanism, DEFAULT_ENCRYPTED_MECHANISMS, DEFAULT_UNENCRYPTED_MECHANISMS,
};
use crate::smtp::extension::ClientId;
use crate::smtp::tls::ClientTlsParameters;
use crate::smtp::SmtpTransport;

// Registered port numbers:
// https://www.iana.
// org/assignments/service-names-port-numbers/service-names-port-numbers.xhtml

/// Default smtp port
pub const SMTP_PORT: u16 = 25;
/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;
/// Default submission over TLS port
pub const SUBMISSIONS_PORT: u16 = 465;

/// Default timeout for connecting and for every command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Host and port of the relay
///
/// Name resolution happens when a session connects.
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct ServerAddress {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: String, port: u16) -> ServerAddress {
        ServerAddress { host, port }
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How to apply TLS to a client connection
#[derive(Clone, Debug)]
pub enum ClientSecurity {
    /// Insecure connection only (for testing purposes)
    None,
    /// Start with insecure connection and use `STARTTLS` when available
    Opportunistic(ClientTlsParameters),
    /// Start with insecure connection and require `STARTTLS`
    Required(ClientTlsParameters),
    /// Use TLS wrapped connection
    Wrapper(ClientTlsParameters),
}

/// Contains client configuration
#[derive(Clone, Debug)]
pub struct SmtpClient {
    /// Name sent during EHLO
    pub(crate) hello_name: ClientId,
    /// Credentials
    pub(crate) credentials: Option<Credentials>,
    /// Server we are connecting to
    pub(crate) server_addr: ServerAddress,
    /// TLS security configuration
    pub(crate) security: ClientSecurity,
    /// Enable UTF8 mailboxes in envelope or headers
    pub(crate) smtp_utf8: bool,
    /// Optional enforced authentication mechanism
    pub(crate) authentication_mechanism: Option<Vec<Mechanism>>,
    /// Define network timeout
    /// It applies to the connection, the TLS handshake and every command
    pub(crate) timeout: Option<Duration>,
}

/// Builder for the SMTP `SmtpTransport`
impl SmtpClient {
    /// Creates a new SMTP client
    ///
    /// Defaults are:
    ///
    /// * No authentication
    /// * No SMTPUTF8 support
    /// * A 60 seconds timeout for smtp commands
    ///
    /// Consider using [`SmtpClient::new`] instead, if possible.
    pub fn with_security(address: ServerAddress, security: ClientSecurity) -> SmtpClient {
        SmtpClient {
            server_addr: address,
            security,
            smtp_utf8: false,
            credentials: None,
            hello_name: Default::default(),
            authentication_mechanism: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Simple and secure transport, should be used when possible.
    /// Creates an encrypted transport over submissions port, using the provided domain
    /// to validate TLS certificates.
    pub fn new(domain: &str) -> SmtpClient {
        let tls_parameters = ClientTlsParameters::default_roots(domain.to_string());

        SmtpClient::with_security(
            ServerAddress::new(domain.to_string(), SUBMISSIONS_PORT),
            ClientSecurity::Wrapper(tls_parameters),
        )
    }

    /// Plaintext submission upgraded with STARTTLS, failing if the server does not offer it
    pub fn new_starttls(domain: &str) -> SmtpClient {
        let tls_parameters = ClientTlsParameters::default_roots(domain.to_string());

        SmtpClient::with_security(
            ServerAddress::new(domain.to_string(), SUBMISSION_PORT),
            ClientSecurity::Required(tls_parameters),
        )
    }

    /// Creates a new local SMTP client to port 25
    pub fn new_unencrypted_localhost() -> SmtpClient {
        SmtpClient::with_security(
            ServerAddress::new("localhost".to_string(), SMTP_PORT),
            ClientSecurity::None,
        )
    }

    /// Enable SMTPUTF8 if the server supports it
    pub fn smtp_utf8(mut self, enabled: bool) -> SmtpClient {
        self.smtp_utf8 = enabled;
        self
    }

    /// Set the name used during EHLO
    pub fn hello_name(mut self, name: ClientId) -> SmtpClient {
        self.hello_name = name;
        self
    }

    /// Set the client credentials
    pub fn credentials<S: Into<Credentials>>(mut self, credentials: S) -> SmtpClient {
        self.credentials = Some(credentials.into());
        self
    }

    /// Set the authentication mechanisms the client accepts
    pub fn authentication_mechanism(mut self, mechanism: Vec<Mechanism>) -> SmtpClient {
        self.authentication_mechanism = Some(mechanism);
        self
    }

    /// Set the timeout duration
    pub fn timeout(mut self, timeout: Option<Duration>) -> SmtpClient {
        self.timeout = timeout;
        self
    }

    pub fn server_address(&self) -> &ServerAddress {
        &self.server_addr
    }

    pub fn security(&self) -> &ClientSecurity {
        &self.security
    }

    /// Build the SMTP client
    ///
    /// It does not connect to the server, but only creates the `SmtpTransport`
    pub fn into_transport(self) -> SmtpTransport {
        SmtpTransport::new(self)
    }

    pub(crate) fn get_accepted_mechanism(&self, encrypted: bool) -> &[Mechanism] {
        match self.authentication_mechanism {
            Some(ref mechanism) => mechanism,
            None => {
                if encrypted {
                    DEFAULT_ENCRYPTED_MECHANISMS
                } else {
                    DEFAULT_UNENCRYPTED_MECHANISMS
                }
            }
        }
    }
}
