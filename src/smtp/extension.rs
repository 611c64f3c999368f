//! ESMTP features

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::smtp::authentication::Mechanism;
use crate::smtp::error::Error;
use crate::smtp::response::Response;

/// Default client id
pub const DEFAULT_DOMAIN_CLIENT_ID: &str = "localhost";

/// Client identifier, the parameter to `EHLO`
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum ClientId {
    /// A fully-qualified domain name
    Domain(String),
    /// An IPv4 address
    Ipv4(Ipv4Addr),
    /// An IPv6 address
    Ipv6(Ipv6Addr),
}

impl Default for ClientId {
    fn default() -> Self {
        ClientId::hostname()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            ClientId::Domain(ref value) => f.write_str(value),
            ClientId::Ipv4(ref value) => write!(f, "[{}]", value),
            ClientId::Ipv6(ref value) => write!(f, "[IPv6:{}]", value),
        }
    }
}

impl ClientId {
    /// Creates a new `ClientId` from a fully qualified domain name
    pub fn new(domain: String) -> ClientId {
        ClientId::Domain(domain)
    }

    /// Defines a `ClientId` with the current hostname, or `localhost` if
    /// hostname could not be found
    pub fn hostname() -> ClientId {
        ClientId::Domain(
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_else(|| DEFAULT_DOMAIN_CLIENT_ID.to_string()),
        )
    }
}

/// Supported ESMTP keywords
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum Extension {
    /// 8BITMIME keyword
    ///
    /// RFC 6152: https://tools.ietf.org/html/rfc6152
    EightBitMime,
    /// SMTPUTF8 keyword
    ///
    /// RFC 6531: https://tools.ietf.org/html/rfc6531
    SmtpUtfEight,
    /// STARTTLS keyword
    ///
    /// RFC 2487: https://tools.ietf.org/html/rfc2487
    StartTls,
    /// PIPELINING keyword, recorded but not used
    ///
    /// RFC 2920: https://tools.ietf.org/html/rfc2920
    Pipelining,
    /// AUTH mechanism
    Authentication(Mechanism),
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Extension::EightBitMime => f.write_str("8BITMIME"),
            Extension::SmtpUtfEight => f.write_str("SMTPUTF8"),
            Extension::StartTls => f.write_str("STARTTLS"),
            Extension::Pipelining => f.write_str("PIPELINING"),
            Extension::Authentication(ref mechanism) => write!(f, "AUTH {}", mechanism),
        }
    }
}

/// Contains information about an SMTP server
#[derive(Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct ServerInfo {
    /// Server name
    ///
    /// The name given in the server banner
    pub name: String,
    /// ESMTP features supported by the server
    ///
    /// It contains the features supported by the server and known by the `Extension` module.
    pub features: HashSet<Extension>,
    /// Maximum message size from the SIZE keyword, `None` when unlimited
    pub max_size: Option<usize>,
    /// An `AUTH` line was present, even if it named no mechanism we know
    pub auth_advertised: bool,
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {}",
            self.name,
            if self.features.is_empty() {
                "no supported features".to_string()
            } else {
                format!("{:?}", self.features)
            }
        )
    }
}

impl ServerInfo {
    /// Parses a EHLO response to create a `ServerInfo`
    pub fn from_response(response: &Response) -> Result<ServerInfo, Error> {
        let name = match response.first_word() {
            Some(name) => name,
            None => return Err(Error::ResponseParsing("Could not read server name")),
        };

        let mut features: HashSet<Extension> = HashSet::new();
        let mut max_size = None;
        let mut auth_advertised = false;

        for line in response.message.iter().skip(1) {
            // `AUTH=PLAIN LOGIN` is the pre-RFC form some servers still send
            let line = line.replacen('=', " ", 1);
            let mut words = line.split_whitespace();
            let keyword = match words.next() {
                Some(keyword) => keyword.to_ascii_uppercase(),
                None => continue,
            };

            match keyword.as_str() {
                "8BITMIME" => {
                    features.insert(Extension::EightBitMime);
                }
                "SMTPUTF8" => {
                    features.insert(Extension::SmtpUtfEight);
                }
                "STARTTLS" => {
                    features.insert(Extension::StartTls);
                }
                "PIPELINING" => {
                    features.insert(Extension::Pipelining);
                }
                "SIZE" => {
                    // SIZE 0 means no fixed limit
                    max_size = words
                        .next()
                        .and_then(|size| size.parse::<usize>().ok())
                        .filter(|size| *size > 0);
                }
                "AUTH" => {
                    auth_advertised = true;
                    for mechanism in words {
                        if let Ok(mechanism) = mechanism.parse::<Mechanism>() {
                            features.insert(Extension::Authentication(mechanism));
                        }
                    }
                }
                _ => (),
            };
        }

        Ok(ServerInfo {
            name: name.to_string(),
            features,
            max_size,
            auth_advertised,
        })
    }

    /// `ServerInfo` for a server that only answered `HELO`: no extensions.
    pub fn from_helo_response(response: &Response) -> ServerInfo {
        ServerInfo {
            name: response.first_word().unwrap_or_default().to_string(),
            features: HashSet::new(),
            max_size: None,
            auth_advertised: false,
        }
    }

    /// Checks if the server supports an ESMTP feature
    pub fn supports_feature(&self, keyword: Extension) -> bool {
        self.features.contains(&keyword)
    }

    /// Checks if the server supports an ESMTP feature
    pub fn supports_auth_mechanism(&self, mechanism: Mechanism) -> bool {
        self.features
            .contains(&Extension::Authentication(mechanism))
    }

    /// Whether the server advertised AUTH at all, with any mechanism
    pub fn advertises_auth(&self) -> bool {
        self.auth_advertised
    }
}

/// A `MAIL FROM` extension parameter
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum MailParameter {
    /// `BODY` parameter
    Body(MailBodyParameter),
    /// `SIZE` parameter
    Size(usize),
    /// `SMTPUTF8` parameter
    SmtpUtfEight,
}

impl Display for MailParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            MailParameter::Body(ref value) => write!(f, "BODY={}", value),
            MailParameter::Size(size) => write!(f, "SIZE={}", size),
            MailParameter::SmtpUtfEight => f.write_str("SMTPUTF8"),
        }
    }
}

/// Values for the `BODY` parameter to `MAIL FROM`
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum MailBodyParameter {
    /// `8BITMIME`
    EightBitMime,
}

impl Display for MailBodyParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            MailBodyParameter::EightBitMime => f.write_str("8BITMIME"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clientid_fmt() {
        assert_eq!(
            format!("{}", ClientId::new("test".to_string())),
            "test".to_string()
        );
        assert_eq!(
            format!("{}", ClientId::Ipv4(Ipv4Addr::new(127, 0, 0, 1))),
            "[127.0.0.1]".to_string()
        );
        assert_eq!(
            format!("{}", ClientId::Ipv6(Ipv6Addr::LOCALHOST)),
            "[IPv6:::1]".to_string()
        );
    }

    #[test]
    fn test_extension_fmt() {
        assert_eq!(
            format!("{}", Extension::EightBitMime),
            "8BITMIME".to_string()
        );
        assert_eq!(
            format!("{}", Extension::Authentication(Mechanism::Plain)),
            "AUTH PLAIN".to_string()
        );
    }

    #[test]
    fn test_serverinfo_fmt() {
        let mut eightbitmime = HashSet::new();
        assert!(eightbitmime.insert(Extension::EightBitMime));

        assert_eq!(
            format!(
                "{}",
                ServerInfo {
                    name: "name".to_string(),
                    features: eightbitmime,
                    max_size: None,
                    auth_advertised: false,
                }
            ),
            "name with {EightBitMime}".to_string()
        );

        assert_eq!(
            format!("{}", ServerInfo::default()),
            " with no supported features".to_string()
        );
    }

    #[test]
    fn test_serverinfo() {
        let response: Response =
            "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5 XOAUTH2\r\n"
                .parse()
                .unwrap();

        let server_info = ServerInfo::from_response(&response).unwrap();

        assert_eq!(server_info.name, "me");
        assert_eq!(server_info.max_size, Some(42));
        assert!(server_info.supports_feature(Extension::EightBitMime));
        assert!(!server_info.supports_feature(Extension::StartTls));
        assert!(server_info.supports_auth_mechanism(Mechanism::Plain));
        assert!(server_info.supports_auth_mechanism(Mechanism::CramMd5));
        assert!(!server_info.supports_auth_mechanism(Mechanism::Login));
        assert!(server_info.advertises_auth());
    }

    #[test]
    fn test_serverinfo_legacy_auth() {
        let response: Response =
            "250-smtp.example.com\r\n250-STARTTLS\r\n250-AUTH=LOGIN\r\n250-SIZE 0\r\n250 SMTPUTF8\r\n"
                .parse()
                .unwrap();

        let server_info = ServerInfo::from_response(&response).unwrap();

        assert!(server_info.supports_auth_mechanism(Mechanism::Login));
        assert!(server_info.supports_feature(Extension::StartTls));
        assert!(server_info.supports_feature(Extension::SmtpUtfEight));
        assert_eq!(server_info.max_size, None);
    }

    #[test]
    fn test_serverinfo_without_name() {
        let response: Response = "250\r\n".parse().unwrap();
        assert!(ServerInfo::from_response(&response).is_err());

        let helo = ServerInfo::from_helo_response(&response);
        assert!(helo.features.is_empty());
        assert!(!helo.advertises_auth());
    }

    #[test]
    fn test_serverinfo_unknown_auth_mechanisms() {
        let response: Response = "250-me\r\n250 AUTH XOAUTH2 GSSAPI\r\n".parse().unwrap();

        let server_info = ServerInfo::from_response(&response).unwrap();

        assert!(server_info.features.is_empty());
        assert!(server_info.advertises_auth());
    }

    #[test]
    fn test_mail_parameter_fmt() {
        assert_eq!(
            MailParameter::Body(MailBodyParameter::EightBitMime).to_string(),
            "BODY=8BITMIME"
        );
        assert_eq!(MailParameter::Size(1024).to_string(), "SIZE=1024");
        assert_eq!(MailParameter::SmtpUtfEight.to_string(), "SMTPUTF8");
    }
}
