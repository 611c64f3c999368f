//! Provides limited SASL authentication mechanisms

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::smtp::extension::ServerInfo;
use crate::smtp::response::Response;
use crate::EmailAddress;

/// Accepted authentication mechanisms on an encrypted connection
/// PLAIN and LOGIN send the secret reversibly, so they are only offered here.
pub const DEFAULT_ENCRYPTED_MECHANISMS: &[Mechanism] =
    &[Mechanism::CramMd5, Mechanism::Login, Mechanism::Plain];

/// Accepted authentication mechanisms on an unencrypted connection
pub const DEFAULT_UNENCRYPTED_MECHANISMS: &[Mechanism] = &[Mechanism::CramMd5];

/// Mechanisms in order of preference, whatever the configured order is
const PRECEDENCE: &[Mechanism] = &[Mechanism::CramMd5, Mechanism::Login, Mechanism::Plain];

/// Number of 334 challenges a mechanism may receive before giving up
pub(crate) const MAX_CHALLENGES: usize = 2;

/// Authentication failures
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The server and the client have no mechanism in common
    #[error("no common authentication mechanism")]
    NoCommonMechanism,
    /// The server refused the credentials
    #[error("authentication rejected: {0}")]
    Rejected(Response),
    /// A server challenge was not valid base64
    #[error("malformed challenge: {0}")]
    MalformedChallenge(#[from] base64::DecodeError),
    /// The server sent a challenge the mechanism has no answer for
    #[error("unexpected challenge for {0}")]
    UnexpectedChallenge(Mechanism),
    /// The server kept challenging past the last answer the mechanism has
    #[error("too many challenges")]
    TooManyChallenges,
    /// No login identity configured and no sender to fall back on
    #[error("no login identity")]
    MissingIdentity,
}

/// Contains user credentials
#[derive(PartialEq, Eq, Clone, Hash)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Credentials {
    authentication_identity: Option<String>,
    #[cfg_attr(feature = "serde-impls", serde(skip_serializing, default))]
    secret: String,
}

impl Credentials {
    /// Create a `Credentials` struct from username and password
    pub fn new(username: String, password: String) -> Credentials {
        Credentials {
            authentication_identity: Some(username),
            secret: password,
        }
    }

    /// Only a password; the envelope sender is used as login
    pub fn with_secret(password: String) -> Credentials {
        Credentials {
            authentication_identity: None,
            secret: password,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.authentication_identity.as_deref()
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }

    /// The login, falling back to the sender address
    pub(crate) fn login<'a>(&'a self, sender: Option<&'a EmailAddress>) -> Result<&'a str, AuthError> {
        self.authentication_identity
            .as_deref()
            .or_else(|| sender.map(|sender| AsRef::<str>::as_ref(sender)))
            .ok_or(AuthError::MissingIdentity)
    }
}

impl<S: Into<String>, T: Into<String>> From<(S, T)> for Credentials {
    fn from((username, password): (S, T)) -> Self {
        Credentials::new(username.into(), password.into())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("authentication_identity", &self.authentication_identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Represents authentication mechanisms
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub enum Mechanism {
    /// PLAIN authentication mechanism
    /// RFC 4616: https://tools.ietf.org/html/rfc4616
    Plain,
    /// LOGIN authentication mechanism
    /// Obsolete but needed for some providers (like office365)
    /// https://www.ietf.org/archive/id/draft-murchison-sasl-login-00.txt
    Login,
    /// CRAM-MD5 authentication mechanism
    /// RFC 2195: https://tools.ietf.org/html/rfc2195
    CramMd5,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Mechanism::Plain => "PLAIN",
            Mechanism::Login => "LOGIN",
            Mechanism::CramMd5 => "CRAM-MD5",
        })
    }
}

impl FromStr for Mechanism {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Mechanism::Plain),
            "LOGIN" => Ok(Mechanism::Login),
            "CRAM-MD5" => Ok(Mechanism::CramMd5),
            _ => Err(()),
        }
    }
}

impl Mechanism {
    /// Base64 payload sent along with `AUTH`, if the mechanism has one
    pub fn initial_response(&self, username: &str, secret: &str) -> Option<String> {
        match *self {
            Mechanism::Plain => Some(base64::encode(format!("\u{0}{}\u{0}{}", username, secret))),
            Mechanism::Login | Mechanism::CramMd5 => None,
        }
    }

    /// Base64 answer to the `step`th (0-based) base64 `challenge`
    pub fn response(
        &self,
        username: &str,
        secret: &str,
        step: usize,
        challenge: &str,
    ) -> Result<String, AuthError> {
        let decoded = base64::decode(challenge)?;

        match (*self, step) {
            (Mechanism::Login, 0) => Ok(base64::encode(username)),
            (Mechanism::Login, 1) => Ok(base64::encode(secret)),
            (Mechanism::CramMd5, 0) => {
                let digest = cram_md5_digest(secret, &decoded);
                Ok(base64::encode(format!("{} {}", username, digest)))
            }
            (mechanism, _) => Err(AuthError::UnexpectedChallenge(mechanism)),
        }
    }
}

/// Hex HMAC-MD5 of the challenge, keyed with the secret
fn cram_md5_digest(secret: &str, challenge: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Md5>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC takes keys of any size"),
    };
    mac.update(challenge);

    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Picks the strongest mechanism both sides support.
///
/// Precedence is fixed: CRAM-MD5, then LOGIN, then PLAIN.
pub fn select_mechanism(server_info: &ServerInfo, accepted: &[Mechanism]) -> Option<Mechanism> {
    PRECEDENCE
        .iter()
        .copied()
        .find(|mechanism| {
            accepted.contains(mechanism) && server_info.supports_auth_mechanism(*mechanism)
        })
}
