//! Error and result type for SMTP clients

use std::io;

use crate::runtime::TimeoutError;
use crate::smtp::authentication::AuthError;
use crate::smtp::response::{Response, Severity};
use crate::smtp::session::Rejection;
use crate::smtp::tls::TlsError;

use self::Error::*;

/// An enum of all error kinds.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transient SMTP error, 4xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("transient: {}", .0.first_line().unwrap_or("undetailed error during SMTP transaction"))]
    Transient(Response),
    /// Permanent SMTP error, 5xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("permanent: {}", .0.first_line().unwrap_or("undetailed error during SMTP transaction"))]
    Permanent(Response),
    /// A positive reply, but not the one the current step needs
    #[error("unexpected response: {0}")]
    UnexpectedResponse(Response),
    /// Error parsing a response
    #[error("{0}")]
    ResponseParsing(&'static str),
    /// Parsing error
    #[error("parsing: {0:?}")]
    Parsing(nom::error::ErrorKind),
    /// The server name did not resolve to any address
    #[error("resolution: {0}")]
    Resolution(#[source] io::Error),
    /// Could not open the connection
    #[error("connection: {0}")]
    Connection(#[source] io::Error),
    /// IO error
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// TLS error
    #[error("tls: {0}")]
    Tls(#[from] TlsError),
    /// Authentication error
    #[error("authentication: {0}")]
    Authentication(#[from] AuthError),
    /// Every recipient was rejected, DATA was never sent
    #[error("all {} recipients were rejected", .0.len())]
    Envelope(Vec<Rejection>),
    /// The message exceeds the SIZE the server advertised
    #[error("message of {size} bytes exceeds the server limit of {limit} bytes")]
    MessageTooLarge {
        /// Encoded message size
        size: usize,
        /// Advertised limit
        limit: usize,
    },
    /// The message could not be built or encoded
    #[error("content: {0}")]
    Content(#[from] crate::error::Error),
    /// No reply within the configured timeout
    #[error("timeout")]
    Timeout,
    /// The caller gave up on the delivery
    #[error("cancelled")]
    Cancelled,
    /// Internal client error
    #[error("client: {0}")]
    Client(&'static str),
}

/// Coarse classification of an [`Error`]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorKind {
    /// Could not reach or talk to the server
    Connection,
    /// The server answered something the protocol does not allow here
    Protocol,
    /// TLS setup or negotiation
    Tls,
    /// Authentication
    Authentication,
    /// Sender or recipients refused
    Envelope,
    /// Message construction
    Encoding,
    /// Timeout
    Timeout,
    /// Cancelled by the caller
    Cancelled,
}

impl Error {
    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Transient(_) | Permanent(_) | UnexpectedResponse(_) | ResponseParsing(_)
            | Parsing(_) | Client(_) => ErrorKind::Protocol,
            Connection(_) | Resolution(_) | Io(_) => ErrorKind::Connection,
            Tls(_) => ErrorKind::Tls,
            Authentication(_) => ErrorKind::Authentication,
            Envelope(_) | MessageTooLarge { .. } => ErrorKind::Envelope,
            Content(_) => ErrorKind::Encoding,
            Timeout => ErrorKind::Timeout,
            Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The server reply behind this error, if any
    pub fn response(&self) -> Option<&Response> {
        match *self {
            Transient(ref response) | Permanent(ref response) | UnexpectedResponse(ref response) => {
                Some(response)
            }
            Authentication(AuthError::Rejected(ref response)) => Some(response),
            Tls(TlsError::StartTlsRefused(ref response)) => Some(response),
            _ => None,
        }
    }

    /// Worth retrying the message later: 4xx replies, timeouts and network
    /// failures. A refused envelope is transient when every refusal was 4xx.
    pub fn is_transient(&self) -> bool {
        match *self {
            Envelope(ref rejections) => {
                !rejections.is_empty()
                    && rejections.iter().all(|rejection| {
                        rejection.response.code.severity == Severity::TransientNegativeCompletion
                    })
            }
            Connection(_) | Resolution(_) | Io(_) | Timeout => true,
            _ => self
                .response()
                .map(|response| response.code.severity == Severity::TransientNegativeCompletion)
                .unwrap_or_default(),
        }
    }

    /// The server refused for good: 5xx replies, or an envelope with at
    /// least one 5xx refusal
    pub fn is_permanent(&self) -> bool {
        match *self {
            Envelope(ref rejections) => rejections.iter().any(|rejection| {
                rejection.response.code.severity == Severity::PermanentNegativeCompletion
            }),
            _ => self
                .response()
                .map(|response| response.code.severity == Severity::PermanentNegativeCompletion)
                .unwrap_or_default(),
        }
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Error {
        Parsing(match err {
            nom::Err::Incomplete(_) => nom::error::ErrorKind::Complete,
            nom::Err::Failure(e) => e.code,
            nom::Err::Error(e) => e.code,
        })
    }
}

impl From<Response> for Error {
    fn from(response: Response) -> Error {
        match response.code.severity {
            Severity::TransientNegativeCompletion => Transient(response),
            Severity::PermanentNegativeCompletion => Permanent(response),
            _ => UnexpectedResponse(response),
        }
    }
}

impl From<TimeoutError> for Error {
    fn from(_: TimeoutError) -> Error {
        Timeout
    }
}

impl From<&'static str> for Error {
    fn from(string: &'static str) -> Error {
        Client(string)
    }
}

/// SMTP result type
pub type SmtpResult = Result<Response, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_response() {
        let busy: Response = "421 try again later\r\n".parse().unwrap();
        let error = Error::from(busy);
        assert!(matches!(error, Transient(_)));
        assert!(error.is_transient());
        assert!(!error.is_permanent());
        assert_eq!(error.kind(), ErrorKind::Protocol);
        assert_eq!(error.to_string(), "transient: try again later");

        let unknown: Response = "550 no such user\r\n".parse().unwrap();
        let error = Error::from(unknown);
        assert!(error.is_permanent());
        assert!(error.response().unwrap().has_code(550));

        let ok: Response = "250 ok\r\n".parse().unwrap();
        assert!(matches!(Error::from(ok), UnexpectedResponse(_)));
    }

    #[test]
    fn test_kinds() {
        let rejected: Response = "535 5.7.8 bad credentials\r\n".parse().unwrap();
        let error = Error::from(AuthError::Rejected(rejected));
        assert_eq!(error.kind(), ErrorKind::Authentication);
        assert!(error.is_permanent());

        let error = Error::from(TlsError::StartTlsUnsupported);
        assert_eq!(error.kind(), ErrorKind::Tls);
        assert!(!error.is_transient());

        assert_eq!(Error::Envelope(vec![]).kind(), ErrorKind::Envelope);
        assert_eq!(
            Error::Resolution(io::Error::new(io::ErrorKind::NotFound, "nx")).kind(),
            ErrorKind::Connection
        );
        assert_eq!(Error::Timeout.kind(), ErrorKind::Timeout);
        assert!(Error::Timeout.is_transient());
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::from(crate::error::Error::MissingFrom).kind(),
            ErrorKind::Encoding
        );
    }
}
