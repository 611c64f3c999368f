//! Errors for message content, detected before anything touches the network.

use std::io;
use std::path::PathBuf;

/// Error type for email content
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing from in envelope
    #[error("missing source address")]
    MissingFrom,
    /// Missing to in envelope
    #[error("missing destination address")]
    MissingTo,
    /// Invalid email
    #[error("invalid email address: {0:?}")]
    InvalidEmailAddress(String),
    /// Neither a text nor an HTML body was given
    #[error("message has no body")]
    MissingBody,
    /// The header block carries no Message-Id
    #[error("Message-Id header missing")]
    MissingMessageId,
    /// More than one Message-Id header was supplied
    #[error("more than one Message-Id header found")]
    DuplicateMessageId,
    /// Message-Id is not of the form `<token@domain>`
    #[error("invalid Message-Id: {0:?}")]
    InvalidMessageId(String),
    /// Header name or value would break the header block
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
    /// Attachment source could not be read
    #[error("could not read attachment {}: {source}", .path.display())]
    AttachmentUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Email result type
pub type EmailResult<T> = Result<T, Error>;
