//! Structured email messages
//!
//! A [`Message`] is built with [`MessageBuilder`], then turned into a
//! [`SendableEmail`](crate::SendableEmail) by the [`MimeEncoder`].
//!
//! ```rust
//! use async_mailer::message::{Mailbox, Message, MimeEncoder};
//!
//! let email = Message::builder()
//!     .from(Mailbox::new(Some("Dr. Light"), "dr.light@example.com").unwrap())
//!     .to(Mailbox::new(Some("Megaman"), "megaman@example.com").unwrap())
//!     .subject("wish")
//!     .text("Humans and robots living together in harmony and equality.")
//!     .build()
//!     .and_then(|message| MimeEncoder::new().encode(&message))
//!     .unwrap();
//!
//! assert_eq!(email.envelope().to().len(), 1);
//! ```

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

use crate::error::{EmailResult, Error};
use crate::types::{EmailAddress, Envelope};

mod encoder;

pub use self::encoder::{encode_base64_wrapped, MimeEncoder, BASE64_LINE_LENGTH};

/// Mailbox: an address with an optional display name
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Mailbox {
    name: Option<String>,
    email: EmailAddress,
}

impl Mailbox {
    /// Display names may hold any printable text; control characters are refused.
    pub fn new<N: Into<String>>(name: Option<N>, email: &str) -> EmailResult<Mailbox> {
        let name = name.map(Into::into).filter(|name| !name.is_empty());
        if let Some(ref name) = name {
            if name.chars().any(char::is_control) {
                return Err(Error::InvalidHeader(name.clone()));
            }
        }
        Ok(Mailbox {
            name,
            email: email.parse()?,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }
}

impl From<EmailAddress> for Mailbox {
    fn from(email: EmailAddress) -> Mailbox {
        Mailbox { name: None, email }
    }
}

/// Parses `address` or `Name <address>`
impl FromStr for Mailbox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match (s.rfind('<'), s.ends_with('>')) {
            (Some(open), true) => {
                let name = s[..open].trim().trim_matches('"').trim();
                Mailbox::new(Some(name), &s[open + 1..s.len() - 1])
            }
            _ => Mailbox::new(None::<String>, s),
        }
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "{} <{}>", name, self.email),
            None => self.email.fmt(f),
        }
    }
}

/// Where the bytes of an attachment come from
#[derive(Clone, Debug)]
pub enum AttachmentSource {
    /// In-memory content
    Bytes(Vec<u8>),
    /// File read once, when the message is encoded
    Path(PathBuf),
}

/// A file attached to a message
#[derive(Clone, Debug)]
pub struct Attachment {
    filename: String,
    content_type: String,
    source: AttachmentSource,
    content_id: Option<String>,
}

impl Attachment {
    /// Attaches in-memory content
    pub fn from_bytes<F, C, D>(filename: F, content_type: C, data: D) -> Attachment
    where
        F: Into<String>,
        C: Into<String>,
        D: Into<Vec<u8>>,
    {
        Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            source: AttachmentSource::Bytes(data.into()),
            content_id: None,
        }
    }

    /// Attaches a file from disk.
    ///
    /// Without an explicit content type one is guessed from the extension.
    pub fn from_path<P: Into<PathBuf>>(path: P, content_type: Option<&str>) -> Attachment {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = match content_type {
            Some(content_type) => content_type.to_string(),
            None => mime_guess::from_path(&path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        Attachment {
            filename,
            content_type,
            source: AttachmentSource::Path(path),
            content_id: None,
        }
    }

    /// Marks the attachment inline, referable from HTML as `cid:<content_id>`
    pub fn inline<S: Into<String>>(mut self, content_id: S) -> Attachment {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn source(&self) -> &AttachmentSource {
        &self.source
    }

    /// Content type and Content-ID end up verbatim in part headers
    fn validate(&self) -> EmailResult<()> {
        let content_type = self.content_type.as_str();
        let well_formed = match content_type.split_once('/') {
            Some((kind, subtype)) => !kind.trim().is_empty() && !subtype.trim().is_empty(),
            None => false,
        };
        if !well_formed || content_type.chars().any(char::is_control) {
            return Err(Error::InvalidHeader(format!("Content-Type: {}", content_type)));
        }

        if let Some(ref content_id) = self.content_id {
            if content_id.is_empty()
                || content_id
                    .chars()
                    .any(|c| !c.is_ascii_graphic() || c == '<' || c == '>')
            {
                return Err(Error::InvalidHeader(format!("Content-ID: {}", content_id)));
            }
        }
        Ok(())
    }

    pub(crate) fn read(&self) -> EmailResult<Vec<u8>> {
        match self.source {
            AttachmentSource::Bytes(ref data) => Ok(data.clone()),
            AttachmentSource::Path(ref path) => {
                fs::read(path).map_err(|source| Error::AttachmentUnreadable {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// A structured email, validated on construction
#[derive(Clone, Debug)]
pub struct Message {
    pub(crate) from: Mailbox,
    pub(crate) to: Vec<Mailbox>,
    pub(crate) cc: Vec<Mailbox>,
    pub(crate) bcc: Vec<Mailbox>,
    pub(crate) reply_to: Option<Mailbox>,
    pub(crate) subject: String,
    pub(crate) text: Option<String>,
    pub(crate) html: Option<String>,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) message_id: Option<String>,
    pub(crate) date: Option<DateTime<FixedOffset>>,
    pub(crate) headers: Vec<(String, String)>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    pub fn bcc(&self) -> &[Mailbox] {
        &self.bcc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// The caller supplied Message-Id, if any
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// SMTP envelope: the sender, then To, Cc and Bcc without duplicates
    pub fn envelope(&self) -> EmailResult<Envelope> {
        let mut recipients: Vec<EmailAddress> = Vec::new();
        for mailbox in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if !recipients.contains(&mailbox.email) {
                recipients.push(mailbox.email.clone());
            }
        }
        Envelope::new(Some(self.from.email.clone()), recipients)
    }
}

/// Builder for [`Message`]
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    reply_to: Option<Mailbox>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
    message_id: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    headers: Vec<(String, String)>,
}

impl MessageBuilder {
    pub fn from(mut self, mailbox: Mailbox) -> Self {
        self.from = Some(mailbox);
        self
    }

    pub fn to(mut self, mailbox: Mailbox) -> Self {
        self.to.push(mailbox);
        self
    }

    pub fn cc(mut self, mailbox: Mailbox) -> Self {
        self.cc.push(mailbox);
        self
    }

    /// Envelope-only recipient, never written to the headers
    pub fn bcc(mut self, mailbox: Mailbox) -> Self {
        self.bcc.push(mailbox);
        self
    }

    pub fn reply_to(mut self, mailbox: Mailbox) -> Self {
        self.reply_to = Some(mailbox);
        self
    }

    pub fn subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn html<S: Into<String>>(mut self, html: S) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Uses `message_id` (`<token@domain>`) instead of a generated one
    pub fn message_id<S: Into<String>>(mut self, message_id: S) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Adds a header written after the standard ones
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> EmailResult<Message> {
        let from = self.from.ok_or(Error::MissingFrom)?;
        if self.to.is_empty() {
            return Err(Error::MissingTo);
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(Error::MissingBody);
        }

        for attachment in &self.attachments {
            attachment.validate()?;
        }

        let mut message_id = self.message_id;
        let mut headers = Vec::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            validate_header(&name, &value)?;
            if name.eq_ignore_ascii_case("message-id") {
                if message_id.is_some() {
                    return Err(Error::DuplicateMessageId);
                }
                message_id = Some(value.trim().to_string());
            } else {
                headers.push((name, value));
            }
        }
        if let Some(ref message_id) = message_id {
            validate_message_id(message_id)?;
        }

        Ok(Message {
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            text: self.text,
            html: self.html,
            attachments: self.attachments,
            message_id,
            date: self.date,
            headers,
        })
    }
}

/// Headers the encoder writes itself; `Message-Id` is handled apart
const RESERVED_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "reply-to",
    "subject",
    "date",
    "mime-version",
    "content-type",
    "content-transfer-encoding",
    "content-disposition",
    "content-id",
];

fn validate_header(name: &str, value: &str) -> EmailResult<()> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| !c.is_ascii_graphic() || c == ':')
        || RESERVED_HEADERS
            .iter()
            .any(|reserved| name.eq_ignore_ascii_case(reserved));
    if bad_name || value.contains(|c: char| c == '\r' || c == '\n') {
        return Err(Error::InvalidHeader(name.to_string()));
    }
    Ok(())
}

/// Checks the `<token@domain>` shape
pub fn validate_message_id(message_id: &str) -> EmailResult<()> {
    let inner = message_id
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| Error::InvalidMessageId(message_id.to_string()))?;

    let mut parts = inner.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(token), Some(domain), None)
            if !token.is_empty()
                && !domain.is_empty()
                && !inner
                    .chars()
                    .any(|c| !c.is_ascii_graphic() || c == '<' || c == '>') =>
        {
            Ok(())
        }
        _ => Err(Error::InvalidMessageId(message_id.to_string())),
    }
}

/// Finds the single Message-Id in the header block of an encoded message.
pub fn header_message_id(message: &[u8]) -> EmailResult<String> {
    let text = String::from_utf8_lossy(message);
    let mut found: Option<String> = None;
    let mut current: Option<String> = None;

    for line in text.split("\r\n").flat_map(|line| line.split('\n')) {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(ref mut value) = current {
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some(value) = current.take() {
            if found.replace(value).is_some() {
                return Err(Error::DuplicateMessageId);
            }
        }
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("message-id") {
                current = Some(value.trim().to_string());
            }
        }
    }
    if let Some(value) = current {
        if found.replace(value).is_some() {
            return Err(Error::DuplicateMessageId);
        }
    }

    let message_id = found.ok_or(Error::MissingMessageId)?;
    validate_message_id(&message_id)?;
    Ok(message_id)
}
