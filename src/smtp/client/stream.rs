use std::fmt::Display;
use std::string::String;
use std::time::Duration;

use log::debug;

use crate::codec::ClientCodec;
use crate::runtime::{
    shutdown, with_timeout, BufReadExt, BufReader, Read, ReadExt, Write, WriteExt,
};
use crate::smtp::commands::AuthCommand;
use crate::smtp::error::{Error, SmtpResult};
use crate::smtp::response::parse_response;

/// Longest reply accepted before giving up on the server
const MAX_RESPONSE_LENGTH: usize = 64 * 1024;

/// SMTP stream.
///
/// Writes commands and reads replies, each under the configured timeout.
#[derive(Debug)]
pub struct SmtpStream<S: Read + Write + Unpin> {
    /// Inner stream.
    inner: BufReader<S>,
    /// Applies to every write and every reply
    timeout: Option<Duration>,
}

impl<S: Read + Write + Unpin> SmtpStream<S> {
    /// Creates new SMTP stream.
    pub fn new(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            inner: BufReader::new(stream),
            timeout,
        }
    }

    /// Returns inner stream.
    ///
    /// Should only be used when there are no unread responses,
    /// because the buffer of `BufReader` may be lost.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Send the given SMTP command to the server.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        let command = command.to_string();
        self.write(command.as_bytes(), &command).await?;
        self.read_response().await
    }

    /// Sends one step of an authentication exchange, keeping credentials out of the log.
    pub async fn auth_command(&mut self, command: &AuthCommand) -> SmtpResult {
        self.write(command.to_string().as_bytes(), &command.redacted())
            .await?;
        self.read_response().await
    }

    /// Writes the given data to the server.
    async fn write(&mut self, bytes: &[u8], shown: &str) -> Result<(), Error> {
        let stream = self.inner.get_mut();
        with_timeout(self.timeout, async {
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok::<(), Error>(())
        })
        .await?;

        debug!(">> {}", escape_crlf(shown));
        Ok(())
    }

    /// Read an SMTP response from the wire.
    ///
    /// Positive replies are returned, 4xx and 5xx replies become errors.
    pub async fn read_response(&mut self) -> SmtpResult {
        with_timeout(self.timeout, read_reply(&mut self.inner)).await
    }

    /// Sends the message content, dot-stuffed and terminated.
    pub async fn message(&mut self, message: &[u8]) -> SmtpResult {
        let mut codec = ClientCodec::new();
        let mut payload = Vec::with_capacity(message.len() + 5);
        codec.encode(message, &mut payload);
        codec.finish(&mut payload);

        let stream = self.inner.get_mut();
        with_timeout(self.timeout, async {
            stream.write_all(&payload).await?;
            stream.flush().await?;
            Ok::<(), Error>(())
        })
        .await?;
        debug!(">> <{} bytes of message data>", payload.len());

        self.read_response().await
    }

    /// Closes the write half of the connection.
    pub async fn close(&mut self) -> Result<(), Error> {
        let stream = self.inner.get_mut();
        with_timeout(self.timeout, async {
            shutdown(stream).await?;
            Ok::<(), Error>(())
        })
        .await
    }
}

/// Reads lines until they form a complete reply.
async fn read_reply<S: Read + Unpin>(reader: &mut BufReader<S>) -> SmtpResult {
    let mut buffer = String::with_capacity(100);

    loop {
        // never buffer more than one byte past the limit
        let limit = (MAX_RESPONSE_LENGTH + 1 - buffer.len()) as u64;
        let read = (&mut *reader).take(limit).read_line(&mut buffer).await?;
        if read == 0 {
            break;
        }
        if buffer.len() > MAX_RESPONSE_LENGTH {
            return Err(Error::ResponseParsing("response too long"));
        }
        debug!("<< {}", escape_crlf(&buffer));
        match parse_response(&buffer) {
            Ok((_remaining, response)) => {
                if response.is_positive() {
                    return Ok(response);
                }

                return Err(response.into());
            }
            Err(nom::Err::Incomplete(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed before a complete response",
    )
    .into())
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::async_test;
    use crate::smtp::client::mock::MockStream;
    use crate::smtp::commands::{DataCommand, EhloCommand};
    use crate::smtp::extension::ClientId;
    use crate::smtp::response::Response;

    #[test]
    fn test_escape_crlf() {
        assert_eq!(escape_crlf("\r\n"), "<CRLF>");
        assert_eq!(escape_crlf("EHLO my_name\r\n"), "EHLO my_name<CRLF>");
        assert_eq!(
            escape_crlf("EHLO my_name\r\nSIZE 42\r\n"),
            "EHLO my_name<CRLF>SIZE 42<CRLF>"
        );
    }

    async_test! { multiline_response_test, {
        let mock = MockStream::with_replies(&[
            "250-smtp.example.com\r\n250-8BITMIME\r\n250 AUTH PLAIN\r\n",
        ]);
        let transcript = mock.transcript();
        let mut stream = SmtpStream::new(mock, None);

        let response = stream
            .command(EhloCommand::new(ClientId::new("localhost".to_string())))
            .await
            .unwrap();

        assert_eq!(response.message.len(), 3);
        assert_eq!(transcript.lines(), vec!["EHLO localhost"]);
    }}

    async_test! { negative_response_test, {
        let mut stream = SmtpStream::new(
            MockStream::with_replies(&["554 no valid recipients\r\n"]),
            None,
        );

        match stream.command(DataCommand).await {
            Err(Error::Permanent(response)) => assert!(response.has_code(554)),
            other => panic!("unexpected result: {:?}", other),
        }
    }}

    async_test! { closed_connection_test, {
        let mut stream = SmtpStream::new(MockStream::with_replies(&["250-partial\r\n"]), None);

        assert!(matches!(stream.read_response().await, Err(Error::Io(_))));
    }}

    async_test! { oversized_response_test, {
        let endless = format!("250 {}", "a".repeat(2 * MAX_RESPONSE_LENGTH));
        let mut stream = SmtpStream::new(MockStream::with_replies(&[endless.as_str()]), None);

        assert!(matches!(
            stream.read_response().await,
            Err(Error::ResponseParsing("response too long"))
        ));
    }}

    async_test! { malformed_response_test, {
        let mut stream = SmtpStream::new(MockStream::with_replies(&["hello there\r\n"]), None);

        assert!(matches!(stream.read_response().await, Err(Error::Parsing(_))));
    }}

    async_test! { message_test, {
        let mock = MockStream::with_replies(&["250 2.0.0 queued as 1234\r\n"]);
        let transcript = mock.transcript();
        let mut stream = SmtpStream::new(mock, None);

        let response: Response = stream
            .message(b"Subject: dots\r\n\r\n.leading dot\r\nend")
            .await
            .unwrap();

        assert!(response.has_code(250));
        assert_eq!(
            transcript.to_string_lossy(),
            "Subject: dots\r\n\r\n..leading dot\r\nend\r\n.\r\n"
        );
    }}
}
