use std::future::Future;

use async_trait::async_trait;
use futures::future::{self, Either};
use futures::stream::{self, StreamExt};
use futures::pin_mut;
use log::{debug, info};

use crate::message::{Message, MimeEncoder};
use crate::smtp::error::Error;
use crate::smtp::session::{DeliveryError, DeliveryResult, Session};
use crate::smtp::smtp_client::SmtpClient;
use crate::{SendableEmail, Transport};

/// Delivers messages through an SMTP relay
///
/// Every message gets its own [`Session`]; nothing is shared between
/// deliveries except the configuration.
#[derive(Clone, Debug)]
pub struct SmtpTransport {
    /// Information about the client
    client_info: SmtpClient,
}

impl SmtpTransport {
    /// Creates a new SMTP transport
    ///
    /// It does not connect to the server, but only creates the `SmtpTransport`
    pub fn new(builder: SmtpClient) -> SmtpTransport {
        SmtpTransport {
            client_info: builder,
        }
    }

    pub fn client(&self) -> &SmtpClient {
        &self.client_info
    }

    /// Encodes a message, before any connection is made.
    fn encode(message: &Message) -> Result<SendableEmail, DeliveryError> {
        MimeEncoder::new().encode(message).map_err(|err| {
            DeliveryError::new(
                message.message_id().map(str::to_string),
                Error::Content(err),
            )
        })
    }

    /// Sends every message, at most `limit` sessions at a time.
    ///
    /// Results come back in the order of `messages`; one failure does not
    /// stop the others.
    pub async fn send_all(&self, messages: &[Message], limit: usize) -> Vec<DeliveryResult> {
        let limit = limit.max(1);
        debug!("sending {} messages, {} at a time", messages.len(), limit);

        stream::iter(messages)
            .map(|message| self.send(message))
            .buffered(limit)
            .collect()
            .await
    }

    /// Sends `message` unless `cancel` completes first.
    ///
    /// On cancellation the session is dropped, closing its connection, and
    /// the result is `Error::Cancelled`.
    pub async fn send_until<C>(&self, message: &Message, cancel: C) -> DeliveryResult
    where
        C: Future<Output = ()>,
    {
        let email = SmtpTransport::encode(message)?;

        let delivery = Session::deliver(&self.client_info, &email, None);
        pin_mut!(delivery);
        pin_mut!(cancel);

        match future::select(delivery, cancel).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                info!("{}: delivery cancelled", email.message_id());
                Err(DeliveryError::new(
                    Some(email.message_id().to_string()),
                    Error::Cancelled,
                ))
            }
        }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    type Ok = crate::smtp::Delivery;
    type Error = DeliveryError;

    async fn send(&self, message: &Message) -> DeliveryResult {
        let email = SmtpTransport::encode(message)?;
        self.send_raw(&email).await
    }

    async fn send_raw(&self, email: &SendableEmail) -> DeliveryResult {
        crate::message::header_message_id(email.message())
            .map_err(|err| {
                DeliveryError::new(Some(email.message_id().to_string()), Error::Content(err))
            })?;

        Session::deliver(&self.client_info, email, None).await
    }
}
