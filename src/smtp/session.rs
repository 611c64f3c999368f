//! One SMTP conversation, from connection to QUIT
//!
//! A [`Session`] only ever moves forward through [`SessionState`]:
//!
//! ```text
//! Connecting -> Greeted -> CapabilitiesKnown -> [TlsNegotiating] -> [Authenticating]
//!            -> ReadyToSend -> SendingEnvelope -> SendingData -> Completed
//! ```
//!
//! Any fatal error moves it to `Failed` and drops the connection.

use std::mem;

use log::{debug, info, warn};

use crate::smtp::authentication::{select_mechanism, AuthError, Mechanism, MAX_CHALLENGES};
use crate::smtp::client::net::{Connector, NetworkStream};
use crate::smtp::client::SmtpStream;
use crate::smtp::commands::*;
use crate::smtp::error::{Error, SmtpResult};
use crate::smtp::extension::{Extension, MailBodyParameter, MailParameter, ServerInfo};
use crate::smtp::response::Response;
use crate::smtp::smtp_client::{ClientSecurity, SmtpClient};
use crate::smtp::tls::TlsError;
use crate::{EmailAddress, SendableEmail};

/// Where a session stands
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug)]
pub enum SessionState {
    /// Opening the connection, waiting for the greeting
    Connecting,
    /// 220 greeting received
    Greeted,
    /// EHLO (or HELO) answered
    CapabilitiesKnown,
    /// STARTTLS in progress
    TlsNegotiating,
    /// AUTH exchange in progress
    Authenticating,
    /// Ready for MAIL FROM
    ReadyToSend,
    /// MAIL FROM and RCPT TO
    SendingEnvelope,
    /// DATA and the payload
    SendingData,
    /// Message accepted and QUIT sent
    Completed,
    /// Stopped on a fatal error
    Failed,
}

/// A recipient the server refused
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Rejection {
    pub recipient: EmailAddress,
    pub response: Response,
}

impl Rejection {
    pub fn code(&self) -> u16 {
        self.response.code.value()
    }

    pub fn text(&self) -> String {
        self.response.message.join(" ")
    }
}

/// A message the server accepted, for at least one recipient
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(
    feature = "serde-impls",
    derive(serde_derive::Serialize, serde_derive::Deserialize)
)]
pub struct Delivery {
    pub message_id: String,
    pub accepted: Vec<EmailAddress>,
    pub rejected: Vec<Rejection>,
    /// Reply to the end of DATA
    pub response: Response,
}

/// A delivery that did not go through
#[derive(thiserror::Error, Debug)]
#[error("{}: {}", .message_id.as_deref().unwrap_or("<unencoded message>"), .error)]
pub struct DeliveryError {
    /// Unknown when the message could not be encoded
    pub message_id: Option<String>,
    #[source]
    pub error: Error,
    /// Recipients the server had accepted before the failure
    pub accepted: Vec<EmailAddress>,
    pub rejected: Vec<Rejection>,
    pub last_response: Option<Response>,
}

impl DeliveryError {
    pub(crate) fn new(message_id: Option<String>, error: Error) -> DeliveryError {
        DeliveryError {
            message_id,
            error,
            accepted: vec![],
            rejected: vec![],
            last_response: None,
        }
    }
}

/// Outcome of one message
pub type DeliveryResult = Result<Delivery, DeliveryError>;

macro_rules! try_smtp (
    ($err: expr, $session: ident) => ({
        match $err {
            Ok(val) => val,
            Err(err) => return Err($session.fail(From::from(err)).await),
        }
    })
);

/// One connection to the relay, used for exactly one message
#[derive(Debug)]
pub struct Session<'c> {
    client: &'c SmtpClient,
    state: SessionState,
    stream: Option<SmtpStream<NetworkStream>>,
    server_info: Option<ServerInfo>,
    last_response: Option<Response>,
    /// Login fallback when the credentials carry no username
    sender: Option<EmailAddress>,
    accepted: Vec<EmailAddress>,
    rejected: Vec<Rejection>,
}

impl<'c> Session<'c> {
    pub fn new(client: &'c SmtpClient) -> Session<'c> {
        Session {
            client,
            state: SessionState::Connecting,
            stream: None,
            server_info: None,
            last_response: None,
            sender: None,
            accepted: vec![],
            rejected: vec![],
        }
    }

    /// Uses `sender` as login when the credentials have no username
    pub fn with_sender(mut self, sender: Option<&EmailAddress>) -> Session<'c> {
        self.sender = sender.cloned();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Known once EHLO or HELO was answered
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// Recipients accepted by the last `send`
    pub fn accepted(&self) -> &[EmailAddress] {
        &self.accepted
    }

    /// Recipients rejected by the last `send`
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Whether the connection is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.stream
            .as_ref()
            .map(|stream| stream.get_ref().is_encrypted())
            .unwrap_or_default()
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            next >= self.state,
            "session cannot go back from {:?} to {:?}",
            self.state,
            next
        );
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Records the failure, says goodbye if the server can still hear us,
    /// and drops the connection.
    async fn fail(&mut self, error: Error) -> Error {
        warn!("session failed in {:?}: {}", self.state, error);
        if let Some(mut stream) = self.stream.take() {
            if connection_usable(&error) {
                if let Err(err) = stream.command(QuitCommand).await {
                    debug!("QUIT after failure: {}", err);
                }
            }
            if let Err(err) = stream.close().await {
                debug!("close after failure: {}", err);
            }
        }
        self.state = SessionState::Failed;
        error
    }

    fn stream_mut(&mut self) -> Result<&mut SmtpStream<NetworkStream>, Error> {
        self.stream.as_mut().ok_or(Error::Client("no open connection"))
    }

    fn record(&mut self, result: &SmtpResult) {
        let response = match *result {
            Ok(ref response) => Some(response),
            Err(ref error) => error.response(),
        };
        if let Some(response) = response {
            self.last_response = Some(response.clone());
        }
    }

    /// Send the given SMTP command to the server.
    async fn command<C: std::fmt::Display>(&mut self, command: C) -> SmtpResult {
        let result = self.stream_mut()?.command(command).await;
        self.record(&result);
        result
    }

    async fn auth_command(&mut self, command: AuthCommand) -> SmtpResult {
        let result = self.stream_mut()?.auth_command(&command).await;
        self.record(&result);
        result
    }

    /// Opens the connection to the configured server and runs the session
    /// up to `ReadyToSend`.
    pub async fn connect(&mut self) -> Result<(), Error> {
        let client = self.client;
        let wrapper = match client.security {
            ClientSecurity::Wrapper(ref tls_parameters) => Some(tls_parameters),
            _ => None,
        };
        debug!("connecting to {}", client.server_addr);

        let stream = try_smtp!(
            NetworkStream::connect(&client.server_addr, client.timeout, wrapper).await,
            self
        );
        self.connect_with_stream(stream).await
    }

    /// Runs the session up to `ReadyToSend` over an already open stream.
    pub async fn connect_with_stream(&mut self, stream: NetworkStream) -> Result<(), Error> {
        if self.state != SessionState::Connecting || self.stream.is_some() {
            return Err(Error::Client("session already connected"));
        }
        self.stream = Some(SmtpStream::new(stream, self.client.timeout));

        let greeting = self.stream_mut()?.read_response().await;
        self.record(&greeting);
        let greeting = try_smtp!(greeting, self);
        if !greeting.has_code(220) {
            return Err(self.fail(Error::UnexpectedResponse(greeting)).await);
        }
        debug!("greeting: {}", greeting);
        self.transition(SessionState::Greeted);

        try_smtp!(self.ehlo().await, self);
        try_smtp!(self.try_tls().await, self);
        try_smtp!(self.try_login().await, self);

        self.transition(SessionState::ReadyToSend);
        Ok(())
    }

    /// Gets the EHLO response and updates server information.
    ///
    /// Falls back to HELO when the server rejects EHLO.
    async fn ehlo(&mut self) -> Result<(), Error> {
        let hello_name = self.client.hello_name.clone();

        let server_info = match self.command(EhloCommand::new(hello_name.clone())).await {
            Ok(response) => ServerInfo::from_response(&response)?,
            Err(Error::Permanent(response)) => {
                info!("EHLO refused ({}), falling back to HELO", response);
                let response = self.command(HeloCommand::new(hello_name)).await?;
                ServerInfo::from_helo_response(&response)
            }
            Err(err) => return Err(err),
        };

        // Print server information
        debug!("server {}", server_info);
        self.server_info = Some(server_info);

        if self.state < SessionState::CapabilitiesKnown {
            self.transition(SessionState::CapabilitiesKnown);
        }
        Ok(())
    }

    fn supports_feature(&self, keyword: Extension) -> bool {
        self.server_info
            .as_ref()
            .map(|info| info.supports_feature(keyword))
            .unwrap_or_default()
    }

    async fn try_tls(&mut self) -> Result<(), Error> {
        let client = self.client;

        match (
            &client.security,
            self.supports_feature(Extension::StartTls),
        ) {
            (ClientSecurity::Required(_), false) => Err(TlsError::StartTlsUnsupported.into()),
            (ClientSecurity::Opportunistic(_), false)
            | (ClientSecurity::None, _)
            | (ClientSecurity::Wrapper(_), _) => Ok(()),
            (ClientSecurity::Opportunistic(ref tls_parameters), true)
            | (ClientSecurity::Required(ref tls_parameters), true) => {
                self.transition(SessionState::TlsNegotiating);

                match self.command(StarttlsCommand).await {
                    Ok(ref response) if response.has_code(220) => (),
                    Ok(response) | Err(Error::Transient(response)) | Err(Error::Permanent(response)) => {
                        return Err(TlsError::StartTlsRefused(response).into())
                    }
                    Err(err) => return Err(err),
                }

                let stream = self
                    .stream
                    .take()
                    .ok_or(Error::Client("no open connection"))?
                    .into_inner();
                let stream = stream.upgrade_tls(tls_parameters, client.timeout).await?;
                self.stream = Some(SmtpStream::new(stream, client.timeout));

                debug!("connection encrypted");

                // Capabilities may differ once encrypted
                self.server_info = None;
                self.ehlo().await
            }
        }
    }

    async fn try_login(&mut self) -> Result<(), Error> {
        let client = self.client;
        let credentials = match client.credentials {
            Some(ref credentials) => credentials,
            None => return Ok(()),
        };

        let server_info = self
            .server_info
            .as_ref()
            .ok_or(Error::Client("no server info"))?;
        if !server_info.advertises_auth() {
            info!("server does not advertise AUTH, continuing unauthenticated");
            return Ok(());
        }

        let accepted = client.get_accepted_mechanism(self.is_encrypted());
        let mechanism =
            select_mechanism(server_info, accepted).ok_or(AuthError::NoCommonMechanism)?;

        self.transition(SessionState::Authenticating);

        let sender = self.sender.clone();
        let username = credentials.login(sender.as_ref())?;
        self.authenticate(mechanism, username, credentials.secret())
            .await?;
        Ok(())
    }

    /// Runs one SASL exchange.
    async fn authenticate(
        &mut self,
        mechanism: Mechanism,
        username: &str,
        secret: &str,
    ) -> SmtpResult {
        debug!("authenticating as {} with {}", username, mechanism);

        let mut response = self
            .auth_command(AuthCommand::new(
                mechanism,
                mechanism.initial_response(username, secret),
            ))
            .await;
        let mut challenges = 0;

        loop {
            match response {
                Ok(reply) if reply.has_code(334) => {
                    if challenges >= MAX_CHALLENGES {
                        return Err(AuthError::TooManyChallenges.into());
                    }
                    let challenge = reply.first_word().unwrap_or_default();
                    let answer = mechanism.response(username, secret, challenges, challenge)?;
                    challenges += 1;
                    response = self.auth_command(AuthCommand::Answer(answer)).await;
                }
                Ok(reply) if reply.has_code(235) => {
                    debug!("authenticated with {}", mechanism);
                    return Ok(reply);
                }
                Ok(reply) => return Err(Error::UnexpectedResponse(reply)),
                Err(Error::Transient(reply)) | Err(Error::Permanent(reply)) => {
                    return Err(AuthError::Rejected(reply).into())
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Sends the envelope and the message.
    ///
    /// Recipients refused with 4xx or 5xx are collected; the message goes
    /// out as long as one recipient was accepted.
    pub async fn send(&mut self, email: &SendableEmail) -> SmtpResult {
        if self.state != SessionState::ReadyToSend {
            return Err(Error::Client("session is not ready to send"));
        }
        self.accepted.clear();
        self.rejected.clear();

        let size = email.message().len();
        let max_size = self.server_info.as_ref().and_then(|info| info.max_size);
        if let Some(limit) = max_size {
            if size > limit {
                return Err(self.fail(Error::MessageTooLarge { size, limit }).await);
            }
        }

        // Mail
        let mut mail_options = vec![];

        if self.supports_feature(Extension::EightBitMime) {
            mail_options.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }

        if self.supports_feature(Extension::SmtpUtfEight) && self.client.smtp_utf8 {
            mail_options.push(MailParameter::SmtpUtfEight);
        }

        if max_size.is_some() {
            mail_options.push(MailParameter::Size(size));
        }

        self.transition(SessionState::SendingEnvelope);
        try_smtp!(
            self.command(MailCommand::new(
                email.envelope().from().cloned(),
                mail_options
            ))
            .await,
            self
        );

        // Log the mail command
        info!(
            "{}: from=<{}>",
            email.message_id(),
            match email.envelope().from() {
                Some(address) => address.to_string(),
                None => "".to_string(),
            }
        );

        // Recipient
        for to_address in email.envelope().to() {
            match self.command(RcptCommand::new(to_address.clone())).await {
                Ok(_) => {
                    // Log the rcpt command
                    debug!("{}: to=<{}>", email.message_id(), to_address);
                    self.accepted.push(to_address.clone());
                }
                Err(Error::Transient(response)) | Err(Error::Permanent(response)) => {
                    info!(
                        "{}: to=<{}> rejected: {}",
                        email.message_id(),
                        to_address,
                        response
                    );
                    self.rejected.push(Rejection {
                        recipient: to_address.clone(),
                        response,
                    });
                }
                Err(err) => return Err(self.fail(err).await),
            }
        }

        if self.accepted.is_empty() {
            let rejected = self.rejected.clone();
            return Err(self.fail(Error::Envelope(rejected)).await);
        }

        // Data
        self.transition(SessionState::SendingData);
        let response = try_smtp!(self.command(DataCommand).await, self);
        if !response.has_code(354) {
            return Err(self.fail(Error::UnexpectedResponse(response)).await);
        }

        let result = self.stream_mut()?.message(email.message()).await;
        self.record(&result);
        let response = try_smtp!(result, self);

        // Log the message
        info!(
            "{}: conn_use={}, size={}, status=sent ({})",
            email.message_id(),
            self.accepted.len(),
            size,
            response
                .message
                .iter()
                .next()
                .unwrap_or(&"no response".to_string())
        );

        Ok(response)
    }

    /// Sends QUIT and closes the connection.
    ///
    /// The message is already accepted at this point, so failures are only logged.
    pub async fn quit(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match stream.command(QuitCommand).await {
                Ok(response) => debug!("QUIT: {}", response),
                Err(err) => debug!("QUIT failed: {}", err),
            }
            if let Err(err) = stream.close().await {
                debug!("close failed: {}", err);
            }
        }
        if self.state == SessionState::SendingData {
            self.transition(SessionState::Completed);
        }
    }

    /// Connects, sends `email` and quits.
    ///
    /// With `stream`, the session talks over it instead of connecting.
    pub async fn deliver(
        client: &SmtpClient,
        email: &SendableEmail,
        stream: Option<NetworkStream>,
    ) -> DeliveryResult {
        let mut session = Session::new(client).with_sender(email.envelope().from());

        let connected = match stream {
            Some(stream) => session.connect_with_stream(stream).await,
            None => session.connect().await,
        };
        let outcome = match connected {
            Ok(()) => session.send(email).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(response) => {
                session.quit().await;
                Ok(Delivery {
                    message_id: email.message_id().to_string(),
                    accepted: mem::take(&mut session.accepted),
                    rejected: mem::take(&mut session.rejected),
                    response,
                })
            }
            Err(error) => Err(DeliveryError {
                message_id: Some(email.message_id().to_string()),
                error,
                accepted: mem::take(&mut session.accepted),
                rejected: mem::take(&mut session.rejected),
                last_response: session.last_response.take(),
            }),
        }
    }
}

/// Whether the server can still take a QUIT after `error`
fn connection_usable(error: &Error) -> bool {
    match *error {
        Error::Transient(_)
        | Error::Permanent(_)
        | Error::UnexpectedResponse(_)
        | Error::Envelope(_)
        | Error::MessageTooLarge { .. } => true,
        Error::Tls(TlsError::StartTlsUnsupported) | Error::Tls(TlsError::StartTlsRefused(_)) => {
            true
        }
        Error::Authentication(AuthError::Rejected(_))
        | Error::Authentication(AuthError::NoCommonMechanism)
        | Error::Authentication(AuthError::MissingIdentity) => true,
        _ => false,
    }
}
