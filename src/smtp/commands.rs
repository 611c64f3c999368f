//! SMTP commands

use std::fmt::{self, Display, Formatter};

use crate::smtp::authentication::Mechanism;
use crate::smtp::extension::{ClientId, MailParameter};
use crate::EmailAddress;

/// EHLO command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EhloCommand {
    client_id: ClientId,
}

impl Display for EhloCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EHLO {}\r\n", self.client_id)
    }
}

impl EhloCommand {
    /// Creates a EHLO command
    pub fn new(client_id: ClientId) -> EhloCommand {
        EhloCommand { client_id }
    }
}

/// HELO command, for servers that do not speak ESMTP
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct HeloCommand {
    client_id: ClientId,
}

impl Display for HeloCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HELO {}\r\n", self.client_id)
    }
}

impl HeloCommand {
    /// Creates a HELO command
    pub fn new(client_id: ClientId) -> HeloCommand {
        HeloCommand { client_id }
    }
}

/// STARTTLS command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct StarttlsCommand;

impl Display for StarttlsCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("STARTTLS\r\n")
    }
}

/// MAIL command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct MailCommand {
    sender: Option<EmailAddress>,
    parameters: Vec<MailParameter>,
}

impl Display for MailCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.sender {
            Some(ref sender) => write!(f, "MAIL FROM:<{}>", sender)?,
            None => f.write_str("MAIL FROM:<>")?,
        }
        for parameter in &self.parameters {
            write!(f, " {}", parameter)?;
        }
        f.write_str("\r\n")
    }
}

impl MailCommand {
    /// Creates a MAIL command
    pub fn new(sender: Option<EmailAddress>, parameters: Vec<MailParameter>) -> MailCommand {
        MailCommand { sender, parameters }
    }
}

/// RCPT command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct RcptCommand {
    recipient: EmailAddress,
}

impl Display for RcptCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RCPT TO:<{}>\r\n", self.recipient)
    }
}

impl RcptCommand {
    /// Creates an RCPT command
    pub fn new(recipient: EmailAddress) -> RcptCommand {
        RcptCommand { recipient }
    }
}

/// DATA command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct DataCommand;

impl Display for DataCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("DATA\r\n")
    }
}

/// QUIT command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct QuitCommand;

impl Display for QuitCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("QUIT\r\n")
    }
}

/// AUTH command, or an answer to a `334` challenge
///
/// Payloads are already base64 encoded.
#[derive(PartialEq, Eq, Clone)]
pub enum AuthCommand {
    /// `AUTH <mechanism> [initial-response]`
    Start {
        mechanism: Mechanism,
        initial_response: Option<String>,
    },
    /// A bare response line
    Answer(String),
}

impl Display for AuthCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            AuthCommand::Start {
                ref mechanism,
                initial_response: Some(ref response),
            } => write!(f, "AUTH {} {}\r\n", mechanism, response),
            AuthCommand::Start {
                ref mechanism,
                initial_response: None,
            } => write!(f, "AUTH {}\r\n", mechanism),
            AuthCommand::Answer(ref response) => write!(f, "{}\r\n", response),
        }
    }
}

impl fmt::Debug for AuthCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl AuthCommand {
    /// Starts an exchange
    pub fn new(mechanism: Mechanism, initial_response: Option<String>) -> AuthCommand {
        AuthCommand::Start {
            mechanism,
            initial_response,
        }
    }

    /// The command as it may appear in logs, without credentials
    pub fn redacted(&self) -> String {
        match *self {
            AuthCommand::Start {
                ref mechanism,
                initial_response: Some(_),
            } => format!("AUTH {} <redacted>", mechanism),
            AuthCommand::Start {
                ref mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism),
            AuthCommand::Answer(_) => "<redacted>".to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::smtp::extension::MailBodyParameter;

    #[test]
    fn test_display() {
        let id = ClientId::Domain("localhost".to_string());
        let email = EmailAddress::new("test@example.com".to_string()).unwrap();
        assert_eq!(format!("{}", EhloCommand::new(id.clone())), "EHLO localhost\r\n");
        assert_eq!(format!("{}", HeloCommand::new(id)), "HELO localhost\r\n");
        assert_eq!(
            format!("{}", MailCommand::new(Some(email.clone()), vec![])),
            "MAIL FROM:<test@example.com>\r\n"
        );
        assert_eq!(
            format!("{}", MailCommand::new(None, vec![])),
            "MAIL FROM:<>\r\n"
        );
        assert_eq!(
            format!(
                "{}",
                MailCommand::new(Some(email.clone()), vec![MailParameter::Size(42)])
            ),
            "MAIL FROM:<test@example.com> SIZE=42\r\n"
        );
        assert_eq!(
            format!(
                "{}",
                MailCommand::new(
                    Some(email.clone()),
                    vec![
                        MailParameter::Body(MailBodyParameter::EightBitMime),
                        MailParameter::SmtpUtfEight,
                        MailParameter::Size(42),
                    ]
                )
            ),
            "MAIL FROM:<test@example.com> BODY=8BITMIME SMTPUTF8 SIZE=42\r\n"
        );
        assert_eq!(
            format!("{}", RcptCommand::new(email)),
            "RCPT TO:<test@example.com>\r\n"
        );
        assert_eq!(format!("{}", StarttlsCommand), "STARTTLS\r\n");
        assert_eq!(format!("{}", DataCommand), "DATA\r\n");
        assert_eq!(format!("{}", QuitCommand), "QUIT\r\n");
    }

    #[test]
    fn test_auth_display() {
        let plain = AuthCommand::new(
            Mechanism::Plain,
            Mechanism::Plain.initial_response("user", "password"),
        );
        assert_eq!(
            format!("{}", plain),
            "AUTH PLAIN AHVzZXIAcGFzc3dvcmQ=\r\n"
        );
        assert_eq!(plain.redacted(), "AUTH PLAIN <redacted>");
        assert!(!format!("{:?}", plain).contains("AHVzZXIAcGFzc3dvcmQ="));

        let login = AuthCommand::new(Mechanism::Login, None);
        assert_eq!(format!("{}", login), "AUTH LOGIN\r\n");
        assert_eq!(login.redacted(), "AUTH LOGIN");

        let answer = AuthCommand::Answer("dXNlcg==".to_string());
        assert_eq!(format!("{}", answer), "dXNlcg==\r\n");
        assert_eq!(answer.redacted(), "<redacted>");
    }
}
