//! The SMTP transport sends emails using the SMTP protocol.
//!
//! This SMTP client follows [RFC
//! 5321](https://tools.ietf.org/html/rfc5321), and is designed to efficiently send emails from an
//! application to a relay email server, as it relies as much as possible on the relay server
//! for sanity and RFC compliance checks.
//!
//! It implements the following extensions:
//!
//! * 8BITMIME ([RFC 6152](https://tools.ietf.org/html/rfc6152))
//! * AUTH ([RFC 4954](http://tools.ietf.org/html/rfc4954)) with PLAIN, LOGIN and CRAM-MD5 mechanisms
//! * STARTTLS ([RFC 3207](http://tools.ietf.org/html/rfc3207))
//! * SIZE ([RFC 1870](https://tools.ietf.org/html/rfc1870))
//! * SMTPUTF8 ([RFC 6531](http://tools.ietf.org/html/rfc6531))
//!
//! Every delivery runs in its own [`Session`]: connect, greeting, EHLO,
//! STARTTLS, AUTH, envelope, DATA, QUIT. Sessions are never reused.

pub mod authentication;
pub mod client;
pub mod commands;
pub mod error;
pub mod extension;
pub mod response;
pub mod session;
mod smtp_client;
pub mod tls;
mod transport;

pub use self::session::{Delivery, DeliveryError, DeliveryResult, Rejection, Session, SessionState};
pub use self::smtp_client::*;
pub use self::transport::*;
