//! Async-Mailer builds MIME messages and delivers them over SMTP.
//!
//! ```rust,no_run
//! use async_mailer::message::{Mailbox, Message};
//! use async_mailer::smtp::authentication::Credentials;
//! use async_mailer::{SmtpClient, Transport};
//!
//! # async fn run() {
//! let message = Message::builder()
//!     .from(Mailbox::new(Some("Dr. Light"), "dr.light@example.com").unwrap())
//!     .to(Mailbox::new(Some("Megaman"), "megaman@example.com").unwrap())
//!     .subject("Reports")
//!     .text("All robots accounted for.")
//!     .build()
//!     .unwrap();
//!
//! let transport = SmtpClient::new("smtp.example.com")
//!     .credentials(Credentials::new("dr.light".to_string(), "rush".to_string()))
//!     .into_transport();
//!
//! match transport.send(&message).await {
//!     Ok(delivery) => println!("sent {} to {:?}", delivery.message_id, delivery.accepted),
//!     Err(err) => eprintln!("not sent: {}", err),
//! }
//! # }
//! ```

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]

#[cfg(all(feature = "runtime-tokio", feature = "runtime-async-std"))]
compile_error!("features `runtime-tokio` and `runtime-async-std` are mutually exclusive");

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
compile_error!("either feature `runtime-tokio` or `runtime-async-std` must be enabled");

pub mod codec;
pub mod error;
pub mod message;
pub mod runtime;
pub mod smtp;
mod types;

pub use types::*;

pub use crate::message::{Mailbox, Message, MimeEncoder};
pub use crate::smtp::tls::{ClientTlsParameters, TlsConfiguration};
pub use crate::smtp::{ClientSecurity, ServerAddress, SmtpClient, SmtpTransport};

use async_trait::async_trait;

/// Transport method for emails
#[async_trait]
pub trait Transport {
    /// Result of a successful delivery
    type Ok;
    /// Result of a failed delivery
    type Error;

    /// Encodes and sends a structured message
    async fn send(&self, message: &Message) -> Result<Self::Ok, Self::Error>;

    /// Sends an already encoded message
    async fn send_raw(&self, email: &SendableEmail) -> Result<Self::Ok, Self::Error>;
}

/// Declares an async test for the enabled runtime
#[cfg(feature = "runtime-tokio")]
#[macro_export]
macro_rules! async_test {
    ($name:ident, $block:block) => {
        #[tokio::test]
        async fn $name() {
            $block
        }
    };
}

/// Declares an async test for the enabled runtime
#[cfg(feature = "runtime-async-std")]
#[macro_export]
macro_rules! async_test {
    ($name:ident, $block:block) => {
        #[async_std::test]
        async fn $name() {
            $block
        }
    };
}
