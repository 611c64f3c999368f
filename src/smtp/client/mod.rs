//! SMTP client: byte streams and command/reply exchange

pub mod mock;
pub mod net;
mod stream;

pub use self::stream::*;
