//! A trait to represent a stream

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_native_tls::TlsStream;
use async_trait::async_trait;
use futures::io;
use log::debug;
use pin_project::pin_project;

use crate::runtime::{resolve, with_timeout, Read, TcpStream, Write};
use crate::smtp::client::mock::MockStream;
use crate::smtp::error::Error;
use crate::smtp::tls::{ClientTlsParameters, TlsError};
use crate::smtp::ServerAddress;

/// Represents the different types of underlying network streams
#[pin_project(project = NetworkStreamProj)]
pub enum NetworkStream {
    /// Plain TCP stream
    Tcp(#[pin] TcpStream),
    /// Encrypted TCP stream
    Tls(#[pin] TlsStream<TcpStream>),
    /// Mock stream
    Mock(#[pin] MockStream),
}

impl fmt::Debug for NetworkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            NetworkStream::Tcp(_) => "NetworkStream::Tcp",
            NetworkStream::Tls(_) => "NetworkStream::Tls",
            NetworkStream::Mock(_) => "NetworkStream::Mock",
        })
    }
}

#[cfg(feature = "runtime-tokio")]
impl Read for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_read(cx, buf),
        }
    }
}

#[cfg(feature = "runtime-tokio")]
impl Write for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
            NetworkStreamProj::Mock(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Tls(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Mock(s) => s.poll_shutdown(cx),
        }
    }
}

#[cfg(feature = "runtime-async-std")]
impl Read for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_read(cx, buf),
        }
    }
}

#[cfg(feature = "runtime-async-std")]
impl Write for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Mock(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
            NetworkStreamProj::Mock(s) => s.poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_close(cx),
            NetworkStreamProj::Tls(s) => s.poll_close(cx),
            NetworkStreamProj::Mock(s) => s.poll_close(cx),
        }
    }
}

/// Runs the TLS handshake over an open TCP stream
async fn handshake(
    tls_parameters: &ClientTlsParameters,
    stream: TcpStream,
    timeout: Option<Duration>,
) -> Result<TlsStream<TcpStream>, Error> {
    with_timeout(timeout, async {
        tls_parameters
            .connector
            .connect(&tls_parameters.domain, stream)
            .await
            .map_err(|err| Error::Tls(TlsError::from_handshake(err)))
    })
    .await
}

/// A trait for the concept of opening a stream
#[async_trait]
pub trait Connector: Sized {
    /// Opens a connection to the given server
    async fn connect(
        addr: &ServerAddress,
        timeout: Option<Duration>,
        tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<Self, Error>;
    /// Upgrades to TLS connection
    async fn upgrade_tls(
        self,
        tls_parameters: &ClientTlsParameters,
        timeout: Option<Duration>,
    ) -> Result<Self, Error>;

    /// Is the NetworkStream encrypted
    fn is_encrypted(&self) -> bool;
}

#[async_trait]
impl Connector for NetworkStream {
    async fn connect(
        addr: &ServerAddress,
        timeout: Option<Duration>,
        tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<NetworkStream, Error> {
        let tcp_stream = with_timeout(timeout, async {
            let addresses = resolve(&addr.host, addr.port)
                .await
                .map_err(Error::Resolution)?;
            if addresses.is_empty() {
                return Err(Error::Resolution(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {}", addr.host),
                )));
            }
            TcpStream::connect(&addresses[..])
                .await
                .map_err(Error::Connection)
        })
        .await?;
        debug!("connected to {}", addr);

        match tls_parameters {
            Some(context) => Ok(NetworkStream::Tls(
                handshake(context, tcp_stream, timeout).await?,
            )),
            None => Ok(NetworkStream::Tcp(tcp_stream)),
        }
    }

    async fn upgrade_tls(
        self,
        tls_parameters: &ClientTlsParameters,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        match self {
            NetworkStream::Tcp(stream) => Ok(NetworkStream::Tls(
                handshake(tls_parameters, stream, timeout).await?,
            )),
            NetworkStream::Tls(_) => Ok(self),
            NetworkStream::Mock(_) => Err(Error::Client("a mock stream cannot be encrypted")),
        }
    }

    #[cfg_attr(feature = "cargo-clippy", allow(clippy::match_same_arms))]
    fn is_encrypted(&self) -> bool {
        match *self {
            NetworkStream::Tcp(_) => false,
            NetworkStream::Tls(_) => true,
            NetworkStream::Mock(_) => false,
        }
    }
}
