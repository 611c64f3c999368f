//! Runtime shim: everything that differs between tokio and async-std.

#[cfg(feature = "runtime-async-std")]
pub use async_std::{
    future::{timeout, TimeoutError},
    io::prelude::BufReadExt,
    io::{BufReader, Read, ReadExt, Write, WriteExt},
    net::TcpStream,
};
#[cfg(feature = "runtime-tokio")]
pub use tokio::{
    io::AsyncBufReadExt as BufReadExt,
    io::AsyncReadExt as ReadExt,
    io::AsyncWriteExt as WriteExt,
    io::BufReader,
    io::{AsyncRead as Read, AsyncWrite as Write},
    net::TcpStream,
    time::{error::Elapsed as TimeoutError, timeout},
};

use std::future::Future;
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::time::Duration;

/// Runs `f` under an optional deadline.
///
/// The timeout error is converted into the caller's error type so call sites
/// can stay on `?`.
pub async fn with_timeout<F, T, E>(duration: Option<Duration>, f: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match duration {
        Some(duration) => timeout(duration, f).await?,
        None => f.await,
    }
}

/// Shuts down the write half, sending FIN to the peer.
#[cfg(feature = "runtime-tokio")]
pub async fn shutdown<W: Write + Unpin>(stream: &mut W) -> IoResult<()> {
    stream.shutdown().await
}

/// Shuts down the write half, sending FIN to the peer.
#[cfg(feature = "runtime-async-std")]
pub async fn shutdown<W: Write + Unpin>(stream: &mut W) -> IoResult<()> {
    stream.close().await
}

/// Resolves `host` to the addresses to try, in resolver order.
#[cfg(feature = "runtime-tokio")]
pub async fn resolve(host: &str, port: u16) -> IoResult<Vec<SocketAddr>> {
    Ok(tokio::net::lookup_host((host, port)).await?.collect())
}

/// Resolves `host` to the addresses to try, in resolver order.
#[cfg(feature = "runtime-async-std")]
pub async fn resolve(host: &str, port: u16) -> IoResult<Vec<SocketAddr>> {
    use async_std::net::ToSocketAddrs;

    Ok((host, port).to_socket_addrs().await?.collect())
}
