//! In-memory stream replaying scripted server replies
#![allow(missing_docs)]

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

#[cfg(feature = "runtime-async-std")]
use async_std::io::{Cursor, Read, Write};
#[cfg(feature = "runtime-tokio")]
use std::io::Cursor;
#[cfg(feature = "runtime-tokio")]
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};

use futures::io;

pub type MockCursor = Cursor<Vec<u8>>;

/// Everything the client wrote, shared with the test holding the stream
#[derive(Clone, Debug, Default)]
pub struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drains the bytes written so far
    pub fn take_vec(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    /// Everything written so far, lossily decoded
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// The written lines, without their CRLF
    pub fn lines(&self) -> Vec<String> {
        self.to_string_lossy()
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Reads from a fixed script, records writes into a [`Transcript`]
#[derive(Debug)]
pub struct MockStream {
    reader: MockCursor,
    writer: Transcript,
}

impl Default for MockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream::with_vec(Vec::new())
    }

    pub fn with_vec(vec: Vec<u8>) -> MockStream {
        MockStream {
            reader: MockCursor::new(vec),
            writer: Transcript::default(),
        }
    }

    /// Replays `replies` in order, each one a complete server reply
    pub fn with_replies(replies: &[&str]) -> MockStream {
        MockStream::with_vec(replies.concat().into_bytes())
    }

    /// Handle on what the client writes, usable after the stream is moved
    pub fn transcript(&self) -> Transcript {
        self.writer.clone()
    }

    pub fn take_vec(&mut self) -> Vec<u8> {
        self.writer.take_vec()
    }

    fn record(&self, buf: &[u8]) -> usize {
        self.writer.lock().extend_from_slice(buf);
        buf.len()
    }
}

#[cfg(feature = "runtime-tokio")]
impl Read for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

#[cfg(feature = "runtime-tokio")]
impl Write for MockStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(self.record(buf)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(feature = "runtime-async-std")]
impl Read for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

#[cfg(feature = "runtime-async-std")]
impl Write for MockStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(self.record(buf)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
