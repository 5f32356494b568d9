//! Byte-stream channel to the supervisor.
//!
//! The core talks to its supervisor over two anonymous pipes: one inbound,
//! one outbound. [`Channel`] wraps the pair and provides the two primitives
//! everything else is built on:
//!
//! - [`Channel::read_bounded`] reads until a framer recognises a complete
//!   document, the byte bound is hit, or the peer closes. Bytes past the end
//!   of the document stay buffered for the next call.
//! - [`Channel::write_raw`] writes and flushes a whole buffer.
//!
//! [`Channel::discard`] skips the rest of a document too large to keep.
//!
//! Any failure here is fatal to the process: the supervisor relationship
//! lives exactly as long as the process does, so there is no reconnect.

use crate::benc::FrameStatus;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a single read from the inbound pipe.
const READ_CHUNK: usize = 4096;

/// Channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Inbound side reached end of stream with nothing buffered
    #[error("channel closed by supervisor")]
    Closed,

    /// Outbound side has no reader any more
    #[error("supervisor closed its end of the channel")]
    PeerClosed,

    /// Other I/O failure
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bytes returned by [`Channel::read_bounded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedRead {
    /// The frame, or whatever was read if no frame could be formed
    pub bytes: Vec<u8>,
    /// True if the bound was hit before a complete frame arrived
    pub bound_reached: bool,
}

/// Inbound/outbound stream pair.
#[derive(Debug)]
pub struct Channel<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
}

impl<R, W> Channel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap an inbound reader and outbound writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
        }
    }

    /// Number of bytes received but not yet handed out.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read one frame of at most `max` bytes.
    ///
    /// `framer` inspects the buffered bytes and decides whether they start
    /// with a complete frame. On [`FrameStatus::Invalid`] the whole buffer is
    /// returned so the caller's decoder can report the problem.
    ///
    /// This is cancel safe: dropping the future loses no received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the stream ends with nothing
    /// buffered, or [`ChannelError::Io`] on a read failure.
    pub async fn read_bounded<F>(
        &mut self,
        max: usize,
        mut framer: F,
    ) -> Result<BoundedRead, ChannelError>
    where
        F: FnMut(&[u8]) -> FrameStatus,
    {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match framer(&self.buffer) {
                FrameStatus::Complete(len) if len <= max => {
                    let bytes = self.buffer.drain(..len).collect();
                    return Ok(BoundedRead {
                        bytes,
                        bound_reached: false,
                    });
                }
                FrameStatus::Invalid => {
                    return Ok(BoundedRead {
                        bytes: std::mem::take(&mut self.buffer),
                        bound_reached: false,
                    });
                }
                FrameStatus::Complete(_) | FrameStatus::Incomplete => {}
            }

            if self.buffer.len() >= max {
                let bytes = self.buffer.drain(..max).collect();
                return Ok(BoundedRead {
                    bytes,
                    bound_reached: true,
                });
            }

            let want = READ_CHUNK.min(max - self.buffer.len());
            let n = self.reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(ChannelError::Closed);
                }
                return Ok(BoundedRead {
                    bytes: std::mem::take(&mut self.buffer),
                    bound_reached: false,
                });
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Throw input away until `skip` finds the end of the unwanted bytes.
    ///
    /// `skip` sees each run of buffered bytes once. It returns `Some(n)` when
    /// the unwanted region ends `n` bytes into that run; everything after it
    /// stays buffered. Returns how many bytes were discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the stream ends first, or
    /// [`ChannelError::Io`] on a read failure.
    pub async fn discard<F>(&mut self, mut skip: F) -> Result<usize, ChannelError>
    where
        F: FnMut(&[u8]) -> Option<usize>,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let mut discarded = 0;

        loop {
            if !self.buffer.is_empty() {
                if let Some(end) = skip(&self.buffer) {
                    let end = end.min(self.buffer.len());
                    self.buffer.drain(..end);
                    return Ok(discarded + end);
                }
                discarded += self.buffer.len();
                self.buffer.clear();
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(ChannelError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Write and flush all of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::PeerClosed`] if the supervisor stopped reading,
    /// or [`ChannelError::Io`] for any other failure.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let result = async {
            self.writer.write_all(bytes).await?;
            self.writer.flush().await
        }
        .await;

        result.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                ChannelError::PeerClosed
            }
            _ => ChannelError::Io(e),
        })
    }

    /// Take the reader and writer back, discarding buffered bytes.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

/// Channel over the inherited supervisor pipes.
#[cfg(unix)]
pub type PipeChannel =
    Channel<tokio::net::unix::pipe::Receiver, tokio::net::unix::pipe::Sender>;

#[cfg(unix)]
impl PipeChannel {
    /// Build a channel from the two pipe descriptors passed by the supervisor.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if either descriptor is not a pipe or cannot be registered with
    /// the reactor.
    pub fn from_pipes(
        from_angel: std::os::fd::OwnedFd,
        to_angel: std::os::fd::OwnedFd,
    ) -> Result<Self, ChannelError> {
        use tokio::net::unix::pipe;

        let reader = pipe::Receiver::from_file(std::fs::File::from(from_angel))?;
        let writer = pipe::Sender::from_file(std::fs::File::from(to_angel))?;
        Ok(Self::new(reader, writer))
    }
}
