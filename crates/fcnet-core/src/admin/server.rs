//! Admin server loop.

use super::{Admin, AdminError};
use crate::arena::Arena;
use crate::benc::{self, Dict, Scan, Scanner};
use crate::channel::Channel;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Why [`AdminServer::serve`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    /// A command asked the process to exit with this code
    Terminate(i32),
}

/// Serves admin requests on the supervisor channel.
///
/// Requests are handled one at a time, in arrival order, and each response
/// is written before the next request is read. Log stream messages are
/// interleaved between responses. A request longer than the message limit
/// is skipped to its end, nothing inside it is served.
#[derive(Debug)]
pub struct AdminServer<R, W> {
    admin: Arc<Admin>,
    channel: Channel<R, W>,
    arena: Arc<Arena>,
    log_messages: Option<mpsc::Receiver<Dict>>,
}

impl<R, W> AdminServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Serve `admin` on `channel`, charging in-flight requests to `arena`.
    pub fn new(admin: Arc<Admin>, channel: Channel<R, W>, arena: Arc<Arena>) -> Self {
        Self {
            admin,
            channel,
            arena,
            log_messages: None,
        }
    }

    /// Also forward admin log stream messages.
    #[must_use]
    pub fn with_log_messages(mut self, receiver: mpsc::Receiver<Dict>) -> Self {
        self.log_messages = Some(receiver);
        self
    }

    /// The dispatcher this server feeds.
    #[must_use]
    pub fn admin(&self) -> &Arc<Admin> {
        &self.admin
    }

    /// Run until a command requests exit or the channel fails.
    ///
    /// # Errors
    ///
    /// [`AdminError::Channel`] when the supervisor closes the channel or I/O
    /// fails, [`AdminError::Arena`] when a request cannot be accounted for.
    /// Both are fatal to the process.
    pub async fn serve(&mut self) -> Result<ServeExit, AdminError> {
        let max = self.admin.settings().max_message_size;
        tracing::info!(
            session = %self.admin.sync_token().to_hex(),
            commands = self.admin.command_names().len(),
            "admin server ready"
        );

        loop {
            tokio::select! {
                biased;

                entry = next_log_message(&mut self.log_messages) => match entry {
                    Some(entry) => self.channel.write_raw(&entry.to_bytes()).await?,
                    None => self.log_messages = None,
                },
                read = self.channel.read_bounded(max, benc::frame) => {
                    let read = read?;
                    if read.bound_reached {
                        let skipped = self.skip_oversized(&read.bytes).await?;
                        tracing::warn!(
                            len = read.bytes.len() + skipped,
                            "admin request exceeds {} bytes, dropping",
                            max
                        );
                        continue;
                    }

                    let _reservation = self.arena.reserve(read.bytes.len())?;
                    if let Some(response) = self.admin.dispatch(&read.bytes) {
                        self.channel.write_raw(&response.to_bytes()).await?;
                    }

                    if let Some(code) = self.admin.exit_requested() {
                        return Ok(ServeExit::Terminate(code));
                    }
                }
            }
        }
    }

    /// Discard the rest of a request whose first bytes were `head`.
    async fn skip_oversized(&mut self, head: &[u8]) -> Result<usize, AdminError> {
        let mut scanner = Scanner::new();
        if scanner.feed(head) != Scan::Partial {
            return Ok(0);
        }

        let skipped = self
            .channel
            .discard(|run| match scanner.feed(run) {
                Scan::Partial => None,
                Scan::Complete(end) => Some(end),
                Scan::Invalid => Some(run.len()),
            })
            .await?;
        Ok(skipped)
    }

    /// Take the channel back.
    pub fn into_channel(self) -> Channel<R, W> {
        self.channel
    }
}

async fn next_log_message(receiver: &mut Option<mpsc::Receiver<Dict>>) -> Option<Dict> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminLog;
    use crate::channel::ChannelError;
    use crate::admin::builtin;
    use crate::admin::testing::{admin, auth_request};
    use crate::log::Log;
    use crate::log::testing::MemoryLog;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    struct Harness {
        server: AdminServer<DuplexStream, DuplexStream>,
        to_core: DuplexStream,
        from_core: Channel<DuplexStream, DuplexStream>,
    }

    fn harness(arena_limit: usize) -> Harness {
        let (core_in, to_core) = duplex(64 * 1024);
        let (core_out, angel_in) = duplex(64 * 1024);
        let (_unused, dummy) = duplex(1);

        let admin = admin();
        let arena = Arena::new(arena_limit);
        builtin::register(&admin, &arena).unwrap();

        Harness {
            server: AdminServer::new(admin, Channel::new(core_in, core_out), arena),
            to_core,
            from_core: Channel::new(angel_in, dummy),
        }
    }

    async fn next_response(from_core: &mut Channel<DuplexStream, DuplexStream>) -> Dict {
        let read = from_core.read_bounded(64 * 1024, benc::frame).await.unwrap();
        benc::decode_dict(&read.bytes).unwrap()
    }

    #[tokio::test]
    async fn test_serves_in_order_then_exits() {
        let mut h = harness(1 << 20);
        let mut requests = Vec::new();
        requests.extend(Dict::new().with("q", "ping").with("txid", "1").to_bytes());
        requests.extend(Dict::new().with("q", "memory").with("txid", "2").to_bytes());
        requests.extend(auth_request("Core_exit", "3", Dict::new()).to_bytes());
        h.to_core.write_all(&requests).await.unwrap();

        let exit = h.server.serve().await.unwrap();
        assert_eq!(exit, ServeExit::Terminate(builtin::EXIT_CODE));

        let first = next_response(&mut h.from_core).await;
        assert_eq!(first.get_str(b"txid"), Some("1"));
        assert_eq!(first.get_str(b"q"), Some("pong"));

        let second = next_response(&mut h.from_core).await;
        assert_eq!(second.get_str(b"txid"), Some("2"));
        assert!(second.get_int(b"bytes").is_some());

        let third = next_response(&mut h.from_core).await;
        assert_eq!(third.get_str(b"txid"), Some("3"));
        assert_eq!(third.get_str(b"error"), Some("none"));
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let mut h = harness(1 << 20);
        drop(h.to_core);

        let err = h.server.serve().await.unwrap_err();
        assert!(matches!(err, AdminError::Channel(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_arena_exhaustion_is_fatal() {
        let mut h = harness(8);
        h.to_core
            .write_all(&Dict::new().with("q", "ping").with("txid", "1").to_bytes())
            .await
            .unwrap();

        let err = h.server.serve().await.unwrap_err();
        assert!(matches!(err, AdminError::Arena(_)));
    }

    #[tokio::test]
    async fn test_forwards_log_stream() {
        let mut h = harness(1 << 20);
        let (log, rx) = AdminLog::new(std::sync::Arc::new(MemoryLog::default()), 16);
        log.register_commands(h.server.admin()).unwrap();
        log.subscribe(crate::log::Level::Info, b"stream".to_vec());
        log.info("hello");

        let mut server = h.server.with_log_messages(rx);
        h.to_core
            .write_all(&auth_request("Core_exit", "x", Dict::new()).to_bytes())
            .await
            .unwrap();
        server.serve().await.unwrap();

        // Pending log output goes out before the next request is served
        let streamed = next_response(&mut h.from_core).await;
        assert_eq!(streamed.get_str(b"txid"), Some("stream"));
        assert_eq!(streamed.get_str(b"message"), Some("hello"));

        let response = next_response(&mut h.from_core).await;
        assert_eq!(response.get_str(b"txid"), Some("x"));
    }

    #[tokio::test]
    async fn test_oversized_request_skipped_whole() {
        let (core_in, mut to_core) = duplex(256 * 1024);
        let (core_out, angel_in) = duplex(64 * 1024);
        let (_unused, dummy) = duplex(1);
        let admin = admin();
        let arena = Arena::new(1 << 20);
        builtin::register(&admin, &arena).unwrap();
        let mut server = AdminServer::new(admin, Channel::new(core_in, core_out), arena);
        let mut from_core = Channel::new(angel_in, dummy);

        // One string value spanning past the limit, with a request inside it
        let inner = Dict::new().with("q", "ping").with("txid", "hidden").to_bytes();
        let mut payload = vec![b'x'; 65_525];
        payload.extend(&inner);
        payload.resize(100_000, b'x');

        let mut input = b"d1:q100000:".to_vec();
        input.extend(&payload);
        input.push(b'e');
        input.extend(Dict::new().with("q", "ping").with("txid", "after").to_bytes());
        input.extend(auth_request("Core_exit", "end", Dict::new()).to_bytes());
        to_core.write_all(&input).await.unwrap();

        server.serve().await.unwrap();

        let first = next_response(&mut from_core).await;
        assert_eq!(first.get_str(b"txid"), Some("after"));
        assert_eq!(first.get_str(b"q"), Some("pong"));

        let second = next_response(&mut from_core).await;
        assert_eq!(second.get_str(b"txid"), Some("end"));
    }

    #[tokio::test]
    async fn test_malformed_request_does_not_swallow_next() {
        let mut h = harness(1 << 20);
        let mut input = b"d1:q4:ping1:q4:ping4:txid1:ae".to_vec();
        input.extend(Dict::new().with("q", "ping").with("txid", "good").to_bytes());
        input.extend(auth_request("Core_exit", "end", Dict::new()).to_bytes());
        h.to_core.write_all(&input).await.unwrap();

        h.server.serve().await.unwrap();

        let rejected = next_response(&mut h.from_core).await;
        assert_eq!(rejected.get_str(b"txid"), Some("a"));
        assert!(rejected.get_str(b"error").unwrap().starts_with("invalid request"));

        let good = next_response(&mut h.from_core).await;
        assert_eq!(good.get_str(b"txid"), Some("good"));
        assert_eq!(good.get_str(b"q"), Some("pong"));
    }

    #[tokio::test]
    async fn test_oversized_request_dropped() {
        let (core_in, mut to_core) = duplex(256 * 1024);
        let (core_out, mut angel_in) = duplex(64 * 1024);
        let admin = admin();
        let arena = Arena::new(1 << 20);
        builtin::register(&admin, &arena).unwrap();
        let mut server = AdminServer::new(admin, Channel::new(core_in, core_out), arena);

        // A string longer than the message limit, never completed
        let mut big = b"d1:q".to_vec();
        big.extend(format!("{}:", 128 * 1024).as_bytes());
        big.extend(vec![b'x'; 70 * 1024]);
        to_core.write_all(&big).await.unwrap();
        drop(to_core);

        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, AdminError::Channel(ChannelError::Closed)));

        let mut out = Vec::new();
        drop(server);
        angel_in.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
