//! Log streaming to admin clients.
//!
//! [`AdminLog`] is the log target subsystems are switched to once the admin
//! server is running. Every message is mirrored to the local log, and copies
//! go to each admin subscriber whose level threshold it meets. Subscriber
//! messages are queued for the server loop without blocking; when the queue
//! is full they are counted and dropped.

use super::{Admin, AdminError, CommandError, Request, ok_response};
use crate::benc::Dict;
use crate::log::{Level, Log};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Queue depth for outbound log messages.
pub const LOG_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Subscription {
    stream_id: String,
    txid: Vec<u8>,
    level: Level,
}

/// Admin-facing log target.
pub struct AdminLog {
    mirror: Arc<dyn Log>,
    subscriptions: Mutex<Vec<Subscription>>,
    outbound: mpsc::Sender<Dict>,
    next_stream: AtomicU64,
    dropped: AtomicU64,
}

impl AdminLog {
    /// Create the log and the receiver the admin server drains.
    #[must_use]
    pub fn new(mirror: Arc<dyn Log>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Dict>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let log = Arc::new(Self {
            mirror,
            subscriptions: Mutex::new(Vec::new()),
            outbound,
            next_stream: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        });
        (log, receiver)
    }

    /// Start streaming messages at `level` and above, tagged with `txid`.
    /// Returns the stream id.
    pub fn subscribe(&self, level: Level, txid: Vec<u8>) -> String {
        let stream_id = format!("{:016x}", self.next_stream.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            stream_id: stream_id.clone(),
            txid,
            level,
        });
        stream_id
    }

    /// Stop a stream. Returns false if no such stream exists.
    pub fn unsubscribe(&self, stream_id: &str) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.stream_id != stream_id);
        subscriptions.len() != before
    }

    /// Number of active streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Messages dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Register `AdminLog_subscribe` and `AdminLog_unsubscribe`.
    ///
    /// # Errors
    ///
    /// Fails if either name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let log = Arc::downgrade(self);
        admin.register("AdminLog_subscribe", true, move |req: &Request| {
            let log = log
                .upgrade()
                .ok_or_else(|| CommandError::Failed("log closed".into()))?;
            let level = match req.arg_str("level") {
                None => Level::Debug,
                Some(name) => Level::parse(name).ok_or(CommandError::InvalidArgument("level"))?,
            };
            let stream_id = log.subscribe(level, req.txid.clone());
            Ok(ok_response().with("streamId", stream_id))
        })?;

        let log = Arc::downgrade(self);
        admin.register("AdminLog_unsubscribe", true, move |req: &Request| {
            let log = log
                .upgrade()
                .ok_or_else(|| CommandError::Failed("log closed".into()))?;
            let stream_id = req
                .arg_str("streamId")
                .ok_or(CommandError::MissingArgument("streamId"))?;
            if log.unsubscribe(stream_id) {
                Ok(ok_response())
            } else {
                Err(CommandError::Failed("No such subscription.".into()))
            }
        })?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Log for AdminLog {
    fn emit(&self, level: Level, message: &str) {
        self.mirror.emit(level, message);

        let targets: Vec<Subscription> = self
            .lock()
            .iter()
            .filter(|s| level >= s.level)
            .cloned()
            .collect();

        for sub in targets {
            let entry = Dict::new()
                .with("level", level.as_str())
                .with("message", message)
                .with("streamId", sub.stream_id)
                .with("time", super::auth::unix_now().to_string())
                .with("txid", sub.txid);

            if self.outbound.try_send(entry).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl fmt::Debug for AdminLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminLog")
            .field("subscribers", &self.subscriber_count())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::testing::{admin, auth_request};
    use crate::log::testing::MemoryLog;

    #[test]
    fn test_levels_filter_subscribers() {
        let mirror = Arc::new(MemoryLog::default());
        let (log, mut rx) = AdminLog::new(mirror.clone(), 16);

        let warn_stream = log.subscribe(Level::Warn, b"w".to_vec());
        log.info("quiet");
        log.error("loud");

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.get_str(b"message"), Some("loud"));
        assert_eq!(entry.get_str(b"level"), Some("ERROR"));
        assert_eq!(entry.get_str(b"streamId"), Some(warn_stream.as_str()));
        assert_eq!(entry.get_str(b"txid"), Some("w"));
        assert!(rx.try_recv().is_err());

        // Everything reaches the local mirror
        assert_eq!(mirror.messages().len(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let (log, mut rx) = AdminLog::new(Arc::new(MemoryLog::default()), 16);
        let id = log.subscribe(Level::Debug, b"t".to_vec());
        assert!(log.unsubscribe(&id));
        assert!(!log.unsubscribe(&id));

        log.info("nobody listening");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops() {
        let (log, _rx) = AdminLog::new(Arc::new(MemoryLog::default()), 1);
        log.subscribe(Level::Debug, b"t".to_vec());
        log.info("one");
        log.info("two");
        log.info("three");
        assert_eq!(log.dropped(), 2);
    }

    #[test]
    fn test_subscribe_command() {
        let admin = admin();
        let (log, mut rx) = AdminLog::new(Arc::new(MemoryLog::default()), 16);
        log.register_commands(&admin).unwrap();

        let response = admin
            .handle(auth_request(
                "AdminLog_subscribe",
                "sub-1",
                Dict::new().with("level", "warn"),
            ))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some("none"));
        let stream_id = response.get_str(b"streamId").unwrap().to_string();

        log.warn("disk on fire");
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.get_str(b"txid"), Some("sub-1"));

        let response = admin
            .handle(auth_request(
                "AdminLog_unsubscribe",
                "sub-2",
                Dict::new().with("streamId", stream_id),
            ))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some("none"));
        assert_eq!(log.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_rejects_bad_level() {
        let admin = admin();
        let (log, _rx) = AdminLog::new(Arc::new(MemoryLog::default()), 16);
        log.register_commands(&admin).unwrap();

        let response = admin
            .handle(auth_request(
                "AdminLog_subscribe",
                "x",
                Dict::new().with("level", "chatty"),
            ))
            .unwrap();
        assert_eq!(response.get_str(b"error"), Some("invalid argument 'level'"));
    }
}
