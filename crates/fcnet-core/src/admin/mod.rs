//! Administrative command server.
//!
//! After the handshake the supervisor pipes become an RPC channel. Each
//! request is one bencoded dictionary:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `q` | Command name, or `auth` for an authenticated call |
//! | `txid` | Opaque caller-chosen id, echoed in the response |
//! | `aq` | Command name for `q=auth` |
//! | `cookie`, `hash` | Credential for `q=auth`, see [`auth`] |
//! | `args` | Command arguments (top-level fields are used if absent) |
//!
//! Every response carries the request's `txid`. Request-level problems
//! (unknown command, failed authentication, handler error) come back as
//! `{"error": ...}` and never stop the server. Messages that cannot be
//! decoded, or that have no `txid`, are dropped.
//!
//! Subsystems become controllable by calling [`Admin::register`]. The
//! registry is shared, so commands registered after the server starts are
//! visible to every later request.

pub mod auth;
pub mod builtin;
pub mod log;
pub mod server;

pub use self::log::AdminLog;
pub use server::{AdminServer, ServeExit};

use crate::arena::ArenaError;
use crate::benc::{self, Dict, Value};
use crate::channel::ChannelError;
use crate::handshake::SyncToken;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

/// Response text for failed authentication.
pub const AUTH_FAILED: &str = "Auth failed.";

/// Response text for an unknown command.
pub const NO_SUCH_FUNCTION: &str = "No such function";

/// Error text when a command handler panics.
pub const COMMAND_PANICKED: &str = "Command failed internally.";

/// Admin server errors
#[derive(Debug, Error)]
pub enum AdminError {
    /// A command with this name already exists
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    /// Channel failure (fatal)
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Memory ceiling exceeded (fatal)
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Request-level failure reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A required argument is absent
    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    /// An argument has the wrong type or value
    #[error("invalid argument '{0}'")]
    InvalidArgument(&'static str),

    /// The handler could not complete
    #[error("{0}")]
    Failed(String),
}

/// A decoded admin request as seen by a handler.
#[derive(Debug, Clone)]
pub struct Request {
    /// Command name
    pub name: String,
    /// Caller's transaction id
    pub txid: Vec<u8>,
    /// Command arguments
    pub args: Dict,
    /// Whether the request passed password authentication
    pub authenticated: bool,
}

impl Request {
    /// String argument.
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get_str(key.as_bytes())
    }

    /// Byte-string argument.
    #[must_use]
    pub fn arg_bytes(&self, key: &str) -> Option<&[u8]> {
        self.args.get_bytes(key.as_bytes())
    }

    /// Integer argument.
    #[must_use]
    pub fn arg_int(&self, key: &str) -> Option<i64> {
        self.args.get_int(key.as_bytes())
    }

    /// Required byte-string argument.
    ///
    /// # Errors
    ///
    /// [`CommandError::MissingArgument`] if absent, [`CommandError::InvalidArgument`]
    /// if present but not a byte string.
    pub fn require_bytes(&self, key: &'static str) -> Result<&[u8], CommandError> {
        match self.args.get(key.as_bytes()) {
            None => Err(CommandError::MissingArgument(key)),
            Some(value) => value.as_bytes().ok_or(CommandError::InvalidArgument(key)),
        }
    }
}

/// A named remote procedure.
pub trait Command: Send + Sync {
    /// Handle one request and produce the response body.
    ///
    /// # Errors
    ///
    /// A [`CommandError`] becomes an `{"error": ...}` response.
    fn invoke(&self, request: &Request) -> Result<Dict, CommandError>;
}

impl<F> Command for F
where
    F: Fn(&Request) -> Result<Dict, CommandError> + Send + Sync,
{
    fn invoke(&self, request: &Request) -> Result<Dict, CommandError> {
        self(request)
    }
}

#[derive(Clone)]
struct Registration {
    handler: Arc<dyn Command>,
    requires_auth: bool,
}

/// Admin settings.
#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// How far a cookie may be from the current time
    pub cookie_window: Duration,
    /// Largest accepted request
    pub max_message_size: usize,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            cookie_window: Duration::from_secs(10),
            max_message_size: 64 * 1024,
        }
    }
}

/// Command registry and dispatcher.
pub struct Admin {
    commands: DashMap<String, Registration>,
    password: Zeroizing<Vec<u8>>,
    sync_token: SyncToken,
    settings: AdminSettings,
    exit: Mutex<Option<i32>>,
}

impl Admin {
    /// Create a dispatcher that authenticates against `password`.
    #[must_use]
    pub fn new(
        password: Zeroizing<Vec<u8>>,
        sync_token: SyncToken,
        settings: AdminSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            commands: DashMap::new(),
            password,
            sync_token,
            settings,
            exit: Mutex::new(None),
        })
    }

    /// The token sent to the supervisor during the handshake.
    #[must_use]
    pub fn sync_token(&self) -> SyncToken {
        self.sync_token
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }

    /// Register a closure as a command.
    ///
    /// # Errors
    ///
    /// [`AdminError::DuplicateCommand`] if the name is taken; the existing
    /// registration is left untouched.
    pub fn register<F>(&self, name: &str, requires_auth: bool, handler: F) -> Result<(), AdminError>
    where
        F: Fn(&Request) -> Result<Dict, CommandError> + Send + Sync + 'static,
    {
        self.register_command(name, requires_auth, Arc::new(handler))
    }

    /// Register a command object.
    ///
    /// # Errors
    ///
    /// [`AdminError::DuplicateCommand`] if the name is taken.
    pub fn register_command(
        &self,
        name: &str,
        requires_auth: bool,
        handler: Arc<dyn Command>,
    ) -> Result<(), AdminError> {
        match self.commands.entry(name.to_string()) {
            Entry::Occupied(_) => Err(AdminError::DuplicateCommand(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    handler,
                    requires_auth,
                });
                tracing::debug!(command = name, requires_auth, "registered admin command");
                Ok(())
            }
        }
    }

    /// Whether a command is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Whether a registered command requires authentication.
    #[must_use]
    pub fn requires_auth(&self, name: &str) -> Option<bool> {
        self.commands.get(name).map(|r| r.requires_auth)
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Ask the server loop to end the process with `code` after the
    /// current response is written.
    pub fn request_exit(&self, code: i32) {
        match self.exit.lock() {
            Ok(mut guard) => *guard = Some(code),
            Err(poisoned) => *poisoned.into_inner() = Some(code),
        }
    }

    /// Exit code requested by a command, if any.
    #[must_use]
    pub fn exit_requested(&self) -> Option<i32> {
        match self.exit.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Decode and handle one raw message.
    ///
    /// A message that does not decode is answered with an error if its
    /// transaction id can still be read from it. Returns `None` when the
    /// message is dropped (no usable transaction id).
    #[must_use]
    pub fn dispatch(&self, bytes: &[u8]) -> Option<Dict> {
        match benc::decode_dict(bytes) {
            Ok(message) => self.handle(message),
            Err(e) => {
                let Some(txid) = benc::find_bytes(bytes, b"txid") else {
                    tracing::warn!(error = %e, len = bytes.len(), "dropping undecodable admin message");
                    return None;
                };
                tracing::debug!(error = %e, "rejecting malformed admin message");
                Some(error_response(&format!("invalid request: {e}")).with("txid", txid))
            }
        }
    }

    /// Handle one decoded message.
    #[must_use]
    pub fn handle(&self, mut message: Dict) -> Option<Dict> {
        let Some(Value::Bytes(txid)) = message.remove(b"txid") else {
            tracing::warn!("dropping admin message without txid");
            return None;
        };

        let mut response = self.respond(message, &txid);
        response.insert("txid", txid);
        Some(response)
    }

    fn respond(&self, mut message: Dict, txid: &[u8]) -> Dict {
        let Some(q) = take_string(&mut message, b"q") else {
            return error_response("missing 'q'");
        };

        let (name, authenticated) = if q == "auth" {
            match auth::authenticate(&self.password, self.settings.cookie_window, &mut message) {
                Ok(name) => (name, true),
                Err(e) => {
                    tracing::debug!(error = %e, "admin authentication failed");
                    return error_response(AUTH_FAILED);
                }
            }
        } else {
            (q, false)
        };

        // Clone out of the map so handlers may register further commands.
        let Some(registration) = self.commands.get(&name).map(|r| r.clone()) else {
            return error_response(NO_SUCH_FUNCTION);
        };

        if registration.requires_auth && !authenticated {
            return error_response(AUTH_FAILED);
        }

        let args = match message.remove(b"args") {
            Some(Value::Dict(args)) => args,
            _ => message,
        };

        let request = Request {
            name,
            txid: txid.to_vec(),
            args,
            authenticated,
        };

        // A panicking handler fails its own request only.
        match catch_unwind(AssertUnwindSafe(|| registration.handler.invoke(&request))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(command = %request.name, error = %e, "admin command failed");
                error_response(&e.to_string())
            }
            Err(_) => {
                tracing::error!(command = %request.name, "admin command panicked");
                error_response(COMMAND_PANICKED)
            }
        }
    }
}

impl fmt::Debug for Admin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admin")
            .field("commands", &self.commands.len())
            .field("sync_token", &self.sync_token)
            .finish_non_exhaustive()
    }
}

/// `{"error": message}`
#[must_use]
pub fn error_response(message: &str) -> Dict {
    Dict::new().with("error", message)
}

/// `{"error": "none"}`
#[must_use]
pub fn ok_response() -> Dict {
    error_response("none")
}

fn take_string(message: &mut Dict, key: &[u8]) -> Option<String> {
    match message.remove(key)? {
        Value::Bytes(b) => String::from_utf8(b).ok(),
        _ => None,
    }
}
