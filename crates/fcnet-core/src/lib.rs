//! # fcnet Core
//!
//! The unprivileged worker half of an fcnet node. A supervisor ("angel")
//! starts the core with two pipe descriptors and sends it everything it needs
//! over them: private key, admin password and tunnel settings. The core
//! acknowledges with a sync token, checks its identity, brings up its
//! subsystems and then serves admin requests on the same pipes.
//!
//! This crate provides:
//! - Bencode codec and incremental framing
//! - Pipe channel with bounded reads
//! - Supervisor handshake
//! - Memory arena with a hard ceiling
//! - Admin command server with cookie authentication and log streaming
//! - Subsystem bootstrap sequencer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   config    ┌──────────────────────────────────┐
//! │              │ ──────────► │ handshake ─► identity ─► node    │
//! │    angel     │ ◄────────── │                                  │
//! │ (supervisor) │  ack, admin │ admin server ◄─► command registry│
//! │              │ ◄─────────► │                                  │
//! └──────────────┘             └──────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod admin;
pub mod arena;
pub mod benc;
pub mod channel;
pub mod error;
pub mod handshake;
pub mod log;
pub mod node;

pub use admin::{Admin, AdminServer, ServeExit};
pub use arena::{ALLOCATOR_FAILSAFE, Arena};
pub use benc::{Dict, Value};
pub use channel::Channel;
pub use error::CoreError;
pub use handshake::{Handshake, InitialConfig, SyncToken};
pub use node::{Core, CoreSettings, NetworkIdentity};
