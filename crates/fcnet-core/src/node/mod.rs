//! Node bootstrap layer
//!
//! Turns a validated initial configuration into a running core: derives the
//! identity, brings up each subsystem in dependency order and wires their
//! admin commands.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Admin server (event loop)               │
//! ├─────────────────────────────────────────────────────────┤
//! │  InterfaceController  │  Ducttape  ──  tunnel device    │
//! ├─────────────────────────────────────────────────────────┤
//! │  CryptoAuth  │  SwitchCore  │  RouterModule             │
//! ├─────────────────────────────────────────────────────────┤
//! │  NetworkIdentity  │  Arena  │  IndirectLog              │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod crypto_auth;
pub mod ducttape;
pub mod identity;
pub mod interface;
pub mod router;
pub mod switch;

pub use bootstrap::{Core, bootstrap, run};
pub use config::CoreSettings;
pub use identity::{IdentityError, NetworkIdentity};
