//! Top-level error type.
//!
//! Every variant is fatal: the core logs it and exits non-zero. Request-level
//! failures never reach this type; they are answered on the admin channel.

use crate::admin::AdminError;
use crate::arena::ArenaError;
use crate::channel::ChannelError;
use crate::handshake::HandshakeError;
use crate::node::ducttape::{DucttapeError, TunnelError};
use crate::node::identity::IdentityError;
use thiserror::Error;

/// Fatal core errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Handshake with the supervisor failed
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Private key does not yield a usable identity
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Memory ceiling exceeded
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Admin server failure
    #[error("admin server: {0}")]
    Admin(#[from] AdminError),

    /// Supervisor channel failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Subsystem wiring failed
    #[error("subsystem setup failed: {0}")]
    Ducttape(#[from] DucttapeError),

    /// Tunnel setup failed
    #[error("tunnel setup failed: {0}")]
    Tunnel(#[from] TunnelError),
}

/// Result alias for fatal core errors
pub type Result<T> = std::result::Result<T, CoreError>;
