//! Interface controller handle.
//!
//! Owns the peers reachable over the node's network interfaces. Interface
//! drivers attach through the switch; the controller keeps the per-peer view
//! reported over the admin channel.

use crate::admin::{Admin, AdminError, Request};
use crate::arena::{Arena, ArenaError, Reservation};
use crate::benc::{Dict, Value};
use crate::node::crypto_auth::CryptoAuth;
use crate::node::router::RouterModule;
use crate::node::switch::SwitchCore;
use std::sync::{Arc, Mutex, PoisonError};

/// Bytes charged to the arena for the controller.
pub const FOOTPRINT: usize = 8 * 1024;

/// Per-peer state as reported by `InterfaceController_peerStats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStats {
    /// Peer public key, hex
    pub public_key: String,
    /// Switch slot the peer's interface occupies
    pub switch_slot: usize,
    /// Bytes received from the peer
    pub bytes_in: u64,
    /// Bytes sent to the peer
    pub bytes_out: u64,
}

impl From<&PeerStats> for Dict {
    fn from(peer: &PeerStats) -> Self {
        Dict::new()
            .with("publicKey", peer.public_key.as_str())
            .with("switchLabel", peer.switch_slot)
            .with("bytesIn", i64::try_from(peer.bytes_in).unwrap_or(i64::MAX))
            .with("bytesOut", i64::try_from(peer.bytes_out).unwrap_or(i64::MAX))
    }
}

/// Peer bookkeeping over the session layer, switch and router.
pub struct InterfaceController {
    crypto_auth: Arc<CryptoAuth>,
    switch: Arc<SwitchCore>,
    router: Arc<RouterModule>,
    peers: Mutex<Vec<PeerStats>>,
    _footprint: Reservation,
}

impl InterfaceController {
    /// Create the controller.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold it.
    pub fn new(
        crypto_auth: Arc<CryptoAuth>,
        switch: Arc<SwitchCore>,
        router: Arc<RouterModule>,
        arena: &Arc<Arena>,
    ) -> Result<Arc<Self>, ArenaError> {
        let footprint = arena.reserve(FOOTPRINT)?;
        Ok(Arc::new(Self {
            crypto_auth,
            switch,
            router,
            peers: Mutex::new(Vec::new()),
            _footprint: footprint,
        }))
    }

    /// Record a peer.
    pub fn add_peer(&self, peer: PeerStats) {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer);
    }

    /// Snapshot of all peers.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerStats> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The session layer peers authenticate against.
    #[must_use]
    pub fn crypto_auth(&self) -> &Arc<CryptoAuth> {
        &self.crypto_auth
    }

    /// The switch peers are attached to.
    #[must_use]
    pub fn switch(&self) -> &Arc<SwitchCore> {
        &self.switch
    }

    /// The router peers are announced to.
    #[must_use]
    pub fn router(&self) -> &Arc<RouterModule> {
        &self.router
    }

    /// Register `InterfaceController_peerStats`.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let this = Arc::clone(self);
        admin.register("InterfaceController_peerStats", false, move |_: &Request| {
            let peers: Vec<Value> = this
                .peers()
                .iter()
                .map(|p| Value::from(Dict::from(p)))
                .collect();
            Ok(Dict::new().with("total", peers.len()).with("peers", peers))
        })
    }
}

impl std::fmt::Debug for InterfaceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceController")
            .field("peers", &self.peers().len())
            .finish_non_exhaustive()
    }
}
