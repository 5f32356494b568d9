//! Routing module handle.

use crate::admin::{Admin, AdminError, Request};
use crate::arena::{Arena, ArenaError, Reservation};
use crate::benc::Dict;
use crate::log::Log;
use crate::node::switch::SwitchCore;
use fcnet_crypto::Address;
use fcnet_crypto::x25519::PublicKey;
use std::sync::Arc;

/// Bytes charged to the arena for the router.
pub const FOOTPRINT: usize = 64 * 1024;

/// Routing table owner. Knows the node's own key and address.
pub struct RouterModule {
    public_key: PublicKey,
    address: Address,
    switch: Arc<SwitchCore>,
    _footprint: Reservation,
}

impl RouterModule {
    /// Create the router for a node.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold it.
    pub fn new(
        switch: Arc<SwitchCore>,
        public_key: PublicKey,
        address: Address,
        log: &dyn Log,
        arena: &Arc<Arena>,
    ) -> Result<Arc<Self>, ArenaError> {
        let footprint = arena.reserve(FOOTPRINT)?;
        log.info(&format!("router ready for {address}"));
        Ok(Arc::new(Self {
            public_key,
            address,
            switch,
            _footprint: footprint,
        }))
    }

    /// This node's address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// This node's public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The switch this router sends through.
    #[must_use]
    pub fn switch(&self) -> &Arc<SwitchCore> {
        &self.switch
    }

    /// Register `RouterModule_status`.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let this = Arc::clone(self);
        admin.register("RouterModule_status", false, move |_: &Request| {
            Ok(Dict::new()
                .with("ipv6", this.address.to_string())
                .with("publicKey", hex::encode(this.public_key.as_bytes())))
        })
    }
}

impl std::fmt::Debug for RouterModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterModule")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
