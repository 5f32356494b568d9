//! Glue between the router, the switch and the local tunnel device.
//!
//! The ducttape attaches the router to the switch and, once asked, records
//! the tunnel device the node's own traffic enters through. Device packet
//! I/O is not handled here.

use crate::admin::{Admin, AdminError, CommandError, Request, ok_response};
use crate::arena::{Arena, ArenaError, Reservation};
use crate::handshake::{DEFAULT_ADDRESS_PREFIX, TunnelRequest};
use crate::log::Log;
use crate::node::router::RouterModule;
use crate::node::switch::{SwitchCore, SwitchError};
use fcnet_crypto::Address;
use fcnet_crypto::x25519::PrivateKey;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Bytes charged to the arena for the ducttape.
pub const FOOTPRINT: usize = 4 * 1024;

/// Bytes charged to the arena for a tunnel device.
pub const TUNNEL_FOOTPRINT: usize = 16 * 1024;

/// Worst-case per-packet overhead of the mesh encapsulation.
pub const WORST_CASE_OVERHEAD: u32 = 340;

/// MTU given to the tunnel device.
pub const DEFAULT_MTU: u32 = 1492 - WORST_CASE_OVERHEAD + 40 + 120;

/// Name used when the caller does not pick a device.
pub const AUTO_DEVICE_NAME: &str = "tun0";

/// Tunnel errors
#[derive(Debug, Error)]
pub enum TunnelError {
    /// A device is already set up
    #[error("tunnel device [{0}] is already initialized")]
    AlreadyInitialized(String),

    /// Prefix length is not a valid IPv6 prefix
    #[error("invalid address prefix /{0}")]
    InvalidPrefix(u8),

    /// No memory for the device
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// A configured tunnel device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDevice {
    /// Interface name
    pub name: String,
    /// Address assigned to the interface
    pub address: Address,
    /// Prefix length
    pub prefix: u8,
    /// Interface MTU
    pub mtu: u32,
}

struct ActiveTunnel {
    device: TunnelDevice,
    _footprint: Reservation,
}

/// Router/switch glue.
pub struct Ducttape {
    router: Arc<RouterModule>,
    switch: Arc<SwitchCore>,
    switch_slot: usize,
    tunnel: Mutex<Option<ActiveTunnel>>,
    arena: Arc<Arena>,
    log: Arc<dyn Log>,
    _footprint: Reservation,
}

/// Ducttape construction errors
#[derive(Debug, Error)]
pub enum DucttapeError {
    /// No memory
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Could not attach the router to the switch
    #[error(transparent)]
    Switch(#[from] SwitchError),

    /// The private key is not the one the router was built for
    #[error("private key does not match the router's public key")]
    KeyMismatch,
}

impl Ducttape {
    /// Attach `router` to `switch` for the node owning `private_key`.
    ///
    /// # Errors
    ///
    /// Fails if the key is not the router's, the arena cannot hold the glue
    /// or the switch is full.
    pub fn new(
        switch: Arc<SwitchCore>,
        router: Arc<RouterModule>,
        private_key: &PrivateKey,
        log: Arc<dyn Log>,
        arena: &Arc<Arena>,
    ) -> Result<Arc<Self>, DucttapeError> {
        if private_key.public_key() != *router.public_key() {
            return Err(DucttapeError::KeyMismatch);
        }
        let footprint = arena.reserve(FOOTPRINT)?;
        let switch_slot = switch.attach("router")?;
        Ok(Arc::new(Self {
            router,
            switch,
            switch_slot,
            tunnel: Mutex::new(None),
            arena: Arc::clone(arena),
            log,
            _footprint: footprint,
        }))
    }

    /// Slot the router occupies on the switch.
    #[must_use]
    pub fn switch_slot(&self) -> usize {
        self.switch_slot
    }

    /// The switch this glue is attached to.
    #[must_use]
    pub fn switch(&self) -> &Arc<SwitchCore> {
        &self.switch
    }

    /// Set up the tunnel device for this node's address.
    ///
    /// # Errors
    ///
    /// [`TunnelError::AlreadyInitialized`] on a second call,
    /// [`TunnelError::InvalidPrefix`] for a prefix over 128.
    pub fn init_tunnel(&self, request: &TunnelRequest) -> Result<TunnelDevice, TunnelError> {
        if request.address_prefix > 128 {
            return Err(TunnelError::InvalidPrefix(request.address_prefix));
        }

        let mut tunnel = self.tunnel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = tunnel.as_ref() {
            return Err(TunnelError::AlreadyInitialized(active.device.name.clone()));
        }

        self.log.debug(&format!(
            "Initializing TUN device [{}]",
            request.device.as_deref().unwrap_or("<auto>")
        ));

        let footprint = self.arena.reserve(TUNNEL_FOOTPRINT)?;
        let device = TunnelDevice {
            name: request
                .device
                .clone()
                .unwrap_or_else(|| AUTO_DEVICE_NAME.to_string()),
            address: self.router.address(),
            prefix: request.address_prefix,
            mtu: DEFAULT_MTU,
        };
        *tunnel = Some(ActiveTunnel {
            device: device.clone(),
            _footprint: footprint,
        });

        self.log.info(&format!(
            "tunnel [{}] up with {}/{} mtu {}",
            device.name, device.address, device.prefix, device.mtu
        ));
        Ok(device)
    }

    /// The tunnel device, if one was set up.
    #[must_use]
    pub fn tunnel(&self) -> Option<TunnelDevice> {
        self.tunnel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.device.clone())
    }

    /// Register `Core_initTunnel`.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let this = Arc::clone(self);
        admin.register("Core_initTunnel", true, move |req: &Request| {
            let device = match req.arg_bytes("desiredTunName") {
                None => None,
                Some(name) => Some(
                    std::str::from_utf8(name)
                        .map_err(|_| CommandError::InvalidArgument("desiredTunName"))?
                        .to_string(),
                ),
            };
            let address_prefix = match req.arg_int("addressPrefix") {
                None => DEFAULT_ADDRESS_PREFIX,
                Some(p) => u8::try_from(p).map_err(|_| CommandError::InvalidArgument("addressPrefix"))?,
            };

            let device = this
                .init_tunnel(&TunnelRequest {
                    device,
                    address_prefix,
                })
                .map_err(|e| CommandError::Failed(e.to_string()))?;
            Ok(ok_response().with("tunDevice", device.name))
        })
    }
}

impl std::fmt::Debug for Ducttape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ducttape")
            .field("switch_slot", &self.switch_slot)
            .field("tunnel", &self.tunnel())
            .finish_non_exhaustive()
    }
}
