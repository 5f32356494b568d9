//! Switch fabric handle.
//!
//! Forwarding happens elsewhere; the core only tracks which interfaces are
//! attached to the switch and in which slot.

use crate::admin::{Admin, AdminError, Request};
use crate::arena::{Arena, ArenaError, Reservation};
use crate::benc::{Dict, Value};
use crate::log::Log;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Bytes charged to the arena for the switch.
pub const FOOTPRINT: usize = 8 * 1024;

/// Most interfaces one switch accepts.
pub const MAX_INTERFACES: usize = 256;

/// Switch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// Every slot is in use
    #[error("switch has no free interface slots")]
    Full,
}

/// Switch fabric state.
pub struct SwitchCore {
    interfaces: Mutex<Vec<String>>,
    log: Arc<dyn Log>,
    _footprint: Reservation,
}

impl SwitchCore {
    /// Create the switch.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold it.
    pub fn new(log: Arc<dyn Log>, arena: &Arc<Arena>) -> Result<Arc<Self>, ArenaError> {
        let footprint = arena.reserve(FOOTPRINT)?;
        Ok(Arc::new(Self {
            interfaces: Mutex::new(Vec::new()),
            log,
            _footprint: footprint,
        }))
    }

    /// Attach a named interface and return its slot.
    ///
    /// # Errors
    ///
    /// [`SwitchError::Full`] once [`MAX_INTERFACES`] are attached.
    pub fn attach(&self, name: &str) -> Result<usize, SwitchError> {
        let mut interfaces = self.interfaces.lock().unwrap_or_else(PoisonError::into_inner);
        if interfaces.len() >= MAX_INTERFACES {
            return Err(SwitchError::Full);
        }
        interfaces.push(name.to_string());
        let slot = interfaces.len() - 1;
        drop(interfaces);

        self.log.debug(&format!("attached [{name}] to switch slot {slot}"));
        Ok(slot)
    }

    /// Attached interface names in slot order.
    #[must_use]
    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register `SwitchCore_status`.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn register_commands(self: &Arc<Self>, admin: &Admin) -> Result<(), AdminError> {
        let this = Arc::clone(self);
        admin.register("SwitchCore_status", false, move |_: &Request| {
            let names: Vec<Value> = this.interfaces().into_iter().map(Value::from).collect();
            Ok(Dict::new().with("interfaces", names))
        })
    }
}

impl std::fmt::Debug for SwitchCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchCore")
            .field("interfaces", &self.interfaces())
            .finish_non_exhaustive()
    }
}
