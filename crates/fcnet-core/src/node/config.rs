//! Core settings

use crate::admin::AdminSettings;
use crate::admin::log::LOG_QUEUE_CAPACITY;
use crate::arena::ALLOCATOR_FAILSAFE;
use crate::handshake::INITIAL_CONF_BUFF_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one core process.
///
/// Everything the supervisor does not send lives here. Defaults match what
/// a supervisor expects; a settings file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Memory ceiling in bytes
    pub arena_limit: usize,

    /// Largest accepted initial config in bytes
    pub max_config_size: usize,

    /// Largest accepted admin request in bytes
    pub max_message_size: usize,

    /// Accepted cookie age for authenticated admin calls, in seconds
    pub cookie_window_secs: u64,

    /// Admin log messages buffered before new ones are dropped
    pub log_queue_capacity: usize,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            arena_limit: ALLOCATOR_FAILSAFE,
            max_config_size: INITIAL_CONF_BUFF_SIZE,
            max_message_size: 64 * 1024,
            cookie_window_secs: 10,
            log_queue_capacity: LOG_QUEUE_CAPACITY,
        }
    }
}

impl CoreSettings {
    /// Settings for the admin server.
    #[must_use]
    pub fn admin(&self) -> AdminSettings {
        AdminSettings {
            cookie_window: Duration::from_secs(self.cookie_window_secs),
            max_message_size: self.max_message_size,
        }
    }
}
