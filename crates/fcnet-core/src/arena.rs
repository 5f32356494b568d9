//! Bounded memory accounting.
//!
//! The core handles attacker-reachable input, so everything it keeps alive
//! (subsystem state, in-flight admin messages) is charged against a single
//! [`Arena`] with a hard ceiling. Going over the ceiling is
//! [`ArenaError::Exhausted`], which the bootstrap treats as fatal. The ceiling
//! is never raised at runtime.
//!
//! # Example
//!
//! ```
//! use fcnet_core::arena::Arena;
//!
//! let arena = Arena::new(1024);
//! let held = arena.reserve(512).unwrap();
//! assert_eq!(arena.bytes_allocated(), 512);
//! assert!(arena.reserve(1024).is_err());
//! drop(held);
//! assert_eq!(arena.bytes_allocated(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Default ceiling: 4 MiB.
pub const ALLOCATOR_FAILSAFE: usize = 1 << 22;

/// Arena errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// Reservation would exceed the ceiling
    #[error("memory ceiling exceeded: requested {requested} bytes with {live} of {limit} in use")]
    Exhausted {
        /// Bytes requested
        requested: usize,
        /// Bytes in use at the time
        live: usize,
        /// Configured ceiling
        limit: usize,
    },
}

/// Memory budget shared by every subsystem of one core process.
#[derive(Debug)]
pub struct Arena {
    limit: usize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl Arena {
    /// Create an arena with the given ceiling in bytes.
    #[must_use]
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Reserve `bytes` until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Exhausted`] if the reservation would push the
    /// live total above the ceiling.
    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Result<Reservation, ArenaError> {
        let mut live = self.live.load(Ordering::Relaxed);
        loop {
            let next = live
                .checked_add(bytes)
                .filter(|&n| n <= self.limit)
                .ok_or(ArenaError::Exhausted {
                    requested: bytes,
                    live,
                    limit: self.limit,
                })?;

            match self
                .live
                .compare_exchange_weak(live, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::Relaxed);
                    return Ok(Reservation {
                        arena: Arc::clone(self),
                        bytes,
                    });
                }
                Err(current) => live = current,
            }
        }
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Highest live total seen so far.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Configured ceiling.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Guard for reserved bytes; releases them on drop.
#[derive(Debug)]
pub struct Reservation {
    arena: Arc<Arena>,
    bytes: usize,
}

impl Reservation {
    /// Size of this reservation.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.arena.live.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
