//! Session identities handed out at accept time

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Label of a connected session, rendered as `User<N>`
///
/// The number comes from a process-wide counter and is never reused, so two
/// live sessions can never share an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u64);

impl Identity {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User{}", self.0)
    }
}

/// Monotonic source of identities, starting at `User1`
#[derive(Debug)]
pub struct IdentityAllocator {
    next: AtomicU64,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> Identity {
        Identity(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
