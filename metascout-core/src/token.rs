//! Request tokens: the engine's only race-prevention mechanism.
//!
//! Every asynchronous callback captures the token that was current when it
//! was dispatched and checks [`TokenClock::is_current`] before touching
//! shared state. A mismatch means the work was superseded or cancelled and
//! its result is dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, monotonically increasing request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mints request tokens. Clones share the same counter.
#[derive(Debug, Default, Clone)]
pub struct TokenClock {
    current: Arc<AtomicU64>,
}

impl TokenClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next token and make it current.
    pub fn next(&self) -> RequestToken {
        RequestToken(self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
    }

    pub fn current(&self) -> RequestToken {
        RequestToken(self.current.load(Ordering::Acquire))
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.current.load(Ordering::Acquire) == token.0
    }
}
