//! Cooperative cancellation for long-running flash operations

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Shared flag checked on every poll iteration
///
/// Cloning the token shares the flag, so a signal handler or another
/// thread can hold one clone while the flasher polls the other. A
/// cancelled operation stops at its next poll, which may be in the middle
/// of a bus transaction; recovery then means re-running controller init.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Error::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert_eq!(token.check(), Ok(()));
        other.cancel();
        assert_eq!(token.check(), Err(Error::Cancelled));
    }
}
