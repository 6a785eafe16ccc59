//! Cooperative cancellation.
//!
//! The engine never installs signal handlers itself; the embedding process
//! (CLI or GUI) raises the flag from wherever it catches SIGINT/SIGTERM.
//! Long operations poll it between directory-walk entries and before each
//! file read.  On cancellation the in-progress entry is abandoned before
//! any payload bytes are written, finalization still runs so the archive
//! stays consistent, and the operation returns `Error::Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
