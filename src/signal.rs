//! Ctrl-C handling for the sync stages.
//!
//! The first Ctrl-C sets a [`CancelFlag`] that the sync loop checks between
//! table loads, so a table is never left half-built. A second Ctrl-C exits
//! immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
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

/// Spawn a task that trips `flag` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(flag: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received; stopping after the current table");
        flag.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt received; exiting");
            std::process::exit(130);
        }
    });
}
