//! Refresh scheduling.
//!
//! Notifications only tell us *that* something changed, never the full
//! picture, so each one schedules a reload of the affected slice of the
//! model. Scheduling is a bitmask OR plus a wakeup: any number of
//! notifications arriving before the coordinator runs collapse into a
//! single pass. The C ancestry used a self-pipe for the wakeup; here a
//! [`tokio::sync::Notify`] plays that role.

use parking_lot::Mutex;
use tokio::sync::Notify;

bitflags::bitflags! {
    /// Which reload procedures the next refresh pass must run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RefreshFlags: u8 {
        const PANES    = 1 << 0;
        const WINDOWS  = 1 << 1;
        const SESSIONS = 1 << 2;
        const CLIENTS  = 1 << 3;
    }
}

/// Pending-refresh state shared between the parsers and the coordinator.
#[derive(Debug, Default)]
pub struct RefreshQueue {
    pending: Mutex<RefreshFlags>,
    notify: Notify,
}

impl Default for RefreshFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl RefreshQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate flags and wake the coordinator.
    pub fn queue(&self, flags: RefreshFlags) {
        if flags.is_empty() {
            return;
        }
        *self.pending.lock() |= flags;
        self.notify.notify_one();
    }

    /// Snapshot and clear the accumulated flags.
    #[must_use]
    pub fn take(&self) -> RefreshFlags {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Put unprocessed flags back for the next pass (reload failure).
    pub fn restore(&self, flags: RefreshFlags) {
        if flags.is_empty() {
            return;
        }
        *self.pending.lock() |= flags;
        self.notify.notify_one();
    }

    /// Wait until at least one `queue` call has happened.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
