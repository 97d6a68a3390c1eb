//! Wait queue for readers blocked on an empty passive buffer.
//!
//! Readers take a [`Ticket`] *before* checking for data and then wait on
//! it, so a wake that lands between the check and the wait is not lost.
//! Wakes and interruptions are counted separately: a wake makes the waiter
//! re-validate, an interruption makes it give up with
//! [`AdcError::Interrupted`].

use parking_lot::{Condvar, Mutex};

use crate::error::{AdcError, Result};

/// Wake and interruption counts observed when a waiter registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    wakes: u64,
    interrupts: u64,
}

#[derive(Debug, Default)]
struct Counts {
    wakes: u64,
    interrupts: u64,
}

/// Condition variable plus the generation counters it guards.
#[derive(Debug, Default)]
pub struct WaitQueue {
    counts: Mutex<Counts>,
    cond: Condvar,
}

impl WaitQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next wake.
    pub fn ticket(&self) -> Ticket {
        let counts = self.counts.lock();
        Ticket {
            wakes: counts.wakes,
            interrupts: counts.interrupts,
        }
    }

    /// Wake every waiter. Safe to call from the completion handler.
    pub fn wake_all(&self) {
        let mut counts = self.counts.lock();
        counts.wakes = counts.wakes.wrapping_add(1);
        drop(counts);
        self.cond.notify_all();
    }

    /// Make every current waiter return [`AdcError::Interrupted`].
    pub fn interrupt_all(&self) {
        let mut counts = self.counts.lock();
        counts.interrupts = counts.interrupts.wrapping_add(1);
        drop(counts);
        self.cond.notify_all();
    }

    /// Block until a wake or an interruption issued after `ticket` was taken.
    ///
    /// Returns immediately if one already happened.
    pub fn wait(&self, ticket: Ticket) -> Result<()> {
        let mut counts = self.counts.lock();
        loop {
            if counts.interrupts != ticket.interrupts {
                return Err(AdcError::Interrupted);
            }
            if counts.wakes != ticket.wakes {
                return Ok(());
            }
            self.cond.wait(&mut counts);
        }
    }
}
