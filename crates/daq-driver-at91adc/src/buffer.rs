//! Double buffer shared between the PDC and the consumer.
//!
//! Two DMA regions are allocated once per device. At any time one of them is
//! *active* (the PDC is filling it) and the other *passive* (complete and
//! readable). The role assignment, the read cursor into the passive buffer
//! and a swap generation live behind one small [`parking_lot::Mutex`] that is
//! only held to exchange roles or move the cursor, never while sample bytes
//! are copied. That keeps the critical section bounded so the completion
//! interrupt can take it.
//!
//! ```text
//!            swap()                      swap()
//!   ┌────────┐   ┌────────┐      ┌────────┐   ┌────────┐
//!   │ buf A  │   │ buf B  │  ->  │ buf A  │   │ buf B  │
//!   │ active │   │passive │      │passive │   │ active │
//!   └────────┘   └────────┘      └────────┘   └────────┘
//!                cursor ──►      cursor = 0
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::hal::DmaRegion;

/// Identifies one of the two sample buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    /// First buffer, active right after `open()`
    First,
    /// Second buffer, passive right after `open()`
    Second,
}

impl BufferId {
    /// The other buffer.
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

/// Role assignment and cursor, guarded by the pool lock.
#[derive(Debug)]
struct Roles {
    /// Buffer the PDC is filling; the passive one is always `active.other()`
    active: BufferId,
    /// Byte offset into the passive buffer
    cursor: usize,
    /// Bytes of valid data per completed buffer
    size: usize,
    /// PDC transfer count (samples) per buffer
    transfer_count: u32,
    /// Incremented on every swap
    generation: u64,
    /// Whether a streaming session owns the buffers
    armed: bool,
}

/// Consistent view of the passive buffer taken under the pool lock.
#[derive(Debug, Clone)]
pub struct PassiveView {
    /// The passive buffer
    pub buffer: Arc<DmaRegion>,
    /// Read cursor at the time of the snapshot
    pub cursor: usize,
    /// Valid bytes in the buffer
    pub size: usize,
    /// Swap generation at the time of the snapshot
    pub generation: u64,
}

impl PassiveView {
    /// Bytes left between the cursor and the end of valid data.
    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.cursor)
    }
}

/// The two sample buffers and their role assignment.
pub struct BufferPool {
    buffers: [Arc<DmaRegion>; 2],
    roles: Mutex<Roles>,
}

impl BufferPool {
    /// Build a pool over two DMA regions of equal capacity.
    pub fn new(first: Arc<DmaRegion>, second: Arc<DmaRegion>) -> Self {
        Self {
            buffers: [first, second],
            roles: Mutex::new(Roles {
                active: BufferId::First,
                cursor: 0,
                size: 0,
                transfer_count: 0,
                generation: 0,
                armed: false,
            }),
        }
    }

    /// Capacity of each buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.buffers[0].len().min(self.buffers[1].len())
    }

    /// The region backing `id`.
    pub fn buffer(&self, id: BufferId) -> &Arc<DmaRegion> {
        &self.buffers[id.index()]
    }

    /// Start a streaming session: first buffer active, second passive,
    /// cursor at `size` so nothing is readable before the first completion.
    pub fn reset(&self, size: usize, transfer_count: u32) {
        let mut roles = self.roles.lock();
        roles.active = BufferId::First;
        roles.cursor = size;
        roles.size = size;
        roles.transfer_count = transfer_count;
        roles.generation = 0;
        roles.armed = true;
    }

    /// End the streaming session. Late completions are ignored afterwards.
    pub fn disarm(&self) {
        self.roles.lock().armed = false;
    }

    /// Exchange the active and passive roles and rewind the cursor.
    ///
    /// Returns the new swap generation.
    pub fn swap(&self) -> u64 {
        let mut roles = self.roles.lock();
        Self::swap_locked(&mut roles)
    }

    fn swap_locked(roles: &mut Roles) -> u64 {
        roles.active = roles.active.other();
        roles.cursor = 0;
        roles.generation = roles.generation.wrapping_add(1);
        trace!(
            active = ?roles.active,
            generation = roles.generation,
            "Swapped sample buffers"
        );
        roles.generation
    }

    /// Complete one PDC transfer.
    ///
    /// Under the pool lock, `refill` is handed the buffer that just filled
    /// (about to become passive) together with the per-buffer transfer count
    /// so it can queue it as the PDC's next target; then the roles swap.
    /// Returns `None` without calling `refill` when no session is armed.
    pub fn complete_transfer<F>(&self, refill: F) -> Option<u64>
    where
        F: FnOnce(&DmaRegion, u32),
    {
        let mut roles = self.roles.lock();
        if !roles.armed {
            return None;
        }
        refill(&self.buffers[roles.active.index()], roles.transfer_count);
        Some(Self::swap_locked(&mut roles))
    }

    /// Snapshot the passive buffer, cursor and generation.
    pub fn snapshot(&self) -> PassiveView {
        let roles = self.roles.lock();
        PassiveView {
            buffer: Arc::clone(&self.buffers[roles.active.other().index()]),
            cursor: roles.cursor,
            size: roles.size,
            generation: roles.generation,
        }
    }

    /// Advance the cursor by `n` bytes, unless a swap happened since `view`
    /// was taken. Returns whether the cursor moved.
    pub fn advance(&self, view: &PassiveView, n: usize) -> bool {
        let mut roles = self.roles.lock();
        if roles.generation != view.generation || roles.cursor != view.cursor {
            trace!(
                snapshot_generation = view.generation,
                generation = roles.generation,
                "Swap interleaved with read, cursor left untouched"
            );
            return false;
        }
        roles.cursor = (roles.cursor + n).min(roles.size);
        true
    }

    /// Whether unread bytes remain in the passive buffer.
    pub fn has_data(&self) -> bool {
        let roles = self.roles.lock();
        roles.cursor < roles.size
    }

    /// Current read cursor.
    pub fn cursor(&self) -> usize {
        self.roles.lock().cursor
    }

    /// Valid bytes per completed buffer in the current session.
    pub fn size(&self) -> usize {
        self.roles.lock().size
    }

    /// Current swap generation.
    pub fn generation(&self) -> u64 {
        self.roles.lock().generation
    }

    /// Which buffer is currently active.
    pub fn active(&self) -> BufferId {
        self.roles.lock().active
    }

    /// Which buffer is currently passive.
    pub fn passive_id(&self) -> BufferId {
        self.roles.lock().active.other()
    }
}
