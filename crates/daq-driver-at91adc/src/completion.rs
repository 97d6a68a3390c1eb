//! Completion handler for the PDC end-of-receive interrupt.
//!
//! When the active buffer fills, the PDC has already moved on to the
//! buffer queued in RNPR/RNCR. The handler queues the buffer that just
//! filled as the next target, swaps roles so that buffer becomes readable,
//! and wakes blocked readers. Both register writes and the swap happen
//! under the pool lock; nothing here blocks or allocates.
//!
//! ```text
//!   PDC: [A filling] ──ENDRX──► [B filling], RNPR ◄─ A
//!   roles:  active=A passive=B  ──swap──►  active=B passive=A, cursor=0
//! ```

use std::sync::Weak;

use tracing::{trace, warn};

use crate::device::Shared;
use crate::hal::InterruptHandler;
use crate::regs::AdcRegisters;

/// Name the completion interrupt is requested under.
pub const IRQ_NAME: &str = "at91_adc";

/// Build the interrupt handler for a device.
///
/// The handler holds only a weak reference; once the device context is
/// gone it does nothing.
pub(crate) fn handler(device: Weak<Shared>) -> InterruptHandler {
    Box::new(move || {
        if let Some(device) = device.upgrade() {
            device.complete_transfer();
        }
    })
}

impl Shared {
    pub(crate) fn complete_transfer(&self) {
        let adc = AdcRegisters::new(self.hw.adc.as_ref());
        // reading SR acknowledges the interrupt
        let status = adc.status();

        let swapped = self.pool.complete_transfer(|filled, count| {
            adc.set_receive_next(filled.address(), count);
        });

        match swapped {
            Some(generation) => {
                trace!(generation, status = ?status, "Sample buffer completed");
                self.readers.wake_all();
            }
            None => warn!(status = ?status, "Completion interrupt with no acquisition armed"),
        }
    }
}
