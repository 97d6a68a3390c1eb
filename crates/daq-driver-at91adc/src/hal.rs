//! Platform capabilities the acquisition core consumes.
//!
//! The driver never touches physical addresses, clock trees or interrupt
//! controllers directly. A board support layer hands it a [`Hardware`]
//! bundle implementing these traits; [`crate::sim`] provides simulated
//! implementations for tests.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::regs::RegisterBlock;

/// Handler invoked from interrupt context. Must not block or allocate.
pub type InterruptHandler = Box<dyn Fn() + Send + Sync>;

/// A gateable clock domain.
pub trait Clock: Send + Sync {
    /// Ungate the clock.
    fn enable(&self);

    /// Gate the clock. The clock stays allocated.
    fn disable(&self);

    /// Clock rate in Hz.
    fn rate_hz(&self) -> u32;
}

/// Registration of a handler for one hardware interrupt line.
pub trait InterruptLine: Send + Sync {
    /// Install `handler`; fails if the line is already claimed.
    fn request(&self, name: &'static str, handler: InterruptHandler) -> Result<()>;

    /// Remove the installed handler, if any. After this returns the handler
    /// is not running and will not run again.
    fn free(&self);
}

/// Coherent memory shared between the CPU and a DMA engine.
pub struct DmaRegion {
    address: u32,
    bytes: RwLock<Box<[u8]>>,
}

impl DmaRegion {
    /// Wrap `len` zeroed bytes reachable by the DMA engine at `address`.
    pub fn new(address: u32, len: usize) -> Self {
        Self {
            address,
            bytes: RwLock::new(vec![0u8; len].into_boxed_slice()),
        }
    }

    /// Bus address programmed into the DMA controller.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    /// Whether the region has zero capacity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared access for CPU-side consumers.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.bytes.read()
    }

    /// Exclusive access for the DMA engine.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.bytes.write()
    }
}

impl fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaRegion")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("len", &self.len())
            .finish()
    }
}

/// Allocator for coherent DMA memory.
pub trait DmaAllocator: Send + Sync {
    /// Allocate `len` bytes of coherent memory.
    fn alloc_coherent(&self, len: usize) -> Result<Arc<DmaRegion>>;

    /// Return a region obtained from [`DmaAllocator::alloc_coherent`].
    fn free_coherent(&self, region: Arc<DmaRegion>);
}

/// Everything the driver needs from the platform.
#[derive(Clone)]
pub struct Hardware {
    /// ADC + PDC register block
    pub adc: Arc<dyn RegisterBlock>,
    /// Trigger Timer/Counter channel register block
    pub trigger: Arc<dyn RegisterBlock>,
    /// ADC completion interrupt
    pub irq: Arc<dyn InterruptLine>,
    /// Master clock, source of all rate calculations
    pub master_clock: Arc<dyn Clock>,
    /// ADC peripheral clock
    pub adc_clock: Arc<dyn Clock>,
    /// Trigger timer peripheral clock
    pub trigger_clock: Arc<dyn Clock>,
    /// Coherent memory for the sample buffers
    pub dma: Arc<dyn DmaAllocator>,
}

impl fmt::Debug for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hardware")
            .field("master_clock_hz", &self.master_clock.rate_hz())
            .finish_non_exhaustive()
    }
}
