//! Simulated SoC for tests and demos.
//!
//! [`SimulatedSoc`] implements every platform capability the driver
//! consumes: register files for the ADC/PDC and the trigger timer, an
//! interrupt line, three clocks and a coherent DMA allocator. The ADC model
//! covers what the driver relies on:
//!
//! - CHER/CHDR maintain CHSR, IER/IDR maintain IMR, PTCR maintains PTSR
//! - CR.SWRST clears the ADC registers (not the PDC); CR.START converts the
//!   enabled channels, latching LCDR and raising DRDY
//! - reading LCDR clears DRDY, reading SR clears ENDRX/RXBUFF
//!
//! PDC transfers do not run on their own: [`SimulatedSoc::complete_transfer`]
//! fills the current receive buffer with one conversion per sample, rotates
//! the next-pointer registers in and raises the completion interrupt if
//! ENDRX is unmasked, exactly once per call.
//!
//! # Example
//!
//! ```
//! use daq_driver_at91adc::sim::SimulatedSoc;
//! use daq_driver_at91adc::regs::AdcReg;
//!
//! let soc = SimulatedSoc::new();
//! soc.set_input(2, 0x155);
//! assert_eq!(soc.adc_register(AdcReg::Chsr), 0);
//! assert!(!soc.complete_transfer());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{AdcError, Result};
use crate::hal::{Clock, DmaAllocator, DmaRegion, Hardware, InterruptHandler, InterruptLine};
use crate::regs::{
    AdcMode, AdcReg, Control, RegisterBlock, Status, TcReg, TransferControl, ALL_CHANNELS,
    DATA_MASK,
};
use crate::settings::{Resolution, CHANNEL_COUNT};

/// Master clock of the reference board (AT91SAM9260 at 98.304 MHz).
pub const DEFAULT_MASTER_CLOCK_HZ: u32 = 98_304_000;

const DMA_BASE: u32 = 0x2000_0000;
const DMA_ALIGN: u32 = 0x1000;

/// Plain register storage with a log of every write.
#[derive(Debug, Default)]
pub struct RegisterFile {
    inner: Mutex<RegisterFileState>,
}

#[derive(Debug, Default)]
struct RegisterFileState {
    values: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

impl RegisterFile {
    /// Empty register file, every register reads 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without side effects.
    pub fn peek(&self, offset: u32) -> u32 {
        self.inner.lock().values.get(&offset).copied().unwrap_or(0)
    }

    /// Every `(offset, value)` written so far, in order.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.inner.lock().writes.clone()
    }
}

impl RegisterBlock for RegisterFile {
    fn read(&self, offset: u32) -> u32 {
        self.peek(offset)
    }

    fn write(&self, offset: u32, value: u32) {
        let mut state = self.inner.lock();
        state.writes.push((offset, value));
        state.values.insert(offset, value);
    }
}

/// ADC + PDC register block with conversion side effects.
#[derive(Debug, Default)]
pub struct SimAdc {
    inner: Mutex<AdcState>,
}

#[derive(Debug, Default)]
struct AdcState {
    values: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
    inputs: [u16; CHANNEL_COUNT as usize],
    stalled: bool,
}

impl AdcState {
    fn get(&self, reg: AdcReg) -> u32 {
        self.values.get(&reg.offset()).copied().unwrap_or(0)
    }

    fn set(&mut self, reg: AdcReg, value: u32) {
        self.values.insert(reg.offset(), value);
    }

    fn resolution(&self) -> Resolution {
        AdcMode::from_bits(self.get(AdcReg::Mr)).resolution
    }

    /// Converted code of `channel` at the current resolution.
    fn code(&self, channel: u8) -> u16 {
        let raw = self.inputs[usize::from(channel)] & DATA_MASK as u16;
        match self.resolution() {
            Resolution::Bits10 => raw,
            Resolution::Bits8 => raw >> 2,
        }
    }

    fn enabled_channels(&self) -> Vec<u8> {
        let chsr = self.get(AdcReg::Chsr);
        (0..CHANNEL_COUNT)
            .filter(|&ch| chsr & (1u32 << ch) != 0)
            .collect()
    }

    fn convert(&mut self) {
        if self.stalled {
            return;
        }
        let mut status = self.get(AdcReg::Sr);
        for channel in self.enabled_channels() {
            let code = u32::from(self.code(channel));
            if let Some(cdr) = AdcReg::channel_data(channel) {
                self.set(cdr, code);
            }
            self.set(AdcReg::Lcdr, code);
            status |= 1u32 << channel;
            status |= Status::DRDY.bits();
        }
        self.set(AdcReg::Sr, status);
    }

    fn software_reset(&mut self) {
        for reg in [
            AdcReg::Mr,
            AdcReg::Chsr,
            AdcReg::Sr,
            AdcReg::Lcdr,
            AdcReg::Imr,
            AdcReg::Cdr0,
            AdcReg::Cdr1,
            AdcReg::Cdr2,
            AdcReg::Cdr3,
        ] {
            self.set(reg, 0);
        }
    }
}

impl SimAdc {
    fn peek(&self, reg: AdcReg) -> u32 {
        self.inner.lock().get(reg)
    }

    fn writes(&self) -> Vec<(u32, u32)> {
        self.inner.lock().writes.clone()
    }
}

impl RegisterBlock for SimAdc {
    fn read(&self, offset: u32) -> u32 {
        let mut state = self.inner.lock();
        let value = state.values.get(&offset).copied().unwrap_or(0);
        if offset == AdcReg::Sr.offset() {
            let acked = value & !(Status::ENDRX | Status::RXBUFF).bits();
            state.set(AdcReg::Sr, acked);
        } else if offset == AdcReg::Lcdr.offset() {
            let sr = state.get(AdcReg::Sr) & !Status::DRDY.bits();
            state.set(AdcReg::Sr, sr);
        }
        value
    }

    fn write(&self, offset: u32, value: u32) {
        let mut state = self.inner.lock();
        state.writes.push((offset, value));

        match offset {
            o if o == AdcReg::Cr.offset() => {
                let control = Control::from_bits_truncate(value);
                if control.contains(Control::SWRST) {
                    state.software_reset();
                }
                if control.contains(Control::START) {
                    state.convert();
                }
            }
            o if o == AdcReg::Cher.offset() => {
                let chsr = state.get(AdcReg::Chsr) | (value & ALL_CHANNELS);
                state.set(AdcReg::Chsr, chsr);
            }
            o if o == AdcReg::Chdr.offset() => {
                let chsr = state.get(AdcReg::Chsr) & !value;
                state.set(AdcReg::Chsr, chsr);
            }
            o if o == AdcReg::Ier.offset() => {
                let imr = state.get(AdcReg::Imr) | value;
                state.set(AdcReg::Imr, imr);
            }
            o if o == AdcReg::Idr.offset() => {
                let imr = state.get(AdcReg::Imr) & !value;
                state.set(AdcReg::Imr, imr);
            }
            o if o == AdcReg::Ptcr.offset() => {
                let control = TransferControl::from_bits_truncate(value);
                let mut ptsr = state.get(AdcReg::Ptsr);
                if control.contains(TransferControl::RXTEN) {
                    ptsr |= TransferControl::RXTEN.bits();
                }
                if control.contains(TransferControl::RXTDIS) {
                    ptsr &= !TransferControl::RXTEN.bits();
                }
                state.set(AdcReg::Ptsr, ptsr);
            }
            _ => {
                state.values.insert(offset, value);
            }
        }
    }
}

/// Gateable clock that counts enables.
#[derive(Debug)]
pub struct SimClock {
    rate_hz: u32,
    enabled: AtomicBool,
    enables: AtomicU32,
}

impl SimClock {
    /// Clock running at `rate_hz`, initially gated.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            enabled: AtomicBool::new(false),
            enables: AtomicU32::new(0),
        }
    }

    /// Whether the clock is currently ungated.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// How many times the clock was enabled.
    pub fn enable_count(&self) -> u32 {
        self.enables.load(Ordering::SeqCst)
    }
}

impl Clock for SimClock {
    fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

/// Interrupt line whose handler runs when [`SimInterruptLine::fire`] is
/// called.
#[derive(Default)]
pub struct SimInterruptLine {
    handler: Mutex<Option<(&'static str, InterruptHandler)>>,
    fail_next: AtomicBool,
}

impl SimInterruptLine {
    /// Make the next `request()` fail as if the line were claimed elsewhere.
    pub fn fail_next_request(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Whether a handler is installed.
    pub fn is_claimed(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Run the installed handler. Returns whether one ran.
    ///
    /// The handler runs with the line locked, so `free()` waits for it.
    pub fn fire(&self) -> bool {
        let handler = self.handler.lock();
        match handler.as_ref() {
            Some((_, handler)) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SimInterruptLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimInterruptLine")
            .field("claimed", &self.is_claimed())
            .finish()
    }
}

impl InterruptLine for SimInterruptLine {
    fn request(&self, name: &'static str, handler: InterruptHandler) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AdcError::busy(format!("interrupt line for {name} unavailable")));
        }
        let mut slot = self.handler.lock();
        if let Some((owner, _)) = slot.as_ref() {
            return Err(AdcError::busy(format!("interrupt line claimed by {owner}")));
        }
        *slot = Some((name, handler));
        debug!(name, "Interrupt handler installed");
        Ok(())
    }

    fn free(&self) {
        if self.handler.lock().take().is_some() {
            debug!("Interrupt handler removed");
        }
    }
}

/// Coherent memory allocator handing out distinct bus addresses.
#[derive(Debug)]
pub struct SimDmaAllocator {
    next_address: AtomicU32,
    live: Mutex<Vec<Arc<DmaRegion>>>,
    /// Successful allocations left before one fails
    fail_after: Mutex<Option<usize>>,
}

impl Default for SimDmaAllocator {
    fn default() -> Self {
        Self {
            next_address: AtomicU32::new(DMA_BASE),
            live: Mutex::new(Vec::new()),
            fail_after: Mutex::new(None),
        }
    }
}

impl SimDmaAllocator {
    /// Make the next allocation fail.
    pub fn fail_next_alloc(&self) {
        self.fail_after_allocs(0);
    }

    /// Let `successes` allocations through, then fail one.
    pub fn fail_after_allocs(&self, successes: usize) {
        *self.fail_after.lock() = Some(successes);
    }

    fn should_fail(&self) -> bool {
        let mut fail_after = self.fail_after.lock();
        match *fail_after {
            Some(0) => {
                *fail_after = None;
                true
            }
            Some(n) => {
                *fail_after = Some(n - 1);
                false
            }
            None => false,
        }
    }

    /// Number of regions allocated and not yet freed.
    pub fn live_regions(&self) -> usize {
        self.live.lock().len()
    }

    /// Region whose bus address is `address`.
    pub fn lookup(&self, address: u32) -> Option<Arc<DmaRegion>> {
        self.live
            .lock()
            .iter()
            .find(|region| region.address() == address)
            .cloned()
    }
}

impl DmaAllocator for SimDmaAllocator {
    fn alloc_coherent(&self, len: usize) -> Result<Arc<DmaRegion>> {
        if self.should_fail() {
            return Err(AdcError::Allocation {
                len,
                message: "simulated allocation failure".to_string(),
            });
        }
        let span = u32::try_from(len)
            .ok()
            .and_then(|len| len.checked_next_multiple_of(DMA_ALIGN))
            .ok_or_else(|| AdcError::Allocation {
                len,
                message: "region exceeds the 32-bit bus".to_string(),
            })?;
        let address = self.next_address.fetch_add(span.max(DMA_ALIGN), Ordering::SeqCst);
        let region = Arc::new(DmaRegion::new(address, len));
        self.live.lock().push(Arc::clone(&region));
        Ok(region)
    }

    fn free_coherent(&self, region: Arc<DmaRegion>) {
        self.live.lock().retain(|live| !Arc::ptr_eq(live, &region));
    }
}

/// All simulated peripherals of one SoC.
#[derive(Debug, Clone)]
pub struct SimulatedSoc {
    /// ADC + PDC
    pub adc: Arc<SimAdc>,
    /// Trigger Timer/Counter channel
    pub timer: Arc<RegisterFile>,
    /// ADC interrupt line
    pub irq: Arc<SimInterruptLine>,
    /// Master clock
    pub master_clock: Arc<SimClock>,
    /// ADC peripheral clock
    pub adc_clock: Arc<SimClock>,
    /// Timer peripheral clock
    pub trigger_clock: Arc<SimClock>,
    /// Coherent memory
    pub dma: Arc<SimDmaAllocator>,
}

impl Default for SimulatedSoc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSoc {
    /// SoC with the reference master clock.
    pub fn new() -> Self {
        Self::with_master_clock(DEFAULT_MASTER_CLOCK_HZ)
    }

    /// SoC with a custom master clock.
    pub fn with_master_clock(master_clock_hz: u32) -> Self {
        Self {
            adc: Arc::new(SimAdc::default()),
            timer: Arc::new(RegisterFile::new()),
            irq: Arc::new(SimInterruptLine::default()),
            master_clock: Arc::new(SimClock::new(master_clock_hz)),
            adc_clock: Arc::new(SimClock::new(master_clock_hz)),
            trigger_clock: Arc::new(SimClock::new(master_clock_hz)),
            dma: Arc::new(SimDmaAllocator::default()),
        }
    }

    /// Capability bundle handed to the driver.
    pub fn hardware(&self) -> Hardware {
        Hardware {
            adc: self.adc.clone(),
            trigger: self.timer.clone(),
            irq: self.irq.clone(),
            master_clock: self.master_clock.clone(),
            adc_clock: self.adc_clock.clone(),
            trigger_clock: self.trigger_clock.clone(),
            dma: self.dma.clone(),
        }
    }

    /// Set the raw 10-bit code channel `channel` converts to.
    pub fn set_input(&self, channel: u8, code: u16) {
        if let Some(input) = self.adc.inner.lock().inputs.get_mut(usize::from(channel)) {
            *input = code & DATA_MASK as u16;
        }
    }

    /// While stalled, CR.START never raises DRDY.
    pub fn stall_conversions(&self, stalled: bool) {
        self.adc.inner.lock().stalled = stalled;
    }

    /// ADC/PDC register value, read without side effects.
    pub fn adc_register(&self, reg: AdcReg) -> u32 {
        self.adc.peek(reg)
    }

    /// Timer register value.
    pub fn timer_register(&self, reg: TcReg) -> u32 {
        self.timer.peek(reg.offset())
    }

    /// Every ADC/PDC register write so far.
    pub fn adc_writes(&self) -> Vec<(u32, u32)> {
        self.adc.writes()
    }

    /// Every timer register write so far.
    pub fn timer_writes(&self) -> Vec<(u32, u32)> {
        self.timer.writes()
    }

    /// Run one PDC receive transfer to completion.
    ///
    /// Returns `false` without side effects if the receiver is disabled or
    /// no buffer is queued.
    pub fn complete_transfer(&self) -> bool {
        let mut state = self.adc.inner.lock();
        let receiving = state.get(AdcReg::Ptsr) & TransferControl::RXTEN.bits() != 0;
        let address = state.get(AdcReg::Rpr);
        let count = state.get(AdcReg::Rcr) as usize;
        if !receiving || count == 0 {
            return false;
        }
        let Some(region) = self.dma.lookup(address) else {
            warn!(address = format_args!("{address:#010x}"), "PDC pointer outside DMA memory");
            return false;
        };

        let width = state.resolution().sample_width();
        let channels = state.enabled_channels();
        {
            let mut bytes = region.write();
            let samples = count.min(bytes.len() / width);
            for index in 0..samples {
                let code = match channels.get(index % channels.len().max(1)) {
                    Some(&channel) => state.code(channel),
                    None => 0,
                };
                let at = index * width;
                match width {
                    1 => bytes[at] = code as u8,
                    _ => bytes[at..at + 2].copy_from_slice(&code.to_le_bytes()),
                }
            }
        }

        let next_address = state.get(AdcReg::Rnpr);
        let next_count = state.get(AdcReg::Rncr);
        state.set(AdcReg::Rpr, next_address);
        state.set(AdcReg::Rcr, next_count);
        state.set(AdcReg::Rnpr, 0);
        state.set(AdcReg::Rncr, 0);

        let mut status = state.get(AdcReg::Sr) | Status::ENDRX.bits();
        if next_count == 0 {
            status |= Status::RXBUFF.bits();
        }
        state.set(AdcReg::Sr, status);
        let raise = state.get(AdcReg::Imr) & Status::ENDRX.bits() != 0;
        drop(state);

        trace!(
            address = format_args!("{address:#010x}"),
            samples = count,
            raise,
            "Simulated PDC transfer complete"
        );
        if raise {
            self.irq.fire();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::AdcRegisters;
    use crate::settings::ChannelMask;

    #[test]
    fn test_channel_and_interrupt_masks() {
        let soc = SimulatedSoc::new();
        let adc = AdcRegisters::new(soc.adc.as_ref());
        adc.enable_channels(ChannelMask::new(0b0110).unwrap());
        adc.enable_interrupts(Status::ENDRX);
        assert_eq!(soc.adc_register(AdcReg::Chsr), 0b0110);
        assert_eq!(soc.adc_register(AdcReg::Imr), Status::ENDRX.bits());

        adc.disable_all_channels();
        adc.disable_all_interrupts();
        assert_eq!(soc.adc_register(AdcReg::Chsr), 0);
        assert_eq!(soc.adc_register(AdcReg::Imr), 0);
    }

    #[test]
    fn test_software_conversion() {
        let soc = SimulatedSoc::new();
        soc.set_input(1, 0x2AB);
        let adc = AdcRegisters::new(soc.adc.as_ref());

        adc.set_mode(AdcMode {
            prescaler: 10,
            resolution: Resolution::Bits8,
            trigger: None,
        });
        adc.enable_channels(ChannelMask::NONE.with(1, true).unwrap());
        adc.start_conversion();
        assert!(adc.status().contains(Status::DRDY));
        assert_eq!(adc.last_converted(), 0x2AB >> 2);
        assert!(!adc.status().contains(Status::DRDY));
    }

    #[test]
    fn test_software_reset_keeps_pdc() {
        let soc = SimulatedSoc::new();
        let adc = AdcRegisters::new(soc.adc.as_ref());
        adc.set_receive(0x2000_0000, 16);
        adc.enable_channels(ChannelMask::ALL);
        adc.software_reset();
        assert_eq!(soc.adc_register(AdcReg::Chsr), 0);
        assert_eq!(soc.adc_register(AdcReg::Rpr), 0x2000_0000);
    }

    #[test]
    fn test_allocator_addresses_distinct() {
        let dma = SimDmaAllocator::default();
        let a = dma.alloc_coherent(32 * 1024).unwrap();
        let b = dma.alloc_coherent(32 * 1024).unwrap();
        assert_ne!(a.address(), b.address());
        assert_eq!(dma.live_regions(), 2);
        dma.free_coherent(a);
        assert_eq!(dma.live_regions(), 1);
        assert!(dma.lookup(b.address()).is_some());
    }

    #[test]
    fn test_interrupt_line_single_owner() {
        let irq = SimInterruptLine::default();
        irq.request("first", Box::new(|| {})).unwrap();
        assert!(irq.request("second", Box::new(|| {})).unwrap_err().is_busy());
        irq.free();
        assert!(!irq.fire());
    }
}
