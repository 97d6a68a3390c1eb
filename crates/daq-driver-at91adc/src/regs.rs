//! Typed register map for the AT91 ADC, its PDC receive channel and the
//! Timer/Counter channel used as conversion trigger.
//!
//! All bit-level register manipulation in the crate goes through
//! [`AdcRegisters`] and [`TimerRegisters`]. Both wrap a [`RegisterBlock`],
//! the indexed 32-bit read/write capability supplied by the platform (or by
//! [`crate::sim`] in tests).
//!
//! # Register Layout (AT91SAM9260)
//!
//! ```text
//! ADC  0x000 CR    0x004 MR    0x010 CHER  0x014 CHDR  0x018 CHSR
//!      0x01C SR    0x020 LCDR  0x024 IER   0x028 IDR   0x02C IMR
//!      0x030 CDR0 .. 0x03C CDR3
//! PDC  0x100 RPR   0x104 RCR   0x110 RNPR  0x114 RNCR
//!      0x120 PTCR  0x124 PTSR
//! TC0  0x00  CCR   0x04  CMR   0x10  CV    0x14  RA    0x18  RB
//!      0x1C  RC    0x20  SR    0x24  IER   0x28  IDR   0x2C  IMR
//! ```

use bitflags::bitflags;

use crate::settings::{ChannelMask, Resolution};

/// Indexed access to a block of 32-bit hardware registers.
///
/// Offsets are byte offsets from the block's base address. Implementations
/// must tolerate concurrent calls; the driver serializes conflicting
/// sequences itself.
pub trait RegisterBlock: Send + Sync {
    /// Read the register at `offset`.
    fn read(&self, offset: u32) -> u32;

    /// Write `value` to the register at `offset`.
    fn write(&self, offset: u32, value: u32);
}

/// ADC and PDC register offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AdcReg {
    /// Control
    Cr = 0x000,
    /// Mode
    Mr = 0x004,
    /// Channel enable
    Cher = 0x010,
    /// Channel disable
    Chdr = 0x014,
    /// Channel status
    Chsr = 0x018,
    /// Status
    Sr = 0x01C,
    /// Last converted data
    Lcdr = 0x020,
    /// Interrupt enable
    Ier = 0x024,
    /// Interrupt disable
    Idr = 0x028,
    /// Interrupt mask
    Imr = 0x02C,
    /// Channel 0 data
    Cdr0 = 0x030,
    /// Channel 1 data
    Cdr1 = 0x034,
    /// Channel 2 data
    Cdr2 = 0x038,
    /// Channel 3 data
    Cdr3 = 0x03C,
    /// PDC receive pointer
    Rpr = 0x100,
    /// PDC receive counter
    Rcr = 0x104,
    /// PDC receive next pointer
    Rnpr = 0x110,
    /// PDC receive next counter
    Rncr = 0x114,
    /// PDC transfer control
    Ptcr = 0x120,
    /// PDC transfer status
    Ptsr = 0x124,
}

impl AdcReg {
    /// Byte offset from the ADC base address.
    pub const fn offset(self) -> u32 {
        self as u32
    }

    /// Per-channel conversion data register.
    pub fn channel_data(channel: u8) -> Option<Self> {
        match channel {
            0 => Some(Self::Cdr0),
            1 => Some(Self::Cdr1),
            2 => Some(Self::Cdr2),
            3 => Some(Self::Cdr3),
            _ => None,
        }
    }
}

/// Timer/Counter channel register offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TcReg {
    /// Channel control
    Ccr = 0x00,
    /// Channel mode
    Cmr = 0x04,
    /// Counter value
    Cv = 0x10,
    /// Register A (compare)
    Ra = 0x14,
    /// Register B
    Rb = 0x18,
    /// Register C (period)
    Rc = 0x1C,
    /// Status
    Sr = 0x20,
    /// Interrupt enable
    Ier = 0x24,
    /// Interrupt disable
    Idr = 0x28,
    /// Interrupt mask
    Imr = 0x2C,
}

impl TcReg {
    /// Byte offset from the timer channel base address.
    pub const fn offset(self) -> u32 {
        self as u32
    }
}

bitflags! {
    /// ADC_CR bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        /// Software reset
        const SWRST = 1 << 0;
        /// Start conversion
        const START = 1 << 1;
    }
}

bitflags! {
    /// ADC_SR / IER / IDR / IMR bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// End of conversion, channel 0
        const EOC0 = 1 << 0;
        /// End of conversion, channel 1
        const EOC1 = 1 << 1;
        /// End of conversion, channel 2
        const EOC2 = 1 << 2;
        /// End of conversion, channel 3
        const EOC3 = 1 << 3;
        /// Data ready (LCDR holds a fresh value)
        const DRDY = 1 << 16;
        /// PDC end of receive transfer
        const ENDRX = 1 << 18;
        /// PDC receive buffer full (current and next exhausted)
        const RXBUFF = 1 << 19;
    }
}

bitflags! {
    /// PDC_PTCR bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferControl: u32 {
        /// Receiver transfer enable
        const RXTEN = 1 << 0;
        /// Receiver transfer disable
        const RXTDIS = 1 << 1;
    }
}

bitflags! {
    /// TC_CCR bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerControl: u32 {
        /// Counter clock enable
        const CLKEN = 1 << 0;
        /// Counter clock disable
        const CLKDIS = 1 << 1;
        /// Software trigger
        const SWTRG = 1 << 2;
    }
}

/// Value written to IDR to mask every ADC interrupt source.
pub const ALL_INTERRUPTS: u32 = 0xFFFF_FFFF;

/// Value written to CHDR to disable all four channels.
pub const ALL_CHANNELS: u32 = 0x0F;

/// Value written to TC_IDR to mask the timer's interrupt sources we touch.
pub const TIMER_INTERRUPTS: u32 = 0x0F;

/// Mask of the converted value in LCDR/CDRx.
pub const DATA_MASK: u32 = 0x3FF;

const MR_TRGEN: u32 = 1 << 0;
const MR_TRGSEL_SHIFT: u32 = 1;
const MR_LOWRES: u32 = 1 << 4;
const MR_PRESCAL_SHIFT: u32 = 8;
const MR_PRESCAL_MASK: u32 = 0x3F << MR_PRESCAL_SHIFT;

/// Hardware trigger feeding ADC conversions (MR.TRGSEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSelect {
    /// TIOA output of Timer/Counter channel 0
    Tc0 = 0,
    /// TIOA output of Timer/Counter channel 1
    Tc1 = 1,
    /// TIOA output of Timer/Counter channel 2
    Tc2 = 2,
}

/// Decoded ADC_MR contents the driver programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcMode {
    /// Conversion clock prescaler (6 bits)
    pub prescaler: u8,
    /// Sample width
    pub resolution: Resolution,
    /// Hardware trigger, `None` for software-started conversions
    pub trigger: Option<TriggerSelect>,
}

impl AdcMode {
    /// Encode into the MR register layout.
    pub fn bits(&self) -> u32 {
        let mut mr = (u32::from(self.prescaler) << MR_PRESCAL_SHIFT) & MR_PRESCAL_MASK;
        if self.resolution == Resolution::Bits8 {
            mr |= MR_LOWRES;
        }
        if let Some(trigger) = self.trigger {
            mr |= ((trigger as u32) << MR_TRGSEL_SHIFT) | MR_TRGEN;
        }
        mr
    }

    /// Decode from a raw MR value.
    pub fn from_bits(mr: u32) -> Self {
        let trigger = if mr & MR_TRGEN != 0 {
            match (mr >> MR_TRGSEL_SHIFT) & 0x7 {
                1 => Some(TriggerSelect::Tc1),
                2 => Some(TriggerSelect::Tc2),
                _ => Some(TriggerSelect::Tc0),
            }
        } else {
            None
        };
        Self {
            prescaler: ((mr & MR_PRESCAL_MASK) >> MR_PRESCAL_SHIFT) as u8,
            resolution: if mr & MR_LOWRES != 0 {
                Resolution::Bits8
            } else {
                Resolution::Bits10
            },
            trigger,
        }
    }
}

// TC_CMR waveform-mode fields
const CMR_WAVSEL_UP_AUTO: u32 = 0x2 << 13;
const CMR_WAVE: u32 = 1 << 15;
const CMR_ACPA_SET: u32 = 0x1 << 16;
const CMR_ACPC_CLEAR: u32 = 0x2 << 18;

/// Fixed clock divider of TIMER_CLOCK4 (MCK / 128).
pub const TIMER_CLOCK4_DIVIDER: u32 = 128;

/// Internal clock source of a Timer/Counter channel (CMR.TCCLKS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerClock {
    /// MCK / 2
    Clock1 = 0,
    /// MCK / 8
    Clock2 = 1,
    /// MCK / 32
    Clock3 = 2,
    /// MCK / 128
    Clock4 = 3,
}

impl TimerClock {
    /// Clock source dividing MCK by `divider`, if one exists.
    pub fn from_divider(divider: u32) -> Option<Self> {
        match divider {
            2 => Some(Self::Clock1),
            8 => Some(Self::Clock2),
            32 => Some(Self::Clock3),
            TIMER_CLOCK4_DIVIDER => Some(Self::Clock4),
            _ => None,
        }
    }

    /// Divider applied to MCK.
    pub fn divider(self) -> u32 {
        match self {
            Self::Clock1 => 2,
            Self::Clock2 => 8,
            Self::Clock3 => 32,
            Self::Clock4 => TIMER_CLOCK4_DIVIDER,
        }
    }
}

/// CMR value for the trigger: count up with automatic reset on RC compare,
/// TIOA set on RA compare and cleared on RC compare.
pub fn trigger_waveform(clock: TimerClock) -> u32 {
    clock as u32 | CMR_WAVSEL_UP_AUTO | CMR_WAVE | CMR_ACPA_SET | CMR_ACPC_CLEAR
}

/// Typed view over the ADC + PDC register block.
#[derive(Clone, Copy)]
pub struct AdcRegisters<'a> {
    block: &'a dyn RegisterBlock,
}

impl<'a> AdcRegisters<'a> {
    /// Wrap a raw register block.
    pub fn new(block: &'a dyn RegisterBlock) -> Self {
        Self { block }
    }

    /// Raw register read.
    pub fn read(&self, reg: AdcReg) -> u32 {
        self.block.read(reg.offset())
    }

    /// Raw register write.
    pub fn write(&self, reg: AdcReg, value: u32) {
        self.block.write(reg.offset(), value);
    }

    /// Issue a software reset.
    pub fn software_reset(&self) {
        self.write(AdcReg::Cr, Control::SWRST.bits());
    }

    /// Start a software-triggered conversion.
    pub fn start_conversion(&self) {
        self.write(AdcReg::Cr, Control::START.bits());
    }

    /// Program the mode register.
    pub fn set_mode(&self, mode: AdcMode) {
        self.write(AdcReg::Mr, mode.bits());
    }

    /// Clear MR.TRGEN, leaving the other mode fields in place.
    pub fn disable_hardware_trigger(&self) {
        let mr = self.read(AdcReg::Mr);
        self.write(AdcReg::Mr, mr & !MR_TRGEN);
    }

    /// Enable the channels set in `mask`.
    pub fn enable_channels(&self, mask: ChannelMask) {
        self.write(AdcReg::Cher, u32::from(mask.bits()));
    }

    /// Disable every channel.
    pub fn disable_all_channels(&self) {
        self.write(AdcReg::Chdr, ALL_CHANNELS);
    }

    /// Unmask the given interrupt sources.
    pub fn enable_interrupts(&self, sources: Status) {
        self.write(AdcReg::Ier, sources.bits());
    }

    /// Mask every interrupt source.
    pub fn disable_all_interrupts(&self) {
        self.write(AdcReg::Idr, ALL_INTERRUPTS);
    }

    /// Read the status register. Reading acknowledges pending PDC events.
    pub fn status(&self) -> Status {
        Status::from_bits_truncate(self.read(AdcReg::Sr))
    }

    /// Last converted value, masked to the converter width.
    pub fn last_converted(&self) -> u16 {
        (self.read(AdcReg::Lcdr) & DATA_MASK) as u16
    }

    /// Program the current receive buffer.
    pub fn set_receive(&self, address: u32, count: u32) {
        self.write(AdcReg::Rpr, address);
        self.write(AdcReg::Rcr, count);
    }

    /// Program the next receive buffer, loaded once the current one fills.
    pub fn set_receive_next(&self, address: u32, count: u32) {
        self.write(AdcReg::Rnpr, address);
        self.write(AdcReg::Rncr, count);
    }

    /// Enable PDC receive transfers.
    pub fn enable_receiver(&self) {
        self.write(AdcReg::Ptcr, TransferControl::RXTEN.bits());
    }

    /// Disable PDC receive transfers.
    pub fn disable_receiver(&self) {
        self.write(AdcReg::Ptcr, TransferControl::RXTDIS.bits());
    }
}

/// Typed view over the trigger Timer/Counter channel.
#[derive(Clone, Copy)]
pub struct TimerRegisters<'a> {
    block: &'a dyn RegisterBlock,
}

impl<'a> TimerRegisters<'a> {
    /// Wrap a raw register block.
    pub fn new(block: &'a dyn RegisterBlock) -> Self {
        Self { block }
    }

    /// Raw register read.
    pub fn read(&self, reg: TcReg) -> u32 {
        self.block.read(reg.offset())
    }

    /// Raw register write.
    pub fn write(&self, reg: TcReg, value: u32) {
        self.block.write(reg.offset(), value);
    }

    /// Stop the counter clock and mask its interrupts.
    pub fn halt(&self) {
        self.write(TcReg::Ccr, TimerControl::CLKDIS.bits());
        self.write(TcReg::Idr, TIMER_INTERRUPTS);
    }

    /// Select the trigger waveform and load the compare values.
    pub fn configure_waveform(&self, clock: TimerClock, ra: u32, rc: u32) {
        self.write(TcReg::Cmr, trigger_waveform(clock));
        self.write(TcReg::Ra, ra);
        self.write(TcReg::Rc, rc);
        self.write(TcReg::Cv, 0);
    }

    /// Enable the counter clock and fire a software trigger.
    pub fn start(&self) {
        self.write(TcReg::Ccr, TimerControl::CLKEN.bits());
        self.write(TcReg::Ccr, TimerControl::SWTRG.bits());
    }
}
