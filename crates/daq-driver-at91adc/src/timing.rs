//! Rate derivation for the trigger timer and the ADC conversion clock.
//!
//! Both calculations are pure; the controller stores the achieved frequency
//! back into the acquisition settings.
//!
//! # Timing Model
//!
//! ```text
//!   MCK ──► /divider (TIMER_CLOCK4 = /128) ──► counter 0..RC ──► TIOA ──► ADC trigger
//!                                                  │
//!                                         RA = RC/2 sets TIOA, RC clears it
//!
//!   achieved = MCK / divider / RC
//!
//!   MCK ──► /((PRESCAL + 1) * 2) ──► ADC conversion clock
//! ```
//!
//! # Example
//!
//! ```
//! use daq_driver_at91adc::timing::TriggerTiming;
//!
//! let timing = TriggerTiming::derive(98_304_000, 128, 1000);
//! assert_eq!(timing.counter, 768);
//! assert_eq!(timing.achieved_hz, 1000);
//! ```

use crate::settings::Resolution;

/// Largest value the 16-bit RC compare register holds.
pub const COUNTER_MAX: u32 = 0xFFFF;

/// Largest value of the 6-bit MR.PRESCAL field.
pub const PRESCALER_MAX: u32 = 0x3F;

/// Conversion clock targeted in 10-bit mode.
pub const HIGH_RES_CLOCK_HZ: u32 = 1_000_000;

/// Conversion clock targeted in 8-bit mode.
pub const LOW_RES_CLOCK_HZ: u32 = 5_000_000;

/// Trigger timer values derived from a requested scan frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTiming {
    /// Period counter (RC), clamped to `1..=COUNTER_MAX`
    pub counter: u32,
    /// Scan frequency the counter actually produces
    pub achieved_hz: u32,
}

impl TriggerTiming {
    /// Derive the period counter for `requested_hz`.
    ///
    /// The counter is the timer base (`reference_hz / divider`) divided by
    /// the requested frequency, rounded to the nearest integer. Requests
    /// slower than the 16-bit counter allows saturate at `COUNTER_MAX`;
    /// requests faster than the timer base saturate at a counter of 1.
    ///
    /// `requested_hz` must be non-zero; callers validate it before it gets
    /// here.
    pub fn derive(reference_hz: u32, divider: u32, requested_hz: u32) -> Self {
        let base = u64::from(reference_hz / divider.max(1));
        let requested = u64::from(requested_hz.max(1));
        let counter = ((base + requested / 2) / requested).clamp(1, u64::from(COUNTER_MAX)) as u32;
        let achieved_hz = (base / u64::from(counter)) as u32;
        Self {
            counter,
            achieved_hz,
        }
    }

    /// RA compare value: TIOA rises half way through the period.
    pub fn compare_a(&self) -> u32 {
        self.counter / 2
    }

    /// RC compare value (the period).
    pub fn compare_c(&self) -> u32 {
        self.counter
    }
}

/// How the conversion clock is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Timer-triggered streaming: targets the nominal conversion clock
    Streaming,
    /// Isolated single conversion while idle: runs the converter at half
    /// the nominal clock
    SingleShot,
}

/// Conversion clock the converter should run at for `resolution`.
pub fn conversion_clock_target(resolution: Resolution, high_res_hz: u32, low_res_hz: u32) -> u32 {
    match resolution {
        Resolution::Bits10 => high_res_hz,
        Resolution::Bits8 => low_res_hz,
    }
}

/// Derive MR.PRESCAL so that `MCK / ((PRESCAL + 1) * 2)` approaches
/// `target_hz`.
///
/// The quotient is decremented by one unless already zero and clamped to
/// the 6-bit field.
pub fn conversion_prescaler(reference_hz: u32, target_hz: u32, mode: ConversionMode) -> u8 {
    let target = u64::from(target_hz.max(1));
    let denominator = match mode {
        ConversionMode::Streaming => 2 * target,
        ConversionMode::SingleShot => target,
    };
    let quotient = u64::from(reference_hz) / denominator;
    quotient.saturating_sub(1).min(u64::from(PRESCALER_MAX)) as u8
}

/// Conversion clock produced by a given prescaler.
pub fn conversion_clock_hz(reference_hz: u32, prescaler: u8) -> u32 {
    reference_hz / ((u32::from(prescaler) + 1) * 2)
}

/// Effective DMA buffer size in bytes for one completion period.
///
/// One buffer holds one second of scans (`frequency * stride`). It is
/// clamped to `capacity`, rounded down to a whole number of scans so that
/// completion boundaries fall between scans. A zero stride yields zero.
pub fn buffer_size(frequency: u32, stride: usize, capacity: usize) -> usize {
    if stride == 0 {
        return 0;
    }
    let wanted = (frequency as usize).saturating_mul(stride);
    if wanted > capacity {
        capacity - capacity % stride
    } else {
        wanted
    }
}
