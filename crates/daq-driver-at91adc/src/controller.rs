//! Acquisition controller: arming and disarming continuous sampling.
//!
//! # Open Sequence
//!
//! ```text
//!   clocks on ─► IDR=all ─► size buffers ─► PDC RPR/RNPR ─► PTCR=RXTEN
//!       ─► TC0 waveform (RA=RC/2) ─► ADC SWRST + MR ─► request IRQ
//!       ─► IER=ENDRX ─► CHER=mask ─► TC0 CLKEN + SWTRG
//! ```
//!
//! Any failure after the device was marked open unwinds through the close
//! path, so a failed `open()` leaves the hardware in its idle state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::buffer::BufferId;
use crate::completion;
use crate::device::{DeviceState, Shared};
use crate::error::{AdcError, Result};
use crate::regs::{AdcMode, AdcRegisters, Status, TimerRegisters, TriggerSelect};
use crate::settings::AcquisitionSettings;
use crate::timing::{self, ConversionMode, TriggerTiming};

impl Shared {
    pub(crate) fn open(self: &Arc<Self>) -> Result<AcquisitionSettings> {
        let mut state = self.state.lock();
        if state.open {
            warn!("Open rejected, acquisition already running");
            return Err(AdcError::busy("acquisition already running"));
        }
        state.open = true;

        match self.arm(&mut state) {
            Ok(()) => {
                info!(
                    resolution = %state.settings.resolution,
                    frequency = state.settings.frequency,
                    channels = format_args!("{:#06b}", state.settings.channels.bits()),
                    "Acquisition started"
                );
                Ok(state.settings)
            }
            Err(e) => {
                warn!(error = %e, "Open failed, unwinding");
                self.disarm(&mut state);
                drop(state);
                self.readers.wake_all();
                Err(e)
            }
        }
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        let was_open = state.open;
        self.disarm(&mut state);
        drop(state);

        self.readers.wake_all();
        if was_open {
            info!("Acquisition stopped");
        }
    }

    fn arm(self: &Arc<Self>, state: &mut DeviceState) -> Result<()> {
        let hw = &self.hw;
        let adc = AdcRegisters::new(hw.adc.as_ref());
        let timer = TimerRegisters::new(hw.trigger.as_ref());
        let settings = state.settings;

        hw.adc_clock.enable();
        hw.trigger_clock.enable();
        adc.disable_all_interrupts();

        if settings.channels.is_empty() {
            return Err(AdcError::invalid("no channel enabled"));
        }
        if settings.frequency == 0 {
            return Err(AdcError::invalid("sample frequency must be non-zero"));
        }

        let width = settings.resolution.sample_width();
        let stride = settings.scan_stride();
        let size = timing::buffer_size(settings.frequency, stride, self.pool.capacity());
        if size == 0 {
            return Err(AdcError::invalid(format!(
                "DMA buffer of {} bytes cannot hold one {stride}-byte scan",
                self.pool.capacity()
            )));
        }
        let wanted = (settings.frequency as usize).saturating_mul(stride);
        if size < wanted {
            warn!(
                requested = wanted,
                size, "Buffer clamped to DMA capacity, completions come faster than 1 Hz"
            );
        }
        let transfer_count = u32::try_from(size / width)
            .map_err(|_| AdcError::invalid(format!("transfer of {size} bytes too large")))?;

        self.pool.reset(size, transfer_count);
        let first = self.pool.buffer(BufferId::First);
        let second = self.pool.buffer(BufferId::Second);
        adc.set_receive(first.address(), transfer_count);
        adc.set_receive_next(second.address(), transfer_count);
        adc.enable_receiver();

        let mck = hw.master_clock.rate_hz();
        let clock = self.config.trigger_clock()?;
        let trigger = TriggerTiming::derive(mck, clock.divider(), settings.frequency);
        timer.halt();
        timer.configure_waveform(clock, trigger.compare_a(), trigger.compare_c());
        if trigger.achieved_hz != settings.frequency {
            debug!(
                requested = settings.frequency,
                achieved = trigger.achieved_hz,
                "Sample frequency quantized by trigger timer"
            );
        }
        state.settings.frequency = trigger.achieved_hz;

        let target = timing::conversion_clock_target(
            settings.resolution,
            self.config.high_res_clock_hz,
            self.config.low_res_clock_hz,
        );
        let prescaler = timing::conversion_prescaler(mck, target, ConversionMode::Streaming);
        adc.software_reset();
        adc.set_mode(AdcMode {
            prescaler,
            resolution: settings.resolution,
            trigger: Some(TriggerSelect::Tc0),
        });

        debug!(
            counter = trigger.counter,
            achieved_hz = trigger.achieved_hz,
            prescaler,
            conversion_clock_hz = timing::conversion_clock_hz(mck, prescaler),
            buffer_size = size,
            transfer_count,
            "Configured acquisition hardware"
        );

        hw.irq
            .request(completion::IRQ_NAME, completion::handler(Arc::downgrade(self)))
            .map_err(|e| AdcError::busy(format!("completion interrupt unavailable: {e}")))?;

        adc.enable_interrupts(Status::ENDRX);
        adc.enable_channels(settings.channels);
        timer.start();
        Ok(())
    }

    /// Return the hardware to idle if a session is armed. Always leaves the
    /// device closed.
    fn disarm(&self, state: &mut DeviceState) {
        if state.open {
            let hw = &self.hw;
            let adc = AdcRegisters::new(hw.adc.as_ref());
            adc.disable_all_interrupts();
            adc.disable_hardware_trigger();
            adc.disable_all_channels();
            adc.disable_receiver();
            hw.irq.free();
            hw.adc_clock.disable();
            hw.trigger_clock.disable();
        }
        self.pool.disarm();
        state.open = false;
    }
}
