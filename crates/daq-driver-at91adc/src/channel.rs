//! On-demand value of a single channel.
//!
//! While acquisition runs, the value comes from the first scan of the
//! passive buffer, so no hardware is touched and the read cursor stays
//! where it is. While idle, the channel is converted in isolation with a
//! software-started conversion and the converter is reset afterwards.
//! Disabled channels read as 0 in both states.
//!
//! ```text
//!   mask 0b1011, 10-bit:  scan = [ch0 lo,hi][ch1 lo,hi][ch3 lo,hi]
//!                                                       ^ position 2
//! ```

use tracing::{trace, warn};

use crate::device::Shared;
use crate::error::{AdcError, Result};
use crate::regs::{AdcMode, AdcRegisters, Status};
use crate::settings::{check_channel, ChannelMask, Resolution};
use crate::timing::{self, ConversionMode};

impl Shared {
    pub(crate) fn read_value(&self, channel: u8) -> Result<u16> {
        check_channel(channel)?;

        let state = self.state.lock();
        let settings = state.settings;
        if !settings.channels.contains(channel) {
            return Ok(0);
        }

        if state.open {
            let width = settings.resolution.sample_width();
            let offset = settings.channels.position(channel) * width;
            let view = self.pool.snapshot();
            let bytes = view.buffer.read();
            let value = match settings.resolution {
                Resolution::Bits8 => u16::from(bytes[offset]),
                Resolution::Bits10 => u16::from_le_bytes([bytes[offset], bytes[offset + 1]]),
            };
            return Ok(value);
        }

        self.convert_single(channel, settings.resolution)
    }

    /// One software-triggered conversion on an idle converter. The caller
    /// holds the device lock.
    fn convert_single(&self, channel: u8, resolution: Resolution) -> Result<u16> {
        let hw = &self.hw;
        let adc = AdcRegisters::new(hw.adc.as_ref());

        let target = timing::conversion_clock_target(
            resolution,
            self.config.high_res_clock_hz,
            self.config.low_res_clock_hz,
        );
        let prescaler =
            timing::conversion_prescaler(hw.master_clock.rate_hz(), target, ConversionMode::SingleShot);
        let mask = ChannelMask::NONE.with(channel, true)?;

        hw.adc_clock.enable();
        adc.software_reset();
        adc.set_mode(AdcMode {
            prescaler,
            resolution,
            trigger: None,
        });
        adc.enable_channels(mask);
        adc.start_conversion();

        let value = self
            .wait_data_ready(&adc, channel)
            .map(|()| adc.last_converted());

        adc.disable_all_channels();
        adc.software_reset();
        hw.adc_clock.disable();

        if let Ok(value) = value {
            trace!(channel, value, prescaler, "Single-shot conversion");
        }
        value
    }

    fn wait_data_ready(&self, adc: &AdcRegisters<'_>, channel: u8) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            if adc.status().contains(Status::DRDY) {
                return Ok(());
            }
            polls = polls.saturating_add(1);
            if let Some(limit) = self.config.single_shot_poll_limit {
                if polls >= limit {
                    warn!(channel, polls, "Single-shot conversion timed out");
                    return Err(AdcError::Timeout { channel, polls });
                }
            }
            std::hint::spin_loop();
        }
    }
}
