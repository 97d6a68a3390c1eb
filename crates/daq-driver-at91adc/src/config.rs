//! Device configuration.
//!
//! Everything the board support layer does not hand over as a capability:
//! buffer capacity, trigger divider, conversion clock targets, the settings
//! applied on the first `open()` and the optional single-shot poll bound.
//!
//! # Example Configuration
//!
//! ```toml
//! dma_buffer_size = 32768
//! trigger_divider = 128
//! single_shot_poll_limit = 100000
//!
//! [settings]
//! resolution = 8
//! frequency = 2000
//! channels = 0x3
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdcError, Result};
use crate::regs::{TimerClock, TIMER_CLOCK4_DIVIDER};
use crate::settings::AcquisitionSettings;
use crate::timing::{HIGH_RES_CLOCK_HZ, LOW_RES_CLOCK_HZ};

/// Configuration for one ADC device context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Capacity of each of the two DMA buffers in bytes
    #[serde(default = "default_dma_buffer_size")]
    pub dma_buffer_size: usize,

    /// Divider between the master clock and the trigger timer base:
    /// 2, 8, 32 or 128 (TIMER_CLOCK1..4)
    #[serde(default = "default_trigger_divider")]
    pub trigger_divider: u32,

    /// Conversion clock targeted in 10-bit mode (Hz)
    #[serde(default = "default_high_res_clock")]
    pub high_res_clock_hz: u32,

    /// Conversion clock targeted in 8-bit mode (Hz)
    #[serde(default = "default_low_res_clock")]
    pub low_res_clock_hz: u32,

    /// Settings in effect until changed through the attribute surface
    #[serde(default)]
    pub settings: AcquisitionSettings,

    /// Maximum DRDY polls for a single-shot conversion; unbounded if unset
    #[serde(default)]
    pub single_shot_poll_limit: Option<u32>,
}

fn default_dma_buffer_size() -> usize {
    32 * 1024
}

fn default_trigger_divider() -> u32 {
    TIMER_CLOCK4_DIVIDER
}

fn default_high_res_clock() -> u32 {
    HIGH_RES_CLOCK_HZ
}

fn default_low_res_clock() -> u32 {
    LOW_RES_CLOCK_HZ
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            dma_buffer_size: default_dma_buffer_size(),
            trigger_divider: default_trigger_divider(),
            high_res_clock_hz: default_high_res_clock(),
            low_res_clock_hz: default_low_res_clock(),
            settings: AcquisitionSettings::default(),
            single_shot_poll_limit: None,
        }
    }
}

impl DeviceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| AdcError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AdcError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Timer clock source selected by `trigger_divider`.
    pub fn trigger_clock(&self) -> Result<TimerClock> {
        TimerClock::from_divider(self.trigger_divider).ok_or_else(|| {
            config_error(format!(
                "trigger_divider {} is not a timer clock source (2, 8, 32 or 128)",
                self.trigger_divider
            ))
        })
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        // largest stride is four 16-bit samples
        if self.dma_buffer_size < 8 {
            return Err(config_error(format!(
                "dma_buffer_size {} cannot hold one full scan",
                self.dma_buffer_size
            )));
        }
        self.trigger_clock()?;
        if self.high_res_clock_hz == 0 || self.low_res_clock_hz == 0 {
            return Err(config_error("conversion clock targets must be non-zero"));
        }
        if self.settings.frequency == 0 {
            return Err(config_error("settings.frequency must be non-zero"));
        }
        if self.single_shot_poll_limit == Some(0) {
            return Err(config_error("single_shot_poll_limit must be at least 1"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> AdcError {
    AdcError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ChannelMask, Resolution};
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = DeviceConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.dma_buffer_size, 32768);
        assert_eq!(config.trigger_divider, 128);
        assert_eq!(config.settings.resolution, Resolution::Bits10);
        assert_eq!(config.settings.frequency, 1000);
        assert_eq!(config.settings.channels, ChannelMask::ALL);
        assert_eq!(config.single_shot_poll_limit, None);
    }

    #[test]
    fn test_partial_settings_table() {
        let config = DeviceConfig::from_toml_str("[settings]\nfrequency = 250").unwrap();
        assert_eq!(config.settings.frequency, 250);
        assert_eq!(config.settings.channels, ChannelMask::ALL);
    }

    #[test]
    fn test_settings_table() {
        let config = DeviceConfig::from_toml_str(
            r#"
            single_shot_poll_limit = 500

            [settings]
            resolution = 8
            frequency = 2000
            channels = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.resolution, Resolution::Bits8);
        assert_eq!(config.settings.frequency, 2000);
        assert_eq!(config.settings.channels.bits(), 0b0011);
        assert_eq!(config.single_shot_poll_limit, Some(500));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = DeviceConfig::from_toml_str("[settings]\nresolution = 12\nfrequency = 1\nchannels = 1")
            .unwrap_err();
        assert!(matches!(err, AdcError::Config { .. }));

        let err = DeviceConfig::from_toml_str("trigger_divider = 100").unwrap_err();
        assert!(err.to_string().contains("trigger_divider"));

        let config = DeviceConfig::from_toml_str("trigger_divider = 32").unwrap();
        assert_eq!(config.trigger_clock().unwrap(), TimerClock::Clock3);

        assert!(DeviceConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dma_buffer_size = 4096").unwrap();
        let config = DeviceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dma_buffer_size, 4096);

        assert!(DeviceConfig::from_file("/nonexistent/at91adc.toml").is_err());
    }
}
