//! Acquisition settings: resolution, sample frequency and channel mask.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AdcError, Result};

/// Number of analog input channels the driver handles.
pub const CHANNEL_COUNT: u8 = 4;

/// Sample width of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    /// 8-bit samples, one byte each
    Bits8,
    /// 10-bit samples, stored as one 16-bit word each
    #[default]
    Bits10,
}

impl Resolution {
    /// Bytes one sample occupies in a DMA buffer.
    pub fn sample_width(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits10 => 2,
        }
    }

    /// Number of bits per conversion.
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits10 => 10,
        }
    }

    /// Parse a bit count (8 or 10).
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            8 => Ok(Self::Bits8),
            10 => Ok(Self::Bits10),
            other => Err(AdcError::invalid(format!(
                "unsupported resolution {other} bits (expected 8 or 10)"
            ))),
        }
    }

    /// Whether this is the high-resolution (10-bit) mode.
    pub fn is_high(self) -> bool {
        self == Self::Bits10
    }
}

impl TryFrom<u32> for Resolution {
    type Error = AdcError;

    fn try_from(bits: u32) -> Result<Self> {
        Self::from_bits(bits)
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> u32 {
        resolution.bits()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Four-bit channel enable mask, bit N enables channel N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// All four channels enabled.
    pub const ALL: Self = Self(0x0F);

    /// No channel enabled.
    pub const NONE: Self = Self(0);

    /// Build a mask from raw bits; bits above channel 3 are rejected.
    pub fn new(bits: u8) -> Result<Self> {
        if bits & !Self::ALL.0 != 0 {
            return Err(AdcError::invalid(format!(
                "channel mask {bits:#04x} selects channels beyond {}",
                CHANNEL_COUNT - 1
            )));
        }
        Ok(Self(bits))
    }

    /// Raw mask bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether `channel` is enabled.
    pub fn contains(self, channel: u8) -> bool {
        channel < CHANNEL_COUNT && self.0 & (1 << channel) != 0
    }

    /// Copy of the mask with `channel` switched on or off.
    pub fn with(self, channel: u8, enabled: bool) -> Result<Self> {
        check_channel(channel)?;
        let bit = 1 << channel;
        Ok(if enabled {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        })
    }

    /// Number of enabled channels.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether no channel is enabled.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Position of `channel` within one scan: the number of enabled
    /// lower-numbered channels.
    pub fn position(self, channel: u8) -> usize {
        let below = (1u8 << channel) - 1;
        (self.0 & below).count_ones() as usize
    }

    /// Enabled channels in scan order.
    pub fn channels(self) -> impl Iterator<Item = u8> {
        (0..CHANNEL_COUNT).filter(move |&ch| self.contains(ch))
    }
}

impl TryFrom<u8> for ChannelMask {
    type Error = AdcError;

    fn try_from(bits: u8) -> Result<Self> {
        Self::new(bits)
    }
}

impl From<ChannelMask> for u8 {
    fn from(mask: ChannelMask) -> u8 {
        mask.0
    }
}

/// Validate a channel index.
pub fn check_channel(channel: u8) -> Result<()> {
    if channel >= CHANNEL_COUNT {
        return Err(AdcError::invalid(format!(
            "channel {channel} out of range (0..{CHANNEL_COUNT})"
        )));
    }
    Ok(())
}

/// Settings applied on the next `open()`.
///
/// `frequency` holds the requested rate while the device is closed and the
/// achieved rate (quantized to the trigger timer) once it has been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionSettings {
    /// Sample width
    pub resolution: Resolution,
    /// Scan frequency in Hz
    pub frequency: u32,
    /// Enabled channels
    pub channels: ChannelMask,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::Bits10,
            frequency: 1000,
            channels: ChannelMask::ALL,
        }
    }
}

impl AcquisitionSettings {
    /// Bytes one scan (one sample of every enabled channel) occupies.
    pub fn scan_stride(&self) -> usize {
        self.channels.count() * self.resolution.sample_width()
    }
}
