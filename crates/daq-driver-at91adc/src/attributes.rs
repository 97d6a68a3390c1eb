//! Named attribute surface for runtime configuration.
//!
//! | Key            | Access | Value                                   |
//! |----------------|--------|-----------------------------------------|
//! | `resolution`   | rw     | `8` or `10`                             |
//! | `highres`      | rw     | `1` for 10-bit, `0` for 8-bit           |
//! | `frequency`    | rw     | scan frequency in Hz, non-zero          |
//! | `ch<N>_enable` | rw     | non-zero enables channel N (0..=3)      |
//! | `ch<N>_value`  | r      | current value of channel N              |
//!
//! Values are unsigned integers in decimal, `0x` hex or leading-`0` octal;
//! surrounding whitespace (such as a trailing newline) is ignored. Writes
//! are rejected with `Busy` while acquisition runs and take effect on the
//! next `open()`.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::device::Shared;
use crate::error::{AdcError, Result};
use crate::settings::{Resolution, CHANNEL_COUNT};

/// One attribute key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// Sample width in bits
    Resolution,
    /// Boolean form of the resolution
    HighRes,
    /// Scan frequency in Hz
    Frequency,
    /// Enable flag of one channel
    ChannelEnable(u8),
    /// Current value of one channel
    ChannelValue(u8),
}

impl Attribute {
    /// Every attribute the device exposes.
    pub fn all() -> Vec<Self> {
        let mut all = vec![Self::Resolution, Self::HighRes, Self::Frequency];
        for channel in 0..CHANNEL_COUNT {
            all.push(Self::ChannelEnable(channel));
            all.push(Self::ChannelValue(channel));
        }
        all
    }

    /// Whether the attribute accepts writes.
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ChannelValue(_))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution => f.write_str("resolution"),
            Self::HighRes => f.write_str("highres"),
            Self::Frequency => f.write_str("frequency"),
            Self::ChannelEnable(ch) => write!(f, "ch{ch}_enable"),
            Self::ChannelValue(ch) => write!(f, "ch{ch}_value"),
        }
    }
}

impl FromStr for Attribute {
    type Err = AdcError;

    fn from_str(name: &str) -> Result<Self> {
        let unknown = || AdcError::UnknownAttribute {
            name: name.to_string(),
        };
        match name {
            "resolution" => return Ok(Self::Resolution),
            "highres" => return Ok(Self::HighRes),
            "frequency" => return Ok(Self::Frequency),
            _ => {}
        }

        let rest = name.strip_prefix("ch").ok_or_else(unknown)?;
        let (index, suffix) = rest.split_once('_').ok_or_else(unknown)?;
        let channel: u8 = index.parse().map_err(|_| unknown())?;
        if channel >= CHANNEL_COUNT || index.len() != 1 {
            return Err(unknown());
        }
        match suffix {
            "enable" => Ok(Self::ChannelEnable(channel)),
            "value" => Ok(Self::ChannelValue(channel)),
            _ => Err(unknown()),
        }
    }
}

/// Parse an unsigned attribute value.
///
/// Accepts decimal, `0x`/`0X` hexadecimal and leading-`0` octal.
pub fn parse_unsigned(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let (digits, radix) = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        (hex, 16)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        (&trimmed[1..], 8)
    } else {
        (trimmed, 10)
    };

    if digits.is_empty() || digits.starts_with('+') {
        return Err(AdcError::invalid(format!("malformed value {trimmed:?}")));
    }
    u32::from_str_radix(digits, radix)
        .map_err(|e| AdcError::invalid(format!("malformed value {trimmed:?}: {e}")))
}

impl Shared {
    pub(crate) fn attribute(&self, attribute: Attribute) -> Result<String> {
        let settings = || self.state.lock().settings;
        let value = match attribute {
            Attribute::Resolution => settings().resolution.bits(),
            Attribute::HighRes => u32::from(settings().resolution.is_high()),
            Attribute::Frequency => settings().frequency,
            Attribute::ChannelEnable(channel) => u32::from(settings().channels.contains(channel)),
            Attribute::ChannelValue(channel) => u32::from(self.read_value(channel)?),
        };
        Ok(value.to_string())
    }

    pub(crate) fn set_attribute(&self, attribute: Attribute, text: &str) -> Result<()> {
        let read_only = || AdcError::ReadOnly {
            name: attribute.to_string(),
        };
        if !attribute.is_writable() {
            return Err(read_only());
        }

        let mut state = self.state.lock();
        if state.open {
            return Err(AdcError::busy(format!(
                "cannot change {attribute} while acquisition is running"
            )));
        }

        let value = parse_unsigned(text)?;
        let settings = &mut state.settings;
        match attribute {
            Attribute::Resolution => settings.resolution = Resolution::from_bits(value)?,
            Attribute::HighRes => {
                settings.resolution = if value > 0 {
                    Resolution::Bits10
                } else {
                    Resolution::Bits8
                };
            }
            Attribute::Frequency => {
                if value == 0 {
                    return Err(AdcError::invalid("frequency must be non-zero"));
                }
                settings.frequency = value;
            }
            Attribute::ChannelEnable(channel) => {
                settings.channels = settings.channels.with(channel, value > 0)?;
            }
            Attribute::ChannelValue(_) => return Err(read_only()),
        }
        debug!(attribute = %attribute, value, "Attribute updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute_names() {
        assert_eq!("highres".parse::<Attribute>().unwrap(), Attribute::HighRes);
        assert_eq!(
            "ch3_enable".parse::<Attribute>().unwrap(),
            Attribute::ChannelEnable(3)
        );
        assert_eq!(
            "ch0_value".parse::<Attribute>().unwrap(),
            Attribute::ChannelValue(0)
        );
        assert!("ch4_enable".parse::<Attribute>().is_err());
        assert!("ch01_value".parse::<Attribute>().is_err());
        assert!("gain".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_names_round_trip_through_display() {
        for attribute in Attribute::all() {
            assert_eq!(attribute.to_string().parse::<Attribute>().unwrap(), attribute);
        }
        assert_eq!(Attribute::all().len(), 11);
    }

    #[test]
    fn test_parse_unsigned_bases() {
        assert_eq!(parse_unsigned("1000\n").unwrap(), 1000);
        assert_eq!(parse_unsigned("0x3e8").unwrap(), 1000);
        assert_eq!(parse_unsigned("01750").unwrap(), 1000);
        assert_eq!(parse_unsigned("0").unwrap(), 0);
        assert!(parse_unsigned("").is_err());
        assert!(parse_unsigned("-1").is_err());
        assert!(parse_unsigned("ten").is_err());
        assert!(parse_unsigned("0x").is_err());
    }
}
