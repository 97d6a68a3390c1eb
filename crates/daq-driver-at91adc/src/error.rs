//! Error types for ADC acquisition.
//!
//! [`AdcError`] mirrors the failure modes a character-device front end has to
//! report: a busy device, a read that would block, an interrupted wait, an
//! inaccessible destination and invalid arguments. [`AdcError::errno`] gives
//! the POSIX code such a front end returns.

use std::io;
use thiserror::Error;

/// Result type alias for ADC operations.
pub type Result<T> = std::result::Result<T, AdcError>;

/// Errors that can occur when driving the ADC.
#[derive(Error, Debug)]
pub enum AdcError {
    /// Device already open, or the completion interrupt could not be claimed
    #[error("Device busy: {reason}")]
    Busy { reason: String },

    /// Non-blocking read with no data available
    #[error("No sample data available (operation would block)")]
    WouldBlock,

    /// Blocking wait cancelled from outside; the caller must retry
    #[error("Wait for sample data interrupted")]
    Interrupted,

    /// Destination buffer cannot hold the requested bytes
    #[error("Bad destination: {requested} bytes requested, destination holds {capacity}")]
    Fault { requested: usize, capacity: usize },

    /// Unsupported channel, zero frequency, malformed value, ...
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Streaming read issued while acquisition is not running
    #[error("Acquisition is not running")]
    NotOpen,

    /// Bounded single-shot conversion did not signal data-ready in time
    #[error("Single-shot conversion on channel {channel} not ready after {polls} polls")]
    Timeout { channel: u8, polls: u32 },

    /// Write to a read-only attribute
    #[error("Attribute '{name}' is read-only")]
    ReadOnly { name: String },

    /// Attribute key not recognized
    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    /// Coherent DMA memory could not be allocated
    #[error("DMA allocation of {len} bytes failed: {message}")]
    Allocation { len: usize, message: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl AdcError {
    /// Shorthand for [`AdcError::InvalidArgument`].
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for [`AdcError::Busy`].
    pub(crate) fn busy(reason: impl Into<String>) -> Self {
        Self::Busy {
            reason: reason.into(),
        }
    }

    /// POSIX error code a character-device shim reports for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Busy { .. } => libc::EBUSY,
            Self::WouldBlock => libc::EAGAIN,
            Self::Interrupted => libc::EINTR,
            Self::Fault { .. } => libc::EFAULT,
            Self::InvalidArgument { .. }
            | Self::UnknownAttribute { .. }
            | Self::Config { .. } => libc::EINVAL,
            Self::NotOpen => libc::ENODEV,
            Self::Timeout { .. } => libc::ETIMEDOUT,
            Self::ReadOnly { .. } => libc::EPERM,
            Self::Allocation { .. } => libc::ENOMEM,
        }
    }

    /// Check if the device was busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Check if a non-blocking read found no data.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Check if a blocking wait was interrupted.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<AdcError> for io::Error {
    fn from(err: AdcError) -> Self {
        let kind = match &err {
            AdcError::WouldBlock => io::ErrorKind::WouldBlock,
            AdcError::Interrupted => io::ErrorKind::Interrupted,
            AdcError::Timeout { .. } => io::ErrorKind::TimedOut,
            AdcError::NotOpen => io::ErrorKind::NotConnected,
            AdcError::ReadOnly { .. } => io::ErrorKind::PermissionDenied,
            AdcError::Allocation { .. } => io::ErrorKind::OutOfMemory,
            AdcError::Fault { .. }
            | AdcError::InvalidArgument { .. }
            | AdcError::UnknownAttribute { .. }
            | AdcError::Config { .. } => io::ErrorKind::InvalidInput,
            AdcError::Busy { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdcError::Fault {
            requested: 64,
            capacity: 16,
        };
        assert!(err.to_string().contains("64"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(AdcError::busy("open").errno(), libc::EBUSY);
        assert_eq!(AdcError::WouldBlock.errno(), libc::EAGAIN);
        assert_eq!(AdcError::Interrupted.errno(), libc::EINTR);
        assert_eq!(AdcError::invalid("channel 7").errno(), libc::EINVAL);
    }

    #[test]
    fn test_io_error_kind() {
        let err: io::Error = AdcError::WouldBlock.into();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        let err: io::Error = AdcError::Interrupted.into();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }
}
